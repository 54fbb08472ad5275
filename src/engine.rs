// =============================================================================
// Day Level Engine — per-bar orchestration of the level pipeline
// =============================================================================
//
// Owns the whole pipeline behind the overlay indicators:
//
//   bar -> SessionTracker -> (boundary?) -> compute_range -> level ladder
//        -> HistoryCache archive/rotate -> LevelStore reuse/persist
//
// Bars arrive strictly in timestamp order from one feed; `on_bar` is
// sequential and non-reentrant. On a day boundary the outgoing current set
// is frozen and archived, then the new day's ladder is either reused from
// the persisted store or computed fresh (and saved). Days without a usable
// range or base produce no current set; the archived history keeps the last
// valid ladders for the renderer.
// =============================================================================

use std::path::PathBuf;

use anyhow::{bail, Result};
use tracing::{debug, info, warn};

use crate::config::{BasePriceMode, EngineConfig};
use crate::history::HistoryCache;
use crate::levels::LevelMemo;
use crate::range::compute_range;
use crate::session::{DayBoundaryEvent, SessionCalendar, SessionTracker};
use crate::store::LevelStore;
use crate::types::{DailyBar, LevelSet};

/// The level pipeline behind one indicator instance.
pub struct DayLevelEngine {
    config: EngineConfig,
    tracker: SessionTracker,
    history: HistoryCache,
    memo: LevelMemo,
    store: Option<(LevelStore, PathBuf)>,
}

impl DayLevelEngine {
    /// Build an engine without persistence.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.recipe.validate()?;
        if config.days_to_retain == 0 {
            bail!("days_to_retain must be positive");
        }
        if !config.tick_size.is_finite() || config.tick_size < 0.0 {
            bail!("tick_size must be a non-negative finite number");
        }

        let calendar = SessionCalendar::from_config(&config.calendar);
        let history = HistoryCache::new(config.days_to_retain);
        Ok(Self {
            config,
            tracker: SessionTracker::new(calendar),
            history,
            memo: LevelMemo::new(),
            store: None,
        })
    }

    /// Build an engine with a persisted level store at `path`.
    ///
    /// The store is loaded eagerly, before any bar is processed; entries
    /// saved under a different level-affecting configuration are discarded.
    pub fn with_store(config: EngineConfig, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let store = LevelStore::load(&path, config.fingerprint());
        let mut engine = Self::new(config)?;
        engine.store = Some((store, path));
        Ok(engine)
    }

    /// Feed the next bar in timestamp order.
    ///
    /// `bar_index` is the caller's opaque sequence position for this bar; it
    /// is stamped into level sets as their start/end boundaries and never
    /// interpreted by the engine.
    ///
    /// Returns the current day's level set once one is available.
    pub fn on_bar(&mut self, bar: &DailyBar, bar_index: usize) -> Option<&LevelSet> {
        if !bar.is_well_formed() {
            warn!(
                time = %bar.time,
                open = bar.open,
                high = bar.high,
                low = bar.low,
                close = bar.close,
                "malformed bar skipped"
            );
            return self.history.current();
        }

        match self.tracker.on_bar(bar) {
            Some(event) => self.roll_day(&event, bar_index),
            None => {
                // Same trading day: the current set stays valid through this bar.
                if let Some(current) = self.history.current_mut() {
                    current.end_bar = bar_index;
                }
            }
        }

        self.history.current()
    }

    /// Handle a day boundary: freeze the outgoing set, then reuse or compute
    /// the new day's ladder.
    fn roll_day(&mut self, event: &DayBoundaryEvent, bar_index: usize) {
        if let Some(done) = self.history.take_current() {
            self.history.archive(done);
        }

        let day = event.new_day;

        // Lookup-before-compute: a persisted ladder for this day is reused
        // verbatim. The store only holds entries matching the current config
        // fingerprint, so reuse is always sound.
        if let Some((store, _)) = &self.store {
            if let Some(saved) = store.lookup(day) {
                info!(day = %day, levels = saved.len(), "persisted levels reused");
                self.history
                    .set_current(LevelSet::new(day, bar_index, saved.clone()));
                return;
            }
        }

        let prior = self.tracker.recent_days();
        let summary = match compute_range(
            &prior,
            self.tracker.current_open(),
            self.config.range_mode,
            self.config.gap_mode,
        ) {
            Some(summary) => summary,
            None => {
                debug!(day = %day, "levels unavailable: no usable range");
                return;
            }
        };

        let base = match self.base_price() {
            Some(base) if base.is_finite() && base > 0.0 => base,
            _ => {
                debug!(day = %day, "levels unavailable: no usable base price");
                return;
            }
        };

        let levels = self
            .memo
            .compute(summary.range, base, &self.config.recipe, self.config.tick_size);
        if levels.is_empty() {
            debug!(
                day = %day,
                range = summary.range,
                base,
                "levels unavailable: degenerate inputs"
            );
            return;
        }

        info!(
            day = %day,
            range = summary.range,
            base,
            degraded = summary.degraded,
            derivation = %summary.description,
            levels = levels.len(),
            "levels computed"
        );

        if let Some((store, path)) = self.store.as_mut() {
            store.insert(day, levels.clone());
            if let Err(e) = store.save(path.as_path()) {
                warn!(error = %e, "failed to persist levels");
            }
        }

        self.history.set_current(LevelSet::new(day, bar_index, levels));
    }

    /// Anchor price for the ladder per the configured mode. A positive
    /// manual override always wins; `Manual(0.0)` falls back to the
    /// prior-day close.
    fn base_price(&self) -> Option<f64> {
        match self.config.base_price_mode {
            BasePriceMode::Manual(value) if value > 0.0 => Some(value),
            BasePriceMode::Manual(_) | BasePriceMode::PriorClose => {
                self.tracker.last_prior().map(|d| d.close)
            }
            BasePriceMode::CurrentOpen => self.tracker.current_open(),
        }
    }

    /// The current day's level set, if one is available.
    pub fn current(&self) -> Option<&LevelSet> {
        self.history.current()
    }

    /// Archived completed-day sets (oldest to newest) plus the current set.
    pub fn history(&self) -> &HistoryCache {
        &self.history
    }

    /// Whether enough completed days exist to compute levels.
    pub fn can_calculate(&self) -> bool {
        self.tracker.can_calculate(self.config.range_mode)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Flush any unsaved store entries. Call once at stream teardown.
    pub fn shutdown(&mut self) {
        if let Some((store, path)) = self.store.as_mut() {
            if let Err(e) = store.flush(path.as_path()) {
                warn!(error = %e, "failed to flush persisted levels at shutdown");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GapMode, RangeMode};
    use crate::types::LevelName;
    use chrono::{NaiveDate, TimeZone, Utc};
    use std::path::PathBuf;

    fn bar_on(d: u32, h: u32, open: f64, high: f64, low: f64, close: f64) -> DailyBar {
        DailyBar {
            time: Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap(),
            open,
            high,
            low,
            close,
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn manual_base_config() -> EngineConfig {
        let mut config = EngineConfig::default();
        config.base_price_mode = BasePriceMode::Manual(102.5);
        config
    }

    fn temp_store(tag: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!(
            "aurora_levels_engine_{tag}_{}.json",
            std::process::id()
        ));
        path
    }

    #[test]
    fn example_scenario_end_to_end() {
        let mut engine = DayLevelEngine::new(manual_base_config()).unwrap();

        // Day 4 accumulates to {high 105, low 100, close 101}.
        assert!(engine.on_bar(&bar_on(4, 10, 101.0, 105.0, 100.0, 103.0), 0).is_none());
        assert!(engine.on_bar(&bar_on(4, 15, 103.0, 104.0, 100.5, 101.0), 1).is_none());
        assert!(!engine.can_calculate());

        // First bar of day 5 fires the boundary: range 5.00, manual base 102.50.
        let set = engine
            .on_bar(&bar_on(5, 10, 103.0, 106.0, 102.0, 104.0), 2)
            .expect("levels should be available after the first completed day");
        assert_eq!(set.day, date(5));
        assert_eq!(set.start_bar, 2);
        assert_eq!(set.end_bar, 2);
        assert!((set.get(LevelName::Q1).unwrap() - 105.0).abs() < f64::EPSILON);
        assert!((set.get(LevelName::Q4).unwrap() - 100.0).abs() < f64::EPSILON);
        assert!((set.get(LevelName::NR2).unwrap() - 102.5).abs() < f64::EPSILON);
        assert!((set.get(LevelName::OneDayPlus).unwrap() - 107.5).abs() < f64::EPSILON);
        assert!((set.get(LevelName::OneDayMinus).unwrap() - 97.5).abs() < f64::EPSILON);
        assert!(engine.can_calculate());
    }

    #[test]
    fn current_set_tracks_end_bar_through_the_day() {
        let mut engine = DayLevelEngine::new(manual_base_config()).unwrap();
        engine.on_bar(&bar_on(4, 10, 101.0, 105.0, 100.0, 101.0), 0);
        engine.on_bar(&bar_on(5, 10, 103.0, 106.0, 102.0, 104.0), 1);
        engine.on_bar(&bar_on(5, 12, 104.0, 107.0, 103.0, 105.0), 2);
        let set = engine
            .on_bar(&bar_on(5, 15, 105.0, 108.0, 104.0, 106.0), 3)
            .unwrap();
        assert_eq!(set.start_bar, 1);
        assert_eq!(set.end_bar, 3);
    }

    #[test]
    fn gap_scenario_widens_the_ladder() {
        let mut config = manual_base_config();
        config.gap_mode = GapMode::AbsoluteAdd;
        let mut engine = DayLevelEngine::new(config).unwrap();

        // Prior day closes at 101; next day opens at 103 => gap 2.00.
        engine.on_bar(&bar_on(4, 10, 101.0, 105.0, 100.0, 101.0), 0);
        let set = engine
            .on_bar(&bar_on(5, 10, 103.0, 106.0, 102.0, 104.0), 1)
            .unwrap();
        // range = 5.00 + 2.00.
        assert!((set.get(LevelName::Q1).unwrap() - 106.0).abs() < f64::EPSILON);
        assert!((set.get(LevelName::Q4).unwrap() - 99.0).abs() < f64::EPSILON);
        assert!((set.get(LevelName::OneDayPlus).unwrap() - 109.5).abs() < f64::EPSILON);
        assert!((set.get(LevelName::OneDayMinus).unwrap() - 95.5).abs() < f64::EPSILON);
    }

    #[test]
    fn prior_close_is_the_default_base() {
        let mut engine = DayLevelEngine::new(EngineConfig::default()).unwrap();
        engine.on_bar(&bar_on(4, 10, 101.0, 105.0, 100.0, 101.0), 0);
        let set = engine
            .on_bar(&bar_on(5, 10, 103.0, 106.0, 102.0, 104.0), 1)
            .unwrap();
        assert!((set.get(LevelName::NR2).unwrap() - 101.0).abs() < f64::EPSILON);
    }

    #[test]
    fn three_day_mode_spans_the_window() {
        let mut config = EngineConfig::default();
        config.range_mode = RangeMode::ThreeDays;
        let mut engine = DayLevelEngine::new(config).unwrap();

        engine.on_bar(&bar_on(4, 10, 101.0, 104.0, 99.0, 103.0), 0);
        engine.on_bar(&bar_on(5, 10, 103.0, 110.0, 102.0, 108.0), 1);
        engine.on_bar(&bar_on(6, 10, 108.0, 109.0, 101.0, 102.0), 2);
        let set = engine
            .on_bar(&bar_on(7, 10, 102.0, 103.0, 101.0, 102.5), 3)
            .unwrap();
        // Window extremes: high 110, low 99 => range 11; base = day-6 close 102.
        assert!((set.get(LevelName::NR2).unwrap() - 102.0).abs() < f64::EPSILON);
        assert!((set.get(LevelName::Q1).unwrap() - 107.5).abs() < f64::EPSILON);
        assert!((set.get(LevelName::Q4).unwrap() - 96.5).abs() < f64::EPSILON);
    }

    #[test]
    fn history_respects_retention_budget() {
        let mut config = manual_base_config();
        config.days_to_retain = 2;
        let mut engine = DayLevelEngine::new(config).unwrap();

        for (i, d) in (4..=8).enumerate() {
            engine.on_bar(&bar_on(d, 10, 101.0, 105.0, 100.0, 102.0), i);
        }
        // Sets were started on days 5..8; days 5..7 archived, trimmed to 2.
        assert_eq!(engine.history().len(), 2);
        assert_eq!(engine.history().oldest().unwrap().day, date(6));
        assert_eq!(engine.history().newest().unwrap().day, date(7));
        assert_eq!(engine.current().unwrap().day, date(8));
    }

    #[test]
    fn malformed_bar_is_skipped_without_state_change() {
        let mut engine = DayLevelEngine::new(manual_base_config()).unwrap();
        engine.on_bar(&bar_on(4, 10, 101.0, 105.0, 100.0, 101.0), 0);

        // high < low: data-quality violation, bar must not start day 5.
        let junk = bar_on(5, 10, 103.0, 100.0, 106.0, 104.0);
        assert!(engine.on_bar(&junk, 1).is_none());
        assert!(!engine.can_calculate());

        // A well-formed day-5 bar still rolls the day over normally.
        let set = engine
            .on_bar(&bar_on(5, 11, 103.0, 106.0, 102.0, 104.0), 2)
            .unwrap();
        assert_eq!(set.day, date(5));
    }

    #[test]
    fn flat_prior_day_leaves_previous_levels_archived() {
        let mut engine = DayLevelEngine::new(manual_base_config()).unwrap();
        engine.on_bar(&bar_on(4, 10, 101.0, 105.0, 100.0, 101.0), 0);
        // Day 5 computes fine, but is itself a locked-limit flat day.
        assert!(engine.on_bar(&bar_on(5, 10, 104.0, 104.0, 104.0, 104.0), 1).is_some());
        // Day 6 has no usable range (day 5 spread is zero): no current set,
        // but day 5's ladder survives in the archive.
        assert!(engine.on_bar(&bar_on(6, 10, 104.0, 105.0, 103.0, 104.5), 2).is_none());
        assert_eq!(engine.history().len(), 1);
        assert_eq!(engine.history().newest().unwrap().day, date(5));
    }

    #[test]
    fn persisted_levels_are_reused_verbatim() {
        let path = temp_store("reuse");
        let config = manual_base_config();

        // Seed the store with a sentinel ladder for day 5 under the same
        // fingerprint; the engine must reuse it instead of recomputing.
        let mut seed = LevelStore::new(config.fingerprint());
        let mut sentinel = std::collections::BTreeMap::new();
        sentinel.insert(LevelName::NR2, 555.0);
        seed.insert(date(5), sentinel.clone());
        seed.save(&path).unwrap();

        let mut engine = DayLevelEngine::with_store(config, &path).unwrap();
        engine.on_bar(&bar_on(4, 10, 101.0, 105.0, 100.0, 101.0), 0);
        let set = engine
            .on_bar(&bar_on(5, 10, 103.0, 106.0, 102.0, 104.0), 1)
            .unwrap();
        assert_eq!(set.levels, sentinel);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn fresh_computations_are_persisted_across_restarts() {
        let path = temp_store("restart");
        let config = manual_base_config();

        let mut first = DayLevelEngine::with_store(config.clone(), &path).unwrap();
        first.on_bar(&bar_on(4, 10, 101.0, 105.0, 100.0, 101.0), 0);
        let computed = first
            .on_bar(&bar_on(5, 10, 103.0, 106.0, 102.0, 104.0), 1)
            .unwrap()
            .levels
            .clone();
        first.shutdown();

        // A second run over the same feed reuses the saved ladder.
        let mut second = DayLevelEngine::with_store(config, &path).unwrap();
        second.on_bar(&bar_on(4, 10, 101.0, 105.0, 100.0, 101.0), 0);
        let reused = second
            .on_bar(&bar_on(5, 10, 103.0, 106.0, 102.0, 104.0), 1)
            .unwrap();
        assert_eq!(reused.levels, computed);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn stale_fingerprint_forces_recomputation() {
        let path = temp_store("stale");

        // Seed under a different tick size (different fingerprint).
        let mut other = manual_base_config();
        other.tick_size = 0.5;
        let mut seed = LevelStore::new(other.fingerprint());
        let mut sentinel = std::collections::BTreeMap::new();
        sentinel.insert(LevelName::NR2, 555.0);
        seed.insert(date(5), sentinel);
        seed.save(&path).unwrap();

        let mut engine = DayLevelEngine::with_store(manual_base_config(), &path).unwrap();
        engine.on_bar(&bar_on(4, 10, 101.0, 105.0, 100.0, 101.0), 0);
        let set = engine
            .on_bar(&bar_on(5, 10, 103.0, 106.0, 102.0, 104.0), 1)
            .unwrap();
        // Recomputed, not the sentinel.
        assert!((set.get(LevelName::NR2).unwrap() - 102.5).abs() < f64::EPSILON);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn zero_retention_is_rejected() {
        let mut config = EngineConfig::default();
        config.days_to_retain = 0;
        assert!(DayLevelEngine::new(config).is_err());
    }

    #[test]
    fn invalid_tick_is_rejected() {
        let mut config = EngineConfig::default();
        config.tick_size = f64::NAN;
        assert!(DayLevelEngine::new(config).is_err());
    }
}
