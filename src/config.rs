// =============================================================================
// Engine Configuration — serde-defaulted settings with atomic save
// =============================================================================
//
// Every knob that changes what the engine computes lives here. All fields
// carry `#[serde(default)]` so that adding new fields never breaks loading an
// older config file, and persistence uses the tmp + rename pattern to prevent
// corruption on crash.
//
// The level-affecting subset of the config is folded into a SHA-256
// fingerprint that the persisted level store uses to detect stale entries.
// =============================================================================

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::recipe::RatioTable;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_tick_size() -> f64 {
    0.25
}

fn default_days_to_retain() -> usize {
    5
}

fn default_recipe() -> RatioTable {
    RatioTable::quadrant()
}

// =============================================================================
// Modes
// =============================================================================

/// How many completed sessions feed the range calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeMode {
    OneDay,
    ThreeDays,
}

impl Default for RangeMode {
    fn default() -> Self {
        Self::OneDay
    }
}

impl std::fmt::Display for RangeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OneDay => write!(f, "OneDay"),
            Self::ThreeDays => write!(f, "ThreeDays"),
        }
    }
}

/// Opening-gap adjustment applied on top of the raw high-low range.
///
/// The modes are mutually exclusive; `Disabled` leaves the range untouched.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum GapMode {
    Disabled,
    /// Add the full `|current open - prior close|` gap.
    AbsoluteAdd,
    /// Add half the gap.
    HalfAdd,
    /// Add a user-supplied constant instead of a computed gap.
    Manual(f64),
}

impl Default for GapMode {
    fn default() -> Self {
        Self::Disabled
    }
}

impl std::fmt::Display for GapMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disabled => write!(f, "Disabled"),
            Self::AbsoluteAdd => write!(f, "AbsoluteAdd"),
            Self::HalfAdd => write!(f, "HalfAdd"),
            Self::Manual(v) => write!(f, "Manual({v})"),
        }
    }
}

/// Which price anchors the ladder (the NR2 line).
///
/// A positive `Manual` value always wins; `Manual(0.0)` counts as unset and
/// falls back to the prior-day close.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BasePriceMode {
    PriorClose,
    CurrentOpen,
    Manual(f64),
}

impl Default for BasePriceMode {
    fn default() -> Self {
        Self::PriorClose
    }
}

impl std::fmt::Display for BasePriceMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PriorClose => write!(f, "PriorClose"),
            Self::CurrentOpen => write!(f, "CurrentOpen"),
            Self::Manual(v) => write!(f, "Manual({v})"),
        }
    }
}

// =============================================================================
// Session calendar settings
// =============================================================================

/// Maps bar timestamps onto trading days.
///
/// `rollover_hours` shifts the timestamp before taking its calendar date, so
/// an evening session open lands in the next day's bucket (e.g. +6 rolls an
/// 18:00 open into the following trading day). Days listed in `holidays`
/// have no session: bars stamped there resolve to no trading day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub rollover_hours: i64,
    #[serde(default)]
    pub holidays: BTreeSet<NaiveDate>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            rollover_hours: 0,
            holidays: BTreeSet::new(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the level engine.
///
/// Every field has a serde default so that older JSON files missing new
/// fields will still deserialise correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Range & base selection ----------------------------------------------
    #[serde(default)]
    pub range_mode: RangeMode,

    #[serde(default)]
    pub gap_mode: GapMode,

    #[serde(default)]
    pub base_price_mode: BasePriceMode,

    // --- Level shaping -------------------------------------------------------
    /// Tick grid all level prices snap to. `0.0` disables rounding.
    #[serde(default = "default_tick_size")]
    pub tick_size: f64,

    /// Injectable ratio table driving the level engine.
    #[serde(default = "default_recipe")]
    pub recipe: RatioTable,

    // --- Retention & calendar ------------------------------------------------
    /// Completed-day level sets kept in the history cache.
    #[serde(default = "default_days_to_retain")]
    pub days_to_retain: usize,

    #[serde(default)]
    pub calendar: CalendarConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            range_mode: RangeMode::OneDay,
            gap_mode: GapMode::Disabled,
            base_price_mode: BasePriceMode::PriorClose,
            tick_size: default_tick_size(),
            recipe: default_recipe(),
            days_to_retain: default_days_to_retain(),
            calendar: CalendarConfig::default(),
        }
    }
}

/// The level-affecting subset of the config, serialized canonically for the
/// persistence fingerprint. Retention and calendar settings change *which*
/// days exist, not what their levels are worth, so they are excluded.
#[derive(Debug, Serialize)]
struct FingerprintFields<'a> {
    range_mode: RangeMode,
    gap_mode: GapMode,
    base_price_mode: BasePriceMode,
    tick_size: f64,
    recipe: &'a RatioTable,
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist or fails to parse, returns an error so the
    /// caller can fall back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            range_mode = %config.range_mode,
            gap_mode = %config.gap_mode,
            recipe = %config.recipe.id,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// SHA-256 hex digest over the level-affecting settings.
    ///
    /// Persisted level entries are only reused when the fingerprint they were
    /// saved under matches the current one.
    pub fn fingerprint(&self) -> String {
        let fields = FingerprintFields {
            range_mode: self.range_mode,
            gap_mode: self.gap_mode,
            base_price_mode: self.base_price_mode,
            tick_size: self.tick_size,
            recipe: &self.recipe,
        };
        let canonical =
            serde_json::to_string(&fields).unwrap_or_else(|_| format!("{fields:?}"));

        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        hex::encode(hasher.finalize())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.range_mode, RangeMode::OneDay);
        assert_eq!(cfg.gap_mode, GapMode::Disabled);
        assert_eq!(cfg.base_price_mode, BasePriceMode::PriorClose);
        assert!((cfg.tick_size - 0.25).abs() < f64::EPSILON);
        assert_eq!(cfg.days_to_retain, 5);
        assert_eq!(cfg.recipe.id, "quadrant");
        assert_eq!(cfg.calendar.rollover_hours, 0);
        assert!(cfg.calendar.holidays.is_empty());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "range_mode": "ThreeDays", "gap_mode": { "Manual": 1.5 } }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.range_mode, RangeMode::ThreeDays);
        assert_eq!(cfg.gap_mode, GapMode::Manual(1.5));
        assert_eq!(cfg.days_to_retain, 5);
        assert_eq!(cfg.recipe.id, "quadrant");
    }

    #[test]
    fn roundtrip_serialisation() {
        let mut cfg = EngineConfig::default();
        cfg.range_mode = RangeMode::ThreeDays;
        cfg.base_price_mode = BasePriceMode::Manual(102.5);
        cfg.calendar.rollover_hours = 6;
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, cfg2);
    }

    #[test]
    fn fingerprint_is_stable_for_equal_configs() {
        let a = EngineConfig::default();
        let b = EngineConfig::default();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_level_settings() {
        let base = EngineConfig::default();
        let mut tick = base.clone();
        tick.tick_size = 0.5;
        assert_ne!(base.fingerprint(), tick.fingerprint());

        let mut recipe = base.clone();
        recipe.recipe = RatioTable::quarter_extensions();
        assert_ne!(base.fingerprint(), recipe.fingerprint());
    }

    #[test]
    fn fingerprint_ignores_retention_and_calendar() {
        let base = EngineConfig::default();
        let mut other = base.clone();
        other.days_to_retain = 30;
        other.calendar.rollover_hours = 6;
        assert_eq!(base.fingerprint(), other.fingerprint());
    }

    #[test]
    fn save_and_load_round_trip_on_disk() {
        let mut path = std::env::temp_dir();
        path.push(format!("aurora_levels_cfg_{}.json", std::process::id()));

        let mut cfg = EngineConfig::default();
        cfg.gap_mode = GapMode::HalfAdd;
        cfg.save(&path).unwrap();
        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(cfg, loaded);

        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn load_missing_file_errors() {
        assert!(EngineConfig::load("/nonexistent/aurora_levels.json").is_err());
    }
}
