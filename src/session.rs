// =============================================================================
// Session Tracking — trading-day boundaries over an ordered bar stream
// =============================================================================
//
// The tracker consumes bars strictly in timestamp order and answers one
// question per bar: did a new trading day just begin? While a day is open it
// accumulates the running OHLC; when the day rolls over, the completed
// snapshot rotates into a fixed-size window of prior days (oldest evicted)
// and a fresh accumulator starts from the incoming bar.
//
// Trading days come from the session calendar, not the raw calendar date, so
// overnight sessions bucket correctly and holidays resolve to "no session".
// =============================================================================

use std::collections::{BTreeSet, VecDeque};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, warn};

use crate::config::{CalendarConfig, RangeMode};
use crate::types::{DailyBar, DaySummary};

/// Completed days retained for multi-day range calculation.
pub const PRIOR_DAY_WINDOW: usize = 3;

// =============================================================================
// SessionCalendar
// =============================================================================

/// Maps bar timestamps onto trading days.
#[derive(Debug, Clone)]
pub struct SessionCalendar {
    rollover_hours: i64,
    holidays: BTreeSet<NaiveDate>,
}

impl SessionCalendar {
    pub fn new(rollover_hours: i64, holidays: BTreeSet<NaiveDate>) -> Self {
        Self {
            rollover_hours,
            holidays,
        }
    }

    pub fn from_config(config: &CalendarConfig) -> Self {
        Self::new(config.rollover_hours, config.holidays.clone())
    }

    /// Trading day for `time`, or `None` when no session trades there.
    pub fn resolve(&self, time: DateTime<Utc>) -> Option<NaiveDate> {
        let day = (time + Duration::hours(self.rollover_hours)).date_naive();
        if self.holidays.contains(&day) {
            None
        } else {
            Some(day)
        }
    }
}

impl Default for SessionCalendar {
    fn default() -> Self {
        Self::from_config(&CalendarConfig::default())
    }
}

// =============================================================================
// SessionTracker
// =============================================================================

/// Running OHLC of the day currently being built.
#[derive(Debug, Clone, Copy)]
struct DayAccumulator {
    day: NaiveDate,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

impl DayAccumulator {
    fn start(day: NaiveDate, bar: &DailyBar) -> Self {
        Self {
            day,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
        }
    }

    fn fold(&mut self, bar: &DailyBar) {
        self.high = self.high.max(bar.high);
        self.low = self.low.min(bar.low);
        self.close = bar.close;
    }

    fn summary(&self) -> DaySummary {
        DaySummary {
            day: self.day,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
        }
    }
}

/// Fired when the trading day of the incoming bar differs from the current
/// one. Carries the snapshot of the day that just completed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DayBoundaryEvent {
    pub completed: DaySummary,
    pub new_day: NaiveDate,
}

/// Detects trading-day transitions and retains the last few completed days.
///
/// The first bar only initializes state; it never fires a boundary.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    calendar: SessionCalendar,
    current: Option<DayAccumulator>,
    prior_days: VecDeque<DaySummary>,
}

impl SessionTracker {
    pub fn new(calendar: SessionCalendar) -> Self {
        Self {
            calendar,
            current: None,
            prior_days: VecDeque::with_capacity(PRIOR_DAY_WINDOW + 1),
        }
    }

    /// Feed the next bar in timestamp order.
    ///
    /// Returns the boundary event when this bar opens a new trading day. Bars
    /// whose trading day cannot be resolved (holiday) are logged and ignored
    /// for boundary purposes, but still fold into the running OHLC while a
    /// day is open.
    pub fn on_bar(&mut self, bar: &DailyBar) -> Option<DayBoundaryEvent> {
        let day = match self.calendar.resolve(bar.time) {
            Some(day) => day,
            None => {
                warn!(time = %bar.time, "bar has no trading session; skipped for boundary detection");
                if let Some(acc) = self.current.as_mut() {
                    acc.fold(bar);
                }
                return None;
            }
        };

        match self.current.as_mut() {
            None => {
                self.current = Some(DayAccumulator::start(day, bar));
                debug!(day = %day, "session tracking started");
                None
            }
            Some(acc) if acc.day == day => {
                acc.fold(bar);
                None
            }
            Some(acc) => {
                let completed = acc.summary();
                self.prior_days.push_back(completed);
                while self.prior_days.len() > PRIOR_DAY_WINDOW {
                    self.prior_days.pop_front();
                }
                self.current = Some(DayAccumulator::start(day, bar));
                debug!(
                    completed = %completed.day,
                    new_day = %day,
                    prior_days = self.prior_days.len(),
                    "trading day rolled over"
                );
                Some(DayBoundaryEvent {
                    completed,
                    new_day: day,
                })
            }
        }
    }

    /// Completed days, oldest first, at most [`PRIOR_DAY_WINDOW`].
    pub fn recent_days(&self) -> Vec<DaySummary> {
        self.prior_days.iter().copied().collect()
    }

    /// The most recently completed day.
    pub fn last_prior(&self) -> Option<DaySummary> {
        self.prior_days.back().copied()
    }

    /// Trading day of the accumulator currently open, if any.
    pub fn current_day(&self) -> Option<NaiveDate> {
        self.current.map(|acc| acc.day)
    }

    /// Official open of the current day (its first bar's open).
    pub fn current_open(&self) -> Option<f64> {
        self.current.map(|acc| acc.open)
    }

    /// Running OHLC snapshot of the current day.
    pub fn current_summary(&self) -> Option<DaySummary> {
        self.current.map(|acc| acc.summary())
    }

    /// Whether enough completed days exist to compute a range.
    ///
    /// One completed day suffices in both modes: three-day mode degrades to a
    /// one-day range until the window fills (see `range::compute_range`).
    pub fn can_calculate(&self, _mode: RangeMode) -> bool {
        !self.prior_days.is_empty()
    }
}
