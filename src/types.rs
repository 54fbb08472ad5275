// =============================================================================
// Shared types used across the Aurora level engine
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A single OHLC bar from the host's data feed.
///
/// Bars are immutable once emitted. The engine resolves each bar's trading
/// day from `time` via the session calendar; it never assumes the timestamp's
/// calendar date is the trading day.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl DailyBar {
    /// OHLC sanity check: all values finite, `high >= low`, and high/low
    /// enclosing both open and close.
    ///
    /// A bar failing this check is a data-quality error upstream; the engine
    /// logs and skips it without mutating any state.
    pub fn is_well_formed(&self) -> bool {
        [self.open, self.high, self.low, self.close]
            .iter()
            .all(|v| v.is_finite())
            && self.high >= self.low
            && self.high >= self.open.max(self.close)
            && self.low <= self.open.min(self.close)
    }
}

/// OHLC snapshot of a completed trading day, as accumulated by the session
/// tracker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DaySummary {
    pub day: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl DaySummary {
    /// High-low spread of this day.
    pub fn spread(&self) -> f64 {
        self.high - self.low
    }
}

// =============================================================================
// Level names
// =============================================================================

/// The closed set of level names drawn by the overlay indicators.
///
/// Variants are declared in ascending price order for the dominant recipe, so
/// `BTreeMap<LevelName, f64>` iterates the ladder bottom-to-top. Serialized
/// form matches the chart labels (`"Q1"`, `"Std1+"`, `"1D-"`, ...).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum LevelName {
    #[serde(rename = "1D-")]
    OneDayMinus,
    #[serde(rename = "Std3-")]
    Std3Minus,
    #[serde(rename = "Std2-")]
    Std2Minus,
    #[serde(rename = "Std1-")]
    Std1Minus,
    Q4,
    TV,
    NR3,
    Q3,
    ZBuy,
    NR2,
    ZSell,
    Q2,
    NR1,
    TC,
    Q1,
    #[serde(rename = "Std1+")]
    Std1Plus,
    #[serde(rename = "Std2+")]
    Std2Plus,
    #[serde(rename = "Std3+")]
    Std3Plus,
    #[serde(rename = "1D+")]
    OneDayPlus,
}

impl LevelName {
    /// Chart label for this level, identical to its serialized form.
    pub fn label(&self) -> &'static str {
        match self {
            Self::OneDayMinus => "1D-",
            Self::Std3Minus => "Std3-",
            Self::Std2Minus => "Std2-",
            Self::Std1Minus => "Std1-",
            Self::Q4 => "Q4",
            Self::TV => "TV",
            Self::NR3 => "NR3",
            Self::Q3 => "Q3",
            Self::ZBuy => "ZBuy",
            Self::NR2 => "NR2",
            Self::ZSell => "ZSell",
            Self::Q2 => "Q2",
            Self::NR1 => "NR1",
            Self::TC => "TC",
            Self::Q1 => "Q1",
            Self::Std1Plus => "Std1+",
            Self::Std2Plus => "Std2+",
            Self::Std3Plus => "Std3+",
            Self::OneDayPlus => "1D+",
        }
    }
}

impl std::fmt::Display for LevelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

// =============================================================================
// Level sets
// =============================================================================

/// The computed level ladder for one trading day.
///
/// `start_bar` / `end_bar` are opaque sequence positions owned by the caller
/// (the renderer maps them to screen space); the engine only stamps them.
/// A set stays mutable while its day is the current one and is frozen once it
/// is archived into the history cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSet {
    pub day: NaiveDate,
    pub start_bar: usize,
    pub end_bar: usize,
    pub levels: BTreeMap<LevelName, f64>,
}

impl LevelSet {
    /// Create a set starting (and for now ending) at `bar_index`.
    pub fn new(day: NaiveDate, bar_index: usize, levels: BTreeMap<LevelName, f64>) -> Self {
        Self {
            day,
            start_bar: bar_index,
            end_bar: bar_index,
            levels,
        }
    }

    /// Price of a single level, if present in this set's recipe.
    pub fn get(&self, name: LevelName) -> Option<f64> {
        self.levels.get(&name).copied()
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
