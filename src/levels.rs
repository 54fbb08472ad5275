// =============================================================================
// Level Engine — pure (range, base) -> level ladder evaluation
// =============================================================================
//
// Prices every entry of a ratio table against a range and base price:
//
//   price = round_to_tick(base + sign * ratio * range)
//
// The function is pure and deterministic; identical inputs yield
// bit-identical maps, which is what lets the persistence store reuse saved
// ladders verbatim. Degenerate inputs (non-positive or non-finite range or
// base) yield an empty map — a valid renderable-as-nothing state, never an
// error.
// =============================================================================

use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;

use crate::recipe::RatioTable;
use crate::types::LevelName;

/// Round `value` to the nearest multiple of `tick`.
///
/// This is the single rounding convention for the whole engine; the
/// quarter-point banding seen on some instruments is just `tick = 0.25`.
/// `tick <= 0` disables rounding. Idempotent: rounding an already-rounded
/// value is a no-op.
pub fn round_to_tick(value: f64, tick: f64) -> f64 {
    if tick > 0.0 {
        (value / tick).round() * tick
    } else {
        value
    }
}

/// Price every level of `table` for the given range and base.
///
/// Returns an empty map when `range` or `base` is non-positive or
/// non-finite.
pub fn compute_levels(
    range: f64,
    base: f64,
    table: &RatioTable,
    tick: f64,
) -> BTreeMap<LevelName, f64> {
    if !range.is_finite() || range <= 0.0 || !base.is_finite() || base <= 0.0 {
        return BTreeMap::new();
    }

    table
        .specs()
        .iter()
        .map(|spec| {
            (
                spec.name,
                round_to_tick(base + spec.coefficient() * range, tick),
            )
        })
        .collect()
}

// =============================================================================
// LevelMemo
// =============================================================================

/// Memoized wrapper around [`compute_levels`] keyed by the exact bit
/// patterns of `(range, base)`.
///
/// An instance is bound to one table + tick, so the key needs nothing more.
/// The map is mutex-guarded: the engine itself is single-writer, but the
/// memo stays correct if a host shares it across threads.
pub struct LevelMemo {
    cache: Mutex<HashMap<(u64, u64), BTreeMap<LevelName, f64>>>,
}

impl LevelMemo {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Compute (or replay) the ladder for `(range, base)`.
    pub fn compute(
        &self,
        range: f64,
        base: f64,
        table: &RatioTable,
        tick: f64,
    ) -> BTreeMap<LevelName, f64> {
        let key = (range.to_bits(), base.to_bits());
        if let Some(hit) = self.cache.lock().get(&key) {
            return hit.clone();
        }
        let levels = compute_levels(range, base, table, tick);
        self.cache.lock().insert(key, levels.clone());
        levels
    }

    /// Number of distinct `(range, base)` pairs cached.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }

    pub fn clear(&self) {
        self.cache.lock().clear();
    }
}

impl Default for LevelMemo {
    fn default() -> Self {
        Self::new()
    }
}
