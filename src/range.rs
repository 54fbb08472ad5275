// =============================================================================
// Range Calculation — effective high-low spread feeding the level ladder
// =============================================================================
//
// Range = high-low spread of the last completed day (or the widest spread
// across the last three), optionally widened by an opening-gap adjustment.
//
//   OneDay:    range = prior.high - prior.low
//   ThreeDays: range = max(high over last 3) - min(low over last 3)
//
// Three-day mode with fewer than three completed sessions falls back to the
// one-day range and flags the summary as degraded. A non-positive final
// range yields no result; the caller keeps showing the previous day's
// levels.
// =============================================================================

use tracing::debug;

use crate::config::{GapMode, RangeMode};
use crate::types::DaySummary;

/// Effective range for a day's level ladder plus how it was derived.
#[derive(Debug, Clone, PartialEq)]
pub struct RangeSummary {
    pub range: f64,
    /// Human-readable derivation, surfaced in logs and host tooltips.
    pub description: String,
    /// True when three-day mode ran short of sessions and fell back.
    pub degraded: bool,
}

/// Compute the effective range from the completed days (oldest first).
///
/// `current_open` is the new day's official open, used by the computed gap
/// modes; when it is not yet known those modes skip the adjustment.
///
/// Returns `None` when no completed day exists or the final range is not a
/// positive finite number.
pub fn compute_range(
    prior: &[DaySummary],
    current_open: Option<f64>,
    range_mode: RangeMode,
    gap_mode: GapMode,
) -> Option<RangeSummary> {
    let last = match prior.last() {
        Some(last) => last,
        None => {
            debug!("range unavailable: no completed sessions");
            return None;
        }
    };

    let (raw, degraded, mut description) = match range_mode {
        RangeMode::OneDay => (
            last.spread(),
            false,
            format!("1-day range {:.2} ({})", last.spread(), last.day),
        ),
        RangeMode::ThreeDays if prior.len() >= 3 => {
            let window = &prior[prior.len() - 3..];
            let high = window.iter().map(|d| d.high).fold(f64::MIN, f64::max);
            let low = window.iter().map(|d| d.low).fold(f64::MAX, f64::min);
            (
                high - low,
                false,
                format!(
                    "3-day range {:.2} ({}..{})",
                    high - low,
                    window[0].day,
                    window[2].day
                ),
            )
        }
        RangeMode::ThreeDays => (
            last.spread(),
            true,
            format!(
                "1-day range {:.2} ({}; degraded, {} of 3 sessions)",
                last.spread(),
                last.day,
                prior.len()
            ),
        ),
    };

    let gap = match gap_mode {
        GapMode::Disabled => 0.0,
        GapMode::Manual(value) => value,
        GapMode::AbsoluteAdd | GapMode::HalfAdd => match current_open {
            Some(open) => {
                let gap = (open - last.close).abs();
                if matches!(gap_mode, GapMode::HalfAdd) {
                    gap / 2.0
                } else {
                    gap
                }
            }
            None => {
                debug!(gap_mode = %gap_mode, "gap adjustment skipped: current open not yet known");
                0.0
            }
        },
    };

    if gap != 0.0 {
        description.push_str(&format!(" + gap {gap:.2} ({gap_mode})"));
    }

    let range = raw + gap;
    if !range.is_finite() || range <= 0.0 {
        debug!(range, "range unavailable: non-positive or non-finite");
        return None;
    }

    Some(RangeSummary {
        range,
        description,
        degraded,
    })
}
