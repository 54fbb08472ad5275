// =============================================================================
// Level Recipes — ratio tables mapping level names to range fractions
// =============================================================================
//
// A recipe is pure data: an ordered list of `{name, ratio, sign}` entries
// where each level prices out as
//
//   price = base + sign * ratio * range
//
// New recipes are added by building a new table, never by branching inside
// the level engine. Two tables ship built in: the dominant quadrant recipe
// and a quarter-extension variant that only differs in its Std offsets.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::types::LevelName;

/// Direction of a level's offset from the base price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    Plus,
    Minus,
}

impl Sign {
    pub fn multiplier(self) -> f64 {
        match self {
            Self::Plus => 1.0,
            Self::Minus => -1.0,
        }
    }
}

/// One entry of a level recipe.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelSpec {
    pub name: LevelName,
    /// Fraction of the day's range, always non-negative.
    pub ratio: f64,
    pub sign: Sign,
}

impl LevelSpec {
    pub fn new(name: LevelName, ratio: f64, sign: Sign) -> Self {
        Self { name, ratio, sign }
    }

    /// Signed base-relative coefficient: `sign * ratio`.
    pub fn coefficient(&self) -> f64 {
        self.sign.multiplier() * self.ratio
    }
}

/// An injectable level recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioTable {
    /// Short identifier used in logs and in the persistence fingerprint.
    pub id: String,
    specs: Vec<LevelSpec>,
}

impl RatioTable {
    /// Build a custom table. Call [`validate`](Self::validate) before use.
    pub fn new(id: impl Into<String>, specs: Vec<LevelSpec>) -> Self {
        Self {
            id: id.into(),
            specs,
        }
    }

    /// The dominant recipe.
    ///
    /// Q1/Q4 sit half a range above/below the base, the interior levels are
    /// the classic offsets from Q1/Q4 (TC/TV at 0.0855R, NR1/NR3 at 0.159R,
    /// Q2/Q3 at 0.25R) collapsed to base-relative form, ZSell/ZBuy frame the
    /// base at 0.0855R, and the extensions run Std1..Std3 at
    /// {0.0855, 0.171, 0.342} beyond Q1/Q4 out to the 1D bounds at one full
    /// range.
    pub fn quadrant() -> Self {
        use LevelName::*;
        Self::new(
            "quadrant",
            vec![
                LevelSpec::new(OneDayMinus, 1.0, Sign::Minus),
                LevelSpec::new(Std3Minus, 0.842, Sign::Minus),
                LevelSpec::new(Std2Minus, 0.671, Sign::Minus),
                LevelSpec::new(Std1Minus, 0.5855, Sign::Minus),
                LevelSpec::new(Q4, 0.5, Sign::Minus),
                LevelSpec::new(TV, 0.4145, Sign::Minus),
                LevelSpec::new(NR3, 0.341, Sign::Minus),
                LevelSpec::new(Q3, 0.25, Sign::Minus),
                LevelSpec::new(ZBuy, 0.0855, Sign::Minus),
                LevelSpec::new(NR2, 0.0, Sign::Plus),
                LevelSpec::new(ZSell, 0.0855, Sign::Plus),
                LevelSpec::new(Q2, 0.25, Sign::Plus),
                LevelSpec::new(NR1, 0.341, Sign::Plus),
                LevelSpec::new(TC, 0.4145, Sign::Plus),
                LevelSpec::new(Q1, 0.5, Sign::Plus),
                LevelSpec::new(Std1Plus, 0.5855, Sign::Plus),
                LevelSpec::new(Std2Plus, 0.671, Sign::Plus),
                LevelSpec::new(Std3Plus, 0.842, Sign::Plus),
                LevelSpec::new(OneDayPlus, 1.0, Sign::Plus),
            ],
        )
    }

    /// Variant recipe with Std extensions at {0.125, 0.25, 0.375} beyond
    /// Q1/Q4 instead of the quadrant offsets. Interior levels are unchanged.
    pub fn quarter_extensions() -> Self {
        use LevelName::*;
        Self::new(
            "quarter-extensions",
            vec![
                LevelSpec::new(OneDayMinus, 1.0, Sign::Minus),
                LevelSpec::new(Std3Minus, 0.875, Sign::Minus),
                LevelSpec::new(Std2Minus, 0.75, Sign::Minus),
                LevelSpec::new(Std1Minus, 0.625, Sign::Minus),
                LevelSpec::new(Q4, 0.5, Sign::Minus),
                LevelSpec::new(TV, 0.4145, Sign::Minus),
                LevelSpec::new(NR3, 0.341, Sign::Minus),
                LevelSpec::new(Q3, 0.25, Sign::Minus),
                LevelSpec::new(ZBuy, 0.0855, Sign::Minus),
                LevelSpec::new(NR2, 0.0, Sign::Plus),
                LevelSpec::new(ZSell, 0.0855, Sign::Plus),
                LevelSpec::new(Q2, 0.25, Sign::Plus),
                LevelSpec::new(NR1, 0.341, Sign::Plus),
                LevelSpec::new(TC, 0.4145, Sign::Plus),
                LevelSpec::new(Q1, 0.5, Sign::Plus),
                LevelSpec::new(Std1Plus, 0.625, Sign::Plus),
                LevelSpec::new(Std2Plus, 0.75, Sign::Plus),
                LevelSpec::new(Std3Plus, 0.875, Sign::Plus),
                LevelSpec::new(OneDayPlus, 1.0, Sign::Plus),
            ],
        )
    }

    pub fn specs(&self) -> &[LevelSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Reject tables the level engine cannot price deterministically:
    /// empty tables, non-finite or negative ratios, duplicate names.
    pub fn validate(&self) -> Result<()> {
        if self.specs.is_empty() {
            bail!("recipe '{}' has no level specs", self.id);
        }
        let mut seen: Vec<LevelName> = Vec::with_capacity(self.specs.len());
        for spec in &self.specs {
            if !spec.ratio.is_finite() || spec.ratio < 0.0 {
                bail!(
                    "recipe '{}': level {} has invalid ratio {}",
                    self.id,
                    spec.name,
                    spec.ratio
                );
            }
            if seen.contains(&spec.name) {
                bail!("recipe '{}': duplicate level {}", self.id, spec.name);
            }
            seen.push(spec.name);
        }
        Ok(())
    }
}
