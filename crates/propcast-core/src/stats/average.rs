// The sport-agnostic stat average used by the whole engine.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{compare, predict, to_per, to_stats, weighted_mean, StatError, StatLine};
use super::{BasketballAvg, BattingAvg};
use crate::sport::StatShape;

/// Per-game (or per-unit, or percentage-change) statistics for one player
/// over `num_games` games. `num_games == 0` marks an invalid value, which is
/// the identity element of [`StatAverage::add_avg`].
///
/// Downstream code reads values through [`StatAverage::stats`] and never
/// needs to match on the variant.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum StatAverage {
    Basketball(BasketballAvg),
    Batting(BattingAvg),
}

impl StatAverage {
    /// An invalid (zero-game, all-zero) value of the given shape.
    pub fn invalid(shape: StatShape) -> Self {
        match shape {
            StatShape::Basketball => StatAverage::Basketball(BasketballAvg::default()),
            StatShape::Batting => StatAverage::Batting(BattingAvg::default()),
        }
    }

    /// Stat names of a shape, in storage order.
    pub fn names(shape: StatShape) -> &'static [&'static str] {
        match shape {
            StatShape::Basketball => BasketballAvg::NAMES,
            StatShape::Batting => BattingAvg::NAMES,
        }
    }

    /// Name of a shape's rate-basis statistic (minutes, plate appearances).
    pub fn basis_stat(shape: StatShape) -> &'static str {
        match shape {
            StatShape::Basketball => BasketballAvg::NAMES[BasketballAvg::BASIS],
            StatShape::Batting => BattingAvg::NAMES[BattingAvg::BASIS],
        }
    }

    /// Build a value from stats listed in [`StatAverage::names`] order.
    /// Returns `None` when the number of values does not match the shape.
    pub fn from_values(shape: StatShape, num_games: u32, values: &[f64]) -> Option<StatAverage> {
        if values.len() != Self::names(shape).len() {
            return None;
        }
        Some(match shape {
            StatShape::Basketball => {
                StatAverage::Basketball(BasketballAvg::from_values(num_games, values))
            }
            StatShape::Batting => StatAverage::Batting(BattingAvg::from_values(num_games, values)),
        })
    }

    pub fn shape(&self) -> StatShape {
        match self {
            StatAverage::Basketball(_) => StatShape::Basketball,
            StatAverage::Batting(_) => StatShape::Batting,
        }
    }

    pub fn num_games(&self) -> u32 {
        match self {
            StatAverage::Basketball(a) => a.num_games(),
            StatAverage::Batting(a) => a.num_games(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.num_games() > 0
    }

    /// Every named statistic as a flat map keyed by stat name.
    pub fn stats(&self) -> BTreeMap<&'static str, f64> {
        fn collect<T: StatLine>(line: &T) -> BTreeMap<&'static str, f64> {
            T::NAMES.iter().copied().zip(line.values()).collect()
        }
        match self {
            StatAverage::Basketball(a) => collect(a),
            StatAverage::Batting(a) => collect(a),
        }
    }

    /// A single statistic by name.
    pub fn stat(&self, name: &str) -> Option<f64> {
        self.stats().get(name).copied()
    }

    pub fn basis_name(&self) -> &'static str {
        Self::basis_stat(self.shape())
    }

    /// Value of the rate-basis statistic.
    pub fn basis(&self) -> f64 {
        match self {
            StatAverage::Basketball(a) => a.values()[BasketballAvg::BASIS],
            StatAverage::Batting(a) => a.values()[BattingAvg::BASIS],
        }
    }

    fn mismatch(&self, other: &StatAverage) -> StatError {
        StatError::SportMismatch {
            left: self.shape(),
            right: other.shape(),
        }
    }

    /// Game-weighted mean of two averages.
    ///
    /// An invalid operand on either side is ignored and the other operand is
    /// returned unchanged; two invalid operands return `self`.
    pub fn add_avg(&self, other: &StatAverage) -> Result<StatAverage, StatError> {
        if self.shape() != other.shape() {
            return Err(self.mismatch(other));
        }
        if !other.is_valid() {
            return Ok(*self);
        }
        if !self.is_valid() {
            return Ok(*other);
        }
        match (self, other) {
            (StatAverage::Basketball(a), StatAverage::Basketball(b)) => {
                Ok(StatAverage::Basketball(weighted_mean(a, b)))
            }
            (StatAverage::Batting(a), StatAverage::Batting(b)) => {
                Ok(StatAverage::Batting(weighted_mean(a, b)))
            }
            _ => Err(self.mismatch(other)),
        }
    }

    /// Fractional change of every statistic relative to `control`. The
    /// result keeps `self`'s game count so it can be folded by weight.
    pub fn compare_avg(&self, control: &StatAverage) -> Result<StatAverage, StatError> {
        if self.shape() != control.shape() {
            return Err(self.mismatch(control));
        }
        if !self.is_valid() {
            return Ok(*self);
        }
        match (self, control) {
            (StatAverage::Basketball(a), StatAverage::Basketball(c)) => {
                Ok(StatAverage::Basketball(compare(a, c)))
            }
            (StatAverage::Batting(a), StatAverage::Batting(c)) => {
                Ok(StatAverage::Batting(compare(a, c)))
            }
            _ => Err(self.mismatch(control)),
        }
    }

    /// Per-game totals to per-unit-of-basis rates.
    pub fn convert_to_per(&self) -> StatAverage {
        if !self.is_valid() {
            return *self;
        }
        match self {
            StatAverage::Basketball(a) => StatAverage::Basketball(to_per(a)),
            StatAverage::Batting(a) => StatAverage::Batting(to_per(a)),
        }
    }

    /// Per-unit rates back to per-game totals.
    pub fn convert_to_stats(&self) -> StatAverage {
        if !self.is_valid() {
            return *self;
        }
        match self {
            StatAverage::Basketball(a) => StatAverage::Basketball(to_stats(a)),
            StatAverage::Batting(a) => StatAverage::Batting(to_stats(a)),
        }
    }

    /// Apply a matchup factor to a per-unit control average, producing a
    /// per-game prediction. The basis compounds first and every counting
    /// stat is scaled by the predicted basis. The result carries the
    /// factor's game count.
    pub fn predict_stats(&self, factor: &StatAverage) -> Result<StatAverage, StatError> {
        match (self, factor) {
            (StatAverage::Basketball(a), StatAverage::Basketball(f)) => {
                Ok(StatAverage::Basketball(predict(a, f)))
            }
            (StatAverage::Batting(a), StatAverage::Batting(f)) => {
                Ok(StatAverage::Batting(predict(a, f)))
            }
            _ => Err(self.mismatch(factor)),
        }
    }
}
