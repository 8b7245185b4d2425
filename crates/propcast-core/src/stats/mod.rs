// Per-game stat averages: basketball and baseball batting shapes behind a
// single `StatAverage` sum type.

pub mod average;
pub mod baseball;
pub mod basketball;

pub use average::StatAverage;
pub use baseball::BattingAvg;
pub use basketball::BasketballAvg;

use crate::sport::StatShape;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StatError {
    #[error("cannot combine {left:?} averages with {right:?} averages")]
    SportMismatch { left: StatShape, right: StatShape },
}

// ---------------------------------------------------------------------------
// Shared arithmetic
// ---------------------------------------------------------------------------

/// A fixed set of named per-game statistics with one rate-basis stat.
///
/// `values()` and `from_values()` use the order of `NAMES`, which lets the
/// arithmetic below be written once for every shape.
pub(crate) trait StatLine: Copy {
    const NAMES: &'static [&'static str];
    /// Index of the rate-basis statistic within `NAMES`.
    const BASIS: usize;
    /// Indices of statistics that are already rates and skip basis scaling.
    const RATE_STATS: &'static [usize];

    fn num_games(&self) -> u32;
    fn values(&self) -> Vec<f64>;
    fn from_values(num_games: u32, values: &[f64]) -> Self;

    fn scales_with_basis(index: usize) -> bool {
        index != Self::BASIS && !Self::RATE_STATS.contains(&index)
    }
}

/// Fractional change from `control` to `value`. A zero control yields 0.0
/// so no non-finite value leaves the comparison.
pub fn pct_change(control: f64, value: f64) -> f64 {
    if control == 0.0 {
        return 0.0;
    }
    (value - control) / control
}

pub(crate) fn weighted_mean<T: StatLine>(a: &T, b: &T) -> T {
    let (ga, gb) = (a.num_games() as f64, b.num_games() as f64);
    let total = ga + gb;
    let values: Vec<f64> = a
        .values()
        .iter()
        .zip(b.values())
        .map(|(x, y)| (x * ga + y * gb) / total)
        .collect();
    T::from_values(a.num_games() + b.num_games(), &values)
}

pub(crate) fn compare<T: StatLine>(value: &T, control: &T) -> T {
    let values: Vec<f64> = value
        .values()
        .iter()
        .zip(control.values())
        .map(|(v, c)| pct_change(c, *v))
        .collect();
    T::from_values(value.num_games(), &values)
}

pub(crate) fn to_per<T: StatLine>(line: &T) -> T {
    let values = line.values();
    let basis = values[T::BASIS];
    let per: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(i, v)| {
            if !T::scales_with_basis(i) {
                *v
            } else if basis == 0.0 {
                0.0
            } else {
                v / basis
            }
        })
        .collect();
    T::from_values(line.num_games(), &per)
}

pub(crate) fn to_stats<T: StatLine>(line: &T) -> T {
    let values = line.values();
    let basis = values[T::BASIS];
    let totals: Vec<f64> = values
        .iter()
        .enumerate()
        .map(|(i, v)| if T::scales_with_basis(i) { v * basis } else { *v })
        .collect();
    T::from_values(line.num_games(), &totals)
}

pub(crate) fn predict<T: StatLine>(per: &T, factor: &T) -> T {
    let values = per.values();
    let factors = factor.values();
    let basis = values[T::BASIS];
    let predicted_basis = basis + basis * factors[T::BASIS];
    let predicted: Vec<f64> = values
        .iter()
        .zip(&factors)
        .enumerate()
        .map(|(i, (v, f))| {
            if i == T::BASIS {
                predicted_basis
            } else if T::RATE_STATS.contains(&i) {
                v + v * f
            } else {
                (v + v * f) * predicted_basis
            }
        })
        .collect();
    T::from_values(factor.num_games(), &predicted)
}
