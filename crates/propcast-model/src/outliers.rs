// Outlier detection: statistics whose prediction strays far from the
// player's current-season line.

use std::collections::BTreeMap;

use propcast_core::odds::Side;
use propcast_core::stats::StatAverage;

/// Fractional deviation beyond which a prediction is flagged.
pub const OUTLIER_THRESHOLD: f64 = 0.2;

/// Stat name -> signed fractional deviation of the prediction from base.
pub type Outliers = BTreeMap<String, f64>;

/// Flag every statistic where `|(predicted - base) / base| > 0.2`.
///
/// A zero base has no meaningful relative deviation and is never flagged.
pub fn get_outliers(base: &StatAverage, predicted: &StatAverage) -> Outliers {
    let base_stats = base.stats();
    let mut outliers = Outliers::new();
    for (stat, value) in predicted.stats() {
        let Some(&control) = base_stats.get(stat) else {
            continue;
        };
        if control == 0.0 {
            continue;
        }
        let pct = (value - control) / control;
        if pct.abs() > OUTLIER_THRESHOLD {
            outliers.insert(stat.to_string(), pct);
        }
    }
    outliers
}

/// True when `stat` is flagged in the direction of `side`.
pub fn has_outlier(outliers: &Outliers, stat: &str, side: Side) -> bool {
    match (outliers.get(stat), side) {
        (Some(&pct), Side::Over) => pct > 0.0,
        (Some(&pct), Side::Under) => pct < 0.0,
        (None, _) => false,
    }
}
