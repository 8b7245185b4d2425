// Prediction engine: matchup factors, outlier flags, per-game analysis,
// pick selection and historical replay.

pub mod backtest;
pub mod matchup;
pub mod outliers;
pub mod predictor;
pub mod selector;
