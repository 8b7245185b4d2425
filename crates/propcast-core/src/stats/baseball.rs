// Baseball batting per-game averages. Plate appearances are the rate basis;
// the slash-line stats (BA/OBP/SLG/OPS) are already rates.

use serde::{Deserialize, Serialize};

use super::StatLine;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BattingAvg {
    pub num_games: u32,
    pub at_bats: f64,
    pub runs: f64,
    pub hits: f64,
    pub rbis: f64,
    pub home_runs: f64,
    pub walks: f64,
    pub strikeouts: f64,
    pub pas: f64,
    pub pitches: f64,
    pub strikes: f64,
    pub ba: f64,
    pub obp: f64,
    pub slg: f64,
    pub ops: f64,
    pub wpa: f64,
}

impl StatLine for BattingAvg {
    const NAMES: &'static [&'static str] = &[
        "at_bats",
        "runs",
        "hits",
        "rbis",
        "home_runs",
        "walks",
        "strikeouts",
        "pas",
        "pitches",
        "strikes",
        "ba",
        "obp",
        "slg",
        "ops",
        "wpa",
    ];
    const BASIS: usize = 7;
    const RATE_STATS: &'static [usize] = &[10, 11, 12, 13];

    fn num_games(&self) -> u32 {
        self.num_games
    }

    fn values(&self) -> Vec<f64> {
        vec![
            self.at_bats,
            self.runs,
            self.hits,
            self.rbis,
            self.home_runs,
            self.walks,
            self.strikeouts,
            self.pas,
            self.pitches,
            self.strikes,
            self.ba,
            self.obp,
            self.slg,
            self.ops,
            self.wpa,
        ]
    }

    fn from_values(num_games: u32, v: &[f64]) -> Self {
        BattingAvg {
            num_games,
            at_bats: v[0],
            runs: v[1],
            hits: v[2],
            rbis: v[3],
            home_runs: v[4],
            walks: v[5],
            strikeouts: v[6],
            pas: v[7],
            pitches: v[8],
            strikes: v[9],
            ba: v[10],
            obp: v[11],
            slg: v[12],
            ops: v[13],
            wpa: v[14],
        }
    }
}
