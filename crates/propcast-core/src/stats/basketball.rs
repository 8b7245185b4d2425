// Basketball (NBA/WNBA) per-game averages. Minutes are the rate basis.

use serde::{Deserialize, Serialize};

use super::StatLine;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BasketballAvg {
    pub num_games: u32,
    pub minutes: f64,
    pub points: f64,
    pub rebounds: f64,
    pub assists: f64,
    pub threes: f64,
    pub usg: f64,
    pub ortg: f64,
    pub drtg: f64,
}

impl StatLine for BasketballAvg {
    const NAMES: &'static [&'static str] = &[
        "minutes", "points", "rebounds", "assists", "threes", "usg", "ortg", "drtg",
    ];
    const BASIS: usize = 0;
    const RATE_STATS: &'static [usize] = &[];

    fn num_games(&self) -> u32 {
        self.num_games
    }

    fn values(&self) -> Vec<f64> {
        vec![
            self.minutes,
            self.points,
            self.rebounds,
            self.assists,
            self.threes,
            self.usg,
            self.ortg,
            self.drtg,
        ]
    }

    fn from_values(num_games: u32, v: &[f64]) -> Self {
        BasketballAvg {
            num_games,
            minutes: v[0],
            points: v[1],
            rebounds: v[2],
            assists: v[3],
            threes: v[4],
            usg: v[5],
            ortg: v[6],
            drtg: v[7],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn values_follow_name_order() {
        let avg = BasketballAvg {
            num_games: 3,
            minutes: 30.0,
            points: 20.0,
            rebounds: 10.0,
            assists: 5.0,
            threes: 2.0,
            usg: 25.0,
            ortg: 110.0,
            drtg: 105.0,
        };
        let values = avg.values();
        assert_eq!(values.len(), BasketballAvg::NAMES.len());
        assert_eq!(BasketballAvg::NAMES[1], "points");
        assert_eq!(values[1], 20.0);
        assert_eq!(BasketballAvg::from_values(3, &values), avg);
    }
}
