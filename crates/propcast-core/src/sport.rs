// Sports, stat shapes, and the season-year calendar.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Leagues the engine knows how to model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sport {
    Nba,
    Wnba,
    Mlb,
}

/// The box-score shape a sport's per-game rows take. Sports sharing a shape
/// share a stat table and a `StatAverage` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatShape {
    Basketball,
    Batting,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::Nba => "nba",
            Sport::Wnba => "wnba",
            Sport::Mlb => "mlb",
        }
    }

    pub fn shape(&self) -> StatShape {
        match self {
            Sport::Nba | Sport::Wnba => StatShape::Basketball,
            Sport::Mlb => StatShape::Batting,
        }
    }

    /// Month and day on which a new season year begins.
    fn boundary(&self) -> (u32, u32) {
        match self {
            Sport::Nba => (10, 1),
            Sport::Wnba | Sport::Mlb => (1, 1),
        }
    }

    /// Season year a date belongs to. NBA seasons are named after the
    /// calendar year they finish in, so October onward rolls forward.
    pub fn season_year(&self, date: NaiveDate) -> i32 {
        let (month, day) = self.boundary();
        if (month, day) == (1, 1) {
            return date.year();
        }
        if (date.month(), date.day()) >= (month, day) {
            date.year() + 1
        } else {
            date.year()
        }
    }

    /// First day of the given season year.
    pub fn season_start(&self, season_year: i32) -> Option<NaiveDate> {
        let (month, day) = self.boundary();
        let calendar_year = if (month, day) == (1, 1) {
            season_year
        } else {
            season_year - 1
        };
        NaiveDate::from_ymd_opt(calendar_year, month, day)
    }

    /// Partition `[start, end)` into consecutive season-year windows. The end
    /// date is excluded so a window never contains the day being predicted.
    pub fn season_windows(&self, start: NaiveDate, end: NaiveDate) -> Vec<SeasonWindow> {
        let mut windows = Vec::new();
        let mut from = start;
        while from < end {
            let season_year = self.season_year(from);
            let Some(next_season) = self.season_start(season_year + 1) else {
                break;
            };
            let until = next_season.min(end);
            windows.push(SeasonWindow {
                season_year,
                from,
                until,
            });
            from = until;
        }
        windows
    }
}

impl fmt::Display for Sport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sport {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nba" => Ok(Sport::Nba),
            "wnba" => Ok(Sport::Wnba),
            "mlb" => Ok(Sport::Mlb),
            other => Err(format!("unknown sport '{other}'")),
        }
    }
}

/// A half-open `[from, until)` date range belonging to one season year.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonWindow {
    pub season_year: i32,
    pub from: NaiveDate,
    pub until: NaiveDate,
}
