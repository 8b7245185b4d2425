// Records exchanged with the persistence layer and the `StatStore` seam the
// prediction engine reads and writes through.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::odds::{AltLineMap, LineMap};
use crate::sport::{SeasonWindow, Sport};
use crate::stats::StatAverage;

/// How an other player's participation filters a player's game sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Relationship {
    /// Both players appeared in the game, on opposing teams.
    Opponent,
    /// The player appeared and the other player did not appear at all.
    Teammate,
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relationship::Opponent => f.write_str("opponent"),
            Relationship::Teammate => f.write_str("teammate"),
        }
    }
}

impl FromStr for Relationship {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "opponent" => Ok(Relationship::Opponent),
            "teammate" => Ok(Relationship::Teammate),
            other => Err(format!("unknown relationship '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub id: i64,
    pub sport: Sport,
    pub date: NaiveDate,
    pub home_index: String,
    pub away_index: String,
    pub home_score: i32,
    pub away_score: i32,
}

/// A player's slot on a team's current roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub sport: Sport,
    pub player_index: String,
    pub team_index: String,
    pub status: String,
    pub avg_minutes: f64,
}

impl RosterEntry {
    pub const AVAILABLE: &'static str = "Available";

    pub fn is_available(&self) -> bool {
        self.status == Self::AVAILABLE
    }
}

/// Players who appeared in a game, split by side and ordered by the rate
/// basis played (most first).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GamePlayers {
    pub home: Vec<String>,
    pub away: Vec<String>,
}

/// A persisted forecast for one player's game on `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub player_index: String,
    pub date: NaiveDate,
    pub version: u32,
    pub sport: Sport,
    pub average: StatAverage,
}

/// Everything the engine needs from the relational store.
///
/// Aggregate queries return an invalid [`StatAverage`] when no game
/// qualifies; they never error for an empty sample.
pub trait StatStore {
    /// Per-game average over `window`, counting only games where the rate
    /// basis exceeds `min_basis`.
    fn season_average(
        &self,
        sport: Sport,
        player: &str,
        window: &SeasonWindow,
        min_basis: f64,
    ) -> Result<StatAverage>;

    /// As [`StatStore::season_average`], further restricted by how `other`
    /// took part in each game.
    fn season_average_with(
        &self,
        sport: Sport,
        player: &str,
        other: &str,
        relationship: Relationship,
        window: &SeasonWindow,
        min_basis: f64,
    ) -> Result<StatAverage>;

    /// Single-game stat lines (`num_games == 1`) for every player who
    /// appeared on `date`. Lines are dated, not tied to a game, so a player
    /// with two games that day (a doubleheader) is scored on the first one.
    fn realized_stats(&self, sport: Sport, date: NaiveDate)
        -> Result<HashMap<String, StatAverage>>;

    fn games_for_date(&self, sport: Sport, date: NaiveDate) -> Result<Vec<Game>>;

    fn players_for_game(&self, sport: Sport, game: &Game) -> Result<GamePlayers>;

    /// Pitchers who appeared in an MLB game, most innings first.
    fn pitchers_for_game(&self, game: &Game) -> Result<GamePlayers>;

    /// Whether `player` has any stored pitching line.
    fn has_pitched(&self, player: &str) -> Result<bool>;

    /// Current roster entries keyed by team index, most minutes first.
    fn active_rosters(&self, sport: Sport) -> Result<HashMap<String, Vec<RosterEntry>>>;

    fn lines_for_date(&self, sport: Sport, date: NaiveDate, stats: &[String]) -> Result<LineMap>;

    fn alternate_lines_for_date(
        &self,
        sport: Sport,
        date: NaiveDate,
        stats: &[String],
    ) -> Result<AltLineMap>;

    /// Insert or overwrite predictions keyed on (player, date, version).
    fn upsert_predictions(&self, records: &[Prediction]) -> Result<()>;

    fn get_prediction(
        &self,
        player: &str,
        date: NaiveDate,
        version: u32,
    ) -> Result<Option<Prediction>>;

    /// Invalidate a strategy's picks for `date` and record the new set.
    fn replace_picks(&self, strategy_id: i64, date: NaiveDate, line_ids: &[i64]) -> Result<()>;

    /// Resolve a display name to a player index by prefix match. Periods in
    /// stored names are ignored, so "PJ Washington" finds "P.J. Washington".
    fn find_player_index(&self, name: &str) -> Result<Option<String>>;
}
