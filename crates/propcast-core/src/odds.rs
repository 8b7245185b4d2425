// Sportsbook player lines, over/under pairs, and alternate ladders.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::sport::Sport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Over,
    Under,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Over => "Over",
            Side::Under => "Under",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "over" | "o" => Ok(Side::Over),
            "under" | "u" => Ok(Side::Under),
            other => Err(format!("unknown side '{other}'")),
        }
    }
}

/// Whether a line is the book's primary number or one rung of an alternate
/// ladder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Mainline,
    Alternate,
}

impl LineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LineKind::Mainline => "mainline",
            LineKind::Alternate => "alternate",
        }
    }
}

impl FromStr for LineKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mainline" | "main" => Ok(LineKind::Mainline),
            "alternate" | "alt" => Ok(LineKind::Alternate),
            other => Err(format!("unknown line kind '{other}'")),
        }
    }
}

/// One priced side of a player prop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLine {
    pub id: i64,
    pub sport: Sport,
    pub player_index: String,
    pub timestamp: NaiveDateTime,
    pub stat: String,
    pub side: Side,
    pub kind: LineKind,
    pub line: f64,
    /// American odds, e.g. -110 or +150.
    pub odds: i32,
    pub link: String,
}

/// The over and under sides of a single mainline prop.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerOdds {
    pub over: PlayerLine,
    pub under: PlayerLine,
}

impl PlayerOdds {
    pub fn side(&self, side: Side) -> &PlayerLine {
        match side {
            Side::Over => &self.over,
            Side::Under => &self.under,
        }
    }
}

/// player -> stat -> mainline pair.
pub type LineMap = HashMap<String, HashMap<String, PlayerOdds>>;

/// player -> stat -> every alternate rung, both sides.
pub type AltLineMap = HashMap<String, HashMap<String, Vec<PlayerLine>>>;

/// Group raw mainline rows into over/under pairs.
///
/// When a book posts several numbers for one side, the one priced closest to
/// even money wins. A stat missing either side is dropped.
pub fn build_line_map(lines: impl IntoIterator<Item = PlayerLine>) -> LineMap {
    let mut sides: HashMap<(String, String), (Option<PlayerLine>, Option<PlayerLine>)> =
        HashMap::new();

    for line in lines {
        let entry = sides
            .entry((line.player_index.clone(), line.stat.clone()))
            .or_default();
        let slot = match line.side {
            Side::Over => &mut entry.0,
            Side::Under => &mut entry.1,
        };
        let closer = slot
            .as_ref()
            .map_or(true, |cur| line.odds.unsigned_abs() < cur.odds.unsigned_abs());
        if closer {
            *slot = Some(line);
        }
    }

    let mut map = LineMap::new();
    for ((player, stat), pair) in sides {
        if let (Some(over), Some(under)) = pair {
            map.entry(player)
                .or_default()
                .insert(stat, PlayerOdds { over, under });
        }
    }
    map
}

/// Group raw alternate rows by player and stat, ordered by line value.
pub fn build_alt_line_map(lines: impl IntoIterator<Item = PlayerLine>) -> AltLineMap {
    let mut map = AltLineMap::new();
    for line in lines {
        map.entry(line.player_index.clone())
            .or_default()
            .entry(line.stat.clone())
            .or_default()
            .push(line);
    }
    for stats in map.values_mut() {
        for ladder in stats.values_mut() {
            ladder.sort_by(|a, b| a.line.total_cmp(&b.line).then(a.id.cmp(&b.id)));
        }
    }
    map
}
