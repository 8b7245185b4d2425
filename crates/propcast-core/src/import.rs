// CSV import of games, box scores, pitching lines, rosters and sportsbook
// lines.
//
// Every file is read row by row: malformed rows are skipped with a warning,
// a file that yields no valid rows is an error. Display names in roster and
// line files are resolved to player indexes through a caller-owned
// `PlayerIndexCache`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

use crate::config::ImportConfig;
use crate::db::{Database, PitchingGameRecord, PlayerGameRecord};
use crate::odds::{LineKind, PlayerLine, Side};
use crate::sport::{Sport, StatShape};
use crate::stats::StatAverage;
use crate::store::{Game, RosterEntry, StatStore};

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv { path: String, source: csv::Error },

    #[error("no player matches name '{name}'")]
    UnknownPlayer { name: String },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("store error: {0:#}")]
    Store(#[from] anyhow::Error),
}

// ---------------------------------------------------------------------------
// Player name resolution
// ---------------------------------------------------------------------------

/// Display-name to player-index lookups for one import batch.
///
/// Names are normalized before lookup (periods dropped, non-breaking spaces
/// replaced, whitespace trimmed), then renamed if configured. Misses fall
/// through to the store's prefix search and successful lookups are
/// remembered.
#[derive(Debug, Default, Clone)]
pub struct PlayerIndexCache {
    names: HashMap<String, String>,
    renames: HashMap<String, String>,
}

impl PlayerIndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// A cache seeded with the configured aliases and renames.
    pub fn from_config(config: &ImportConfig) -> Self {
        let mut cache = Self::new();
        for (name, index) in &config.aliases {
            cache.insert(name, index.trim());
        }
        cache.renames = config
            .renames
            .iter()
            .map(|(from, to)| (Self::normalize(from), Self::normalize(to)))
            .collect();
        cache
    }

    pub fn normalize(name: &str) -> String {
        name.replace('\u{a0}', " ").replace('.', "").trim().to_string()
    }

    pub fn insert(&mut self, name: &str, index: &str) {
        self.names.insert(Self::normalize(name), index.to_string());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn resolve(&mut self, store: &dyn StatStore, name: &str) -> Result<String, ImportError> {
        let mut key = Self::normalize(name);
        if let Some(renamed) = self.renames.get(&key) {
            key = renamed.clone();
        }
        if let Some(index) = self.names.get(&key) {
            return Ok(index.clone());
        }
        match store.find_player_index(&key)? {
            Some(index) => {
                self.names.insert(key, index.clone());
                Ok(index)
            }
            None => Err(ImportError::UnknownPlayer { name: key }),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw CSV serde structs (private)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawGame {
    date: NaiveDate,
    home_index: String,
    away_index: String,
    home_score: Option<i32>,
    away_score: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct RawRosterSlot {
    name: String,
    team_index: String,
    status: String,
    avg_minutes: f64,
}

#[derive(Debug, Deserialize)]
struct RawLine {
    timestamp: String,
    name: String,
    stat: String,
    side: String,
    #[serde(default = "default_kind")]
    kind: String,
    line: f64,
    odds: i32,
    #[serde(default)]
    link: String,
}

#[derive(Debug, Deserialize)]
struct RawPitchingRow {
    date: NaiveDate,
    home_index: String,
    player_index: String,
    #[serde(default)]
    name: String,
    team_index: String,
    innings: f64,
    hits: f64,
    runs: f64,
    earned_runs: f64,
    walks: f64,
    strikeouts: f64,
    home_runs: f64,
    era: f64,
    batters_faced: f64,
    wpa: f64,
}

fn default_kind() -> String {
    LineKind::Mainline.as_str().to_string()
}

/// A box-score row before its game id is resolved.
#[derive(Debug, Clone, PartialEq)]
struct BoxScoreRow {
    date: NaiveDate,
    home_index: String,
    player_index: String,
    name: String,
    team_index: String,
    stats: StatAverage,
}

// ---------------------------------------------------------------------------
// Reader-based parsers (private, enable testing without temp files)
// ---------------------------------------------------------------------------

fn parse_games<R: Read>(rdr: R, sport: Sport) -> Result<Vec<Game>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut games = Vec::new();
    for result in reader.deserialize::<RawGame>() {
        match result {
            Ok(raw) => games.push(Game {
                id: 0,
                sport,
                date: raw.date,
                home_index: raw.home_index.trim().to_string(),
                away_index: raw.away_index.trim().to_string(),
                home_score: raw.home_score.unwrap_or_default(),
                away_score: raw.away_score.unwrap_or_default(),
            }),
            Err(e) => warn!("skipping malformed game row: {}", e),
        }
    }
    Ok(games)
}

/// Box scores are read by header name so one parser serves every stat
/// shape: the fixed key columns plus one column per stat name.
fn parse_box_scores<R: Read>(rdr: R, sport: Sport, path: &str) -> Result<Vec<BoxScoreRow>, ImportError> {
    let csv_err = |source| ImportError::Csv {
        path: path.to_string(),
        source,
    };
    let shape = sport.shape();
    let names = StatAverage::names(shape);

    let mut reader = csv::Reader::from_reader(rdr);
    let headers = reader.headers().map_err(csv_err)?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| ImportError::Validation(format!("{path}: missing column '{name}'")))
    };
    let date_col = column("date")?;
    let home_col = column("home_index")?;
    let player_col = column("player_index")?;
    let team_col = column("team_index")?;
    let name_col = headers.iter().position(|h| h.trim() == "name");
    let stat_cols = names
        .iter()
        .map(|n| column(n))
        .collect::<Result<Vec<usize>, ImportError>>()?;

    let mut rows = Vec::new();
    for (line_no, result) in reader.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!("skipping malformed box score row: {}", e);
                continue;
            }
        };
        let field = |i: usize| record.get(i).map(str::trim).unwrap_or("");

        let Ok(date) = NaiveDate::parse_from_str(field(date_col), "%Y-%m-%d") else {
            warn!("skipping box score row {}: bad date '{}'", line_no + 2, field(date_col));
            continue;
        };
        let values: Option<Vec<f64>> = stat_cols
            .iter()
            .map(|&i| field(i).parse::<f64>().ok().filter(|v| v.is_finite()))
            .collect();
        let Some(values) = values else {
            warn!(
                "skipping box score row {} for '{}': non-numeric stat",
                line_no + 2,
                field(player_col)
            );
            continue;
        };
        let player_index = field(player_col).to_string();
        if player_index.is_empty() {
            warn!("skipping box score row {}: empty player_index", line_no + 2);
            continue;
        }
        let Some(stats) = StatAverage::from_values(shape, 1, &values) else {
            continue;
        };
        rows.push(BoxScoreRow {
            date,
            home_index: field(home_col).to_string(),
            name: name_col.map(field).unwrap_or_default().to_string(),
            player_index,
            team_index: field(team_col).to_string(),
            stats,
        });
    }
    Ok(rows)
}

fn parse_pitching<R: Read>(rdr: R) -> Result<Vec<RawPitchingRow>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut rows = Vec::new();
    for result in reader.deserialize::<RawPitchingRow>() {
        match result {
            Ok(raw) if raw.player_index.trim().is_empty() => {
                warn!("skipping pitching row: empty player_index")
            }
            Ok(raw) if raw.innings.is_finite() => rows.push(raw),
            Ok(raw) => warn!("skipping pitching row for '{}': non-finite innings", raw.player_index),
            Err(e) => warn!("skipping malformed pitching row: {}", e),
        }
    }
    Ok(rows)
}

fn parse_rosters<R: Read>(rdr: R) -> Result<Vec<RawRosterSlot>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut slots = Vec::new();
    for result in reader.deserialize::<RawRosterSlot>() {
        match result {
            Ok(raw) if raw.avg_minutes.is_finite() => slots.push(raw),
            Ok(raw) => warn!("skipping roster slot '{}': non-finite minutes", raw.name.trim()),
            Err(e) => warn!("skipping malformed roster row: {}", e),
        }
    }
    Ok(slots)
}

fn parse_lines<R: Read>(rdr: R) -> Result<Vec<RawLine>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let mut lines = Vec::new();
    for result in reader.deserialize::<RawLine>() {
        match result {
            Ok(raw) if raw.line.is_finite() => lines.push(raw),
            Ok(raw) => warn!("skipping line for '{}': non-finite value", raw.name.trim()),
            Err(e) => warn!("skipping malformed line row: {}", e),
        }
    }
    Ok(lines)
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, the `T`-separated form, or a bare date
/// (midnight).
fn parse_timestamp(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

// ---------------------------------------------------------------------------
// Store writers
// ---------------------------------------------------------------------------

fn store_games(db: &Database, games: &[Game]) -> Result<usize, ImportError> {
    for game in games {
        db.insert_game(game)?;
    }
    Ok(games.len())
}

fn store_box_scores(db: &Database, sport: Sport, rows: &[BoxScoreRow]) -> Result<usize, ImportError> {
    let mut game_ids: HashMap<(NaiveDate, String), Option<i64>> = HashMap::new();
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let key = (row.date, row.home_index.clone());
        let game_id = match game_ids.get(&key) {
            Some(id) => *id,
            None => {
                let id = db.find_game(sport, row.date, &row.home_index)?;
                game_ids.insert(key, id);
                id
            }
        };
        let Some(game_id) = game_id else {
            warn!(
                "skipping box score for {}: no {} game on {} hosted by {}",
                row.player_index, sport, row.date, row.home_index
            );
            continue;
        };
        let name = if row.name.is_empty() { &row.player_index } else { &row.name };
        db.upsert_player(&row.player_index, sport, name)?;
        records.push(PlayerGameRecord {
            game_id,
            player_index: row.player_index.clone(),
            team_index: row.team_index.clone(),
            stats: row.stats,
        });
    }
    Ok(db.insert_player_games(sport, &records)?)
}

fn store_pitching(db: &Database, sport: Sport, rows: &[RawPitchingRow]) -> Result<usize, ImportError> {
    let mut game_ids: HashMap<(NaiveDate, String), Option<i64>> = HashMap::new();
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let home_index = row.home_index.trim().to_string();
        let key = (row.date, home_index.clone());
        let game_id = match game_ids.get(&key) {
            Some(id) => *id,
            None => {
                let id = db.find_game(sport, row.date, &home_index)?;
                game_ids.insert(key, id);
                id
            }
        };
        let Some(game_id) = game_id else {
            warn!(
                "skipping pitching line for {}: no {} game on {} hosted by {}",
                row.player_index, sport, row.date, home_index
            );
            continue;
        };
        let player_index = row.player_index.trim();
        let name = match row.name.trim() {
            "" => player_index,
            name => name,
        };
        db.upsert_player(player_index, sport, name)?;
        records.push(PitchingGameRecord {
            game_id,
            player_index: player_index.to_string(),
            team_index: row.team_index.trim().to_string(),
            innings: row.innings,
            hits: row.hits,
            runs: row.runs,
            earned_runs: row.earned_runs,
            walks: row.walks,
            strikeouts: row.strikeouts,
            home_runs: row.home_runs,
            era: row.era,
            batters_faced: row.batters_faced,
            wpa: row.wpa,
        });
    }
    Ok(db.insert_pitching_games(&records)?)
}

fn store_rosters(
    db: &Database,
    sport: Sport,
    slots: &[RawRosterSlot],
    cache: &mut PlayerIndexCache,
) -> Result<usize, ImportError> {
    let mut entries = Vec::with_capacity(slots.len());
    for slot in slots {
        let player_index = match cache.resolve(db, &slot.name) {
            Ok(index) => index,
            Err(ImportError::UnknownPlayer { name }) => {
                warn!("skipping roster slot: no player matches '{}'", name);
                continue;
            }
            Err(e) => return Err(e),
        };
        entries.push(RosterEntry {
            sport,
            player_index,
            team_index: slot.team_index.trim().to_string(),
            status: slot.status.trim().to_string(),
            avg_minutes: slot.avg_minutes,
        });
    }
    db.update_rosters(&entries)?;
    Ok(entries.len())
}

fn store_lines(
    db: &Database,
    sport: Sport,
    raw_lines: &[RawLine],
    cache: &mut PlayerIndexCache,
) -> Result<usize, ImportError> {
    let mut lines = Vec::with_capacity(raw_lines.len());
    for raw in raw_lines {
        let Some(timestamp) = parse_timestamp(&raw.timestamp) else {
            warn!("skipping line for '{}': bad timestamp '{}'", raw.name.trim(), raw.timestamp);
            continue;
        };
        let (side, kind) = match (raw.side.parse::<Side>(), raw.kind.parse::<LineKind>()) {
            (Ok(side), Ok(kind)) => (side, kind),
            (Err(e), _) | (_, Err(e)) => {
                warn!("skipping line for '{}': {}", raw.name.trim(), e);
                continue;
            }
        };
        let player_index = match cache.resolve(db, &raw.name) {
            Ok(index) => index,
            Err(ImportError::UnknownPlayer { name }) => {
                warn!("skipping line: no player matches '{}'", name);
                continue;
            }
            Err(e) => return Err(e),
        };
        lines.push(PlayerLine {
            id: 0,
            sport,
            player_index,
            timestamp,
            stat: raw.stat.trim().to_lowercase(),
            side,
            kind,
            line: raw.line,
            odds: raw.odds,
            link: raw.link.trim().to_string(),
        });
    }
    Ok(db.insert_player_lines(&lines)?)
}

// ---------------------------------------------------------------------------
// Public path-based importers
// ---------------------------------------------------------------------------

fn open(path: &Path) -> Result<std::fs::File, ImportError> {
    std::fs::File::open(path).map_err(|e| ImportError::Io {
        path: path.display().to_string(),
        source: e,
    })
}

fn require_rows(count: usize, what: &str, path: &Path) -> Result<(), ImportError> {
    if count == 0 {
        return Err(ImportError::Validation(format!(
            "{what} CSV {} produced zero valid rows",
            path.display()
        )));
    }
    Ok(())
}

/// Import a games CSV (`date,home_index,away_index[,home_score,away_score]`).
pub fn import_games(db: &Database, sport: Sport, path: &Path) -> Result<usize, ImportError> {
    let games = parse_games(open(path)?, sport).map_err(|e| ImportError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    require_rows(games.len(), "games", path)?;
    let stored = store_games(db, &games)?;
    info!("imported {} {} games from {}", stored, sport, path.display());
    Ok(stored)
}

/// Import a box-score CSV (`date,home_index,player_index,name,team_index`
/// followed by one column per stat). Games must already be imported.
pub fn import_box_scores(db: &Database, sport: Sport, path: &Path) -> Result<usize, ImportError> {
    let rows = parse_box_scores(open(path)?, sport, &path.display().to_string())?;
    require_rows(rows.len(), "box score", path)?;
    let stored = store_box_scores(db, sport, &rows)?;
    info!("imported {} {} box score rows from {}", stored, sport, path.display());
    Ok(stored)
}

/// Import an MLB pitching CSV (`date,home_index,player_index,name,team_index,
/// innings,hits,runs,earned_runs,walks,strikeouts,home_runs,era,batters_faced,wpa`).
/// Games must already be imported.
pub fn import_pitching(db: &Database, sport: Sport, path: &Path) -> Result<usize, ImportError> {
    if sport.shape() != StatShape::Batting {
        return Err(ImportError::Validation(format!(
            "pitching lines are only kept for baseball, not {sport}"
        )));
    }
    let rows = parse_pitching(open(path)?).map_err(|e| ImportError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    require_rows(rows.len(), "pitching", path)?;
    let stored = store_pitching(db, sport, &rows)?;
    info!("imported {} {} pitching rows from {}", stored, sport, path.display());
    Ok(stored)
}

/// Import a roster CSV (`name,team_index,status,avg_minutes`).
pub fn import_rosters(
    db: &Database,
    sport: Sport,
    path: &Path,
    cache: &mut PlayerIndexCache,
) -> Result<usize, ImportError> {
    let slots = parse_rosters(open(path)?).map_err(|e| ImportError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    require_rows(slots.len(), "roster", path)?;
    let stored = store_rosters(db, sport, &slots, cache)?;
    info!("imported {} {} roster slots from {}", stored, sport, path.display());
    Ok(stored)
}

/// Import a sportsbook line CSV
/// (`timestamp,name,stat,side[,kind],line,odds[,link]`).
pub fn import_lines(
    db: &Database,
    sport: Sport,
    path: &Path,
    cache: &mut PlayerIndexCache,
) -> Result<usize, ImportError> {
    let lines = parse_lines(open(path)?).map_err(|e| ImportError::Csv {
        path: path.display().to_string(),
        source: e,
    })?;
    require_rows(lines.len(), "line", path)?;
    let stored = store_lines(db, sport, &lines, cache)?;
    info!("imported {} new {} lines from {}", stored, sport, path.display());
    Ok(stored)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
