// SQLite persistence layer for games, box scores, lines, rosters, predictions
// and picks.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSql, Type};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;

use crate::odds::{
    build_alt_line_map, build_line_map, AltLineMap, LineKind, LineMap, PlayerLine, Side,
};
use crate::sport::{SeasonWindow, Sport, StatShape};
use crate::stats::StatAverage;
use crate::store::{Game, GamePlayers, Prediction, Relationship, RosterEntry, StatStore};

/// SQLite-backed implementation of [`StatStore`], plus the write paths the
/// CSV importers use.
pub struct Database {
    conn: Mutex<Connection>,
}

/// One player's box-score line for a stored game. `stats.num_games()` is
/// ignored on write.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerGameRecord {
    pub game_id: i64,
    pub player_index: String,
    pub team_index: String,
    pub stats: StatAverage,
}

/// One pitcher's line for a stored MLB game. Pitching lines are never
/// predicted; they decide who a batter faced.
#[derive(Debug, Clone, PartialEq)]
pub struct PitchingGameRecord {
    pub game_id: i64,
    pub player_index: String,
    pub team_index: String,
    pub innings: f64,
    pub hits: f64,
    pub runs: f64,
    pub earned_runs: f64,
    pub walks: f64,
    pub strikeouts: f64,
    pub home_runs: f64,
    pub era: f64,
    pub batters_faced: f64,
    pub wpa: f64,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and ensure all tables
    /// exist. Pass `":memory:"` for an ephemeral in-memory database.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA foreign_keys = ON;",
        )
        .context("failed to set database pragmas")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS players (
                player_index TEXT PRIMARY KEY,
                sport        TEXT NOT NULL,
                name         TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS games (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                sport      TEXT NOT NULL,
                date       TEXT NOT NULL,
                home_index TEXT NOT NULL,
                away_index TEXT NOT NULL,
                home_score INTEGER NOT NULL DEFAULT 0,
                away_score INTEGER NOT NULL DEFAULT 0,
                UNIQUE(date, sport, home_index)
            );

            CREATE TABLE IF NOT EXISTS basketball_player_games (
                player_index TEXT NOT NULL REFERENCES players(player_index),
                game         INTEGER NOT NULL REFERENCES games(id),
                team_index   TEXT NOT NULL,
                minutes      REAL NOT NULL,
                points       REAL NOT NULL,
                rebounds     REAL NOT NULL,
                assists      REAL NOT NULL,
                threes       REAL NOT NULL,
                usg          REAL NOT NULL,
                ortg         REAL NOT NULL,
                drtg         REAL NOT NULL,
                PRIMARY KEY (player_index, game)
            );

            CREATE TABLE IF NOT EXISTS batting_player_games (
                player_index TEXT NOT NULL REFERENCES players(player_index),
                game         INTEGER NOT NULL REFERENCES games(id),
                team_index   TEXT NOT NULL,
                at_bats      REAL NOT NULL,
                runs         REAL NOT NULL,
                hits         REAL NOT NULL,
                rbis         REAL NOT NULL,
                home_runs    REAL NOT NULL,
                walks        REAL NOT NULL,
                strikeouts   REAL NOT NULL,
                pas          REAL NOT NULL,
                pitches      REAL NOT NULL,
                strikes      REAL NOT NULL,
                ba           REAL NOT NULL,
                obp          REAL NOT NULL,
                slg          REAL NOT NULL,
                ops          REAL NOT NULL,
                wpa          REAL NOT NULL,
                PRIMARY KEY (player_index, game)
            );

            CREATE TABLE IF NOT EXISTS pitching_player_games (
                player_index  TEXT NOT NULL REFERENCES players(player_index),
                game          INTEGER NOT NULL REFERENCES games(id),
                team_index    TEXT NOT NULL,
                innings       REAL NOT NULL,
                hits          REAL NOT NULL,
                runs          REAL NOT NULL,
                earned_runs   REAL NOT NULL,
                walks         REAL NOT NULL,
                strikeouts    REAL NOT NULL,
                home_runs     REAL NOT NULL,
                era           REAL NOT NULL,
                batters_faced REAL NOT NULL,
                wpa           REAL NOT NULL,
                PRIMARY KEY (player_index, game)
            );

            CREATE TABLE IF NOT EXISTS player_lines (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                sport        TEXT NOT NULL,
                player_index TEXT NOT NULL,
                timestamp    TEXT NOT NULL,
                stat         TEXT NOT NULL,
                side         TEXT NOT NULL,
                kind         TEXT NOT NULL,
                line         REAL NOT NULL,
                odds         INTEGER NOT NULL,
                link         TEXT NOT NULL DEFAULT '',
                UNIQUE(player_index, timestamp, stat, side, kind, line)
            );

            CREATE TABLE IF NOT EXISTS pip_predictions (
                player_index TEXT NOT NULL,
                date         TEXT NOT NULL,
                version      INTEGER NOT NULL,
                sport        TEXT NOT NULL,
                stats        TEXT NOT NULL,
                PRIMARY KEY (player_index, date, version)
            );

            CREATE TABLE IF NOT EXISTS active_rosters (
                sport        TEXT NOT NULL,
                player_index TEXT NOT NULL,
                team_index   TEXT NOT NULL,
                status       TEXT NOT NULL,
                avg_minutes  REAL NOT NULL,
                last_updated TEXT NOT NULL DEFAULT (date('now')),
                PRIMARY KEY (sport, player_index)
            );

            CREATE TABLE IF NOT EXISTS prop_picks (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                strategy_id INTEGER NOT NULL,
                line_id     INTEGER NOT NULL REFERENCES player_lines(id),
                date        TEXT NOT NULL,
                valid       INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_games_sport_date ON games(sport, date);
            CREATE INDEX IF NOT EXISTS idx_basketball_games_game ON basketball_player_games(game);
            CREATE INDEX IF NOT EXISTS idx_batting_games_game ON batting_player_games(game);
            CREATE INDEX IF NOT EXISTS idx_pitching_games_game ON pitching_player_games(game);
            CREATE INDEX IF NOT EXISTS idx_player_lines_kind_time ON player_lines(kind, timestamp);
            CREATE INDEX IF NOT EXISTS idx_prop_picks_strategy_date ON prop_picks(strategy_id, date);
            ",
        )
        .context("failed to create database schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Acquire the connection. A poisoned lock still hands back the
    /// connection; SQLite keeps its own consistency.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------
    // Write paths
    // ------------------------------------------------------------------

    /// Insert a player or refresh their display name.
    pub fn upsert_player(&self, player_index: &str, sport: Sport, name: &str) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO players (player_index, sport, name) VALUES (?1, ?2, ?3)
             ON CONFLICT(player_index) DO UPDATE SET name = excluded.name",
            params![player_index, sport.as_str(), name],
        )
        .context("failed to upsert player")?;
        Ok(())
    }

    /// Insert a game or update the score of an existing (date, sport, home)
    /// game. Returns the game's row id.
    pub fn insert_game(&self, game: &Game) -> Result<i64> {
        let conn = self.conn();
        let id: i64 = conn
            .query_row(
                "INSERT INTO games (sport, date, home_index, away_index, home_score, away_score)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(date, sport, home_index) DO UPDATE SET
                    away_index = excluded.away_index,
                    home_score = excluded.home_score,
                    away_score = excluded.away_score
                 RETURNING id",
                params![
                    game.sport.as_str(),
                    game.date,
                    game.home_index,
                    game.away_index,
                    game.home_score,
                    game.away_score,
                ],
                |row| row.get(0),
            )
            .context("failed to insert game")?;
        Ok(id)
    }

    /// Look up a stored game by its natural key.
    pub fn find_game(&self, sport: Sport, date: NaiveDate, home_index: &str) -> Result<Option<i64>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id FROM games WHERE sport = ?1 AND date = ?2 AND home_index = ?3",
            params![sport.as_str(), date, home_index],
            |row| row.get(0),
        )
        .optional()
        .context("failed to look up game")
    }

    /// Store box-score lines in one transaction, overwriting any existing
    /// (player, game) row. Every record must match the sport's stat shape.
    pub fn insert_player_games(&self, sport: Sport, records: &[PlayerGameRecord]) -> Result<usize> {
        let shape = sport.shape();
        let names = StatAverage::names(shape);
        let table = stat_table(shape);
        let placeholders: Vec<String> = (0..names.len()).map(|i| format!("?{}", i + 4)).collect();
        let updates: Vec<String> = names
            .iter()
            .map(|n| format!("{n} = excluded.{n}"))
            .collect();
        let sql = format!(
            "INSERT INTO {table} (player_index, game, team_index, {columns})
             VALUES (?1, ?2, ?3, {placeholders})
             ON CONFLICT(player_index, game) DO UPDATE SET
                team_index = excluded.team_index, {updates}",
            columns = names.join(", "),
            placeholders = placeholders.join(", "),
            updates = updates.join(", "),
        );

        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin box score transaction")?;
        {
            let mut stmt = tx
                .prepare(&sql)
                .context("failed to prepare box score insert")?;
            for record in records {
                anyhow::ensure!(
                    record.stats.shape() == shape,
                    "box score for {} is {:?}, expected {:?}",
                    record.player_index,
                    record.stats.shape(),
                    shape
                );
                let values: Vec<f64> = names
                    .iter()
                    .map(|n| record.stats.stat(n).unwrap_or(0.0))
                    .collect();
                let mut args: Vec<&dyn ToSql> =
                    vec![&record.player_index as &dyn ToSql, &record.game_id, &record.team_index];
                args.extend(values.iter().map(|v| v as &dyn ToSql));
                stmt.execute(args.as_slice())
                    .with_context(|| format!("failed to insert box score for {}", record.player_index))?;
            }
        }
        tx.commit().context("failed to commit box scores")?;
        debug!("stored {} {} box score rows", records.len(), sport);
        Ok(records.len())
    }

    /// Store pitching lines in one transaction, overwriting any existing
    /// (player, game) row.
    pub fn insert_pitching_games(&self, records: &[PitchingGameRecord]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin pitching transaction")?;
        for r in records {
            tx.execute(
                "INSERT INTO pitching_player_games
                    (player_index, game, team_index, innings, hits, runs, earned_runs,
                     walks, strikeouts, home_runs, era, batters_faced, wpa)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(player_index, game) DO UPDATE SET
                    team_index    = excluded.team_index,
                    innings       = excluded.innings,
                    hits          = excluded.hits,
                    runs          = excluded.runs,
                    earned_runs   = excluded.earned_runs,
                    walks         = excluded.walks,
                    strikeouts    = excluded.strikeouts,
                    home_runs     = excluded.home_runs,
                    era           = excluded.era,
                    batters_faced = excluded.batters_faced,
                    wpa           = excluded.wpa",
                params![
                    r.player_index,
                    r.game_id,
                    r.team_index,
                    r.innings,
                    r.hits,
                    r.runs,
                    r.earned_runs,
                    r.walks,
                    r.strikeouts,
                    r.home_runs,
                    r.era,
                    r.batters_faced,
                    r.wpa,
                ],
            )
            .with_context(|| format!("failed to insert pitching line for {}", r.player_index))?;
        }
        tx.commit().context("failed to commit pitching lines")?;
        debug!("stored {} pitching rows", records.len());
        Ok(records.len())
    }

    /// Replace roster slots keyed on (sport, player).
    pub fn update_rosters(&self, entries: &[RosterEntry]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin roster transaction")?;
        for entry in entries {
            tx.execute(
                "INSERT INTO active_rosters (sport, player_index, team_index, status, avg_minutes)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(sport, player_index) DO UPDATE SET
                    team_index   = excluded.team_index,
                    status       = excluded.status,
                    avg_minutes  = excluded.avg_minutes,
                    last_updated = date('now')",
                params![
                    entry.sport.as_str(),
                    entry.player_index,
                    entry.team_index,
                    entry.status,
                    entry.avg_minutes,
                ],
            )
            .context("failed to upsert roster slot")?;
        }
        tx.commit().context("failed to commit rosters")?;
        Ok(())
    }

    /// Store sportsbook lines. Lines already seen at the same timestamp are
    /// ignored; returns how many rows were new.
    pub fn insert_player_lines(&self, lines: &[PlayerLine]) -> Result<usize> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin line transaction")?;
        let mut inserted = 0;
        for line in lines {
            inserted += tx
                .execute(
                    "INSERT OR IGNORE INTO player_lines
                        (sport, player_index, timestamp, stat, side, kind, line, odds, link)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        line.sport.as_str(),
                        line.player_index,
                        line.timestamp,
                        line.stat,
                        line.side.as_str(),
                        line.kind.as_str(),
                        line.line,
                        line.odds,
                        line.link,
                    ],
                )
                .context("failed to insert player line")?;
        }
        tx.commit().context("failed to commit player lines")?;
        Ok(inserted)
    }

    /// Line ids of a strategy's currently valid picks for `date`.
    pub fn valid_picks(&self, strategy_id: i64, date: NaiveDate) -> Result<Vec<i64>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT line_id FROM prop_picks
                 WHERE strategy_id = ?1 AND date = ?2 AND valid = 1
                 ORDER BY id",
            )
            .context("failed to prepare valid_picks query")?;
        let ids = stmt
            .query_map(params![strategy_id, date], |row| row.get(0))
            .context("failed to query prop picks")?
            .collect::<std::result::Result<Vec<i64>, _>>()
            .context("failed to map prop pick rows")?;
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Query helpers
    // ------------------------------------------------------------------

    fn average_query(
        &self,
        sport: Sport,
        player: &str,
        relation: Option<(&str, Relationship)>,
        window: &SeasonWindow,
        min_basis: f64,
    ) -> Result<StatAverage> {
        let shape = sport.shape();
        let names = StatAverage::names(shape);
        let table = stat_table(shape);
        let basis = StatAverage::basis_stat(shape);
        let others = relation_table(shape);
        let columns: Vec<String> = names.iter().map(|n| format!("avg(pg.{n})")).collect();
        let filter = match relation {
            None => String::new(),
            Some((_, Relationship::Opponent)) => format!(
                "AND EXISTS (SELECT 1 FROM {others} o
                             WHERE o.game = pg.game AND o.player_index = ?6
                               AND o.team_index <> pg.team_index)"
            ),
            Some((_, Relationship::Teammate)) => format!(
                "AND NOT EXISTS (SELECT 1 FROM {others} o
                                 WHERE o.game = pg.game AND o.player_index = ?6)"
            ),
        };
        let sql = format!(
            "SELECT count(*), {columns} FROM {table} pg
             JOIN games g ON g.id = pg.game
             WHERE pg.player_index = ?1 AND g.sport = ?2 AND pg.{basis} > ?3
               AND g.date >= ?4 AND g.date < ?5 {filter}",
            columns = columns.join(", "),
        );

        let sport_name = sport.as_str();
        let mut args: Vec<&dyn ToSql> =
            vec![&player as &dyn ToSql, &sport_name, &min_basis, &window.from, &window.until];
        let other = relation.map(|(other, _)| other);
        if let Some(other) = &other {
            args.push(other);
        }

        let conn = self.conn();
        let (count, values) = conn
            .query_row(&sql, args.as_slice(), |row| {
                let count: i64 = row.get(0)?;
                let values = (0..names.len())
                    .map(|i| Ok(row.get::<_, Option<f64>>(i + 1)?.unwrap_or(0.0)))
                    .collect::<rusqlite::Result<Vec<f64>>>()?;
                Ok((count, values))
            })
            .with_context(|| format!("failed to query season average for {player}"))?;

        if count == 0 {
            return Ok(StatAverage::invalid(shape));
        }
        StatAverage::from_values(shape, count as u32, &values)
            .context("stat column count does not match shape")
    }

    fn query_lines(&self, sport: Sport, date: NaiveDate, kind: LineKind) -> Result<Vec<PlayerLine>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT pl.id, pl.sport, pl.player_index, pl.timestamp, pl.stat, pl.side,
                        pl.kind, pl.line, pl.odds, pl.link
                 FROM player_lines pl
                 JOIN (SELECT player_index, stat, side, line, max(timestamp) AS latest
                       FROM player_lines
                       WHERE sport = ?1 AND kind = ?2 AND date(timestamp) = ?3
                       GROUP BY player_index, stat, side, line) m
                   ON pl.player_index = m.player_index AND pl.stat = m.stat
                  AND pl.side = m.side AND pl.line = m.line AND pl.timestamp = m.latest
                 WHERE pl.sport = ?1 AND pl.kind = ?2
                 ORDER BY pl.id",
            )
            .context("failed to prepare player line query")?;

        let lines = stmt
            .query_map(params![sport.as_str(), kind.as_str(), date], |row| {
                let timestamp: NaiveDateTime = row.get(3)?;
                Ok(PlayerLine {
                    id: row.get(0)?,
                    sport: parse_column(1, row.get(1)?)?,
                    player_index: row.get(2)?,
                    timestamp,
                    stat: row.get(4)?,
                    side: parse_column::<Side>(5, row.get(5)?)?,
                    kind: parse_column::<LineKind>(6, row.get(6)?)?,
                    line: row.get(7)?,
                    odds: row.get(8)?,
                    link: row.get(9)?,
                })
            })
            .context("failed to query player lines")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map player line rows")?;
        Ok(lines)
    }
}

impl StatStore for Database {
    fn season_average(
        &self,
        sport: Sport,
        player: &str,
        window: &SeasonWindow,
        min_basis: f64,
    ) -> Result<StatAverage> {
        self.average_query(sport, player, None, window, min_basis)
    }

    fn season_average_with(
        &self,
        sport: Sport,
        player: &str,
        other: &str,
        relationship: Relationship,
        window: &SeasonWindow,
        min_basis: f64,
    ) -> Result<StatAverage> {
        self.average_query(sport, player, Some((other, relationship)), window, min_basis)
    }

    fn realized_stats(&self, sport: Sport, date: NaiveDate) -> Result<HashMap<String, StatAverage>> {
        let shape = sport.shape();
        let names = StatAverage::names(shape);
        let table = stat_table(shape);
        let columns: Vec<String> = names.iter().map(|n| format!("pg.{n}")).collect();
        let sql = format!(
            "SELECT pg.player_index, {columns} FROM {table} pg
             JOIN games g ON g.id = pg.game
             WHERE g.sport = ?1 AND g.date = ?2
             ORDER BY g.id",
            columns = columns.join(", "),
        );

        let conn = self.conn();
        let mut stmt = conn
            .prepare(&sql)
            .context("failed to prepare realized stats query")?;
        let rows = stmt
            .query_map(params![sport.as_str(), date], |row| {
                let player: String = row.get(0)?;
                let values = (0..names.len())
                    .map(|i| row.get::<_, f64>(i + 1))
                    .collect::<rusqlite::Result<Vec<f64>>>()?;
                Ok((player, values))
            })
            .context("failed to query realized stats")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map realized stat rows")?;

        let mut realized: HashMap<String, StatAverage> = HashMap::new();
        for (player, values) in rows {
            let line = StatAverage::from_values(shape, 1, &values)
                .context("stat column count does not match shape")?;
            match realized.entry(player) {
                Entry::Vacant(slot) => {
                    slot.insert(line);
                }
                Entry::Occupied(slot) => {
                    debug!("{} played twice on {}, keeping the first game", slot.key(), date);
                }
            }
        }
        Ok(realized)
    }

    fn games_for_date(&self, sport: Sport, date: NaiveDate) -> Result<Vec<Game>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT id, sport, date, home_index, away_index, home_score, away_score
                 FROM games WHERE sport = ?1 AND date = ?2 ORDER BY id",
            )
            .context("failed to prepare games query")?;
        let games = stmt
            .query_map(params![sport.as_str(), date], |row| {
                Ok(Game {
                    id: row.get(0)?,
                    sport: parse_column(1, row.get(1)?)?,
                    date: row.get(2)?,
                    home_index: row.get(3)?,
                    away_index: row.get(4)?,
                    home_score: row.get(5)?,
                    away_score: row.get(6)?,
                })
            })
            .context("failed to query games")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map game rows")?;
        Ok(games)
    }

    fn players_for_game(&self, sport: Sport, game: &Game) -> Result<GamePlayers> {
        let shape = sport.shape();
        let sql = format!(
            "SELECT player_index, team_index FROM {table}
             WHERE game = ?1 ORDER BY {basis} DESC, player_index",
            table = stat_table(shape),
            basis = StatAverage::basis_stat(shape),
        );
        let conn = self.conn();
        let mut stmt = conn
            .prepare(&sql)
            .context("failed to prepare game players query")?;
        let rows = stmt
            .query_map(params![game.id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("failed to query game players")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map game player rows")?;
        Ok(split_sides(game, rows))
    }

    fn pitchers_for_game(&self, game: &Game) -> Result<GamePlayers> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT player_index, team_index FROM pitching_player_games
                 WHERE game = ?1 ORDER BY innings DESC, player_index",
            )
            .context("failed to prepare game pitchers query")?;
        let rows = stmt
            .query_map(params![game.id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .context("failed to query game pitchers")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map game pitcher rows")?;
        Ok(split_sides(game, rows))
    }

    fn has_pitched(&self, player: &str) -> Result<bool> {
        let conn = self.conn();
        conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM pitching_player_games WHERE player_index = ?1)",
            params![player],
            |row| row.get(0),
        )
        .context("failed to check pitching lines")
    }

    fn active_rosters(&self, sport: Sport) -> Result<HashMap<String, Vec<RosterEntry>>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT sport, player_index, team_index, status, avg_minutes
                 FROM active_rosters WHERE sport = ?1
                 ORDER BY avg_minutes DESC, player_index",
            )
            .context("failed to prepare active roster query")?;
        let entries = stmt
            .query_map(params![sport.as_str()], |row| {
                Ok(RosterEntry {
                    sport: parse_column(0, row.get(0)?)?,
                    player_index: row.get(1)?,
                    team_index: row.get(2)?,
                    status: row.get(3)?,
                    avg_minutes: row.get(4)?,
                })
            })
            .context("failed to query active rosters")?
            .collect::<std::result::Result<Vec<_>, _>>()
            .context("failed to map active roster rows")?;

        let mut rosters: HashMap<String, Vec<RosterEntry>> = HashMap::new();
        for entry in entries {
            rosters.entry(entry.team_index.clone()).or_default().push(entry);
        }
        Ok(rosters)
    }

    fn lines_for_date(&self, sport: Sport, date: NaiveDate, stats: &[String]) -> Result<LineMap> {
        let lines = self.query_lines(sport, date, LineKind::Mainline)?;
        Ok(build_line_map(
            lines.into_iter().filter(|l| wants_stat(stats, &l.stat)),
        ))
    }

    fn alternate_lines_for_date(
        &self,
        sport: Sport,
        date: NaiveDate,
        stats: &[String],
    ) -> Result<AltLineMap> {
        let lines = self.query_lines(sport, date, LineKind::Alternate)?;
        Ok(build_alt_line_map(
            lines.into_iter().filter(|l| wants_stat(stats, &l.stat)),
        ))
    }

    fn upsert_predictions(&self, records: &[Prediction]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin prediction transaction")?;
        for record in records {
            let stats_json = serde_json::to_string(&record.average)
                .context("failed to serialize prediction")?;
            tx.execute(
                "INSERT INTO pip_predictions (player_index, date, version, sport, stats)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(player_index, date, version) DO UPDATE SET
                    sport = excluded.sport,
                    stats = excluded.stats",
                params![
                    record.player_index,
                    record.date,
                    record.version,
                    record.sport.as_str(),
                    stats_json,
                ],
            )
            .context("failed to upsert prediction")?;
        }
        tx.commit().context("failed to commit predictions")?;
        debug!("stored {} predictions", records.len());
        Ok(())
    }

    fn get_prediction(
        &self,
        player: &str,
        date: NaiveDate,
        version: u32,
    ) -> Result<Option<Prediction>> {
        let conn = self.conn();
        let row = conn
            .query_row(
                "SELECT sport, stats FROM pip_predictions
                 WHERE player_index = ?1 AND date = ?2 AND version = ?3",
                params![player, date, version],
                |row| {
                    let sport: Sport = parse_column(0, row.get(0)?)?;
                    let stats: String = row.get(1)?;
                    Ok((sport, stats))
                },
            )
            .optional()
            .context("failed to query prediction")?;

        match row {
            Some((sport, stats_json)) => {
                let average: StatAverage = serde_json::from_str(&stats_json)
                    .context("failed to deserialize prediction")?;
                Ok(Some(Prediction {
                    player_index: player.to_string(),
                    date,
                    version,
                    sport,
                    average,
                }))
            }
            None => Ok(None),
        }
    }

    fn replace_picks(&self, strategy_id: i64, date: NaiveDate, line_ids: &[i64]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("failed to begin picks transaction")?;
        let invalidated = tx
            .execute(
                "UPDATE prop_picks SET valid = 0
                 WHERE strategy_id = ?1 AND date = ?2 AND valid = 1",
                params![strategy_id, date],
            )
            .context("failed to invalidate old picks")?;
        for line_id in line_ids {
            tx.execute(
                "INSERT INTO prop_picks (strategy_id, line_id, date, valid) VALUES (?1, ?2, ?3, 1)",
                params![strategy_id, line_id, date],
            )
            .context("failed to insert prop pick")?;
        }
        tx.commit().context("failed to commit picks")?;
        debug!(
            "strategy {strategy_id}: invalidated {invalidated} picks, added {}",
            line_ids.len()
        );
        Ok(())
    }

    fn find_player_index(&self, name: &str) -> Result<Option<String>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT player_index FROM players
             WHERE replace(name, '.', '') LIKE ?1
             ORDER BY player_index LIMIT 1",
            params![format!("{name}%")],
            |row| row.get(0),
        )
        .optional()
        .context("failed to look up player index")
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn stat_table(shape: StatShape) -> &'static str {
    match shape {
        StatShape::Basketball => "basketball_player_games",
        StatShape::Batting => "batting_player_games",
    }
}

/// Split ordered (player, team) rows into the game's home and away sides.
fn split_sides(game: &Game, rows: Vec<(String, String)>) -> GamePlayers {
    let mut players = GamePlayers::default();
    for (player, team) in rows {
        if team == game.home_index {
            players.home.push(player);
        } else {
            players.away.push(player);
        }
    }
    players
}

/// Table holding the players a relation filter refers to. Batters are
/// matched against the pitchers they faced.
fn relation_table(shape: StatShape) -> &'static str {
    match shape {
        StatShape::Basketball => "basketball_player_games",
        StatShape::Batting => "pitching_player_games",
    }
}

fn wants_stat(stats: &[String], stat: &str) -> bool {
    stats.is_empty() || stats.iter().any(|s| s == stat)
}

/// Parse a TEXT column through `FromStr`, surfacing failures as a rusqlite
/// conversion error.
fn parse_column<T: FromStr<Err = String>>(idx: usize, text: String) -> rusqlite::Result<T> {
    text.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{BasketballAvg, BattingAvg};

    /// Helper: create a fresh in-memory database for each test.
    fn test_db() -> Database {
        Database::open(":memory:").expect("in-memory database should open")
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn box_line(minutes: f64, points: f64) -> StatAverage {
        StatAverage::Basketball(BasketballAvg {
            num_games: 1,
            minutes,
            points,
            rebounds: 5.0,
            assists: 4.0,
            threes: 2.0,
            usg: 25.0,
            ortg: 112.0,
            drtg: 108.0,
        })
    }

    fn add_game(db: &Database, day: NaiveDate, home: &str, away: &str, rows: &[(&str, &str, f64, f64)]) -> i64 {
        let id = db
            .insert_game(&Game {
                id: 0,
                sport: Sport::Nba,
                date: day,
                home_index: home.into(),
                away_index: away.into(),
                home_score: 110,
                away_score: 104,
            })
            .unwrap();
        let records: Vec<PlayerGameRecord> = rows
            .iter()
            .map(|(player, team, minutes, points)| PlayerGameRecord {
                game_id: id,
                player_index: player.to_string(),
                team_index: team.to_string(),
                stats: box_line(*minutes, *points),
            })
            .collect();
        db.insert_player_games(Sport::Nba, &records).unwrap();
        id
    }

    /// Four Celtics games in the 2025 season:
    ///   Jan 5  BOS vs NYK: tatum 30, brown 22, brunson 28
    ///   Jan 7  BOS vs MIA: tatum 20, butler 25 (brown out)
    ///   Jan 9  BOS vs NYK: tatum 8 minutes, brunson 31 (brown out)
    ///   Jan 11 NYK vs BOS: tatum 34, brown 18, brunson 27
    fn seeded_db() -> Database {
        let db = test_db();
        for (index, name) in [
            ("tatumja01", "Jayson Tatum"),
            ("brownja02", "Jaylen Brown"),
            ("brunsja01", "Jalen Brunson"),
            ("butleji01", "Jimmy Butler"),
        ] {
            db.upsert_player(index, Sport::Nba, name).unwrap();
        }
        add_game(
            &db,
            date(2025, 1, 5),
            "BOS",
            "NYK",
            &[
                ("tatumja01", "BOS", 36.0, 30.0),
                ("brownja02", "BOS", 34.0, 22.0),
                ("brunsja01", "NYK", 35.0, 28.0),
            ],
        );
        add_game(
            &db,
            date(2025, 1, 7),
            "BOS",
            "MIA",
            &[
                ("tatumja01", "BOS", 38.0, 20.0),
                ("butleji01", "MIA", 33.0, 25.0),
            ],
        );
        add_game(
            &db,
            date(2025, 1, 9),
            "BOS",
            "NYK",
            &[
                ("tatumja01", "BOS", 8.0, 2.0),
                ("brunsja01", "NYK", 36.0, 31.0),
            ],
        );
        add_game(
            &db,
            date(2025, 1, 11),
            "NYK",
            "BOS",
            &[
                ("tatumja01", "BOS", 40.0, 34.0),
                ("brownja02", "BOS", 30.0, 18.0),
                ("brunsja01", "NYK", 36.0, 27.0),
            ],
        );
        db
    }

    fn window(until: NaiveDate) -> SeasonWindow {
        SeasonWindow {
            season_year: 2025,
            from: date(2024, 10, 1),
            until,
        }
    }

    fn line(player: &str, stat: &str, side: Side, kind: LineKind, value: f64, odds: i32, hour: u32) -> PlayerLine {
        PlayerLine {
            id: 0,
            sport: Sport::Nba,
            player_index: player.into(),
            timestamp: date(2025, 1, 11).and_hms_opt(hour, 0, 0).unwrap(),
            stat: stat.into(),
            side,
            kind,
            line: value,
            odds,
            link: format!("https://book.example/{player}/{stat}"),
        }
    }

    #[test]
    fn open_creates_tables() {
        let db = test_db();
        let conn = db.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN
                 ('players', 'games', 'basketball_player_games', 'batting_player_games',
                  'pitching_player_games', 'player_lines', 'pip_predictions',
                  'active_rosters', 'prop_picks')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 9);
    }

    #[test]
    fn stat_tables_have_a_column_per_stat() {
        let db = test_db();
        let conn = db.conn();
        for shape in [StatShape::Basketball, StatShape::Batting] {
            let mut stmt = conn
                .prepare(&format!("SELECT name FROM pragma_table_info('{}')", stat_table(shape)))
                .unwrap();
            let columns: Vec<String> = stmt
                .query_map([], |row| row.get(0))
                .unwrap()
                .collect::<std::result::Result<_, _>>()
                .unwrap();
            for name in StatAverage::names(shape) {
                assert!(columns.iter().any(|c| c == name), "missing column {name}");
            }
        }
    }

    #[test]
    fn season_average_filters_minutes_and_excludes_end_date() {
        let db = seeded_db();
        let avg = db
            .season_average(Sport::Nba, "tatumja01", &window(date(2025, 1, 11)), 10.0)
            .unwrap();
        assert_eq!(avg.num_games(), 2);
        assert!((avg.stat("points").unwrap() - 25.0).abs() < 1e-9);
        assert!((avg.stat("minutes").unwrap() - 37.0).abs() < 1e-9);
    }

    #[test]
    fn season_average_empty_window_is_invalid() {
        let db = seeded_db();
        let empty = SeasonWindow {
            season_year: 2024,
            from: date(2023, 10, 1),
            until: date(2024, 10, 1),
        };
        let avg = db.season_average(Sport::Nba, "tatumja01", &empty, 10.0).unwrap();
        assert!(!avg.is_valid());
        assert_eq!(avg.shape(), StatShape::Basketball);
    }

    #[test]
    fn opponent_filter_requires_both_players_on_opposite_teams() {
        let db = seeded_db();
        let avg = db
            .season_average_with(
                Sport::Nba,
                "tatumja01",
                "brunsja01",
                Relationship::Opponent,
                &window(date(2025, 1, 12)),
                10.0,
            )
            .unwrap();
        // Jan 5 and Jan 11; Jan 9 is under the minutes floor.
        assert_eq!(avg.num_games(), 2);
        assert!((avg.stat("points").unwrap() - 32.0).abs() < 1e-9);

        let teammate_as_opponent = db
            .season_average_with(
                Sport::Nba,
                "tatumja01",
                "brownja02",
                Relationship::Opponent,
                &window(date(2025, 1, 12)),
                10.0,
            )
            .unwrap();
        assert!(!teammate_as_opponent.is_valid());
    }

    #[test]
    fn teammate_filter_counts_games_where_other_did_not_play() {
        let db = seeded_db();
        // Brown sat Jan 7 and Jan 9; only Jan 7 clears the minutes floor.
        let without_brown = db
            .season_average_with(
                Sport::Nba,
                "tatumja01",
                "brownja02",
                Relationship::Teammate,
                &window(date(2025, 1, 12)),
                10.0,
            )
            .unwrap();
        assert_eq!(without_brown.num_games(), 1);
        assert!((without_brown.stat("points").unwrap() - 20.0).abs() < 1e-9);

        // The filter ignores team membership: an absent opponent counts too.
        let without_brunson = db
            .season_average_with(
                Sport::Nba,
                "tatumja01",
                "brunsja01",
                Relationship::Teammate,
                &window(date(2025, 1, 12)),
                10.0,
            )
            .unwrap();
        assert_eq!(without_brunson.num_games(), 1);
        assert!((without_brunson.stat("points").unwrap() - 20.0).abs() < 1e-9);
    }

    #[test]
    fn realized_stats_are_single_game_lines() {
        let db = seeded_db();
        let realized = db.realized_stats(Sport::Nba, date(2025, 1, 11)).unwrap();
        assert_eq!(realized.len(), 3);
        let tatum = realized["tatumja01"];
        assert_eq!(tatum.num_games(), 1);
        assert_eq!(tatum.stat("points"), Some(34.0));
        assert!(db
            .realized_stats(Sport::Nba, date(2025, 1, 12))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn games_and_players_for_date() {
        let db = seeded_db();
        let games = db.games_for_date(Sport::Nba, date(2025, 1, 5)).unwrap();
        assert_eq!(games.len(), 1);
        assert_eq!(games[0].home_index, "BOS");

        let players = db.players_for_game(Sport::Nba, &games[0]).unwrap();
        assert_eq!(players.home, vec!["tatumja01", "brownja02"]);
        assert_eq!(players.away, vec!["brunsja01"]);

        assert!(db.games_for_date(Sport::Mlb, date(2025, 1, 5)).unwrap().is_empty());
    }

    #[test]
    fn insert_game_upserts_on_natural_key() {
        let db = test_db();
        let mut game = Game {
            id: 0,
            sport: Sport::Nba,
            date: date(2025, 2, 1),
            home_index: "LAL".into(),
            away_index: "GSW".into(),
            home_score: 0,
            away_score: 0,
        };
        let first = db.insert_game(&game).unwrap();
        game.home_score = 120;
        game.away_score = 118;
        let second = db.insert_game(&game).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.find_game(Sport::Nba, game.date, "LAL").unwrap(), Some(first));
        assert_eq!(db.games_for_date(Sport::Nba, game.date).unwrap()[0].home_score, 120);
        assert_eq!(db.find_game(Sport::Nba, game.date, "GSW").unwrap(), None);
    }

    #[test]
    fn box_score_for_unknown_game_violates_foreign_key() {
        let db = test_db();
        db.upsert_player("tatumja01", Sport::Nba, "Jayson Tatum").unwrap();
        let result = db.insert_player_games(
            Sport::Nba,
            &[PlayerGameRecord {
                game_id: 999,
                player_index: "tatumja01".into(),
                team_index: "BOS".into(),
                stats: box_line(30.0, 20.0),
            }],
        );
        assert!(result.is_err());
    }

    #[test]
    fn box_score_shape_must_match_sport() {
        let db = seeded_db();
        let result = db.insert_player_games(
            Sport::Nba,
            &[PlayerGameRecord {
                game_id: 1,
                player_index: "tatumja01".into(),
                team_index: "BOS".into(),
                stats: StatAverage::Batting(BattingAvg::default()),
            }],
        );
        assert!(result.is_err());
    }

    #[test]
    fn mainline_lines_keep_latest_and_pair_sides() {
        let db = test_db();
        let inserted = db
            .insert_player_lines(&[
                line("tatumja01", "points", Side::Over, LineKind::Mainline, 27.5, -115, 10),
                line("tatumja01", "points", Side::Under, LineKind::Mainline, 27.5, -105, 10),
                line("tatumja01", "points", Side::Over, LineKind::Mainline, 27.5, -120, 16),
                line("tatumja01", "rebounds", Side::Over, LineKind::Mainline, 8.5, -110, 10),
                line("tatumja01", "rebounds", Side::Under, LineKind::Mainline, 8.5, -110, 10),
                line("tatumja01", "points", Side::Over, LineKind::Alternate, 30.0, 180, 10),
            ])
            .unwrap();
        assert_eq!(inserted, 6);

        let map = db
            .lines_for_date(Sport::Nba, date(2025, 1, 11), &["points".to_string()])
            .unwrap();
        let points = &map["tatumja01"]["points"];
        assert_eq!(points.over.odds, -120);
        assert_eq!(points.under.odds, -105);
        assert!(!map["tatumja01"].contains_key("rebounds"));

        assert!(db
            .lines_for_date(Sport::Nba, date(2025, 1, 12), &[])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn duplicate_lines_are_ignored() {
        let db = test_db();
        let l = line("tatumja01", "points", Side::Over, LineKind::Mainline, 27.5, -115, 10);
        assert_eq!(db.insert_player_lines(&[l.clone()]).unwrap(), 1);
        assert_eq!(db.insert_player_lines(&[l]).unwrap(), 0);
    }

    #[test]
    fn alternate_lines_grouped_by_player_and_stat() {
        let db = test_db();
        db.insert_player_lines(&[
            line("tatumja01", "points", Side::Over, LineKind::Alternate, 34.5, 250, 10),
            line("tatumja01", "points", Side::Over, LineKind::Alternate, 24.5, -250, 10),
            line("tatumja01", "points", Side::Under, LineKind::Alternate, 29.5, 110, 10),
            line("tatumja01", "points", Side::Over, LineKind::Mainline, 27.5, -110, 10),
        ])
        .unwrap();
        let map = db
            .alternate_lines_for_date(Sport::Nba, date(2025, 1, 11), &[])
            .unwrap();
        let ladder: Vec<f64> = map["tatumja01"]["points"].iter().map(|l| l.line).collect();
        assert_eq!(ladder, vec![24.5, 29.5, 34.5]);
        assert!(map["tatumja01"]["points"].iter().all(|l| l.id > 0));
    }

    #[test]
    fn prediction_upsert_overwrites() {
        let db = test_db();
        let mut record = Prediction {
            player_index: "tatumja01".into(),
            date: date(2025, 1, 11),
            version: 1,
            sport: Sport::Nba,
            average: box_line(36.0, 27.0),
        };
        db.upsert_predictions(&[record.clone()]).unwrap();
        record.average = box_line(37.0, 31.5);
        db.upsert_predictions(&[record.clone()]).unwrap();

        let stored = db.get_prediction("tatumja01", date(2025, 1, 11), 1).unwrap();
        assert_eq!(stored, Some(record));

        let count: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM pip_predictions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn get_prediction_missing_is_none() {
        let db = test_db();
        assert_eq!(db.get_prediction("nobody", date(2025, 1, 1), 1).unwrap(), None);
    }

    #[test]
    fn replace_picks_invalidates_previous_set() {
        let db = test_db();
        db.insert_player_lines(&[
            line("tatumja01", "points", Side::Over, LineKind::Mainline, 27.5, -115, 10),
            line("tatumja01", "points", Side::Under, LineKind::Mainline, 27.5, -105, 10),
        ])
        .unwrap();
        let day = date(2025, 1, 11);
        db.replace_picks(1, day, &[1]).unwrap();
        db.replace_picks(2, day, &[1]).unwrap();
        db.replace_picks(1, day, &[2]).unwrap();

        assert_eq!(db.valid_picks(1, day).unwrap(), vec![2]);
        assert_eq!(db.valid_picks(2, day).unwrap(), vec![1]);
    }

    #[test]
    fn find_player_index_matches_name_prefix() {
        let db = seeded_db();
        assert_eq!(
            db.find_player_index("Jayson Tat").unwrap(),
            Some("tatumja01".to_string())
        );
        assert_eq!(
            db.find_player_index("jimmy butler").unwrap(),
            Some("butleji01".to_string())
        );
        assert_eq!(db.find_player_index("Larry Bird").unwrap(), None);
    }

    #[test]
    fn find_player_index_ignores_periods_in_stored_names() {
        let db = test_db();
        db.upsert_player("washipj01", Sport::Nba, "P.J. Washington").unwrap();
        db.upsert_player("tuckepj01", Sport::Nba, "P. J. Tucker").unwrap();
        assert_eq!(
            db.find_player_index("PJ Washington").unwrap(),
            Some("washipj01".to_string())
        );
        assert_eq!(
            db.find_player_index("P J Tucker").unwrap(),
            Some("tuckepj01".to_string())
        );
    }

    #[test]
    fn rosters_group_by_team_and_sort_by_minutes() {
        let db = test_db();
        let entry = |player: &str, team: &str, status: &str, mins: f64| RosterEntry {
            sport: Sport::Nba,
            player_index: player.into(),
            team_index: team.into(),
            status: status.into(),
            avg_minutes: mins,
        };
        db.update_rosters(&[
            entry("brownja02", "BOS", "Available", 34.0),
            entry("tatumja01", "BOS", "Available", 36.0),
            entry("brunsja01", "NYK", "Out", 35.0),
        ])
        .unwrap();
        db.update_rosters(&[entry("brunsja01", "NYK", "Available", 35.5)])
            .unwrap();

        let rosters = db.active_rosters(Sport::Nba).unwrap();
        let bos: Vec<&str> = rosters["BOS"].iter().map(|e| e.player_index.as_str()).collect();
        assert_eq!(bos, vec!["tatumja01", "brownja02"]);
        assert!(rosters["NYK"][0].is_available());
        assert!(db.active_rosters(Sport::Mlb).unwrap().is_empty());
    }

    // ------------------------------------------------------------------
    // MLB: batters against pitchers
    // ------------------------------------------------------------------

    fn batting_line(pas: f64, hits: f64) -> StatAverage {
        StatAverage::from_values(
            StatShape::Batting,
            1,
            &[
                pas - 1.0, 0.0, hits, 0.0, 0.0, 1.0, 1.0, pas, 18.0, 12.0, 0.250, 0.330, 0.400,
                0.730, 0.05,
            ],
        )
        .unwrap()
    }

    fn pitching(game_id: i64, player: &str, team: &str, innings: f64) -> PitchingGameRecord {
        PitchingGameRecord {
            game_id,
            player_index: player.into(),
            team_index: team.into(),
            innings,
            hits: 5.0,
            runs: 2.0,
            earned_runs: 2.0,
            walks: 1.0,
            strikeouts: 6.0,
            home_runs: 1.0,
            era: 3.00,
            batters_faced: 24.0,
            wpa: 0.1,
        }
    }

    fn add_mlb_game(
        db: &Database,
        day: NaiveDate,
        home: &str,
        away: &str,
        batters: &[(&str, &str, f64)],
        pitchers: &[(&str, &str, f64)],
    ) -> i64 {
        let id = db
            .insert_game(&Game {
                id: 0,
                sport: Sport::Mlb,
                date: day,
                home_index: home.into(),
                away_index: away.into(),
                home_score: 5,
                away_score: 3,
            })
            .unwrap();
        let records: Vec<PlayerGameRecord> = batters
            .iter()
            .map(|(player, team, hits)| PlayerGameRecord {
                game_id: id,
                player_index: player.to_string(),
                team_index: team.to_string(),
                stats: batting_line(4.0, *hits),
            })
            .collect();
        db.insert_player_games(Sport::Mlb, &records).unwrap();
        let lines: Vec<PitchingGameRecord> = pitchers
            .iter()
            .map(|(player, team, innings)| pitching(id, player, team, *innings))
            .collect();
        db.insert_pitching_games(&lines).unwrap();
        id
    }

    /// Judge faces Sale on Jun 1 and Jun 3; Bello starts Jun 2 with Sale in
    /// relief. Devers' bat never appears in a pitching table.
    fn mlb_db() -> Database {
        let db = test_db();
        for (index, name) in [
            ("judgeaa01", "Aaron Judge"),
            ("deverra01", "Rafael Devers"),
            ("salech01", "Chris Sale"),
            ("bellobr01", "Brayan Bello"),
            ("colege01", "Gerrit Cole"),
        ] {
            db.upsert_player(index, Sport::Mlb, name).unwrap();
        }
        add_mlb_game(
            &db,
            date(2024, 6, 1),
            "NYY",
            "BOS",
            &[("judgeaa01", "NYY", 3.0), ("deverra01", "BOS", 1.0)],
            &[("colege01", "NYY", 7.0), ("salech01", "BOS", 6.0)],
        );
        add_mlb_game(
            &db,
            date(2024, 6, 2),
            "NYY",
            "BOS",
            &[("judgeaa01", "NYY", 0.0), ("deverra01", "BOS", 2.0)],
            &[("bellobr01", "BOS", 5.1), ("salech01", "BOS", 2.0)],
        );
        add_mlb_game(
            &db,
            date(2024, 6, 3),
            "BOS",
            "NYY",
            &[("judgeaa01", "NYY", 2.0)],
            &[("salech01", "BOS", 6.2)],
        );
        db
    }

    fn mlb_window() -> SeasonWindow {
        SeasonWindow {
            season_year: 2024,
            from: date(2024, 1, 1),
            until: date(2024, 6, 10),
        }
    }

    #[test]
    fn batter_opponent_filter_matches_opposing_pitchers() {
        let db = mlb_db();
        let vs_sale = db
            .season_average_with(Sport::Mlb, "judgeaa01", "salech01", Relationship::Opponent, &mlb_window(), 0.0)
            .unwrap();
        assert_eq!(vs_sale.num_games(), 3);
        assert!((vs_sale.stat("hits").unwrap() - 5.0 / 3.0).abs() < 1e-9);

        let vs_bello = db
            .season_average_with(Sport::Mlb, "judgeaa01", "bellobr01", Relationship::Opponent, &mlb_window(), 0.0)
            .unwrap();
        assert_eq!(vs_bello.num_games(), 1);
        assert_eq!(vs_bello.stat("hits"), Some(0.0));

        // Cole pitches for Judge's own team, and Devers never pitched.
        for other in ["colege01", "deverra01"] {
            let avg = db
                .season_average_with(Sport::Mlb, "judgeaa01", other, Relationship::Opponent, &mlb_window(), 0.0)
                .unwrap();
            assert!(!avg.is_valid(), "{other} is not an opposing pitcher");
        }
    }

    #[test]
    fn pitchers_for_game_orders_by_innings() {
        let db = mlb_db();
        let game = db.games_for_date(Sport::Mlb, date(2024, 6, 2)).unwrap().remove(0);
        let pitchers = db.pitchers_for_game(&game).unwrap();
        assert!(pitchers.home.is_empty());
        assert_eq!(pitchers.away, vec!["bellobr01", "salech01"]);

        let batters = db.players_for_game(Sport::Mlb, &game).unwrap();
        assert_eq!(batters.home, vec!["judgeaa01"]);
        assert_eq!(batters.away, vec!["deverra01"]);
    }

    #[test]
    fn has_pitched_checks_pitching_lines() {
        let db = mlb_db();
        assert!(db.has_pitched("salech01").unwrap());
        assert!(!db.has_pitched("judgeaa01").unwrap());
    }

    #[test]
    fn realized_stats_keep_first_game_of_a_doubleheader() {
        let db = mlb_db();
        // Makeup game the same day with the hosts swapped.
        add_mlb_game(
            &db,
            date(2024, 6, 3),
            "NYY",
            "BOS",
            &[("judgeaa01", "NYY", 4.0)],
            &[("bellobr01", "BOS", 5.0)],
        );
        let realized = db.realized_stats(Sport::Mlb, date(2024, 6, 3)).unwrap();
        assert_eq!(realized.len(), 1);
        assert_eq!(realized["judgeaa01"].stat("hits"), Some(2.0));
    }
}
