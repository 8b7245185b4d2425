// Configuration loading and parsing (engine.toml, strategies.toml).

use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::odds::LineKind;
use crate::sport::Sport;
use crate::store::Relationship;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub model: ModelConfig,
    pub live: LiveConfig,
    pub backtest: BacktestConfig,
    pub import: ImportConfig,
    pub strategies: Vec<StrategyConfig>,
}

// ---------------------------------------------------------------------------
// engine.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire engine.toml file.
#[derive(Debug, Clone, Deserialize)]
struct EngineFile {
    database: DatabaseSection,
    model: ModelSection,
    live: LiveConfig,
    backtest: BacktestConfig,
    #[serde(default)]
    import: ImportConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct DatabaseSection {
    path: String,
}

/// `[model]` as written. Only `sport` is required; every other key falls
/// back to [`ModelConfig::for_sport`].
#[derive(Debug, Clone, Deserialize)]
struct ModelSection {
    sport: Sport,
    version: Option<u32>,
    history_start: Option<NaiveDate>,
    min_minutes: Option<f64>,
    roster_min_minutes: Option<f64>,
    max_players: Option<usize>,
    max_opponents: Option<usize>,
    relationship: Option<Relationship>,
}

impl ModelSection {
    fn resolve(self) -> ModelConfig {
        let base = ModelConfig::for_sport(self.sport);
        ModelConfig {
            sport: self.sport,
            version: self.version.unwrap_or(base.version),
            history_start: self.history_start.unwrap_or(base.history_start),
            min_minutes: self.min_minutes.unwrap_or(base.min_minutes),
            roster_min_minutes: self.roster_min_minutes.unwrap_or(base.roster_min_minutes),
            max_players: self.max_players.unwrap_or(base.max_players),
            max_opponents: self.max_opponents.unwrap_or(base.max_opponents),
            relationship: self.relationship.unwrap_or(base.relationship),
        }
    }
}

/// Prediction model settings for one sport.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    pub sport: Sport,
    /// Version tag stored with every prediction.
    pub version: u32,
    /// Earliest game date considered for control and matchup samples.
    pub history_start: NaiveDate,
    /// Games at or below this rate basis are excluded from averages.
    pub min_minutes: f64,
    /// Roster players averaging at or below this are not analyzed.
    pub roster_min_minutes: f64,
    /// Players analyzed per roster.
    pub max_players: usize,
    /// Opposing players folded into each prediction. For MLB these are the
    /// opposing pitchers, most innings first.
    pub max_opponents: usize,
    pub relationship: Relationship,
}

impl ModelConfig {
    /// Built-in settings for a sport.
    pub fn for_sport(sport: Sport) -> Self {
        match sport {
            Sport::Nba | Sport::Wnba => ModelConfig {
                sport,
                version: 1,
                history_start: NaiveDate::from_ymd_opt(2018, 10, 1).unwrap_or_default(),
                min_minutes: 10.0,
                roster_min_minutes: 10.0,
                max_players: 5,
                max_opponents: 8,
                relationship: Relationship::Opponent,
            },
            Sport::Mlb => ModelConfig {
                sport,
                version: 1,
                history_start: NaiveDate::from_ymd_opt(2019, 3, 1).unwrap_or_default(),
                min_minutes: 0.0,
                roster_min_minutes: 0.0,
                max_players: 9,
                max_opponents: 1,
                relationship: Relationship::Opponent,
            },
        }
    }
}

/// Settings for the live `predict` and `picks` runs.
#[derive(Debug, Clone, Deserialize)]
pub struct LiveConfig {
    pub line_type: LineKind,
    pub stats: Vec<String>,
    #[serde(default)]
    pub force_update: bool,
}

/// Settings for a historical replay.
#[derive(Debug, Clone, Deserialize)]
pub struct BacktestConfig {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub line_type: LineKind,
    pub stats: Vec<String>,
    /// Players per side taken from each game's box score.
    pub roster_size: usize,
    /// Average minutes assumed for every replayed roster slot.
    pub assumed_minutes: f64,
    #[serde(default)]
    pub force_update: bool,
    #[serde(default = "default_true")]
    pub store_predictions: bool,
}

fn default_true() -> bool {
    true
}

/// Name fixes for sportsbook and roster files, applied before a name is
/// looked up in the store.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ImportConfig {
    /// Display name -> player index, for names no stored name starts with.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
    /// Display name -> stored display name.
    #[serde(default)]
    pub renames: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// strategies.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for strategies.toml.
#[derive(Debug, Clone, Deserialize)]
struct StrategiesFile {
    #[serde(default, rename = "strategy")]
    strategies: Vec<StrategyConfig>,
}

/// Whether a strategy's thresholds compare raw stat edges or fractional edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThresholdType {
    Raw,
    Percent,
}

/// One pick-selection strategy. Zero-valued `min_line`, `min_diff`,
/// `min_minutes` and `min_games` disable their checks.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StrategyConfig {
    pub id: i64,
    pub name: String,
    /// Stat -> minimum edge. A stat without an entry is never picked.
    pub thresholds: HashMap<String, f64>,
    pub threshold_type: ThresholdType,
    #[serde(default = "default_rankings")]
    pub rankings: HashMap<String, i32>,
    pub min_odds: i32,
    #[serde(default)]
    pub max_odds: Option<i32>,
    #[serde(default)]
    pub min_line: f64,
    #[serde(default)]
    pub max_line: Option<f64>,
    #[serde(default)]
    pub min_diff: f64,
    #[serde(default)]
    pub min_games: u32,
    #[serde(default)]
    pub min_minutes: f64,
    #[serde(default)]
    pub require_outlier: bool,
    pub bet_size: f64,
    pub max_over: usize,
    pub max_under: usize,
}

/// Stat priority used when a strategy does not set its own.
pub fn default_rankings() -> HashMap<String, i32> {
    HashMap::from([
        ("points".to_string(), 3),
        ("rebounds".to_string(), 2),
        ("assists".to_string(), 1),
    ])
}

impl StrategyConfig {
    /// Priority of a stat; unranked stats sort last.
    pub fn rank(&self, stat: &str) -> i32 {
        self.rankings.get(stat).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate configuration from `config/engine.toml` and
/// `config/strategies.toml`, both relative to the given `base_dir`.
///
/// This is the lower-level loading primitive that does not auto-copy defaults.
/// Prefer `load_config()` which handles default initialization automatically.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- engine.toml (required) ---
    let engine_path = config_dir.join("engine.toml");
    let engine_text = read_file(&engine_path)?;
    let engine: EngineFile = toml::from_str(&engine_text).map_err(|e| ConfigError::ParseError {
        path: engine_path.clone(),
        source: e,
    })?;

    // --- strategies.toml (required) ---
    let strategies_path = config_dir.join("strategies.toml");
    let strategies_text = read_file(&strategies_path)?;
    let strategies: StrategiesFile =
        toml::from_str(&strategies_text).map_err(|e| ConfigError::ParseError {
            path: strategies_path.clone(),
            source: e,
        })?;

    let config = Config {
        db_path: engine.database.path,
        model: engine.model.resolve(),
        live: engine.live,
        backtest: engine.backtest,
        import: engine.import,
        strategies: strategies.strategies,
    };

    validate(&config)?;

    Ok(config)
}

/// Ensure all config files exist by copying missing ones from `defaults/`.
/// Returns the list of files that were copied. Skips `.example` files.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the project root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let mut copied = Vec::new();

    let entries = std::fs::read_dir(&defaults_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to read defaults directory: {e}"),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read defaults entry: {e}"),
        })?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name() else {
            continue;
        };
        if file_name.to_str().is_some_and(|n| n.ends_with(".example")) {
            continue;
        }
        let target = config_dir.join(file_name);

        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
        {
            Ok(mut dest) => {
                let content = std::fs::read(&path).map_err(|e| ConfigError::DefaultsCopyError {
                    message: format!("failed to read {}: {e}", path.display()),
                })?;
                std::io::Write::write_all(&mut dest, &content).map_err(|e| {
                    ConfigError::DefaultsCopyError {
                        message: format!("failed to write {}: {e}", target.display()),
                    }
                })?;
                copied.push(target);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(ConfigError::DefaultsCopyError {
                    message: format!("failed to create {}: {e}", target.display()),
                });
            }
        }
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures default config files are copied before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: impl Into<String>, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    if config.db_path.trim().is_empty() {
        return Err(invalid("database.path", "must not be empty"));
    }

    // Model validations
    let model = &config.model;
    if model.version == 0 {
        return Err(invalid("model.version", "must be greater than 0"));
    }
    let count_fields: &[(&str, usize)] = &[
        ("model.max_players", model.max_players),
        ("model.max_opponents", model.max_opponents),
        ("backtest.roster_size", config.backtest.roster_size),
    ];
    for (name, val) in count_fields {
        if *val == 0 {
            return Err(invalid(*name, "must be > 0"));
        }
    }
    let minute_fields: &[(&str, f64)] = &[
        ("model.min_minutes", model.min_minutes),
        ("model.roster_min_minutes", model.roster_min_minutes),
        ("backtest.assumed_minutes", config.backtest.assumed_minutes),
    ];
    for (name, val) in minute_fields {
        if *val < 0.0 {
            return Err(invalid(*name, format!("must be >= 0, got {val}")));
        }
    }

    // Date range and stat lists
    if config.backtest.start > config.backtest.end {
        return Err(invalid(
            "backtest.start",
            format!(
                "must not be after backtest.end ({} > {})",
                config.backtest.start, config.backtest.end
            ),
        ));
    }
    if config.live.stats.is_empty() {
        return Err(invalid("live.stats", "must list at least one stat"));
    }
    if config.backtest.stats.is_empty() {
        return Err(invalid("backtest.stats", "must list at least one stat"));
    }
    for (name, index) in &config.import.aliases {
        if index.trim().is_empty() {
            return Err(invalid(
                format!("import.aliases.{name}"),
                "player index must not be empty",
            ));
        }
    }

    // Strategy validations
    let mut ids = HashSet::new();
    for (i, strategy) in config.strategies.iter().enumerate() {
        let field = |name: &str| format!("strategy[{i}].{name}");
        if !ids.insert(strategy.id) {
            return Err(invalid(field("id"), format!("duplicate id {}", strategy.id)));
        }
        if strategy.name.trim().is_empty() {
            return Err(invalid(field("name"), "must not be empty"));
        }
        if strategy.bet_size <= 0.0 {
            return Err(invalid(
                field("bet_size"),
                format!("must be > 0, got {}", strategy.bet_size),
            ));
        }
        if let Some(max_odds) = strategy.max_odds {
            if max_odds < strategy.min_odds {
                return Err(invalid(
                    field("max_odds"),
                    format!("must be >= min_odds ({max_odds} < {})", strategy.min_odds),
                ));
            }
        }
        if strategy.max_line.is_some_and(|max| max < strategy.min_line) {
            return Err(invalid(field("max_line"), "must be >= min_line"));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
