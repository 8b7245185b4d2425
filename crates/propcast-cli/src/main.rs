// propcast entry point.
//
// Startup sequence:
// 1. Parse arguments
// 2. Initialize tracing (log to file, not terminal)
// 3. Load config (copying defaults on first run)
// 4. Open database
// 5. Dispatch the subcommand

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing::{error, info};

use propcast_core::config::{self, Config};
use propcast_core::db::Database;
use propcast_core::import::{self, PlayerIndexCache};
use propcast_core::odds::LineKind;
use propcast_core::store::{RosterEntry, StatStore};
use propcast_model::backtest::{Backtester, StrategyReport};
use propcast_model::predictor::{matchup_partners, Analysis, Predictor};
use propcast_model::selector::{PropPick, PropSelector};

#[derive(Parser)]
#[command(name = "propcast")]
#[command(about = "Player prop predictions, pick selection and strategy backtests")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import CSV data into the database
    Import {
        #[command(subcommand)]
        kind: ImportKind,
    },
    /// Predict every rostered player in the day's games
    Predict {
        /// Game date (YYYY-MM-DD); defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Recompute predictions even when stored ones exist
        #[arg(long)]
        force: bool,
    },
    /// Predict, then select picks for every configured strategy
    Picks {
        /// Game date (YYYY-MM-DD); defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Recompute predictions even when stored ones exist
        #[arg(long)]
        force: bool,
        /// Print picks without saving them
        #[arg(long)]
        dry_run: bool,
    },
    /// Replay strategies over a historical date range
    Backtest {
        /// First date (overrides config)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Last date, inclusive (overrides config)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Print every scored bet under its strategy
        #[arg(long)]
        bets: bool,
    },
}

#[derive(Subcommand)]
enum ImportKind {
    /// Games CSV: date,home_index,away_index[,home_score,away_score]
    Games { path: PathBuf },
    /// Box-score CSV: date,home_index,player_index,name,team_index,<stats...>
    BoxScores { path: PathBuf },
    /// MLB pitching CSV: date,home_index,player_index,name,team_index,innings,...
    Pitching { path: PathBuf },
    /// Roster CSV: name,team_index,status,avg_minutes
    Rosters { path: PathBuf },
    /// Line CSV: timestamp,name,stat,side,kind,line,odds,link
    Lines { path: PathBuf },
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        error!("propcast failed: {:#}", e);
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    init_tracing()?;
    info!("propcast starting up");

    let config = config::load_config().context("failed to load configuration")?;
    info!(
        "Config loaded: sport={}, model v{}, {} strategies",
        config.model.sport,
        config.model.version,
        config.strategies.len()
    );

    let db = Database::open(&config.db_path).context("failed to open database")?;
    info!("Database opened at {}", config.db_path);

    match cli.command {
        Commands::Import { kind } => run_import(&db, &config, kind),
        Commands::Predict { date, force } => {
            let date = date.unwrap_or_else(today);
            let analyses = analyze_day(&db, &config, date, force || config.live.force_update)?;
            print_analyses(&analyses);
            Ok(())
        }
        Commands::Picks {
            date,
            force,
            dry_run,
        } => run_picks(&db, &config, date.unwrap_or_else(today), force, dry_run),
        Commands::Backtest { start, end, bets } => {
            let mut backtest = config.backtest.clone();
            backtest.start = start.unwrap_or(backtest.start);
            backtest.end = end.unwrap_or(backtest.end);
            anyhow::ensure!(
                backtest.start <= backtest.end,
                "backtest start {} is after end {}",
                backtest.start,
                backtest.end
            );
            let mut backtester = Backtester::new(&db, &config.model, &backtest, &config.strategies);
            let reports = backtester.run()?;
            print_reports(&reports);
            if bets {
                for strategy in backtester.strategies() {
                    println!("==================== {} ====================", strategy.selector.strategy().name);
                    print_picks(&strategy.result.bets);
                }
            }
            Ok(())
        }
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn run_import(db: &Database, config: &Config, kind: ImportKind) -> anyhow::Result<()> {
    let sport = config.model.sport;
    let mut cache = PlayerIndexCache::from_config(&config.import);
    let (what, path, count) = match kind {
        ImportKind::Games { path } => {
            let n = import::import_games(db, sport, &path)?;
            ("games", path, n)
        }
        ImportKind::BoxScores { path } => {
            let n = import::import_box_scores(db, sport, &path)?;
            ("box score rows", path, n)
        }
        ImportKind::Pitching { path } => {
            let n = import::import_pitching(db, sport, &path)?;
            ("pitching rows", path, n)
        }
        ImportKind::Rosters { path } => {
            let n = import::import_rosters(db, sport, &path, &mut cache)?;
            ("roster slots", path, n)
        }
        ImportKind::Lines { path } => {
            let n = import::import_lines(db, sport, &path, &mut cache)?;
            ("new lines", path, n)
        }
    };
    println!("imported {count} {what} from {}", path.display());
    Ok(())
}

/// Run the predictor both ways for every game scheduled on `date`, using the
/// stored active rosters. MLB batters face the opposing roster's pitchers.
fn analyze_day(db: &Database, config: &Config, date: NaiveDate, force: bool) -> anyhow::Result<Vec<Analysis>> {
    let sport = config.model.sport;
    let games = db
        .games_for_date(sport, date)
        .context("failed to load games")?;
    if games.is_empty() {
        info!("no {} games on {}", sport, date);
        return Ok(Vec::new());
    }
    let rosters: HashMap<String, Vec<RosterEntry>> =
        db.active_rosters(sport).context("failed to load rosters")?;
    let empty = Vec::new();

    let predictor = Predictor::new(db, &config.model);
    let mut analyses = Vec::new();
    for game in &games {
        let home = rosters.get(&game.home_index).unwrap_or(&empty);
        let away = rosters.get(&game.away_index).unwrap_or(&empty);
        info!(
            "analyzing {} vs. {} ({} and {} rostered)",
            game.home_index,
            game.away_index,
            home.len(),
            away.len()
        );
        let home_partners = matchup_partners(db, sport, home)?;
        let away_partners = matchup_partners(db, sport, away)?;
        analyses.extend(predictor.run_analysis_on_game(home, &away_partners, date, force, true)?);
        analyses.extend(predictor.run_analysis_on_game(away, &home_partners, date, force, true)?);
    }
    Ok(analyses)
}

fn run_picks(db: &Database, config: &Config, date: NaiveDate, force: bool, dry_run: bool) -> anyhow::Result<()> {
    let analyses = analyze_day(db, config, date, force || config.live.force_update)?;
    let sport = config.model.sport;

    enum Lines {
        Main(propcast_core::odds::LineMap),
        Alt(propcast_core::odds::AltLineMap),
    }
    let lines = match config.live.line_type {
        LineKind::Mainline => Lines::Main(db.lines_for_date(sport, date, &config.live.stats)?),
        LineKind::Alternate => Lines::Alt(db.alternate_lines_for_date(sport, date, &config.live.stats)?),
    };

    for strategy in &config.strategies {
        let selector = PropSelector::new(strategy.clone());
        let picks = match &lines {
            Lines::Main(map) => selector.pick_props(map, &analyses),
            Lines::Alt(map) => selector.pick_alternate_props(map, &analyses),
        };
        println!("==================== {} ====================", strategy.name);
        print_picks(&picks);
        if !dry_run {
            selector.save_picks(db, date, &picks)?;
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_analyses(analyses: &[Analysis]) {
    for a in analyses {
        let stats = a
            .prediction
            .stats()
            .iter()
            .map(|(name, value)| format!("{name} {value:.2}"))
            .collect::<Vec<_>>()
            .join(", ");
        println!("{} [{} games]: {}", a.player_index, a.prediction.num_games(), stats);
        for (stat, pct) in &a.outliers {
            println!("    outlier {stat}: {:+.1}%", pct * 100.0);
        }
    }
}

fn print_picks(picks: &[PropPick]) {
    for pick in picks {
        let result = match pick.result {
            Some(r) => format!(" -> {:?} ({:.1})", r.outcome, r.actual),
            None => String::new(),
        };
        println!(
            "{}: {} {} predicted {:.2} vs. line {:.2} ({:+}). diff {:.2}, pct {:.3}, line id {}{}",
            pick.player_index(),
            pick.side,
            pick.stat,
            pick.predicted(),
            pick.line.line,
            pick.line.odds,
            pick.diff,
            pick.pct_diff,
            pick.line_id(),
            result
        );
    }
}

fn print_reports(reports: &[StrategyReport]) {
    for report in reports {
        println!("------------------------------------------");
        println!("Strategy: {}", report.name);
        println!(
            "{} bets with {:.2}% winrate. Profit: ${:.2}",
            report.bets,
            report.win_rate * 100.0,
            report.profit
        );
        let sections = [
            ("|pct diff| >", &report.breakdown.pct_diff),
            ("|diff| >", &report.breakdown.diff),
            ("line <", &report.breakdown.line),
            ("odds band", &report.breakdown.odds),
        ];
        for (label, buckets) in sections {
            println!("  {label}");
            for b in buckets {
                println!(
                    "    {:>6}: {:>5.1}% winrate, ${:>9.2} profit [{}]",
                    b.key,
                    b.win_rate() * 100.0,
                    b.profit,
                    b.bets
                );
            }
        }
    }
}

/// Initialize tracing to write to a log file. Logs go to
/// `logs/propcast.log` relative to the working directory.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("propcast.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("propcast=info,propcast_core=info,propcast_model=info,warn")
            }),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
