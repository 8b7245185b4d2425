// Historical replay: run the predictor and every strategy over a closed
// date range and score the picks against realized box scores.

use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use propcast_core::config::{BacktestConfig, ModelConfig, StrategyConfig};
use propcast_core::odds::{AltLineMap, LineKind, LineMap, Side};
use propcast_core::sport::StatShape;
use propcast_core::stats::StatAverage;
use propcast_core::store::{Game, RosterEntry, StatStore};

use crate::predictor::{Analysis, Predictor};
use crate::selector::{Outcome, PickResult, PropPick, PropSelector};

/// Cumulative `|pct_diff|` thresholds.
pub const PCT_DIFF_BUCKETS: [f64; 11] = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0];

/// Cumulative `|diff|` thresholds.
pub const DIFF_BUCKETS: [f64; 14] = [
    0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 5.0, 8.0, 10.0, 15.0,
];

/// Cumulative line-value ceilings.
pub const LINE_BUCKETS: [f64; 21] = [
    0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 22.0,
    24.0, 26.0, 28.0, 30.0,
];

/// Lower bounds of hundred-wide odds bands.
pub const ODDS_BANDS: [i32; 11] = [0, 100, 200, 300, 400, 500, 600, 700, 800, 900, 1000];

/// Winnings (excluding the stake) of a winning `bet_size` wager at American
/// `odds`.
pub fn calculate_profit(bet_size: f64, odds: i32) -> f64 {
    if odds < 0 {
        bet_size * 100.0 / f64::from(odds.unsigned_abs())
    } else {
        bet_size * f64::from(odds) / 100.0
    }
}

fn pick_profit(pick: &PropPick) -> f64 {
    match pick.result.map(|r| r.outcome) {
        Some(Outcome::Win) => calculate_profit(pick.bet_size, pick.line.odds),
        Some(Outcome::Loss) => -pick.bet_size,
        None => 0.0,
    }
}

// ---------------------------------------------------------------------------
// Results
// ---------------------------------------------------------------------------

/// Win/loss tally of the picks falling in one bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BucketStats {
    pub key: f64,
    pub bets: usize,
    pub wins: usize,
    pub profit: f64,
}

impl BucketStats {
    fn collect<'p>(key: f64, picks: impl Iterator<Item = &'p PropPick>) -> Self {
        let mut stats = BucketStats {
            key,
            bets: 0,
            wins: 0,
            profit: 0.0,
        };
        for pick in picks {
            stats.bets += 1;
            if matches!(pick.result.map(|r| r.outcome), Some(Outcome::Win)) {
                stats.wins += 1;
            }
            stats.profit += pick_profit(pick);
        }
        stats
    }

    pub fn win_rate(&self) -> f64 {
        if self.bets == 0 {
            0.0
        } else {
            self.wins as f64 / self.bets as f64
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Breakdown {
    pub pct_diff: Vec<BucketStats>,
    pub diff: Vec<BucketStats>,
    pub line: Vec<BucketStats>,
    pub odds: Vec<BucketStats>,
}

fn in_odds_band(odds: i32, band: i32) -> bool {
    match band {
        0 => odds < 100,
        1000 => odds >= 1000,
        _ => odds >= band && odds < band + 100,
    }
}

/// Scored picks of one strategy.
#[derive(Debug, Clone, Default)]
pub struct BacktestResult {
    pub bets: Vec<PropPick>,
    pub wins: usize,
    pub losses: usize,
    pub profit: f64,
}

impl BacktestResult {
    /// Score `pick` against the player's realized line. Picks without a
    /// realized line are skipped and not counted; returns whether the pick
    /// was scored.
    pub fn add_result(&mut self, mut pick: PropPick, realized: Option<&StatAverage>) -> bool {
        let Some(actual) = realized.and_then(|r| r.stat(&pick.stat)) else {
            info!(
                "skipping result for {} {}, no stats found",
                pick.player_index(),
                pick.stat
            );
            return false;
        };
        let line = pick.line.line;
        let won = match pick.side {
            Side::Over => actual > line,
            Side::Under => actual < line,
        };
        let outcome = if won {
            let payout = calculate_profit(pick.bet_size, pick.line.odds);
            self.wins += 1;
            self.profit += payout;
            debug!("bet is win: line {} vs actual {}, profit ${:.2}", line, actual, payout);
            Outcome::Win
        } else {
            self.losses += 1;
            self.profit -= pick.bet_size;
            debug!("bet is loss: line {} vs actual {}", line, actual);
            Outcome::Loss
        };
        pick.result = Some(PickResult { outcome, actual });
        self.bets.push(pick);
        true
    }

    pub fn total_bets(&self) -> usize {
        self.wins + self.losses
    }

    pub fn win_rate(&self) -> f64 {
        match self.total_bets() {
            0 => 0.0,
            n => self.wins as f64 / n as f64,
        }
    }

    /// Cumulative edge and line buckets plus disjoint odds bands.
    pub fn breakdown(&self) -> Breakdown {
        Breakdown {
            pct_diff: PCT_DIFF_BUCKETS
                .iter()
                .map(|&k| BucketStats::collect(k, self.bets.iter().filter(|p| p.pct_diff.abs() > k)))
                .collect(),
            diff: DIFF_BUCKETS
                .iter()
                .map(|&k| BucketStats::collect(k, self.bets.iter().filter(|p| p.diff.abs() > k)))
                .collect(),
            line: LINE_BUCKETS
                .iter()
                .map(|&k| BucketStats::collect(k, self.bets.iter().filter(|p| p.line.line < k)))
                .collect(),
            odds: ODDS_BANDS
                .iter()
                .map(|&band| {
                    BucketStats::collect(
                        f64::from(band),
                        self.bets.iter().filter(|p| in_odds_band(p.line.odds, band)),
                    )
                })
                .collect(),
        }
    }
}

/// Final numbers for one strategy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyReport {
    pub id: i64,
    pub name: String,
    pub bets: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    pub profit: f64,
    pub breakdown: Breakdown,
}

pub struct Strategy {
    pub selector: PropSelector,
    pub result: BacktestResult,
}

// ---------------------------------------------------------------------------
// Replay loop
// ---------------------------------------------------------------------------

enum DayLines {
    Mainline(LineMap),
    Alternate(AltLineMap),
}

impl DayLines {
    fn is_empty(&self) -> bool {
        match self {
            DayLines::Mainline(map) => map.is_empty(),
            DayLines::Alternate(map) => map.is_empty(),
        }
    }
}

/// Roster slots for the top players of one side of a replayed game, in the
/// store's order (rate basis, or innings for pitchers).
fn replay_roster(players: &[String], game: &Game, team: &str, config: &BacktestConfig) -> Vec<RosterEntry> {
    players
        .iter()
        .take(config.roster_size)
        .map(|player| RosterEntry {
            sport: game.sport,
            player_index: player.clone(),
            team_index: team.to_string(),
            status: RosterEntry::AVAILABLE.to_string(),
            avg_minutes: config.assumed_minutes,
        })
        .collect()
}

pub struct Backtester<'a> {
    store: &'a dyn StatStore,
    model: &'a ModelConfig,
    config: &'a BacktestConfig,
    strategies: Vec<Strategy>,
}

impl<'a> Backtester<'a> {
    pub fn new(
        store: &'a dyn StatStore,
        model: &'a ModelConfig,
        config: &'a BacktestConfig,
        strategies: &[StrategyConfig],
    ) -> Self {
        let strategies = strategies
            .iter()
            .cloned()
            .map(|s| Strategy {
                selector: PropSelector::new(s),
                result: BacktestResult::default(),
            })
            .collect();
        Self {
            store,
            model,
            config,
            strategies,
        }
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Replay every date in `[start, end]`, then log per-strategy results.
    pub fn run(&mut self) -> Result<Vec<StrategyReport>> {
        let mut date = self.config.start;
        while date <= self.config.end {
            self.backtest_date(date)
                .with_context(|| format!("backtest failed on {date}"))?;
            let Some(next) = date.succ_opt() else {
                break;
            };
            date = next;
        }
        let reports = self.reports();
        for report in &reports {
            log_report(report);
        }
        Ok(reports)
    }

    pub fn backtest_date(&mut self, date: NaiveDate) -> Result<()> {
        let sport = self.model.sport;
        info!("running backtest for {}", date);

        let games = self.store.games_for_date(sport, date)?;
        if games.is_empty() {
            info!("no games on {}", date);
            return Ok(());
        }
        let realized: HashMap<String, StatAverage> = self.store.realized_stats(sport, date)?;

        let lines = match self.config.line_type {
            LineKind::Mainline => {
                DayLines::Mainline(self.store.lines_for_date(sport, date, &self.config.stats)?)
            }
            LineKind::Alternate => DayLines::Alternate(
                self.store
                    .alternate_lines_for_date(sport, date, &self.config.stats)?,
            ),
        };
        if lines.is_empty() {
            info!("no player lines on {}", date);
            return Ok(());
        }

        let predictor = Predictor::new(self.store, self.model);
        let mut analyses: Vec<Analysis> = Vec::new();
        for game in &games {
            info!("analyzing {} vs. {}", game.home_index, game.away_index);
            let players = self.store.players_for_game(sport, game)?;
            // Batters are matched against the pitchers they faced.
            let pitchers = match sport.shape() {
                StatShape::Batting => Some(self.store.pitchers_for_game(game)?),
                StatShape::Basketball => None,
            };
            let partners = pitchers.as_ref().unwrap_or(&players);
            let home = replay_roster(&players.home, game, &game.home_index, self.config);
            let away = replay_roster(&players.away, game, &game.away_index, self.config);
            let home_partners = replay_roster(&partners.home, game, &game.home_index, self.config);
            let away_partners = replay_roster(&partners.away, game, &game.away_index, self.config);
            for (roster, opponents) in [(&home, &away_partners), (&away, &home_partners)] {
                analyses.extend(predictor.run_analysis_on_game(
                    roster,
                    opponents,
                    date,
                    self.config.force_update,
                    self.config.store_predictions,
                )?);
            }
        }

        for strategy in &mut self.strategies {
            let picks = match &lines {
                DayLines::Mainline(map) => strategy.selector.pick_props(map, &analyses),
                DayLines::Alternate(map) => strategy.selector.pick_alternate_props(map, &analyses),
            };
            for pick in picks {
                info!(
                    "{}: {} selected {} {} predicted {:.2} vs. line {:.2}, diff {:.2}, odds {}",
                    strategy.selector.strategy().name,
                    pick.player_index(),
                    pick.side,
                    pick.stat,
                    pick.predicted(),
                    pick.line.line,
                    pick.diff,
                    pick.line.odds
                );
                let actual = realized.get(pick.player_index());
                strategy.result.add_result(pick, actual);
            }
        }
        Ok(())
    }

    pub fn reports(&self) -> Vec<StrategyReport> {
        self.strategies
            .iter()
            .map(|s| StrategyReport {
                id: s.selector.strategy().id,
                name: s.selector.strategy().name.clone(),
                bets: s.result.total_bets(),
                wins: s.result.wins,
                losses: s.result.losses,
                win_rate: s.result.win_rate(),
                profit: s.result.profit,
                breakdown: s.result.breakdown(),
            })
            .collect()
    }
}

fn log_report(report: &StrategyReport) {
    info!(
        "strategy {}: {} bets with {:.2}% winrate, profit ${:.2}",
        report.name,
        report.bets,
        report.win_rate * 100.0,
        report.profit
    );
    let sections = [
        ("pct diff", &report.breakdown.pct_diff),
        ("diff", &report.breakdown.diff),
        ("line", &report.breakdown.line),
        ("odds", &report.breakdown.odds),
    ];
    for (label, buckets) in sections {
        for b in buckets {
            info!(
                "{} {}: {:.3} winrate and ${:.2} profit [{}]",
                label,
                b.key,
                b.win_rate(),
                b.profit,
                b.bets
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outliers::Outliers;
    use chrono::NaiveDateTime;
    use propcast_core::odds::PlayerLine;
    use propcast_core::sport::{Sport, StatShape};

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 5)
            .unwrap()
            .and_hms_opt(17, 0, 0)
            .unwrap()
    }

    fn points_line(points: f64) -> StatAverage {
        StatAverage::from_values(
            StatShape::Basketball,
            1,
            &[34.0, points, 5.0, 5.0, 2.0, 25.0, 110.0, 112.0],
        )
        .unwrap()
    }

    fn pick(side: Side, line: f64, odds: i32, diff: f64, pct_diff: f64) -> PropPick {
        PropPick {
            stat: "points".into(),
            side,
            diff,
            pct_diff,
            bet_size: 100.0,
            line: PlayerLine {
                id: 1,
                sport: Sport::Nba,
                player_index: "p1".into(),
                timestamp: ts(),
                stat: "points".into(),
                side,
                kind: LineKind::Alternate,
                line,
                odds,
                link: String::new(),
            },
            odds: None,
            analysis: Analysis {
                player_index: "p1".into(),
                base: points_line(20.0),
                prediction: points_line(20.0 + diff),
                outliers: Outliers::new(),
            },
            result: None,
        }
    }

    #[test]
    fn profit_from_american_odds() {
        assert!((calculate_profit(100.0, -110) - 90.909).abs() < 1e-3);
        assert!((calculate_profit(100.0, 150) - 150.0).abs() < 1e-9);
        assert!((calculate_profit(50.0, -200) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn over_wins_only_above_line() {
        let mut result = BacktestResult::default();
        assert!(result.add_result(pick(Side::Over, 22.5, -110, 3.0, 0.13), Some(&points_line(23.0))));
        assert!(result.add_result(pick(Side::Over, 22.5, 150, 3.0, 0.13), Some(&points_line(22.0))));
        assert_eq!((result.wins, result.losses), (1, 1));
        assert!((result.profit - (90.909_090_9 - 100.0)).abs() < 1e-6);
        assert_eq!(
            result.bets[0].result,
            Some(PickResult {
                outcome: Outcome::Win,
                actual: 23.0
            })
        );
    }

    #[test]
    fn under_wins_only_below_line_and_push_loses() {
        let mut result = BacktestResult::default();
        result.add_result(pick(Side::Under, 22.5, 120, -3.0, -0.13), Some(&points_line(18.0)));
        result.add_result(pick(Side::Under, 22.0, 120, -3.0, -0.13), Some(&points_line(22.0)));
        assert_eq!((result.wins, result.losses), (1, 1));
        assert!((result.profit - 20.0).abs() < 1e-9);
        assert!((result.win_rate() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn missing_realized_line_is_not_counted() {
        let mut result = BacktestResult::default();
        assert!(!result.add_result(pick(Side::Over, 22.5, -110, 3.0, 0.13), None));
        assert_eq!(result.total_bets(), 0);
        assert!(result.bets.is_empty());
        assert_eq!(result.win_rate(), 0.0);
    }

    #[test]
    fn pct_buckets_are_cumulative() {
        let mut result = BacktestResult::default();
        result.add_result(pick(Side::Over, 20.0, -110, 7.0, 0.35), Some(&points_line(30.0)));
        result.add_result(pick(Side::Under, 20.0, -110, -3.0, -0.15), Some(&points_line(30.0)));
        let breakdown = result.breakdown();
        let bucket = |key: f64| {
            breakdown
                .pct_diff
                .iter()
                .find(|b| (b.key - key).abs() < 1e-9)
                .unwrap()
                .clone()
        };
        assert_eq!(bucket(0.0).bets, 2);
        assert_eq!(bucket(0.1).bets, 2);
        assert_eq!(bucket(0.2).bets, 1);
        assert_eq!(bucket(0.3).bets, 1);
        assert_eq!(bucket(0.4).bets, 0);
        assert_eq!(bucket(0.3).wins, 1);
        assert!((bucket(0.1).profit - (90.909_090_9 - 100.0)).abs() < 1e-6);

        let raw: Vec<usize> = breakdown.diff.iter().map(|b| b.bets).collect();
        assert_eq!(&raw[..8], &[2, 2, 2, 2, 2, 2, 1, 1]);
    }

    #[test]
    fn line_buckets_count_lines_below_key() {
        let mut result = BacktestResult::default();
        result.add_result(pick(Side::Over, 0.5, 300, 1.0, 2.0), Some(&points_line(3.0)));
        result.add_result(pick(Side::Over, 9.5, 300, 1.0, 0.1), Some(&points_line(3.0)));
        let line = result.breakdown().line;
        assert_eq!(line[0].bets, 0);
        assert_eq!(line[1].bets, 1);
        assert_eq!(line[10].bets, 2);
    }

    #[test]
    fn odds_bands() {
        assert!(in_odds_band(-250, 0));
        assert!(in_odds_band(99, 0));
        assert!(!in_odds_band(100, 0));
        assert!(in_odds_band(150, 100));
        assert!(in_odds_band(1000, 1000));
        assert!(in_odds_band(2500, 1000));
        assert!(!in_odds_band(950, 1000));

        let mut result = BacktestResult::default();
        for odds in [-110, 150, 210, 1500] {
            result.add_result(pick(Side::Over, 20.0, odds, 1.0, 0.05), Some(&points_line(25.0)));
        }
        let bands: Vec<usize> = result.breakdown().odds.iter().map(|b| b.bets).collect();
        assert_eq!(bands, vec![1, 1, 1, 0, 0, 0, 0, 0, 0, 0, 1]);
    }
}
