// Pick selection: match predictions to sportsbook lines, measure the edge,
// rank candidates and keep the ones a strategy accepts.

use std::cmp::Ordering;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use propcast_core::config::{StrategyConfig, ThresholdType};
use propcast_core::odds::{AltLineMap, LineMap, PlayerLine, PlayerOdds, Side};
use propcast_core::store::StatStore;

use crate::predictor::Analysis;

// ---------------------------------------------------------------------------
// Pick types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Outcome {
    Win,
    Loss,
}

/// How a pick fared against the realized box score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PickResult {
    pub outcome: Outcome,
    pub actual: f64,
}

/// A candidate or accepted wager on one side of one player line.
#[derive(Debug, Clone, PartialEq)]
pub struct PropPick {
    pub stat: String,
    pub side: Side,
    /// Prediction minus the reference line.
    pub diff: f64,
    /// `diff` as a fraction of the reference line.
    pub pct_diff: f64,
    pub bet_size: f64,
    /// The line wagered on.
    pub line: PlayerLine,
    /// Both sides of the prop, for mainline picks.
    pub odds: Option<PlayerOdds>,
    pub analysis: Analysis,
    pub result: Option<PickResult>,
}

impl PropPick {
    pub fn line_id(&self) -> i64 {
        self.line.id
    }

    pub fn player_index(&self) -> &str {
        &self.analysis.player_index
    }

    pub fn predicted(&self) -> f64 {
        self.analysis.predicted(&self.stat).unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Edge computation
// ---------------------------------------------------------------------------

fn fraction_of(diff: f64, line: f64) -> f64 {
    if line == 0.0 {
        0.0
    } else {
        diff / line
    }
}

/// Raw and fractional edge of `prediction` against an over/under pair.
///
/// The over line is the reference when the prediction reaches it, the under
/// line otherwise.
pub fn odds_diff(odds: &PlayerOdds, prediction: f64) -> (f64, f64) {
    let line = if prediction >= odds.over.line {
        odds.over.line
    } else {
        odds.under.line
    };
    let diff = prediction - line;
    (diff, fraction_of(diff, line))
}

// ---------------------------------------------------------------------------
// Selector
// ---------------------------------------------------------------------------

pub struct PropSelector {
    strategy: StrategyConfig,
}

impl PropSelector {
    pub fn new(strategy: StrategyConfig) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &StrategyConfig {
        &self.strategy
    }

    /// Select picks from over/under mainlines.
    pub fn pick_props(&self, props: &LineMap, analyses: &[Analysis]) -> Vec<PropPick> {
        let mut candidates = Vec::new();
        for analysis in analyses {
            let Some(player_props) = props.get(&analysis.player_index) else {
                continue;
            };
            for (stat, prediction) in analysis.prediction.stats() {
                let Some(odds) = player_props.get(stat) else {
                    continue;
                };
                let (diff, pct_diff) = odds_diff(odds, prediction);
                let side = if diff > 0.0 { Side::Over } else { Side::Under };
                candidates.push(PropPick {
                    stat: stat.to_string(),
                    side,
                    diff,
                    pct_diff,
                    bet_size: self.strategy.bet_size,
                    line: odds.side(side).clone(),
                    odds: Some(odds.clone()),
                    analysis: analysis.clone(),
                    result: None,
                });
            }
        }
        self.select(candidates)
    }

    /// Select picks from alternate-line ladders. Each line on the same side
    /// as the prediction is its own candidate.
    pub fn pick_alternate_props(&self, props: &AltLineMap, analyses: &[Analysis]) -> Vec<PropPick> {
        let mut candidates = Vec::new();
        for analysis in analyses {
            let Some(player_props) = props.get(&analysis.player_index) else {
                continue;
            };
            for (stat, prediction) in analysis.prediction.stats() {
                let Some(ladder) = player_props.get(stat) else {
                    continue;
                };
                for line in ladder {
                    let on_side = match line.side {
                        Side::Over => prediction > line.line,
                        Side::Under => prediction < line.line,
                    };
                    if !on_side {
                        continue;
                    }
                    let diff = prediction - line.line;
                    candidates.push(PropPick {
                        stat: stat.to_string(),
                        side: line.side,
                        diff,
                        pct_diff: fraction_of(diff, line.line),
                        bet_size: self.strategy.bet_size,
                        line: line.clone(),
                        odds: None,
                        analysis: analysis.clone(),
                        result: None,
                    });
                }
            }
        }
        self.select(candidates)
    }

    /// Rank candidates and accept them greedily under the per-side caps.
    fn select(&self, mut candidates: Vec<PropPick>) -> Vec<PropPick> {
        self.sort_picks(&mut candidates);

        let (mut overs, mut unders) = (0usize, 0usize);
        let mut selected = Vec::new();
        for pick in candidates {
            let full = match pick.side {
                Side::Over => overs >= self.strategy.max_over,
                Side::Under => unders >= self.strategy.max_under,
            };
            if full || !self.is_pick_eligible(&pick) {
                continue;
            }
            match pick.side {
                Side::Over => overs += 1,
                Side::Under => unders += 1,
            }
            selected.push(pick);
        }
        debug!(
            "strategy {} selected {} overs and {} unders",
            self.strategy.name, overs, unders
        );
        selected
    }

    /// Rank descending, then `|pct_diff|` descending. Stable.
    fn sort_picks(&self, picks: &mut [PropPick]) {
        picks.sort_by(|a, b| {
            self.strategy
                .rank(&b.stat)
                .cmp(&self.strategy.rank(&a.stat))
                .then_with(|| {
                    b.pct_diff
                        .abs()
                        .partial_cmp(&a.pct_diff.abs())
                        .unwrap_or(Ordering::Equal)
                })
        });
    }

    pub fn is_pick_eligible(&self, pick: &PropPick) -> bool {
        let s = &self.strategy;
        let line = &pick.line;

        if line.odds < s.min_odds {
            return false;
        }
        if s.max_odds.is_some_and(|max| line.odds > max) {
            return false;
        }
        if s.min_line != 0.0 && line.line < s.min_line {
            return false;
        }
        if s.max_line.is_some_and(|max| line.line > max) {
            return false;
        }
        if s.min_diff != 0.0 && pick.diff.abs() < s.min_diff {
            return false;
        }
        if s.min_minutes != 0.0 && pick.analysis.prediction.basis() < s.min_minutes {
            return false;
        }
        if s.min_games != 0 && pick.analysis.prediction.num_games() < s.min_games {
            return false;
        }
        let Some(&threshold) = s.thresholds.get(&pick.stat) else {
            return false;
        };
        if s.require_outlier && !pick.analysis.has_outlier(&pick.stat, pick.side) {
            return false;
        }
        let edge = match s.threshold_type {
            ThresholdType::Raw => pick.diff,
            ThresholdType::Percent => pick.pct_diff,
        };
        edge.abs() > threshold
    }

    /// Replace this strategy's valid picks for `date` with `picks`.
    pub fn save_picks(&self, store: &dyn StatStore, date: NaiveDate, picks: &[PropPick]) -> Result<()> {
        let line_ids: Vec<i64> = picks.iter().map(PropPick::line_id).collect();
        store
            .replace_picks(self.strategy.id, date, &line_ids)
            .with_context(|| format!("failed to save picks for strategy {}", self.strategy.name))?;
        info!(
            "saved {} picks for strategy {} on {}",
            line_ids.len(),
            self.strategy.name,
            date
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use propcast_core::config::default_rankings;
    use propcast_core::odds::LineKind;
    use propcast_core::sport::{Sport, StatShape};
    use propcast_core::stats::StatAverage;
    use std::collections::HashMap;

    // ---- Test helpers ----

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 1, 5)
            .unwrap()
            .and_hms_opt(17, 0, 0)
            .unwrap()
    }

    fn player_line(id: i64, player: &str, stat: &str, side: Side, kind: LineKind, line: f64, odds: i32) -> PlayerLine {
        PlayerLine {
            id,
            sport: Sport::Nba,
            player_index: player.into(),
            timestamp: ts(),
            stat: stat.into(),
            side,
            kind,
            line,
            odds,
            link: String::new(),
        }
    }

    fn mainline(ids: (i64, i64), player: &str, stat: &str, line: f64, odds: (i32, i32)) -> PlayerOdds {
        PlayerOdds {
            over: player_line(ids.0, player, stat, Side::Over, LineKind::Mainline, line, odds.0),
            under: player_line(ids.1, player, stat, Side::Under, LineKind::Mainline, line, odds.1),
        }
    }

    fn analysis(player: &str, games: u32, minutes: f64, points: f64, rebounds: f64, assists: f64) -> Analysis {
        let prediction = StatAverage::from_values(
            StatShape::Basketball,
            games,
            &[minutes, points, rebounds, assists, 3.0, 25.0, 110.0, 112.0],
        )
        .unwrap();
        Analysis {
            player_index: player.into(),
            base: prediction,
            prediction,
            outliers: Default::default(),
        }
    }

    fn strategy(threshold_type: ThresholdType, thresholds: &[(&str, f64)]) -> StrategyConfig {
        StrategyConfig {
            id: 1,
            name: "Test".into(),
            thresholds: thresholds.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            threshold_type,
            rankings: default_rankings(),
            min_odds: -200,
            max_odds: None,
            min_line: 0.0,
            max_line: None,
            min_diff: 0.0,
            min_games: 0,
            min_minutes: 0.0,
            require_outlier: false,
            bet_size: 50.0,
            max_over: 10,
            max_under: 10,
        }
    }

    fn props(entries: Vec<(&str, &str, PlayerOdds)>) -> LineMap {
        let mut map: LineMap = HashMap::new();
        for (player, stat, odds) in entries {
            map.entry(player.to_string()).or_default().insert(stat.to_string(), odds);
        }
        map
    }

    // ---- odds_diff ----

    #[test]
    fn odds_diff_uses_over_line_when_prediction_reaches_it() {
        let odds = mainline((1, 2), "p1", "points", 22.5, (-110, -110));
        let (diff, pct) = odds_diff(&odds, 26.0);
        assert!((diff - 3.5).abs() < 1e-9);
        assert!((pct - 3.5 / 22.5).abs() < 1e-9);
    }

    #[test]
    fn odds_diff_uses_under_line_below_over() {
        let mut odds = mainline((1, 2), "p1", "points", 22.5, (-110, -110));
        odds.under.line = 21.5;
        let (diff, pct) = odds_diff(&odds, 20.0);
        assert!((diff + 1.5).abs() < 1e-9);
        assert!((pct + 1.5 / 21.5).abs() < 1e-9);
    }

    // ---- pick_props ----

    #[test]
    fn percent_threshold_picks_over() {
        let selector = PropSelector::new(strategy(ThresholdType::Percent, &[("points", 0.1)]));
        let lines = props(vec![("p1", "points", mainline((1, 2), "p1", "points", 22.5, (-110, -110)))]);
        let picks = selector.pick_props(&lines, &[analysis("p1", 20, 35.0, 26.0, 9.0, 6.0)]);
        assert_eq!(picks.len(), 1);
        let pick = &picks[0];
        assert_eq!(pick.side, Side::Over);
        assert_eq!(pick.line_id(), 1);
        assert!((pick.pct_diff - 0.15556).abs() < 1e-4);
        assert_eq!(pick.bet_size, 50.0);
        assert!(pick.odds.is_some());
    }

    #[test]
    fn missing_threshold_is_ineligible() {
        let selector = PropSelector::new(strategy(ThresholdType::Raw, &[("points", 1.0)]));
        let lines = props(vec![("p1", "rebounds", mainline((1, 2), "p1", "rebounds", 4.5, (-110, -110)))]);
        assert!(selector
            .pick_props(&lines, &[analysis("p1", 20, 35.0, 26.0, 9.0, 6.0)])
            .is_empty());
    }

    #[test]
    fn ranking_orders_stats_before_edge_size() {
        let selector = PropSelector::new(strategy(
            ThresholdType::Raw,
            &[("points", 0.0), ("rebounds", 0.0), ("assists", 0.0)],
        ));
        let lines = props(vec![
            ("p1", "assists", mainline((5, 6), "p1", "assists", 2.5, (-110, -110))),
            ("p1", "points", mainline((1, 2), "p1", "points", 25.5, (-110, -110))),
            ("p1", "rebounds", mainline((3, 4), "p1", "rebounds", 4.5, (-110, -110))),
            ("p2", "points", mainline((7, 8), "p2", "points", 10.5, (-110, -110))),
        ]);
        let picks = selector.pick_props(
            &lines,
            &[
                analysis("p1", 20, 35.0, 26.0, 9.0, 6.0),
                analysis("p2", 20, 30.0, 14.0, 3.0, 2.0),
            ],
        );
        let order: Vec<(&str, &str)> = picks.iter().map(|p| (p.player_index(), p.stat.as_str())).collect();
        assert_eq!(
            order,
            vec![("p2", "points"), ("p1", "points"), ("p1", "rebounds"), ("p1", "assists")]
        );
    }

    #[test]
    fn side_caps_limit_selection() {
        let mut config = strategy(ThresholdType::Raw, &[("points", 0.5)]);
        config.max_over = 1;
        config.max_under = 0;
        let selector = PropSelector::new(config);
        let lines = props(vec![
            ("p1", "points", mainline((1, 2), "p1", "points", 20.5, (-110, -110))),
            ("p2", "points", mainline((3, 4), "p2", "points", 20.5, (-110, -110))),
            ("p3", "points", mainline((5, 6), "p3", "points", 20.5, (-110, -110))),
        ]);
        let picks = selector.pick_props(
            &lines,
            &[
                analysis("p1", 20, 35.0, 24.0, 5.0, 5.0),
                analysis("p2", 20, 35.0, 28.0, 5.0, 5.0),
                analysis("p3", 20, 35.0, 12.0, 5.0, 5.0),
            ],
        );
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].player_index(), "p2");
    }

    #[test]
    fn eligibility_filters() {
        let lines = props(vec![("p1", "points", mainline((1, 2), "p1", "points", 22.5, (-150, 120)))]);
        let candidates = [analysis("p1", 5, 18.0, 26.0, 5.0, 5.0)];
        let base = strategy(ThresholdType::Raw, &[("points", 1.0)]);

        let cases: Vec<(&str, StrategyConfig, bool)> = vec![
            ("baseline", StrategyConfig { min_odds: -200, ..base.clone() }, true),
            ("min odds", StrategyConfig { min_odds: -135, ..base.clone() }, false),
            ("max odds", StrategyConfig { max_odds: Some(-160), ..base.clone() }, false),
            ("min line", StrategyConfig { min_line: 23.0, ..base.clone() }, false),
            ("max line", StrategyConfig { max_line: Some(20.0), ..base.clone() }, false),
            ("min diff", StrategyConfig { min_diff: 4.0, ..base.clone() }, false),
            ("min minutes", StrategyConfig { min_minutes: 20.0, ..base.clone() }, false),
            ("min games", StrategyConfig { min_games: 10, ..base.clone() }, false),
            ("require outlier", StrategyConfig { require_outlier: true, ..base.clone() }, false),
            ("threshold", StrategyConfig { thresholds: HashMap::from([("points".into(), 3.5)]), ..base.clone() }, false),
        ];
        for (name, config, expected) in cases {
            let picks = PropSelector::new(config).pick_props(&lines, &candidates);
            assert_eq!(picks.len() == 1, expected, "case: {name}");
        }
    }

    #[test]
    fn require_outlier_accepts_matching_side() {
        let mut config = strategy(ThresholdType::Raw, &[("points", 1.0)]);
        config.require_outlier = true;
        let lines = props(vec![("p1", "points", mainline((1, 2), "p1", "points", 22.5, (-110, -110)))]);
        let mut candidate = analysis("p1", 20, 35.0, 26.0, 5.0, 5.0);
        candidate.outliers.insert("points".into(), 0.3);
        assert_eq!(PropSelector::new(config.clone()).pick_props(&lines, &[candidate.clone()]).len(), 1);
        candidate.outliers.insert("points".into(), -0.3);
        assert!(PropSelector::new(config).pick_props(&lines, &[candidate]).is_empty());
    }

    // ---- pick_alternate_props ----

    #[test]
    fn alternate_lines_only_on_prediction_side() {
        let mut config = strategy(ThresholdType::Percent, &[("points", 0.1)]);
        config.max_odds = Some(200);
        let selector = PropSelector::new(config);
        let mut alts: AltLineMap = HashMap::new();
        alts.entry("p1".into()).or_default().insert(
            "points".into(),
            vec![
                player_line(10, "p1", "points", Side::Over, LineKind::Alternate, 23.5, 150),
                player_line(11, "p1", "points", Side::Under, LineKind::Alternate, 27.5, 180),
                player_line(12, "p1", "points", Side::Over, LineKind::Alternate, 27.5, 190),
                player_line(13, "p1", "points", Side::Over, LineKind::Alternate, 19.5, -250),
            ],
        );
        let picks = selector.pick_alternate_props(&alts, &[analysis("p1", 20, 35.0, 26.0, 9.0, 6.0)]);
        assert_eq!(picks.len(), 1);
        assert_eq!(picks[0].line_id(), 10);
        assert_eq!(picks[0].side, Side::Over);
        assert!((picks[0].diff - 2.5).abs() < 1e-9);
        assert!(picks[0].odds.is_none());
    }

    #[test]
    fn save_picks_replaces_previous_set() {
        use propcast_core::db::Database;
        let db = Database::open(":memory:").unwrap();
        db.upsert_player("p1", Sport::Nba, "Player One").unwrap();
        let line = player_line(0, "p1", "points", Side::Over, LineKind::Mainline, 22.5, -110);
        db.insert_player_lines(&[line.clone()]).unwrap();
        let map = db
            .lines_for_date(Sport::Nba, ts().date(), &[])
            .unwrap();
        assert!(map.is_empty(), "one-sided props are dropped");

        let under = player_line(0, "p1", "points", Side::Under, LineKind::Mainline, 22.5, -110);
        db.insert_player_lines(&[under]).unwrap();
        let map = db.lines_for_date(Sport::Nba, ts().date(), &[]).unwrap();

        let selector = PropSelector::new(strategy(ThresholdType::Raw, &[("points", 1.0)]));
        let picks = selector.pick_props(&map, &[analysis("p1", 20, 35.0, 26.0, 5.0, 5.0)]);
        assert_eq!(picks.len(), 1);
        selector.save_picks(&db, ts().date(), &picks).unwrap();
        selector.save_picks(&db, ts().date(), &picks).unwrap();
        assert_eq!(db.valid_picks(1, ts().date()).unwrap(), vec![picks[0].line_id()]);
    }
}
