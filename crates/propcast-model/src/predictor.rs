// Per-game analysis: prune both rosters, predict each remaining player
// against the opposing roster, flag outliers, and persist predictions.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::{debug, info};

use propcast_core::config::ModelConfig;
use propcast_core::odds::Side;
use propcast_core::sport::{Sport, StatShape};
use propcast_core::stats::StatAverage;
use propcast_core::store::{Prediction, RosterEntry, StatStore};

use crate::matchup::{MatchupModel, YearMap};
use crate::outliers::{get_outliers, has_outlier, Outliers};

/// A player's current-season line next to the matchup prediction for one
/// game, both in per-game units.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Analysis {
    pub player_index: String,
    pub base: StatAverage,
    pub prediction: StatAverage,
    pub outliers: Outliers,
}

impl Analysis {
    pub fn has_outlier(&self, stat: &str, side: Side) -> bool {
        has_outlier(&self.outliers, stat, side)
    }

    /// Predicted value of `stat`, if the stat exists for this sport.
    pub fn predicted(&self, stat: &str) -> Option<f64> {
        self.prediction.stat(stat)
    }
}

/// Player indexes of available roster slots averaging more than
/// `min_minutes`, in roster order.
pub fn prune_players(roster: &[RosterEntry], min_minutes: f64) -> Vec<String> {
    roster
        .iter()
        .filter(|p| p.is_available() && p.avg_minutes > min_minutes)
        .map(|p| p.player_index.clone())
        .collect()
}

/// Opposing roster slots a player is matched against: the whole roster in
/// basketball, only the pitchers for MLB batters.
pub fn matchup_partners(
    store: &dyn StatStore,
    sport: Sport,
    roster: &[RosterEntry],
) -> Result<Vec<RosterEntry>> {
    match sport.shape() {
        StatShape::Basketball => Ok(roster.to_vec()),
        StatShape::Batting => {
            let mut pitchers = Vec::new();
            for entry in roster {
                if store.has_pitched(&entry.player_index)? {
                    pitchers.push(entry.clone());
                }
            }
            Ok(pitchers)
        }
    }
}

pub struct Predictor<'a> {
    store: &'a dyn StatStore,
    config: &'a ModelConfig,
}

impl<'a> Predictor<'a> {
    pub fn new(store: &'a dyn StatStore, config: &'a ModelConfig) -> Self {
        Self { store, config }
    }

    fn model(&self) -> MatchupModel<'a> {
        MatchupModel::new(self.store, self.config.sport, self.config.min_minutes)
    }

    /// Analyze the top players of `roster` against the top players of
    /// `opponents` for a game on `date`.
    ///
    /// Players with no games in the current season are skipped. When
    /// `store_predictions` is set every produced prediction is upserted.
    pub fn run_analysis_on_game(
        &self,
        roster: &[RosterEntry],
        opponents: &[RosterEntry],
        date: NaiveDate,
        force_update: bool,
        store_predictions: bool,
    ) -> Result<Vec<Analysis>> {
        let mut players = prune_players(roster, self.config.roster_min_minutes);
        players.truncate(self.config.max_players);
        let mut others = prune_players(opponents, self.config.roster_min_minutes);
        others.truncate(self.config.max_opponents);

        let model = self.model();
        let season = self.config.sport.season_year(date);
        let mut analyses = Vec::with_capacity(players.len());

        for player in &players {
            let control = model.get_per_year(player, self.config.history_start, date)?;
            let Some(current) = control.get(&season) else {
                info!("{} has no stats for season {}, skipping", player, season);
                continue;
            };
            let base = current.convert_to_stats();
            let Some(prediction) =
                self.get_or_create_prediction(player, &others, &control, date, force_update)?
            else {
                continue;
            };
            let outliers = get_outliers(&base, &prediction);
            analyses.push(Analysis {
                player_index: player.clone(),
                base,
                prediction,
                outliers,
            });
        }

        if store_predictions && !analyses.is_empty() {
            self.store_predictions(&analyses, date)?;
        }

        Ok(analyses)
    }

    /// The stored prediction for (player, date, model version) unless
    /// `force_update` is set or none exists; otherwise a fresh one.
    pub fn get_or_create_prediction(
        &self,
        player: &str,
        others: &[String],
        control: &YearMap,
        date: NaiveDate,
        force_update: bool,
    ) -> Result<Option<StatAverage>> {
        if !force_update {
            if let Some(stored) = self
                .store
                .get_prediction(player, date, self.config.version)
                .with_context(|| format!("failed to read stored prediction for {player}"))?
            {
                debug!("reusing stored prediction for {} on {}", player, date);
                return Ok(Some(stored.average));
            }
        }
        debug!(
            "creating prediction for {} on {} against {} players",
            player,
            date,
            others.len()
        );
        self.model().create_matchup_prediction(
            player,
            others,
            self.config.relationship,
            control,
            self.config.history_start,
            date,
        )
    }

    pub fn store_predictions(&self, analyses: &[Analysis], date: NaiveDate) -> Result<()> {
        let records: Vec<Prediction> = analyses
            .iter()
            .map(|a| Prediction {
                player_index: a.player_index.clone(),
                date,
                version: self.config.version,
                sport: self.config.sport,
                average: a.prediction,
            })
            .collect();
        info!("storing {} predictions for {}", records.len(), date);
        self.store
            .upsert_predictions(&records)
            .context("failed to store predictions")
    }
}
