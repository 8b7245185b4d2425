// Matchup factors: how a player's per-unit production shifts in games
// involving a specific other player, folded into a forward prediction.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::debug;

use propcast_core::sport::Sport;
use propcast_core::stats::{StatAverage, StatError};
use propcast_core::store::{Relationship, StatStore};

/// Season year -> per-unit-of-basis average for that season.
pub type YearMap = BTreeMap<i32, StatAverage>;

// ---------------------------------------------------------------------------
// Factor arithmetic
// ---------------------------------------------------------------------------

/// Game-weighted fractional change of `related` relative to `control`,
/// folded across every season present in `related`.
///
/// Seasons only in `control` are ignored, and seasons in `related` without
/// a matching control season are skipped. Returns `None` when no season
/// contributes.
pub fn calculate_pip_factor(
    control: &YearMap,
    related: &YearMap,
) -> Result<Option<StatAverage>, StatError> {
    let mut factor: Option<StatAverage> = None;
    for (year, related_avg) in related {
        let Some(control_avg) = control.get(year) else {
            debug!("no control average for season {}, skipping", year);
            continue;
        };
        let change = related_avg.compare_avg(control_avg)?;
        factor = Some(match factor {
            Some(acc) => acc.add_avg(&change)?,
            None => change,
        });
    }
    Ok(factor)
}

// ---------------------------------------------------------------------------
// Store-backed model
// ---------------------------------------------------------------------------

/// Reads yearly averages for one sport through a [`StatStore`].
pub struct MatchupModel<'a> {
    store: &'a dyn StatStore,
    sport: Sport,
    min_basis: f64,
}

impl<'a> MatchupModel<'a> {
    /// `min_basis` excludes games where the player's rate basis (minutes,
    /// plate appearances) is at or below it.
    pub fn new(store: &'a dyn StatStore, sport: Sport, min_basis: f64) -> Self {
        Self {
            store,
            sport,
            min_basis,
        }
    }

    /// Per-unit averages for every season in `[start, end)` where the player
    /// has at least one qualifying game.
    pub fn get_per_year(&self, player: &str, start: NaiveDate, end: NaiveDate) -> Result<YearMap> {
        let mut years = YearMap::new();
        for window in self.sport.season_windows(start, end) {
            let avg = self
                .store
                .season_average(self.sport, player, &window, self.min_basis)
                .with_context(|| {
                    format!("failed to load {player} averages for season {}", window.season_year)
                })?;
            if avg.is_valid() {
                years.insert(window.season_year, avg.convert_to_per());
            }
        }
        Ok(years)
    }

    /// As [`MatchupModel::get_per_year`], restricted to games where `other`
    /// took part according to `relationship`.
    pub fn get_per_year_with_relation(
        &self,
        player: &str,
        other: &str,
        relationship: Relationship,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<YearMap> {
        let mut years = YearMap::new();
        for window in self.sport.season_windows(start, end) {
            let avg = self
                .store
                .season_average_with(self.sport, player, other, relationship, &window, self.min_basis)
                .with_context(|| {
                    format!(
                        "failed to load {player} averages with {relationship} {other} for season {}",
                        window.season_year
                    )
                })?;
            if avg.is_valid() {
                years.insert(window.season_year, avg.convert_to_per());
            }
        }
        Ok(years)
    }

    /// Fold the factors of every player in `others` into one game-weighted
    /// factor. Players without any shared history contribute nothing.
    pub fn matchup_factor(
        &self,
        player: &str,
        others: &[String],
        relationship: Relationship,
        control: &YearMap,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<StatAverage>> {
        let mut total: Option<StatAverage> = None;
        for other in others {
            let related = self.get_per_year_with_relation(player, other, relationship, start, end)?;
            let Some(factor) = calculate_pip_factor(control, &related)? else {
                debug!("{} has no shared games with {} {}", player, relationship, other);
                continue;
            };
            total = Some(match total {
                Some(acc) => acc.add_avg(&factor)?,
                None => factor,
            });
        }
        Ok(total)
    }

    /// Predict the player's line on `end` from the current-season control
    /// average and the folded matchup factor.
    ///
    /// Returns `None` when `control` has no entry for the season containing
    /// `end`. With no factor at all, a zero factor of zero games is applied:
    /// the prediction equals the control per-game line and carries no
    /// supporting weight.
    pub fn create_matchup_prediction(
        &self,
        player: &str,
        others: &[String],
        relationship: Relationship,
        control: &YearMap,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Option<StatAverage>> {
        let season = self.sport.season_year(end);
        let Some(current) = control.get(&season) else {
            return Ok(None);
        };
        let factor = self
            .matchup_factor(player, others, relationship, control, start, end)?
            .unwrap_or_else(|| StatAverage::invalid(self.sport.shape()));
        Ok(Some(current.predict_stats(&factor)?))
    }
}
