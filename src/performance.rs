use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::match_events::EventTally;
use crate::rating::{ClubRatings, RatingWindow, WINDOW_CAPACITY, weight_sum};
use crate::MatchId;

// Shrinkage of goal deviations by opponent strength: f(r) = 0.424 r + 0.548.
const SHRINK_SLOPE: f64 = 0.424;
const SHRINK_INTERCEPT: f64 = 0.548;

fn shrink(rating: f64) -> f64 {
    rating * SHRINK_SLOPE + SHRINK_INTERCEPT
}

pub fn composite_score(adjusted_goals: f64, expected_goals: f64) -> f64 {
    (adjusted_goals + expected_goals) / 2.0
}

/// Goals a club would have to score against this opponent to leave its
/// offensive rating unchanged.
pub fn projected_goals(
    window: &RatingWindow,
    opp_def_rating: f64,
    is_home: bool,
    avg_base: f64,
    home_advantage: f64,
) -> f64 {
    let prev_rating = window.rating();
    let n = (window.len() + 1).min(WINDOW_CAPACITY);
    let projected_mp = prev_rating * weight_sum(n) - window.shifted_contribution(n);

    let ha = if is_home { -home_advantage } else { home_advantage };
    let goals = (projected_mp - ha - avg_base) * shrink(opp_def_rating) / shrink(avg_base)
        + opp_def_rating;
    goals.max(0.0)
}

/// Performance value a club earned in one discipline, given the composite
/// score it produced (offense) or allowed (defense) and the opponent's
/// rating in the opposite discipline.
pub fn match_performance(
    composite: f64,
    opp_rating: f64,
    is_home: bool,
    is_offense: bool,
    avg_base: f64,
    home_advantage: f64,
) -> f64 {
    let ha = if is_home != is_offense {
        home_advantage
    } else {
        -home_advantage
    };
    let perf = (composite - opp_rating) / shrink(opp_rating) * shrink(avg_base) + avg_base + ha;
    perf.max(0.0)
}

/// Per-side inputs for the performance update of one completed match.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStats {
    pub adjusted_goals_home: Option<f64>,
    pub adjusted_goals_away: Option<f64>,
    pub xg_home: Option<f64>,
    pub xg_away: Option<f64>,
}

impl MatchStats {
    /// Stats for a match whose adjusted goals come from its event log.
    pub fn from_events(tally: &EventTally, xg_home: f64, xg_away: f64) -> Self {
        Self {
            adjusted_goals_home: Some(tally.adjusted_home),
            adjusted_goals_away: Some(tally.adjusted_away),
            xg_home: Some(xg_home),
            xg_away: Some(xg_away),
        }
    }

    pub fn composites(&self, match_id: MatchId) -> EngineResult<(f64, f64)> {
        let ag_home = require(self.adjusted_goals_home, match_id, "home adjusted goals")?;
        let ag_away = require(self.adjusted_goals_away, match_id, "away adjusted goals")?;
        let xg_home = require(self.xg_home, match_id, "home expected goals")?;
        let xg_away = require(self.xg_away, match_id, "away expected goals")?;
        Ok((
            composite_score(ag_home, xg_home),
            composite_score(ag_away, xg_away),
        ))
    }
}

fn require(value: Option<f64>, match_id: MatchId, field: &'static str) -> EngineResult<f64> {
    value.ok_or(EngineError::MissingMatchStats { match_id, field })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPerformances {
    pub off_home: f64,
    pub def_home: f64,
    pub off_away: f64,
    pub def_away: f64,
}

/// Performances from two composite scores, rated against the opponents'
/// ratings before the match.
pub fn performances_from_composites(
    composite_home: f64,
    composite_away: f64,
    home: &ClubRatings,
    away: &ClubRatings,
    avg_base: f64,
    home_advantage: f64,
) -> MatchPerformances {
    let (off_h, def_h) = (home.off_rating(), home.def_rating());
    let (off_a, def_a) = (away.off_rating(), away.def_rating());
    MatchPerformances {
        off_home: match_performance(composite_home, def_a, true, true, avg_base, home_advantage),
        def_home: match_performance(composite_away, off_a, true, false, avg_base, home_advantage),
        off_away: match_performance(composite_away, def_h, false, true, avg_base, home_advantage),
        def_away: match_performance(composite_home, off_h, false, false, avg_base, home_advantage),
    }
}

pub fn match_performances(
    match_id: MatchId,
    stats: &MatchStats,
    home: &ClubRatings,
    away: &ClubRatings,
    avg_base: f64,
    home_advantage: f64,
) -> EngineResult<MatchPerformances> {
    let (composite_home, composite_away) = stats.composites(match_id)?;
    Ok(performances_from_composites(
        composite_home,
        composite_away,
        home,
        away,
        avg_base,
        home_advantage,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const AVG: f64 = 1.35;
    const HA: f64 = 0.15;

    fn window(values: &[f64]) -> RatingWindow {
        RatingWindow::from_recent(values).unwrap()
    }

    #[test]
    fn constant_window_projects_home_bias() {
        let w = window(&[1.2; 5]);
        let home = projected_goals(&w, 1.2, true, AVG, HA);
        let away = projected_goals(&w, 1.2, false, AVG, HA);
        assert!((home - 1.2).abs() < 1e-9);
        assert!(away < home);
    }

    #[test]
    fn projected_goals_round_trip_preserves_rating() {
        let histories: [&[f64]; 4] = [
            &[1.3],
            &[1.8, 0.9, 1.2, 1.5, 1.1],
            &[1.0, 1.6, 1.4, 1.3, 0.8, 1.7, 1.2, 1.1, 1.9, 0.7, 1.5, 1.0, 1.3, 1.4, 1.2, 1.1, 1.6, 0.9, 1.0, 1.3, 1.2, 1.5, 1.1, 1.4, 1.2],
            &[2.2, 2.0, 1.9, 2.1],
        ];
        for history in histories {
            for is_home in [true, false] {
                let mut w = window(history);
                let before = w.rating();
                let opp_def = 1.25;
                let goals = projected_goals(&w, opp_def, is_home, AVG, HA);
                let perf = match_performance(goals, opp_def, is_home, true, AVG, HA);
                w.push(perf);
                assert!(
                    (w.rating() - before).abs() < 1e-9,
                    "history {history:?} home={is_home}"
                );
            }
        }
    }

    #[test]
    fn stronger_opponent_earns_more_credit() {
        let vs_strong = match_performance(1.5, 0.9, true, true, AVG, HA);
        let vs_weak = match_performance(1.5, 1.8, true, true, AVG, HA);
        assert!(vs_strong > vs_weak);
    }

    #[test]
    fn home_adjustment_follows_side_and_discipline() {
        let neutral = match_performance(AVG, AVG, true, true, AVG, 0.0);
        assert!((neutral - AVG).abs() < 1e-12);
        // Scoring at home is easier: credit is reduced.
        assert!((match_performance(AVG, AVG, true, true, AVG, HA) - (AVG - HA)).abs() < 1e-12);
        // Conceding at home is rarer: the conceded value is inflated.
        assert!((match_performance(AVG, AVG, true, false, AVG, HA) - (AVG + HA)).abs() < 1e-12);
        assert!((match_performance(AVG, AVG, false, true, AVG, HA) - (AVG + HA)).abs() < 1e-12);
        assert!((match_performance(AVG, AVG, false, false, AVG, HA) - (AVG - HA)).abs() < 1e-12);
    }

    #[test]
    fn performance_is_floored_at_zero() {
        assert_eq!(match_performance(0.0, 3.5, true, true, AVG, HA), 0.0);
        let w = window(&[0.0; 3]);
        assert_eq!(projected_goals(&w, 0.2, false, AVG, HA), 0.0);
    }

    #[test]
    fn missing_stats_are_reported_per_field() {
        let stats = MatchStats {
            adjusted_goals_home: Some(1.05),
            adjusted_goals_away: Some(0.0),
            xg_home: None,
            xg_away: Some(0.4),
        };
        let ratings = ClubRatings::seeded(1.3, 1.3);
        let err = match_performances(7, &stats, &ratings, &ratings, AVG, HA).unwrap_err();
        assert_eq!(
            err,
            EngineError::MissingMatchStats {
                match_id: 7,
                field: "home expected goals"
            }
        );
        assert!(err.is_data_integrity());
    }
}
