use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::competition::{CompetitionParams, ModelParams};
use crate::error::{EngineError, EngineResult};
use crate::outcome::{Prob3, outcome_probs};
use crate::performance::{MatchPerformances, MatchStats, match_performances, projected_goals};
use crate::rating::ClubRatings;
use crate::scheduler::{Projection, SimulationOptions, projections_from_results, run_simulations};
use crate::scoring::{ForecastScore, classify_outcome};
use crate::simulation::{Fixture, SimTableRow};
use crate::standings::{
    DeductionLedger, MarketValue, TableSnapshot, market_z_scores, seed_ratings,
};
use crate::{ClubId, CompetitionId, MatchId, Season};

/// Ratings carried from one replayed season into the next.
#[derive(Debug, Clone, Default)]
pub struct SeasonContext {
    closing: HashMap<ClubId, (f64, f64)>,
    previous_averages: HashMap<ClubId, (f64, f64)>,
    seasons_replayed: usize,
}

impl SeasonContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Off/def averages from the season before the first replayed one. Only
    /// consulted until a season has been replayed.
    pub fn with_previous_averages(averages: HashMap<ClubId, (f64, f64)>) -> Self {
        Self {
            previous_averages: averages,
            ..Self::default()
        }
    }

    pub fn prior(&self, club_id: ClubId) -> Option<(f64, f64)> {
        if self.seasons_replayed == 0 {
            self.previous_averages.get(&club_id).copied()
        } else {
            self.closing.get(&club_id).copied()
        }
    }

    pub fn closing_ratings(&self) -> &HashMap<ClubId, (f64, f64)> {
        &self.closing
    }

    pub fn seasons_replayed(&self) -> usize {
        self.seasons_replayed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonMatch {
    pub id: MatchId,
    pub matchweek: u32,
    pub time: NaiveDateTime,
    pub home: ClubId,
    pub away: ClubId,
    pub completed: bool,
    pub score_home: Option<u32>,
    pub score_away: Option<u32>,
    pub stats: MatchStats,
}

impl SeasonMatch {
    fn fixture(&self) -> Fixture {
        Fixture {
            home: self.home,
            away: self.away,
        }
    }

    fn scores(&self) -> EngineResult<(u32, u32)> {
        let home = self.score_home.ok_or(EngineError::MissingMatchStats {
            match_id: self.id,
            field: "home score",
        })?;
        let away = self.score_away.ok_or(EngineError::MissingMatchStats {
            match_id: self.id,
            field: "away score",
        })?;
        Ok((home, away))
    }
}

#[derive(Debug, Clone, Default)]
pub struct SeasonInput {
    pub season: Season,
    pub clubs: Vec<ClubId>,
    pub market_values: Vec<MarketValue>,
    /// Every match of the season, completed or not.
    pub matches: Vec<SeasonMatch>,
    pub deductions: DeductionLedger,
    /// Matchweeks rescheduled wholesale; the table moves past them without
    /// waiting for their matches.
    pub postponed: BTreeSet<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReplayOptions {
    /// Project the rest of the season at every matchweek boundary.
    pub project: bool,
    pub simulation: SimulationOptions,
}

/// Ratings and outcome probabilities going into a match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchPrediction {
    pub match_id: MatchId,
    pub home_off: f64,
    pub home_def: f64,
    pub home_efi: f64,
    pub away_off: f64,
    pub away_def: f64,
    pub away_efi: f64,
    pub probs: Prob3,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchUpdate {
    pub match_id: MatchId,
    pub performances: MatchPerformances,
}

#[derive(Debug, Clone, Default)]
pub struct SeasonOutput {
    /// Seed rows first, then two rows per completed match.
    pub history: Vec<TableSnapshot>,
    pub predictions: Vec<MatchPrediction>,
    pub performances: Vec<MatchUpdate>,
    pub projections: Vec<Projection>,
    pub forecast: ForecastScore,
    pub table: BTreeMap<ClubId, TableSnapshot>,
    pub ratings: BTreeMap<ClubId, ClubRatings>,
}

/// Tracks the matchweek shown for the table as matches are played in time
/// order.
#[derive(Debug, Clone)]
struct MatchweekTracker<'a> {
    current: u32,
    postponed: &'a BTreeSet<u32>,
}

impl<'a> MatchweekTracker<'a> {
    fn new(postponed: &'a BTreeSet<u32>) -> Self {
        Self {
            current: 0,
            postponed,
        }
    }

    fn next_expected(&self) -> u32 {
        let mut next = self.current + 1;
        while self.postponed.contains(&next) {
            next += 1;
        }
        next
    }

    /// Returns the previous matchweek when `matchweek` opens a new one. The
    /// first matchweek seen opens the season whatever its number.
    fn observe(&mut self, matchweek: u32) -> Option<u32> {
        let opening = self.current == 0 && matchweek > 0;
        if opening || matchweek == self.current + 1 || matchweek == self.next_expected() {
            let previous = self.current;
            self.current = matchweek;
            Some(previous)
        } else {
            None
        }
    }
}

/// Matchweek each match is displayed under, in input order. `matches` must be
/// sorted by kick-off time.
pub fn assign_display_matchweeks(matches: &[SeasonMatch], postponed: &BTreeSet<u32>) -> Vec<u32> {
    let mut tracker = MatchweekTracker::new(postponed);
    matches
        .iter()
        .map(|m| {
            tracker.observe(m.matchweek);
            tracker.current
        })
        .collect()
}

pub fn predict_match(
    match_id: MatchId,
    home: &ClubRatings,
    away: &ClubRatings,
    params: ModelParams,
) -> MatchPrediction {
    let (home_off, home_def) = (home.off_rating(), home.def_rating());
    let (away_off, away_def) = (away.off_rating(), away.def_rating());
    let lambda_home = projected_goals(
        &home.off,
        away_def,
        true,
        params.avg_base,
        params.home_advantage,
    );
    let lambda_away = projected_goals(
        &away.off,
        home_def,
        false,
        params.avg_base,
        params.home_advantage,
    );
    MatchPrediction {
        match_id,
        home_off,
        home_def,
        home_efi: home.efi(),
        away_off,
        away_def,
        away_efi: away.efi(),
        probs: outcome_probs(lambda_home, lambda_away),
    }
}

/// Predictions for upcoming matches that are the next match of both clubs.
pub fn predict_next_fixtures(
    clubs: &BTreeMap<ClubId, ClubRatings>,
    upcoming: &[SeasonMatch],
    params: ModelParams,
) -> EngineResult<Vec<MatchPrediction>> {
    let mut next: HashMap<ClubId, NaiveDateTime> = HashMap::new();
    for m in upcoming.iter().filter(|m| !m.completed) {
        for club in [m.home, m.away] {
            next.entry(club)
                .and_modify(|t| *t = (*t).min(m.time))
                .or_insert(m.time);
        }
    }

    let mut selected: Vec<&SeasonMatch> = upcoming
        .iter()
        .filter(|m| !m.completed)
        .filter(|m| next.get(&m.home) == Some(&m.time) && next.get(&m.away) == Some(&m.time))
        .collect();
    selected.sort_by_key(|m| (m.time, m.id));

    selected
        .into_iter()
        .map(|m| {
            let home = clubs.get(&m.home).ok_or(EngineError::UnknownClub(m.home))?;
            let away = clubs.get(&m.away).ok_or(EngineError::UnknownClub(m.away))?;
            Ok(predict_match(m.id, home, away, params))
        })
        .collect()
}

/// Replays a season's completed matches in kick-off order, building the
/// snapshot chain and, when asked, a projection at each matchweek boundary
/// and after the last completed match. Ends by predicting the next fixtures
/// and handing the closing ratings back to `ctx`.
pub fn replay_season(
    ctx: &mut SeasonContext,
    competition: &CompetitionParams,
    mut input: SeasonInput,
    options: &ReplayOptions,
) -> EngineResult<SeasonOutput> {
    let params = competition.require_model()?;
    let regression = competition.require_seed_regression()?;
    let competition_id = competition.id;
    let season = input.season;

    input.matches.sort_by_key(|m| (m.time, m.id));
    let market_z = market_z_scores(&input.market_values);

    let mut out = SeasonOutput::default();
    for &club_id in &input.clubs {
        let z = market_z.get(&club_id).copied().unwrap_or_else(|| {
            warn!(club_id, season, "no market value, seeding at league average");
            (0.0, 0.0)
        });
        let (off, def) = seed_ratings(ctx.prior(club_id), z, &regression);
        let ratings = ClubRatings::seeded(off, def);
        let row = TableSnapshot::seed(competition_id, season, club_id, &ratings);
        out.history.push(row.clone());
        out.table.insert(club_id, row);
        out.ratings.insert(club_id, ratings);
    }

    let completed = input.matches.iter().filter(|m| m.completed).count();
    info!(
        competition_id,
        season,
        clubs = input.clubs.len(),
        completed,
        upcoming = input.matches.len() - completed,
        "replaying season"
    );

    let mut as_of = input
        .matches
        .first()
        .map(|m| m.time.date() - Duration::days(1));
    let mut applied: HashSet<MatchId> = HashSet::new();
    let mut tracker = MatchweekTracker::new(&input.postponed);

    for m in input.matches.iter().filter(|m| m.completed) {
        let opened = tracker.observe(m.matchweek);
        if opened.is_none() && m.matchweek > tracker.next_expected() {
            warn!(
                match_id = m.id,
                matchweek = m.matchweek,
                current = tracker.current,
                "match played ahead of the table's matchweek"
            );
        }
        if let Some(previous) = opened
            && options.project
            && let Some(date) = as_of
        {
            let remaining = remaining_fixtures(&input.matches, &applied);
            project(
                &mut out,
                competition_id,
                season,
                previous,
                date,
                &remaining,
                params,
                &options.simulation,
            )?;
        }

        let home = *out.ratings.get(&m.home).ok_or(EngineError::UnknownClub(m.home))?;
        let away = *out.ratings.get(&m.away).ok_or(EngineError::UnknownClub(m.away))?;

        let prediction = predict_match(m.id, &home, &away, params);
        let perf = match_performances(
            m.id,
            &m.stats,
            &home,
            &away,
            params.avg_base,
            params.home_advantage,
        )?;
        let (score_home, score_away) = m.scores()?;

        out.forecast
            .add(prediction.probs, classify_outcome(score_home, score_away));
        out.predictions.push(prediction);
        out.performances.push(MatchUpdate {
            match_id: m.id,
            performances: perf,
        });

        let match_date = m.time.date();
        for (club_id, off, def, goals_for, goals_against) in [
            (m.home, perf.off_home, perf.def_home, score_home, score_away),
            (m.away, perf.off_away, perf.def_away, score_away, score_home),
        ] {
            let ratings = out
                .ratings
                .get_mut(&club_id)
                .ok_or(EngineError::UnknownClub(club_id))?;
            ratings.push(off, def);

            let delta = input
                .deductions
                .take(competition_id, season, club_id, match_date);
            if delta != 0 {
                info!(club_id, season, delta, %match_date, "points adjustment applied");
            }

            let previous = out
                .table
                .get(&club_id)
                .ok_or(EngineError::UnknownClub(club_id))?;
            let next = previous.apply_match(ratings, m.id, goals_for, goals_against, delta);
            out.history.push(next.clone());
            out.table.insert(club_id, next);
        }

        applied.insert(m.id);
        as_of = Some(match_date);
        debug!(match_id = m.id, matchweek = tracker.current, "match applied");
    }

    if options.project
        && let Some(date) = as_of
    {
        let remaining = remaining_fixtures(&input.matches, &applied);
        if remaining.is_empty() {
            debug!(season, "season complete, skipping final projection");
        } else {
            project(
                &mut out,
                competition_id,
                season,
                tracker.current,
                date,
                &remaining,
                params,
                &options.simulation,
            )?;
        }
    }

    let upcoming: Vec<SeasonMatch> = input
        .matches
        .iter()
        .filter(|m| !m.completed)
        .cloned()
        .collect();
    out.predictions
        .extend(predict_next_fixtures(&out.ratings, &upcoming, params)?);

    ctx.closing = out
        .ratings
        .iter()
        .map(|(id, r)| (*id, (r.off_rating(), r.def_rating())))
        .collect();
    ctx.seasons_replayed += 1;

    let metrics = out.forecast.metrics();
    info!(
        season,
        matches = metrics.samples,
        rps = metrics.rps,
        "season replayed"
    );
    Ok(out)
}

fn remaining_fixtures(matches: &[SeasonMatch], applied: &HashSet<MatchId>) -> Vec<Fixture> {
    matches
        .iter()
        .filter(|m| !applied.contains(&m.id))
        .map(SeasonMatch::fixture)
        .collect()
}

#[allow(clippy::too_many_arguments)]
fn project(
    out: &mut SeasonOutput,
    competition_id: CompetitionId,
    season: Season,
    matchweek: u32,
    as_of: NaiveDate,
    remaining: &[Fixture],
    params: ModelParams,
    options: &SimulationOptions,
) -> EngineResult<()> {
    info!(
        season,
        matchweek,
        %as_of,
        fixtures = remaining.len(),
        "projecting season"
    );
    let table: BTreeMap<ClubId, SimTableRow> = out
        .table
        .iter()
        .map(|(id, row)| (*id, SimTableRow::from(row)))
        .collect();
    let results = run_simulations(
        &table,
        &out.ratings,
        remaining,
        params.avg_base,
        params.home_advantage,
        options,
    )?;
    out.projections.extend(projections_from_results(
        competition_id,
        season,
        matchweek,
        as_of,
        &results,
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::standings::PointsDeduction;

    fn competition() -> CompetitionParams {
        CompetitionParams {
            id: 1,
            name: "Test League".to_string(),
            avg_base: Some(1.35),
            home_advantage: Some(0.15),
            transfer_intercept: Some(1.35),
            transfer_off_slope: Some(0.2),
            transfer_def_slope: Some(-0.2),
        }
    }

    fn kickoff(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 8, day)
            .and_then(|d| d.and_hms_opt(15, 0, 0))
            .unwrap()
    }

    fn stats(ag_home: f64, ag_away: f64) -> MatchStats {
        MatchStats {
            adjusted_goals_home: Some(ag_home),
            adjusted_goals_away: Some(ag_away),
            xg_home: Some(ag_home * 0.9 + 0.2),
            xg_away: Some(ag_away * 0.9 + 0.2),
        }
    }

    fn played(id: MatchId, matchweek: u32, day: u32, home: ClubId, away: ClubId, score: (u32, u32)) -> SeasonMatch {
        SeasonMatch {
            id,
            matchweek,
            time: kickoff(day),
            home,
            away,
            completed: true,
            score_home: Some(score.0),
            score_away: Some(score.1),
            stats: stats(score.0 as f64, score.1 as f64),
        }
    }

    fn upcoming(id: MatchId, matchweek: u32, day: u32, home: ClubId, away: ClubId) -> SeasonMatch {
        SeasonMatch {
            id,
            matchweek,
            time: kickoff(day),
            home,
            away,
            completed: false,
            score_home: None,
            score_away: None,
            stats: MatchStats::default(),
        }
    }

    fn input() -> SeasonInput {
        SeasonInput {
            season: 2023,
            clubs: vec![1, 2, 3, 4],
            market_values: (1..=4)
                .map(|id| MarketValue {
                    club_id: id,
                    off_value: 100.0 * id as f64,
                    def_value: 80.0 * id as f64,
                })
                .collect(),
            matches: vec![
                played(1, 1, 1, 1, 2, (2, 0)),
                played(2, 1, 1, 3, 4, (1, 1)),
                played(3, 2, 8, 2, 3, (0, 3)),
                played(4, 2, 8, 4, 1, (2, 2)),
                upcoming(5, 3, 15, 1, 3),
                upcoming(6, 3, 15, 2, 4),
                upcoming(7, 4, 22, 3, 1),
            ],
            ..SeasonInput::default()
        }
    }

    #[test]
    fn replay_builds_snapshot_chain() {
        let mut ctx = SeasonContext::new();
        let out = replay_season(&mut ctx, &competition(), input(), &ReplayOptions::default()).unwrap();

        assert_eq!(out.history.len(), 4 + 2 * 4);
        assert_eq!(out.performances.len(), 4);
        assert_eq!(out.forecast.matches, 4);
        assert!(out.projections.is_empty());

        let club1 = &out.table[&1];
        assert_eq!((club1.mp, club1.w, club1.d, club1.pts), (2, 1, 1, 4));
        assert_eq!(club1.match_id, Some(4));

        // Match 5 and 6 are both clubs' next match; 7 is not.
        let upcoming_ids: Vec<MatchId> = out.predictions[4..].iter().map(|p| p.match_id).collect();
        assert_eq!(upcoming_ids, vec![5, 6]);

        assert_eq!(ctx.seasons_replayed(), 1);
        assert!((ctx.closing_ratings()[&1].0 - club1.off).abs() < 1e-12);
    }

    #[test]
    fn prior_ratings_blend_into_next_season() {
        let mut ctx = SeasonContext::new();
        replay_season(&mut ctx, &competition(), input(), &ReplayOptions::default()).unwrap();
        let (prior_off, _) = ctx.prior(3).unwrap();

        let mut next = input();
        next.season = 2024;
        next.clubs = vec![2, 3, 4, 5];
        next.matches.clear();
        next.market_values.push(MarketValue {
            club_id: 5,
            off_value: 250.0,
            def_value: 200.0,
        });
        let out = replay_season(&mut ctx, &competition(), next.clone(), &ReplayOptions::default()).unwrap();
        assert!(!out.table.contains_key(&1));

        let z = market_z_scores(&next.market_values);
        let reg = competition().require_seed_regression().unwrap();
        let (expected_off, _) = seed_ratings(Some((prior_off, 0.0)), z[&3], &reg);
        let seed_row = out.history.iter().find(|r| r.club_id == 3).unwrap();
        assert!((seed_row.off - expected_off).abs() < 1e-12);
    }

    #[test]
    fn deduction_applies_once() {
        let mut docked = input();
        docked.deductions = DeductionLedger::new([PointsDeduction {
            competition_id: 1,
            season: 2023,
            club_id: 2,
            effective: NaiveDate::from_ymd_opt(2023, 8, 1).unwrap(),
            change: -6,
        }]);
        let plain = replay_season(&mut SeasonContext::new(), &competition(), input(), &ReplayOptions::default()).unwrap();
        let docked = replay_season(&mut SeasonContext::new(), &competition(), docked, &ReplayOptions::default()).unwrap();
        assert_eq!(plain.table[&2].pts - docked.table[&2].pts, 6);

        let rows: Vec<i32> = docked
            .history
            .iter()
            .filter(|r| r.club_id == 2 && r.match_id.is_some())
            .map(|r| r.pts)
            .collect();
        assert_eq!(rows, vec![-6, -6]);
    }

    #[test]
    fn missing_stats_stop_the_season() {
        let mut broken = input();
        broken.matches[2].stats.xg_away = None;
        let err = replay_season(&mut SeasonContext::new(), &competition(), broken, &ReplayOptions::default()).unwrap_err();
        assert_eq!(
            err,
            EngineError::MissingMatchStats {
                match_id: 3,
                field: "away expected goals"
            }
        );
        assert!(err.is_data_integrity());
    }

    #[test]
    fn missing_score_stops_the_season() {
        let mut broken = input();
        broken.matches[1].score_home = None;
        let mut ctx = SeasonContext::new();
        let err = replay_season(&mut ctx, &competition(), broken, &ReplayOptions::default()).unwrap_err();
        assert_eq!(
            err,
            EngineError::MissingMatchStats {
                match_id: 2,
                field: "home score"
            }
        );
        assert!(err.is_data_integrity());
        assert_eq!(ctx.seasons_replayed(), 0);
        assert!(ctx.closing_ratings().is_empty());
    }

    #[test]
    fn season_opening_on_a_later_matchweek_still_advances() {
        let mut late = input();
        late.matches = vec![
            upcoming(1, 1, 1, 1, 2),
            played(2, 2, 8, 3, 4, (1, 0)),
            played(3, 2, 8, 1, 2, (2, 1)),
            played(4, 3, 15, 4, 1, (0, 0)),
            upcoming(5, 3, 15, 2, 3),
        ];
        let options = ReplayOptions {
            project: true,
            simulation: SimulationOptions {
                simulations: 20,
                threads: 2,
                chunk_size: 5,
                seed: Some(4),
            },
        };
        let out = replay_season(&mut SeasonContext::new(), &competition(), late, &options).unwrap();
        let weeks: BTreeSet<u32> = out.projections.iter().map(|p| p.matchweek).collect();
        assert_eq!(weeks, BTreeSet::from([0, 2, 3]));

        let matches = vec![played(1, 2, 8, 1, 2, (0, 0)), played(2, 3, 15, 3, 4, (1, 2))];
        assert_eq!(assign_display_matchweeks(&matches, &BTreeSet::new()), vec![2, 3]);
    }

    #[test]
    fn missing_home_advantage_aborts_before_replay() {
        let mut params = competition();
        params.home_advantage = None;
        let mut ctx = SeasonContext::new();
        let err = replay_season(&mut ctx, &params, input(), &ReplayOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::MissingParameter { field: "home_advantage", .. }));
        assert_eq!(ctx.seasons_replayed(), 0);
    }

    #[test]
    fn projections_at_each_matchweek_and_after_last_match() {
        let options = ReplayOptions {
            project: true,
            simulation: SimulationOptions {
                simulations: 40,
                threads: 2,
                chunk_size: 10,
                seed: Some(9),
            },
        };
        let out = replay_season(&mut SeasonContext::new(), &competition(), input(), &options).unwrap();
        // Preseason, after matchweek 1, after the last completed match.
        let weeks: BTreeSet<u32> = out.projections.iter().map(|p| p.matchweek).collect();
        assert_eq!(weeks, BTreeSet::from([0, 1, 2]));
        assert_eq!(out.projections.len(), 3 * 4);

        let preseason = out.projections.iter().find(|p| p.matchweek == 0).unwrap();
        assert_eq!(preseason.update_date, NaiveDate::from_ymd_opt(2023, 7, 31).unwrap());
        assert_eq!(preseason.positions.len(), 4);
        assert!((preseason.positions.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn display_matchweeks_skip_postponed_week() {
        let matches = vec![
            upcoming(1, 1, 1, 1, 2),
            upcoming(2, 2, 8, 1, 3),
            upcoming(3, 4, 22, 2, 3),
            upcoming(4, 5, 29, 1, 4),
            upcoming(5, 3, 30, 3, 4),
        ];
        assert_eq!(assign_display_matchweeks(&matches, &BTreeSet::new()), vec![1, 2, 2, 2, 3]);
        assert_eq!(assign_display_matchweeks(&matches, &BTreeSet::from([3])), vec![1, 2, 4, 5, 5]);
    }
}
