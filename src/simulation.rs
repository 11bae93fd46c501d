use std::cmp::Ordering;
use std::collections::BTreeMap;

use rand::Rng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::performance::{performances_from_composites, projected_goals};
use crate::rating::ClubRatings;
use crate::standings::{MatchResult, TableSnapshot};
use crate::ClubId;

/// The part of a table row the simulator touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimTableRow {
    pub club_id: ClubId,
    pub gf: u32,
    pub gd: i32,
    pub pts: i32,
}

impl SimTableRow {
    fn record(&mut self, goals_for: u32, goals_against: u32) {
        self.gf += goals_for;
        self.gd += goals_for as i32 - goals_against as i32;
        self.pts += MatchResult::from_score(goals_for, goals_against).points();
    }
}

impl From<&TableSnapshot> for SimTableRow {
    fn from(t: &TableSnapshot) -> Self {
        Self {
            club_id: t.club_id,
            gf: t.gf,
            gd: t.gd,
            pts: t.pts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fixture {
    pub home: ClubId,
    pub away: ClubId,
}

/// Points, then goal difference, then goals scored, all descending. Clubs
/// still level are ordered by ascending club id.
pub fn standings_order(a: &SimTableRow, b: &SimTableRow) -> Ordering {
    b.pts
        .cmp(&a.pts)
        .then(b.gd.cmp(&a.gd))
        .then(b.gf.cmp(&a.gf))
        .then(a.club_id.cmp(&b.club_id))
}

pub fn sort_standings(rows: &mut [SimTableRow]) {
    rows.sort_by(standings_order);
}

/// Validated, read-only starting point for simulation runs. Clubs are held
/// in dense vectors so every run copies two flat arrays and nothing else.
#[derive(Debug, Clone)]
pub struct SimulationSetup {
    rows: Vec<SimTableRow>,
    ratings: Vec<ClubRatings>,
    fixtures: Vec<(usize, usize)>,
    avg_base: f64,
    home_advantage: f64,
}

impl SimulationSetup {
    pub fn new(
        table: &BTreeMap<ClubId, SimTableRow>,
        clubs: &BTreeMap<ClubId, ClubRatings>,
        fixtures: &[Fixture],
        avg_base: f64,
        home_advantage: f64,
    ) -> EngineResult<Self> {
        let mut index = BTreeMap::new();
        let mut rows = Vec::with_capacity(table.len());
        let mut ratings = Vec::with_capacity(table.len());
        for (club_id, row) in table {
            let r = clubs.get(club_id).ok_or(EngineError::UnknownClub(*club_id))?;
            index.insert(*club_id, rows.len());
            rows.push(SimTableRow {
                club_id: *club_id,
                ..*row
            });
            ratings.push(*r);
        }

        let lookup = |id: ClubId| index.get(&id).copied().ok_or(EngineError::UnknownClub(id));
        let fixtures = fixtures
            .iter()
            .map(|f| -> EngineResult<(usize, usize)> { Ok((lookup(f.home)?, lookup(f.away)?)) })
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(Self {
            rows,
            ratings,
            fixtures,
            avg_base,
            home_advantage,
        })
    }

    pub fn club_count(&self) -> usize {
        self.rows.len()
    }

    pub fn club_ids(&self) -> impl Iterator<Item = ClubId> + '_ {
        self.rows.iter().map(|r| r.club_id)
    }

    pub fn fixture_count(&self) -> usize {
        self.fixtures.len()
    }

    /// Plays every remaining fixture once and returns the final table,
    /// best first.
    pub fn run<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<SimTableRow> {
        let mut rows = self.rows.clone();
        let mut ratings = self.ratings.clone();

        for &(h, a) in &self.fixtures {
            let home = ratings[h];
            let away = ratings[a];

            let proj_home = projected_goals(
                &home.off,
                away.def_rating(),
                true,
                self.avg_base,
                self.home_advantage,
            );
            let proj_away = projected_goals(
                &away.off,
                home.def_rating(),
                false,
                self.avg_base,
                self.home_advantage,
            );

            // Scores are drawn independently of each other.
            let score_home = draw_goals(rng, proj_home);
            let score_away = draw_goals(rng, proj_away);

            let perf = performances_from_composites(
                score_home as f64,
                score_away as f64,
                &home,
                &away,
                self.avg_base,
                self.home_advantage,
            );
            ratings[h].push(perf.off_home, perf.def_home);
            ratings[a].push(perf.off_away, perf.def_away);

            rows[h].record(score_home, score_away);
            rows[a].record(score_away, score_home);
        }

        sort_standings(&mut rows);
        rows
    }
}

fn draw_goals<R: Rng + ?Sized>(rng: &mut R, lambda: f64) -> u32 {
    match Poisson::new(lambda) {
        Ok(dist) => dist.sample(rng) as u32,
        // Non-positive means score nothing.
        Err(_) => 0,
    }
}

/// One stochastic projection of the rest of a season. Caller state is
/// never mutated.
pub fn simulate_remaining<R: Rng + ?Sized>(
    table: &BTreeMap<ClubId, SimTableRow>,
    clubs: &BTreeMap<ClubId, ClubRatings>,
    fixtures: &[Fixture],
    avg_base: f64,
    home_advantage: f64,
    rng: &mut R,
) -> EngineResult<Vec<SimTableRow>> {
    let setup = SimulationSetup::new(table, clubs, fixtures, avg_base, home_advantage)?;
    Ok(setup.run(rng))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn row(club_id: ClubId, gf: u32, gd: i32, pts: i32) -> SimTableRow {
        SimTableRow {
            club_id,
            gf,
            gd,
            pts,
        }
    }

    fn league(n: u32) -> (BTreeMap<ClubId, SimTableRow>, BTreeMap<ClubId, ClubRatings>) {
        let table = (1..=n).map(|id| (id, row(id, 0, 0, 0))).collect();
        let clubs = (1..=n)
            .map(|id| (id, ClubRatings::seeded(1.0 + id as f64 * 0.1, 1.4)))
            .collect();
        (table, clubs)
    }

    fn double_round_robin(n: u32) -> Vec<Fixture> {
        let mut out = Vec::new();
        for home in 1..=n {
            for away in 1..=n {
                if home != away {
                    out.push(Fixture { home, away });
                }
            }
        }
        out
    }

    #[test]
    fn ties_fall_back_to_club_id() {
        let mut rows = vec![
            row(9, 40, 10, 60),
            row(3, 40, 10, 60),
            row(5, 41, 10, 60),
            row(1, 30, 12, 60),
            row(2, 50, 20, 61),
        ];
        sort_standings(&mut rows);
        let order: Vec<ClubId> = rows.iter().map(|r| r.club_id).collect();
        assert_eq!(order, vec![2, 1, 5, 3, 9]);
    }

    #[test]
    fn inputs_are_left_untouched() {
        let (table, clubs) = league(4);
        let fixtures = double_round_robin(4);
        let (table_before, clubs_before) = (table.clone(), clubs.clone());
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let out = simulate_remaining(&table, &clubs, &fixtures, 1.35, 0.15, &mut rng).unwrap();
        assert_eq!(out.len(), 4);
        assert_eq!(table, table_before);
        assert_eq!(clubs, clubs_before);
    }

    #[test]
    fn every_fixture_is_played_once() {
        let (table, clubs) = league(4);
        let fixtures = double_round_robin(4);
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let out = simulate_remaining(&table, &clubs, &fixtures, 1.35, 0.15, &mut rng).unwrap();
        // Goal difference sums to zero across the league.
        assert_eq!(out.iter().map(|r| r.gd).sum::<i32>(), 0);
        // Each match hands out 2 (draw) or 3 points.
        let pts: i32 = out.iter().map(|r| r.pts).sum();
        assert!(pts >= 2 * fixtures.len() as i32 && pts <= 3 * fixtures.len() as i32);
        for pair in out.windows(2) {
            assert_ne!(standings_order(&pair[0], &pair[1]), Ordering::Greater);
        }
    }

    #[test]
    fn unknown_fixture_club_is_rejected_up_front() {
        let (table, clubs) = league(3);
        let fixtures = [Fixture { home: 1, away: 99 }];
        let err = SimulationSetup::new(&table, &clubs, &fixtures, 1.35, 0.15).unwrap_err();
        assert_eq!(err, EngineError::UnknownClub(99));
    }

    #[test]
    fn club_without_ratings_is_rejected() {
        let (table, mut clubs) = league(3);
        clubs.remove(&2);
        let err = SimulationSetup::new(&table, &clubs, &[], 1.35, 0.15).unwrap_err();
        assert_eq!(err, EngineError::UnknownClub(2));
    }

    #[test]
    fn no_fixtures_returns_current_table_sorted() {
        let table: BTreeMap<ClubId, SimTableRow> =
            [(1, row(1, 10, 2, 12)), (2, row(2, 14, 5, 15))].into_iter().collect();
        let clubs = table
            .keys()
            .map(|id| (*id, ClubRatings::seeded(1.3, 1.3)))
            .collect();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let out = simulate_remaining(&table, &clubs, &[], 1.35, 0.15, &mut rng).unwrap();
        assert_eq!(out, vec![row(2, 14, 5, 15), row(1, 10, 2, 12)]);
    }
}
