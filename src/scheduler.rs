use std::collections::BTreeMap;

use chrono::NaiveDate;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::rating::ClubRatings;
use crate::simulation::{Fixture, SimTableRow, SimulationSetup};
use crate::{ClubId, CompetitionId, Season};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationOptions {
    pub simulations: usize,
    pub threads: usize,
    /// Runs handed to a worker at a time; also the progress granularity.
    pub chunk_size: usize,
    /// Fixed seed for reproducible batches. Unset means fresh entropy per run.
    pub seed: Option<u64>,
}

impl Default for SimulationOptions {
    fn default() -> Self {
        Self {
            simulations: 10_000,
            threads: 10,
            chunk_size: 25,
            seed: None,
        }
    }
}

/// Finishing-position histogram and running totals for one club.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResults {
    pub counts: Vec<u64>,
    pub total_gd: i64,
    pub total_pts: i64,
    pub simulations: u64,
}

impl SimulationResults {
    fn new(clubs: usize, simulations: u64) -> Self {
        Self {
            counts: vec![0; clubs],
            total_gd: 0,
            total_pts: 0,
            simulations,
        }
    }

    fn record(&mut self, position: usize, row: &SimTableRow) {
        self.counts[position] += 1;
        self.total_gd += i64::from(row.gd);
        self.total_pts += i64::from(row.pts);
    }

    pub fn positions(&self) -> Vec<f64> {
        let n = self.simulations.max(1) as f64;
        self.counts.iter().map(|c| *c as f64 / n).collect()
    }

    pub fn avg_gd(&self) -> f64 {
        self.total_gd as f64 / self.simulations.max(1) as f64
    }

    pub fn avg_pts(&self) -> f64 {
        self.total_pts as f64 / self.simulations.max(1) as f64
    }
}

pub type ResultsByClub = BTreeMap<ClubId, SimulationResults>;

pub fn run_simulations(
    table: &BTreeMap<ClubId, SimTableRow>,
    clubs: &BTreeMap<ClubId, ClubRatings>,
    fixtures: &[Fixture],
    avg_base: f64,
    home_advantage: f64,
    options: &SimulationOptions,
) -> EngineResult<ResultsByClub> {
    run_simulations_with_progress(
        table,
        clubs,
        fixtures,
        avg_base,
        home_advantage,
        options,
        |_, _| {},
    )
}

/// Runs `options.simulations` independent season projections on a worker
/// pool and folds the final tables into per-club results.
///
/// Workers only return finished tables; all aggregation happens on the
/// calling thread after each batch, which is also when `progress` is told
/// how many runs are done.
pub fn run_simulations_with_progress<F>(
    table: &BTreeMap<ClubId, SimTableRow>,
    clubs: &BTreeMap<ClubId, ClubRatings>,
    fixtures: &[Fixture],
    avg_base: f64,
    home_advantage: f64,
    options: &SimulationOptions,
    mut progress: F,
) -> EngineResult<ResultsByClub>
where
    F: FnMut(usize, usize),
{
    let setup = SimulationSetup::new(table, clubs, fixtures, avg_base, home_advantage)?;
    let total = options.simulations;
    let chunk = options.chunk_size.max(1);
    let threads = options.threads.max(1);

    let mut results: ResultsByClub = setup
        .club_ids()
        .map(|id| (id, SimulationResults::new(setup.club_count(), total as u64)))
        .collect();

    info!(
        simulations = total,
        fixtures = setup.fixture_count(),
        clubs = setup.club_count(),
        threads,
        "running season simulations"
    );

    let pool = build_pool(threads);
    let batch = chunk * threads;
    let mut done = 0usize;

    while done < total {
        let end = (done + batch).min(total);
        let tables: Vec<Vec<SimTableRow>> = with_pool(&pool, || {
            (done..end)
                .into_par_iter()
                .with_min_len(chunk)
                .map(|run| {
                    let mut rng = run_rng(options.seed, run);
                    setup.run(&mut rng)
                })
                .collect()
        });

        for finished in &tables {
            for (position, row) in finished.iter().enumerate() {
                if let Some(r) = results.get_mut(&row.club_id) {
                    r.record(position, row);
                }
            }
        }

        done = end;
        debug!(done, total, "simulation batch aggregated");
        progress(done, total);
    }

    Ok(results)
}

fn run_rng(seed: Option<u64>, run: usize) -> ChaCha8Rng {
    match seed {
        Some(seed) => {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            rng.set_stream(run as u64);
            rng
        }
        None => ChaCha8Rng::from_entropy(),
    }
}

fn build_pool(threads: usize) -> Option<rayon::ThreadPool> {
    match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
        Ok(pool) => Some(pool),
        Err(err) => {
            warn!(%err, "simulation pool unavailable, using global pool");
            None
        }
    }
}

fn with_pool<T>(pool: &Option<rayon::ThreadPool>, action: impl FnOnce() -> T + Send) -> T
where
    T: Send,
{
    if let Some(pool) = pool.as_ref() {
        pool.install(action)
    } else {
        action()
    }
}

/// Season projection for one club as of a date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub competition_id: CompetitionId,
    pub season: Season,
    pub club_id: ClubId,
    /// 0 before the first matchweek.
    pub matchweek: u32,
    pub update_date: NaiveDate,
    pub positions: Vec<f64>,
    pub avg_gd: f64,
    pub avg_pts: f64,
}

pub fn projections_from_results(
    competition_id: CompetitionId,
    season: Season,
    matchweek: u32,
    update_date: NaiveDate,
    results: &ResultsByClub,
) -> Vec<Projection> {
    results
        .iter()
        .map(|(club_id, r)| Projection {
            competition_id,
            season,
            club_id: *club_id,
            matchweek,
            update_date,
            positions: r.positions(),
            avg_gd: r.avg_gd(),
            avg_pts: r.avg_pts(),
        })
        .collect()
}
