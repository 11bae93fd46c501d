use std::collections::{BTreeMap, BTreeSet};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use rusqlite::Connection;

use efi_engine::competition::CompetitionParams;
use efi_engine::performance::MatchStats;
use efi_engine::rating::ClubRatings;
use efi_engine::replay::{ReplayOptions, SeasonContext, SeasonMatch, replay_season};
use efi_engine::scheduler::{SimulationOptions, run_simulations};
use efi_engine::simulation::{Fixture, SimTableRow};
use efi_engine::standings::{DeductionLedger, MarketValue, PointsDeduction, TableSnapshot};
use efi_engine::{ClubId, MatchId, store};

const CLUBS: [ClubId; 4] = [10, 20, 30, 40];

fn competition() -> CompetitionParams {
    CompetitionParams {
        id: 3,
        name: "Sample League".to_string(),
        avg_base: Some(1.35),
        home_advantage: Some(0.15),
        transfer_intercept: Some(1.35),
        transfer_off_slope: Some(0.18),
        transfer_def_slope: Some(-0.16),
    }
}

fn kickoff(week: u32) -> NaiveDateTime {
    let start = NaiveDate::from_ymd_opt(2023, 8, 12)
        .and_then(|d| d.and_hms_opt(15, 0, 0))
        .unwrap();
    start + Duration::days(7 * i64::from(week - 1))
}

/// Double round robin over six matchweeks; the first four are played.
fn schedule() -> Vec<SeasonMatch> {
    let rounds = [
        [(10, 20), (30, 40)],
        [(20, 30), (40, 10)],
        [(10, 30), (20, 40)],
        [(20, 10), (40, 30)],
        [(30, 20), (10, 40)],
        [(30, 10), (40, 20)],
    ];
    let scores = [(2, 1), (0, 0), (1, 3), (2, 2), (3, 0), (1, 1), (0, 1), (2, 0)];
    let mut out = Vec::new();
    let mut id: MatchId = 100;
    for (w, round) in rounds.iter().enumerate() {
        let week = w as u32 + 1;
        for &(home, away) in round {
            let played = week <= 4;
            let score = scores.get(out.len()).copied().filter(|_| played);
            out.push(SeasonMatch {
                id,
                matchweek: week,
                time: kickoff(week),
                home,
                away,
                completed: played,
                score_home: score.map(|s| s.0),
                score_away: score.map(|s| s.1),
                stats: match score {
                    Some((h, a)) => MatchStats {
                        adjusted_goals_home: Some(h as f64 * 1.05),
                        adjusted_goals_away: Some(a as f64 * 1.05),
                        xg_home: Some(1.1 + 0.2 * h as f64),
                        xg_away: Some(0.9 + 0.2 * a as f64),
                    },
                    None => MatchStats::default(),
                },
            });
            id += 1;
        }
    }
    out
}

fn seeded_db() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    store::init_schema(&conn).unwrap();
    store::upsert_competition(&conn, &competition()).unwrap();
    for (i, club) in CLUBS.iter().enumerate() {
        store::upsert_club(&conn, *club, &format!("Club {club}")).unwrap();
        store::add_season_club(&conn, 3, 2023, *club).unwrap();
        store::upsert_market_value(
            &conn,
            2023,
            &MarketValue {
                club_id: *club,
                off_value: 150.0 + 40.0 * i as f64,
                def_value: 90.0 + 25.0 * i as f64,
            },
        )
        .unwrap();
    }
    for m in schedule() {
        store::upsert_match(&conn, 3, 2023, &m).unwrap();
    }
    store::insert_deduction(
        &conn,
        &PointsDeduction {
            competition_id: 3,
            season: 2023,
            club_id: 40,
            effective: NaiveDate::from_ymd_opt(2023, 8, 20).unwrap(),
            change: -6,
        },
    )
    .unwrap();
    conn
}

#[test]
fn replay_save_and_predict_round_trip() {
    let mut conn = seeded_db();
    let params = store::load_competition(&conn, 3).unwrap();
    let input = store::load_season_input(&conn, 3, 2023, BTreeSet::new()).unwrap();
    assert_eq!(input.matches.len(), 12);

    let options = ReplayOptions {
        project: true,
        simulation: SimulationOptions {
            simulations: 60,
            threads: 3,
            chunk_size: 5,
            seed: Some(77),
        },
    };
    let out = replay_season(&mut SeasonContext::new(), &params, input, &options).unwrap();

    assert_eq!(out.history.len(), CLUBS.len() + 2 * 8);
    assert_eq!(out.forecast.matches, 8);
    // Preseason plus after weeks 1-3, plus the final projection after week 4.
    assert_eq!(out.projections.len(), 5 * CLUBS.len());

    // The deduction effective 20 Aug lands on club 40's week 3 match only.
    let club40: Vec<&TableSnapshot> = out
        .history
        .iter()
        .filter(|r| r.club_id == 40 && r.match_id.is_some())
        .collect();
    let docked = club40.windows(2).filter(|w| w[1].pts < w[0].pts).count();
    assert_eq!(docked, 1);
    assert!(club40[2].pts < club40[1].pts);

    let mut plain = store::load_season_input(&conn, 3, 2023, BTreeSet::new()).unwrap();
    plain.deductions = DeductionLedger::default();
    let undocked = replay_season(
        &mut SeasonContext::new(),
        &params,
        plain,
        &ReplayOptions::default(),
    )
    .unwrap();
    assert_eq!(undocked.table[&40].pts - out.table[&40].pts, 6);

    store::upsert_history(&mut conn, &out.history).unwrap();
    store::upsert_projections(&mut conn, &out.projections).unwrap();
    store::update_match_performances(&mut conn, &out.performances).unwrap();
    store::update_match_predictions(&mut conn, &out.predictions).unwrap();

    let stored = store::load_projections(&conn, 3, 2023).unwrap();
    assert_eq!(stored.len(), out.projections.len());

    // Stored windows reproduce the in-memory ratings at the end of replay.
    let windows = store::load_recent_performances(&conn, 3, 2023).unwrap();
    for club in CLUBS {
        let live = &out.ratings[&club];
        let loaded = &windows[&club];
        assert!((live.off_rating() - loaded.off_rating()).abs() < 1e-9);
        assert!((live.def_rating() - loaded.def_rating()).abs() < 1e-9);
    }
}

#[test]
fn worker_count_does_not_change_seeded_results() {
    let table: BTreeMap<ClubId, SimTableRow> = CLUBS
        .iter()
        .map(|id| {
            (
                *id,
                SimTableRow {
                    club_id: *id,
                    gf: 0,
                    gd: 0,
                    pts: 0,
                },
            )
        })
        .collect();
    let clubs: BTreeMap<ClubId, ClubRatings> = CLUBS
        .iter()
        .enumerate()
        .map(|(i, id)| (*id, ClubRatings::seeded(1.2 + 0.1 * i as f64, 1.4 - 0.05 * i as f64)))
        .collect();
    let fixtures: Vec<Fixture> = schedule()
        .iter()
        .map(|m| Fixture {
            home: m.home,
            away: m.away,
        })
        .collect();

    let base = SimulationOptions {
        simulations: 120,
        threads: 1,
        chunk_size: 120,
        seed: Some(5),
    };
    let reference = run_simulations(&table, &clubs, &fixtures, 1.35, 0.15, &base).unwrap();
    for (threads, chunk_size) in [(2, 7), (4, 1), (8, 25)] {
        let options = SimulationOptions {
            threads,
            chunk_size,
            ..base
        };
        let results = run_simulations(&table, &clubs, &fixtures, 1.35, 0.15, &options).unwrap();
        assert_eq!(results, reference, "threads={threads} chunk={chunk_size}");
    }
}
