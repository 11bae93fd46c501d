use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use tracing::info;

use efi_engine::competition::estimate_base_and_advantage;
use efi_engine::config::{EngineConfig, arg_value, init_tracing};
use efi_engine::replay::{
    ReplayOptions, SeasonContext, SeasonOutput, assign_display_matchweeks, replay_season,
};
use efi_engine::scoring::ForecastScore;
use efi_engine::store;
use efi_engine::{CompetitionId, MatchId, Season};

const DEFAULT_COMPETITION: CompetitionId = 1;

fn main() -> Result<()> {
    let config = EngineConfig::from_env();
    init_tracing();

    let db_path = parse_db_path_arg().unwrap_or(config.db_path);
    let competition_id = parse_u32_arg("--competition").unwrap_or(DEFAULT_COMPETITION);
    let start = parse_i32_arg("--start").context("missing --start=YEAR")?;
    let end = parse_i32_arg("--end").unwrap_or(start + 1);
    if end <= start {
        bail!("--end ({end}) must be after --start ({start})");
    }

    let save = has_flag("--save");
    let sim = has_flag("--sim");
    let performance = has_flag("--performance");

    let mut simulation = config.simulation;
    if let Some(n) = parse_usize_arg("--simulations") {
        simulation.simulations = n.max(1);
    }
    let postponed = parse_postponed_arg();

    let mut conn = store::open_db(&db_path)?;
    let mut competition = store::load_competition(&conn, competition_id)?;

    if has_flag("--estimate-params") {
        let scores = store::load_finished_scores(&conn, competition_id)?;
        let fitted = estimate_base_and_advantage(&scores);
        println!(
            "Estimated from {} matches: avg_base={:.4} home_advantage={:.4}",
            scores.len(),
            fitted.avg_base,
            fitted.home_advantage
        );
        competition.avg_base = Some(fitted.avg_base);
        competition.home_advantage = Some(fitted.home_advantage);
        if save {
            store::upsert_competition(&conn, &competition)?;
        }
    }

    let previous = store::load_closing_ratings(&conn, competition_id, start - 1)?;
    let mut ctx = SeasonContext::with_previous_averages(previous);
    let options = ReplayOptions {
        project: sim,
        simulation,
    };
    let mut forecast = ForecastScore::default();

    for season in start..end {
        let weeks = postponed.get(&season).cloned().unwrap_or_default();
        let input = store::load_season_input(&conn, competition_id, season, weeks)?;
        let display: Vec<(MatchId, u32)> = input
            .matches
            .iter()
            .map(|m| m.id)
            .zip(assign_display_matchweeks(&input.matches, &input.postponed))
            .collect();

        let out = replay_season(&mut ctx, &competition, input, &options)
            .with_context(|| format!("replay {} season {season}", competition.name))?;
        print_season(season, &out);
        forecast.merge(&out.forecast);

        if save {
            save_season(&mut conn, &out, &display)?;
        }
    }

    if performance {
        let m = forecast.metrics();
        println!("Model performance ({} matches):", m.samples);
        println!("  avg rps: {:.4}", m.rps);
        println!("  avg ign: {:.4}", m.ignorance);
        println!("  avg bs:  {:.4}", m.brier);
        println!("  accuracy: {:.3}", m.accuracy);
    }

    Ok(())
}

fn save_season(
    conn: &mut rusqlite::Connection,
    out: &SeasonOutput,
    display: &[(MatchId, u32)],
) -> Result<()> {
    let predictions = store::update_match_predictions(conn, &out.predictions)?;
    let performances = store::update_match_performances(conn, &out.performances)?;
    let history = store::upsert_history(conn, &out.history)?;
    let projections = store::upsert_projections(conn, &out.projections)?;
    store::update_display_matchweeks(conn, display)?;
    info!(predictions, performances, history, projections, "season saved");
    Ok(())
}

fn print_season(season: Season, out: &SeasonOutput) {
    let mut rows = out.table.values().collect::<Vec<_>>();
    rows.sort_by(|a, b| b.efi.total_cmp(&a.efi));
    println!("{season}");
    for row in rows {
        println!(
            "  club {:>5}  efi {:>6.2}  pts {:>3}  gd {:>+4}",
            row.club_id, row.efi, row.pts, row.gd
        );
    }
    println!();
}

fn parse_db_path_arg() -> Option<PathBuf> {
    parse_string_arg("--db").map(PathBuf::from)
}

fn parse_string_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    arg_value(&args, name)
}

fn parse_u32_arg(name: &str) -> Option<u32> {
    parse_string_arg(name).and_then(|v| v.parse::<u32>().ok())
}

fn parse_i32_arg(name: &str) -> Option<i32> {
    parse_string_arg(name).and_then(|v| v.parse::<i32>().ok())
}

fn parse_usize_arg(name: &str) -> Option<usize> {
    parse_string_arg(name).and_then(|v| v.parse::<usize>().ok())
}

/// `--postponed=2022:7,2023:12` marks matchweek 7 of 2022/23 and matchweek
/// 12 of 2023/24 as postponed.
fn parse_postponed_arg() -> HashMap<Season, BTreeSet<u32>> {
    let mut out: HashMap<Season, BTreeSet<u32>> = HashMap::new();
    let Some(raw) = parse_string_arg("--postponed") else {
        return out;
    };
    for item in raw.split(',') {
        let Some((season, week)) = item.split_once(':') else {
            continue;
        };
        if let (Ok(season), Ok(week)) = (season.trim().parse::<Season>(), week.trim().parse::<u32>()) {
            out.entry(season).or_default().insert(week);
        }
    }
    out
}

fn has_flag(name: &str) -> bool {
    std::env::args().skip(1).any(|arg| arg == name)
}
