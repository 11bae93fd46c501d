use std::path::PathBuf;

use anyhow::{Context, Result};

use efi_engine::CompetitionId;
use efi_engine::config::{EngineConfig, arg_value, init_tracing};
use efi_engine::replay::predict_next_fixtures;
use efi_engine::store;

fn main() -> Result<()> {
    let config = EngineConfig::from_env();
    init_tracing();

    let db_path = parse_string_arg("--db")
        .map(PathBuf::from)
        .unwrap_or(config.db_path);
    let competition_id = parse_string_arg("--competition")
        .and_then(|v| v.parse::<CompetitionId>().ok())
        .unwrap_or(1);
    let season = parse_string_arg("--season")
        .and_then(|v| v.parse::<i32>().ok())
        .context("missing --season=YEAR")?;

    let mut conn = store::open_db(&db_path)?;
    let competition = store::load_competition(&conn, competition_id)?;
    let params = competition.require_model()?;

    let clubs = store::load_recent_performances(&conn, competition_id, season)?;
    let matches = store::load_matches(&conn, competition_id, season)?;
    let predictions = predict_next_fixtures(&clubs, &matches, params)?;

    let updated = store::update_match_predictions(&mut conn, &predictions)?;
    println!("Updated {updated} matches with predictions");
    for p in &predictions {
        println!(
            "  match {:>6}  home {:.3}  draw {:.3}  away {:.3}",
            p.match_id, p.probs.home, p.probs.draw, p.probs.away
        );
    }
    Ok(())
}

fn parse_string_arg(name: &str) -> Option<String> {
    let args = std::env::args().skip(1).collect::<Vec<_>>();
    arg_value(&args, name)
}
