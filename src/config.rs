use std::env;
use std::path::PathBuf;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::scheduler::SimulationOptions;

const DEFAULT_DB_FILE: &str = "efi.sqlite";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub db_path: PathBuf,
    pub simulation: SimulationOptions,
}

impl EngineConfig {
    /// Reads `.env.local` and `.env` if present, then the process environment.
    pub fn from_env() -> Self {
        let _ = dotenvy::from_filename(".env.local");
        let _ = dotenvy::from_filename(".env");
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let opt = |key: &str| {
            lookup(key).and_then(|val| if val.trim().is_empty() { None } else { Some(val) })
        };

        let defaults = SimulationOptions::default();
        let simulation = SimulationOptions {
            simulations: opt("EFI_SIMULATIONS")
                .and_then(|val| val.trim().parse::<usize>().ok())
                .unwrap_or(defaults.simulations)
                .max(1),
            threads: opt("EFI_SIM_THREADS")
                .and_then(|val| val.trim().parse::<usize>().ok())
                .unwrap_or(defaults.threads)
                .clamp(1, 64),
            chunk_size: opt("EFI_SIM_CHUNK")
                .and_then(|val| val.trim().parse::<usize>().ok())
                .unwrap_or(defaults.chunk_size)
                .clamp(1, 10_000),
            seed: opt("EFI_SIM_SEED").and_then(|val| val.trim().parse::<u64>().ok()),
        };

        let db_path = opt("EFI_DB_PATH")
            .map(|val| PathBuf::from(val.trim()))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_FILE));

        Self {
            db_path,
            simulation,
        }
    }
}

/// Value of `--name=value` or `--name value`. Blank values count as absent.
pub fn arg_value(args: &[String], name: &str) -> Option<String> {
    let prefix = format!("{name}=");
    for (idx, arg) in args.iter().enumerate() {
        if let Some(raw) = arg.strip_prefix(&prefix) {
            let trimmed = raw.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
        if arg == name
            && let Some(next) = args.get(idx + 1)
            && !next.trim().is_empty()
        {
            return Some(next.trim().to_string());
        }
    }
    None
}

/// Log to stderr, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
