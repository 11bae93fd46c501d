use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::standings::SeedRegression;
use crate::CompetitionId;

const DEFAULT_AVG_BASE: f64 = 1.35;
const DEFAULT_HOME_ADVANTAGE: f64 = 0.15;

/// Competition row as stored. Model constants are optional until someone
/// fits or enters them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompetitionParams {
    pub id: CompetitionId,
    pub name: String,
    /// Average goals per team per match.
    pub avg_base: Option<f64>,
    /// Average extra goals scored by home sides.
    pub home_advantage: Option<f64>,
    pub transfer_intercept: Option<f64>,
    pub transfer_off_slope: Option<f64>,
    pub transfer_def_slope: Option<f64>,
}

/// Constants every rating and projection step needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    pub avg_base: f64,
    pub home_advantage: f64,
}

impl CompetitionParams {
    pub fn require_model(&self) -> EngineResult<ModelParams> {
        Ok(ModelParams {
            avg_base: self.require(self.avg_base, "avg_base")?,
            home_advantage: self.require(self.home_advantage, "home_advantage")?,
        })
    }

    pub fn require_seed_regression(&self) -> EngineResult<SeedRegression> {
        Ok(SeedRegression {
            intercept: self.require(self.transfer_intercept, "transfer_intercept")?,
            off_slope: self.require(self.transfer_off_slope, "transfer_off_slope")?,
            def_slope: self.require(self.transfer_def_slope, "transfer_def_slope")?,
        })
    }

    fn require(&self, value: Option<f64>, field: &'static str) -> EngineResult<f64> {
        value.ok_or_else(|| EngineError::MissingParameter {
            competition: self.name.clone(),
            field,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinishedScore {
    pub home_goals: u32,
    pub away_goals: u32,
}

/// Estimates `avg_base` and `home_advantage` from finished results.
pub fn estimate_base_and_advantage(results: &[FinishedScore]) -> ModelParams {
    let n = results.len();
    let mut out = ModelParams {
        avg_base: DEFAULT_AVG_BASE,
        home_advantage: DEFAULT_HOME_ADVANTAGE,
    };
    if n > 0 {
        let total: f64 = results
            .iter()
            .map(|r| f64::from(r.home_goals + r.away_goals))
            .sum();
        let home: f64 = results.iter().map(|r| f64::from(r.home_goals)).sum();
        out.avg_base = total / (2.0 * n as f64);
        out.home_advantage = home / n as f64 - out.avg_base;
    }

    // Shrink small samples toward defaults to avoid wild swings.
    const MIN_N: f64 = 200.0;
    let w = (n as f64 / MIN_N).clamp(0.0, 1.0);
    out.avg_base = (1.0 - w) * DEFAULT_AVG_BASE + w * out.avg_base;
    out.home_advantage = (1.0 - w) * DEFAULT_HOME_ADVANTAGE + w * out.home_advantage;
    out
}
