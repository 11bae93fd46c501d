use serde::{Deserialize, Serialize};

const MIN_EXPECTED_GOALS: f64 = 1e-9;
const TAIL_MASS: f64 = 1e-16;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prob3 {
    pub home: f64,
    pub draw: f64,
    pub away: f64,
}

impl Prob3 {
    pub fn uniform() -> Self {
        Self {
            home: 1.0 / 3.0,
            draw: 1.0 / 3.0,
            away: 1.0 / 3.0,
        }
    }

    pub fn sum(&self) -> f64 {
        self.home + self.draw + self.away
    }
}

/// Win/draw/loss probabilities for a match where the home side is expected
/// to score `lambda_home` and the away side `lambda_away`. The goal
/// difference is Skellam distributed.
pub fn outcome_probs(lambda_home: f64, lambda_away: f64) -> Prob3 {
    let mu1 = nonzero(lambda_home);
    let mu2 = nonzero(lambda_away);

    let home = (1.0 - skellam_cdf(0, mu1, mu2)).clamp(0.0, 1.0);
    let away = skellam_cdf(-1, mu1, mu2).clamp(0.0, 1.0);
    let draw = (1.0 - home - away).clamp(0.0, 1.0);
    Prob3 { home, draw, away }
}

/// Expected points per game against an average side, on a 0-100 scale.
pub fn efi(off_rating: f64, def_rating: f64) -> f64 {
    let p = outcome_probs(off_rating, def_rating);
    ((p.home * 3.0 + p.draw) / 3.0) * 100.0
}

/// `P(X - Y <= k)` for independent `X ~ Poisson(mu1)`, `Y ~ Poisson(mu2)`.
pub fn skellam_cdf(k: i64, mu1: f64, mu2: f64) -> f64 {
    let mu1 = nonzero(mu1);
    let mu2 = nonzero(mu2);

    let y_max = (mu2 + 20.0 * mu2.sqrt() + 40.0).ceil() as i64;
    let x_max = (k + y_max).max(0) as usize;
    let x_cdf = poisson_cdf_table(mu1, x_max);

    let ln_mu2 = mu2.ln();
    let mut ln_p_y = -mu2;
    let mut seen = 0.0_f64;
    let mut total = 0.0_f64;

    for y in 0..=y_max {
        if y > 0 {
            ln_p_y += ln_mu2 - (y as f64).ln();
        }
        let p_y = ln_p_y.exp();
        seen += p_y;

        let m = k + y;
        if m >= 0 {
            total += p_y * x_cdf[m as usize];
        }
        if y as f64 > mu2 && 1.0 - seen < TAIL_MASS {
            break;
        }
    }

    total.clamp(0.0, 1.0)
}

fn poisson_cdf_table(lambda: f64, max_k: usize) -> Vec<f64> {
    let ln_lambda = lambda.ln();
    let mut ln_p = -lambda;
    let mut acc = 0.0_f64;
    let mut out = Vec::with_capacity(max_k + 1);

    for k in 0..=max_k {
        if k > 0 {
            ln_p += ln_lambda - (k as f64).ln();
        }
        acc += ln_p.exp();
        out.push(acc.min(1.0));
    }
    out
}

fn nonzero(lambda: f64) -> f64 {
    if lambda <= 0.0 {
        MIN_EXPECTED_GOALS
    } else {
        lambda
    }
}
