use serde::{Deserialize, Serialize};

use crate::outcome::Prob3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Home,
    Draw,
    Away,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub samples: usize,
    pub rps: f64,
    pub ignorance: f64,
    pub brier: f64,
    pub accuracy: f64,
}

pub fn classify_outcome(home_goals: u32, away_goals: u32) -> Outcome {
    if home_goals > away_goals {
        Outcome::Home
    } else if home_goals < away_goals {
        Outcome::Away
    } else {
        Outcome::Draw
    }
}

/// Ranked probability score over the ordered outcomes home, draw, away.
/// 0 is a perfect forecast, 1 the worst.
pub fn ranked_probability_score(p: Prob3, outcome: Outcome) -> f64 {
    let y = one_hot(outcome);
    let c1 = p.home - y.home;
    let c2 = c1 + p.draw - y.draw;
    let c3 = c2 + p.away - y.away;
    (c1.powi(2) + c2.powi(2) + c3.powi(2)) / 2.0
}

/// Bits of surprise at the realised outcome.
pub fn ignorance_score(p: Prob3, outcome: Outcome) -> f64 {
    -prob_of(p, outcome).clamp(1e-12, 1.0).log2()
}

/// Multi-class Brier score, 0 to 2.
pub fn brier_score(p: Prob3, outcome: Outcome) -> f64 {
    let y = one_hot(outcome);
    (p.home - y.home).powi(2) + (p.draw - y.draw).powi(2) + (p.away - y.away).powi(2)
}

/// Running forecast quality over a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastScore {
    pub rps: f64,
    pub ignorance: f64,
    pub brier: f64,
    pub correct: usize,
    pub matches: usize,
}

impl ForecastScore {
    pub fn add(&mut self, p: Prob3, outcome: Outcome) {
        self.rps += ranked_probability_score(p, outcome);
        self.ignorance += ignorance_score(p, outcome);
        self.brier += brier_score(p, outcome);
        if argmax(p) == outcome {
            self.correct += 1;
        }
        self.matches += 1;
    }

    pub fn merge(&mut self, other: &ForecastScore) {
        self.rps += other.rps;
        self.ignorance += other.ignorance;
        self.brier += other.brier;
        self.correct += other.correct;
        self.matches += other.matches;
    }

    pub fn metrics(&self) -> Metrics {
        if self.matches == 0 {
            return Metrics::default();
        }
        let n = self.matches as f64;
        Metrics {
            samples: self.matches,
            rps: self.rps / n,
            ignorance: self.ignorance / n,
            brier: self.brier / n,
            accuracy: self.correct as f64 / n,
        }
    }
}

fn prob_of(mut p: Prob3, outcome: Outcome) -> f64 {
    *prob_mut(&mut p, outcome)
}

/// Most likely outcome; ties go to the earlier of home, draw, away.
fn argmax(p: Prob3) -> Outcome {
    [(Outcome::Draw, p.draw), (Outcome::Away, p.away)]
        .into_iter()
        .fold((Outcome::Home, p.home), |best, cand| if cand.1 > best.1 { cand } else { best })
        .0
}

fn one_hot(outcome: Outcome) -> Prob3 {
    let mut y = Prob3 {
        home: 0.0,
        draw: 0.0,
        away: 0.0,
    };
    *prob_mut(&mut y, outcome) = 1.0;
    y
}

fn prob_mut(p: &mut Prob3, outcome: Outcome) -> &mut f64 {
    match outcome {
        Outcome::Home => &mut p.home,
        Outcome::Draw => &mut p.draw,
        Outcome::Away => &mut p.away,
    }
}
