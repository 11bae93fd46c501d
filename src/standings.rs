use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::rating::ClubRatings;
use crate::{ClubId, CompetitionId, MatchId, Season};

pub const FORM_LEN: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchResult {
    Win,
    Draw,
    Loss,
}

impl MatchResult {
    pub fn from_score(goals_for: u32, goals_against: u32) -> Self {
        if goals_for > goals_against {
            MatchResult::Win
        } else if goals_for < goals_against {
            MatchResult::Loss
        } else {
            MatchResult::Draw
        }
    }

    pub fn points(self) -> i32 {
        match self {
            MatchResult::Win => 3,
            MatchResult::Draw => 1,
            MatchResult::Loss => 0,
        }
    }

    pub fn code(self) -> char {
        match self {
            MatchResult::Win => 'W',
            MatchResult::Draw => 'D',
            MatchResult::Loss => 'L',
        }
    }

    pub fn from_code(c: char) -> Option<Self> {
        match c {
            'W' => Some(MatchResult::Win),
            'D' => Some(MatchResult::Draw),
            'L' => Some(MatchResult::Loss),
            _ => None,
        }
    }
}

pub type Form = [Option<MatchResult>; FORM_LEN];

pub fn form_to_string(form: &Form) -> String {
    form.iter()
        .map(|r| r.map(MatchResult::code).unwrap_or('-'))
        .collect()
}

pub fn form_from_string(raw: &str) -> Form {
    let mut form = [None; FORM_LEN];
    for (slot, c) in form.iter_mut().zip(raw.chars()) {
        *slot = MatchResult::from_code(c);
    }
    form
}

fn push_form(form: &Form, result: MatchResult) -> Form {
    let mut next = *form;
    match next.iter().position(Option::is_none) {
        Some(empty) => next[empty] = Some(result),
        None => {
            next.rotate_left(1);
            next[FORM_LEN - 1] = Some(result);
        }
    }
    next
}

/// One league-table row for a club at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub competition_id: CompetitionId,
    pub season: Season,
    pub club_id: ClubId,
    /// `None` for the preseason row.
    pub match_id: Option<MatchId>,
    pub off: f64,
    pub def: f64,
    pub efi: f64,
    pub form: Form,
    pub mp: u32,
    pub w: u32,
    pub d: u32,
    pub l: u32,
    pub gf: u32,
    pub ga: u32,
    pub gd: i32,
    pub pts: i32,
}

impl TableSnapshot {
    pub fn seed(
        competition_id: CompetitionId,
        season: Season,
        club_id: ClubId,
        ratings: &ClubRatings,
    ) -> Self {
        Self {
            competition_id,
            season,
            club_id,
            match_id: None,
            off: ratings.off_rating(),
            def: ratings.def_rating(),
            efi: ratings.efi(),
            form: [None; FORM_LEN],
            mp: 0,
            w: 0,
            d: 0,
            l: 0,
            gf: 0,
            ga: 0,
            gd: 0,
            pts: 0,
        }
    }

    /// Next row after a completed match. `ratings` must already include the
    /// match's performances.
    pub fn apply_match(
        &self,
        ratings: &ClubRatings,
        match_id: MatchId,
        goals_for: u32,
        goals_against: u32,
        points_delta: i32,
    ) -> Self {
        let result = MatchResult::from_score(goals_for, goals_against);
        Self {
            competition_id: self.competition_id,
            season: self.season,
            club_id: self.club_id,
            match_id: Some(match_id),
            off: ratings.off_rating(),
            def: ratings.def_rating(),
            efi: ratings.efi(),
            form: push_form(&self.form, result),
            mp: self.mp + 1,
            w: self.w + u32::from(result == MatchResult::Win),
            d: self.d + u32::from(result == MatchResult::Draw),
            l: self.l + u32::from(result == MatchResult::Loss),
            gf: self.gf + goals_for,
            ga: self.ga + goals_against,
            gd: self.gd + goals_for as i32 - goals_against as i32,
            pts: self.pts + result.points() + points_delta,
        }
    }
}

/// Linear map from squad market-value z-scores to preseason ratings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeedRegression {
    pub intercept: f64,
    pub off_slope: f64,
    pub def_slope: f64,
}

impl SeedRegression {
    pub fn predict(&self, z_off: f64, z_def: f64) -> (f64, f64) {
        (
            self.off_slope * z_off + self.intercept,
            self.def_slope * z_def + self.intercept,
        )
    }
}

const PRIOR_WEIGHT: f64 = 2.0 / 3.0;

/// Preseason off/def ratings: two thirds last season's closing ratings and
/// one third market-value regression, or the regression alone for a club
/// with no prior ratings.
pub fn seed_ratings(
    prior: Option<(f64, f64)>,
    market_z: (f64, f64),
    regression: &SeedRegression,
) -> (f64, f64) {
    let (reg_off, reg_def) = regression.predict(market_z.0, market_z.1);
    match prior {
        Some((off, def)) => (
            off * PRIOR_WEIGHT + reg_off * (1.0 - PRIOR_WEIGHT),
            def * PRIOR_WEIGHT + reg_def * (1.0 - PRIOR_WEIGHT),
        ),
        None => (reg_off, reg_def),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarketValue {
    pub club_id: ClubId,
    /// Midfield and attack squad value.
    pub off_value: f64,
    /// Goalkeeper and defence squad value.
    pub def_value: f64,
}

pub fn market_z_scores(values: &[MarketValue]) -> HashMap<ClubId, (f64, f64)> {
    let off: Vec<f64> = values.iter().map(|v| v.off_value).collect();
    let def: Vec<f64> = values.iter().map(|v| v.def_value).collect();
    let (off_mean, off_sd) = mean_and_sample_sd(&off);
    let (def_mean, def_sd) = mean_and_sample_sd(&def);

    values
        .iter()
        .map(|v| {
            (
                v.club_id,
                (
                    z_score(v.off_value, off_mean, off_sd),
                    z_score(v.def_value, def_mean, def_sd),
                ),
            )
        })
        .collect()
}

fn mean_and_sample_sd(xs: &[f64]) -> (f64, f64) {
    if xs.is_empty() {
        return (0.0, 0.0);
    }
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    if xs.len() < 2 {
        return (mean, 0.0);
    }
    let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    (mean, var.sqrt())
}

fn z_score(x: f64, mean: f64, sd: f64) -> f64 {
    if sd > 0.0 { (x - mean) / sd } else { 0.0 }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointsDeduction {
    pub competition_id: CompetitionId,
    pub season: Season,
    pub club_id: ClubId,
    pub effective: NaiveDate,
    pub change: i32,
}

/// Pending points changes. Each entry is handed out once, to the first
/// match of the club played on or after its effective date.
#[derive(Debug, Clone, Default)]
pub struct DeductionLedger {
    pending: BTreeMap<(CompetitionId, Season, ClubId), BTreeMap<NaiveDate, i32>>,
}

impl DeductionLedger {
    pub fn new(deductions: impl IntoIterator<Item = PointsDeduction>) -> Self {
        let mut ledger = Self::default();
        for d in deductions {
            *ledger
                .pending
                .entry((d.competition_id, d.season, d.club_id))
                .or_default()
                .entry(d.effective)
                .or_default() += d.change;
        }
        ledger
    }

    pub fn take(
        &mut self,
        competition_id: CompetitionId,
        season: Season,
        club_id: ClubId,
        match_date: NaiveDate,
    ) -> i32 {
        let key = (competition_id, season, club_id);
        let Some(dates) = self.pending.get_mut(&key) else {
            return 0;
        };
        let Some((&effective, _)) = dates.range(..=match_date).next() else {
            return 0;
        };
        let change = dates.remove(&effective).unwrap_or(0);
        if dates.is_empty() {
            self.pending.remove(&key);
        }
        change
    }

    pub fn pending_len(&self) -> usize {
        self.pending.values().map(BTreeMap::len).sum()
    }
}
