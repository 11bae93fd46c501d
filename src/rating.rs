use crate::error::{EngineError, EngineResult};
use crate::outcome;

pub const WINDOW_CAPACITY: usize = 25;

/// Linearly decaying recency weight: 1.0 for the latest match down to 0.04
/// for the 25th most recent.
pub fn weight(index: usize) -> f64 {
    1.0 - index as f64 / WINDOW_CAPACITY as f64
}

pub fn weight_sum(n: usize) -> f64 {
    (0..n.min(WINDOW_CAPACITY)).map(weight).sum()
}

/// Bounded ring of performance values, most recent first.
///
/// A window is never empty: it starts from a preseason seed value or from a
/// non-empty list of stored performances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RatingWindow {
    values: [f64; WINDOW_CAPACITY],
    head: usize,
    len: usize,
}

impl RatingWindow {
    pub fn seeded(value: f64) -> Self {
        let mut values = [0.0; WINDOW_CAPACITY];
        values[0] = value;
        Self {
            values,
            head: 0,
            len: 1,
        }
    }

    /// Builds a window from values ordered most recent first. Anything past
    /// the 25th value is ignored.
    pub fn from_recent(recent: &[f64]) -> EngineResult<Self> {
        let kept = &recent[..recent.len().min(WINDOW_CAPACITY)];
        let Some((oldest, newer)) = kept.split_last() else {
            return Err(EngineError::EmptyRatingWindow);
        };
        let mut window = Self::seeded(*oldest);
        for value in newer.iter().rev() {
            window.push(*value);
        }
        Ok(window)
    }

    pub fn push(&mut self, value: f64) {
        self.head = (self.head + WINDOW_CAPACITY - 1) % WINDOW_CAPACITY;
        // When full, the slot before head holds the oldest value.
        self.values[self.head] = value;
        if self.len < WINDOW_CAPACITY {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_full(&self) -> bool {
        self.len == WINDOW_CAPACITY
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        (index < self.len).then(|| self.values[(self.head + index) % WINDOW_CAPACITY])
    }

    pub fn latest(&self) -> f64 {
        self.values[self.head]
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len).map(move |i| self.values[(self.head + i) % WINDOW_CAPACITY])
    }

    pub fn to_vec(&self) -> Vec<f64> {
        self.iter().collect()
    }

    pub fn rating(&self) -> f64 {
        let weighted: f64 = self.iter().enumerate().map(|(i, v)| v * weight(i)).sum();
        weighted / weight_sum(self.len)
    }

    /// `Σ window[i] * weight[i + 1]` over the first `n - 1` values: the
    /// contribution the current values would make after one more push.
    pub fn shifted_contribution(&self, n: usize) -> f64 {
        self.iter()
            .take(n.saturating_sub(1))
            .enumerate()
            .map(|(i, v)| v * weight(i + 1))
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClubRatings {
    pub off: RatingWindow,
    pub def: RatingWindow,
}

impl ClubRatings {
    pub fn seeded(off: f64, def: f64) -> Self {
        Self {
            off: RatingWindow::seeded(off),
            def: RatingWindow::seeded(def),
        }
    }

    pub fn from_recent(off: &[f64], def: &[f64]) -> EngineResult<Self> {
        Ok(Self {
            off: RatingWindow::from_recent(off)?,
            def: RatingWindow::from_recent(def)?,
        })
    }

    pub fn off_rating(&self) -> f64 {
        self.off.rating()
    }

    pub fn def_rating(&self) -> f64 {
        self.def.rating()
    }

    pub fn efi(&self) -> f64 {
        outcome::efi(self.off_rating(), self.def_rating())
    }

    pub fn push(&mut self, off_performance: f64, def_performance: f64) {
        self.off.push(off_performance);
        self.def.push(def_performance);
    }
}
