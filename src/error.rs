use thiserror::Error;

use crate::{ClubId, MatchId};

/// Errors raised by the rating and projection engine.
///
/// Configuration errors abort the whole requesting operation. Data-integrity
/// errors are tied to a single match and stop a replay at that match, since
/// every later rating depends on it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("competition {competition} is missing {field}")]
    MissingParameter {
        competition: String,
        field: &'static str,
    },

    #[error("unknown competition id {0}")]
    UnknownCompetition(u32),

    #[error("rating window needs at least one performance value")]
    EmptyRatingWindow,

    #[error("club {0} has no rating window or table row")]
    UnknownClub(ClubId),

    #[error("match {match_id} is missing {field}")]
    MissingMatchStats { match_id: MatchId, field: &'static str },
}

impl EngineError {
    pub fn is_data_integrity(&self) -> bool {
        matches!(self, EngineError::MissingMatchStats { .. })
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
