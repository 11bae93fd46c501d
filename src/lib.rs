pub mod competition;
pub mod config;
pub mod error;
pub mod match_events;
pub mod outcome;
pub mod performance;
pub mod rating;
pub mod replay;
pub mod scheduler;
pub mod scoring;
pub mod simulation;
pub mod standings;
pub mod store;

pub type ClubId = u32;
pub type MatchId = u64;
pub type CompetitionId = u32;
/// Earlier calendar year of a season; 2023 means 2023/24.
pub type Season = i32;
