// Fetch failures from the external data sources. These never abort an
// aggregation; they are collected alongside the partial result.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    #[error("stat fetch for {query} failed: {reason}")]
    Stats { query: String, reason: String },

    #[error("roster fetch for team {team_id} failed: {reason}")]
    Team { team_id: u32, reason: String },
}
