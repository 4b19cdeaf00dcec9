// Player data model: candidate records and derived salary.

use serde::{Deserialize, Serialize};

/// Agent label used when a player's agent pool is unknown.
pub const UNKNOWN_AGENT: &str = "Unknown";

/// Case-insensitive identity of a player handle.
///
/// Every comparison between player names (stat merge, pick uniqueness,
/// picked-set lookups) goes through this function.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Salary derived from a performance rating: `rating² × base_salary`.
pub fn salary_for(rating: f64, base_salary: f64) -> f64 {
    rating * rating * base_salary
}

/// Agent list with the `["Unknown"]` fallback applied.
pub fn agents_or_unknown(agents: Vec<String>) -> Vec<String> {
    let agents: Vec<String> = agents
        .into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .collect();
    if agents.is_empty() {
        vec![UNKNOWN_AGENT.to_string()]
    } else {
        agents
    }
}

/// A draftable player with merged statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerRecord {
    /// Canonical handle as reported by the team source.
    pub name: String,
    /// Current team display name.
    pub team: String,
    /// Agents played, most played first.
    pub agents: Vec<String>,
    /// Performance rating (0 when unavailable).
    pub rating: f64,
    /// Cached `salary_for(rating, base_salary)`.
    pub salary: f64,
}

impl PlayerRecord {
    /// Build a record, deriving the salary from `rating`.
    pub fn new(
        name: impl Into<String>,
        team: impl Into<String>,
        agents: Vec<String>,
        rating: f64,
        base_salary: f64,
    ) -> Self {
        let rating = sanitize_rating(rating);
        PlayerRecord {
            name: name.into(),
            team: team.into(),
            agents: agents_or_unknown(agents),
            rating,
            salary: salary_for(rating, base_salary),
        }
    }

    /// A record for a player without any statistics.
    pub fn without_stats(name: impl Into<String>, team: impl Into<String>) -> Self {
        PlayerRecord {
            name: name.into(),
            team: team.into(),
            agents: vec![UNKNOWN_AGENT.to_string()],
            rating: 0.0,
            salary: 0.0,
        }
    }

    /// Normalized name used as the identity key.
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }

    /// Replace the rating and recompute the salary.
    pub fn set_rating(&mut self, rating: f64, base_salary: f64) {
        self.rating = sanitize_rating(rating);
        self.salary = salary_for(self.rating, base_salary);
    }

    /// Whether stats were missing when this record was built.
    pub fn has_stats(&self) -> bool {
        self.rating > 0.0 || self.agents.iter().any(|a| a != UNKNOWN_AGENT)
    }
}

fn sanitize_rating(rating: f64) -> f64 {
    if rating.is_finite() && rating > 0.0 {
        rating
    } else {
        0.0
    }
}
