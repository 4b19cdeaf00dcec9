// Roster aggregator: team listings + stat rows + overrides -> candidates.
//
// Fail-soft: a source that errors contributes nothing and is reported in
// `Aggregation::failures`. Output order is fully determined by configuration
// order and source order, so identical responses give identical lists.

use std::collections::{HashMap, HashSet};

use futures_util::future::join_all;
use tracing::{info, warn};

use valdraft_core::config::{DraftConfig, PlayerOverride, TeamEntry};
use valdraft_core::player::{agents_or_unknown, normalize_name, PlayerRecord};

use crate::error::FetchError;
use crate::stats::{StatRow, StatSource};
use crate::teams::TeamSource;

/// Result of one aggregation run.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Aggregation {
    pub players: Vec<PlayerRecord>,
    pub failures: Vec<FetchError>,
}

/// Stats merged for one normalized name.
#[derive(Debug, Clone, PartialEq)]
pub struct StatLine {
    pub agents: Vec<String>,
    pub rating: f64,
}

pub struct RosterAggregator<S, T> {
    stats: S,
    teams: T,
}

impl<S: StatSource, T: TeamSource> RosterAggregator<S, T> {
    pub fn new(stats: S, teams: T) -> Self {
        RosterAggregator { stats, teams }
    }

    pub fn stats(&self) -> &S {
        &self.stats
    }

    pub fn teams(&self) -> &T {
        &self.teams
    }

    /// Fetch sources and merge them, then apply `overrides`.
    pub async fn aggregate(
        &self,
        draft: &DraftConfig,
        overrides: &[PlayerOverride],
    ) -> Aggregation {
        let mut aggregation = self.fetch(draft).await;
        apply_overrides(&mut aggregation.players, overrides, draft.base_salary);
        aggregation
    }

    /// Fetch every stat query and team roster concurrently and merge them.
    /// Overrides are not applied; this is the form the roster cache keeps.
    pub async fn fetch(&self, draft: &DraftConfig) -> Aggregation {
        let stat_fetches =
            join_all(draft.stat_queries.iter().map(|q| self.stats.fetch_stats(q)));
        let team_fetches = join_all(draft.teams.iter().map(|t| self.teams.fetch_team(t)));
        let (stat_results, team_results) = tokio::join!(stat_fetches, team_fetches);

        let mut failures = Vec::new();

        let stat_batches: Vec<Vec<StatRow>> = stat_results
            .into_iter()
            .filter_map(|r| r.map_err(|e| failures.push(e)).ok())
            .collect();
        let stats = merge_stats(stat_batches);

        let rosters: Vec<(&TeamEntry, Vec<String>)> = draft
            .teams
            .iter()
            .zip(team_results)
            .filter_map(|(team, r)| {
                r.map(|handles| (team, handles))
                    .map_err(|e| failures.push(e))
                    .ok()
            })
            .collect();

        let players = build_roster(&rosters, &stats, draft.roster_size, draft.base_salary);

        for failure in &failures {
            warn!("aggregation source failed: {failure}");
        }
        info!(
            players = players.len(),
            stat_lines = stats.len(),
            failures = failures.len(),
            "roster aggregated"
        );

        Aggregation { players, failures }
    }
}

/// Merge stat batches in order. The first batch to mention a normalized name
/// owns it; later batches only fill names not seen yet.
pub fn merge_stats(batches: impl IntoIterator<Item = Vec<StatRow>>) -> HashMap<String, StatLine> {
    let mut merged = HashMap::new();
    for row in batches.into_iter().flatten() {
        let key = normalize_name(&row.player);
        if key.is_empty() {
            continue;
        }
        merged.entry(key).or_insert(StatLine {
            agents: row.agents,
            rating: row.rating,
        });
    }
    merged
}

/// Candidates from team listings: the first `roster_size` handles of each
/// team, looked up in `stats`. A handle already taken by an earlier team is
/// skipped.
pub fn build_roster(
    rosters: &[(&TeamEntry, Vec<String>)],
    stats: &HashMap<String, StatLine>,
    roster_size: usize,
    base_salary: f64,
) -> Vec<PlayerRecord> {
    let mut seen = HashSet::new();
    let mut players = Vec::new();

    for (team, handles) in rosters {
        for handle in handles.iter().take(roster_size) {
            let key = normalize_name(handle);
            if key.is_empty() || !seen.insert(key.clone()) {
                continue;
            }
            let record = match stats.get(&key) {
                Some(line) => PlayerRecord::new(
                    handle.trim(),
                    team.name.as_str(),
                    line.agents.clone(),
                    line.rating,
                    base_salary,
                ),
                None => PlayerRecord::without_stats(handle.trim(), team.name.as_str()),
            };
            players.push(record);
        }
    }
    players
}

/// Apply overrides in order. A matching record gets the override's agents
/// and rating; a name with no record is appended on the override's team.
pub fn apply_overrides(
    players: &mut Vec<PlayerRecord>,
    overrides: &[PlayerOverride],
    base_salary: f64,
) {
    for o in overrides {
        let key = normalize_name(&o.name);
        if key.is_empty() {
            continue;
        }
        match players.iter_mut().find(|p| p.key() == key) {
            Some(player) => {
                player.agents = agents_or_unknown(o.agents.clone());
                player.set_rating(o.rating, base_salary);
            }
            None => players.push(PlayerRecord::new(
                o.name.trim(),
                o.team.as_str(),
                o.agents.clone(),
                o.rating,
                base_salary,
            )),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
