// Roster cache: the last good aggregation, kept in the draft_state table so
// a restart does not refetch everything and an upstream outage does not
// leave the draft without candidates.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use valdraft_core::config::{DraftConfig, PlayerOverride};
use valdraft_core::db::Database;
use valdraft_core::player::PlayerRecord;

use crate::aggregate::{apply_overrides, Aggregation, RosterAggregator};
use crate::error::FetchError;
use crate::stats::StatSource;
use crate::teams::TeamSource;

pub const ROSTER_CACHE_KEY: &str = "roster_cache";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedRoster {
    pub fetched_at: DateTime<Utc>,
    pub players: Vec<PlayerRecord>,
}

impl CachedRoster {
    /// Younger than `ttl` at `now`. A timestamp in the future counts as stale.
    pub fn is_fresh(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match (now - self.fetched_at).to_std() {
            Ok(age) => age < ttl,
            Err(_) => false,
        }
    }
}

pub fn load_cached_roster(db: &Database) -> Result<Option<CachedRoster>> {
    db.load_state(ROSTER_CACHE_KEY)?
        .map(|value| serde_json::from_value(value).context("failed to decode cached roster"))
        .transpose()
}

pub fn save_cached_roster(
    db: &Database,
    players: &[PlayerRecord],
    now: DateTime<Utc>,
) -> Result<()> {
    let cached = CachedRoster {
        fetched_at: now,
        players: players.to_vec(),
    };
    let value = serde_json::to_value(&cached).context("failed to encode roster cache")?;
    db.save_state(ROSTER_CACHE_KEY, &value)
}

/// Where the candidate list came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterOrigin {
    /// A cached roster still within its TTL.
    FreshCache,
    Aggregated,
    /// Aggregation produced nothing; an expired cache was used instead.
    StaleCache,
    /// Aggregation produced nothing and there was no cache.
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterLoad {
    pub players: Vec<PlayerRecord>,
    pub origin: RosterOrigin,
    pub failures: Vec<FetchError>,
}

/// Candidate list for startup or a manual refresh.
///
/// Uses a fresh cache when there is one (unless `force` is set); otherwise
/// fetches and saves the result. A fetch with no players falls back to
/// whatever is cached. Cache read and write problems are logged and never
/// fail the load.
///
/// The cache holds the roster as fetched, before overrides. Salaries are
/// re-derived from the current `base_salary` and `overrides` are applied on
/// every path, so edits to either take effect without waiting for the TTL.
pub async fn load_roster<S: StatSource, T: TeamSource>(
    db: &Database,
    aggregator: &RosterAggregator<S, T>,
    draft: &DraftConfig,
    overrides: &[PlayerOverride],
    ttl: Duration,
    force: bool,
) -> RosterLoad {
    let mut load = load_base_roster(db, aggregator, draft, ttl, force).await;
    for player in &mut load.players {
        player.set_rating(player.rating, draft.base_salary);
    }
    apply_overrides(&mut load.players, overrides, draft.base_salary);
    if !overrides.is_empty() {
        info!(
            overrides = overrides.len(),
            players = load.players.len(),
            "overrides applied"
        );
    }
    load
}

async fn load_base_roster<S: StatSource, T: TeamSource>(
    db: &Database,
    aggregator: &RosterAggregator<S, T>,
    draft: &DraftConfig,
    ttl: Duration,
    force: bool,
) -> RosterLoad {
    let cached = match load_cached_roster(db) {
        Ok(cached) => cached,
        Err(e) => {
            warn!("ignoring unreadable roster cache: {e:#}");
            None
        }
    };

    if !force {
        if let Some(cached) = cached.as_ref().filter(|c| c.is_fresh(ttl, Utc::now())) {
            info!(
                players = cached.players.len(),
                fetched_at = %cached.fetched_at,
                "using cached roster"
            );
            return RosterLoad {
                players: cached.players.clone(),
                origin: RosterOrigin::FreshCache,
                failures: Vec::new(),
            };
        }
    }

    let Aggregation { players, failures } = aggregator.fetch(draft).await;

    if !players.is_empty() {
        if let Err(e) = save_cached_roster(db, &players, Utc::now()) {
            warn!("failed to save roster cache: {e:#}");
        }
        return RosterLoad {
            players,
            origin: RosterOrigin::Aggregated,
            failures,
        };
    }

    match cached {
        Some(cached) if !cached.players.is_empty() => {
            warn!(
                players = cached.players.len(),
                "aggregation returned no players, falling back to cached roster"
            );
            RosterLoad {
                players: cached.players,
                origin: RosterOrigin::StaleCache,
                failures,
            }
        }
        _ => {
            warn!("aggregation returned no players and no cached roster exists");
            RosterLoad {
                players: Vec::new(),
                origin: RosterOrigin::Empty,
                failures,
            }
        }
    }
}
