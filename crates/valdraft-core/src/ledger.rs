// Pick ledger: the authoritative record of which players have been drafted.
//
// A pick is committed with check-then-insert. The check avoids a write for the
// common "already taken" case; the store's UNIQUE constraint on the normalized
// name decides races between concurrent committers, possibly in different
// processes sharing the same database file.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::player::normalize_name;
use crate::sync::{Subscription, SyncChannel};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// A committed pick. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickRecord {
    /// Store-assigned sequence number, increasing with commit order.
    pub id: i64,
    /// Player name as it was committed.
    pub player_name: String,
    /// Normalized player name; unique across the table.
    pub name_key: String,
    pub picked_by: Option<String>,
    pub player_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

/// A pick about to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPick {
    pub player_name: String,
    pub name_key: String,
    pub picked_by: Option<String>,
    pub player_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`PickStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The uniqueness constraint on `name_key` rejected the insert.
    #[error("a pick for `{name_key}` already exists")]
    Conflict { name_key: String },

    /// Anything else: I/O, lock timeout, corrupt row.
    #[error("pick store unavailable: {0:#}")]
    Backend(anyhow::Error),
}

/// Outcome of a failed pick attempt, as reported to the caller.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PickError {
    #[error("{player} has already been picked")]
    AlreadyPicked { player: String },

    /// Storage fault. Not retried automatically; the user may try again.
    #[error("pick could not be saved, try again ({message})")]
    Transient { message: String },

    /// The request itself is unacceptable (blank or unknown player).
    #[error("pick rejected: {reason}")]
    Rejected { reason: String },
}

// ---------------------------------------------------------------------------
// Store trait
// ---------------------------------------------------------------------------

/// Persistent, append-only storage of picks.
///
/// Implementations must reject a second insert for the same `name_key` with
/// [`StoreError::Conflict`], atomically with respect to other writers.
pub trait PickStore: Send + Sync {
    fn insert_pick(&self, pick: &NewPick) -> Result<PickRecord, StoreError>;

    fn find_pick(&self, name_key: &str) -> Result<Option<PickRecord>, StoreError>;

    fn picked_keys(&self) -> Result<HashSet<String>, StoreError>;

    /// Picks with `id > after_id`, ordered by id.
    fn picks_after(&self, after_id: i64) -> Result<Vec<PickRecord>, StoreError>;

    /// Highest id in the table, 0 when empty.
    fn latest_pick_id(&self) -> Result<i64, StoreError>;
}

impl<T: PickStore + ?Sized> PickStore for Arc<T> {
    fn insert_pick(&self, pick: &NewPick) -> Result<PickRecord, StoreError> {
        (**self).insert_pick(pick)
    }

    fn find_pick(&self, name_key: &str) -> Result<Option<PickRecord>, StoreError> {
        (**self).find_pick(name_key)
    }

    fn picked_keys(&self) -> Result<HashSet<String>, StoreError> {
        (**self).picked_keys()
    }

    fn picks_after(&self, after_id: i64) -> Result<Vec<PickRecord>, StoreError> {
        (**self).picks_after(after_id)
    }

    fn latest_pick_id(&self) -> Result<i64, StoreError> {
        (**self).latest_pick_id()
    }
}

fn transient(err: StoreError) -> PickError {
    PickError::Transient {
        message: err.to_string(),
    }
}

// ---------------------------------------------------------------------------
// PickLedger
// ---------------------------------------------------------------------------

/// Commits picks to a [`PickStore`] and announces them on a [`SyncChannel`].
pub struct PickLedger<S> {
    store: S,
    channel: SyncChannel,
}

impl<S: PickStore> PickLedger<S> {
    pub fn new(store: S, channel: SyncChannel) -> Self {
        PickLedger { store, channel }
    }

    /// Claim `player_name` for `picked_by`.
    ///
    /// Returns the committed record, or [`PickError::AlreadyPicked`] when the
    /// player is taken (including when a concurrent committer won the race at
    /// the store). Other storage faults become [`PickError::Transient`].
    pub fn attempt_pick(
        &self,
        player_name: &str,
        picked_by: Option<&str>,
    ) -> Result<PickRecord, PickError> {
        let player_name = player_name.trim();
        if player_name.is_empty() {
            return Err(PickError::Rejected {
                reason: "player name must not be empty".into(),
            });
        }
        let name_key = normalize_name(player_name);

        match self.store.find_pick(&name_key) {
            Ok(Some(existing)) => {
                debug!(
                    player = player_name,
                    picked_by = ?existing.picked_by,
                    "pick refused: player already taken"
                );
                return Err(PickError::AlreadyPicked {
                    player: player_name.to_string(),
                });
            }
            Ok(None) => {}
            Err(e) => {
                warn!(player = player_name, "pick lookup failed: {e}");
                return Err(transient(e));
            }
        }

        let new_pick = NewPick {
            player_name: player_name.to_string(),
            name_key,
            picked_by: picked_by
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
            player_id: None,
        };

        match self.store.insert_pick(&new_pick) {
            Ok(record) => {
                info!(
                    player = %record.player_name,
                    picked_by = ?record.picked_by,
                    id = record.id,
                    "pick committed"
                );
                self.channel.publish(&record);
                Ok(record)
            }
            Err(StoreError::Conflict { .. }) => {
                info!(player = player_name, "pick lost a concurrent race");
                Err(PickError::AlreadyPicked {
                    player: player_name.to_string(),
                })
            }
            Err(e) => {
                warn!(player = player_name, "pick commit failed: {e}");
                Err(transient(e))
            }
        }
    }

    /// Normalized names of every picked player.
    pub fn list_picked(&self) -> Result<HashSet<String>, PickError> {
        self.store.picked_keys().map_err(transient)
    }

    /// Subscribe to pick events and read the current picked set.
    ///
    /// The subscription is taken before the snapshot is read, so a pick
    /// committed while joining is either in the snapshot, delivered on the
    /// subscription, or both. Receivers treat duplicates as no-ops.
    pub fn join(&self) -> Result<(HashSet<String>, Subscription), PickError> {
        let subscription = self.channel.subscribe();
        let snapshot = self.list_picked()?;
        Ok((snapshot, subscription))
    }

    pub fn picks_after(&self, after_id: i64) -> Result<Vec<PickRecord>, PickError> {
        self.store.picks_after(after_id).map_err(transient)
    }

    pub fn latest_pick_id(&self) -> Result<i64, PickError> {
        self.store.latest_pick_id().map_err(transient)
    }

    pub fn channel(&self) -> &SyncChannel {
        &self.channel
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
