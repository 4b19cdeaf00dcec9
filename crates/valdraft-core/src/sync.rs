// Live sync channel: in-process fan-out of committed picks.
//
// Built on a tokio broadcast channel. Every subscriber sees every event
// published while it is subscribed; a subscriber that falls more than
// `capacity` events behind gets `SubscriptionError::Lagged` and should
// re-read the picked set from the ledger.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::debug;

use crate::ledger::PickRecord;

/// Name of the table pick events refer to.
pub const PICKS_TABLE: &str = "picks";

/// Default buffer size for a channel.
pub const DEFAULT_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// PickEvent
// ---------------------------------------------------------------------------

/// Kind of change carried by a [`PickEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    #[serde(rename = "INSERT")]
    Insert,
    /// Any event type this build does not know about. Receivers ignore it.
    #[serde(other)]
    Other,
}

/// A change to the picks table, as sent over the wire:
/// `{"eventType":"INSERT","table":"picks","new":{..row..}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PickEvent {
    #[serde(rename = "eventType")]
    pub event_type: ChangeKind,
    pub table: String,
    pub new: PickRecord,
}

impl PickEvent {
    pub fn insert(record: PickRecord) -> Self {
        PickEvent {
            event_type: ChangeKind::Insert,
            table: PICKS_TABLE.to_string(),
            new: record,
        }
    }

    /// Whether receivers should apply this event.
    pub fn is_insert(&self) -> bool {
        self.event_type == ChangeKind::Insert && self.table == PICKS_TABLE
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A subscription stopped delivering events for a reason other than the
/// subscriber unsubscribing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    /// The subscriber fell behind and `missed` events were dropped.
    #[error("subscription lagged behind, {missed} events dropped")]
    Lagged { missed: u64 },

    /// Every publisher is gone; no further events will arrive.
    #[error("sync channel closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// SyncChannel
// ---------------------------------------------------------------------------

/// Publish/subscribe hub for pick events. Cheap to clone; clones share the
/// same subscribers.
#[derive(Clone)]
pub struct SyncChannel {
    sender: broadcast::Sender<PickEvent>,
}

impl SyncChannel {
    /// Create a channel buffering at most `capacity` undelivered events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        SyncChannel { sender }
    }

    /// Announce a committed pick. Returns how many subscribers it was queued
    /// for; zero subscribers is not an error.
    pub fn publish(&self, record: &PickRecord) -> usize {
        self.publish_event(PickEvent::insert(record.clone()))
    }

    pub fn publish_event(&self, event: PickEvent) -> usize {
        // A send error only means nobody is subscribed.
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(subscription = id, "sync subscription opened");
        Subscription {
            id,
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for SyncChannel {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle to one subscriber slot. Dropping it, or calling
/// [`unsubscribe`](Subscription::unsubscribe), releases the slot.
pub struct Subscription {
    id: u64,
    receiver: broadcast::Receiver<PickEvent>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Result<PickEvent, SubscriptionError> {
        self.receiver.recv().await.map_err(|e| match e {
            RecvError::Lagged(missed) => SubscriptionError::Lagged { missed },
            RecvError::Closed => SubscriptionError::Closed,
        })
    }

    /// Take the next queued event without waiting. `Ok(None)` when nothing
    /// is queued.
    pub fn try_recv(&mut self) -> Result<Option<PickEvent>, SubscriptionError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Lagged(missed)) => Err(SubscriptionError::Lagged { missed }),
            Err(TryRecvError::Closed) => Err(SubscriptionError::Closed),
        }
    }

    /// Release the slot.
    pub fn unsubscribe(self) {
        debug!(subscription = self.id, "sync subscription released");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
