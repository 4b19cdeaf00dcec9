// Wire protocol between the draft server and its clients.
//
// Every frame is a JSON text message tagged with a `type` field in
// SCREAMING_SNAKE_CASE, e.g. `{"type":"ATTEMPT_PICK","player_name":"TenZ"}`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::ledger::{PickError, PickRecord};
use crate::player::PlayerRecord;
use crate::sync::PickEvent;

// ---------------------------------------------------------------------------
// Client -> server
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientMessage {
    /// Announce who is drafting on this connection. Optional; picks made
    /// before a `HELLO` are recorded without a user.
    Hello {
        #[serde(default)]
        user: Option<String>,
    },
    /// Ask for a fresh picked-set snapshot.
    ListPicked,
    /// Ask for the candidate list again.
    GetRoster,
    AttemptPick { player_name: String },
    Ping,
}

impl ClientMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Server -> client
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerMessage {
    /// First message on every connection: the candidates and the picked set
    /// as of the moment the connection subscribed.
    Welcome {
        players: Vec<PlayerRecord>,
        picked: Vec<String>,
    },
    Roster {
        players: Vec<PlayerRecord>,
    },
    /// Authoritative picked set; replaces whatever the client had cached.
    PickedSnapshot {
        picked: Vec<String>,
    },
    Change {
        event: PickEvent,
    },
    PickResult {
        outcome: PickOutcome,
    },
    Pong,
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn welcome(players: Vec<PlayerRecord>, picked: &HashSet<String>) -> Self {
        ServerMessage::Welcome {
            players,
            picked: sorted_keys(picked),
        }
    }

    pub fn picked_snapshot(picked: &HashSet<String>) -> Self {
        ServerMessage::PickedSnapshot {
            picked: sorted_keys(picked),
        }
    }

    pub fn pick_result(result: &Result<PickRecord, PickError>) -> Self {
        ServerMessage::PickResult {
            outcome: PickOutcome::from_result(result),
        }
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Result of an `ATTEMPT_PICK`, tagged by `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PickOutcome {
    Committed { record: PickRecord },
    AlreadyPicked { player: String },
    /// Storage fault; the client may retry.
    Failed { message: String },
    Rejected { reason: String },
}

impl PickOutcome {
    pub fn from_result(result: &Result<PickRecord, PickError>) -> Self {
        match result {
            Ok(record) => PickOutcome::Committed {
                record: record.clone(),
            },
            Err(PickError::AlreadyPicked { player }) => PickOutcome::AlreadyPicked {
                player: player.clone(),
            },
            Err(PickError::Transient { message }) => PickOutcome::Failed {
                message: message.clone(),
            },
            Err(PickError::Rejected { reason }) => PickOutcome::Rejected {
                reason: reason.clone(),
            },
        }
    }

    pub fn into_result(self) -> Result<PickRecord, PickError> {
        match self {
            PickOutcome::Committed { record } => Ok(record),
            PickOutcome::AlreadyPicked { player } => Err(PickError::AlreadyPicked { player }),
            PickOutcome::Failed { message } => Err(PickError::Transient { message }),
            PickOutcome::Rejected { reason } => Err(PickError::Rejected { reason }),
        }
    }
}

/// Picked keys in a stable order so identical sets encode identically.
pub fn sorted_keys(picked: &HashSet<String>) -> Vec<String> {
    let mut keys: Vec<String> = picked.iter().cloned().collect();
    keys.sort();
    keys
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
