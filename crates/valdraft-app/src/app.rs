// Draft server orchestration.
//
// One loop owns every connection. Transport events arrive over an mpsc
// channel from the WebSocket server; each connection joins the ledger on
// connect and gets a forwarder task relaying live pick events to it.
// Picks and picked-set reads run on the blocking pool and come back to the
// loop as `StoreReply` values, so a store waiting on a lock held by another
// process never holds up other clients.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use valdraft_core::ledger::{PickError, PickLedger, PickStore};
use valdraft_core::player::{normalize_name, PlayerRecord};
use valdraft_core::protocol::{ClientMessage, ServerMessage};
use valdraft_core::sync::{Subscription, SubscriptionError};
use valdraft_core::ws_server::{ConnectionId, WsEvent};

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// A reply computed off the loop, to be queued for one client.
#[derive(Debug)]
pub struct StoreReply {
    pub conn_id: ConnectionId,
    pub reply: ServerMessage,
}

struct Connection {
    addr: String,
    user: Option<String>,
    outbound: mpsc::Sender<String>,
    forwarder: JoinHandle<()>,
}

/// Everything the server loop owns.
pub struct AppState<S: PickStore + 'static> {
    ledger: Arc<PickLedger<S>>,
    players: Vec<PlayerRecord>,
    /// Normalized name -> index into `players`.
    index: HashMap<String, usize>,
    connections: HashMap<ConnectionId, Connection>,
    store_tx: mpsc::Sender<StoreReply>,
}

impl<S: PickStore + 'static> AppState<S> {
    pub fn new(
        ledger: Arc<PickLedger<S>>,
        players: Vec<PlayerRecord>,
        store_tx: mpsc::Sender<StoreReply>,
    ) -> Self {
        let mut state = AppState {
            ledger,
            players: Vec::new(),
            index: HashMap::new(),
            connections: HashMap::new(),
            store_tx,
        };
        state.set_players(players);
        state
    }

    /// Replace the candidate list. The first record for a normalized name
    /// wins.
    pub fn set_players(&mut self, players: Vec<PlayerRecord>) {
        self.index.clear();
        self.players.clear();
        for player in players {
            let key = player.key();
            if self.index.contains_key(&key) {
                continue;
            }
            self.index.insert(key, self.players.len());
            self.players.push(player);
        }
    }

    pub fn players(&self) -> &[PlayerRecord] {
        &self.players
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn ledger(&self) -> &Arc<PickLedger<S>> {
        &self.ledger
    }

    /// Handle one transport event.
    pub fn handle_event(&mut self, event: WsEvent) {
        match event {
            WsEvent::Connected {
                conn_id,
                addr,
                outbound,
            } => self.handle_connected(conn_id, addr, outbound),
            WsEvent::Message { conn_id, text } => self.handle_message(conn_id, &text),
            WsEvent::Disconnected { conn_id } => self.handle_disconnected(conn_id),
        }
    }

    /// Queue a reply produced by a store task. Dropped if the client has
    /// gone away in the meantime.
    pub fn handle_store_reply(&mut self, done: StoreReply) {
        self.reply(done.conn_id, done.reply);
    }

    fn handle_connected(&mut self, conn_id: ConnectionId, addr: String, outbound: mpsc::Sender<String>) {
        let (picked, subscription) = match self.ledger.join() {
            Ok(joined) => joined,
            Err(e) => {
                warn!(conn_id, "could not join ledger for {addr}: {e}");
                let _ = outbound.try_send(encode(&ServerMessage::Error {
                    message: e.to_string(),
                }));
                // Dropping `outbound` closes the socket.
                return;
            }
        };

        // WELCOME goes out before the forwarder exists, so the client always
        // sees the snapshot before any CHANGE. Events committed meanwhile
        // wait in the subscription.
        let welcome = ServerMessage::welcome(self.players.clone(), &picked);
        if outbound.try_send(encode(&welcome)).is_err() {
            warn!(conn_id, "could not queue WELCOME for {addr}");
            return;
        }

        let forwarder = tokio::spawn(forward_events(
            conn_id,
            subscription,
            outbound.clone(),
            Arc::clone(&self.ledger),
        ));

        info!(
            conn_id,
            picked = picked.len(),
            "client connected from {addr}"
        );
        self.connections.insert(
            conn_id,
            Connection {
                addr,
                user: None,
                outbound,
                forwarder,
            },
        );
    }

    fn handle_disconnected(&mut self, conn_id: ConnectionId) {
        if let Some(conn) = self.connections.remove(&conn_id) {
            conn.forwarder.abort();
            info!(conn_id, user = ?conn.user, "client {} disconnected", conn.addr);
        }
    }

    fn handle_message(&mut self, conn_id: ConnectionId, text: &str) {
        if !self.connections.contains_key(&conn_id) {
            debug!(conn_id, "message from unknown connection dropped");
            return;
        }

        let msg = match ClientMessage::parse(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(conn_id, "failed to parse client message: {e}");
                self.reply(
                    conn_id,
                    ServerMessage::Error {
                        message: format!("invalid message: {e}"),
                    },
                );
                return;
            }
        };

        match msg {
            ClientMessage::Hello { user } => {
                let user = user.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
                info!(conn_id, user = ?user, "client identified");
                if let Some(conn) = self.connections.get_mut(&conn_id) {
                    conn.user = user;
                }
            }
            ClientMessage::ListPicked => {
                self.reply_from_store(
                    conn_id,
                    |ledger| match ledger.list_picked() {
                        Ok(picked) => ServerMessage::picked_snapshot(&picked),
                        Err(e) => ServerMessage::Error {
                            message: e.to_string(),
                        },
                    },
                    |message| ServerMessage::Error { message },
                );
            }
            ClientMessage::GetRoster => {
                let reply = ServerMessage::Roster {
                    players: self.players.clone(),
                };
                self.reply(conn_id, reply);
            }
            ClientMessage::AttemptPick { player_name } => self.attempt_pick(conn_id, &player_name),
            ClientMessage::Ping => self.reply(conn_id, ServerMessage::Pong),
        }
    }

    /// Validate against the candidate list, then commit off the loop. The
    /// PICK_RESULT arrives later as a [`StoreReply`].
    fn attempt_pick(&mut self, conn_id: ConnectionId, player_name: &str) {
        let name = match self.candidate_name(player_name) {
            Ok(name) => name,
            Err(e) => {
                debug!(conn_id, "pick rejected: {e}");
                self.reply(conn_id, ServerMessage::pick_result(&Err(e)));
                return;
            }
        };
        let user = self
            .connections
            .get(&conn_id)
            .and_then(|c| c.user.clone());

        self.reply_from_store(
            conn_id,
            move |ledger| ServerMessage::pick_result(&ledger.attempt_pick(&name, user.as_deref())),
            |message| ServerMessage::pick_result(&Err(PickError::Transient { message })),
        );
    }

    /// Canonical candidate name for `player_name`.
    fn candidate_name(&self, player_name: &str) -> Result<String, PickError> {
        let key = normalize_name(player_name);
        if key.is_empty() {
            return Err(PickError::Rejected {
                reason: "player name must not be empty".into(),
            });
        }
        match self.index.get(&key) {
            Some(&idx) => Ok(self.players[idx].name.clone()),
            None => Err(PickError::Rejected {
                reason: format!("{} is not on the candidate list", player_name.trim()),
            }),
        }
    }

    /// Run `work` against the ledger on the blocking pool and send its reply
    /// back to the loop. `failed` builds the reply if the task panics.
    fn reply_from_store<W, F>(&self, conn_id: ConnectionId, work: W, failed: F)
    where
        W: FnOnce(&PickLedger<S>) -> ServerMessage + Send + 'static,
        F: FnOnce(String) -> ServerMessage + Send + 'static,
    {
        let ledger = Arc::clone(&self.ledger);
        let tx = self.store_tx.clone();
        tokio::spawn(async move {
            let reply = match tokio::task::spawn_blocking(move || work(&ledger)).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(conn_id, "store task failed: {e}");
                    failed(format!("store task failed: {e}"))
                }
            };
            // Only fails once the loop has shut down.
            let _ = tx.send(StoreReply { conn_id, reply }).await;
        });
    }

    /// Queue `msg` for one client. A client whose queue is full is dropped
    /// rather than stalling the loop.
    fn reply(&mut self, conn_id: ConnectionId, msg: ServerMessage) {
        let Some(conn) = self.connections.get(&conn_id) else {
            return;
        };
        if let Err(e) = conn.outbound.try_send(encode(&msg)) {
            warn!(conn_id, "dropping client {}: {e}", conn.addr);
            self.handle_disconnected(conn_id);
        }
    }

    /// Abort every forwarder and forget every connection.
    pub fn shutdown(&mut self) {
        for (_, conn) in self.connections.drain() {
            conn.forwarder.abort();
        }
    }
}

fn encode(msg: &ServerMessage) -> String {
    // Every ServerMessage field is plain data; serialization cannot fail.
    msg.to_json().unwrap_or_else(|e| {
        format!(r#"{{"type":"ERROR","message":"encode failed: {e}"}}"#)
    })
}

/// Relay pick events from `subscription` to one client until either side
/// goes away. A lag is answered with a fresh snapshot.
async fn forward_events<S: PickStore + 'static>(
    conn_id: ConnectionId,
    mut subscription: Subscription,
    outbound: mpsc::Sender<String>,
    ledger: Arc<PickLedger<S>>,
) {
    loop {
        let msg = match subscription.recv().await {
            Ok(event) => ServerMessage::Change { event },
            Err(SubscriptionError::Lagged { missed }) => {
                warn!(conn_id, missed, "client subscription lagged, sending snapshot");
                match ledger.list_picked() {
                    Ok(picked) => ServerMessage::picked_snapshot(&picked),
                    Err(e) => ServerMessage::Error {
                        message: e.to_string(),
                    },
                }
            }
            Err(SubscriptionError::Closed) => {
                debug!(conn_id, "sync channel closed, forwarder exiting");
                break;
            }
        };
        if outbound.send(encode(&msg)).await.is_err() {
            break;
        }
    }
    subscription.unsubscribe();
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run the server loop until the transport channel closes.
///
/// Listens on two channels: transport events from the WebSocket server and
/// replies from store tasks (whose sender lives in `state`).
pub async fn run<S: PickStore + 'static>(
    mut ws_rx: mpsc::Receiver<WsEvent>,
    mut store_rx: mpsc::Receiver<StoreReply>,
    mut state: AppState<S>,
) -> anyhow::Result<()> {
    info!(players = state.players().len(), "draft server loop started");

    loop {
        tokio::select! {
            event = ws_rx.recv() => match event {
                Some(event) => state.handle_event(event),
                None => break,
            },
            Some(done) = store_rx.recv() => state.handle_store_reply(done),
        }
    }

    info!("WebSocket channel closed, shutting down");
    state.shutdown();
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
