// Terminal draft client: view state, input handling and rendering.
//
// The connection task (`client`) pushes `ClientEvent`s over an mpsc channel;
// the UI loop applies them to `ViewState` and re-renders at ~30 fps. Key
// presses become local view changes or protocol messages sent back to the
// connection task.

pub mod client;
pub mod input;
pub mod layout;
pub mod widgets;

use std::collections::HashSet;
use std::time::Duration;

use crossterm::event::{Event, EventStream};
use futures_util::StreamExt;
use ratatui::Frame;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use valdraft_app::view::{DraftView, NoticeKind, PickFollowUp};
use valdraft_core::ledger::PickError;
use valdraft_core::protocol::{ClientMessage, ServerMessage};

use input::Action;
use layout::build_layout;

// ---------------------------------------------------------------------------
// Connection events
// ---------------------------------------------------------------------------

/// Connection state shown in the status bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected,
}

/// Events from the connection task. Every event carries the epoch of the
/// connection that produced it; each reconnect starts a new epoch.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected { epoch: u64 },
    Server { epoch: u64, message: ServerMessage },
    Disconnected { epoch: u64, reason: String },
}

// ---------------------------------------------------------------------------
// ViewState
// ---------------------------------------------------------------------------

/// Everything the UI renders from.
pub struct ViewState {
    pub view: DraftView,
    pub connection: ConnectionStatus,
    /// Epoch of the live connection. Events from any other are stale.
    pub epoch: u64,
    pub server_url: String,
    /// Whether typed characters go to the filter.
    pub filter_mode: bool,
    pub filter_text: String,
}

impl Default for ViewState {
    fn default() -> Self {
        ViewState {
            view: DraftView::default(),
            connection: ConnectionStatus::Connecting,
            epoch: 0,
            server_url: String::new(),
            filter_mode: false,
            filter_text: String::new(),
        }
    }
}

impl ViewState {
    pub fn new(server_url: impl Into<String>, user: Option<String>) -> Self {
        let mut state = ViewState {
            server_url: server_url.into(),
            ..ViewState::default()
        };
        state.view.set_user(user);
        state
    }

    pub fn is_connected(&self) -> bool {
        self.connection == ConnectionStatus::Connected
    }

    /// Apply one connection event. Returns messages to send back to the
    /// server in response.
    pub fn apply_client_event(&mut self, event: ClientEvent) -> Vec<ClientMessage> {
        match event {
            ClientEvent::Connected { epoch } => {
                if epoch < self.epoch {
                    return Vec::new();
                }
                self.epoch = epoch;
                self.connection = ConnectionStatus::Connected;
                // Anything tagged with the previous load is now stale; WELCOME
                // for this connection starts the new one.
                self.view.begin_load();
                info!(epoch, "connected to draft server");
                Vec::new()
            }
            ClientEvent::Server { epoch, message } => {
                if epoch != self.epoch {
                    debug!(epoch, current = self.epoch, "discarding message from stale connection");
                    return Vec::new();
                }
                self.apply_server_message(message)
            }
            ClientEvent::Disconnected { epoch, reason } => {
                if epoch < self.epoch {
                    return Vec::new();
                }
                self.epoch = epoch;
                if self.connection != ConnectionStatus::Disconnected {
                    warn!(epoch, "lost connection: {reason}");
                }
                self.connection = ConnectionStatus::Disconnected;
                if self.view.pick_in_flight() {
                    // The answer is gone with the socket; let the user retry.
                    self.view.finish_pick(Err(PickError::Transient {
                        message: "connection lost".into(),
                    }));
                } else {
                    self.view
                        .set_notice(NoticeKind::Warning, format!("Disconnected: {reason}"));
                }
                Vec::new()
            }
        }
    }

    fn apply_server_message(&mut self, message: ServerMessage) -> Vec<ClientMessage> {
        let generation = self.view.generation();
        match message {
            ServerMessage::Welcome { players, picked } => {
                let count = players.len();
                let picked: HashSet<String> = picked.into_iter().collect();
                if self.view.apply_roster(generation, players, picked) {
                    self.view
                        .set_notice(NoticeKind::Info, format!("{count} players available"));
                }
            }
            ServerMessage::Roster { players } => {
                self.view.replace_candidates(generation, players);
            }
            ServerMessage::PickedSnapshot { picked } => {
                self.view
                    .replace_picked(generation, picked.into_iter().collect());
            }
            ServerMessage::Change { event } => {
                self.view.apply_event(&event);
            }
            ServerMessage::PickResult { outcome } => {
                if self.view.finish_pick(outcome.into_result()) == PickFollowUp::RefreshPicked {
                    return vec![ClientMessage::ListPicked];
                }
            }
            ServerMessage::Pong => {}
            ServerMessage::Error { message } => {
                warn!("server error: {message}");
                self.view
                    .set_notice(NoticeKind::Error, format!("Server: {message}"));
            }
        }
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Render frame
// ---------------------------------------------------------------------------

pub fn render_frame(frame: &mut Frame, state: &ViewState) {
    let layout = build_layout(frame.area());
    widgets::status_bar::render(frame, layout.status_bar, state);
    widgets::available::render(frame, layout.main_panel, state);
    widgets::notice::render(frame, layout.notice, state);
    widgets::help_bar::render(frame, layout.help_bar, state);
}

// ---------------------------------------------------------------------------
// Main TUI loop
// ---------------------------------------------------------------------------

/// Run the TUI event loop until the user quits or the connection task goes
/// away.
///
/// Takes over the terminal (raw mode, alternate screen) and restores it on
/// exit, including on panic.
pub async fn run(
    mut events: mpsc::Receiver<ClientEvent>,
    commands: mpsc::Sender<ClientMessage>,
    mut state: ViewState,
) -> anyhow::Result<()> {
    let mut terminal = ratatui::init();

    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let _ = ratatui::restore();
        original_hook(panic_info);
    }));

    let mut event_stream = EventStream::new();
    let mut render_tick = tokio::time::interval(Duration::from_millis(33));
    render_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let result = loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Some(event) => {
                        for msg in state.apply_client_event(event) {
                            send_command(&commands, &mut state, msg);
                        }
                    }
                    None => break Ok(()),
                }
            }
            maybe_event = event_stream.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key_event))) => {
                        match input::handle_key(key_event, &mut state) {
                            Some(Action::Quit) => break Ok(()),
                            Some(Action::Send(msg)) => send_command(&commands, &mut state, msg),
                            None => {}
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(anyhow::Error::from(e).context("terminal input failed")),
                    None => break Ok(()),
                }
            }
            _ = render_tick.tick() => {
                if let Err(e) = terminal.draw(|frame| render_frame(frame, &state)) {
                    break Err(anyhow::Error::from(e).context("failed to draw frame"));
                }
            }
        }
    };

    state.view.deactivate();
    ratatui::restore();
    result
}

/// Hand a message to the connection task. A full queue means the connection
/// is wedged; an in-flight pick is failed so the user can retry.
fn send_command(commands: &mpsc::Sender<ClientMessage>, state: &mut ViewState, msg: ClientMessage) {
    if let Err(e) = commands.try_send(msg) {
        warn!("could not queue message for the server: {e}");
        if state.view.pick_in_flight() {
            state.view.finish_pick(Err(PickError::Transient {
                message: "connection busy".into(),
            }));
        } else {
            state
                .view
                .set_notice(NoticeKind::Error, "Could not reach the server");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test_support {
    use valdraft_core::player::PlayerRecord;

    pub fn players() -> Vec<PlayerRecord> {
        vec![
            PlayerRecord::new("Derke", "FNC", vec!["raze".into(), "neon".into()], 1.2, 5_000_000.0),
            PlayerRecord::new("Boaster", "FNC", vec!["astra".into()], 0.9, 5_000_000.0),
            PlayerRecord::new("Chronicle", "FNC", vec!["viper".into()], 1.05, 5_000_000.0),
            PlayerRecord::without_stats("Alfajer", "FNC"),
        ]
    }
}
