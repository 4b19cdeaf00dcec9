// Connection task: keeps one WebSocket session to the draft server alive.
//
// Each successful connect starts a new epoch. The task announces itself with
// HELLO, forwards every server message tagged with the epoch, sends PING on
// a fixed interval and treats a silent connection as lost. After a loss it
// reconnects with exponential backoff until the UI drops its command sender.

use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use valdraft_core::protocol::{ClientMessage, ServerMessage};

use crate::ClientEvent;

/// How often to PING the server.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// A connection that has delivered nothing for this long is considered dead.
pub const SILENCE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub url: String,
    pub user: Option<String>,
    pub heartbeat: Duration,
    pub silence_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ClientOptions {
    pub fn new(url: impl Into<String>, user: Option<String>) -> Self {
        ClientOptions {
            url: url.into(),
            user,
            heartbeat: HEARTBEAT_INTERVAL,
            silence_timeout: SILENCE_TIMEOUT,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq)]
enum SessionEnd {
    /// The UI went away; stop for good.
    Quit,
    Lost(String),
}

/// Run the connection task until `commands` is closed or `events` has no
/// receiver.
pub async fn run(
    options: ClientOptions,
    events: mpsc::Sender<ClientEvent>,
    mut commands: mpsc::Receiver<ClientMessage>,
) {
    let mut epoch: u64 = 0;
    let mut backoff = options.initial_backoff;

    loop {
        epoch += 1;
        debug!(epoch, url = %options.url, "connecting to draft server");

        let reason = match tokio_tungstenite::connect_async(options.url.as_str()).await {
            Ok((ws, _)) => {
                backoff = options.initial_backoff;
                if events.send(ClientEvent::Connected { epoch }).await.is_err() {
                    return;
                }
                let (sink, stream) = ws.split();
                match drive_session(sink, stream, epoch, &options, &events, &mut commands).await {
                    SessionEnd::Quit => {
                        info!(epoch, "connection task stopping");
                        return;
                    }
                    SessionEnd::Lost(reason) => reason,
                }
            }
            Err(e) => format!("connect failed: {e}"),
        };

        warn!(epoch, "draft server connection lost: {reason}");
        if events
            .send(ClientEvent::Disconnected { epoch, reason })
            .await
            .is_err()
        {
            return;
        }

        // Wait out the backoff. Commands arriving meanwhile have no connection
        // to go to and are dropped.
        let wake = tokio::time::sleep(backoff);
        tokio::pin!(wake);
        loop {
            tokio::select! {
                _ = &mut wake => break,
                cmd = commands.recv() => match cmd {
                    Some(msg) => debug!(?msg, "dropping command while disconnected"),
                    None => return,
                },
            }
        }
        backoff = (backoff * 2).min(options.max_backoff);
    }
}

/// Pump one connected session until it ends.
async fn drive_session<Si, St>(
    mut sink: Si,
    mut stream: St,
    epoch: u64,
    options: &ClientOptions,
    events: &mpsc::Sender<ClientEvent>,
    commands: &mut mpsc::Receiver<ClientMessage>,
) -> SessionEnd
where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin,
    St: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let hello = ClientMessage::Hello {
        user: options.user.clone(),
    };
    if let Err(reason) = send(&mut sink, &hello).await {
        return SessionEnd::Lost(reason);
    }

    let mut last_seen = Instant::now();
    let mut heartbeat = tokio::time::interval(options.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately.
    heartbeat.tick().await;

    loop {
        tokio::select! {
            frame = stream.next() => {
                last_seen = Instant::now();
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        match ServerMessage::parse(text.as_str()) {
                            Ok(message) => {
                                if events.send(ClientEvent::Server { epoch, message }).await.is_err() {
                                    return SessionEnd::Quit;
                                }
                            }
                            Err(e) => warn!(epoch, "unreadable server message: {e}"),
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        return SessionEnd::Lost("server closed the connection".into());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Lost(format!("socket error: {e}")),
                    None => return SessionEnd::Lost("connection ended".into()),
                }
            }

            cmd = commands.recv() => {
                match cmd {
                    Some(msg) => {
                        if let Err(reason) = send(&mut sink, &msg).await {
                            return SessionEnd::Lost(reason);
                        }
                    }
                    None => {
                        let _ = sink.close().await;
                        return SessionEnd::Quit;
                    }
                }
            }

            _ = heartbeat.tick() => {
                if last_seen.elapsed() >= options.silence_timeout {
                    return SessionEnd::Lost(format!(
                        "no message from server for {}s",
                        options.silence_timeout.as_secs_f32()
                    ));
                }
                if let Err(reason) = send(&mut sink, &ClientMessage::Ping).await {
                    return SessionEnd::Lost(reason);
                }
            }
        }
    }
}

async fn send<Si>(sink: &mut Si, msg: &ClientMessage) -> Result<(), String>
where
    Si: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = msg
        .to_json()
        .map_err(|e| format!("failed to encode message: {e}"))?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| format!("send failed: {e}"))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn fast_options(url: String) -> ClientOptions {
        ClientOptions {
            url,
            user: Some("tester".into()),
            heartbeat: Duration::from_millis(50),
            silence_timeout: Duration::from_millis(200),
            initial_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(100),
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for client event")
            .expect("client task ended")
    }

    async fn recv_client_message<S>(ws: &mut S) -> ClientMessage
    where
        S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
    {
        loop {
            match ws.next().await.unwrap().unwrap() {
                Message::Text(text) => return ClientMessage::parse(text.as_str()).unwrap(),
                _ => continue,
            }
        }
    }

    #[tokio::test]
    async fn hello_then_messages_are_forwarded_with_epoch() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            let hello = recv_client_message(&mut ws).await;
            assert_eq!(
                hello,
                ClientMessage::Hello {
                    user: Some("tester".into())
                }
            );
            ws.send(Message::Text(ServerMessage::Pong.to_json().unwrap().into()))
                .await
                .unwrap();
            // An outgoing command from the UI arrives here.
            let cmd = recv_client_message(&mut ws).await;
            assert!(matches!(cmd, ClientMessage::ListPicked | ClientMessage::Ping));
            ws
        });

        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);
        let client = tokio::spawn(run(fast_options(url), event_tx, cmd_rx));

        assert_eq!(next_event(&mut event_rx).await, ClientEvent::Connected { epoch: 1 });
        assert_eq!(
            next_event(&mut event_rx).await,
            ClientEvent::Server {
                epoch: 1,
                message: ServerMessage::Pong
            }
        );

        cmd_tx.send(ClientMessage::ListPicked).await.unwrap();
        let _ws = server.await.unwrap();

        drop(cmd_tx);
        tokio::time::timeout(Duration::from_secs(5), client)
            .await
            .expect("client did not stop after commands closed")
            .unwrap();
    }

    #[tokio::test]
    async fn silent_server_is_reported_and_reconnected_with_new_epoch() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        // Accepts connections and never says anything.
        let server = tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (tcp, _) = listener.accept().await.unwrap();
                if let Ok(ws) = tokio_tungstenite::accept_async(tcp).await {
                    held.push(ws);
                }
            }
        });

        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (_cmd_tx, cmd_rx) = mpsc::channel(16);
        let client = tokio::spawn(run(fast_options(url), event_tx, cmd_rx));

        assert_eq!(next_event(&mut event_rx).await, ClientEvent::Connected { epoch: 1 });
        match next_event(&mut event_rx).await {
            ClientEvent::Disconnected { epoch, reason } => {
                assert_eq!(epoch, 1);
                assert!(reason.contains("no message"), "unexpected reason: {reason}");
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert_eq!(next_event(&mut event_rx).await, ClientEvent::Connected { epoch: 2 });

        client.abort();
        server.abort();
    }

    #[tokio::test]
    async fn refused_connection_is_reported_and_retried() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (_cmd_tx, cmd_rx) = mpsc::channel(16);
        let client = tokio::spawn(run(
            fast_options(format!("ws://127.0.0.1:{port}")),
            event_tx,
            cmd_rx,
        ));

        for expected_epoch in 1..=2 {
            match next_event(&mut event_rx).await {
                ClientEvent::Disconnected { epoch, reason } => {
                    assert_eq!(epoch, expected_epoch);
                    assert!(reason.starts_with("connect failed"));
                }
                other => panic!("expected Disconnected, got {other:?}"),
            }
        }
        client.abort();
    }

    #[tokio::test]
    async fn server_close_is_a_lost_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            recv_client_message(&mut ws).await;
            ws.close(None).await.unwrap();
        });

        let (event_tx, mut event_rx) = mpsc::channel(16);
        let (_cmd_tx, cmd_rx) = mpsc::channel(16);
        let client = tokio::spawn(run(fast_options(url), event_tx, cmd_rx));

        assert_eq!(next_event(&mut event_rx).await, ClientEvent::Connected { epoch: 1 });
        assert!(matches!(
            next_event(&mut event_rx).await,
            ClientEvent::Disconnected { epoch: 1, .. }
        ));

        client.abort();
        server.abort();
    }
}
