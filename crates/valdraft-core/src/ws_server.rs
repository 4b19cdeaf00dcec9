// WebSocket transport for draft clients.
//
// Accepts any number of connections. Each connection is assigned an id, gets
// its own outbound queue drained by a writer task, and reports its lifecycle
// and inbound text frames to the application over one mpsc channel.

use std::fmt::Display;

use futures_util::stream::Stream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

/// Identifies one client connection for the lifetime of the server.
pub type ConnectionId = u64;

/// Frames queued per connection before `send` starts waiting.
pub const OUTBOUND_QUEUE: usize = 64;

/// Events emitted by the WebSocket server to the application layer.
#[derive(Debug)]
pub enum WsEvent {
    /// A client completed the handshake. Text pushed into `outbound` is
    /// written to that client; dropping every clone of it closes the socket.
    Connected {
        conn_id: ConnectionId,
        addr: String,
        outbound: mpsc::Sender<String>,
    },
    /// A text frame arrived from a client (raw JSON string).
    Message { conn_id: ConnectionId, text: String },
    /// The client went away (close frame, socket error, or end of stream).
    Disconnected { conn_id: ConnectionId },
}

/// Bind the listening socket.
pub async fn bind(host: &str, port: u16) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind((host, port)).await?;
    info!("WebSocket server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept connections on `listener` forever, forwarding events through `tx`.
///
/// Each connection runs on its own task. Returns when the application side of
/// `tx` has been dropped or the listener fails.
pub async fn run(listener: TcpListener, tx: mpsc::Sender<WsEvent>) -> anyhow::Result<()> {
    let mut next_id: ConnectionId = 1;

    loop {
        let (stream, addr) = listener.accept().await?;
        if tx.is_closed() {
            break;
        }
        let conn_id = next_id;
        next_id += 1;
        info!(conn_id, "Accepted TCP connection from {addr}");

        let tx = tx.clone();
        tokio::spawn(serve_connection(stream, addr.to_string(), conn_id, tx));
    }

    Ok(())
}

async fn serve_connection(
    stream: TcpStream,
    addr: String,
    conn_id: ConnectionId,
    tx: mpsc::Sender<WsEvent>,
) {
    let ws_stream = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake failed for {addr}: {e}");
            return;
        }
    };

    let (write, read) = ws_stream.split();
    let (outbound, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE);

    if tx
        .send(WsEvent::Connected {
            conn_id,
            addr: addr.clone(),
            outbound,
        })
        .await
        .is_err()
    {
        return;
    }

    let writer = tokio::spawn(write_outbound(write, outbound_rx));
    let _ = process_message_stream(read, &tx, conn_id, &addr).await;
    writer.abort();

    let _ = tx.send(WsEvent::Disconnected { conn_id }).await;
}

/// Drain `rx` into `sink` as text frames until every sender is dropped or the
/// sink fails, then close the sink.
pub async fn write_outbound<Si>(mut sink: Si, mut rx: mpsc::Receiver<String>)
where
    Si: Sink<Message> + Unpin,
    Si::Error: Display,
{
    while let Some(text) = rx.recv().await {
        if let Err(e) = sink.send(Message::Text(text.into())).await {
            warn!("WebSocket write failed: {e}");
            return;
        }
    }
    debug!("outbound queue closed, closing socket");
    let _ = sink.close().await;
}

/// Process raw WebSocket [`Message`] items from any [`Stream`], forwarding
/// text payloads through `tx`. Returns `Err(())` if the channel is closed
/// (receiver dropped), signalling the caller to stop.
///
/// Generic over the stream so it can be tested without opening TCP ports.
pub async fn process_message_stream<St>(
    mut stream: St,
    tx: &mpsc::Sender<WsEvent>,
    conn_id: ConnectionId,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(msg_result) = stream.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                let event = WsEvent::Message {
                    conn_id,
                    text: text.to_string(),
                };
                if tx.send(event).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("Client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Binary, Ping, Pong and raw frames carry nothing for us.
            }
        }
    }
    Ok(())
}
