//! The WebSocket endpoint: upgrade, per-session reader, engine hand-off.
//!
//! Each accepted socket gets two cooperative tasks. The reader below decodes
//! envelopes and pushes them into the engine mailbox; the writer
//! ([`crate::transport::payload_sender`]) drains the session's bounded queue.
//! Neither task touches game state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{HeaderValue, header};
use axum::response::IntoResponse;
use futures_util::StreamExt;
use tokio::sync::mpsc;

use crate::engine::{ConnId, Event};
use crate::transport::payload_sender;

/// Identity advertised on the upgrade response.
const SERVER_IDENT: &str = concat!("preferans-server/", env!("CARGO_PKG_VERSION"));

/// Shared between the axum handlers and the engine task.
pub struct AppState {
    events: mpsc::Sender<Event>,
    next_conn: AtomicU64,
}

impl AppState {
    pub fn new(events: mpsc::Sender<Event>) -> AppState {
        AppState {
            events,
            next_conn: AtomicU64::new(1),
        }
    }

    fn next_conn_id(&self) -> ConnId {
        self.next_conn.fetch_add(1, Ordering::Relaxed)
    }
}

/// Upgrades the request and stamps the server identity header.
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let mut response = ws.on_upgrade(move |socket| websocket(socket, state));
    response
        .headers_mut()
        .insert(header::SERVER, HeaderValue::from_static(SERVER_IDENT));
    response
}

/// One session from upgrade to transport loss. Registers the send queue
/// with the engine, pumps decoded envelopes into the mailbox and reports
/// the close so the reconnect grace can start.
async fn websocket(socket: WebSocket, state: Arc<AppState>) {
    let (sink, mut stream) = socket.split();
    let conn = state.next_conn_id();
    let (tx, queue) = mpsc::channel(protocol::SESSION_SEND_BUFFER);
    if state.events.send(Event::Opened { conn, tx }).await.is_err() {
        // the engine is gone, shutdown is under way
        return;
    }
    tokio::spawn(payload_sender(sink, queue));

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(WsMessage::Binary(bytes)) => match protocol::decode_frame(&bytes) {
                Ok(message) => {
                    if state.events.send(Event::Inbound { conn, message }).await.is_err() {
                        break;
                    }
                }
                Err(error) => tracing::warn!(?error, conn, "dropping malformed frame"),
            },
            Ok(WsMessage::Close(_)) => break,
            // pings and pongs are answered by axum itself
            Ok(_) => {}
            Err(error) => {
                tracing::debug!(?error, conn, "read error");
                break;
            }
        }
    }
    let _ = state.events.send(Event::Closed { conn }).await;
}
