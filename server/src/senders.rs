//! Outbound fan-out.
//!
//! Everything goes onto the bounded per-session queues; the per-connection
//! writer tasks do the socket work. Enqueueing awaits when a queue is full,
//! which is the designed back-pressure, and a queue whose session died just
//! swallows the payload with a debug log.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::state::Table;

/// Enqueues one frame for a single session.
pub async fn send_to(tx: &mpsc::Sender<Bytes>, frame: impl Into<Bytes>) {
    if tx.send(frame.into()).await.is_err() {
        tracing::debug!("send on a closed session queue");
    }
}

/// Broadcast in seat order.
pub async fn send_to_all(table: &Table, frame: Vec<u8>) {
    let payload = Bytes::from(frame);
    for player in &table.players {
        send_to(&player.conn.tx, payload.clone()).await;
    }
}

/// Broadcast to every seat except one.
pub async fn send_to_all_except(table: &Table, excluded_id: &str, frame: Vec<u8>) {
    let payload = Bytes::from(frame);
    for player in table.players.iter().filter(|player| player.id != excluded_id) {
        send_to(&player.conn.tx, payload.clone()).await;
    }
}
