//! The per-connection writer and the close-with-reason convention.

use axum::extract::ws::{CloseFrame, Message as WsMessage, WebSocket, close_code};
use bytes::Bytes;
use futures_util::SinkExt;
use futures_util::stream::SplitSink;
use tokio::sync::mpsc;

/// First byte of a queued payload that turns the rest into a close reason
/// instead of a frame.
pub const CLOSE_DIRECTIVE: u8 = 0;

/// Builds a close-with-reason directive for a session queue.
pub fn close_payload(reason: &str) -> Bytes {
    let mut payload = Vec::with_capacity(1 + reason.len());
    payload.push(CLOSE_DIRECTIVE);
    payload.extend_from_slice(reason.as_bytes());
    payload.into()
}

/// Drains one session queue onto the socket. A payload starting with a NUL
/// byte closes the WebSocket with the policy violation code and the
/// remaining bytes as the reason, then the task ends. Everything else goes
/// out as one binary frame; the first write error ends the task as well.
pub async fn payload_sender(mut sink: SplitSink<WebSocket, WsMessage>, mut queue: mpsc::Receiver<Bytes>) {
    while let Some(payload) = queue.recv().await {
        if payload.first() == Some(&CLOSE_DIRECTIVE) {
            let reason = String::from_utf8_lossy(&payload[1..]).into_owned();
            let frame = CloseFrame {
                code: close_code::POLICY,
                reason: reason.into(),
            };
            if let Err(error) = sink.send(WsMessage::Close(Some(frame))).await {
                tracing::debug!(?error, "error while closing the socket");
            }
            return;
        }
        if let Err(error) = sink.send(WsMessage::Binary(payload)).await {
            tracing::debug!(?error, "error while writing a frame");
            return;
        }
    }
}
