// connection/receive.rs
use super::{StateReporter, WsSink, WsSource};
use crate::{commands::MessageDispatcher, models::ConnectionState};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Decodes at most `limit` bytes of a text frame and trims it. Anything past
/// the limit is dropped.
pub fn decode_payload(bytes: &[u8], limit: usize) -> String {
    let window = &bytes[..bytes.len().min(limit)];
    String::from_utf8_lossy(window).trim().to_string()
}

/// Sole reader of an open connection.
pub(crate) struct ReceiveLoop {
    pub(crate) client_id: String,
    pub(crate) state: StateReporter,
    pub(crate) writer: Arc<Mutex<Option<WsSink>>>,
    pub(crate) dispatcher: Arc<MessageDispatcher>,
    pub(crate) token: CancellationToken,
    pub(crate) max_payload_bytes: usize,
}

impl ReceiveLoop {
    /// Runs until the connection leaves `Open`. Hands the read half back when
    /// stopped by cancellation so the caller can finish the close handshake.
    pub(crate) async fn run(self, mut source: WsSource) -> Option<WsSource> {
        while self.state.get() == ConnectionState::Open {
            let frame = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!(client_id = %self.client_id, "receive loop cancelled");
                    return Some(source);
                }
                frame = source.next() => frame,
            };

            match frame {
                Some(Ok(Message::Text(text))) => {
                    metrics::counter!("device_frames_received_total").increment(1);
                    if text.len() > self.max_payload_bytes {
                        warn!(
                            client_id = %self.client_id,
                            len = text.len(),
                            limit = self.max_payload_bytes,
                            "payload truncated"
                        );
                    }
                    let body = decode_payload(text.as_bytes(), self.max_payload_bytes);
                    self.dispatcher.dispatch(&body);
                }
                Some(Ok(Message::Close(frame))) => {
                    if let Some(mut sink) = self.writer.lock().await.take() {
                        // flushes the queued close reply
                        if let Err(e) = sink.close().await {
                            debug!(client_id = %self.client_id, error = %e, "close reply not flushed");
                        }
                    }
                    self.state.set(ConnectionState::Closed);
                    info!(client_id = %self.client_id, ?frame, "server closed the connection");
                    return None;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(client_id = %self.client_id, error = %e, "receive failed; connection lost");
                    self.writer.lock().await.take();
                    self.state.set(ConnectionState::Faulted);
                    return None;
                }
                None => {
                    warn!(client_id = %self.client_id, "stream ended without a close frame");
                    self.writer.lock().await.take();
                    self.state.set(ConnectionState::Faulted);
                    return None;
                }
            }
        }
        Some(source)
    }
}
