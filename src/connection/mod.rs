// connection/mod.rs
mod receive;

pub use receive::decode_payload;

use crate::{
    cancellation::CancellationController,
    commands::MessageDispatcher,
    error::ClientError,
    events::EventBus,
    models::ConnectionState,
    utils,
};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use receive::ReceiveLoop;
use std::{sync::Arc, time::Duration};
use tokio::{
    net::TcpStream,
    sync::{Mutex, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self, Message,
        client::IntoClientRequest,
        handshake::client::Request,
        http::HeaderValue,
        protocol::{CloseFrame, frame::coding::CloseCode},
    },
};
use tracing::{debug, error, info, warn};

pub const AUTH_HEADER: &str = "x-auth-token";
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 1024;
pub const DEFAULT_CLOSE_REASON: &str = "client shutting down";
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
pub(crate) type WsSource = SplitStream<WsStream>;

#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    pub client_id: String,
    pub endpoint: String,
    pub auth_token: String,
    pub max_payload_bytes: usize,
    pub close_reason: String,
    /// Upper bound on waiting for the peer's close reply in `disconnect`.
    pub close_timeout: Duration,
}

impl ConnectionOptions {
    pub fn new(scheme: &str, host: &str, client_id: &str, auth_token: &str) -> Self {
        let client_id = client_id.trim().to_string();
        Self {
            endpoint: utils::endpoint_url(scheme, host, &client_id),
            client_id,
            auth_token: auth_token.trim().to_string(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            close_reason: DEFAULT_CLOSE_REASON.to_string(),
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }

    pub fn with_max_payload_bytes(mut self, max_payload_bytes: usize) -> Self {
        self.max_payload_bytes = max_payload_bytes;
        self
    }

    pub fn with_close_reason(mut self, reason: impl Into<String>) -> Self {
        self.close_reason = reason.into();
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Handshake request, with the auth header only when a token is set.
    pub fn request(&self) -> Result<Request, ClientError> {
        let mut request = self
            .endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;

        if !self.auth_token.is_empty() {
            let value = HeaderValue::from_str(&self.auth_token)
                .map_err(|e| ClientError::InvalidRequest(e.to_string()))?;
            request.headers_mut().insert(AUTH_HEADER, value);
        }
        Ok(request)
    }
}

/// Shared view of the connection state. Publishes every change.
#[derive(Clone)]
pub(crate) struct StateReporter {
    client_id: Arc<str>,
    tx: Arc<watch::Sender<ConnectionState>>,
    events: Option<Arc<EventBus>>,
}

impl StateReporter {
    fn new(client_id: &str, events: Option<Arc<EventBus>>) -> Self {
        let (tx, _) = watch::channel(ConnectionState::Idle);
        Self {
            client_id: Arc::from(client_id),
            tx: Arc::new(tx),
            events,
        }
    }

    pub(crate) fn get(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    pub(crate) fn set(&self, state: ConnectionState) {
        let previous = self.tx.send_replace(state);
        if previous != state {
            debug!(client_id = %self.client_id, %previous, %state, "connection state changed");
            if let Some(events) = &self.events {
                events.connection_state(&self.client_id, state);
            }
        }
    }
}

/// Owns the single outbound connection of one device.
pub struct ConnectionManager {
    options: ConnectionOptions,
    dispatcher: Arc<MessageDispatcher>,
    state: StateReporter,
    writer: Arc<Mutex<Option<WsSink>>>,
    cancellation: CancellationController,
    receive_task: Mutex<Option<JoinHandle<Option<WsSource>>>>,
    lifecycle: Mutex<()>,
}

impl ConnectionManager {
    pub fn new(options: ConnectionOptions, dispatcher: Arc<MessageDispatcher>) -> Self {
        Self::build(options, dispatcher, None)
    }

    pub fn with_events(
        options: ConnectionOptions,
        dispatcher: Arc<MessageDispatcher>,
        events: Arc<EventBus>,
    ) -> Self {
        Self::build(options, dispatcher, Some(events))
    }

    fn build(
        options: ConnectionOptions,
        dispatcher: Arc<MessageDispatcher>,
        events: Option<Arc<EventBus>>,
    ) -> Self {
        Self {
            state: StateReporter::new(&options.client_id, events),
            options,
            dispatcher,
            writer: Arc::new(Mutex::new(None)),
            cancellation: CancellationController::new(),
            receive_task: Mutex::new(None),
            lifecycle: Mutex::new(()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.options.client_id
    }

    pub fn endpoint(&self) -> &str {
        &self.options.endpoint
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.tx.subscribe()
    }

    pub fn cancellation(&self) -> &CancellationController {
        &self.cancellation
    }

    /// Opens the connection and starts the receive loop.
    ///
    /// Returns `AlreadyConnected` without touching the socket when the
    /// connection is already open. Failures leave the state `Closed`.
    pub async fn connect(&self) -> Result<(), ClientError> {
        let _lifecycle = self.lifecycle.lock().await;
        let client_id = self.client_id();

        if self.state.get() == ConnectionState::Open {
            warn!(%client_id, "already connected");
            return Err(ClientError::AlreadyConnected);
        }

        // A receive task left behind here was ended by the peer; its token
        // belongs to that lifetime and is retired with it.
        if let Some(previous) = self.receive_task.lock().await.take() {
            previous.abort();
            self.cancellation.cancel();
            self.cancellation.reissue();
        }

        let token = self.cancellation.token();
        if token.is_cancelled() {
            error!(%client_id, "refusing to connect with a cancelled token");
            return Err(ClientError::StaleToken);
        }

        let request = match self.options.request() {
            Ok(request) => request,
            Err(e) => {
                error!(%client_id, error = %e, "connection error");
                self.state.set(ConnectionState::Closed);
                return Err(e);
            }
        };

        self.state.set(ConnectionState::Connecting);
        let handshake = tokio::select! {
            _ = token.cancelled() => {
                info!(%client_id, "connect cancelled");
                self.state.set(ConnectionState::Closed);
                return Err(ClientError::Cancelled);
            }
            result = connect_async(request) => result,
        };

        let stream = match handshake {
            Ok((stream, _response)) => stream,
            Err(source) => {
                metrics::counter!("device_connect_failures_total").increment(1);
                error!(%client_id, endpoint = %self.options.endpoint, error = %source, "connection error");
                self.state.set(ConnectionState::Closed);
                return Err(ClientError::Connection {
                    endpoint: self.options.endpoint.clone(),
                    source,
                });
            }
        };

        let (sink, source) = stream.split();
        *self.writer.lock().await = Some(sink);
        self.state.set(ConnectionState::Open);
        info!(%client_id, endpoint = %self.options.endpoint, "connected");

        let receive = ReceiveLoop {
            client_id: client_id.to_string(),
            state: self.state.clone(),
            writer: Arc::clone(&self.writer),
            dispatcher: Arc::clone(&self.dispatcher),
            token,
            max_payload_bytes: self.options.max_payload_bytes,
        };
        let handle = tokio::spawn(receive.run(source));
        *self.receive_task.lock().await = Some(handle);
        Ok(())
    }

    /// Writes `payload` as one text frame.
    ///
    /// Concurrent callers are serialized on the write half.
    pub async fn send(&self, payload: &str) -> Result<(), ClientError> {
        let client_id = self.client_id();
        if self.state.get() != ConnectionState::Open {
            warn!(%client_id, "connection is not open; message not sent");
            return Err(ClientError::NotConnected);
        }

        let token = self.cancellation.token();
        let mut writer = self.writer.lock().await;
        let Some(sink) = writer.as_mut() else {
            warn!(%client_id, "connection is not open; message not sent");
            return Err(ClientError::NotConnected);
        };

        let result = tokio::select! {
            _ = token.cancelled() => return Err(ClientError::Cancelled),
            result = sink.send(Message::text(payload.to_owned())) => result,
        };

        match result {
            Ok(()) => {
                debug!(%client_id, %payload, "message sent");
                Ok(())
            }
            Err(e) => {
                error!(%client_id, error = %e, "send failed");
                Err(ClientError::Transport(e))
            }
        }
    }

    /// Closes the connection with a normal-closure frame and waits for the
    /// receive loop to stop. Does nothing unless the connection is open.
    pub async fn disconnect(&self) {
        let client_id = self.client_id();
        if self.state.get() == ConnectionState::Connecting {
            self.cancellation.cancel();
        }

        let _lifecycle = self.lifecycle.lock().await;
        let state = self.state.get();
        if state != ConnectionState::Open {
            if self.cancellation.is_cancelled() {
                self.cancellation.reissue();
            }
            debug!(%client_id, %state, "disconnect skipped");
            return;
        }

        self.state.set(ConnectionState::Closing);
        self.cancellation.cancel();

        let source = match self.receive_task.lock().await.take() {
            Some(handle) => handle.await.ok().flatten(),
            None => None,
        };
        let sink = self.writer.lock().await.take();
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: self.options.close_reason.clone().into(),
        };

        let closed = match (sink, source) {
            (Some(sink), Some(source)) => match sink.reunite(source) {
                Ok(stream) => close_gracefully(stream, frame, self.options.close_timeout).await,
                Err(_) => Ok(()),
            },
            (Some(mut sink), None) => sink.send(Message::Close(Some(frame))).await,
            _ => Ok(()),
        };
        if let Err(e) = closed {
            warn!(%client_id, error = %e, "close handshake failed");
        }

        self.state.set(ConnectionState::Closed);
        self.cancellation.reissue();
        info!(%client_id, "WebSocket connection closed");
    }
}

async fn close_gracefully(
    mut stream: WsStream,
    frame: CloseFrame,
    timeout: Duration,
) -> Result<(), tungstenite::Error> {
    stream.close(Some(frame)).await?;
    let drain = async {
        while let Some(frame) = stream.next().await {
            match frame {
                Ok(Message::Close(_)) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };
    if tokio::time::timeout(timeout, drain).await.is_err() {
        warn!("peer did not acknowledge close in time");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::logged_handler;
    use crate::models::DeviceKind;

    fn manager(options: ConnectionOptions) -> ConnectionManager {
        let handler = logged_handler(DeviceKind::AirConditioner, &options.client_id);
        let dispatcher = Arc::new(MessageDispatcher::new(options.client_id.clone(), handler));
        ConnectionManager::new(options, dispatcher)
    }

    #[test]
    fn options_trim_and_build_endpoint() {
        let options = ConnectionOptions::new("wss", " relay.example.com ", " ac_1 ", "  ");
        assert_eq!(options.endpoint, "wss://relay.example.com/ws/ac_1");
        assert_eq!(options.client_id, "ac_1");
        assert!(options.auth_token.is_empty());
    }

    #[test]
    fn auth_header_only_when_token_present() {
        let without = ConnectionOptions::new("wss", "host", "ac_1", "").request().unwrap();
        assert!(without.headers().get(AUTH_HEADER).is_none());

        let with = ConnectionOptions::new("wss", "host", "ac_1", " abc ").request().unwrap();
        assert_eq!(with.headers().get("X-Auth-Token").unwrap(), "abc");
    }

    #[tokio::test]
    async fn send_before_connect_is_not_connected() {
        let manager = manager(ConnectionOptions::new("ws", "127.0.0.1:9", "ac_1", ""));
        let result = manager.send("1").await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
        assert_eq!(manager.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn disconnect_without_connection_is_noop() {
        let manager = manager(ConnectionOptions::new("ws", "127.0.0.1:9", "ac_1", ""));
        manager.disconnect().await;
        manager.disconnect().await;
        assert_eq!(manager.state(), ConnectionState::Idle);
        assert_eq!(manager.cancellation().generation(), 0);
    }

    #[tokio::test]
    async fn refused_handshake_leaves_connection_closed() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let manager = manager(ConnectionOptions::new("ws", &addr.to_string(), "ac_1", ""));
        let result = manager.connect().await;
        assert!(matches!(result, Err(ClientError::Connection { .. })));
        assert_eq!(manager.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn cancelled_token_is_rejected() {
        let manager = manager(ConnectionOptions::new("ws", "127.0.0.1:9", "ac_1", ""));
        manager.cancellation().cancel();
        assert!(matches!(manager.connect().await, Err(ClientError::StaleToken)));
    }
}
