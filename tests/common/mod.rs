#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use ws_device_relay::devices::{AudioOutput, StateHandler};
use ws_device_relay::{ConnectionState, ConnectionManager, DeviceKind, DeviceState, Transition};

pub const TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Connected { path: String, token: Option<String> },
    Text(String),
    Closed(Option<(u16, String)>),
}

/// Scripted WebSocket peer standing in for the relay.
pub struct TestServer {
    pub addr: SocketAddr,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    outbound: Arc<Mutex<Vec<mpsc::UnboundedSender<Message>>>>,
    accepted: Arc<AtomicUsize>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (events_tx, events) = mpsc::unbounded_channel();
        let outbound = Arc::new(Mutex::new(Vec::new()));
        let accepted = Arc::new(AtomicUsize::new(0));

        let outbound_registry = Arc::clone(&outbound);
        let accepted_count = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let events_tx = events_tx.clone();
                let (tx, rx) = mpsc::unbounded_channel();
                outbound_registry.lock().unwrap().push(tx);
                accepted_count.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(serve_connection(stream, events_tx, rx));
            }
        });

        Self {
            addr,
            events,
            outbound,
            accepted,
        }
    }

    pub fn host(&self) -> String {
        self.addr.to_string()
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    /// Sends `message` on the most recent connection.
    pub fn push(&self, message: Message) {
        let outbound = self.outbound.lock().unwrap();
        outbound.last().unwrap().send(message).unwrap();
    }

    pub fn push_text(&self, body: &str) {
        self.push(Message::text(body.to_owned()));
    }

    pub async fn next_event(&mut self) -> ServerEvent {
        tokio::time::timeout(TIMEOUT, self.events.recv())
            .await
            .expect("timed out waiting for server event")
            .expect("server event channel closed")
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    events: mpsc::UnboundedSender<ServerEvent>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    let handshake_events = events.clone();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let token = request
            .headers()
            .get("x-auth-token")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        let _ = handshake_events.send(ServerEvent::Connected {
            path: request.uri().path().to_string(),
            token,
        });
        Ok(response)
    };
    let Ok(ws) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let (mut sink, mut source) = ws.split();

    loop {
        tokio::select! {
            Some(message) = outbound.recv() => {
                if sink.send(message).await.is_err() {
                    break;
                }
            }
            frame = source.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let _ = events.send(ServerEvent::Text(text.to_string()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let frame = frame.map(|frame| (u16::from(frame.code), frame.reason.to_string()));
                    let _ = events.send(ServerEvent::Closed(frame));
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => break,
            },
        }
    }
}

/// Peer that completes every handshake and then drops the socket without a
/// close frame. Returns its host.
pub async fn dropping_peer() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            if let Ok(ws) = tokio_tungstenite::accept_async(stream).await {
                drop(ws);
            }
        }
    });
    host
}

/// Peer that accepts TCP connections but never answers the handshake.
pub async fn silent_peer() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    host
}

/// Audio actuator that records every call.
#[derive(Default)]
pub struct RecordingAudio {
    calls: Mutex<Vec<String>>,
}

impl RecordingAudio {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_muted(&self) -> Option<bool> {
        self.calls()
            .iter()
            .rev()
            .find_map(|call| call.strip_prefix("muted=").map(|value| value == "true"))
    }
}

impl AudioOutput for RecordingAudio {
    fn start_looping(&self) {
        self.calls.lock().unwrap().push("loop".into());
    }

    fn set_muted(&self, muted: bool) {
        self.calls.lock().unwrap().push(format!("muted={muted}"));
    }
}

/// Wraps a handler and records every `apply` it receives.
pub struct ApplyRecorder {
    inner: Arc<dyn StateHandler>,
    applied: Mutex<Vec<Transition>>,
}

impl ApplyRecorder {
    pub fn new(inner: Arc<dyn StateHandler>) -> Self {
        Self {
            inner,
            applied: Mutex::new(Vec::new()),
        }
    }

    pub fn applied(&self) -> Vec<Transition> {
        self.applied.lock().unwrap().clone()
    }
}

impl StateHandler for ApplyRecorder {
    fn kind(&self) -> DeviceKind {
        self.inner.kind()
    }

    fn init(&self) {
        self.inner.init();
    }

    fn apply(&self, transition: Transition) {
        self.applied.lock().unwrap().push(transition);
        self.inner.apply(transition);
    }

    fn state(&self) -> DeviceState {
        self.inner.state()
    }
}

pub async fn eventually<F: Fn() -> bool>(condition: F) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

pub async fn wait_for_state(manager: &ConnectionManager, target: ConnectionState) {
    let mut rx = manager.watch_state();
    tokio::time::timeout(TIMEOUT, rx.wait_for(|state| *state == target))
        .await
        .expect("timed out waiting for connection state")
        .expect("state channel closed");
}
