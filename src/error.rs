// error.rs
use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures of the device connection core.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("handshake with {endpoint} failed: {source}")]
    Connection {
        endpoint: String,
        #[source]
        source: tungstenite::Error,
    },
    #[error("invalid connection request: {0}")]
    InvalidRequest(String),
    #[error("already connected")]
    AlreadyConnected,
    #[error("not connected")]
    NotConnected,
    #[error("transport error: {0}")]
    Transport(#[from] tungstenite::Error),
    #[error("operation cancelled")]
    Cancelled,
    #[error("cancellation token was already used by a previous connection")]
    StaleToken,
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Device {0} is already registered")]
    DuplicateDevice(String),
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}
