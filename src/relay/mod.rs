// relay/mod.rs
pub mod auth;
pub mod handlers;

use crate::{
    config::RelaySettings,
    docs,
    error::AppError,
    models::{ConnectedClient, RelayCommand},
};
use auth::{Authenticator, KeyAuthenticator};
use axum::{Router, routing::get};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::{
    net::TcpListener,
    sync::mpsc::{self, error::TrySendError},
};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;
use validator::Validate;

pub struct ClientEntry {
    pub session_id: Uuid,
    pub tx: mpsc::Sender<String>,
    pub connected_at: DateTime<Utc>,
}

/// Registry of attached clients, keyed by client id.
pub struct RelayState {
    pub clients: DashMap<String, ClientEntry>,
    pub controller_id: String,
    pub auth: Arc<dyn Authenticator>,
}

impl RelayState {
    pub fn new(controller_id: impl Into<String>, auth: Arc<dyn Authenticator>) -> Self {
        Self {
            clients: DashMap::new(),
            controller_id: controller_id.into(),
            auth,
        }
    }

    pub fn from_settings(settings: &RelaySettings) -> Self {
        let auth = KeyAuthenticator::new(
            settings.controller_id.clone(),
            settings.controller_key.clone(),
            settings.client_key.clone(),
        );
        Self::new(settings.controller_id.clone(), Arc::new(auth))
    }

    /// Queues `message` for `target` without waiting. Returns false when
    /// nobody is attached under that id or its queue is full.
    pub fn deliver(&self, target: &str, message: String) -> bool {
        let tx = self.clients.get(target).map(|entry| entry.tx.clone());
        let Some(tx) = tx else {
            debug!("No client connected as {}; message dropped", target);
            return false;
        };
        match tx.try_send(message) {
            Ok(()) => {
                metrics::counter!("relay_messages_routed_total").increment(1);
                true
            }
            Err(TrySendError::Full(message)) => {
                metrics::counter!("relay_messages_dropped_total").increment(1);
                warn!("Queue for {} is full; dropped: {}", target, message);
                false
            }
            Err(TrySendError::Closed(_)) => {
                debug!("Client {} is going away; message dropped", target);
                false
            }
        }
    }

    /// Attached clients, oldest first.
    pub fn connected_clients(&self) -> Vec<ConnectedClient> {
        let mut clients: Vec<ConnectedClient> = self
            .clients
            .iter()
            .map(|entry| ConnectedClient {
                client_id: entry.key().clone(),
                connected_at: entry.connected_at,
            })
            .collect();
        clients.sort_by_key(|client| client.connected_at);
        clients
    }
}

/// Parses a controller frame of the form `{"target": .., "message": ..}`.
pub fn parse_command(text: &str) -> Result<RelayCommand, AppError> {
    let command: RelayCommand = serde_json::from_str(text)?;
    command
        .validate()
        .map_err(|e| AppError::Validation(e.to_string()))?;
    Ok(command)
}

pub fn router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/", get(handlers::root))
        .route("/stats", get(handlers::stats))
        .route("/ws/{client_id}", get(handlers::handle_ws_upgrade))
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", docs::ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn serve(listener: TcpListener, state: Arc<RelayState>) -> Result<(), AppError> {
    axum::serve(listener, router(state))
        .await
        .map_err(|e| anyhow::anyhow!("Relay error: {}", e))?;
    Ok(())
}
