// utils.rs
use crate::relay::RelayState;
use tracing::info;
use uuid::Uuid;

/// `{scheme}://{host}/ws/{client_id}` with surrounding whitespace removed.
pub fn endpoint_url(scheme: &str, host: &str, client_id: &str) -> String {
    format!(
        "{}://{}/ws/{}",
        scheme.trim(),
        host.trim().trim_end_matches('/'),
        client_id.trim()
    )
}

/// Drops the registration of `client_id` if it still belongs to `session_id`.
pub fn cleanup_client_connection(client_id: &str, session_id: Uuid, state: &RelayState) {
    let removed = state
        .clients
        .remove_if(client_id, |_, entry| entry.session_id == session_id);
    if removed.is_some() {
        metrics::gauge!("relay_active_connections").set(state.clients.len() as f64);
        info!("Client disconnected: {}", client_id);
    }
}
