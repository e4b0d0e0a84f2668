// main.rs
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use ws_device_relay::{
    config::Settings,
    controller::Fleet,
    events::EventBus,
    metrics,
    relay::{self, RelayState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::new()
        .map_err(|e| anyhow::anyhow!("Failed to load config: {}", e))?;

    if settings.metrics.enabled {
        metrics::setup_metrics(settings.metrics.port)?;
    }

    let relay_task = if settings.relay.enabled {
        let listener = tokio::net::TcpListener::bind(&settings.relay.address)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind address: {}", e))?;
        tracing::info!("Relay started on {}", settings.relay.address);
        let state = Arc::new(RelayState::from_settings(&settings.relay));
        Some(tokio::spawn(relay::serve(listener, state)))
    } else {
        None
    };

    let fleet = Fleet::from_settings(&settings, Arc::new(EventBus::new()))?;
    tracing::info!("Starting {} device(s)", fleet.len());
    fleet.init_all().await;

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to listen for shutdown: {}", e))?;
    tracing::info!("Shutting down");

    fleet.teardown_all().await;
    if let Some(task) = relay_task {
        task.abort();
    }

    Ok(())
}
