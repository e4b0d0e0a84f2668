// config/mod.rs
use crate::{
    connection::{self, ConnectionOptions},
    devices,
    models::DeviceKind,
};
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub client: ClientSettings,
    #[serde(default)]
    pub devices: Vec<DeviceSettings>,
    #[serde(default)]
    pub relay: RelaySettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub host: String,
    pub scheme: String,
    pub max_payload_bytes: usize,
    pub close_reason: String,
    pub close_timeout_ms: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            host: "localhost:8000".to_string(),
            scheme: "wss".to_string(),
            max_payload_bytes: connection::DEFAULT_MAX_PAYLOAD_BYTES,
            close_reason: connection::DEFAULT_CLOSE_REASON.to_string(),
            close_timeout_ms: connection::DEFAULT_CLOSE_TIMEOUT.as_millis() as u64,
        }
    }
}

impl ClientSettings {
    pub fn connection_options(&self, device: &DeviceSettings) -> ConnectionOptions {
        ConnectionOptions::new(
            &self.scheme,
            &self.host,
            &device.client_id(),
            &device.auth_token,
        )
        .with_max_payload_bytes(self.max_payload_bytes)
        .with_close_reason(self.close_reason.clone())
        .with_close_timeout(Duration::from_millis(self.close_timeout_ms))
    }
}

#[derive(Debug, Deserialize)]
pub struct DeviceSettings {
    pub kind: DeviceKind,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub auth_token: String,
}

impl DeviceSettings {
    /// Configured id, or the kind's registered default when blank.
    pub fn client_id(&self) -> String {
        match self.client_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => devices::registration(self.kind)
                .map(|registration| registration.default_client_id.to_string())
                .unwrap_or_else(|| self.kind.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RelaySettings {
    pub enabled: bool,
    pub address: String,
    pub controller_id: String,
    pub controller_key: Option<String>,
    pub client_key: Option<String>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            address: "0.0.0.0:8000".to_string(),
            controller_id: "LLM".to_string(),
            controller_key: None,
            client_key: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub enabled: bool,
    pub port: u16,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let settings = Config::builder()
            .add_source(File::with_name("config/config").required(false))
            .add_source(Environment::with_prefix("APP").separator("__"))
            .build()?;

        settings.try_deserialize()
    }

    pub fn from_toml(source: &str) -> Result<Self, config::ConfigError> {
        Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}
