// models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use validator::Validate;

/// Lifecycle of one outbound device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
    Faulted,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
            ConnectionState::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    On,
    Off,
}

impl Transition {
    pub fn is_on(self) -> bool {
        matches!(self, Transition::On)
    }
}

/// One step of a multi-step actuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Effect {
    RevealSurface,
    EnablePlayer,
    StartPlayback,
    StopPlayback,
    DisablePlayer,
    HideSurface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    AirConditioner,
    Lights,
    Speakers,
    Television,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeviceKind::AirConditioner => "air_conditioner",
            DeviceKind::Lights => "lights",
            DeviceKind::Speakers => "speakers",
            DeviceKind::Television => "television",
        };
        f.write_str(name)
    }
}

/// Local mirror of what the actuators currently show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DeviceState {
    Power { on: bool },
    Sequenced { on: bool, applied: Vec<Effect> },
}

impl DeviceState {
    pub fn is_on(&self) -> bool {
        match self {
            DeviceState::Power { on } | DeviceState::Sequenced { on, .. } => *on,
        }
    }
}

/// Frame a controller sends to the relay to reach one device.
#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct RelayCommand {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub target: String,
    #[serde(default)]
    #[validate(length(min = 1))]
    pub message: String,
}

/// Frame the relay hands to the controller on behalf of a device.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ForwardedMessage {
    pub sender: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RelayInfo {
    pub message: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectedClient {
    pub client_id: String,
    #[schema(value_type = String, format = DateTime)]
    pub connected_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RelayStats {
    pub active_connections: usize,
    pub clients: Vec<ConnectedClient>,
}
