// lib.rs
//! Persistent command channels between a fleet of simulated devices and a
//! message relay.
//!
//! Each device owns one WebSocket connection to `{scheme}://{host}/ws/{id}`.
//! Text frames `"1"` and `"0"` switch the device on and off through its
//! [`devices::StateHandler`]; every other payload is ignored. The [`relay`]
//! module contains the server side those connections attach to.

pub mod cancellation;
pub mod commands;
pub mod config;
pub mod connection;
pub mod controller;
pub mod devices;
pub mod docs;
pub mod error;
pub mod events;
pub mod metrics;
pub mod models;
pub mod relay;
pub mod utils;

pub use commands::{Command, MessageDispatcher};
pub use connection::{ConnectionManager, ConnectionOptions};
pub use controller::{DeviceController, Fleet};
pub use error::{AppError, ClientError};
pub use models::{ConnectionState, DeviceKind, DeviceState, Effect, Transition};
