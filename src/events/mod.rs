// events/mod.rs
use crate::models::{ConnectionState, DeviceKind, Transition};
use chrono::Utc;
use dashmap::DashMap;
use serde_json::json;

pub const CONNECTION_STATE: &str = "connection_state";
pub const TRANSITION: &str = "transition";

type Subscriber = Box<dyn Fn(serde_json::Value) + Send + Sync>;

/// Fan-out of device events to in-process observers.
pub struct EventBus {
    subscribers: DashMap<String, Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
        }
    }

    pub fn publish(&self, event_type: &str, data: serde_json::Value) {
        if let Some(subscribers) = self.subscribers.get(event_type) {
            for callback in subscribers.iter() {
                (callback)(data.clone());
            }
        }
    }

    pub fn subscribe<F: Fn(serde_json::Value) + Send + Sync + 'static>(
        &self,
        event_type: &str,
        callback: F,
    ) {
        self.subscribers
            .entry(event_type.to_string())
            .or_default()
            .push(Box::new(callback));
    }

    pub fn connection_state(&self, client_id: &str, state: ConnectionState) {
        self.publish(
            CONNECTION_STATE,
            json!({
                "client_id": client_id,
                "state": state,
                "at": Utc::now(),
            }),
        );
    }

    pub fn transition(&self, client_id: &str, kind: DeviceKind, transition: Transition) {
        self.publish(
            TRANSITION,
            json!({
                "client_id": client_id,
                "kind": kind,
                "transition": transition,
                "at": Utc::now(),
            }),
        );
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
