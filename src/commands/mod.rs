// commands/mod.rs
use crate::{
    devices::{self, StateHandler},
    events::EventBus,
    models::Transition,
};
use std::sync::Arc;
use tracing::{debug, info};

/// A decoded text payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Switch(Transition),
    Unrecognized(String),
}

impl Command {
    /// Only the literal bodies `"1"` and `"0"` carry meaning.
    pub fn parse(body: &str) -> Self {
        match body {
            "1" => Command::Switch(Transition::On),
            "0" => Command::Switch(Transition::Off),
            other => Command::Unrecognized(other.to_string()),
        }
    }
}

/// Turns inbound payloads into state transitions for one device.
pub struct MessageDispatcher {
    client_id: String,
    handler: Arc<dyn StateHandler>,
    events: Option<Arc<EventBus>>,
}

impl MessageDispatcher {
    pub fn new(client_id: impl Into<String>, handler: Arc<dyn StateHandler>) -> Self {
        Self {
            client_id: client_id.into(),
            handler,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn handler(&self) -> &Arc<dyn StateHandler> {
        &self.handler
    }

    /// Applies the payload and returns the transition, if any. Unknown
    /// bodies are dropped without error.
    pub fn dispatch(&self, body: &str) -> Option<Transition> {
        match Command::parse(body) {
            Command::Switch(transition) => {
                let kind = self.handler.kind();
                self.handler.apply(transition);
                metrics::counter!(
                    "device_transitions_applied_total",
                    "kind" => kind.to_string()
                )
                .increment(1);
                info!(
                    client_id = %self.client_id,
                    device = devices::label(kind),
                    ?transition,
                    "server command received"
                );
                if let Some(events) = &self.events {
                    events.transition(&self.client_id, kind, transition);
                }
                Some(transition)
            }
            Command::Unrecognized(body) => {
                debug!(client_id = %self.client_id, %body, "ignoring unrecognized payload");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DeviceKind, DeviceState};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CountingHandler {
        applied: Mutex<Vec<Transition>>,
    }

    impl StateHandler for CountingHandler {
        fn kind(&self) -> DeviceKind {
            DeviceKind::Lights
        }

        fn init(&self) {}

        fn apply(&self, transition: Transition) {
            self.applied.lock().unwrap().push(transition);
        }

        fn state(&self) -> DeviceState {
            DeviceState::Power { on: false }
        }
    }

    #[test]
    fn parses_only_literal_tokens() {
        assert_eq!(Command::parse("1"), Command::Switch(Transition::On));
        assert_eq!(Command::parse("0"), Command::Switch(Transition::Off));
        assert_eq!(
            Command::parse("10"),
            Command::Unrecognized("10".to_string())
        );
        assert_eq!(Command::parse(""), Command::Unrecognized(String::new()));
    }

    #[test]
    fn one_apply_per_recognized_body() {
        let handler = Arc::new(CountingHandler::default());
        let dispatcher = MessageDispatcher::new("lights_1", handler.clone());

        assert_eq!(dispatcher.dispatch("1"), Some(Transition::On));
        assert_eq!(dispatcher.dispatch("0"), Some(Transition::Off));
        assert_eq!(dispatcher.dispatch("maybe"), None);

        assert_eq!(
            *handler.applied.lock().unwrap(),
            vec![Transition::On, Transition::Off]
        );
    }

    #[test]
    fn publishes_transition_events() {
        let handler = Arc::new(CountingHandler::default());
        let events = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&seen);
        events.subscribe(crate::events::TRANSITION, move |_| {
            *counter.lock().unwrap() += 1;
        });

        let dispatcher = MessageDispatcher::new("lights_1", handler).with_events(events);
        dispatcher.dispatch("1");
        dispatcher.dispatch("??");

        assert_eq!(*seen.lock().unwrap(), 1);
    }
}
