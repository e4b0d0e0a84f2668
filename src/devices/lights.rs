// lights.rs
use super::{KindRegistration, PowerCell, StateHandler, Switchable};
use crate::models::{DeviceKind, DeviceState, Transition};
use std::sync::Arc;
use tracing::info;

inventory::submit! {
    KindRegistration {
        kind: DeviceKind::Lights,
        label: "lights",
        default_client_id: "all_house_lights",
    }
}

/// A group of lights switched together.
pub struct Lights {
    group: Vec<Arc<dyn Switchable>>,
    power: PowerCell,
}

impl Lights {
    pub fn new(group: Vec<Arc<dyn Switchable>>) -> Self {
        Self {
            group,
            power: PowerCell::default(),
        }
    }

    fn switch_all(&self, active: bool) {
        for light in &self.group {
            light.set_active(active);
        }
    }
}

impl StateHandler for Lights {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Lights
    }

    fn init(&self) {
        self.switch_all(false);
        self.power.set(false);
    }

    fn apply(&self, transition: Transition) {
        let on = transition.is_on();
        if !self.power.set(on) {
            return;
        }
        self.switch_all(on);
        info!(device = "lights", on, count = self.group.len(), "state applied");
    }

    fn state(&self) -> DeviceState {
        DeviceState::Power {
            on: self.power.is_on(),
        }
    }
}
