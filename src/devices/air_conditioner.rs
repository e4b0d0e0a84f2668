// air_conditioner.rs
use super::{AudioOutput, KindRegistration, PowerCell, StateHandler};
use crate::models::{DeviceKind, DeviceState, Transition};
use std::sync::Arc;
use tracing::info;

inventory::submit! {
    KindRegistration {
        kind: DeviceKind::AirConditioner,
        label: "air-conditioner",
        default_client_id: "air_conditioner_client",
    }
}

/// Climate unit represented by its running sound: on means audible.
pub struct AirConditioner {
    sound: Arc<dyn AudioOutput>,
    power: PowerCell,
}

impl AirConditioner {
    pub fn new(sound: Arc<dyn AudioOutput>) -> Self {
        Self {
            sound,
            power: PowerCell::default(),
        }
    }
}

impl StateHandler for AirConditioner {
    fn kind(&self) -> DeviceKind {
        DeviceKind::AirConditioner
    }

    fn init(&self) {
        self.sound.start_looping();
        self.sound.set_muted(true);
        self.power.set(false);
    }

    fn apply(&self, transition: Transition) {
        let on = transition.is_on();
        if !self.power.set(on) {
            return;
        }
        self.sound.set_muted(!on);
        info!(device = "air-conditioner", on, "state applied");
    }

    fn state(&self) -> DeviceState {
        DeviceState::Power {
            on: self.power.is_on(),
        }
    }
}
