// speakers.rs
use super::{AudioOutput, KindRegistration, PowerCell, StateHandler};
use crate::models::{DeviceKind, DeviceState, Transition};
use std::sync::Arc;
use tracing::info;

inventory::submit! {
    KindRegistration {
        kind: DeviceKind::Speakers,
        label: "speakers",
        default_client_id: "speaker_group_client",
    }
}

pub struct Speakers {
    group: Vec<Arc<dyn AudioOutput>>,
    power: PowerCell,
}

impl Speakers {
    pub fn new(group: Vec<Arc<dyn AudioOutput>>) -> Self {
        Self {
            group,
            power: PowerCell::default(),
        }
    }
}

impl StateHandler for Speakers {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Speakers
    }

    fn init(&self) {
        for speaker in &self.group {
            speaker.start_looping();
            speaker.set_muted(true);
        }
        self.power.set(false);
    }

    fn apply(&self, transition: Transition) {
        let on = transition.is_on();
        if !self.power.set(on) {
            return;
        }
        for speaker in &self.group {
            speaker.set_muted(!on);
        }
        info!(device = "speakers", on, count = self.group.len(), "state applied");
    }

    fn state(&self) -> DeviceState {
        DeviceState::Power {
            on: self.power.is_on(),
        }
    }
}
