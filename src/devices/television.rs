// television.rs
use super::{KindRegistration, PowerCell, StateHandler, VideoOutput};
use crate::models::{DeviceKind, DeviceState, Effect, Transition};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

inventory::submit! {
    KindRegistration {
        kind: DeviceKind::Television,
        label: "television",
        default_client_id: "television_client",
    }
}

/// Ordered steps for a transition. Each step only depends on steps before
/// it: playback starts after the player is enabled and stops before it is
/// disabled.
pub fn effect_plan(transition: Transition) -> [Effect; 3] {
    match transition {
        Transition::On => [
            Effect::RevealSurface,
            Effect::EnablePlayer,
            Effect::StartPlayback,
        ],
        Transition::Off => [
            Effect::StopPlayback,
            Effect::DisablePlayer,
            Effect::HideSurface,
        ],
    }
}

pub struct Television {
    output: Arc<dyn VideoOutput>,
    power: PowerCell,
    applied: Mutex<Vec<Effect>>,
}

impl Television {
    pub fn new(output: Arc<dyn VideoOutput>) -> Self {
        Self {
            output,
            power: PowerCell::default(),
            applied: Mutex::new(Vec::new()),
        }
    }

    fn run(&self, effects: &[Effect]) {
        for effect in effects {
            self.output.perform(*effect);
        }
        *self.applied.lock().unwrap_or_else(PoisonError::into_inner) = effects.to_vec();
    }
}

impl StateHandler for Television {
    fn kind(&self) -> DeviceKind {
        DeviceKind::Television
    }

    fn init(&self) {
        self.run(&[Effect::HideSurface]);
        self.power.set(false);
    }

    fn apply(&self, transition: Transition) {
        let on = transition.is_on();
        if !self.power.set(on) {
            return;
        }
        self.run(&effect_plan(transition));
        info!(device = "television", on, "state applied");
    }

    fn state(&self) -> DeviceState {
        DeviceState::Sequenced {
            on: self.power.is_on(),
            applied: self
                .applied
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::testing::Recorder;

    #[test]
    fn effects_run_in_dependency_order() {
        let recorder = Arc::new(Recorder::default());
        let tv = Television::new(recorder.clone());

        tv.apply(Transition::On);
        assert_eq!(
            recorder.effects(),
            vec![
                Effect::RevealSurface,
                Effect::EnablePlayer,
                Effect::StartPlayback
            ]
        );

        recorder.effects.lock().unwrap().clear();
        tv.apply(Transition::Off);
        assert_eq!(
            recorder.effects(),
            vec![
                Effect::StopPlayback,
                Effect::DisablePlayer,
                Effect::HideSurface
            ]
        );
        assert_eq!(
            tv.state(),
            DeviceState::Sequenced {
                on: false,
                applied: effect_plan(Transition::Off).to_vec(),
            }
        );
    }

    #[test]
    fn repeated_on_does_not_restart_playback() {
        let recorder = Arc::new(Recorder::default());
        let tv = Television::new(recorder.clone());
        tv.init();
        tv.apply(Transition::On);
        tv.apply(Transition::On);
        assert_eq!(recorder.effects().len(), 4);
    }
}
