// devices/mod.rs
mod air_conditioner;
mod lights;
mod speakers;
mod television;

pub use air_conditioner::AirConditioner;
pub use lights::Lights;
pub use speakers::Speakers;
pub use television::{Television, effect_plan};

use crate::models::{DeviceKind, DeviceState, Effect, Transition};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

/// Strategy that mirrors a transition into the actuators of one device kind.
///
/// `apply` runs synchronously inside the receive loop, so implementations
/// must not block. Re-applying the transition the device is already in must
/// not touch the actuators again.
pub trait StateHandler: Send + Sync {
    fn kind(&self) -> DeviceKind;

    /// Drives the actuators into their baseline (off) state.
    fn init(&self);

    fn apply(&self, transition: Transition);

    fn state(&self) -> DeviceState;
}

/// Looping audio source that can be muted.
pub trait AudioOutput: Send + Sync {
    fn start_looping(&self);
    fn set_muted(&self, muted: bool);
}

/// Anything that can be shown or hidden, e.g. a light object.
pub trait Switchable: Send + Sync {
    fn set_active(&self, active: bool);
}

/// Screen plus player; driven one [`Effect`] at a time.
pub trait VideoOutput: Send + Sync {
    fn perform(&self, effect: Effect);
}

/// Static facts about a device kind, collected at link time.
pub struct KindRegistration {
    pub kind: DeviceKind,
    pub label: &'static str,
    pub default_client_id: &'static str,
}

inventory::collect!(KindRegistration);

pub fn registration(kind: DeviceKind) -> Option<&'static KindRegistration> {
    inventory::iter::<KindRegistration>
        .into_iter()
        .find(|registration| registration.kind == kind)
}

pub fn label(kind: DeviceKind) -> &'static str {
    registration(kind).map_or("device", |registration| registration.label)
}

/// Last power state pushed to the actuators. `None` until the first
/// `init` or `apply`.
#[derive(Debug, Default)]
pub(crate) struct PowerCell(Mutex<Option<bool>>);

impl PowerCell {
    /// Stores `on` and reports whether it differs from what was stored.
    pub(crate) fn set(&self, on: bool) -> bool {
        let mut current = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        let changed = *current != Some(on);
        *current = Some(on);
        changed
    }

    pub(crate) fn is_on(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .unwrap_or(false)
    }
}

/// Actuator that only reports what it would do. Used by the binary when no
/// presentation layer is attached.
pub struct LoggedActuator {
    client_id: String,
    label: &'static str,
}

impl LoggedActuator {
    pub fn new(client_id: impl Into<String>, kind: DeviceKind) -> Self {
        Self {
            client_id: client_id.into(),
            label: label(kind),
        }
    }
}

impl AudioOutput for LoggedActuator {
    fn start_looping(&self) {
        info!(client_id = %self.client_id, device = self.label, "audio looping");
    }

    fn set_muted(&self, muted: bool) {
        info!(client_id = %self.client_id, device = self.label, muted, "audio mute");
    }
}

impl Switchable for LoggedActuator {
    fn set_active(&self, active: bool) {
        info!(client_id = %self.client_id, device = self.label, active, "switch");
    }
}

impl VideoOutput for LoggedActuator {
    fn perform(&self, effect: Effect) {
        info!(client_id = %self.client_id, device = self.label, ?effect, "video");
    }
}

/// Builds the handler for `kind` wired to a single logging actuator.
pub fn logged_handler(kind: DeviceKind, client_id: &str) -> Arc<dyn StateHandler> {
    let actuator = Arc::new(LoggedActuator::new(client_id, kind));
    match kind {
        DeviceKind::AirConditioner => Arc::new(AirConditioner::new(actuator)),
        DeviceKind::Lights => Arc::new(Lights::new(vec![actuator as Arc<dyn Switchable>])),
        DeviceKind::Speakers => Arc::new(Speakers::new(vec![actuator as Arc<dyn AudioOutput>])),
        DeviceKind::Television => Arc::new(Television::new(actuator)),
    }
}
