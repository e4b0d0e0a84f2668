// controller/mod.rs
use crate::{
    commands::MessageDispatcher,
    config::Settings,
    connection::{ConnectionManager, ConnectionOptions},
    devices::{self, StateHandler},
    error::{AppError, ClientError},
    events::EventBus,
    models::{DeviceKind, DeviceState},
};
use dashmap::{DashMap, mapref::entry::Entry};
use futures_util::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

/// One device: its handler plus the connection that feeds it.
pub struct DeviceController {
    handler: Arc<dyn StateHandler>,
    connection: ConnectionManager,
}

impl DeviceController {
    pub fn new(
        options: ConnectionOptions,
        handler: Arc<dyn StateHandler>,
        events: Option<Arc<EventBus>>,
    ) -> Self {
        let dispatcher = MessageDispatcher::new(options.client_id.clone(), Arc::clone(&handler));
        let connection = match events {
            Some(events) => ConnectionManager::with_events(
                options,
                Arc::new(dispatcher.with_events(Arc::clone(&events))),
                events,
            ),
            None => ConnectionManager::new(options, Arc::new(dispatcher)),
        };
        Self {
            handler,
            connection,
        }
    }

    pub fn client_id(&self) -> &str {
        self.connection.client_id()
    }

    pub fn kind(&self) -> DeviceKind {
        self.handler.kind()
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn state(&self) -> DeviceState {
        self.handler.state()
    }

    /// Puts the actuators in their baseline state and connects. Connection
    /// failures are logged by the connection and not retried.
    pub async fn init(&self) {
        self.handler.init();
        info!(
            client_id = %self.client_id(),
            device = devices::label(self.kind()),
            url = %self.connection.endpoint(),
            "starting device"
        );
        match self.connection.connect().await {
            Ok(()) | Err(ClientError::AlreadyConnected) => {}
            Err(e) => debug!(client_id = %self.client_id(), error = %e, "device left offline"),
        }
    }

    pub async fn teardown(&self) {
        self.connection.disconnect().await;
    }
}

/// All device controllers of the application, one per client id.
pub struct Fleet {
    controllers: DashMap<String, Arc<DeviceController>>,
    events: Arc<EventBus>,
}

impl Fleet {
    pub fn new(events: Arc<EventBus>) -> Self {
        Self {
            controllers: DashMap::new(),
            events,
        }
    }

    /// Builds controllers for every configured device, driving logging
    /// actuators.
    pub fn from_settings(settings: &Settings, events: Arc<EventBus>) -> Result<Self, AppError> {
        let fleet = Self::new(events);
        for device in &settings.devices {
            let options = settings.client.connection_options(device);
            let handler = devices::logged_handler(device.kind, &options.client_id);
            fleet.add(options, handler)?;
        }
        Ok(fleet)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn add(
        &self,
        options: ConnectionOptions,
        handler: Arc<dyn StateHandler>,
    ) -> Result<Arc<DeviceController>, AppError> {
        match self.controllers.entry(options.client_id.clone()) {
            Entry::Occupied(entry) => Err(AppError::DuplicateDevice(entry.key().clone())),
            Entry::Vacant(slot) => {
                let controller = Arc::new(DeviceController::new(
                    options,
                    handler,
                    Some(Arc::clone(&self.events)),
                ));
                slot.insert(Arc::clone(&controller));
                Ok(controller)
            }
        }
    }

    pub fn get(&self, client_id: &str) -> Option<Arc<DeviceController>> {
        self.controllers.get(client_id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    fn snapshot(&self) -> Vec<Arc<DeviceController>> {
        self.controllers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub async fn init_all(&self) {
        join_all(self.snapshot().iter().map(|controller| controller.init())).await;
    }

    pub async fn teardown_all(&self) {
        join_all(self.snapshot().iter().map(|controller| controller.teardown())).await;
    }
}
