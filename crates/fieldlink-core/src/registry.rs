// ── Device registry ──
//
// Owns exactly one ConnectionManager per device and a fan-in channel
// carrying every manager's events. All managers share one connector,
// one ManagerConfig and one TelemetryStore.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use fieldlink_api::Connector;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::info;

use crate::config::ManagerConfig;
use crate::connection::ConnectionManager;
use crate::error::CoreError;
use crate::model::{DeviceEndpoint, DeviceEvent, DeviceId};
use crate::telemetry::TelemetryStore;

const FAN_IN_CAPACITY: usize = 1024;

pub struct DeviceRegistry<C: Connector> {
    connector: Arc<C>,
    config: ManagerConfig,
    store: TelemetryStore,
    managers: DashMap<DeviceId, ConnectionManager>,
    events: broadcast::Sender<DeviceEvent>,
}

impl<C: Connector> DeviceRegistry<C> {
    pub fn new(connector: C, config: ManagerConfig, store: TelemetryStore) -> Self {
        let (events, _) = broadcast::channel(FAN_IN_CAPACITY);
        Self {
            connector: Arc::new(connector),
            config,
            store,
            managers: DashMap::new(),
            events,
        }
    }

    /// Create and start the manager for `endpoint`.
    ///
    /// Fails if a manager already exists for the same device.
    pub fn register(&self, endpoint: DeviceEndpoint) -> Result<ConnectionManager, CoreError> {
        match self.managers.entry(endpoint.id().clone()) {
            Entry::Occupied(entry) => Err(CoreError::DeviceExists {
                identifier: entry.key().to_string(),
            }),
            Entry::Vacant(entry) => {
                info!(
                    device = %endpoint.id(),
                    device_type = %endpoint.device_type(),
                    url = %endpoint.url(),
                    "registering device"
                );
                let manager = ConnectionManager::spawn_with_fan_in(
                    endpoint,
                    self.config.clone(),
                    Arc::clone(&self.connector),
                    self.store.clone(),
                    self.events.clone(),
                );
                entry.insert(manager.clone());
                Ok(manager)
            }
        }
    }

    pub fn get(&self, id: &DeviceId) -> Option<ConnectionManager> {
        self.managers.get(id).map(|m| m.value().clone())
    }

    /// Every registered manager, ordered by device id.
    pub fn managers(&self) -> Vec<ConnectionManager> {
        let mut managers: Vec<_> = self.managers.iter().map(|m| m.value().clone()).collect();
        managers.sort_by(|a, b| a.device_id().cmp(b.device_id()));
        managers
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    pub fn store(&self) -> &TelemetryStore {
        &self.store
    }

    // ── Events ───────────────────────────────────────────────────────

    /// Events from every device, in per-device order.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.events.subscribe()
    }

    /// [`subscribe`](Self::subscribe) as a `Stream`. Lagged receivers
    /// yield an error item and continue.
    pub fn event_stream(&self) -> BroadcastStream<DeviceEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    // ── Fleet operations ─────────────────────────────────────────────

    pub fn connect_all(&self) {
        for manager in self.managers() {
            manager.connect();
        }
    }

    /// Stop every manager. The telemetry store is left open; shut it
    /// down separately once no more samples can arrive.
    pub async fn shutdown(&self) {
        let managers = self.managers();
        for manager in &managers {
            manager.disconnect();
        }
        for manager in managers {
            manager.shutdown().await;
        }
        self.managers.clear();
    }
}
