//! Per-device connection management.
//!
//! A [`ConnectionManager`] owns one device's session for the lifetime of
//! the process. The operator sets the *desired* link state with
//! [`connect`](ConnectionManager::connect) /
//! [`disconnect`](ConnectionManager::disconnect); a background task
//! reconciles the *actual* state against it:
//!
//! ```text
//! Disconnected ──connect()──▶ Connecting ──ok──▶ Connected
//!                               ▲   │fail           │ drop
//!                               │   ▼               ▼
//!                               └─ GracePeriod ──(grace elapsed)──▶ Failed
//! ```
//!
//! While the device is wanted but unreachable the task retries on a
//! fixed delay forever. The operator hears about it once per episode,
//! when a failure lands after the grace period, and once more when the
//! link comes back.
//!
//! Everything the manager learns is published as [`DeviceEvent`]s on a
//! broadcast channel; the link state is also exposed on a `watch`.

mod task;
pub mod translate;

pub use translate::translate_transport_error;

use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use fieldlink_api::{Connector, DeviceCommand};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::decode;
use crate::error::{CoreError, StoreError};
use crate::model::{
    ConnectionState, DeviceEndpoint, DeviceEvent, DeviceId, DeviceState, DeviceType,
    HistoryWindow, LinkStatus, MAX_HISTORY_HOURS, Notice, NoticeKind,
};
use crate::telemetry::TelemetryStore;

const REQUEST_CHANNEL_SIZE: usize = 32;

/// Text attached to a command refused because the device is offline.
pub const COMMAND_REJECTED_TEXT: &str = "device offline, command not sent";

// ── Internal plumbing ────────────────────────────────────────────────

/// What the operator wants the link to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Desired {
    Connected,
    Disconnected,
}

/// Work handed to the background task.
enum Request {
    Send {
        command: DeviceCommand,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
    SetHistoryPeriod {
        hours: u32,
        reply: oneshot::Sender<Result<(), CoreError>>,
    },
}

// ── ConnectionManager ────────────────────────────────────────────────

/// Handle to one device's connection task.
///
/// Cheaply cloneable via `Arc<ManagerInner>`. The device state is only
/// ever replaced by the background task; callers read snapshots.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    endpoint: DeviceEndpoint,
    config: ManagerConfig,
    store: TelemetryStore,
    state: ArcSwap<DeviceState>,
    connection_state: watch::Sender<ConnectionState>,
    desired: watch::Sender<Desired>,
    event_tx: broadcast::Sender<DeviceEvent>,
    fan_in: Option<broadcast::Sender<DeviceEvent>>,
    request_tx: mpsc::Sender<Request>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("device", self.inner.endpoint.id())
            .field("type", &self.inner.endpoint.device_type())
            .field("state", &*self.inner.connection_state.borrow())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create the manager and start its background task, initially
    /// disconnected. Must be called inside a Tokio runtime.
    ///
    /// Pump managers start with an empty history window; the task fills
    /// it from `store` before its first connection attempt and publishes
    /// the result as an event.
    pub fn spawn<C: Connector>(
        endpoint: DeviceEndpoint,
        config: ManagerConfig,
        connector: Arc<C>,
        store: TelemetryStore,
    ) -> Self {
        Self::spawn_inner(endpoint, config, connector, store, None)
    }

    /// Like [`spawn`](Self::spawn), additionally copying every event onto
    /// a shared fan-in channel.
    pub(crate) fn spawn_with_fan_in<C: Connector>(
        endpoint: DeviceEndpoint,
        config: ManagerConfig,
        connector: Arc<C>,
        store: TelemetryStore,
        fan_in: broadcast::Sender<DeviceEvent>,
    ) -> Self {
        Self::spawn_inner(endpoint, config, connector, store, Some(fan_in))
    }

    fn spawn_inner<C: Connector>(
        endpoint: DeviceEndpoint,
        config: ManagerConfig,
        connector: Arc<C>,
        store: TelemetryStore,
        fan_in: Option<broadcast::Sender<DeviceEvent>>,
    ) -> Self {
        let state = initial_state(&endpoint, &config);
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (desired, _) = watch::channel(Desired::Disconnected);
        let (event_tx, _) = broadcast::channel(config.event_capacity.max(1));
        let (request_tx, request_rx) = mpsc::channel(REQUEST_CHANNEL_SIZE);

        let manager = Self {
            inner: Arc::new(ManagerInner {
                endpoint,
                config,
                store,
                state: ArcSwap::from_pointee(state),
                connection_state,
                desired,
                event_tx,
                fan_in,
                request_tx,
                cancel: CancellationToken::new(),
                task: Mutex::new(None),
            }),
        };

        let handle = tokio::spawn(task::run(Arc::clone(&manager.inner), connector, request_rx));
        if let Ok(mut slot) = manager.inner.task.try_lock() {
            *slot = Some(handle);
        }

        debug!(device = %manager.device_id(), "connection manager started");
        manager
    }

    // ── Identity ─────────────────────────────────────────────────────

    pub fn endpoint(&self) -> &DeviceEndpoint {
        &self.inner.endpoint
    }

    pub fn device_id(&self) -> &DeviceId {
        self.inner.endpoint.id()
    }

    pub fn device_type(&self) -> DeviceType {
        self.inner.endpoint.device_type()
    }

    // ── Desired state ────────────────────────────────────────────────

    /// Ask for the device to be connected. Returns immediately; the task
    /// starts connecting on its next iteration and retries until told
    /// otherwise.
    pub fn connect(&self) {
        if self.inner.desired.send_replace(Desired::Connected) != Desired::Connected {
            info!(device = %self.device_id(), "connect requested");
        }
    }

    /// Ask for the device to be disconnected. Any open session is closed
    /// and reconnect attempts stop.
    pub fn disconnect(&self) {
        if self.inner.desired.send_replace(Desired::Disconnected) != Desired::Disconnected {
            info!(device = %self.device_id(), "disconnect requested");
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    /// Current canonical state. Immutable snapshot.
    pub fn snapshot(&self) -> Arc<DeviceState> {
        self.inner.state.load_full()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.connection_state.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Subscribe to link state changes.
    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Subscribe to this device's events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.inner.event_tx.subscribe()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Write one command to the device.
    ///
    /// Fire-and-forget: success means the frame was written, not that the
    /// device acted on it. While the device is not connected the command
    /// is rejected (and reported as an event); it is never queued.
    pub async fn send(&self, command: impl Into<DeviceCommand>) -> Result<(), CoreError> {
        let command = command.into();
        self.check_command_type(&command)?;

        if !self.is_connected() {
            return Err(self.inner.reject_command());
        }

        let (reply, response) = oneshot::channel();
        self.inner
            .request_tx
            .send(Request::Send { command, reply })
            .await
            .map_err(|_| self.stopped())?;
        response.await.map_err(|_| self.stopped())?
    }

    /// Reload the pump history window for the last `hours` hours and
    /// publish the new state.
    ///
    /// `hours` must lie in `1..=MAX_HISTORY_HOURS`.
    pub async fn set_history_period(&self, hours: u32) -> Result<(), CoreError> {
        if !self.device_type().records_history() {
            return Err(CoreError::Unsupported {
                operation: "set_history_period".into(),
                device_type: self.device_type(),
            });
        }
        if !(1..=MAX_HISTORY_HOURS).contains(&hours) {
            return Err(CoreError::InvalidCommand {
                message: format!("history period must be between 1 and {MAX_HISTORY_HOURS} hours"),
            });
        }

        let (reply, response) = oneshot::channel();
        self.inner
            .request_tx
            .send(Request::SetHistoryPeriod { hours, reply })
            .await
            .map_err(|_| self.stopped())?;
        response.await.map_err(|_| self.stopped())?
    }

    // ── Teardown ─────────────────────────────────────────────────────

    /// Cancel the background task, closing any open session, and wait
    /// for it to finish. Idempotent.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let handle = self.inner.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(device = %self.device_id(), error = %e, "connection task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.inner.cancel.is_cancelled()
    }

    fn check_command_type(&self, command: &DeviceCommand) -> Result<(), CoreError> {
        let target = match command {
            DeviceCommand::Curtain(_) => DeviceType::Curtain,
            DeviceCommand::Fan(_) => DeviceType::Fan,
            DeviceCommand::Pump(_) => DeviceType::Pump,
        };
        if target == self.device_type() {
            Ok(())
        } else {
            Err(CoreError::InvalidCommand {
                message: format!(
                    "{target} command sent to {} device {}",
                    self.device_type(),
                    self.device_id()
                ),
            })
        }
    }

    fn stopped(&self) -> CoreError {
        CoreError::ManagerStopped {
            identifier: self.device_id().to_string(),
        }
    }
}

// ── ManagerInner: state and event plumbing ───────────────────────────

impl ManagerInner {
    fn set_connection_state(&self, state: ConnectionState) {
        let previous = self.connection_state.send_replace(state);
        if previous != state {
            debug!(device = %self.endpoint.id(), from = %previous, to = %state, "connection state");
        }
    }

    fn connection_state(&self) -> ConnectionState {
        *self.connection_state.borrow()
    }

    fn emit(&self, status: LinkStatus, notice: Option<Notice>) {
        let event = DeviceEvent {
            device_id: self.endpoint.id().clone(),
            state: self.state.load_full(),
            status,
            notice,
        };
        if let Some(fan_in) = &self.fan_in {
            let _ = fan_in.send(event.clone());
        }
        let _ = self.event_tx.send(event);
    }

    /// Report and build the error for a command refused while offline.
    fn reject_command(&self) -> CoreError {
        warn!(device = %self.endpoint.id(), state = %self.connection_state(), "command rejected, device offline");
        self.emit(
            LinkStatus::Error,
            Some(Notice::new(NoticeKind::CommandRejected, COMMAND_REJECTED_TEXT)),
        );
        CoreError::CommandRejected {
            device: self.endpoint.id().to_string(),
        }
    }

    /// Fill the pump history window from the store at task start.
    async fn hydrate_history(&self) {
        let id = self.endpoint.id();
        let hours = clamp_history_hours(self.config.history_hours);
        match load_window(&self.store, id, hours).await {
            Ok(window) if window.is_empty() => {}
            Ok(window) => {
                debug!(device = %id, points = window.len(), "history hydrated");
                self.adopt_window(window);
            }
            Err(e) => warn!(device = %id, error = %e, "could not hydrate history"),
        }
    }

    async fn reload_history(&self, hours: u32) -> Result<(), CoreError> {
        let window = load_window(&self.store, self.endpoint.id(), hours).await?;
        info!(device = %self.endpoint.id(), hours, points = window.len(), "history period changed");
        self.adopt_window(window);
        Ok(())
    }

    fn adopt_window(&self, window: HistoryWindow) {
        let next = (*self.state.load_full()).clone().with_history(window);
        self.state.store(Arc::new(next));
        self.emit(self.connection_state().link_status(), None);
    }
}

// ── History hydration ────────────────────────────────────────────────

fn clamp_history_hours(hours: u32) -> u32 {
    hours.clamp(1, MAX_HISTORY_HOURS)
}

fn initial_state(endpoint: &DeviceEndpoint, config: &ManagerConfig) -> DeviceState {
    let device_type = endpoint.device_type();
    if device_type.records_history() {
        decode::pump::initial_state(clamp_history_hours(config.history_hours))
    } else {
        DeviceState::initial(device_type)
    }
}

/// Stored points for the last `hours` hours. An unavailable store yields
/// an empty window without touching the blocking pool.
async fn load_window(
    store: &TelemetryStore,
    device_id: &DeviceId,
    hours: u32,
) -> Result<HistoryWindow, StoreError> {
    if !store.is_available() {
        return Ok(HistoryWindow::new(hours));
    }

    let window = HistoryWindow::new(hours);
    let since = window.cutoff(Utc::now());
    let store = store.clone();
    let id = device_id.clone();
    // redb reads are synchronous.
    let points = tokio::task::spawn_blocking(move || store.query(&id, since))
        .await
        .map_err(|e| StoreError::Task(e.to_string()))??;
    Ok(HistoryWindow::from_points(hours, points))
}
