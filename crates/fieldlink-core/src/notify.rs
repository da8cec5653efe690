//! Boundary to human-facing notification delivery.
//!
//! The core does not deliver notifications itself. A
//! [`NotificationSink`] receives one [`Notification`] per event that
//! carries a notice; [`spawn_forwarder`] connects an event receiver to a
//! sink on its own task.

use std::sync::Arc;

use serde::Serialize;
use strum::Display;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::{DeviceEvent, DeviceId, NoticeKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// A message for the operator about one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub device_id: DeviceId,
    pub kind: NoticeKind,
    pub severity: Severity,
    pub text: String,
}

impl Notification {
    /// The notification an event carries, if any.
    pub fn from_event(event: &DeviceEvent) -> Option<Self> {
        let notice = event.notice.as_ref()?;
        let severity = match notice.kind {
            NoticeKind::LinkRestored => Severity::Info,
            NoticeKind::Protocol => Severity::Warning,
            NoticeKind::LinkLost
            | NoticeKind::CommandRejected
            | NoticeKind::CommandFailed
            | NoticeKind::Fault => Severity::Error,
        };
        Some(Self {
            device_id: event.device_id.clone(),
            kind: notice.kind,
            severity,
            text: notice.text.clone(),
        })
    }
}

/// Something that tells a human.
pub trait NotificationSink: Send + Sync + 'static {
    fn notify(&self, notification: &Notification);
}

/// Forward every notice-carrying event from `events` to `sink` until
/// `cancel` fires or the channel closes.
pub fn spawn_forwarder(
    mut events: broadcast::Receiver<DeviceEvent>,
    sink: Arc<dyn NotificationSink>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Ok(event) => {
                        if let Some(notification) = Notification::from_event(&event) {
                            sink.notify(&notification);
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "notification forwarder lagged, events dropped");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
        debug!("notification forwarder stopped");
    })
}
