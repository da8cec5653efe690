// ── Connection state and published events ──

use std::sync::Arc;

use serde::Serialize;
use strum::Display;

use super::device::DeviceId;
use super::state::DeviceState;

// ── ConnectionState ─────────────────────────────────────────────────

/// Actual link state of one device, as driven by its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConnectionState {
    /// Operator wants the device disconnected, or nothing attempted yet.
    #[default]
    Disconnected,
    /// A session open is in flight.
    Connecting,
    /// Session established; frames are being read.
    Connected,
    /// Wanted but unreachable; the operator has not been told yet.
    GracePeriod,
    /// Grace period exceeded and the operator has been told once.
    /// Reconnect attempts continue.
    Failed,
}

impl ConnectionState {
    /// The status consumers see for this state.
    pub fn link_status(self) -> LinkStatus {
        match self {
            Self::Disconnected => LinkStatus::Disconnected,
            Self::Connecting => LinkStatus::Connecting,
            Self::Connected => LinkStatus::Connected,
            Self::GracePeriod | Self::Failed => LinkStatus::Error,
        }
    }
}

// ── LinkStatus ──────────────────────────────────────────────────────

/// Status attached to every [`DeviceEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkStatus {
    Connecting,
    Connected,
    Disconnected,
    Error,
    Reconnected,
}

// ── Notice ──────────────────────────────────────────────────────────

/// What an operator-facing message is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum NoticeKind {
    /// Grace period expired; fired once per episode.
    LinkLost,
    /// First successful connection after a `LinkLost`.
    LinkRestored,
    /// Command sent while offline.
    CommandRejected,
    /// Command write failed on an open session.
    CommandFailed,
    /// Inbound frame could not be decoded.
    Protocol,
    /// Equipment alarm derived from state (VFD error, overheating, ...).
    Fault,
}

/// Typed operator-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn new(kind: NoticeKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

// ── DeviceEvent ─────────────────────────────────────────────────────

/// One state-update notification from a connection manager.
///
/// `state` is an immutable snapshot; consumers never get a live
/// reference into the manager.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceEvent {
    pub device_id: DeviceId,
    pub state: Arc<DeviceState>,
    pub status: LinkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<Notice>,
}
