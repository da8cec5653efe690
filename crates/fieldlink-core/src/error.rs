// ── Core error types ──
//
// Domain errors from fieldlink-core. Transport failures never reach
// callers as raw `fieldlink_api::Error` values: the connection manager
// absorbs them into its reconnect loop, and the `From` impl below maps
// the few that do surface (send failures, malformed frames).

use thiserror::Error;

use crate::model::DeviceType;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Command errors ───────────────────────────────────────────────
    /// A command was sent while the device was not connected. Never
    /// queued, never retried.
    #[error("{device}: device offline, command not sent")]
    CommandRejected { device: String },

    /// The session was open but writing the command failed.
    #[error("{device}: failed to send command: {reason}")]
    CommandFailed { device: String, reason: String },

    #[error("Invalid command: {message}")]
    InvalidCommand { message: String },

    #[error("{operation} is not supported by {device_type} devices")]
    Unsupported {
        operation: String,
        device_type: DeviceType,
    },

    // ── Registry errors ──────────────────────────────────────────────
    #[error("Device already registered: {identifier}")]
    DeviceExists { identifier: String },

    #[error("Invalid endpoint for {identifier}: {reason}")]
    InvalidEndpoint { identifier: String, reason: String },

    /// The manager's background task has exited (shutdown or cancelled).
    #[error("Connection manager for {identifier} has stopped")]
    ManagerStopped { identifier: String },

    // ── Wire errors ──────────────────────────────────────────────────
    /// An inbound frame could not be decoded. The session stays open and
    /// the previous state is kept.
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    // ── Persistence errors ───────────────────────────────────────────
    #[error(transparent)]
    Store(#[from] StoreError),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<fieldlink_api::Error> for CoreError {
    fn from(err: fieldlink_api::Error) -> Self {
        match err {
            fieldlink_api::Error::MalformedFrame(message) => Self::Protocol { message },
            fieldlink_api::Error::Encode(e) => Self::InvalidCommand {
                message: e.to_string(),
            },
            fieldlink_api::Error::InvalidUrl(reason) => Self::InvalidEndpoint {
                identifier: String::new(),
                reason,
            },
            other => Self::Transport {
                message: other.to_string(),
            },
        }
    }
}

// ── StoreError ───────────────────────────────────────────────────────

/// Errors from the telemetry store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened at startup. Writes and reads are
    /// no-ops for the rest of the process.
    #[error("telemetry store is unavailable")]
    Unavailable,

    /// The store has been shut down.
    #[error("telemetry store is closed")]
    Closed,

    #[error("storage engine error: {0}")]
    Engine(#[from] redb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unreadable timestamp in store: {0}")]
    Timestamp(String),

    /// Only finite measurements are stored.
    #[error("refusing to store non-finite value {0}")]
    NonFinite(f64),

    /// A blocking store call could not be completed on the runtime's
    /// blocking pool.
    #[error("telemetry task failed: {0}")]
    Task(String),
}

macro_rules! engine_error {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for StoreError {
                fn from(err: $ty) -> Self {
                    Self::Engine(err.into())
                }
            }
        )*
    };
}

engine_error!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_frame_maps_to_protocol() {
        let err = CoreError::from(fieldlink_api::Error::MalformedFrame("bad".into()));
        assert!(matches!(err, CoreError::Protocol { ref message } if message == "bad"));
    }

    #[test]
    fn transport_errors_keep_their_text() {
        let err = CoreError::from(fieldlink_api::Error::PingTimeout);
        assert!(err.to_string().contains("keepalive ping timeout"));
    }

    #[test]
    fn rejected_command_names_the_device() {
        let err = CoreError::CommandRejected {
            device: "10.0.0.7".into(),
        };
        assert_eq!(err.to_string(), "10.0.0.7: device offline, command not sent");
    }
}
