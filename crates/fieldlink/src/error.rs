//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors
//! with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use fieldlink_config::ConfigError;
use fieldlink_core::{CoreError, StoreError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const CONFIG: i32 = 9;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {device} at {url}")]
    #[diagnostic(
        code(fieldlink::connection_failed),
        help(
            "Check that the controller is powered and on the network.\n\
             Run with -v for the transport error."
        )
    )]
    ConnectionFailed { device: String, url: String },

    #[error("{device} did not accept a connection within {seconds}s")]
    #[diagnostic(
        code(fieldlink::timeout),
        help("Increase the wait with --timeout or check the device address.")
    )]
    Timeout { device: String, seconds: u64 },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("{device}: device offline, command not sent")]
    #[diagnostic(code(fieldlink::command_rejected))]
    CommandRejected { device: String },

    #[error("{device}: failed to send command: {reason}")]
    #[diagnostic(code(fieldlink::command_failed))]
    CommandFailed { device: String, reason: String },

    #[error("{message}")]
    #[diagnostic(
        code(fieldlink::invalid_command),
        help("Run: fieldlink actions")
    )]
    InvalidCommand { message: String },

    // ── Devices ──────────────────────────────────────────────────────
    #[error("Device '{identifier}' not found")]
    #[diagnostic(
        code(fieldlink::not_found),
        help("Run: fieldlink devices to see configured devices")
    )]
    NotFound { identifier: String },

    #[error("Device '{identifier}' is configured more than once")]
    #[diagnostic(code(fieldlink::conflict))]
    Conflict { identifier: String },

    #[error("No devices configured")]
    #[diagnostic(
        code(fieldlink::no_devices),
        help(
            "Add [[devices]] entries to {path}\n\
             Or create a starter file with: fieldlink config init"
        )
    )]
    NoDevices { path: String },

    // ── Telemetry ────────────────────────────────────────────────────
    #[error("Telemetry database is not available at {path}")]
    #[diagnostic(
        code(fieldlink::store_unavailable),
        help("Another `fieldlink run` may hold the database open.")
    )]
    StoreUnavailable { path: String },

    #[error(transparent)]
    #[diagnostic(code(fieldlink::store))]
    Store(#[from] StoreError),

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fieldlink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(fieldlink::config_exists),
        help("Use --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(code(fieldlink::config))]
    Config(ConfigError),

    // ── Internal ─────────────────────────────────────────────────────
    #[error("{0}")]
    #[diagnostic(code(fieldlink::internal))]
    Internal(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    #[diagnostic(code(fieldlink::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. }
            | Self::CommandRejected { .. }
            | Self::CommandFailed { .. } => exit_code::CONNECTION,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } | Self::ConfigExists { .. } => exit_code::CONFLICT,
            Self::InvalidCommand { .. } | Self::Validation { .. } => exit_code::USAGE,
            Self::NoDevices { .. } | Self::Config(_) => exit_code::CONFIG,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::CommandRejected { device } => Self::CommandRejected { device },
            CoreError::CommandFailed { device, reason } => Self::CommandFailed { device, reason },
            CoreError::InvalidCommand { message } => Self::InvalidCommand { message },
            err @ CoreError::Unsupported { .. } => Self::InvalidCommand {
                message: err.to_string(),
            },
            CoreError::DeviceExists { identifier } => Self::Conflict { identifier },
            CoreError::InvalidEndpoint { identifier, reason } => Self::Validation {
                field: format!("address of {identifier}"),
                reason,
            },
            CoreError::Store(e) => Self::Store(e),
            other @ (CoreError::ManagerStopped { .. }
            | CoreError::Protocol { .. }
            | CoreError::Transport { .. }) => Self::Internal(other.to_string()),
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::UnknownDevice(identifier) => Self::NotFound { identifier },
            ConfigError::DuplicateDevice { value, .. } => Self::Conflict { identifier: value },
            other => Self::Config(other),
        }
    }
}
