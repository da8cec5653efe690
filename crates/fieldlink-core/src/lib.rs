// fieldlink-core: device connectivity, state reduction and telemetry
// persistence between fieldlink-api and consumers (CLI).

pub mod command;
pub mod config;
pub mod connection;
pub mod decode;
pub mod error;
pub mod model;
pub mod notify;
pub mod registry;
pub mod telemetry;

// ── Primary re-exports ──────────────────────────────────────────────
pub use command::{CurtainControl, FanControl, PumpControl, parse_action};
pub use config::{ManagerConfig, StoreConfig};
pub use connection::{ConnectionManager, translate_transport_error};
pub use error::{CoreError, StoreError};
pub use notify::{Notification, NotificationSink, Severity, spawn_forwarder};
pub use registry::DeviceRegistry;
pub use telemetry::{ShutdownReport, TelemetryStore};

pub use model::{
    ConnectionState, DeviceEndpoint, DeviceEvent, DeviceId, DeviceState, DeviceType,
    HistoryPoint, HistoryWindow, LinkStatus, MAX_HISTORY_HOURS, Notice, NoticeKind,
    TelemetrySample,
};

// Transport types consumers need to build a registry or send commands.
pub use fieldlink_api::{
    Connector, CurtainCommand, DeviceCommand, FanCommand, KeepaliveConfig, PumpCommand, Session,
    WsConnector,
};
