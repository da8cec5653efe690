// ── Domain model ──
//
// Identity, canonical device state, in-memory history and the events a
// connection manager publishes. Everything here is plain data; the
// behaviour lives in `decode`, `connection` and `telemetry`.

pub mod device;
pub mod event;
pub mod history;
pub mod state;

// ── Re-exports ──────────────────────────────────────────────────────

pub use device::{DeviceEndpoint, DeviceId, DeviceType};
pub use event::{ConnectionState, DeviceEvent, LinkStatus, Notice, NoticeKind};
pub use history::{HistoryPoint, HistoryWindow, MAX_HISTORY_HOURS, TelemetrySample};
pub use state::DeviceState;
