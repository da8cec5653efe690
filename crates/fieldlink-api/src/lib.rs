// fieldlink-api: WebSocket transport and wire payloads for field devices.

pub mod error;
pub mod transport;
pub mod wire;

pub use error::Error;
pub use transport::{Connector, KeepaliveConfig, Session, WsConnector, WsSession};
pub use wire::{CurtainCommand, DeviceCommand, FanCommand, PumpCommand};
