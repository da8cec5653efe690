//! Wire payloads for the three device protocols.
//!
//! Outbound commands serialize to compact JSON (`{"command":"open"}`,
//! `{"cmd":"speed","fan":1,"value":42}`, ...). Inbound frames are parsed
//! into a JSON object first; protocol-specific views ([`FanFrame`],
//! [`PumpFrame`]) are derived from that object.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Error;

// ── Curtain ──────────────────────────────────────────────────────────

/// Commands understood by the curtain controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CurtainCommand {
    Open,
    Close,
    Stop,
    /// Move to an absolute position, in percent.
    Goto { value: i64 },
    CalibrateFull,
    ResetError,
}

// ── Fan ──────────────────────────────────────────────────────────────

/// Fan address `0` targets the whole unit (system scope).
pub const FAN_SYSTEM: u8 = 0;

/// Commands understood by the two-fan ventilation controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum FanCommand {
    /// Toggle automatic mode; `value` is `1` or `0`.
    Auto { fan: u8, value: u8 },
    Start { fan: u8 },
    Stop { fan: u8 },
    Speed { fan: u8, value: i64 },
    ResetError { fan: u8 },
}

impl FanCommand {
    pub fn auto(enabled: bool) -> Self {
        Self::Auto {
            fan: FAN_SYSTEM,
            value: u8::from(enabled),
        }
    }
}

/// One inbound fan frame.
///
/// Frames are either `{param, value}` (optionally scoped with `fan`), a
/// `{"param":"config","num_fans":N}` announcement, or a `sensor_check`
/// report.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FanFrame {
    #[serde(default)]
    pub fan: Option<i64>,
    #[serde(default)]
    pub param: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub num_fans: Option<Value>,
    #[serde(default)]
    pub sensor_check: Option<Value>,
}

// ── Pump ─────────────────────────────────────────────────────────────

/// Commands understood by the pump controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum PumpCommand {
    ManualStart,
    ManualStop,
    ManualReverse,
    ResetError,
    SetMode {
        value: i64,
    },
    SetSpeed {
        value: i64,
    },
    #[serde(rename_all = "camelCase")]
    SetAutoSettings {
        run_time: i64,
        stop_time: i64,
        auto_speed: i64,
    },
}

/// Discriminator marking a full pump snapshot.
pub const PUMP_SNAPSHOT_KEY: &str = "controlMode";

/// `type` tag of a current-measurement frame.
pub const PUMP_SAMPLE_TYPE: &str = "current_sample";

/// Protocol view of one inbound pump frame.
#[derive(Debug, Clone, PartialEq)]
pub enum PumpFrame {
    /// `{"type":"current_sample","value":3.2}`
    CurrentSample { value: f64 },
    /// Carries `controlMode`: replaces the whole state.
    Snapshot(Map<String, Value>),
    /// Anything else: merged key by key.
    Partial(Map<String, Value>),
}

impl PumpFrame {
    pub fn classify(object: Map<String, Value>) -> Result<Self, Error> {
        if object.get("type").and_then(Value::as_str) == Some(PUMP_SAMPLE_TYPE) {
            if let Some(raw) = object.get("value") {
                let value = raw.as_f64().ok_or_else(|| {
                    Error::MalformedFrame(format!("current_sample value is not a number: {raw}"))
                })?;
                return Ok(Self::CurrentSample { value });
            }
        }

        if object.contains_key(PUMP_SNAPSHOT_KEY) {
            Ok(Self::Snapshot(object))
        } else {
            Ok(Self::Partial(object))
        }
    }
}

// ── DeviceCommand ────────────────────────────────────────────────────

/// A command for any supported device type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    Curtain(CurtainCommand),
    Fan(FanCommand),
    Pump(PumpCommand),
}

impl DeviceCommand {
    /// Serialize to the compact JSON the devices expect.
    pub fn to_wire(&self) -> Result<String, Error> {
        let text = match self {
            Self::Curtain(cmd) => serde_json::to_string(cmd)?,
            Self::Fan(cmd) => serde_json::to_string(cmd)?,
            Self::Pump(cmd) => serde_json::to_string(cmd)?,
        };
        Ok(text)
    }
}

impl From<CurtainCommand> for DeviceCommand {
    fn from(cmd: CurtainCommand) -> Self {
        Self::Curtain(cmd)
    }
}

impl From<FanCommand> for DeviceCommand {
    fn from(cmd: FanCommand) -> Self {
        Self::Fan(cmd)
    }
}

impl From<PumpCommand> for DeviceCommand {
    fn from(cmd: PumpCommand) -> Self {
        Self::Pump(cmd)
    }
}

// ── Inbound parsing ──────────────────────────────────────────────────

/// Parse an inbound text frame into a JSON object.
pub fn parse_object(text: &str) -> Result<Map<String, Value>, Error> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(Error::MalformedFrame(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(Error::MalformedFrame(e.to_string())),
    }
}

/// Parse an inbound fan frame.
pub fn parse_fan_frame(text: &str) -> Result<FanFrame, Error> {
    let object = parse_object(text)?;
    serde_json::from_value(Value::Object(object)).map_err(|e| Error::MalformedFrame(e.to_string()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Tests ────────────────────────────────────────────────────────────
