//! Fan frames address one sub-object (`system`, `fan1`, `fan2`) and
//! update a single parameter in it. Everything else is left exactly as
//! it was.

use fieldlink_api::wire::{self, FanFrame};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::model::DeviceState;

/// Parameters the firmware reports as `0`/`1` but which are booleans.
const BOOLEAN_PARAMS: &[&str] = &["auto"];

pub fn decode(previous: &DeviceState, frame: &str) -> Result<DeviceState, CoreError> {
    let frame = wire::parse_fan_frame(frame)?;
    let mut state = previous.clone();

    match &frame {
        FanFrame {
            param: Some(param),
            num_fans: Some(num_fans),
            ..
        } if param == "config" => {
            set(&mut state, "system", "num_fans", num_fans.clone());
        }
        FanFrame {
            param: Some(param),
            value: Some(value),
            fan,
            ..
        } if !value.is_null() => match scope_for(*fan) {
            Some(scope) => {
                let value = coerce(param, value)?;
                set(&mut state, scope, param, value);
            }
            None => tracing::debug!(fan = ?fan, param = %param, "frame for unknown fan ignored"),
        },
        FanFrame {
            sensor_check: Some(check),
            ..
        } => {
            tracing::warn!(result = %check, "fan sensor check reported");
            set(&mut state, "system", "last_sensor_check", check.clone());
        }
        _ => tracing::trace!("fan frame carried nothing to apply"),
    }

    Ok(state)
}

fn scope_for(fan: Option<i64>) -> Option<&'static str> {
    match fan {
        None | Some(0) => Some("system"),
        Some(1) => Some("fan1"),
        Some(2) => Some("fan2"),
        Some(_) => None,
    }
}

fn coerce(param: &str, value: &Value) -> Result<Value, CoreError> {
    if !BOOLEAN_PARAMS.contains(&param) {
        return Ok(value.clone());
    }
    let flag = match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => s.trim().parse::<i64>().map(|i| i != 0).map_err(|_| CoreError::Protocol {
            message: format!("{param} is not an integer flag: {s:?}"),
        })?,
        other => {
            return Err(CoreError::Protocol {
                message: format!("{param} is not an integer flag: {other}"),
            });
        }
    };
    Ok(Value::Bool(flag))
}

fn set(state: &mut DeviceState, scope: &str, key: &str, value: Value) {
    let entry = state
        .fields_mut()
        .entry(scope.to_owned())
        .or_insert_with(|| Value::Object(Map::new()));
    if !entry.is_object() {
        *entry = Value::Object(Map::new());
    }
    if let Value::Object(map) = entry {
        map.insert(key.to_owned(), value);
    }
}
