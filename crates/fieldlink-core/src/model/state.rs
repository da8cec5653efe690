// ── Canonical device state ──

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use super::device::DeviceType;
use super::history::HistoryWindow;

/// Fan sub-objects present from the first moment a fan is managed.
pub const FAN_SCOPES: [&str; 3] = ["system", "fan1", "fan2"];

/// Last-known attributes of one device, as reduced from wire frames.
///
/// `fields` is the open keyed mapping the device reports (`pumpOn`,
/// `position_percent`, `fan1.speed`, ...). Pumps additionally carry a
/// derived start time and the rolling current history. Consumers only
/// ever see this behind an `Arc` snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeviceState {
    fields: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    history: Option<HistoryWindow>,
}

impl DeviceState {
    /// State of a device that has not reported anything yet.
    pub fn initial(device_type: DeviceType) -> Self {
        let mut fields = Map::new();
        if device_type == DeviceType::Fan {
            for scope in FAN_SCOPES {
                fields.insert(scope.to_owned(), Value::Object(Map::new()));
            }
        }
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            ..Self::default()
        }
    }

    pub fn with_history(mut self, window: HistoryWindow) -> Self {
        self.history = Some(window);
        self
    }

    // ── Read access ──────────────────────────────────────────────────

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// A nested sub-object such as `system` or `fan1`.
    pub fn scope(&self, name: &str) -> Option<&Map<String, Value>> {
        self.fields.get(name).and_then(Value::as_object)
    }

    pub fn get_in(&self, scope: &str, key: &str) -> Option<&Value> {
        self.scope(scope).and_then(|s| s.get(key))
    }

    pub fn last_start(&self) -> Option<DateTime<Utc>> {
        self.last_start
    }

    pub fn history(&self) -> Option<&HistoryWindow> {
        self.history.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    // ── Reducer access ───────────────────────────────────────────────

    pub(crate) fn fields_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.fields
    }

    pub(crate) fn set_last_start(&mut self, at: Option<DateTime<Utc>>) {
        self.last_start = at;
    }

    pub(crate) fn history_mut(&mut self) -> Option<&mut HistoryWindow> {
        self.history.as_mut()
    }
}

/// Loose truthiness for device-reported flags: devices send `true`,
/// `1`, `"1"` and friends interchangeably.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Non-zero error code, if `value` carries one.
pub fn error_code(value: &Value) -> Option<i64> {
    let code = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(float_code))?,
        Value::String(s) => s.trim().parse().ok()?,
        Value::Bool(true) => 1,
        _ => return None,
    };
    (code != 0).then_some(code)
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn float_code(f: f64) -> i64 {
    f as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fan_starts_with_three_empty_scopes() {
        let state = DeviceState::initial(DeviceType::Fan);
        for scope in FAN_SCOPES {
            assert_eq!(state.scope(scope).map(Map::len), Some(0));
        }
        assert!(DeviceState::initial(DeviceType::Curtain).is_empty());
    }

    #[test]
    fn truthiness_matches_device_encodings() {
        assert!(is_truthy(&json!(1)));
        assert!(is_truthy(&json!(true)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("0")));
        assert!(!is_truthy(&Value::Null));
    }

    #[test]
    fn error_codes_ignore_zero() {
        assert_eq!(error_code(&json!(0)), None);
        assert_eq!(error_code(&json!(7)), Some(7));
        assert_eq!(error_code(&json!("12")), Some(12));
        assert_eq!(error_code(&json!(null)), None);
    }
}
