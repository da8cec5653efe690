//! Equipment alarms derived from consecutive states.
//!
//! An alarm fires on the transition into a fault, not while it persists:
//! a VFD error code fires when it changes to a new non-zero value, a lost
//! VFD link fires when `active` goes from true to false.

use serde_json::Value;

use crate::model::state::{error_code, is_truthy};
use crate::model::{DeviceState, DeviceType};

pub fn detect(device_type: DeviceType, previous: &DeviceState, next: &DeviceState) -> Vec<String> {
    match device_type {
        DeviceType::Curtain => vfd_faults(previous, next, "vfd_error", "vfd_active"),
        DeviceType::Pump => vfd_faults(previous, next, "vfdError", "active"),
        DeviceType::Fan => fan_faults(previous, next),
    }
}

fn vfd_faults(previous: &DeviceState, next: &DeviceState, error_key: &str, active_key: &str) -> Vec<String> {
    let mut faults = Vec::new();

    if let Some(code) = new_error(previous.get(error_key), next.get(error_key)) {
        faults.push(format!("Drive (VFD) reported an error. Code: {code}"));
    }

    let was_active = previous.get(active_key).is_some_and(is_truthy);
    let is_active = next.get(active_key).is_some_and(is_truthy);
    if was_active && !is_active {
        faults.push("Lost communication with the drive (VFD).".to_owned());
    }

    faults
}

fn fan_faults(previous: &DeviceState, next: &DeviceState) -> Vec<String> {
    let mut faults = Vec::new();

    let was_sensor_fault = previous.get_in("system", "temp_error").is_some_and(is_truthy);
    if let Some(sensor) = next.get_in("system", "temp_error").filter(|v| is_truthy(v)) {
        if !was_sensor_fault {
            faults.push(format!("Temperature sensor problem detected (code: {sensor})."));
        }
    }

    let fan_count = next
        .get_in("system", "num_fans")
        .and_then(Value::as_u64)
        .unwrap_or(1);
    for n in 1..=fan_count {
        let scope = format!("fan{n}");
        if let Some(code) = new_error(previous.get_in(&scope, "error"), next.get_in(&scope, "error")) {
            faults.push(format!("Fan #{n}: device reported an error. Code: {code}"));
        }
    }

    faults
}

/// The new error code, if `next` carries a non-zero code different from
/// `previous`.
fn new_error(previous: Option<&Value>, next: Option<&Value>) -> Option<i64> {
    let code = next.and_then(error_code)?;
    (previous.and_then(error_code) != Some(code)).then_some(code)
}
