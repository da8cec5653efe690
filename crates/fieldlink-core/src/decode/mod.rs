//! Frame decoders: pure reducers from `(previous state, raw frame)` to a
//! new canonical state.
//!
//! Each device type has its own module. [`decode`] dispatches on the
//! closed [`DeviceType`] tag and runs equipment fault detection over the
//! before/after pair. Nothing here touches shared state or I/O; the
//! connection manager adopts the returned state and forwards any sample
//! to the telemetry store.
//!
//! Malformed frames come back as [`CoreError::Protocol`]; the caller
//! keeps its previous state.

pub mod curtain;
pub mod fan;
pub mod faults;
pub mod pump;

use chrono::{DateTime, Utc};

use crate::error::CoreError;
use crate::model::{DeviceId, DeviceState, DeviceType, TelemetrySample};

/// Result of decoding one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub state: DeviceState,
    /// Measurement to persist, if the frame carried one.
    pub sample: Option<TelemetrySample>,
    /// Operator-facing alarms raised by this transition.
    pub faults: Vec<String>,
}

/// Decode one inbound frame for a device of `device_type`.
///
/// `now` stamps any telemetry sample and anchors the pump history
/// window, so the same inputs always give the same output.
pub fn decode(
    device_type: DeviceType,
    device_id: &DeviceId,
    previous: &DeviceState,
    frame: &str,
    now: DateTime<Utc>,
) -> Result<Decoded, CoreError> {
    let (state, sample) = match device_type {
        DeviceType::Curtain => (curtain::decode(previous, frame)?, None),
        DeviceType::Fan => (fan::decode(previous, frame)?, None),
        DeviceType::Pump => {
            let decoded = pump::decode(previous, frame, now)?;
            let sample = decoded
                .sample
                .map(|value| TelemetrySample::new(device_id.clone(), now, value));
            (decoded.state, sample)
        }
    };

    let faults = faults::detect(device_type, previous, &state);
    Ok(Decoded {
        state,
        sample,
        faults,
    })
}
