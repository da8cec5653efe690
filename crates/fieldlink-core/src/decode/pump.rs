//! Pump frames come in three shapes: a full snapshot (carries
//! `controlMode`), a partial update, or a current measurement. Snapshots
//! replace the reported fields, partials merge key by key, and samples
//! only extend the rolling history window.
//!
//! Two derived attributes survive every frame: the history window and the
//! last start time. The start time is stamped on an off→on transition of
//! `pumpOn` and otherwise carried over, unless the device itself reports
//! `last_start_time` (an RFC 3339 string, or `null` to clear it).

use chrono::{DateTime, Utc};
use fieldlink_api::wire::{self, PumpFrame};
use serde_json::Value;

use crate::error::CoreError;
use crate::model::state::is_truthy;
use crate::model::{DeviceState, HistoryPoint, HistoryWindow};

const PUMP_ON: &str = "pumpOn";
const LAST_START: &str = "last_start_time";

/// Output of the pump reducer. `sample` is the measured current, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct PumpDecoded {
    pub state: DeviceState,
    pub sample: Option<f64>,
}

/// A pump that has reported nothing, with an empty history window.
pub fn initial_state(history_hours: u32) -> DeviceState {
    DeviceState::default().with_history(HistoryWindow::new(history_hours))
}

pub fn decode(
    previous: &DeviceState,
    frame: &str,
    now: DateTime<Utc>,
) -> Result<PumpDecoded, CoreError> {
    let object = wire::parse_object(frame)?;

    let state = match PumpFrame::classify(object)? {
        PumpFrame::CurrentSample { value } => {
            let mut state = previous.clone();
            if state.history().is_none() {
                state = state.with_history(HistoryWindow::new(1));
            }
            if let Some(window) = state.history_mut() {
                window.push(HistoryPoint { timestamp: now, value }, now);
            }
            return Ok(PumpDecoded {
                state,
                sample: Some(value),
            });
        }
        PumpFrame::Snapshot(fields) => {
            let mut state = DeviceState::from_fields(fields);
            if let Some(window) = previous.history() {
                state = state.with_history(window.clone());
            }
            state
        }
        PumpFrame::Partial(fields) => {
            let mut state = previous.clone();
            state.fields_mut().extend(fields);
            state
        }
    };

    Ok(PumpDecoded {
        state: track_last_start(previous, state, now),
        sample: None,
    })
}

fn track_last_start(previous: &DeviceState, mut state: DeviceState, now: DateTime<Utc>) -> DeviceState {
    let reported = state.fields_mut().remove(LAST_START).map(|v| parse_reported(&v));

    let was_on = previous.get(PUMP_ON).is_some_and(is_truthy);
    let is_on = state.get(PUMP_ON).is_some_and(is_truthy);

    let last_start = if is_on && !was_on {
        Some(now)
    } else if let Some(reported) = reported {
        reported
    } else {
        previous.last_start()
    };
    state.set_last_start(last_start);
    state
}

fn parse_reported(value: &Value) -> Option<DateTime<Utc>> {
    let text = value.as_str()?;
    match DateTime::parse_from_rfc3339(text) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(e) => {
            tracing::debug!(value = %text, error = %e, "ignoring unparseable last_start_time");
            None
        }
    }
}
