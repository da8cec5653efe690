//! Curtain frames are complete state snapshots: every frame replaces the
//! whole state, nothing is inherited.

use fieldlink_api::wire;

use crate::error::CoreError;
use crate::model::DeviceState;

pub fn decode(_previous: &DeviceState, frame: &str) -> Result<DeviceState, CoreError> {
    let object = wire::parse_object(frame)?;
    Ok(DeviceState::from_fields(object))
}
