//! Device-specific controller APIs on top of
//! [`ConnectionManager::send`].
//!
//! Each controller borrows a manager of the matching type and turns
//! named operations into wire commands. [`parse_action`] does the same
//! for free-form `action value...` input from the CLI.

use fieldlink_api::{CurtainCommand, DeviceCommand, FanCommand, PumpCommand};

use crate::connection::ConnectionManager;
use crate::error::CoreError;
use crate::model::DeviceType;

impl ConnectionManager {
    /// Curtain controls, if this manager drives a curtain.
    pub fn curtain(&self) -> Result<CurtainControl<'_>, CoreError> {
        self.expect_type(DeviceType::Curtain, "curtain controls")?;
        Ok(CurtainControl { manager: self })
    }

    /// Fan controls, if this manager drives a fan unit.
    pub fn fan(&self) -> Result<FanControl<'_>, CoreError> {
        self.expect_type(DeviceType::Fan, "fan controls")?;
        Ok(FanControl { manager: self })
    }

    /// Pump controls, if this manager drives a pump.
    pub fn pump(&self) -> Result<PumpControl<'_>, CoreError> {
        self.expect_type(DeviceType::Pump, "pump controls")?;
        Ok(PumpControl { manager: self })
    }

    fn expect_type(&self, expected: DeviceType, operation: &str) -> Result<(), CoreError> {
        if self.device_type() == expected {
            Ok(())
        } else {
            Err(CoreError::Unsupported {
                operation: operation.to_owned(),
                device_type: self.device_type(),
            })
        }
    }
}

// ── Curtain ──────────────────────────────────────────────────────────

pub struct CurtainControl<'a> {
    manager: &'a ConnectionManager,
}

impl CurtainControl<'_> {
    pub async fn open(&self) -> Result<(), CoreError> {
        self.manager.send(CurtainCommand::Open).await
    }

    pub async fn close(&self) -> Result<(), CoreError> {
        self.manager.send(CurtainCommand::Close).await
    }

    pub async fn stop(&self) -> Result<(), CoreError> {
        self.manager.send(CurtainCommand::Stop).await
    }

    /// Move to `percent` (0 = closed, 100 = open).
    pub async fn goto(&self, percent: i64) -> Result<(), CoreError> {
        self.manager.send(CurtainCommand::Goto { value: percent }).await
    }

    pub async fn calibrate_full(&self) -> Result<(), CoreError> {
        self.manager.send(CurtainCommand::CalibrateFull).await
    }

    pub async fn reset_error(&self) -> Result<(), CoreError> {
        self.manager.send(CurtainCommand::ResetError).await
    }
}

// ── Fan ──────────────────────────────────────────────────────────────

pub struct FanControl<'a> {
    manager: &'a ConnectionManager,
}

impl FanControl<'_> {
    pub async fn set_auto(&self, enabled: bool) -> Result<(), CoreError> {
        self.manager.send(FanCommand::auto(enabled)).await
    }

    pub async fn start(&self, fan: u8) -> Result<(), CoreError> {
        self.manager.send(FanCommand::Start { fan }).await
    }

    pub async fn stop(&self, fan: u8) -> Result<(), CoreError> {
        self.manager.send(FanCommand::Stop { fan }).await
    }

    pub async fn set_speed(&self, fan: u8, speed: i64) -> Result<(), CoreError> {
        self.manager.send(FanCommand::Speed { fan, value: speed }).await
    }

    pub async fn reset_error(&self, fan: u8) -> Result<(), CoreError> {
        self.manager.send(FanCommand::ResetError { fan }).await
    }
}

// ── Pump ─────────────────────────────────────────────────────────────

pub struct PumpControl<'a> {
    manager: &'a ConnectionManager,
}

impl PumpControl<'_> {
    pub async fn manual_start(&self) -> Result<(), CoreError> {
        self.manager.send(PumpCommand::ManualStart).await
    }

    pub async fn manual_stop(&self) -> Result<(), CoreError> {
        self.manager.send(PumpCommand::ManualStop).await
    }

    pub async fn manual_reverse(&self) -> Result<(), CoreError> {
        self.manager.send(PumpCommand::ManualReverse).await
    }

    pub async fn reset_error(&self) -> Result<(), CoreError> {
        self.manager.send(PumpCommand::ResetError).await
    }

    pub async fn set_mode(&self, mode: i64) -> Result<(), CoreError> {
        self.manager.send(PumpCommand::SetMode { value: mode }).await
    }

    pub async fn set_speed(&self, speed: i64) -> Result<(), CoreError> {
        self.manager.send(PumpCommand::SetSpeed { value: speed }).await
    }

    /// Timer settings for automatic mode.
    pub async fn set_auto_settings(
        &self,
        run_time: i64,
        stop_time: i64,
        auto_speed: i64,
    ) -> Result<(), CoreError> {
        self.manager
            .send(PumpCommand::SetAutoSettings {
                run_time,
                stop_time,
                auto_speed,
            })
            .await
    }

    /// Reload the in-memory history window for a new period.
    pub async fn set_history_period(&self, hours: u32) -> Result<(), CoreError> {
        self.manager.set_history_period(hours).await
    }
}

// ── Free-form actions ────────────────────────────────────────────────

/// Actions accepted by [`parse_action`], per device type.
pub fn actions(device_type: DeviceType) -> &'static [&'static str] {
    match device_type {
        DeviceType::Curtain => &["open", "close", "stop", "goto", "calibrate_full", "reset_error"],
        DeviceType::Fan => &["auto", "start", "stop", "speed", "reset_error"],
        DeviceType::Pump => &[
            "manual_start",
            "manual_stop",
            "manual_reverse",
            "reset_error",
            "set_mode",
            "set_speed",
            "set_auto_settings",
        ],
    }
}

/// Build a command from an action name and integer arguments.
///
/// Fan actions that address a single fan take the fan number first
/// (`speed 1 42`); `auto` takes `1`/`0`.
pub fn parse_action(
    device_type: DeviceType,
    action: &str,
    args: &[i64],
) -> Result<DeviceCommand, CoreError> {
    let action = action.trim().to_ascii_lowercase().replace('-', "_");
    let command: DeviceCommand = match (device_type, action.as_str(), args) {
        (DeviceType::Curtain, "open", []) => CurtainCommand::Open.into(),
        (DeviceType::Curtain, "close", []) => CurtainCommand::Close.into(),
        (DeviceType::Curtain, "stop", []) => CurtainCommand::Stop.into(),
        (DeviceType::Curtain, "goto", [percent]) => CurtainCommand::Goto { value: *percent }.into(),
        (DeviceType::Curtain, "calibrate_full", []) => CurtainCommand::CalibrateFull.into(),
        (DeviceType::Curtain, "reset_error", []) => CurtainCommand::ResetError.into(),

        (DeviceType::Fan, "auto", [flag]) => FanCommand::auto(*flag != 0).into(),
        (DeviceType::Fan, "start", [fan]) => FanCommand::Start { fan: fan_address(*fan)? }.into(),
        (DeviceType::Fan, "stop", [fan]) => FanCommand::Stop { fan: fan_address(*fan)? }.into(),
        (DeviceType::Fan, "speed", [fan, speed]) => FanCommand::Speed {
            fan: fan_address(*fan)?,
            value: *speed,
        }
        .into(),
        (DeviceType::Fan, "reset_error", [fan]) => {
            FanCommand::ResetError { fan: fan_address(*fan)? }.into()
        }

        (DeviceType::Pump, "manual_start", []) => PumpCommand::ManualStart.into(),
        (DeviceType::Pump, "manual_stop", []) => PumpCommand::ManualStop.into(),
        (DeviceType::Pump, "manual_reverse", []) => PumpCommand::ManualReverse.into(),
        (DeviceType::Pump, "reset_error", []) => PumpCommand::ResetError.into(),
        (DeviceType::Pump, "set_mode", [mode]) => PumpCommand::SetMode { value: *mode }.into(),
        (DeviceType::Pump, "set_speed", [speed]) => PumpCommand::SetSpeed { value: *speed }.into(),
        (DeviceType::Pump, "set_auto_settings", [run_time, stop_time, auto_speed]) => {
            PumpCommand::SetAutoSettings {
                run_time: *run_time,
                stop_time: *stop_time,
                auto_speed: *auto_speed,
            }
            .into()
        }

        _ => {
            let known = actions(device_type);
            let message = if known.contains(&action.as_str()) {
                format!("wrong number of values for {device_type} action '{action}'")
            } else {
                format!(
                    "unknown {device_type} action '{action}' (expected one of: {})",
                    known.join(", ")
                )
            };
            return Err(CoreError::InvalidCommand { message });
        }
    };
    Ok(command)
}

fn fan_address(fan: i64) -> Result<u8, CoreError> {
    match fan {
        0..=2 => u8::try_from(fan).map_err(|e| CoreError::InvalidCommand {
            message: e.to_string(),
        }),
        other => Err(CoreError::InvalidCommand {
            message: format!("fan address must be 0, 1 or 2, got {other}"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_device_family() {
        assert_eq!(
            parse_action(DeviceType::Curtain, "goto", &[40]).unwrap(),
            DeviceCommand::Curtain(CurtainCommand::Goto { value: 40 })
        );
        assert_eq!(
            parse_action(DeviceType::Fan, "speed", &[2, 70]).unwrap(),
            DeviceCommand::Fan(FanCommand::Speed { fan: 2, value: 70 })
        );
        assert_eq!(
            parse_action(DeviceType::Pump, "set-auto-settings", &[30, 60, 45]).unwrap(),
            DeviceCommand::Pump(PumpCommand::SetAutoSettings {
                run_time: 30,
                stop_time: 60,
                auto_speed: 45
            })
        );
    }

    #[test]
    fn fan_auto_takes_a_flag() {
        assert_eq!(
            parse_action(DeviceType::Fan, "auto", &[0]).unwrap(),
            DeviceCommand::Fan(FanCommand::auto(false))
        );
    }

    #[test]
    fn wrong_arity_and_unknown_actions_are_rejected() {
        let err = parse_action(DeviceType::Curtain, "goto", &[]).unwrap_err();
        assert!(err.to_string().contains("wrong number of values"));

        let err = parse_action(DeviceType::Pump, "open", &[]).unwrap_err();
        assert!(err.to_string().contains("manual_start"));
    }

    #[test]
    fn fan_address_is_bounded() {
        assert!(parse_action(DeviceType::Fan, "start", &[3]).is_err());
        assert!(parse_action(DeviceType::Fan, "start", &[-1]).is_err());
    }
}
