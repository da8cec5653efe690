//! Shared configuration for the fieldlink tools.
//!
//! A TOML file (platform config dir or an explicit path) merged with
//! `FIELDLINK_`-prefixed environment variables, validated and translated
//! into the runtime types `fieldlink-core` consumes:
//! [`ManagerConfig`], [`StoreConfig`] and one [`DeviceEndpoint`] per
//! configured device.
//!
//! Nested keys are addressed from the environment with a double
//! underscore: `FIELDLINK_CONNECTION__GRACE_PERIOD=45s`.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use fieldlink_core::{
    DeviceEndpoint, DeviceType, KeepaliveConfig, MAX_HISTORY_HOURS, ManagerConfig, StoreConfig,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("device '{device}': unknown type '{tag}' (expected one of: curtain, fan, pump)")]
    UnknownDeviceType { device: String, tag: String },

    #[error("duplicate device {field} '{value}'")]
    DuplicateDevice { field: &'static str, value: String },

    #[error("no configured device named or addressed '{0}'")]
    UnknownDevice(String),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    /// Reconnect, grace period and keepalive tuning.
    #[serde(default)]
    pub connection: ConnectionSettings,

    /// Telemetry database.
    #[serde(default)]
    pub storage: StorageSettings,

    /// The managed fleet.
    #[serde(default)]
    pub devices: Vec<DeviceEntry>,
}

/// Durations are written the humantime way: `"5s"`, `"1m 30s"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ConnectionSettings {
    #[serde(default = "default_reconnect_delay", with = "duration")]
    pub reconnect_delay: Duration,

    #[serde(default = "default_grace_period", with = "duration")]
    pub grace_period: Duration,

    #[serde(default = "default_open_timeout", with = "duration")]
    pub open_timeout: Duration,

    #[serde(default = "default_ping_interval", with = "duration")]
    pub ping_interval: Duration,

    #[serde(default = "default_ping_timeout", with = "duration")]
    pub ping_timeout: Duration,

    /// Initial pump history window, in hours. At most
    /// [`MAX_HISTORY_HOURS`].
    #[serde(default = "default_history_hours")]
    pub history_hours: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: default_reconnect_delay(),
            grace_period: default_grace_period(),
            open_timeout: default_open_timeout(),
            ping_interval: default_ping_interval(),
            ping_timeout: default_ping_timeout(),
            history_hours: default_history_hours(),
        }
    }
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(5)
}
fn default_grace_period() -> Duration {
    Duration::from_secs(30)
}
fn default_open_timeout() -> Duration {
    Duration::from_secs(5)
}
fn default_ping_interval() -> Duration {
    Duration::from_secs(20)
}
fn default_ping_timeout() -> Duration {
    Duration::from_secs(20)
}
fn default_history_hours() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StorageSettings {
    /// Database file. Defaults to `telemetry.redb` in the platform data dir.
    pub path: Option<PathBuf>,

    #[serde(default = "default_join_timeout", with = "duration")]
    pub join_timeout: Duration,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: None,
            join_timeout: default_join_timeout(),
        }
    }
}

fn default_join_timeout() -> Duration {
    Duration::from_secs(5)
}

/// One managed device as written in the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceEntry {
    /// Operator-facing name, unique within the fleet.
    pub name: String,

    /// Network address; also the device's stable identifier.
    pub ip: String,

    /// Protocol tag: `curtain`, `fan` or `pump`.
    #[serde(rename = "type")]
    pub device_type: String,

    pub location: Option<String>,
}

impl DeviceEntry {
    pub fn parsed_type(&self) -> Result<DeviceType, ConfigError> {
        self.device_type
            .parse()
            .map_err(|_| ConfigError::UnknownDeviceType {
                device: self.name.clone(),
                tag: self.device_type.clone(),
            })
    }

    pub fn endpoint(&self) -> Result<DeviceEndpoint, ConfigError> {
        let device_type = self.parsed_type()?;
        DeviceEndpoint::from_ip(&self.ip, device_type).map_err(|e| ConfigError::Validation {
            field: format!("devices.{}.ip", self.name),
            reason: e.to_string(),
        })
    }
}

/// A validated device: config metadata plus its transport endpoint.
#[derive(Debug, Clone)]
pub struct ConfiguredDevice {
    pub name: String,
    pub location: Option<String>,
    pub endpoint: DeviceEndpoint,
}

// ── Validation and translation ──────────────────────────────────────

impl Config {
    /// Validate the device list: every type tag must be known, names and
    /// addresses must be unique.
    pub fn devices(&self) -> Result<Vec<ConfiguredDevice>, ConfigError> {
        let mut names = HashSet::new();
        let mut addresses = HashSet::new();
        let mut devices = Vec::with_capacity(self.devices.len());

        for entry in &self.devices {
            if entry.name.trim().is_empty() {
                return Err(ConfigError::Validation {
                    field: "devices.name".into(),
                    reason: format!("device at {} has an empty name", entry.ip),
                });
            }
            if !names.insert(entry.name.as_str()) {
                return Err(ConfigError::DuplicateDevice {
                    field: "name",
                    value: entry.name.clone(),
                });
            }
            if !addresses.insert(entry.ip.as_str()) {
                return Err(ConfigError::DuplicateDevice {
                    field: "address",
                    value: entry.ip.clone(),
                });
            }

            devices.push(ConfiguredDevice {
                name: entry.name.clone(),
                location: entry.location.clone(),
                endpoint: entry.endpoint()?,
            });
        }

        Ok(devices)
    }

    /// Look a device up by name, falling back to its address.
    pub fn find_device(&self, key: &str) -> Result<ConfiguredDevice, ConfigError> {
        let devices = self.devices()?;
        let by_name = devices.iter().position(|d| d.name == key);
        let index = by_name.or_else(|| devices.iter().position(|d| d.endpoint.id().as_str() == key));

        index
            .and_then(|i| devices.into_iter().nth(i))
            .ok_or_else(|| ConfigError::UnknownDevice(key.into()))
    }

    pub fn manager_config(&self) -> Result<ManagerConfig, ConfigError> {
        let c = &self.connection;
        if !(1..=MAX_HISTORY_HOURS).contains(&c.history_hours) {
            return Err(ConfigError::Validation {
                field: "connection.history_hours".into(),
                reason: format!("must be between 1 and {MAX_HISTORY_HOURS}"),
            });
        }
        if c.reconnect_delay.is_zero() {
            return Err(ConfigError::Validation {
                field: "connection.reconnect_delay".into(),
                reason: "must be greater than zero".into(),
            });
        }

        Ok(ManagerConfig {
            reconnect_delay: c.reconnect_delay,
            grace_period: c.grace_period,
            keepalive: KeepaliveConfig {
                open_timeout: c.open_timeout,
                ping_interval: c.ping_interval,
                ping_timeout: c.ping_timeout,
            },
            history_hours: c.history_hours,
            ..ManagerConfig::default()
        })
    }

    pub fn store_config(&self) -> StoreConfig {
        let path = self
            .storage
            .path
            .clone()
            .unwrap_or_else(default_store_path);
        let mut config = StoreConfig::new(path);
        config.join_timeout = self.storage.join_timeout;
        config
    }
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("io", "fieldlink", "fieldlink")
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("config.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Default location of the telemetry database.
pub fn default_store_path() -> PathBuf {
    project_dirs().map_or_else(
        || dirs_fallback().join("telemetry.redb"),
        |dirs| dirs.data_dir().join("telemetry.redb"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fieldlink");
    p
}

// ── Loading ─────────────────────────────────────────────────────────

/// Load from an explicit path + environment. A missing file yields the
/// defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    tracing::debug!(path = %path.display(), "loading config");

    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FIELDLINK_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Saving ──────────────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── humantime (de)serialization ─────────────────────────────────────

mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(|e| de::Error::custom(format!("'{raw}': {e}")))
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const FLEET: &str = r#"
[connection]
grace_period = "45s"
reconnect_delay = "2s"

[storage]
path = "/var/lib/fieldlink/telemetry.redb"

[[devices]]
name = "North curtain"
ip = "192.168.4.10"
type = "curtain"
location = "Greenhouse 2"

[[devices]]
name = "Vent"
ip = "192.168.4.20"
type = "fan"

[[devices]]
name = "Irrigation"
ip = "192.168.4.30"
type = "Pump"
"#;

    fn load(text: &str) -> Result<Config, ConfigError> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, text).unwrap();
        load_config_from(&path)
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.connection.grace_period, Duration::from_secs(30));
        assert!(config.devices.is_empty());
    }

    #[test]
    fn fleet_file_translates_to_runtime_configs() {
        let config = load(FLEET).unwrap();

        let manager = config.manager_config().unwrap();
        assert_eq!(manager.grace_period, Duration::from_secs(45));
        assert_eq!(manager.reconnect_delay, Duration::from_secs(2));
        assert_eq!(manager.keepalive.ping_interval, Duration::from_secs(20));
        assert_eq!(manager.history_hours, 1);

        let store = config.store_config();
        assert_eq!(store.path, PathBuf::from("/var/lib/fieldlink/telemetry.redb"));
        assert_eq!(store.join_timeout, Duration::from_secs(5));

        let devices = config.devices().unwrap();
        let urls: Vec<&str> = devices.iter().map(|d| d.endpoint.url().as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "ws://192.168.4.10/ws",
                "ws://192.168.4.20:81/",
                "ws://192.168.4.30/ws",
            ]
        );
        assert_eq!(devices[0].location.as_deref(), Some("Greenhouse 2"));
        assert_eq!(devices[2].endpoint.device_type(), DeviceType::Pump);
    }

    #[test]
    fn unknown_type_is_rejected() {
        let config = load(
            r#"
[[devices]]
name = "Boiler"
ip = "10.0.0.9"
type = "boiler"
"#,
        )
        .unwrap();

        let err = config.devices().unwrap_err();
        assert!(
            matches!(err, ConfigError::UnknownDeviceType { ref tag, .. } if tag == "boiler"),
            "got: {err:?}"
        );
    }

    #[test]
    fn duplicate_names_and_addresses_are_rejected() {
        let twice_named = load(
            r#"
[[devices]]
name = "Vent"
ip = "10.0.0.1"
type = "fan"

[[devices]]
name = "Vent"
ip = "10.0.0.2"
type = "fan"
"#,
        )
        .unwrap();
        assert!(matches!(
            twice_named.devices(),
            Err(ConfigError::DuplicateDevice { field: "name", .. })
        ));

        let twice_addressed = load(
            r#"
[[devices]]
name = "A"
ip = "10.0.0.1"
type = "fan"

[[devices]]
name = "B"
ip = "10.0.0.1"
type = "pump"
"#,
        )
        .unwrap();
        assert!(matches!(
            twice_addressed.devices(),
            Err(ConfigError::DuplicateDevice { field: "address", .. })
        ));
    }

    #[test]
    fn bad_duration_fails_to_load() {
        let err = load("[connection]\ngrace_period = \"soon\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Figment(_)), "got: {err:?}");
    }

    #[test]
    fn history_hours_outside_bounds_are_invalid() {
        for hours in [0, MAX_HISTORY_HOURS + 1, u32::MAX] {
            let config = load(&format!("[connection]\nhistory_hours = {hours}\n")).unwrap();
            assert!(
                matches!(config.manager_config(), Err(ConfigError::Validation { .. })),
                "{hours}"
            );
        }

        let config = load(&format!("[connection]\nhistory_hours = {MAX_HISTORY_HOURS}\n")).unwrap();
        assert_eq!(config.manager_config().unwrap().history_hours, MAX_HISTORY_HOURS);
    }

    #[test]
    fn find_device_by_name_or_address() {
        let config = load(FLEET).unwrap();
        assert_eq!(config.find_device("Vent").unwrap().endpoint.id().as_str(), "192.168.4.20");
        assert_eq!(config.find_device("192.168.4.30").unwrap().name, "Irrigation");
        assert!(matches!(
            config.find_device("Cellar"),
            Err(ConfigError::UnknownDevice(_))
        ));
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = load(FLEET).unwrap();

        save_config_to(&config, &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("grace_period = \"45s\""));

        assert_eq!(load_config_from(&path).unwrap(), config);
    }

    #[test]
    fn environment_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("config.toml", "[connection]\ngrace_period = \"45s\"\n")?;
            jail.set_env("FIELDLINK_CONNECTION__GRACE_PERIOD", "1m");
            jail.set_env("FIELDLINK_CONNECTION__HISTORY_HOURS", "6");

            let config = load_config_from(Path::new("config.toml")).unwrap();
            assert_eq!(config.connection.grace_period, Duration::from_secs(60));
            assert_eq!(config.connection.history_hours, 6);
            Ok(())
        });
    }
}
