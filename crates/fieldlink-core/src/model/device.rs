// ── Device identity ──

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use url::Url;

use crate::error::CoreError;

// ── DeviceId ────────────────────────────────────────────────────────

/// Stable key for one device: its network address.
///
/// Used as the registry key and as the first half of the telemetry
/// primary key, so it must not change for the lifetime of the device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.to_owned()))
    }
}

impl From<&str> for DeviceId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for DeviceId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ── DeviceType ──────────────────────────────────────────────────────

/// The closed set of supported device protocols.
///
/// Dispatch on this tag selects the transport URI layout, the initial
/// state shape and the frame decoder.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum DeviceType {
    Curtain,
    Fan,
    Pump,
}

impl DeviceType {
    /// Transport URI for a device at `ip`.
    pub fn transport_url(self, ip: &str) -> Result<Url, CoreError> {
        let raw = match self {
            Self::Curtain | Self::Pump => format!("ws://{ip}/ws"),
            Self::Fan => format!("ws://{ip}:81"),
        };
        Url::parse(&raw).map_err(|e| CoreError::InvalidEndpoint {
            identifier: ip.to_owned(),
            reason: e.to_string(),
        })
    }

    /// Whether decoded frames of this type can carry telemetry samples.
    pub fn records_history(self) -> bool {
        matches!(self, Self::Pump)
    }
}

// ── DeviceEndpoint ──────────────────────────────────────────────────

/// Identity of one managed device. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEndpoint {
    id: DeviceId,
    device_type: DeviceType,
    url: Url,
}

impl DeviceEndpoint {
    /// Endpoint for a device reachable at `ip`, keyed by that address.
    pub fn from_ip(ip: &str, device_type: DeviceType) -> Result<Self, CoreError> {
        let url = device_type.transport_url(ip)?;
        Ok(Self {
            id: DeviceId::from(ip),
            device_type,
            url,
        })
    }

    /// Endpoint with an explicit transport URL (tests, proxies).
    pub fn with_url(id: impl Into<DeviceId>, device_type: DeviceType, url: Url) -> Self {
        Self {
            id: id.into(),
            device_type,
            url,
        }
    }

    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    pub fn device_type(&self) -> DeviceType {
        self.device_type
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn transport_urls_per_type() {
        assert_eq!(
            DeviceType::Curtain.transport_url("192.168.1.20").unwrap().as_str(),
            "ws://192.168.1.20/ws"
        );
        assert_eq!(
            DeviceType::Fan.transport_url("192.168.1.21").unwrap().as_str(),
            "ws://192.168.1.21:81/"
        );
        assert_eq!(
            DeviceType::Pump.transport_url("192.168.1.22").unwrap().as_str(),
            "ws://192.168.1.22/ws"
        );
    }

    #[test]
    fn invalid_address_is_rejected() {
        let err = DeviceType::Curtain.transport_url("not an address").unwrap_err();
        assert!(matches!(err, CoreError::InvalidEndpoint { .. }));
    }

    #[test]
    fn device_type_tags_parse_case_insensitively() {
        assert_eq!("pump".parse::<DeviceType>().unwrap(), DeviceType::Pump);
        assert_eq!("Curtain".parse::<DeviceType>().unwrap(), DeviceType::Curtain);
        assert!("valve".parse::<DeviceType>().is_err());
        assert_eq!(DeviceType::Fan.to_string(), "fan");
    }

    #[test]
    fn endpoint_is_keyed_by_address() {
        let endpoint = DeviceEndpoint::from_ip("10.0.0.5", DeviceType::Fan).unwrap();
        assert_eq!(endpoint.id().as_str(), "10.0.0.5");
        assert_eq!(endpoint.url().port(), Some(81));
    }
}
