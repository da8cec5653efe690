// ── Runtime configuration for fieldlink-core ──
//
// These types carry resolved, validated values. The core never reads
// files or environment variables; `fieldlink-config` builds these from
// the on-disk config and hands them in.

use std::path::PathBuf;
use std::time::Duration;

use fieldlink_api::KeepaliveConfig;

/// Tuning for every [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Fixed delay between reconnect attempts while the operator wants
    /// the device connected. Default: 5s.
    pub reconnect_delay: Duration,

    /// How long a device may stay unreachable before the operator is
    /// told. Default: 30s.
    pub grace_period: Duration,

    /// Open timeout and keepalive for the production transport.
    pub keepalive: KeepaliveConfig,

    /// Initial length of the in-memory pump history window, in hours.
    pub history_hours: u32,

    /// Capacity of each manager's event broadcast channel.
    pub event_capacity: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(5),
            grace_period: Duration::from_secs(30),
            keepalive: KeepaliveConfig::default(),
            history_hours: 1,
            event_capacity: 256,
        }
    }
}

/// Where and how the [`TelemetryStore`](crate::TelemetryStore) runs.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database file. Parent directories are created on open.
    pub path: PathBuf,

    /// Upper bound on waiting for the writer to drain at shutdown.
    /// Default: 5s.
    pub join_timeout: Duration,

    /// How often an idle writer wakes to check for shutdown. Default: 1s.
    pub poll_interval: Duration,
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            join_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_secs(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_defaults() {
        let config = ManagerConfig::default();
        assert_eq!(config.reconnect_delay, Duration::from_secs(5));
        assert_eq!(config.grace_period, Duration::from_secs(30));
        assert_eq!(config.keepalive.open_timeout, Duration::from_secs(5));
        assert_eq!(config.history_hours, 1);
    }

    #[test]
    fn store_defaults() {
        let config = StoreConfig::new("/tmp/telemetry.redb");
        assert_eq!(config.join_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, Duration::from_secs(1));
    }
}
