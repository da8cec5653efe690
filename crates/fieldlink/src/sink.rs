//! Notification sink that writes operator messages to the log.

use std::collections::HashMap;

use fieldlink_config::ConfiguredDevice;
use fieldlink_core::{DeviceId, Notification, NotificationSink, Severity};

/// Logs each notification with the device's configured name and location.
pub struct LogSink {
    labels: HashMap<DeviceId, String>,
}

impl LogSink {
    pub fn new(devices: &[ConfiguredDevice]) -> Self {
        let labels = devices
            .iter()
            .map(|d| {
                let label = match &d.location {
                    Some(location) => format!("{} ({location})", d.name),
                    None => d.name.clone(),
                };
                (d.endpoint.id().clone(), label)
            })
            .collect();
        Self { labels }
    }

    fn describe(&self, notification: &Notification) -> String {
        let label = self
            .labels
            .get(&notification.device_id)
            .map_or_else(|| notification.device_id.to_string(), Clone::clone);
        format!("{label}: {}", notification.text)
    }
}

impl NotificationSink for LogSink {
    fn notify(&self, notification: &Notification) {
        let message = self.describe(notification);
        let device = notification.device_id.as_str();
        let kind = &notification.kind;
        match notification.severity {
            Severity::Info => tracing::info!(device, kind = %kind, "{message}"),
            Severity::Warning => tracing::warn!(device, kind = %kind, "{message}"),
            Severity::Error => tracing::error!(device, kind = %kind, "{message}"),
        }
    }
}
