//! `fieldlink run`: supervise the configured fleet until Ctrl-C.
//!
//! One registry holds a connection manager per device. Every event is
//! printed as it arrives (a status line, or JSON lines with `-o json`),
//! notices are forwarded to the log sink, and Ctrl-C stops the managers
//! and drains the telemetry writer before exiting.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use chrono::Local;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fieldlink_config::Config;
use fieldlink_core::{
    DeviceEvent, DeviceId, DeviceRegistry, TelemetryStore, WsConnector, spawn_forwarder,
};

use crate::cli::{GlobalOpts, OutputFormat, RunArgs};
use crate::error::CliError;
use crate::output;
use crate::sink::LogSink;

pub async fn handle(
    args: RunArgs,
    config: &Config,
    config_path: &Path,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let devices = if args.devices.is_empty() {
        config.devices()?
    } else {
        args.devices
            .iter()
            .map(|key| config.find_device(key))
            .collect::<Result<Vec<_>, _>>()?
    };
    if devices.is_empty() {
        return Err(CliError::NoDevices {
            path: config_path.display().to_string(),
        });
    }

    let manager_config = config.manager_config()?;
    let store_config = config.store_config();
    let store = tokio::task::spawn_blocking(move || TelemetryStore::open(store_config))
        .await
        .map_err(|e| CliError::Internal(format!("telemetry store task failed: {e}")))?;
    if !store.is_available() {
        warn!(
            path = %store.config().path.display(),
            "telemetry store unavailable, pump samples will not be persisted"
        );
    }

    let connector = WsConnector::new(manager_config.keepalive.clone());
    let registry = DeviceRegistry::new(connector, manager_config, store.clone());
    for device in &devices {
        registry.register(device.endpoint.clone())?;
    }

    let cancel = CancellationToken::new();
    let forwarder = spawn_forwarder(
        registry.subscribe(),
        Arc::new(LogSink::new(&devices)),
        cancel.clone(),
    );

    let names: HashMap<DeviceId, String> = devices
        .iter()
        .map(|d| (d.endpoint.id().clone(), d.name.clone()))
        .collect();
    let color = output::should_color(global.color);
    let mut events = registry.event_stream();

    registry.connect_all();
    info!(devices = registry.len(), "supervising devices");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    warn!(error = %e, "could not listen for Ctrl-C");
                }
                break;
            }
            next = events.next() => match next {
                Some(Ok(event)) => {
                    let name = names.get(&event.device_id).map_or(event.device_id.as_str(), String::as_str);
                    let line = render_event(&event, name, global.output, color)?;
                    output::print_output(&line, global.quiet);
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    warn!(skipped, "event output fell behind");
                }
                None => break,
            }
        }
    }

    info!("shutting down");
    registry.shutdown().await;
    cancel.cancel();
    if let Err(e) = forwarder.await {
        warn!(error = %e, "notification forwarder ended abnormally");
    }

    let report = tokio::task::spawn_blocking(move || store.shutdown())
        .await
        .map_err(|e| CliError::Internal(format!("telemetry shutdown task failed: {e}")))?;
    if report.drained {
        info!("telemetry flushed");
    } else {
        warn!(lost = report.lost, "telemetry writer did not drain in time");
    }

    Ok(())
}

/// One output line for an event.
fn render_event(
    event: &DeviceEvent,
    name: &str,
    format: OutputFormat,
    color: bool,
) -> Result<String, CliError> {
    match format {
        OutputFormat::Json | OutputFormat::JsonCompact => output::render_json(event, true),
        OutputFormat::Table | OutputFormat::Plain => {
            let time = Local::now().format("%H:%M:%S");
            let status = output::status_label(event.status, color);
            Ok(format!("{time} {name:<16} {status} {}", summary(event)?))
        }
    }
}

fn summary(event: &DeviceEvent) -> Result<String, CliError> {
    if let Some(notice) = &event.notice {
        return Ok(format!("[{}] {}", notice.kind, notice.text));
    }
    let latest = event
        .state
        .history()
        .and_then(|h| h.latest())
        .filter(|_| event.state.is_empty());
    if let Some(latest) = latest {
        return Ok(format!("current {:.2} A", latest.value));
    }
    Ok(serde_json::to_string(event.state.fields())?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use chrono::Utc;
    use fieldlink_core::{
        DeviceState, HistoryPoint, HistoryWindow, LinkStatus, Notice, NoticeKind,
    };
    use serde_json::json;

    fn event(state: DeviceState, status: LinkStatus, notice: Option<Notice>) -> DeviceEvent {
        DeviceEvent {
            device_id: "192.168.4.10".into(),
            state: Arc::new(state),
            status,
            notice,
        }
    }

    fn fields(value: serde_json::Value) -> DeviceState {
        match value {
            serde_json::Value::Object(map) => DeviceState::from_fields(map),
            _ => unreachable!(),
        }
    }

    #[test]
    fn notice_text_wins_over_state() {
        let e = event(
            fields(json!({"state": "open"})),
            LinkStatus::Error,
            Some(Notice::new(NoticeKind::LinkLost, "Device is not responding.")),
        );
        assert_eq!(summary(&e).unwrap(), "[link_lost] Device is not responding.");
    }

    #[test]
    fn state_is_rendered_as_compact_json() {
        let e = event(fields(json!({"position_percent": 40})), LinkStatus::Connected, None);
        let line = render_event(&e, "North curtain", OutputFormat::Table, false).unwrap();
        assert!(line.ends_with(r#"North curtain    connected    {"position_percent":40}"#), "{line}");
    }

    #[test]
    fn pump_without_fields_shows_latest_current() {
        let window = HistoryWindow::from_points(
            1,
            [HistoryPoint {
                timestamp: Utc::now(),
                value: 3.25,
            }],
        );
        let e = event(DeviceState::default().with_history(window), LinkStatus::Connected, None);
        assert_eq!(summary(&e).unwrap(), "current 3.25 A");
    }

    #[test]
    fn json_output_is_one_line_per_event() {
        let e = event(fields(json!({"state": "open"})), LinkStatus::Reconnected, None);
        let line = render_event(&e, "North curtain", OutputFormat::Json, false).unwrap();
        assert!(!line.contains('\n'));
        assert!(line.contains(r#""status":"reconnected""#));
    }
}
