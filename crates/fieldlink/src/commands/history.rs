//! `fieldlink history`: recorded pump current samples.

use chrono::Utc;
use tabled::Tabled;

use fieldlink_config::Config;
use fieldlink_core::{HistoryPoint, HistoryWindow, TelemetryStore};

use crate::cli::{GlobalOpts, HistoryArgs};
use crate::error::CliError;
use crate::output;

#[derive(Tabled)]
struct SampleRow {
    #[tabled(rename = "Time (UTC)")]
    time: String,
    #[tabled(rename = "Current (A)")]
    value: String,
}

pub async fn handle(args: &HistoryArgs, config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let device = config.find_device(&args.device)?;
    let device_type = device.endpoint.device_type();
    if !device_type.records_history() {
        return Err(CliError::Validation {
            field: "device".into(),
            reason: format!("{} is a {device_type}; only pumps record history", device.name),
        });
    }

    let store_config = config.store_config();
    let path = store_config.path.display().to_string();
    let id = device.endpoint.id().clone();
    let since = HistoryWindow::new(args.hours).cutoff(Utc::now());

    // redb is synchronous; keep it off the runtime threads.
    let points = tokio::task::spawn_blocking(move || {
        let store = TelemetryStore::open(store_config);
        if !store.is_available() {
            return Err(CliError::StoreUnavailable { path });
        }
        let points = store.query(&id, since);
        store.shutdown();
        Ok(points?)
    })
    .await
    .map_err(|e| CliError::Internal(format!("history query task failed: {e}")))??;

    tracing::debug!(device = %device.name, count = points.len(), "history loaded");

    let out = output::render_list(
        global.output,
        &points,
        |p: &HistoryPoint| SampleRow {
            time: p.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            value: format!("{:.2}", p.value),
        },
        |p| format!("{}\t{}", p.timestamp.to_rfc3339(), p.value),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
