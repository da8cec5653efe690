//! `fieldlink devices`: the configured fleet.

use serde::Serialize;
use tabled::Tabled;

use fieldlink_config::{Config, ConfiguredDevice};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct DeviceView {
    name: String,
    address: String,
    #[serde(rename = "type")]
    device_type: String,
    location: Option<String>,
    url: String,
    records_history: bool,
}

impl From<&ConfiguredDevice> for DeviceView {
    fn from(d: &ConfiguredDevice) -> Self {
        Self {
            name: d.name.clone(),
            address: d.endpoint.id().to_string(),
            device_type: d.endpoint.device_type().to_string(),
            location: d.location.clone(),
            url: d.endpoint.url().to_string(),
            records_history: d.endpoint.device_type().records_history(),
        }
    }
}

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    device_type: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "URL")]
    url: String,
}

impl From<&DeviceView> for DeviceRow {
    fn from(d: &DeviceView) -> Self {
        Self {
            name: d.name.clone(),
            device_type: d.device_type.clone(),
            address: d.address.clone(),
            location: d.location.clone().unwrap_or_else(|| "-".into()),
            url: d.url.clone(),
        }
    }
}

pub fn handle(config: &Config, global: &GlobalOpts) -> Result<(), CliError> {
    let views: Vec<DeviceView> = config.devices()?.iter().map(DeviceView::from).collect();
    let out = output::render_list(global.output, &views, |d| DeviceRow::from(d), |d| d.name.clone())?;
    output::print_output(&out, global.quiet);
    Ok(())
}
