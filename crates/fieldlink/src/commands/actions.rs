//! `fieldlink actions`: what `send` accepts per device type.

use serde::Serialize;
use strum::IntoEnumIterator;
use tabled::Tabled;

use fieldlink_core::DeviceType;
use fieldlink_core::command::actions;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct ActionSet {
    device_type: DeviceType,
    actions: &'static [&'static str],
}

#[derive(Tabled)]
struct ActionRow {
    #[tabled(rename = "Type")]
    device_type: String,
    #[tabled(rename = "Actions")]
    actions: String,
}

pub fn handle(global: &GlobalOpts) -> Result<(), CliError> {
    let sets: Vec<ActionSet> = DeviceType::iter()
        .map(|device_type| ActionSet {
            device_type,
            actions: actions(device_type),
        })
        .collect();

    let out = output::render_list(
        global.output,
        &sets,
        |s| ActionRow {
            device_type: s.device_type.to_string(),
            actions: s.actions.join(", "),
        },
        |s| format!("{}: {}", s.device_type, s.actions.join(" ")),
    )?;
    output::print_output(&out, global.quiet);
    Ok(())
}
