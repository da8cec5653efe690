//! Config subcommand handlers.

use std::path::Path;

use fieldlink_config::{Config, DeviceEntry};

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

/// Starter config: defaults plus one example device.
fn starter_config() -> Config {
    Config {
        devices: vec![DeviceEntry {
            name: "North curtain".into(),
            ip: "192.168.4.10".into(),
            device_type: "curtain".into(),
            location: Some("Greenhouse 1".into()),
        }],
        ..Config::default()
    }
}

pub fn handle(args: ConfigArgs, path: &Path, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                return Err(CliError::ConfigExists {
                    path: path.display().to_string(),
                });
            }
            fieldlink_config::save_config_to(&starter_config(), path)?;
            tracing::info!(path = %path.display(), "config written");
            if !global.quiet {
                eprintln!("Config written to {}", path.display());
                eprintln!("Edit the [[devices]] list, then run: fieldlink run");
            }
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&path.display().to_string(), global.quiet);
            Ok(())
        }

        ConfigCommand::Show => {
            let config = fieldlink_config::load_config_from(path)?;
            // Surface validation problems the same way `run` would.
            config.devices()?;
            config.manager_config()?;

            let out = match global.output {
                OutputFormat::Json => output::render_json(&config, false)?,
                OutputFormat::JsonCompact => output::render_json(&config, true)?,
                OutputFormat::Table | OutputFormat::Plain => toml::to_string_pretty(&config)
                    .map_err(|e| CliError::Internal(format!("failed to render config: {e}")))?,
            };
            output::print_output(out.trim_end(), global.quiet);
            Ok(())
        }
    }
}
