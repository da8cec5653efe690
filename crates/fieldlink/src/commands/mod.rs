//! Command dispatch: bridges CLI args -> core operations -> output formatting.

pub mod actions;
pub mod config_cmd;
pub mod devices;
pub mod history;
pub mod run;
pub mod send;

use std::path::Path;

use fieldlink_config::Config;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a config-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    config: &Config,
    config_path: &Path,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Run(args) => run::handle(args, config, config_path, global).await,
        Command::Devices => devices::handle(config, global),
        Command::History(args) => history::handle(&args, config, global).await,
        Command::Send(args) => send::handle(args, config, global).await,
        Command::Actions | Command::Config(_) | Command::Completions(_) => Err(
            CliError::Internal("command is handled before configuration is loaded".into()),
        ),
    }
}
