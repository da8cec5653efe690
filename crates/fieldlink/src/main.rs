mod cli;
mod commands;
mod error;
mod output;
mod sink;

use std::path::Path;

use clap::Parser;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Held until exit so buffered file logs are flushed.
    let _guard = init_tracing(cli.global.verbose, cli.global.log_file.as_deref());

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
            let name = path.file_name().unwrap_or(std::ffi::OsStr::new("fieldlink.log"));
            let appender =
                tracing_appender::rolling::never(dir.unwrap_or_else(|| Path::new(".")), name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .init();

    guard
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config_path = cli
        .global
        .config
        .clone()
        .unwrap_or_else(fieldlink_config::config_path);

    match cli.command {
        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "fieldlink", &mut std::io::stdout());
            Ok(())
        }

        Command::Actions => commands::actions::handle(&cli.global),

        Command::Config(args) => commands::config_cmd::handle(args, &config_path, &cli.global),

        cmd => {
            let config = fieldlink_config::load_config_from(&config_path)?;
            tracing::debug!(command = ?cmd, path = %config_path.display(), "dispatching command");
            commands::dispatch(cmd, &config, &config_path, &cli.global).await
        }
    }
}
