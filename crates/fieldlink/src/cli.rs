//! Clap derive structures for the `fieldlink` CLI.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use fieldlink_core::MAX_HISTORY_HOURS;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// fieldlink -- supervise curtain, fan and pump controllers
#[derive(Debug, Parser)]
#[command(
    name = "fieldlink",
    version,
    about = "Supervise greenhouse curtain, fan and pump controllers",
    long_about = "Keeps a WebSocket link to every configured field controller,\n\
        reconnecting through outages, records pump current telemetry and\n\
        reports link loss, recovery and equipment faults.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config directory)
    #[arg(long, env = "FIELDLINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'o', default_value = "table", global = true)]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Connect to every configured device and report events until Ctrl-C
    Run(RunArgs),

    /// List configured devices and their transport URLs
    #[command(alias = "ls")]
    Devices,

    /// Show recorded pump current samples
    History(HistoryArgs),

    /// Connect, send one command and disconnect
    Send(SendArgs),

    /// List the actions `send` accepts for each device type
    Actions,

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Only supervise these devices (name or address); repeatable
    #[arg(long = "device", short = 'd')]
    pub devices: Vec<String>,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Device name or address
    pub device: String,

    /// How far back to look, in hours (at most one year)
    #[arg(
        long,
        default_value = "1",
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_HISTORY_HOURS))
    )]
    pub hours: u32,
}

#[derive(Debug, Args)]
pub struct SendArgs {
    /// Device name or address
    pub device: String,

    /// Action name, e.g. `open`, `speed`, `set_auto_settings`
    pub action: String,

    /// Integer arguments for the action
    #[arg(allow_negative_numbers = true)]
    pub values: Vec<i64>,

    /// How long to wait for the device to accept the connection
    #[arg(long, default_value = "10s", value_parser = humantime::parse_duration)]
    pub timeout: Duration,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a config file with defaults and an example device
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the config file path
    Path,

    /// Display the resolved configuration
    Show,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}
