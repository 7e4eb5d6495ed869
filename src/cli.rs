// src/cli.rs

//! CLI argument parsing using `clap`.

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};

use crate::engine::PhaseRole;

/// Command-line arguments for `plmflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "plmflow",
    version,
    about = "Instantiate PLM project templates and schedule their tasks.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Plmflow.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = "Plmflow.toml")]
    pub config: String,

    /// Template id, i.e. the `<id>` of a `[template.<id>]` section.
    #[arg(long, value_name = "ID")]
    pub template: String,

    /// Project start date (YYYY-MM-DD).
    #[arg(long, value_name = "DATE")]
    pub start: NaiveDate,

    /// Do not count Saturdays and Sundays as working days.
    #[arg(long)]
    pub skip_weekends: bool,

    /// Phase role holder, e.g. `evt:pm=alice`. May be repeated.
    #[arg(long = "role", value_name = "PHASE:ROLE=USER")]
    pub roles: Vec<PhaseRole>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `PLMFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Validate and print the computed calendar, but create nothing.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
