// src/cli.rs

//! CLI argument parsing using `clap`.

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

/// Command-line arguments for `script-launcher`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "script-launcher",
    version,
    about = "Run scripts manually or on recurring and one-time schedules.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    #[arg(long, global = true, value_name = "PATH", default_value = "ScriptLauncher.toml")]
    pub config: String,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `SCRIPT_LAUNCHER_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Start the scheduler and stream script logs until Ctrl-C.
    Serve,

    /// Run one script now and wait for it. Exits non-zero if the run fails.
    Run {
        /// Script name as used in `[script.<name>]`.
        #[arg(value_name = "NAME")]
        name: String,
    },

    /// Print the script log of one day.
    Logs {
        /// Day to read (YYYY-MM-DD). Defaults to today.
        #[arg(long, value_name = "DATE")]
        date: Option<NaiveDate>,

        /// Only show lines of this script.
        #[arg(long, value_name = "NAME")]
        script: Option<String>,
    },

    /// List the days that have a log file, newest first.
    Dates,

    /// Validate the config and print what the scheduler would do.
    Check,
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
