// src/cli.rs

//! Command-line interface for the `preheat` master process.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Log verbosity selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Keep warm processes for a plan tree and route commands to them.
#[derive(Debug, Parser)]
#[command(name = "preheat", version, about)]
pub struct CliArgs {
    /// Path to the plan file.
    #[arg(short, long, default_value = "Preheat.toml")]
    pub config: String,

    /// Override the public command socket path from the plan file.
    #[arg(long)]
    pub socket: Option<PathBuf>,

    /// Print the resolved plan tree and exit without spawning anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Log level (overrides the PREHEAT_LOG environment variable).
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,
}
