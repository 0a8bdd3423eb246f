// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `bookflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "bookflow",
    version,
    about = "Drive scanned books through packaging, upload and cleanup.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `Bookflow.toml` in the current working directory. A missing
    /// default file falls back to built-in defaults.
    #[arg(long, value_name = "PATH", default_value = "Bookflow.toml")]
    pub config: String,

    /// Library directory holding one sub-directory per book.
    ///
    /// Overrides `[library].path` from the config file.
    #[arg(long, value_name = "DIR")]
    pub library: Option<PathBuf>,

    /// Run a single move-along pass, wait for the resulting work, then exit.
    #[arg(long)]
    pub once: bool,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `BOOKFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Load the library and print what each book would do next, without
    /// running anything.
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
