use std::path::PathBuf;

use clap::{Parser, Subcommand};
use idscan_model::ScanMode;

use crate::render::OutputFormat;

#[derive(Debug, Parser)]
#[command(
    name = "idscanctl",
    version,
    about = "Replay scan scenarios and inspect idscan configuration"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Replay a recorded scenario and print every event
    Simulate {
        /// Scenario JSON file
        scenario: PathBuf,
        /// Configuration file (TOML or JSON) instead of the usual lookup
        #[arg(long)]
        config: Option<PathBuf>,
        /// Scan mode: auto, barcode-only or ocr-only. Overrides the scenario.
        #[arg(long)]
        mode: Option<ScanMode>,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
        /// Honour step delays in wall-clock time instead of virtual time
        #[arg(long)]
        realtime: bool,
    },
    /// Inspect the effective configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML along with its source
    Show {
        #[arg(long)]
        path: Option<PathBuf>,
    },
    /// Validate the configuration and list guard-rail warnings
    Check {
        #[arg(long)]
        path: Option<PathBuf>,
        /// Exit non-zero when any warning is reported
        #[arg(long)]
        deny_warnings: bool,
    },
}
