//! `idscanctl`: replay recorded scan scenarios and inspect configuration.

mod cli;
mod inspect;
mod render;
mod scenario;
mod simulate;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, Command, ConfigAction};
use crate::simulate::SimulateOptions;

fn main() -> Result<ExitCode> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let ok = match cli.command {
        Command::Simulate {
            scenario,
            config,
            mode,
            format,
            realtime,
        } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .start_paused(!realtime)
                .build()?;
            let progress = runtime.block_on(simulate::run(SimulateOptions {
                scenario,
                config,
                mode,
                format,
            }))?;
            simulate::succeeded(&progress)
        }
        Command::Config { action } => match action {
            ConfigAction::Show { path } => {
                inspect::show(path)?;
                true
            }
            ConfigAction::Check {
                path,
                deny_warnings,
            } => inspect::check(path, deny_warnings)?,
        },
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}
