//! Replays a [`Scenario`] through a live orchestrator.

use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use idscan_config::ConfigLoader;
use idscan_core::{
    FrameInput, RecordedFrame, ReplayDetector, ScanEvent, ScanHandle, ScanOrchestratorBuilder,
};
use idscan_model::{ScanMode, ScanProgress, ScanState};
use tokio::time::{Instant, sleep};
use tracing::{debug, info, warn};

use crate::render::{OutputFormat, Renderer};
use crate::scenario::{Action, Scenario, Step};

#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub scenario: PathBuf,
    pub config: Option<PathBuf>,
    pub mode: Option<ScanMode>,
    pub format: OutputFormat,
}

/// Runs the scenario and returns the final progress snapshot.
pub async fn run(options: SimulateOptions) -> Result<ScanProgress> {
    let scenario = Scenario::load(&options.scenario)?;

    let mut loader = ConfigLoader::new();
    if let Some(path) = &options.config {
        loader = loader.with_path(path);
    }
    let loaded = loader.load().context("failed to load configuration")?;
    let config = scenario.effective_config(&loaded.config)?;
    let mode = options.mode.or(scenario.mode).unwrap_or(ScanMode::Auto);
    info!(
        target: "idscan::cli",
        scenario = %options.scenario.display(),
        source = %loaded.source,
        %mode,
        steps = scenario.steps.len(),
        "replaying scenario"
    );

    let orchestrator = ScanOrchestratorBuilder::new(config).build(ReplayDetector::new())?;
    let renderer = Renderer::new(options.format);
    let origin = Instant::now();
    orchestrator.events().subscribe(move |event: &ScanEvent| {
        let at_ms = u64::try_from(origin.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut out = std::io::stdout().lock();
        if let Err(err) = renderer.event(&mut out, at_ms, event) {
            warn!(target: "idscan::cli", error = %err, "failed to write event");
        }
    });

    let handle = orchestrator.spawn();
    handle.start(mode).await?;

    for (index, step) in scenario.steps.iter().enumerate() {
        sleep(Duration::from_millis(step.after_ms)).await;
        debug!(target: "idscan::cli", step = index, "applying step");
        apply_step(&handle, step, mode).await?;
    }

    sleep(Duration::from_millis(scenario.settle_ms)).await;
    let progress = handle.progress().await?;
    handle.shutdown().await?;

    let mut out = std::io::stdout().lock();
    renderer.progress(&mut out, &progress)?;
    out.flush()?;
    Ok(progress)
}

pub fn succeeded(progress: &ScanProgress) -> bool {
    progress.state != ScanState::Failed
}

async fn apply_step(
    handle: &ScanHandle<RecordedFrame>,
    step: &Step,
    default_mode: ScanMode,
) -> Result<()> {
    if let Some(action) = step.action {
        match action {
            Action::Start { mode } => {
                handle.start(mode.unwrap_or(default_mode)).await?;
            }
            Action::Switch { to } => {
                handle.switch_mode(to).await?;
            }
            Action::Cancel => handle.cancel().await?,
            Action::Reset => handle.reset().await?,
        }
    }

    match (step.frame(), step.quality) {
        (Some(frame), quality) => {
            let mut input = FrameInput::new(frame);
            if let Some(sample) = quality {
                input = input.with_quality(sample);
            }
            handle.submit_frame(input).await?;
        }
        (None, Some(sample)) => handle.submit_quality(sample).await?,
        (None, None) => {}
    }
    Ok(())
}
