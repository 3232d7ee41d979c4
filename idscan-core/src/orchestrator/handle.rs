use std::fmt;
use std::sync::Arc;

use idscan_model::{
    DetectorResult, QualitySample, ScanMode, ScanProgress, SessionId, StrategyKind,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::FrameInput;
use super::actor::Command;
use crate::config::OrchestratorConfig;
use crate::error::{Result, ScanError};
use crate::events::EventDispatcher;

/// Cloneable host-side handle to a running orchestrator.
pub struct ScanHandle<F> {
    commands: mpsc::Sender<Command<F>>,
    events: EventDispatcher,
    shutdown: CancellationToken,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl<F> Clone for ScanHandle<F> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
            events: self.events.clone(),
            shutdown: self.shutdown.clone(),
            task: Arc::clone(&self.task),
        }
    }
}

impl<F> fmt::Debug for ScanHandle<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanHandle")
            .field("mailbox_capacity", &self.commands.max_capacity())
            .field("mailbox_free", &self.commands.capacity())
            .field("closed", &self.commands.is_closed())
            .field("shutdown_cancelled", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl<F: Send + 'static> ScanHandle<F> {
    pub(crate) fn new(
        commands: mpsc::Sender<Command<F>>,
        events: EventDispatcher,
        shutdown: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            commands,
            events,
            shutdown,
            task: Arc::new(Mutex::new(Some(task))),
        }
    }

    /// Dispatcher the orchestrator emits through; subscribe observers here.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Starts a session. `None` when one is already active.
    pub async fn start(&self, mode: ScanMode) -> Result<Option<SessionId>> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Start { mode, reply }).await?;
        rx.await.map_err(|_| ScanError::Closed)
    }

    pub async fn submit_frame(&self, input: FrameInput<F>) -> Result<()> {
        self.send(Command::Frame(input)).await
    }

    /// Offers a frame without waiting for mailbox space. Returns `false` if
    /// the frame was dropped because the mailbox is full.
    pub fn try_submit_frame(&self, input: FrameInput<F>) -> Result<bool> {
        match self.commands.try_send(Command::Frame(input)) {
            Ok(()) => Ok(true),
            Err(mpsc::error::TrySendError::Full(_)) => Ok(false),
            Err(mpsc::error::TrySendError::Closed(_)) => Err(ScanError::Closed),
        }
    }

    /// Feeds a result from a detector that reports through callbacks
    /// instead of the orchestrator's [`FrameDetector`](super::FrameDetector).
    pub async fn submit_result(
        &self,
        strategy: StrategyKind,
        result: Option<DetectorResult>,
    ) -> Result<()> {
        self.send(Command::Result { strategy, result }).await
    }

    pub async fn submit_quality(&self, sample: QualitySample) -> Result<()> {
        self.send(Command::Quality(sample)).await
    }

    /// Manually switches strategy. Only honoured in `auto` mode.
    pub async fn switch_mode(&self, to: StrategyKind) -> Result<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::SwitchMode { to, reply }).await?;
        rx.await.map_err(|_| ScanError::Closed)
    }

    pub async fn cancel(&self) -> Result<()> {
        self.send(Command::Cancel).await
    }

    pub async fn reset(&self) -> Result<()> {
        self.send(Command::Reset).await
    }

    pub async fn reconfigure(&self, config: OrchestratorConfig) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Reconfigure {
            config: Box::new(config),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ScanError::Closed)?
    }

    pub async fn progress(&self) -> Result<ScanProgress> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Progress { reply }).await?;
        rx.await.map_err(|_| ScanError::Closed)
    }

    /// Stops the actor, clearing every pending timer, and waits for it to
    /// exit. Safe to call more than once.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            task.await
                .map_err(|err| ScanError::Internal(format!("orchestrator task failed: {err}")))?;
        }
        Ok(())
    }

    async fn send(&self, command: Command<F>) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(ScanError::Closed);
        }
        self.commands
            .send(command)
            .await
            .map_err(|_| ScanError::Closed)
    }
}
