//! The single logical thread that owns the three components.
//!
//! Host commands arrive over a bounded mailbox. Timer expiries, grace delays
//! and detector completions come back over an unbounded internal channel and
//! are drained first. Every internal signal carries the id of the session
//! that produced it and is dropped when that session is no longer current.

use std::sync::Arc;
use std::time::Duration;

use idscan_model::{
    DetectorErrorKind, DetectorResult, FailureReason, FallbackDecision, FallbackReason,
    QualitySample, ScanMode, ScanProgress, ScanState, SessionId, SessionOutcome, StrategyKind,
    SwitchReason,
};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::FrameInput;
use super::detector::FrameDetector;
use crate::clock::Clock;
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::events::EventDispatcher;
use crate::quality::QualityMetricsProcessor;
use crate::state::{StateTransitionManager, TimerDirective};
use crate::timeout::{ScanTimeoutManager, TimeoutFired, TimerKey};

pub(crate) enum Command<F> {
    Start {
        mode: ScanMode,
        reply: oneshot::Sender<Option<SessionId>>,
    },
    Frame(FrameInput<F>),
    Result {
        strategy: StrategyKind,
        result: Option<DetectorResult>,
    },
    Quality(QualitySample),
    SwitchMode {
        to: StrategyKind,
        reply: oneshot::Sender<bool>,
    },
    Cancel,
    Reset,
    Reconfigure {
        config: Box<OrchestratorConfig>,
        reply: oneshot::Sender<Result<()>>,
    },
    Progress {
        reply: oneshot::Sender<ScanProgress>,
    },
}

#[derive(Debug)]
pub(crate) enum Signal {
    TimerElapsed {
        session_id: SessionId,
        fired: TimeoutFired,
    },
    SwitchGraceElapsed {
        session_id: SessionId,
    },
    DetectionFinished {
        seq: u64,
        session_id: SessionId,
        strategy: StrategyKind,
        result: Option<DetectorResult>,
    },
}

struct InFlight {
    seq: u64,
    task: JoinHandle<()>,
}

pub(crate) struct Actor<D: FrameDetector> {
    config: OrchestratorConfig,
    state: StateTransitionManager,
    timeouts: ScanTimeoutManager,
    quality: QualityMetricsProcessor,
    detector: Arc<D>,
    signals_tx: mpsc::UnboundedSender<Signal>,
    in_flight: Option<InFlight>,
    next_seq: u64,
}

impl<D: FrameDetector> Actor<D> {
    pub(crate) fn new(
        config: OrchestratorConfig,
        clock: Arc<dyn Clock>,
        events: EventDispatcher,
        detector: Arc<D>,
        signals_tx: mpsc::UnboundedSender<Signal>,
    ) -> Self {
        Self {
            state: StateTransitionManager::new(config.fallback, Arc::clone(&clock), events.clone()),
            timeouts: ScanTimeoutManager::new(&config, Arc::clone(&clock), events.clone()),
            quality: QualityMetricsProcessor::new(
                config.quality,
                config.fallback.min_quality_threshold,
                clock,
                events,
            ),
            config,
            detector,
            signals_tx,
            in_flight: None,
            next_seq: 0,
        }
    }

    pub(crate) async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command<D::Frame>>,
        mut signals: mpsc::UnboundedReceiver<Signal>,
        shutdown: CancellationToken,
    ) {
        tracing::info!(target: "idscan::orchestrator", "orchestrator started");
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(signal) = signals.recv() => self.on_signal(signal),
                command = commands.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
            }
        }
        self.stop_in_flight();
        self.timeouts.reset();
        tracing::info!(target: "idscan::orchestrator", "orchestrator stopped");
    }

    fn on_command(&mut self, command: Command<D::Frame>) {
        match command {
            Command::Start { mode, reply } => {
                let _ = reply.send(self.start(mode));
            }
            Command::Frame(input) => self.on_frame(input),
            Command::Result { strategy, result } => self.on_result(strategy, result),
            Command::Quality(sample) => {
                if self.state.is_active() {
                    self.on_quality(sample);
                }
            }
            Command::SwitchMode { to, reply } => {
                let switched = self.state.switch_mode(to, SwitchReason::Manual);
                self.apply_directives();
                let _ = reply.send(switched);
            }
            Command::Cancel => {
                self.state.force_fail(FailureReason::Cancelled);
                self.apply_directives();
            }
            Command::Reset => {
                self.state.reset();
                self.apply_directives();
                self.timeouts.reset();
                self.quality.reset();
            }
            Command::Reconfigure { config, reply } => {
                let _ = reply.send(self.reconfigure(*config));
            }
            Command::Progress { reply } => {
                let _ = reply.send(self.state.get_progress());
            }
        }
    }

    fn on_signal(&mut self, signal: Signal) {
        match signal {
            Signal::TimerElapsed { session_id, fired } => {
                if self.state.session_id() != Some(session_id) {
                    tracing::trace!(target: "idscan::orchestrator", session_id = %session_id, "stale timer dropped");
                    return;
                }
                self.on_timeout(fired);
            }
            Signal::SwitchGraceElapsed { session_id } => {
                self.state.complete_mode_switch(session_id);
                self.apply_directives();
            }
            Signal::DetectionFinished {
                seq,
                session_id,
                strategy,
                result,
            } => {
                if self.in_flight.as_ref().is_some_and(|f| f.seq == seq) {
                    self.in_flight = None;
                }
                if self.state.session_id() != Some(session_id) {
                    return;
                }
                self.on_result(strategy, result);
            }
        }
    }

    fn start(&mut self, mode: ScanMode) -> Option<SessionId> {
        if self.state.is_active() {
            return None;
        }
        self.stop_in_flight();
        self.timeouts.reset();
        self.quality.reset();
        let id = self.state.start_scan_session(mode)?;
        self.timeouts.begin();
        self.apply_directives();
        Some(id)
    }

    fn reconfigure(&mut self, config: OrchestratorConfig) -> Result<()> {
        config.validate()?;
        self.state.reconfigure(config.fallback);
        self.timeouts.reconfigure(&config);
        self.quality
            .reconfigure(config.quality, config.fallback.min_quality_threshold);
        tracing::info!(target: "idscan::orchestrator", "configuration updated");
        self.config = config;
        Ok(())
    }

    fn on_frame(&mut self, input: FrameInput<D::Frame>) {
        if !self.state.is_active() {
            return;
        }
        if let Some(sample) = input.quality
            && self.on_quality(sample)
        {
            return;
        }
        let Some(strategy) = self.state.state().strategy() else {
            return;
        };
        let Some(session_id) = self.state.session_id() else {
            return;
        };
        if self.in_flight.is_some() {
            tracing::trace!(target: "idscan::orchestrator", "detector busy, frame dropped");
            return;
        }
        self.spawn_detection(session_id, strategy, input.frame);
    }

    fn spawn_detection(&mut self, session_id: SessionId, strategy: StrategyKind, frame: D::Frame) {
        let seq = self.next_seq;
        self.next_seq += 1;

        let runner = self.timeouts.retry_runner();
        let attempts = self.config.retry.detector_attempts;
        let detector = Arc::clone(&self.detector);
        let frame = Arc::new(frame);
        let tx = self.signals_tx.clone();

        let task = tokio::spawn(async move {
            let outcome = runner
                .run(
                    |_| {
                        let detector = Arc::clone(&detector);
                        let frame = Arc::clone(&frame);
                        async move {
                            match detector.detect(strategy, &frame).await {
                                Some(result) if result.is_retryable_failure() => Err(result),
                                other => Ok(other),
                            }
                        }
                    },
                    attempts,
                )
                .await;
            let result = match outcome {
                Ok(result) => result,
                Err(failure) => Some(failure),
            };
            let _ = tx.send(Signal::DetectionFinished {
                seq,
                session_id,
                strategy,
                result,
            });
        });
        self.in_flight = Some(InFlight { seq, task });
    }

    /// Returns true when the sample triggered a strategy switch.
    fn on_quality(&mut self, sample: QualitySample) -> bool {
        let verdict = self.quality.process_quality_metrics(sample);
        if !verdict.should_switch
            || self.state.state() != ScanState::Barcode
            || !self.state.is_fallback_available()
        {
            return false;
        }
        let decision = self
            .state
            .should_fallback_for_quality(self.state.time_elapsed());
        if !decision.should_fallback {
            return false;
        }
        let switched = self.state.switch_mode(StrategyKind::Ocr, SwitchReason::Quality);
        self.apply_directives();
        switched
    }

    fn on_result(&mut self, strategy: StrategyKind, result: Option<DetectorResult>) {
        if self.state.state().strategy() != Some(strategy) {
            return;
        }
        let Some(result) = result else {
            return;
        };
        if result.success {
            self.state
                .finish(SessionOutcome::completed(Some(strategy), result.data));
            self.apply_directives();
            return;
        }

        match result.error_kind().unwrap_or(DetectorErrorKind::Transient) {
            DetectorErrorKind::Permission => self.fail(FailureReason::PermissionDenied),
            DetectorErrorKind::System => {
                if let Some(err) = &result.error {
                    tracing::error!(target: "idscan::orchestrator", error = %err, "detector system error");
                }
                self.fail(FailureReason::SystemError);
            }
            DetectorErrorKind::Quality => {
                tracing::trace!(target: "idscan::orchestrator", strategy = %strategy, "poor frame absorbed");
            }
            DetectorErrorKind::Transient | DetectorErrorKind::Timeout => {
                if strategy == StrategyKind::Barcode {
                    self.on_barcode_failure(&result);
                }
            }
        }
    }

    fn on_barcode_failure(&mut self, result: &DetectorResult) {
        let attempts = self.state.increment_barcode_attempts();
        let decision = self
            .state
            .should_trigger_fallback(result.error.as_ref(), self.state.time_elapsed());
        tracing::debug!(
            target: "idscan::orchestrator",
            attempts,
            should_fallback = decision.should_fallback,
            reason = %decision.reason,
            "barcode attempt failed"
        );

        if decision.should_fallback {
            self.fall_back(decision);
            return;
        }
        match decision.reason {
            FallbackReason::InsufficientTime => self.fail(FailureReason::InsufficientTime),
            FallbackReason::ModeRestriction
                if attempts >= self.state.config().max_barcode_attempts =>
            {
                self.fail(FailureReason::AttemptsExhausted)
            }
            _ => {}
        }
    }

    fn on_timeout(&mut self, fired: TimeoutFired) {
        let kind = fired.kind;
        if self.state.state().strategy() != Some(kind) {
            return;
        }
        // The budget grew while this timer was pending: wait out the rest.
        let spent = Duration::from_millis(fired.elapsed_ms);
        if spent < self.timeouts.budget(kind) {
            tracing::debug!(
                target: "idscan::orchestrator",
                kind = %kind,
                elapsed_ms = fired.elapsed_ms,
                "timer extended to new budget"
            );
            self.arm_timer(kind, spent);
            return;
        }
        self.timeouts.report_timeout(fired);

        match kind {
            StrategyKind::Barcode => {
                let decision = self
                    .state
                    .should_trigger_fallback(None, self.state.time_elapsed());
                if decision.should_fallback {
                    self.fall_back(decision);
                } else if decision.reason == FallbackReason::InsufficientTime {
                    self.fail(FailureReason::InsufficientTime);
                } else {
                    self.fail(FailureReason::TimedOut);
                }
            }
            StrategyKind::Ocr => self.fail(FailureReason::TimedOut),
        }
    }

    /// Switches to OCR for an approved decision, or fails the session when
    /// automatic fallback is unavailable.
    fn fall_back(&mut self, decision: FallbackDecision) {
        if !self.state.is_fallback_available() {
            self.fail(match decision.reason {
                FallbackReason::MaxAttempts => FailureReason::AttemptsExhausted,
                _ => FailureReason::TimedOut,
            });
            return;
        }
        let reason = SwitchReason::from_fallback(decision.reason).unwrap_or(SwitchReason::Timeout);
        self.state.switch_mode(StrategyKind::Ocr, reason);
        self.apply_directives();
    }

    fn fail(&mut self, reason: FailureReason) {
        self.state.force_fail(reason);
        self.apply_directives();
    }

    fn apply_directives(&mut self) {
        for directive in self.state.take_directives() {
            match directive {
                TimerDirective::Start(kind) => self.arm_timer(kind, Duration::ZERO),
                TimerDirective::Cancel(kind) => {
                    // The strategy stopped running; so does its detection.
                    self.timeouts.clear_key(kind.into());
                    self.stop_in_flight();
                }
                TimerDirective::CancelAll => {
                    self.timeouts.clear_all_timers();
                    self.timeouts.cancel_retries();
                    self.stop_in_flight();
                }
                TimerDirective::ScheduleSwitch { session_id } => {
                    let tx = self.signals_tx.clone();
                    self.timeouts.start_grace(move || {
                        let _ = tx.send(Signal::SwitchGraceElapsed { session_id });
                    });
                }
                TimerDirective::CancelSwitch => self.timeouts.clear_key(TimerKey::ModeSwitch),
            }
        }
    }

    fn arm_timer(&mut self, kind: StrategyKind, spent: Duration) {
        let Some(session_id) = self.state.session_id() else {
            return;
        };
        let tx = self.signals_tx.clone();
        self.timeouts.resume_timeout(kind, spent, move |fired| {
            let _ = tx.send(Signal::TimerElapsed { session_id, fired });
        });
    }

    fn stop_in_flight(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.task.abort();
        }
    }
}
