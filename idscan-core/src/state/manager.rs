use std::sync::Arc;
use std::time::Duration;

use idscan_model::{
    DetectorError, FailureReason, FallbackDecision, FallbackReason, ScanMode, ScanProgress,
    ScanState, SessionId, SessionOutcome, StrategyKind, SwitchReason,
};
use tokio::time::Instant;

use super::machine::{self, Effect, Input, ScanSession, Step};
use super::policy::{self, MIN_REMAINING_FOR_FALLBACK};
use crate::clock::Clock;
use crate::config::FallbackConfig;
use crate::events::{EventDispatcher, ScanEvent};

/// Timer work requested by a transition, carried out by whoever owns the
/// [`ScanTimeoutManager`](crate::timeout::ScanTimeoutManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerDirective {
    Start(StrategyKind),
    Cancel(StrategyKind),
    CancelAll,
    ScheduleSwitch { session_id: SessionId },
    CancelSwitch,
}

/// Sole owner of the session record. Applies the pure state machine and
/// turns its effects into events and timer directives.
#[derive(Debug)]
pub struct StateTransitionManager {
    config: FallbackConfig,
    session: Option<ScanSession>,
    finished_at: Option<Instant>,
    clock: Arc<dyn Clock>,
    events: EventDispatcher,
    directives: Vec<TimerDirective>,
}

impl StateTransitionManager {
    pub fn new(config: FallbackConfig, clock: Arc<dyn Clock>, events: EventDispatcher) -> Self {
        Self {
            config,
            session: None,
            finished_at: None,
            clock,
            events,
            directives: Vec::new(),
        }
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    /// Replaces the policy configuration. Decisions made from now on use it;
    /// timers already running keep their original budget.
    pub fn reconfigure(&mut self, config: FallbackConfig) {
        self.config = config;
    }

    /// Starts a new session. Returns `None` without side effects while a
    /// session is still active.
    pub fn start_scan_session(&mut self, mode: ScanMode) -> Option<SessionId> {
        if self.is_active() {
            tracing::debug!(target: "idscan::state", mode = %mode, "session already active, start ignored");
            return None;
        }
        let id = SessionId::new();
        self.finished_at = None;
        self.directives.clear();
        self.run(Input::Start {
            id,
            mode,
            now: self.clock.now(),
            now_utc: self.clock.utc_now(),
        });
        tracing::info!(target: "idscan::state", session_id = %id, mode = %mode, "scan session started");
        Some(id)
    }

    /// Requests a raw transition. Invalid edges are refused, leave the state
    /// unchanged and emit [`ScanEvent::TransitionRejected`].
    pub fn update_state(&mut self, to: ScanState) -> bool {
        self.run(Input::Transition(to))
    }

    /// Starts a switch to `to` through `fallback_transition`. Only sessions
    /// in `auto` mode running the other strategy can switch.
    pub fn switch_mode(&mut self, to: StrategyKind, reason: SwitchReason) -> bool {
        self.run(Input::BeginSwitch { to, reason })
    }

    /// Completes a switch once the grace delay scheduled for `session_id` has
    /// passed. Stale or unexpected calls are ignored.
    pub fn complete_mode_switch(&mut self, session_id: SessionId) -> bool {
        self.run(Input::FinishSwitch { session_id })
    }

    /// Ends the session with `outcome`. No-op once terminal.
    pub fn finish(&mut self, outcome: SessionOutcome) -> bool {
        self.run(Input::Finish(outcome))
    }

    pub fn force_complete(&mut self) -> bool {
        let strategy = self
            .session
            .as_ref()
            .and_then(|session| session.state().strategy());
        self.finish(SessionOutcome::completed(strategy, None))
    }

    pub fn force_fail(&mut self, reason: FailureReason) -> bool {
        self.finish(SessionOutcome::failed(reason))
    }

    pub fn increment_barcode_attempts(&mut self) -> u32 {
        self.run(Input::CountBarcodeAttempt);
        self.barcode_attempts()
    }

    /// Full fallback policy for the current session.
    ///
    /// A fatal detector error never leads to a fallback, whatever the timing
    /// says.
    pub fn should_trigger_fallback(
        &self,
        error: Option<&DetectorError>,
        time_elapsed: Duration,
    ) -> FallbackDecision {
        let Some(session) = &self.session else {
            return FallbackDecision::refuse(FallbackReason::ModeRestriction, 0);
        };
        let decision = policy::evaluate_fallback(
            session.mode(),
            &self.config,
            session.barcode_attempts(),
            time_elapsed,
        );
        if decision.should_fallback && error.is_some_and(|err| err.kind.is_fatal()) {
            return FallbackDecision::refuse(FallbackReason::ErrorType, decision.remaining_time_ms);
        }
        decision
    }

    pub fn should_fallback_for_quality(&self, time_elapsed: Duration) -> FallbackDecision {
        match &self.session {
            Some(session) => {
                policy::evaluate_quality_fallback(session.mode(), &self.config, time_elapsed)
            }
            None => FallbackDecision::refuse(FallbackReason::ModeRestriction, 0),
        }
    }

    pub fn is_fallback_available(&self) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        session.mode() == ScanMode::Auto
            && session.is_active()
            && self.config.enable_auto_fallback
            && self.remaining_time() >= MIN_REMAINING_FOR_FALLBACK
    }

    pub fn get_progress(&self) -> ScanProgress {
        let Some(session) = &self.session else {
            return ScanProgress::idle();
        };
        ScanProgress {
            session_id: Some(session.id()),
            state: session.state(),
            mode: Some(session.mode()),
            start_time: Some(session.started_at_utc()),
            barcode_attempts: session.barcode_attempts(),
            time_elapsed_ms: self.time_elapsed().as_millis() as u64,
            message: session.state().message().to_string(),
        }
    }

    /// Elapsed session time; frozen once the session is terminal.
    pub fn time_elapsed(&self) -> Duration {
        let Some(session) = &self.session else {
            return Duration::ZERO;
        };
        let end = self.finished_at.unwrap_or_else(|| self.clock.now());
        end.saturating_duration_since(session.started_at())
    }

    pub fn remaining_time(&self) -> Duration {
        self.config
            .max_processing_time()
            .saturating_sub(self.time_elapsed())
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(ScanSession::is_active)
    }

    pub fn state(&self) -> ScanState {
        self.session
            .as_ref()
            .map(ScanSession::state)
            .unwrap_or_default()
    }

    pub fn mode(&self) -> Option<ScanMode> {
        self.session.as_ref().map(ScanSession::mode)
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(ScanSession::id)
    }

    pub fn barcode_attempts(&self) -> u32 {
        self.session
            .as_ref()
            .map(ScanSession::barcode_attempts)
            .unwrap_or_default()
    }

    pub fn session(&self) -> Option<&ScanSession> {
        self.session.as_ref()
    }

    /// Drops the session and asks for every timer to be cleared.
    pub fn reset(&mut self) {
        if let Some(id) = self.session_id() {
            tracing::debug!(target: "idscan::state", session_id = %id, "session reset");
        }
        self.session = None;
        self.finished_at = None;
        self.directives.clear();
        self.directives.push(TimerDirective::CancelAll);
    }

    /// Timer directives produced since the last call, in order.
    pub fn take_directives(&mut self) -> Vec<TimerDirective> {
        std::mem::take(&mut self.directives)
    }

    fn run(&mut self, input: Input) -> bool {
        let step = machine::step(self.session.as_ref(), input);
        self.apply(step)
    }

    /// Returns whether the state changed.
    fn apply(&mut self, step: Step) -> bool {
        self.session = step.session;
        let mut changed = false;

        for effect in step.effects {
            match effect {
                Effect::StateChanged { from, to } => {
                    changed = true;
                    if to.is_terminal() {
                        self.finished_at = Some(self.clock.now());
                    }
                    let Some(session_id) = self.session_id() else {
                        continue;
                    };
                    tracing::debug!(target: "idscan::state", session_id = %session_id, from = %from, to = %to, "state changed");
                    self.events.dispatch(ScanEvent::StateChanged {
                        session_id,
                        from,
                        to,
                    });
                    self.events
                        .dispatch(ScanEvent::ProgressUpdated(self.get_progress()));
                }
                Effect::ModeSwitched { from, to, reason } => {
                    let Some(session_id) = self.session_id() else {
                        continue;
                    };
                    tracing::info!(target: "idscan::state", session_id = %session_id, from = %from, to = %to, reason = %reason, "switching strategy");
                    self.events.dispatch(ScanEvent::ModeSwitched {
                        session_id,
                        from,
                        to,
                        reason,
                    });
                }
                Effect::Rejected { from, to } => {
                    tracing::debug!(target: "idscan::state", from = %from, to = %to, "transition rejected");
                    self.events.dispatch(ScanEvent::TransitionRejected {
                        session_id: self.session_id(),
                        from,
                        to,
                    });
                }
                Effect::Finished(outcome) => {
                    let Some(session_id) = self.session_id() else {
                        continue;
                    };
                    match &outcome {
                        SessionOutcome::Completed { strategy, .. } => {
                            tracing::info!(target: "idscan::state", session_id = %session_id, strategy = ?strategy, "scan completed");
                        }
                        SessionOutcome::Failed { reason, .. } => {
                            tracing::warn!(target: "idscan::state", session_id = %session_id, reason = ?reason, "scan failed");
                        }
                    }
                    self.events
                        .dispatch(ScanEvent::SessionFinished { session_id, outcome });
                }
                Effect::StartTimer(kind) => self.directives.push(TimerDirective::Start(kind)),
                Effect::CancelTimer(kind) => self.directives.push(TimerDirective::Cancel(kind)),
                Effect::CancelAllTimers => self.directives.push(TimerDirective::CancelAll),
                Effect::ScheduleSwitch { session_id } => self
                    .directives
                    .push(TimerDirective::ScheduleSwitch { session_id }),
                Effect::CancelSwitch => self.directives.push(TimerDirective::CancelSwitch),
            }
        }

        changed
    }
}
