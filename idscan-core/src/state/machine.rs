//! Pure scan state machine.
//!
//! [`step`] maps the current session and an [`Input`] to the next session and
//! a list of [`Effect`]s. It performs no I/O and reads no clock; the
//! [`StateTransitionManager`](super::StateTransitionManager) applies the
//! effects.

use chrono::{DateTime, Utc};
use idscan_model::{
    FailureReason, ScanMode, ScanState, SessionId, SessionOutcome, StrategyKind, SwitchReason,
};
use tokio::time::Instant;

/// One scan attempt. Only the state machine creates or mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSession {
    id: SessionId,
    mode: ScanMode,
    state: ScanState,
    started_at: Instant,
    started_at_utc: DateTime<Utc>,
    barcode_attempts: u32,
    switch_target: Option<StrategyKind>,
}

impl ScanSession {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn started_at_utc(&self) -> DateTime<Utc> {
        self.started_at_utc
    }

    pub fn barcode_attempts(&self) -> u32 {
        self.barcode_attempts
    }

    /// Strategy a pending `fallback_transition` will land on.
    pub fn switch_target(&self) -> Option<StrategyKind> {
        self.switch_target
    }

    pub fn is_active(&self) -> bool {
        !self.state.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Start {
        id: SessionId,
        mode: ScanMode,
        now: Instant,
        now_utc: DateTime<Utc>,
    },
    /// Raw edge request, validated against the edge table.
    Transition(ScanState),
    /// Enter `fallback_transition` on the way to `to`.
    BeginSwitch {
        to: StrategyKind,
        reason: SwitchReason,
    },
    /// Leave `fallback_transition` once the grace delay has passed. Carries
    /// the id of the session that scheduled it.
    FinishSwitch { session_id: SessionId },
    /// Administrative end of the session from any non-terminal state.
    Finish(SessionOutcome),
    CountBarcodeAttempt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StateChanged {
        from: ScanState,
        to: ScanState,
    },
    ModeSwitched {
        from: StrategyKind,
        to: StrategyKind,
        reason: SwitchReason,
    },
    Rejected {
        from: ScanState,
        to: ScanState,
    },
    Finished(SessionOutcome),
    StartTimer(StrategyKind),
    CancelTimer(StrategyKind),
    CancelAllTimers,
    ScheduleSwitch {
        session_id: SessionId,
    },
    /// Drop a pending grace delay.
    CancelSwitch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub session: Option<ScanSession>,
    pub effects: Vec<Effect>,
}

impl Step {
    fn unchanged(session: Option<&ScanSession>) -> Self {
        Self {
            session: session.cloned(),
            effects: Vec::new(),
        }
    }

    fn rejected(session: Option<&ScanSession>, to: ScanState) -> Self {
        let from = session.map(ScanSession::state).unwrap_or_default();
        Self {
            session: session.cloned(),
            effects: vec![Effect::Rejected { from, to }],
        }
    }
}

pub fn step(current: Option<&ScanSession>, input: Input) -> Step {
    match input {
        Input::Start {
            id,
            mode,
            now,
            now_utc,
        } => start(current, id, mode, now, now_utc),
        Input::Transition(to) => transition(current, to),
        Input::BeginSwitch { to, reason } => begin_switch(current, to, reason),
        Input::FinishSwitch { session_id } => finish_switch(current, session_id),
        Input::Finish(outcome) => finish(current, outcome),
        Input::CountBarcodeAttempt => count_attempt(current),
    }
}

fn start(
    current: Option<&ScanSession>,
    id: SessionId,
    mode: ScanMode,
    now: Instant,
    now_utc: DateTime<Utc>,
) -> Step {
    if current.is_some_and(ScanSession::is_active) {
        return Step::unchanged(current);
    }

    let initial = mode.initial_strategy();
    let session = ScanSession {
        id,
        mode,
        state: initial.state(),
        started_at: now,
        started_at_utc: now_utc,
        barcode_attempts: 0,
        switch_target: None,
    };
    Step {
        session: Some(session),
        effects: vec![
            Effect::CancelAllTimers,
            Effect::StateChanged {
                from: ScanState::Idle,
                to: initial.state(),
            },
            Effect::StartTimer(initial),
        ],
    }
}

fn transition(current: Option<&ScanSession>, to: ScanState) -> Step {
    let Some(session) = current else {
        return Step::rejected(current, to);
    };
    let from = session.state;
    if !from.can_transition_to(to) {
        return Step::rejected(current, to);
    }
    // Strategy changes stay confined to auto mode and land where the pending
    // switch was headed.
    match (from, to) {
        (_, ScanState::FallbackTransition) if session.mode != ScanMode::Auto => {
            return Step::rejected(current, to);
        }
        (ScanState::FallbackTransition, _)
            if to.strategy().is_some() && to.strategy() != session.switch_target =>
        {
            return Step::rejected(current, to);
        }
        _ => {}
    }

    let mut next = session.clone();
    next.state = to;
    let mut effects = Vec::with_capacity(3);

    match to {
        ScanState::Completed | ScanState::Failed => {
            next.switch_target = None;
            effects.push(Effect::CancelAllTimers);
            effects.push(Effect::StateChanged { from, to });
            let outcome = if to == ScanState::Completed {
                SessionOutcome::completed(from.strategy(), None)
            } else {
                SessionOutcome::failed(FailureReason::Cancelled)
            };
            effects.push(Effect::Finished(outcome));
        }
        ScanState::FallbackTransition => {
            let Some(strategy) = from.strategy() else {
                return Step::rejected(current, to);
            };
            next.switch_target = Some(strategy.other());
            effects.push(Effect::CancelTimer(strategy));
            effects.push(Effect::StateChanged { from, to });
            effects.push(Effect::ScheduleSwitch {
                session_id: session.id,
            });
        }
        ScanState::Barcode | ScanState::Ocr => {
            next.switch_target = None;
            if from == ScanState::FallbackTransition {
                effects.push(Effect::CancelSwitch);
            }
            if let Some(strategy) = from.strategy() {
                effects.push(Effect::CancelTimer(strategy));
            }
            effects.push(Effect::StateChanged { from, to });
            if let Some(strategy) = to.strategy() {
                effects.push(Effect::StartTimer(strategy));
            }
        }
        // Nothing leads back to idle; the edge table already refuses it.
        ScanState::Idle => return Step::rejected(current, to),
    }

    Step {
        session: Some(next),
        effects,
    }
}

fn begin_switch(current: Option<&ScanSession>, to: StrategyKind, reason: SwitchReason) -> Step {
    let Some(session) = current else {
        return Step::rejected(current, ScanState::FallbackTransition);
    };
    let from = to.other();
    if session.mode != ScanMode::Auto || session.state != from.state() {
        return Step::rejected(current, ScanState::FallbackTransition);
    }

    let mut next = session.clone();
    next.state = ScanState::FallbackTransition;
    next.switch_target = Some(to);
    Step {
        effects: vec![
            Effect::CancelTimer(from),
            Effect::StateChanged {
                from: session.state,
                to: ScanState::FallbackTransition,
            },
            Effect::ModeSwitched { from, to, reason },
            Effect::ScheduleSwitch {
                session_id: session.id,
            },
        ],
        session: Some(next),
    }
}

fn finish_switch(current: Option<&ScanSession>, session_id: SessionId) -> Step {
    let Some(session) = current else {
        return Step::unchanged(current);
    };
    if session.id != session_id || session.state != ScanState::FallbackTransition {
        return Step::unchanged(current);
    }

    let target = session.switch_target.unwrap_or(StrategyKind::Ocr);
    let mut next = session.clone();
    next.state = target.state();
    next.switch_target = None;
    Step {
        session: Some(next),
        effects: vec![
            Effect::StateChanged {
                from: ScanState::FallbackTransition,
                to: target.state(),
            },
            Effect::StartTimer(target),
        ],
    }
}

fn finish(current: Option<&ScanSession>, outcome: SessionOutcome) -> Step {
    let Some(session) = current.filter(|session| session.is_active()) else {
        return Step::unchanged(current);
    };

    let to = outcome.state();
    let mut next = session.clone();
    next.state = to;
    next.switch_target = None;
    Step {
        session: Some(next),
        effects: vec![
            Effect::CancelAllTimers,
            Effect::StateChanged {
                from: session.state,
                to,
            },
            Effect::Finished(outcome),
        ],
    }
}

fn count_attempt(current: Option<&ScanSession>) -> Step {
    let Some(session) = current.filter(|session| session.is_active()) else {
        return Step::unchanged(current);
    };
    let mut next = session.clone();
    next.barcode_attempts = next.barcode_attempts.saturating_add(1);
    Step {
        session: Some(next),
        effects: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(mode: ScanMode) -> ScanSession {
        let step = step(
            None,
            Input::Start {
                id: SessionId::new(),
                mode,
                now: Instant::now(),
                now_utc: Utc::now(),
            },
        );
        step.session.expect("session started")
    }

    fn apply(session: &ScanSession, input: Input) -> (ScanSession, Vec<Effect>) {
        let step = step(Some(session), input);
        (step.session.expect("session kept"), step.effects)
    }

    #[test]
    fn start_enters_initial_strategy() {
        let barcode = started(ScanMode::Auto);
        assert_eq!(barcode.state(), ScanState::Barcode);
        assert_eq!(barcode.barcode_attempts(), 0);

        let ocr = step(
            None,
            Input::Start {
                id: SessionId::new(),
                mode: ScanMode::OcrOnly,
                now: Instant::now(),
                now_utc: Utc::now(),
            },
        );
        assert_eq!(
            ocr.effects,
            vec![
                Effect::CancelAllTimers,
                Effect::StateChanged {
                    from: ScanState::Idle,
                    to: ScanState::Ocr
                },
                Effect::StartTimer(StrategyKind::Ocr),
            ]
        );
    }

    #[test]
    fn start_is_ignored_while_active() {
        let session = started(ScanMode::Auto);
        let (after, effects) = apply(
            &session,
            Input::Start {
                id: SessionId::new(),
                mode: ScanMode::OcrOnly,
                now: Instant::now(),
                now_utc: Utc::now(),
            },
        );
        assert!(effects.is_empty());
        assert_eq!(after, session);
    }

    #[test]
    fn invalid_edges_leave_state_unchanged() {
        let session = started(ScanMode::Auto);
        let (done, _) = apply(&session, Input::Transition(ScanState::Completed));

        for target in [ScanState::Barcode, ScanState::Ocr, ScanState::Idle] {
            let (after, effects) = apply(&done, Input::Transition(target));
            assert_eq!(after.state(), ScanState::Completed);
            assert_eq!(
                effects,
                vec![Effect::Rejected {
                    from: ScanState::Completed,
                    to: target
                }]
            );
        }

        let (after, effects) = apply(&session, Input::Transition(ScanState::Ocr));
        assert_eq!(after.state(), ScanState::Barcode);
        assert!(matches!(effects[..], [Effect::Rejected { .. }]));
    }

    #[test]
    fn terminal_transition_cancels_timers_and_finishes_once() {
        let session = started(ScanMode::Auto);
        let (done, effects) = apply(&session, Input::Transition(ScanState::Completed));
        assert_eq!(effects[0], Effect::CancelAllTimers);
        assert_eq!(
            effects[2],
            Effect::Finished(SessionOutcome::completed(Some(StrategyKind::Barcode), None))
        );

        let (_, again) = apply(&done, Input::Finish(SessionOutcome::failed(FailureReason::Cancelled)));
        assert!(again.is_empty());
    }

    #[test]
    fn switch_goes_through_fallback_transition() {
        let session = started(ScanMode::Auto);
        let (switching, effects) = apply(
            &session,
            Input::BeginSwitch {
                to: StrategyKind::Ocr,
                reason: SwitchReason::MaxAttempts,
            },
        );
        assert_eq!(switching.state(), ScanState::FallbackTransition);
        assert_eq!(switching.switch_target(), Some(StrategyKind::Ocr));
        assert_eq!(
            effects,
            vec![
                Effect::CancelTimer(StrategyKind::Barcode),
                Effect::StateChanged {
                    from: ScanState::Barcode,
                    to: ScanState::FallbackTransition
                },
                Effect::ModeSwitched {
                    from: StrategyKind::Barcode,
                    to: StrategyKind::Ocr,
                    reason: SwitchReason::MaxAttempts
                },
                Effect::ScheduleSwitch {
                    session_id: session.id()
                },
            ]
        );

        let (ocr, effects) = apply(
            &switching,
            Input::FinishSwitch {
                session_id: session.id(),
            },
        );
        assert_eq!(ocr.state(), ScanState::Ocr);
        assert_eq!(effects.last(), Some(&Effect::StartTimer(StrategyKind::Ocr)));
    }

    #[test]
    fn switch_requires_auto_mode() {
        let session = started(ScanMode::BarcodeOnly);
        let (after, effects) = apply(
            &session,
            Input::BeginSwitch {
                to: StrategyKind::Ocr,
                reason: SwitchReason::Manual,
            },
        );
        assert_eq!(after.state(), ScanState::Barcode);
        assert!(matches!(effects[..], [Effect::Rejected { .. }]));
    }

    #[test]
    fn stale_finish_switch_is_ignored() {
        let session = started(ScanMode::Auto);
        let (switching, _) = apply(
            &session,
            Input::BeginSwitch {
                to: StrategyKind::Ocr,
                reason: SwitchReason::Timeout,
            },
        );
        let (after, effects) = apply(
            &switching,
            Input::FinishSwitch {
                session_id: SessionId::new(),
            },
        );
        assert!(effects.is_empty());
        assert_eq!(after.state(), ScanState::FallbackTransition);
    }

    #[test]
    fn raw_fallback_edges_respect_fixed_modes() {
        let session = started(ScanMode::BarcodeOnly);
        let (after, effects) = apply(&session, Input::Transition(ScanState::FallbackTransition));
        assert_eq!(after.state(), ScanState::Barcode);
        assert_eq!(
            effects,
            vec![Effect::Rejected {
                from: ScanState::Barcode,
                to: ScanState::FallbackTransition
            }]
        );

        let (after, effects) = apply(&after, Input::Transition(ScanState::Ocr));
        assert_eq!(after.state(), ScanState::Barcode);
        assert!(matches!(effects[..], [Effect::Rejected { .. }]));
    }

    #[test]
    fn raw_fallback_transition_schedules_the_switch() {
        let session = started(ScanMode::Auto);
        let (switching, effects) =
            apply(&session, Input::Transition(ScanState::FallbackTransition));
        assert_eq!(switching.switch_target(), Some(StrategyKind::Ocr));
        assert_eq!(
            effects,
            vec![
                Effect::CancelTimer(StrategyKind::Barcode),
                Effect::StateChanged {
                    from: ScanState::Barcode,
                    to: ScanState::FallbackTransition
                },
                Effect::ScheduleSwitch {
                    session_id: session.id()
                },
            ]
        );

        // Only the pending target is reachable from the transition state.
        let (after, effects) = apply(&switching, Input::Transition(ScanState::Barcode));
        assert_eq!(after.state(), ScanState::FallbackTransition);
        assert!(matches!(effects[..], [Effect::Rejected { .. }]));

        let (ocr, effects) = apply(&switching, Input::Transition(ScanState::Ocr));
        assert_eq!(ocr.state(), ScanState::Ocr);
        assert_eq!(effects[0], Effect::CancelSwitch);
        assert_eq!(effects.last(), Some(&Effect::StartTimer(StrategyKind::Ocr)));
    }

    #[test]
    fn attempts_only_grow_while_active() {
        let session = started(ScanMode::Auto);
        let (one, _) = apply(&session, Input::CountBarcodeAttempt);
        let (two, _) = apply(&one, Input::CountBarcodeAttempt);
        assert_eq!(two.barcode_attempts(), 2);

        let (done, _) = apply(&two, Input::Transition(ScanState::Failed));
        let (after, _) = apply(&done, Input::CountBarcodeAttempt);
        assert_eq!(after.barcode_attempts(), 2);
    }

    #[test]
    fn finish_is_valid_from_fallback_transition() {
        let session = started(ScanMode::Auto);
        let (switching, _) = apply(
            &session,
            Input::BeginSwitch {
                to: StrategyKind::Ocr,
                reason: SwitchReason::Quality,
            },
        );
        let (done, effects) =
            apply(&switching, Input::Finish(SessionOutcome::failed(FailureReason::Cancelled)));
        assert_eq!(done.state(), ScanState::Failed);
        assert_eq!(effects.len(), 3);
    }
}
