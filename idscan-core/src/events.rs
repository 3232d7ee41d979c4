use std::fmt;
use std::sync::Arc;

use idscan_model::{
    QualityAssessment, ScanProgress, ScanState, SessionId, SessionOutcome, StrategyKind,
    SwitchReason,
};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast;

/// Event emitted by the engine to the host application.
///
/// Events fire in the order their causing state changes were applied. A
/// successful transition always emits `StateChanged` followed by
/// `ProgressUpdated`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    StateChanged {
        session_id: SessionId,
        from: ScanState,
        to: ScanState,
    },
    ProgressUpdated(ScanProgress),
    ModeSwitched {
        session_id: SessionId,
        from: StrategyKind,
        to: StrategyKind,
        reason: SwitchReason,
    },
    QualityAssessed {
        assessment: QualityAssessment,
        should_switch: bool,
    },
    TimedOut {
        kind: StrategyKind,
        elapsed_ms: u64,
    },
    /// A requested transition was refused and the state left unchanged.
    TransitionRejected {
        session_id: Option<SessionId>,
        from: ScanState,
        to: ScanState,
    },
    /// Emitted exactly once per session, when it reaches a terminal state.
    SessionFinished {
        session_id: SessionId,
        outcome: SessionOutcome,
    },
}

impl ScanEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ScanEvent::StateChanged { .. } => "state_changed",
            ScanEvent::ProgressUpdated(_) => "progress_updated",
            ScanEvent::ModeSwitched { .. } => "mode_switched",
            ScanEvent::QualityAssessed { .. } => "quality_assessed",
            ScanEvent::TimedOut { .. } => "timed_out",
            ScanEvent::TransitionRejected { .. } => "transition_rejected",
            ScanEvent::SessionFinished { .. } => "session_finished",
        }
    }
}

/// Host-side receiver of engine events. Called synchronously on the thread
/// that applied the change; implementations should return quickly.
pub trait ScanObserver: Send + Sync {
    fn on_event(&self, event: &ScanEvent);
}

impl<F> ScanObserver for F
where
    F: Fn(&ScanEvent) + Send + Sync,
{
    fn on_event(&self, event: &ScanEvent) {
        self(event)
    }
}

/// Single dispatch point fanning events out to observers in registration
/// order. Cloning shares the observer list.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    observers: Arc<RwLock<Vec<Arc<dyn ScanObserver>>>>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("observer_count", &self.observer_count())
            .finish()
    }
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<O>(&self, observer: O)
    where
        O: ScanObserver + 'static,
    {
        self.observers.write().push(Arc::new(observer));
    }

    pub fn subscribe_shared(&self, observer: Arc<dyn ScanObserver>) {
        self.observers.write().push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().len()
    }

    pub fn dispatch(&self, event: ScanEvent) {
        // Snapshot so observers may subscribe further observers re-entrantly.
        let observers = self.observers.read().clone();
        tracing::trace!(target: "idscan::events", event = event.name(), observers = observers.len());
        for observer in observers {
            observer.on_event(&event);
        }
    }
}

/// Observer that forwards every event into a broadcast channel, for hosts
/// that consume events from async tasks.
pub struct BroadcastObserver {
    sender: broadcast::Sender<ScanEvent>,
    capacity: usize,
}

impl fmt::Debug for BroadcastObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastObserver")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl BroadcastObserver {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, capacity }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ScanEvent> {
        self.sender.subscribe()
    }
}

impl ScanObserver for BroadcastObserver {
    fn on_event(&self, event: &ScanEvent) {
        // No receivers is not an error; the host may subscribe later.
        let _ = self.sender.send(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn timed_out(ms: u64) -> ScanEvent {
        ScanEvent::TimedOut {
            kind: StrategyKind::Barcode,
            elapsed_ms: ms,
        }
    }

    #[test]
    fn dispatch_preserves_order_across_observers() {
        let dispatcher = EventDispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let log = Arc::clone(&log);
            dispatcher.subscribe(move |event: &ScanEvent| {
                if let ScanEvent::TimedOut { elapsed_ms, .. } = event {
                    log.lock().push((tag, *elapsed_ms));
                }
            });
        }

        dispatcher.dispatch(timed_out(1));
        dispatcher.dispatch(timed_out(2));

        assert_eq!(
            *log.lock(),
            vec![("first", 1), ("second", 1), ("first", 2), ("second", 2)]
        );
    }

    #[tokio::test]
    async fn broadcast_observer_forwards_events() {
        let dispatcher = EventDispatcher::new();
        let bridge = Arc::new(BroadcastObserver::new(8));
        let mut rx = bridge.subscribe();
        dispatcher.subscribe_shared(bridge);

        dispatcher.dispatch(timed_out(42));

        assert_eq!(rx.recv().await.unwrap(), timed_out(42));
    }

    #[test]
    fn events_serialize_with_tag() {
        let json = serde_json::to_value(timed_out(7)).unwrap();
        assert_eq!(json["event"], "timed_out");
        assert_eq!(json["kind"], "barcode");
        assert_eq!(json["elapsed_ms"], 7);
    }
}
