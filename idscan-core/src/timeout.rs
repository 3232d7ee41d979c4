//! Timer and retry subsystem.
//!
//! Timers live in a registry keyed by [`TimerKey`], so there is at most one
//! pending timer per key and cancellation is a key lookup. A firing timer
//! claims its registry slot under the lock before doing anything else; a
//! timer cleared first finds its slot gone (or reused) and exits silently.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use idscan_model::{DetectorError, StrategyKind};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, Sleep};
use crate::config::{FallbackConfig, OrchestratorConfig, RetryConfig};
use crate::events::{EventDispatcher, ScanEvent};

/// Registry slot a timer occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    Barcode,
    Ocr,
    /// Grace delay spent in `fallback_transition`.
    ModeSwitch,
}

impl From<StrategyKind> for TimerKey {
    fn from(kind: StrategyKind) -> Self {
        match kind {
            StrategyKind::Barcode => TimerKey::Barcode,
            StrategyKind::Ocr => TimerKey::Ocr,
        }
    }
}

/// Opaque token for one pending timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeoutHandle {
    id: u64,
    key: TimerKey,
}

impl TimeoutHandle {
    pub fn key(&self) -> TimerKey {
        self.key
    }
}

/// Passed to the expiry callback of a strategy timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutFired {
    pub kind: StrategyKind,
    pub elapsed_ms: u64,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    active: HashMap<TimerKey, ActiveTimer>,
}

#[derive(Debug)]
struct ActiveTimer {
    id: u64,
    started_at: Instant,
    task: JoinHandle<()>,
}

impl Registry {
    /// Removes the slot only if it still belongs to timer `id`.
    fn claim(&mut self, key: TimerKey, id: u64) -> bool {
        match self.active.get(&key) {
            Some(timer) if timer.id == id => {
                self.active.remove(&key);
                true
            }
            _ => false,
        }
    }
}

/// Owns every timer of a session plus the retry loop used for detector calls.
///
/// Timers run as tokio tasks, so the manager must be used from within a
/// tokio runtime.
#[derive(Debug)]
pub struct ScanTimeoutManager {
    budgets: FallbackConfig,
    retry: RetryConfig,
    grace: Duration,
    clock: Arc<dyn Clock>,
    events: EventDispatcher,
    registry: Arc<Mutex<Registry>>,
    epoch: Option<Instant>,
    cancel: CancellationToken,
}

impl ScanTimeoutManager {
    pub fn new(config: &OrchestratorConfig, clock: Arc<dyn Clock>, events: EventDispatcher) -> Self {
        Self {
            budgets: config.fallback,
            retry: config.retry,
            grace: config.transition_grace(),
            clock,
            events,
            registry: Arc::new(Mutex::new(Registry::default())),
            epoch: None,
            cancel: CancellationToken::new(),
        }
    }

    /// New budgets apply to timers started afterwards; pending timers keep
    /// the duration they were started with.
    pub fn reconfigure(&mut self, config: &OrchestratorConfig) {
        self.budgets = config.fallback;
        self.retry = config.retry;
        self.grace = config.transition_grace();
    }

    pub fn budget(&self, kind: StrategyKind) -> Duration {
        match kind {
            StrategyKind::Barcode => self.budgets.barcode_timeout(),
            StrategyKind::Ocr => self.budgets.ocr_timeout(),
        }
    }

    /// Marks the start of elapsed-time bookkeeping for a new session.
    pub fn begin(&mut self) {
        self.epoch = Some(self.clock.now());
    }

    /// Starts the timer for `kind`, replacing any pending timer of that kind.
    ///
    /// `on_timeout` runs exactly once on the timer task when it expires; a
    /// timer cleared before it fires never calls it. The callback should only
    /// hand the expiry back to the owner of the session, which then calls
    /// [`report_timeout`](Self::report_timeout).
    pub fn start_timeout<F>(&mut self, kind: StrategyKind, on_timeout: F) -> TimeoutHandle
    where
        F: FnOnce(TimeoutFired) + Send + 'static,
    {
        self.resume_timeout(kind, Duration::ZERO, on_timeout)
    }

    /// Like [`start_timeout`](Self::start_timeout) for a strategy that has
    /// already run for `spent`. Only the rest of the budget is waited for and
    /// the reported elapsed time includes `spent`.
    pub fn resume_timeout<F>(
        &mut self,
        kind: StrategyKind,
        spent: Duration,
        on_timeout: F,
    ) -> TimeoutHandle
    where
        F: FnOnce(TimeoutFired) + Send + 'static,
    {
        if self.epoch.is_none() {
            self.begin();
        }
        let budget = self.budget(kind);
        let now = self.clock.now();
        let started_at = now.checked_sub(spent).unwrap_or(now);
        tracing::debug!(
            target: "idscan::timeout",
            kind = %kind,
            budget_ms = budget.as_millis() as u64,
            spent_ms = spent.as_millis() as u64,
            "timer started"
        );
        self.schedule(
            kind.into(),
            started_at,
            budget.saturating_sub(spent),
            move |elapsed| {
                on_timeout(TimeoutFired {
                    kind,
                    elapsed_ms: elapsed.as_millis() as u64,
                })
            },
        )
    }

    /// Logs an expiry and dispatches [`ScanEvent::TimedOut`]. Called by the
    /// session owner once it has accepted the expiry as current.
    pub fn report_timeout(&self, fired: TimeoutFired) {
        tracing::info!(
            target: "idscan::timeout",
            kind = %fired.kind,
            elapsed_ms = fired.elapsed_ms,
            "strategy timed out"
        );
        self.events.dispatch(ScanEvent::TimedOut {
            kind: fired.kind,
            elapsed_ms: fired.elapsed_ms,
        });
    }

    /// Starts the mode-switch grace delay. No timeout event is emitted.
    pub fn start_grace<F>(&mut self, on_elapsed: F) -> TimeoutHandle
    where
        F: FnOnce() + Send + 'static,
    {
        let now = self.clock.now();
        self.schedule(TimerKey::ModeSwitch, now, self.grace, move |_| on_elapsed())
    }

    fn schedule<F>(
        &mut self,
        key: TimerKey,
        started_at: Instant,
        duration: Duration,
        on_fire: F,
    ) -> TimeoutHandle
    where
        F: FnOnce(Duration) + Send + 'static,
    {
        let sleep: Sleep = self.clock.sleep(duration);
        let clock = Arc::clone(&self.clock);
        let registry = Arc::clone(&self.registry);

        let mut guard = self.registry.lock();
        if let Some(previous) = guard.active.remove(&key) {
            previous.task.abort();
        }
        let id = guard.next_id;
        guard.next_id += 1;

        let task = tokio::spawn(async move {
            sleep.await;
            if !registry.lock().claim(key, id) {
                return;
            }
            on_fire(clock.now().duration_since(started_at));
        });
        guard.active.insert(
            key,
            ActiveTimer {
                id,
                started_at,
                task,
            },
        );

        TimeoutHandle { id, key }
    }

    /// Cancels one timer. Clearing a fired or already-cleared timer is a no-op.
    pub fn clear_timer(&mut self, handle: TimeoutHandle) {
        let mut registry = self.registry.lock();
        let owned = registry
            .active
            .get(&handle.key)
            .is_some_and(|timer| timer.id == handle.id);
        if owned && let Some(timer) = registry.active.remove(&handle.key) {
            timer.task.abort();
        }
    }

    /// Cancels whatever timer currently occupies `key`.
    pub fn clear_key(&mut self, key: TimerKey) {
        if let Some(timer) = self.registry.lock().active.remove(&key) {
            timer.task.abort();
        }
    }

    pub fn clear_all_timers(&mut self) {
        let drained: Vec<ActiveTimer> = {
            let mut registry = self.registry.lock();
            registry.active.drain().map(|(_, timer)| timer).collect()
        };
        if !drained.is_empty() {
            tracing::debug!(target: "idscan::timeout", cleared = drained.len(), "timers cleared");
        }
        for timer in drained {
            timer.task.abort();
        }
    }

    /// Clears every timer, pre-empts in-flight retry loops and zeroes the
    /// elapsed-time bookkeeping.
    pub fn reset(&mut self) {
        self.clear_all_timers();
        self.cancel_retries();
        self.epoch = None;
    }

    /// Stops every retry loop handed out so far at its next backoff.
    pub fn cancel_retries(&mut self) {
        self.cancel.cancel();
        self.cancel = CancellationToken::new();
    }

    pub fn is_active(&self, key: TimerKey) -> bool {
        self.registry.lock().active.contains_key(&key)
    }

    pub fn active_timers(&self) -> usize {
        self.registry.lock().active.len()
    }

    /// Time since [`begin`](Self::begin) or the first timer after a reset.
    pub fn elapsed(&self) -> Duration {
        self.epoch
            .map(|epoch| self.clock.now().duration_since(epoch))
            .unwrap_or_default()
    }

    /// Time the pending timer for `kind` has been running.
    pub fn elapsed_for(&self, kind: StrategyKind) -> Option<Duration> {
        let now = self.clock.now();
        self.registry
            .lock()
            .active
            .get(&TimerKey::from(kind))
            .map(|timer| now.duration_since(timer.started_at))
    }

    /// Timing-only check: has the barcode budget been used up?
    ///
    /// Fatal detector errors never justify a fallback. This is one input to
    /// the state machine's policy and does not decide anything by itself.
    pub fn should_trigger_fallback(&self, error: Option<&DetectorError>, elapsed: Duration) -> bool {
        if error.is_some_and(|err| err.kind.is_fatal()) {
            return false;
        }
        elapsed >= self.budgets.barcode_timeout()
    }

    /// Retry loop bound to the current session; [`reset`](Self::reset)
    /// pre-empts it.
    pub fn retry_runner(&self) -> RetryRunner {
        RetryRunner {
            clock: Arc::clone(&self.clock),
            backoff: self.retry.backoff(),
            cancel: self.cancel.child_token(),
        }
    }

    pub async fn optimized_retry<T, E, F, Fut>(&self, operation: F, max_attempts: u32) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.retry_runner().run(operation, max_attempts).await
    }
}

impl Drop for ScanTimeoutManager {
    fn drop(&mut self) {
        self.clear_all_timers();
        self.cancel.cancel();
    }
}

/// Fixed-backoff retry loop detached from the manager so it can run on its
/// own task.
#[derive(Debug, Clone)]
pub struct RetryRunner {
    clock: Arc<dyn Clock>,
    backoff: Duration,
    cancel: CancellationToken,
}

impl RetryRunner {
    /// Runs `operation` up to `max_attempts` times (at least once), waiting
    /// the fixed backoff between failures. Intermediate failures are
    /// swallowed; the last one is returned unmodified. Cancellation stops
    /// the loop at the next backoff with the most recent failure.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F, max_attempts: u32) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt >= max_attempts => return Err(err),
                Err(err) => {
                    tracing::trace!(target: "idscan::timeout", attempt, max_attempts, "retrying after failure");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Err(err),
                        _ = self.clock.sleep(self.backoff) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
