//! Time source abstraction.
//!
//! Every component reads time through [`Clock`] so timer-driven behaviour can
//! be tested deterministically. [`TokioClock`] is backed by tokio's timer and
//! therefore honours `tokio::time::pause`; [`ManualClock`] only moves when a
//! test advances it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Boxed sleep future returned by [`Clock::sleep`].
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Trait for providing time in tests and production
pub trait Clock: Send + Sync + fmt::Debug + 'static {
    /// Get the current instant
    fn now(&self) -> Instant;

    /// Get the current UTC datetime
    fn utc_now(&self) -> DateTime<Utc>;

    /// Sleep for a duration
    fn sleep(&self, duration: Duration) -> Sleep;
}

/// Production clock driven by the tokio timer.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        Box::pin(tokio::time::sleep(duration))
    }
}

pub fn tokio_clock() -> Arc<dyn Clock> {
    Arc::new(TokioClock)
}

/// Virtual clock for tests. Time only moves through [`ManualClock::advance`].
#[derive(Clone, Debug)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualState>>,
    base_instant: Instant,
    base_utc: DateTime<Utc>,
}

#[derive(Debug)]
struct ManualState {
    offset: Duration,
    next_sleeper: u64,
    sleepers: Vec<Sleeper>,
}

#[derive(Debug)]
struct Sleeper {
    id: u64,
    deadline: Duration,
    waker: Option<Waker>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::new_at(Utc::now())
    }

    /// Create a manual clock whose wall time starts at `start`.
    pub fn new_at(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualState {
                offset: Duration::ZERO,
                next_sleeper: 0,
                sleepers: Vec::new(),
            })),
            base_instant: Instant::now(),
            base_utc: start,
        }
    }

    /// Advance time by a duration, waking every sleeper whose deadline passed.
    pub fn advance(&self, duration: Duration) {
        let wakers = {
            let mut state = self.inner.lock();
            state.offset += duration;
            let now = state.offset;
            let mut woken = Vec::new();
            state.sleepers.retain_mut(|sleeper| {
                if sleeper.deadline <= now {
                    if let Some(waker) = sleeper.waker.take() {
                        woken.push(waker);
                    }
                    false
                } else {
                    true
                }
            });
            woken
        };

        // Wake outside the lock; a woken task may poll the clock immediately.
        for waker in wakers {
            waker.wake();
        }
    }

    pub fn advance_ms(&self, millis: u64) {
        self.advance(Duration::from_millis(millis));
    }

    /// Time elapsed since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.inner.lock().offset
    }

    /// Number of sleep futures still waiting on a deadline.
    pub fn pending_sleepers(&self) -> usize {
        self.inner.lock().sleepers.len()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base_instant + self.elapsed()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        let offset = chrono::Duration::from_std(self.elapsed()).unwrap_or(chrono::Duration::MAX);
        self.base_utc + offset
    }

    fn sleep(&self, duration: Duration) -> Sleep {
        let deadline = self.elapsed() + duration;
        Box::pin(ManualSleep {
            inner: Arc::clone(&self.inner),
            deadline,
            id: None,
        })
    }
}

/// Future that completes once the manual clock reaches its deadline.
struct ManualSleep {
    inner: Arc<Mutex<ManualState>>,
    deadline: Duration,
    id: Option<u64>,
}

impl Future for ManualSleep {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.inner.lock();
        if state.offset >= self.deadline {
            return Poll::Ready(());
        }

        match self.id {
            None => {
                let id = state.next_sleeper;
                state.next_sleeper += 1;
                state.sleepers.push(Sleeper {
                    id,
                    deadline: self.deadline,
                    waker: Some(cx.waker().clone()),
                });
                drop(state);
                self.id = Some(id);
            }
            Some(id) => {
                if let Some(sleeper) = state.sleepers.iter_mut().find(|sleeper| sleeper.id == id) {
                    sleeper.waker = Some(cx.waker().clone());
                }
            }
        }
        Poll::Pending
    }
}
