//! Time source for scheduling, grace periods and batch deadlines
//!
//! Production code reads the wall clock; tests drive a [`ManualClock`].

use chrono::{DateTime, Duration, SubsecRound, Utc};
use std::sync::Mutex;

/// Source of "now"
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock, optionally advancing by a fixed step on every read
#[derive(Debug)]
pub struct ManualClock {
    state: Mutex<ManualState>,
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    step: Duration,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_step(start, Duration::zero())
    }

    /// Every call to [`Clock::now`] returns the current value, then advances by `step`
    pub fn with_step(start: DateTime<Utc>, step: Duration) -> Self {
        Self {
            state: Mutex::new(ManualState { now: start, step }),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        self.lock().now = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut state = self.lock();
        state.now += by;
    }

    pub fn set_step(&self, step: Duration) {
        self.lock().step = step;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // A poisoned clock still holds a valid instant
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let mut state = self.lock();
        let now = state.now;
        let step = state.step;
        state.now += step;
        now
    }
}

/// Truncate to whole microseconds (answer timestamps)
pub fn truncate_micros(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(6)
}

/// Truncate to whole seconds (reschedule results)
pub fn truncate_secs(t: DateTime<Utc>) -> DateTime<Utc> {
    t.trunc_subsecs(0)
}
