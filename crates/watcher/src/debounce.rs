//! Debounce state machine
//!
//! Collapses a burst of triggers into one action that runs once the
//! configured delay has passed without a new trigger.
//!
//! ```text
//! Idle --schedule--> Pending --poll_due (deadline reached)--> Fired
//!   ^                 |  ^                                      |
//!   +----cancel-------+  +--schedule (resets deadline)----------+
//! ```

use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebounceState {
    /// Nothing scheduled
    Idle,
    /// Waiting for the quiet period to end
    Pending,
    /// The last pending period completed
    Fired,
}

/// Single pending deadline, reset on every trigger
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    deadline: Option<Instant>,
    state: DebounceState,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
            state: DebounceState::Idle,
        }
    }

    /// Arm (or re-arm) the deadline at `now + delay`.
    ///
    /// Returns true when an already pending deadline was pushed back.
    pub fn schedule(&mut self, now: Instant) -> bool {
        let reset = self.state == DebounceState::Pending;
        self.deadline = Some(now + self.delay);
        self.state = DebounceState::Pending;
        reset
    }

    /// Drop the pending deadline, if any. Returns true if one was dropped.
    pub fn cancel(&mut self) -> bool {
        let was_pending = self.state == DebounceState::Pending;
        self.deadline = None;
        if was_pending {
            self.state = DebounceState::Idle;
        }
        was_pending
    }

    /// Transition Pending -> Fired once the deadline has passed.
    ///
    /// True at most once per pending period.
    pub fn poll_due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if self.state == DebounceState::Pending && now >= deadline => {
                self.deadline = None;
                self.state = DebounceState::Fired;
                true
            }
            _ => false,
        }
    }

    /// Future completing at the current deadline; never completes when idle.
    ///
    /// Owns a copy of the deadline so the debouncer stays free to mutate
    /// while the future is polled in a `select!`.
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let deadline = self.deadline;
        async move {
            match deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        }
    }

    pub fn state(&self) -> DebounceState {
        self.state
    }

    pub fn is_pending(&self) -> bool {
        self.state == DebounceState::Pending
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }
}
