//! Fixed-interval timer polled by the host event loop.
//!
//! The host drives time: callers pass `now` into [`Interval::poll`] on every
//! loop turn, which keeps the timer deterministic under test.

use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct Interval {
    period: Duration,
    next_due: Option<Instant>,
}

impl Interval {
    /// A stopped timer with the given period.
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            next_due: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Start (or restart) the timer; the first tick is due one period from `now`.
    pub fn start(&mut self, now: Instant) {
        self.next_due = Some(now + self.period);
    }

    pub fn stop(&mut self) {
        self.next_due = None;
    }

    pub fn is_running(&self) -> bool {
        self.next_due.is_some()
    }

    /// Returns true at most once per elapsed period.
    ///
    /// Missed periods are not replayed; the next tick is scheduled one period
    /// after `now`.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_due {
            Some(due) if now >= due => {
                self.next_due = Some(now + self.period);
                true
            }
            _ => false,
        }
    }
}
