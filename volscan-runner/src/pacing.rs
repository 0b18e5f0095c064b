//! Blocking waits and the rate-limit backoff ladder.

use std::sync::Mutex;
use std::time::Duration;

/// Blocks the caller for a duration.
///
/// Production code uses `ThreadSleeper`; tests swap in `RecordingSleeper` so
/// backoff schedules can be asserted without waiting.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Records requested sleeps and returns immediately.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recorded(&self) -> Vec<Duration> {
        match self.slept.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        match self.slept.lock() {
            Ok(mut guard) => guard.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
    }
}

/// Escalating waits consumed one per consecutive rate-limit episode.
///
/// `next_wait` hands out the steps in order and returns `None` once all of
/// them have been used since the last `reset`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffLadder {
    steps: Vec<Duration>,
    next: usize,
}

impl BackoffLadder {
    pub fn new(steps: Vec<Duration>) -> Self {
        Self { steps, next: 0 }
    }

    pub fn next_wait(&mut self) -> Option<Duration> {
        let wait = self.steps.get(self.next).copied()?;
        self.next += 1;
        Some(wait)
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }

    /// Steps handed out since the last reset.
    pub fn used(&self) -> usize {
        self.next
    }

    pub fn is_exhausted(&self) -> bool {
        self.next >= self.steps.len()
    }

    pub fn steps(&self) -> &[Duration] {
        &self.steps
    }
}

impl Default for BackoffLadder {
    fn default() -> Self {
        Self::new(vec![
            Duration::from_secs(300),
            Duration::from_secs(600),
            Duration::from_secs(1200),
        ])
    }
}
