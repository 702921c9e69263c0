//! Quiet-period debouncing of file arrivals.
//!
//! [`Debouncer`] is a plain state machine driven by explicit instants, so the
//! timer thread in [`super::folder`] and the tests share the same logic:
//!
//! - **Idle**: nothing pending, no deadline.
//! - **Pending**: at least one path recorded, deadline armed at `last event + D`.
//!   Every further event re-arms the deadline.
//! - **Firing**: `poll` observed the deadline passed; the pending set is swapped
//!   out and handed to the caller, and the machine is Idle again.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source of the current instant for the debounce timer.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Used to simulate quiet periods.
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = self.offset.lock().unwrap_or_else(|e| e.into_inner());
        self.origin + *offset
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Poll {
    /// Nothing pending and no deadline armed.
    Idle,
    /// Deadline armed; check again after this long.
    Wait(Duration),
    /// Quiet period elapsed; the batch now belongs to the caller.
    Fire(Vec<PathBuf>),
}

#[derive(Debug)]
pub struct Debouncer {
    quiet_period: Duration,
    pending: Vec<PathBuf>,
    seen: HashSet<PathBuf>,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(quiet_period: Duration) -> Self {
        Self {
            quiet_period,
            pending: Vec::new(),
            seen: HashSet::new(),
            deadline: None,
        }
    }

    pub fn quiet_period(&self) -> Duration {
        self.quiet_period
    }

    /// Add a path and re-arm the deadline. Returns `false` if the path was
    /// already part of the pending batch (the deadline is re-armed either way).
    pub fn record(&mut self, path: PathBuf, now: Instant) -> bool {
        self.deadline = Some(now + self.quiet_period);
        if self.seen.insert(path.clone()) {
            self.pending.push(path);
            true
        } else {
            false
        }
    }

    pub fn poll(&mut self, now: Instant) -> Poll {
        match self.deadline {
            None => Poll::Idle,
            Some(deadline) if now < deadline => Poll::Wait(deadline - now),
            Some(_) => {
                self.deadline = None;
                if self.pending.is_empty() {
                    Poll::Idle
                } else {
                    Poll::Fire(self.take())
                }
            }
        }
    }

    /// Drain the pending batch immediately. An armed deadline stays armed and
    /// expires without firing.
    pub fn flush(&mut self) -> Vec<PathBuf> {
        self.take()
    }

    /// Disarm the deadline without touching the pending batch.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.seen.clear();
        std::mem::take(&mut self.pending)
    }
}
