//! Supervisor lifecycle events and their fan-out.

mod bus;
pub use bus::{Bus, BusWorkers, Subscribe};

use std::time::SystemTime;

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Waiting for the network before the first start.
    NetworkWait,
    /// Network did not come up in time; starting anyway.
    NetworkTimeout,
    /// A start attempt begins (pre-commands, then spawn).
    Starting,
    /// An `ExecStartPre=` command failed and aborted the attempt.
    PreFailed,
    /// The main process has been spawned.
    Started,
    /// The main process ended (or could not be started).
    Exited,
    /// Another start follows after a delay.
    RestartScheduled,
    /// Too many starts within the start-limit window; supervision stops.
    StartLimitHit,
    /// Stop requested from outside.
    StopRequested,
    /// Supervision ended.
    Stopped,
}

/// Lifecycle event of one unit.
///
/// Optional fields are only set for the kinds they are meaningful for.
#[derive(Debug, Clone)]
pub struct Event {
    pub unit: String,
    pub kind: EventKind,
    pub attempt: Option<u32>,
    pub pid: Option<u32>,
    pub delay_ms: Option<u64>,
    pub reason: Option<String>,
    pub at: SystemTime,
}

impl Event {
    pub fn new(kind: EventKind, unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            kind,
            attempt: None,
            pid: None,
            delay_ms: None,
            reason: None,
            at: SystemTime::now(),
        }
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_pid(mut self, pid: Option<u32>) -> Self {
        self.pid = pid;
        self
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = Some(delay_ms);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
