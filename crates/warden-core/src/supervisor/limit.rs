use std::{collections::VecDeque, time::Duration};

use tokio::time::Instant;

/// Rate bound on starts: at most `burst` starts within any `interval` window.
///
/// A zero `burst` or zero `interval` disables the bound.
#[derive(Debug)]
pub struct StartLimiter {
    interval: Duration,
    burst: u32,
    starts: VecDeque<Instant>,
}

impl StartLimiter {
    pub fn new(interval: Duration, burst: u32) -> Self {
        Self {
            interval,
            burst,
            starts: VecDeque::new(),
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.burst == 0 || self.interval.is_zero()
    }

    /// Record a start at `now` if it stays within the bound.
    pub fn admit(&mut self, now: Instant) -> bool {
        if self.is_disabled() {
            return true;
        }
        while let Some(first) = self.starts.front() {
            if now.saturating_duration_since(*first) >= self.interval {
                self.starts.pop_front();
            } else {
                break;
            }
        }
        if self.starts.len() >= self.burst as usize {
            return false;
        }
        self.starts.push_back(now);
        true
    }
}
