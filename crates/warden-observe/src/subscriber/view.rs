use std::borrow::Borrow;

use tracing::{debug, error, info, warn};
use warden_core::{Event, EventKind};

/// Read access to an event with defaults for the fields a kind does not carry.
pub trait View {
    fn as_unit(&self) -> &str;
    fn as_reason(&self) -> &str;
    fn attempt(&self) -> u32;
    fn pid(&self) -> u32;
    fn delay_ms(&self) -> u64;
    fn kind(&self) -> EventKind;
}

impl<T> View for T
where
    T: Borrow<Event>,
{
    #[inline]
    fn as_unit(&self) -> &str {
        &self.borrow().unit
    }
    #[inline]
    fn as_reason(&self) -> &str {
        self.borrow().reason.as_deref().unwrap_or("unknown")
    }
    #[inline]
    fn attempt(&self) -> u32 {
        self.borrow().attempt.unwrap_or(0)
    }
    #[inline]
    fn pid(&self) -> u32 {
        self.borrow().pid.unwrap_or(0)
    }
    #[inline]
    fn delay_ms(&self) -> u64 {
        self.borrow().delay_ms.unwrap_or(0)
    }
    #[inline]
    fn kind(&self) -> EventKind {
        self.borrow().kind
    }
}

#[inline]
pub fn message_for(kind: EventKind) -> &'static str {
    match kind {
        // ordering
        EventKind::NetworkWait => "waiting for network",
        EventKind::NetworkTimeout => "network wait timed out; starting anyway",

        // lifecycle
        EventKind::Starting => "starting",
        EventKind::PreFailed => "pre-start command failed",
        EventKind::Started => "started",
        EventKind::Exited => "main process exited",
        EventKind::RestartScheduled => "scheduled restart",

        // terminal
        EventKind::StartLimitHit => "start request repeated too quickly; refusing to start",
        EventKind::StopRequested => "stopping",
        EventKind::Stopped => "stopped",
    }
}

#[inline]
pub fn log_event<E: View>(e: E) {
    let msg = message_for(e.kind());

    match e.kind() {
        EventKind::NetworkWait => debug!(target: "warden::event", unit = e.as_unit(), "{msg}"),
        EventKind::NetworkTimeout => warn!(target: "warden::event", unit = e.as_unit(), "{msg}"),

        EventKind::Starting => {
            info!(target: "warden::event", unit = e.as_unit(), attempt = e.attempt(), "{msg}")
        }
        EventKind::PreFailed => error!(
            target: "warden::event",
            unit = e.as_unit(),
            attempt = e.attempt(),
            reason = e.as_reason(),
            "{msg}"
        ),
        EventKind::Started => info!(
            target: "warden::event",
            unit = e.as_unit(),
            attempt = e.attempt(),
            pid = e.pid(),
            "{msg}"
        ),
        EventKind::Exited => info!(
            target: "warden::event",
            unit = e.as_unit(),
            attempt = e.attempt(),
            reason = e.as_reason(),
            "{msg}"
        ),
        EventKind::RestartScheduled => info!(
            target: "warden::event",
            unit = e.as_unit(),
            attempt = e.attempt(),
            delay_ms = e.delay_ms(),
            reason = e.as_reason(),
            "{msg}"
        ),

        EventKind::StartLimitHit => {
            error!(target: "warden::event", unit = e.as_unit(), attempt = e.attempt(), "{msg}")
        }
        EventKind::StopRequested => {
            info!(target: "warden::event", unit = e.as_unit(), pid = e.pid(), "{msg}")
        }
        EventKind::Stopped => {
            info!(target: "warden::event", unit = e.as_unit(), reason = e.as_reason(), "{msg}")
        }
    }
}
