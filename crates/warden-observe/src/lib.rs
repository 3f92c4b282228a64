//! Logging setup for the manager and a subscriber that turns supervisor
//! events into log records.

mod logger;
pub use logger::*;

#[cfg(feature = "subscriber")]
mod subscriber;
#[cfg(feature = "subscriber")]
pub use subscriber::*;
