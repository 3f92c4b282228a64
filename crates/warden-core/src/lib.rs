pub mod error;
pub use error::CoreError;

pub mod event;
pub use event::{Bus, BusWorkers, Event, EventKind, Subscribe};

pub mod gate;
pub use gate::{GateResult, NetworkGate};

pub mod install;
pub use install::{Change, Installer};

pub mod launcher;
pub use launcher::{Instance, Invocation, LaunchError, Launcher};

pub mod manager;
pub use manager::Manager;

pub mod supervisor;
pub use supervisor::{Outcome, ServiceStatus, StartLimiter, Supervisor, SupervisorConfig};
