//! Data model of a supervised service: the unit descriptor, its parser and
//! renderer, and the small domain types shared by the supervisor and the
//! process launcher.

mod error;
pub use error::ParseError;

mod domain;
pub use domain::*;

pub mod unit;
pub use unit::{
    EnvFile, ExecCommand, InstallSection, OutputTarget, ResourceLimits, RestartPolicy,
    ServiceSection, ServiceType, ServiceUnit, UnitSection,
};

/// Name of a unit file, e.g. `audio-recorder.service`.
pub type UnitName = String;
