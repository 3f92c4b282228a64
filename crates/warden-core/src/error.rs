use thiserror::Error;

use warden_model::ParseError;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unit parse error: {0}")]
    Parse(#[from] ParseError),
    #[error("unit {0} has no [Install] targets; it cannot be enabled")]
    NotInstallable(String),
    #[error("unit {0} is not installed in the unit directory")]
    NotInstalled(String),
    #[error("unit {unit} names invalid target {target:?}")]
    InvalidTarget { unit: String, target: String },
    #[error("{path}: {reason}")]
    Io { path: String, reason: String },
}

impl CoreError {
    pub(crate) fn io(path: impl AsRef<std::path::Path>, e: std::io::Error) -> Self {
        CoreError::Io {
            path: path.as_ref().display().to_string(),
            reason: e.to_string(),
        }
    }
}
