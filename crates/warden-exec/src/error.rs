use std::path::PathBuf;

use thiserror::Error;
use warden_core::LaunchError;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("unknown user: {0}")]
    UnknownUser(String),
    #[error("unknown group: {0}")]
    UnknownGroup(String),
    #[error("user database lookup for {name}: {reason}")]
    Lookup { name: String, reason: String },
    #[error("working directory {path} is not accessible: {reason}")]
    WorkingDirectory { path: PathBuf, reason: String },
    #[error("environment file {path}: {reason}")]
    EnvironmentFile { path: PathBuf, reason: String },
    #[error("spawn {program} failed: {reason}")]
    Spawn { program: PathBuf, reason: String },
    #[error("io error: {0}")]
    Io(String),
}

pub type ExecResult<T> = Result<T, ExecError>;

impl From<std::io::Error> for ExecError {
    fn from(e: std::io::Error) -> Self {
        ExecError::Io(e.to_string())
    }
}

impl From<ExecError> for LaunchError {
    fn from(e: ExecError) -> Self {
        let msg = e.to_string();
        match e {
            ExecError::UnknownUser(_) | ExecError::UnknownGroup(_) | ExecError::Lookup { .. } => {
                LaunchError::Identity(msg)
            }
            ExecError::WorkingDirectory { .. } => LaunchError::WorkingDirectory(msg),
            ExecError::EnvironmentFile { .. } => LaunchError::Environment(msg),
            ExecError::Spawn { .. } => LaunchError::Spawn(msg),
            ExecError::Io(_) => LaunchError::Wait(msg),
        }
    }
}
