//! Seam between supervision and process execution.
//!
//! The supervisor only decides *when* to start and stop; a [`Launcher`] decides *how*.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use warden_model::{ExecCommand, ServiceUnit, Termination};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("spawn failed: {0}")]
    Spawn(String),
    #[error("identity: {0}")]
    Identity(String),
    #[error("working directory: {0}")]
    WorkingDirectory(String),
    #[error("environment: {0}")]
    Environment(String),
    #[error("wait failed: {0}")]
    Wait(String),
}

/// One start attempt of a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// 128-bit random id, lower-case hex without dashes.
    pub id: String,
    /// 1-based start counter.
    pub attempt: u32,
}

impl Invocation {
    pub fn new(attempt: u32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            attempt,
        }
    }
}

#[async_trait]
pub trait Launcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Run one `ExecStartPre=` command to completion.
    async fn run_pre(
        &self,
        unit: &ServiceUnit,
        cmd: &ExecCommand,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<Termination, LaunchError>;

    /// Spawn the main process. Returns once the process exists.
    async fn spawn(
        &self,
        unit: &ServiceUnit,
        invocation: &Invocation,
    ) -> Result<Box<dyn Instance>, LaunchError>;
}

/// A running main process.
#[async_trait]
pub trait Instance: Send {
    fn pid(&self) -> Option<u32>;

    /// Wait for exit. When `cancel` fires, stop the process (SIGTERM, then SIGKILL after `grace`)
    /// and return how it ended.
    async fn wait(
        &mut self,
        cancel: &CancellationToken,
        grace: Duration,
    ) -> Result<Termination, LaunchError>;
}
