use std::{os::unix::process::ExitStatusExt, process::ExitStatus, time::Duration};

use async_trait::async_trait;
use tokio::{process::Child, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use warden_core::{Instance, Invocation, LaunchError, Launcher};
use warden_model::{ExecCommand, ServiceUnit, Termination};

use crate::{error::ExecError, util::kill_graceful};

pub mod command;
pub use command::{Privilege, build_command};

pub mod output;

/// How long output readers may keep running once the process has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Launches unit processes as real child processes of the manager.
pub struct ProcLauncher {
    name: &'static str,
}

impl ProcLauncher {
    pub fn new() -> Self {
        Self { name: "proc" }
    }

    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    fn start(
        &self,
        unit: &ServiceUnit,
        exec: &ExecCommand,
        invocation: &Invocation,
        privilege: Privilege,
    ) -> Result<(Child, Vec<JoinHandle<()>>), ExecError> {
        let mut cmd = build_command(unit, exec, &invocation.id, privilege)?;
        let mut child = cmd.spawn().map_err(|e| ExecError::Spawn {
            program: exec.program.clone(),
            reason: e.to_string(),
        })?;
        trace!(target: "warden::exec", unit = %unit.name, pid = child.id(), program = %exec.program.display(), "spawned");
        let pumps = output::attach(&mut child, unit);
        Ok((child, pumps))
    }
}

impl Default for ProcLauncher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Launcher for ProcLauncher {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn run_pre(
        &self,
        unit: &ServiceUnit,
        cmd: &ExecCommand,
        invocation: &Invocation,
        cancel: &CancellationToken,
    ) -> Result<Termination, LaunchError> {
        let (child, pumps) = self.start(unit, cmd, invocation, Privilege::for_pre(unit, cmd))?;
        let mut instance = ProcInstance {
            child,
            pid: None,
            pumps,
        };
        instance.wait(cancel, unit.service.timeout_stop_sec).await
    }

    async fn spawn(
        &self,
        unit: &ServiceUnit,
        invocation: &Invocation,
    ) -> Result<Box<dyn Instance>, LaunchError> {
        let exec = &unit.service.exec_start;
        let (child, pumps) = self.start(unit, exec, invocation, Privilege::for_main(exec))?;
        let pid = child.id();
        Ok(Box::new(ProcInstance { child, pid, pumps }))
    }
}

/// A spawned child plus the tasks routing its output.
pub struct ProcInstance {
    child: Child,
    pid: Option<u32>,
    pumps: Vec<JoinHandle<()>>,
}

#[async_trait]
impl Instance for ProcInstance {
    fn pid(&self) -> Option<u32> {
        self.pid.or_else(|| self.child.id())
    }

    async fn wait(
        &mut self,
        cancel: &CancellationToken,
        grace: Duration,
    ) -> Result<Termination, LaunchError> {
        let status = tokio::select! {
            status = self.child.wait() => status,
            _ = cancel.cancelled() => {
                debug!(target: "warden::exec", pid = self.pid(), "stop requested; terminating child");
                kill_graceful(&mut self.child, grace).await
            }
        };
        let status = status.map_err(|e| LaunchError::Wait(e.to_string()))?;

        // Pick up the tail of the output.
        output::drain(std::mem::take(&mut self.pumps), DRAIN_GRACE).await;
        Ok(classify(status))
    }
}

pub fn classify(status: ExitStatus) -> Termination {
    match (status.code(), status.signal()) {
        (Some(code), _) => Termination::Exited(code),
        (None, Some(sig)) => Termination::Signaled(sig),
        (None, None) => Termination::StartFailed(format!("unrecognised exit status {status}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_exit_and_signal() {
        assert_eq!(classify(ExitStatus::from_raw(0)), Termination::Exited(0));
        assert_eq!(classify(ExitStatus::from_raw(3 << 8)), Termination::Exited(3));
        assert_eq!(classify(ExitStatus::from_raw(9)), Termination::Signaled(9));
        assert_eq!(classify(ExitStatus::from_raw(15)), Termination::Signaled(15));
    }
}
