use std::{path::Path, process::Stdio};

use tokio::process::Command;
use tracing::{debug, trace};
use warden_model::{ExecCommand, OutputTarget, ServiceUnit};

use crate::{
    error::{ExecError, ExecResult},
    utils::{env::build_env, identity::Identity, limits::attach_rlimits},
};

/// Which of the unit's execution settings apply to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// `User=`, `Group=` and `WorkingDirectory=` all apply.
    Unit,
    /// `+` prefix: the manager's credentials, the unit's working directory.
    Elevated,
    /// Pre-start command under `PermissionsStartOnly=`: the manager's credentials, run in `/`.
    StartOnly,
}

impl Privilege {
    pub fn for_main(exec: &ExecCommand) -> Self {
        if exec.privileged { Privilege::Elevated } else { Privilege::Unit }
    }

    pub fn for_pre(unit: &ServiceUnit, exec: &ExecCommand) -> Self {
        if unit.service.permissions_start_only {
            Privilege::StartOnly
        } else {
            Self::for_main(exec)
        }
    }

    fn keeps_credentials(self) -> bool {
        self != Privilege::Unit
    }
}

/// Build the command for one process of `unit`.
pub fn build_command(
    unit: &ServiceUnit,
    exec: &ExecCommand,
    invocation_id: &str,
    privilege: Privilege,
) -> ExecResult<Command> {
    let service = &unit.service;
    let identity = if privilege.keeps_credentials() {
        None
    } else {
        Identity::resolve(service.user.as_deref(), service.group.as_deref())?
    };
    let env = build_env(unit, invocation_id, identity.as_ref())?;

    trace!(
        target: "warden::exec",
        unit = %unit.name,
        program = %exec.program.display(),
        args = ?exec.args,
        ?privilege,
        "build command"
    );

    let mut cmd = Command::new(&exec.program);
    cmd.args(&exec.args);
    cmd.env_clear();
    cmd.envs(env);
    if privilege == Privilege::StartOnly {
        cmd.current_dir("/");
    } else {
        cmd.current_dir(working_directory(unit)?);
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(stdio_for(service.standard_output));
    cmd.stderr(stdio_for(service.effective_stderr()));
    cmd.kill_on_drop(true);

    attach_rlimits(&mut cmd, &service.limits);
    if let Some(id) = identity.filter(|id| !id.is_current()) {
        debug!(target: "warden::exec", unit = %unit.name, uid = id.uid.as_raw(), gid = id.gid.as_raw(), "switching identity");
        attach_identity(&mut cmd, &id)?;
    }
    Ok(cmd)
}

fn working_directory(unit: &ServiceUnit) -> ExecResult<&Path> {
    let Some(wd) = &unit.service.working_directory else {
        return Ok(Path::new("/"));
    };
    match std::fs::metadata(&wd.path) {
        Ok(meta) if meta.is_dir() => Ok(wd.path.as_path()),
        _ if wd.optional => {
            debug!(target: "warden::exec", unit = %unit.name, path = %wd.path.display(), "optional working directory missing");
            Ok(Path::new("/"))
        }
        Ok(_) => Err(ExecError::WorkingDirectory {
            path: wd.path.clone(),
            reason: "not a directory".into(),
        }),
        Err(e) => Err(ExecError::WorkingDirectory {
            path: wd.path.clone(),
            reason: e.to_string(),
        }),
    }
}

fn stdio_for(target: OutputTarget) -> Stdio {
    match target {
        OutputTarget::Journal | OutputTarget::JournalConsole => Stdio::piped(),
        OutputTarget::Inherit => Stdio::inherit(),
        OutputTarget::Null => Stdio::null(),
    }
}

/// Drop to the unit's credentials in the child. Supplementary groups are only
/// reset when running as root.
///
/// The group list is resolved here, before the fork; the hook itself only makes
/// async-signal-safe calls.
fn attach_identity(cmd: &mut Command, id: &Identity) -> ExecResult<()> {
    use nix::unistd::{Uid, setgid, setgroups, setuid};

    let uid = id.uid;
    let gid = id.gid;
    let groups = if Uid::effective().is_root() {
        Some(id.groups()?)
    } else {
        None
    };

    unsafe {
        cmd.pre_exec(move || {
            if let Some(groups) = &groups {
                setgroups(groups)?;
            }
            setgid(gid)?;
            setuid(uid)?;
            Ok(())
        });
    }
    Ok(())
}
