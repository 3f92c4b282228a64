//! `LimitNOFILE=`, `LimitFSIZE=`, `LimitCORE=` applied to the child process.
//!
//! Limits are set inside a `pre_exec` hook, in the child after `fork()` and before `execve()`,
//! so the program never runs without them. Soft and hard limits are set to the same value.
use tokio::process::Command;
#[cfg(not(unix))]
use tracing::warn;
use warden_model::ResourceLimits;

/// Attach `setrlimit` calls for every limit in `limits` to `cmd`.
pub fn attach_rlimits(cmd: &mut Command, limits: &ResourceLimits) {
    if limits.is_empty() {
        return;
    }

    #[cfg(unix)]
    {
        unix_impl::attach_rlimits(cmd, limits);
    }

    #[cfg(not(unix))]
    {
        warn!(
            target: "warden::exec",
            ?limits,
            "resource limits requested on a non-Unix OS; limits will be ignored"
        );
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::io;

    use tokio::process::Command;
    use warden_model::ResourceLimits;

    pub fn attach_rlimits(cmd: &mut Command, limits: &ResourceLimits) {
        let ResourceLimits { nofile, fsize, core } = *limits;

        unsafe {
            cmd.pre_exec(move || {
                if let Some(v) = nofile {
                    apply_rlimit(libc::RLIMIT_NOFILE, v)?;
                }
                if let Some(v) = fsize {
                    apply_rlimit(libc::RLIMIT_FSIZE, v)?;
                }
                if let Some(v) = core {
                    apply_rlimit(libc::RLIMIT_CORE, v)?;
                }
                Ok(())
            });
        }
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    type Resource = libc::__rlimit_resource_t;
    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    type Resource = libc::c_int;

    fn to_rlim(value: u64) -> libc::rlim_t {
        if value == u64::MAX {
            libc::RLIM_INFINITY
        } else {
            value as libc::rlim_t
        }
    }

    fn apply_rlimit(resource: Resource, value: u64) -> io::Result<()> {
        let rlim = libc::rlimit {
            rlim_cur: to_rlim(value),
            rlim_max: to_rlim(value),
        };

        let rc = unsafe { libc::setrlimit(resource, &rlim) };
        if rc != 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_limits_are_noop() {
        let limits = ResourceLimits::default();
        assert!(limits.is_empty());

        let mut cmd = Command::new("/bin/true");
        attach_rlimits(&mut cmd, &limits);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nofile_limit_reaches_child() {
        let limits = ResourceLimits {
            nofile: Some(64),
            fsize: None,
            core: Some(0),
        };
        let mut cmd = Command::new("/bin/sh");
        cmd.arg("-c").arg("ulimit -n");
        cmd.stdout(std::process::Stdio::piped());
        attach_rlimits(&mut cmd, &limits);

        let out = cmd.output().await.unwrap();
        assert!(out.status.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "64");
    }
}
