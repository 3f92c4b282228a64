use std::time::Duration;

use nix::{
    sys::signal::{Signal, kill},
    unistd::Pid,
};
use tokio::process::Child;
use tracing::{debug, warn};

/// Send SIGTERM, wait up to `grace` for the child to exit, then SIGKILL.
pub async fn kill_graceful(child: &mut Child, grace: Duration) -> std::io::Result<std::process::ExitStatus> {
    let Some(id) = child.id() else {
        // Already reaped.
        return child.wait().await;
    };
    let pid = Pid::from_raw(id as i32);

    if let Err(e) = kill(pid, Signal::SIGTERM) {
        debug!(target: "warden::exec", pid = id, error = %e, "SIGTERM failed");
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(target: "warden::exec", pid = id, grace_ms = grace.as_millis() as u64, "stop timed out; sending SIGKILL");
            child.kill().await?;
            child.wait().await
        }
    }
}
