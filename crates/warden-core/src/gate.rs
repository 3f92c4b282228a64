//! Start ordering: "after the network is available".
//!
//! A unit ordered after `network.target`/`network-online.target` is held back until a
//! non-loopback interface reports itself up, or until the configured wait runs out.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::supervisor::SupervisorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateResult {
    Ready,
    TimedOut,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct NetworkGate {
    sysfs_net: PathBuf,
    poll: Duration,
    timeout: Duration,
}

impl NetworkGate {
    pub fn new(sysfs_net: impl Into<PathBuf>, poll: Duration, timeout: Duration) -> Self {
        Self {
            sysfs_net: sysfs_net.into(),
            poll,
            timeout,
        }
    }

    pub fn from_config(cfg: &SupervisorConfig) -> Self {
        Self::new(cfg.sysfs_net.clone(), cfg.network_poll, cfg.network_wait)
    }

    /// Whether any non-loopback interface is operationally up right now.
    pub fn is_up(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.sysfs_net) else {
            return false;
        };
        entries
            .filter_map(Result::ok)
            .filter(|e| e.file_name() != "lo")
            .any(|e| link_is_up(&e.path()))
    }

    pub async fn wait(&self, cancel: &CancellationToken) -> GateResult {
        let deadline = tokio::time::Instant::now() + self.timeout;
        loop {
            if self.is_up() {
                return GateResult::Ready;
            }
            if tokio::time::Instant::now() >= deadline {
                return GateResult::TimedOut;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.poll) => {}
                _ = cancel.cancelled() => return GateResult::Cancelled,
            }
        }
    }
}

fn link_is_up(iface: &Path) -> bool {
    match fs::read_to_string(iface.join("operstate")) {
        Ok(state) => {
            let state = state.trim();
            trace!(target: "warden::core", iface = %iface.display(), state, "link state");
            // Tunnels and point-to-point links report "unknown" while passing traffic.
            state == "up" || state == "unknown"
        }
        Err(_) => false,
    }
}
