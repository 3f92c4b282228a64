use std::{path::PathBuf, time::Duration};

/// Host-wide supervision settings. Per-unit settings live in the unit file.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Honour `After=network.target` by waiting for a link before the first start.
    pub gate_network: bool,
    /// Upper bound on that wait; the unit starts anyway afterwards.
    pub network_wait: Duration,
    pub network_poll: Duration,
    /// Where network interfaces are listed.
    pub sysfs_net: PathBuf,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            gate_network: true,
            network_wait: Duration::from_secs(30),
            network_poll: Duration::from_millis(500),
            sysfs_net: PathBuf::from("/sys/class/net"),
        }
    }
}
