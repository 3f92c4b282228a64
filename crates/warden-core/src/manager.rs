//! Boot: start every unit enabled for a target and supervise them side by side.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use warden_model::ServiceUnit;

use crate::{
    error::CoreError,
    event::Bus,
    install::Installer,
    launcher::Launcher,
    supervisor::{Outcome, Supervisor, SupervisorConfig},
};

pub struct Manager {
    installer: Installer,
    launcher: Arc<dyn Launcher>,
    config: SupervisorConfig,
    bus: Bus,
}

impl Manager {
    pub fn new(installer: Installer, launcher: Arc<dyn Launcher>, config: SupervisorConfig) -> Self {
        Self {
            installer,
            launcher,
            config,
            bus: Bus::disabled(),
        }
    }

    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    pub fn installer(&self) -> &Installer {
        &self.installer
    }

    /// Units enabled for `target`. Units that fail to load are logged and skipped.
    pub fn load_target(&self, target: &str) -> Result<Vec<ServiceUnit>, CoreError> {
        let mut units = Vec::new();
        for path in self.installer.enabled_units(target)? {
            match ServiceUnit::load(&path) {
                Ok(unit) => units.push(unit),
                Err(e) => {
                    error!(target: "warden::core", path = %path.display(), error = %e, "skipping unit")
                }
            }
        }
        Ok(units)
    }

    /// Supervise one unit until it finishes or `cancel` fires.
    pub async fn run_unit(&self, unit: ServiceUnit, cancel: CancellationToken) -> Outcome {
        self.supervisor(unit).run(cancel).await
    }

    pub fn supervisor(&self, unit: ServiceUnit) -> Supervisor {
        Supervisor::new(Arc::new(unit), Arc::clone(&self.launcher), self.config.clone())
            .with_bus(self.bus.clone())
    }

    /// Start every unit enabled for `target` and wait until all of them have finished.
    pub async fn boot(
        &self,
        target: &str,
        cancel: CancellationToken,
    ) -> Result<Vec<(String, Outcome)>, CoreError> {
        let units = self.load_target(target)?;
        if units.is_empty() {
            warn!(target: "warden::core", target_unit = target, "no units enabled");
            return Ok(Vec::new());
        }
        info!(target: "warden::core", target_unit = target, units = units.len(), launcher = self.launcher.name(), "booting");

        let mut set = JoinSet::new();
        let mut pending: Vec<String> = units.iter().map(|u| u.name.clone()).collect();
        for unit in units {
            let name = unit.name.clone();
            let sup = self.supervisor(unit);
            let token = cancel.child_token();
            set.spawn(async move { (name, sup.run(token).await) });
        }

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, outcome)) => {
                    info!(target: "warden::core", unit = %name, ?outcome, "supervision ended");
                    pending.retain(|n| *n != name);
                    outcomes.push((name, outcome));
                }
                // The other supervisors keep running; the unit is named once all have ended.
                Err(e) => error!(target: "warden::core", error = %e, "supervisor task failed"),
            }
        }
        for name in pending {
            error!(target: "warden::core", unit = %name, "supervision ended without an outcome");
        }
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use warden_model::{ExecCommand, Termination};

    use super::*;
    use crate::launcher::{Instance, Invocation, LaunchError};

    /// Exits with the code named by the unit's first argument.
    struct ByArg;

    struct Done(i32);

    #[async_trait]
    impl Instance for Done {
        fn pid(&self) -> Option<u32> {
            Some(42)
        }
        async fn wait(&mut self, _: &CancellationToken, _: Duration) -> Result<Termination, LaunchError> {
            Ok(Termination::Exited(self.0))
        }
    }

    /// Exits cleanly after a short delay.
    struct Slow;

    #[async_trait]
    impl Instance for Slow {
        fn pid(&self) -> Option<u32> {
            Some(43)
        }
        async fn wait(&mut self, _: &CancellationToken, _: Duration) -> Result<Termination, LaunchError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(Termination::Exited(0))
        }
    }

    #[async_trait]
    impl Launcher for ByArg {
        fn name(&self) -> &'static str {
            "by-arg"
        }
        async fn run_pre(
            &self,
            _: &ServiceUnit,
            _: &ExecCommand,
            _: &Invocation,
            _: &CancellationToken,
        ) -> Result<Termination, LaunchError> {
            Ok(Termination::Exited(0))
        }
        async fn spawn(&self, unit: &ServiceUnit, _: &Invocation) -> Result<Box<dyn Instance>, LaunchError> {
            match unit.service.exec_start.args.first().map(String::as_str) {
                Some("panic") => panic!("launcher blew up"),
                Some("slow") => Ok(Box::new(Slow)),
                arg => Ok(Box::new(Done(arg.and_then(|a| a.parse().ok()).unwrap_or(0)))),
            }
        }
    }

    fn install(installer: &Installer, name: &str, body: &str) {
        let unit = ServiceUnit::parse(name, body).unwrap();
        installer.install(&unit).unwrap();
        installer.enable(&unit).unwrap();
    }

    #[tokio::test]
    async fn boot_runs_every_enabled_unit() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = Installer::new(tmp.path());
        install(&installer, "b.service", "[Service]\nExecStart=/bin/exit 3\n[Install]\nWantedBy=multi-user.target\n");
        install(&installer, "a.service", "[Service]\nExecStart=/bin/exit 0\n[Install]\nWantedBy=multi-user.target\n");
        install(&installer, "c.service", "[Service]\nExecStart=/bin/exit 0\n[Install]\nWantedBy=graphical.target\n");

        let config = SupervisorConfig { gate_network: false, ..SupervisorConfig::default() };
        let manager = Manager::new(installer, Arc::new(ByArg), config);
        let outcomes = manager.boot("multi-user.target", CancellationToken::new()).await.unwrap();

        assert_eq!(
            outcomes,
            [
                ("a.service".to_string(), Outcome::Finished(Termination::Exited(0))),
                ("b.service".to_string(), Outcome::Finished(Termination::Exited(3))),
            ]
        );
    }

    #[tokio::test]
    async fn failed_supervisor_does_not_stop_the_others() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = Installer::new(tmp.path());
        install(&installer, "a.service", "[Service]\nExecStart=/bin/x panic\n[Install]\nWantedBy=multi-user.target\n");
        install(&installer, "b.service", "[Service]\nExecStart=/bin/x slow\n[Install]\nWantedBy=multi-user.target\n");

        let config = SupervisorConfig { gate_network: false, ..SupervisorConfig::default() };
        let manager = Manager::new(installer, Arc::new(ByArg), config);
        let outcomes = manager.boot("multi-user.target", CancellationToken::new()).await.unwrap();

        assert_eq!(
            outcomes,
            [("b.service".to_string(), Outcome::Finished(Termination::Exited(0)))]
        );
    }

    #[tokio::test]
    async fn broken_unit_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let installer = Installer::new(tmp.path());
        install(&installer, "good.service", "[Service]\nExecStart=/bin/exit 0\n[Install]\nWantedBy=multi-user.target\n");
        std::fs::write(installer.unit_path("bad.service"), "[Service]\n").unwrap();
        std::os::unix::fs::symlink(
            installer.unit_path("bad.service"),
            tmp.path().join("multi-user.target.wants/bad.service"),
        )
        .unwrap();

        let manager = Manager::new(installer, Arc::new(ByArg), SupervisorConfig::default());
        let units = manager.load_target("multi-user.target").unwrap();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].name, "good.service");
    }

    #[tokio::test]
    async fn empty_target_boots_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let manager = Manager::new(Installer::new(tmp.path()), Arc::new(ByArg), SupervisorConfig::default());
        assert!(manager.boot("multi-user.target", CancellationToken::new()).await.unwrap().is_empty());
    }
}
