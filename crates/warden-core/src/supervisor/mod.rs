//! Supervision of one unit.
//!
//! The unit moves between two states, [`ServiceState::Stopped`] and [`ServiceState::Running`].
//! Every exit from `Running` is offered to the unit's restart policy; when the policy asks for
//! another run, the supervisor waits `RestartSec=` and starts again, bounded by the start limit.
//! Exactly one process instance exists at any time.

mod config;
pub use config::SupervisorConfig;

mod limit;
pub use limit::StartLimiter;

use std::sync::Arc;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use warden_model::{ServiceState, ServiceUnit, Termination, unit::format_timespan};

use crate::{
    event::{Bus, Event, EventKind},
    gate::{GateResult, NetworkGate},
    launcher::{Invocation, Launcher},
};

/// Snapshot of a supervised unit, published on every transition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceStatus {
    pub state: ServiceState,
    /// Number of start attempts so far.
    pub attempt: u32,
    pub pid: Option<u32>,
    pub invocation: Option<String>,
    pub last_exit: Option<Termination>,
}

/// Why supervision ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Stop was requested.
    Stopped,
    /// The process ended and the restart policy declined another run.
    Finished(Termination),
    /// Too many starts within the start-limit window.
    StartLimitHit,
}

pub struct Supervisor {
    unit: Arc<ServiceUnit>,
    launcher: Arc<dyn Launcher>,
    config: SupervisorConfig,
    bus: Bus,
    status: watch::Sender<ServiceStatus>,
}

impl Supervisor {
    pub fn new(unit: Arc<ServiceUnit>, launcher: Arc<dyn Launcher>, config: SupervisorConfig) -> Self {
        let (status, _) = watch::channel(ServiceStatus::default());
        Self {
            unit,
            launcher,
            config,
            bus: Bus::disabled(),
            status,
        }
    }

    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = bus;
        self
    }

    pub fn unit(&self) -> &ServiceUnit {
        &self.unit
    }

    /// Subscribe to status transitions.
    pub fn status(&self) -> watch::Receiver<ServiceStatus> {
        self.status.subscribe()
    }

    fn emit(&self, event: Event) {
        self.bus.publish(event);
    }

    fn event(&self, kind: EventKind) -> Event {
        Event::new(kind, self.unit.name.clone())
    }

    /// Supervise until stopped, until the restart policy declines, or until the start limit is hit.
    #[instrument(level = "debug", skip(self, cancel), fields(unit = %self.unit.name))]
    pub async fn run(&self, cancel: CancellationToken) -> Outcome {
        let unit = Arc::clone(&self.unit);
        let service = &unit.service;

        if self.config.gate_network && unit.wants_network() && self.wait_network(&cancel).await {
            return self.finish_stopped();
        }

        let mut limiter = StartLimiter::new(unit.unit.start_limit_interval, unit.unit.start_limit_burst);
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return self.finish_stopped();
            }
            if !limiter.admit(tokio::time::Instant::now()) {
                warn!(
                    target: "warden::core",
                    unit = %unit.name,
                    burst = unit.unit.start_limit_burst,
                    interval = %format_timespan(unit.unit.start_limit_interval),
                    "start request repeated too quickly; giving up"
                );
                self.status.send_modify(|s| {
                    s.state = ServiceState::Failed;
                    s.pid = None;
                });
                self.emit(self.event(EventKind::StartLimitHit).with_attempt(attempt));
                return Outcome::StartLimitHit;
            }

            attempt += 1;
            let invocation = Invocation::new(attempt);
            let termination = self.start_once(&invocation, &cancel).await;

            self.status.send_modify(|s| {
                s.state = ServiceState::Stopped;
                s.pid = None;
                s.last_exit = Some(termination.clone());
            });
            self.emit(
                self.event(EventKind::Exited)
                    .with_attempt(attempt)
                    .with_reason(termination.to_string()),
            );

            if cancel.is_cancelled() {
                return self.finish_stopped();
            }
            if !service.restart.should_restart(&termination) {
                info!(
                    target: "warden::core",
                    unit = %unit.name,
                    restart = service.restart.as_str(),
                    %termination,
                    "not restarting"
                );
                self.emit(self.event(EventKind::Stopped).with_reason(termination.to_string()));
                return Outcome::Finished(termination);
            }

            let delay = service.restart_sec;
            self.emit(
                self.event(EventKind::RestartScheduled)
                    .with_attempt(attempt)
                    .with_delay_ms(delay.as_millis().min(u64::MAX as u128) as u64)
                    .with_reason(termination.to_string()),
            );
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return self.finish_stopped(),
            }
        }
    }

    /// Returns `true` when cancelled while waiting.
    async fn wait_network(&self, cancel: &CancellationToken) -> bool {
        let gate = NetworkGate::from_config(&self.config);
        if gate.is_up() {
            return false;
        }
        self.emit(self.event(EventKind::NetworkWait));
        match gate.wait(cancel).await {
            GateResult::Ready => false,
            GateResult::Cancelled => true,
            GateResult::TimedOut => {
                warn!(
                    target: "warden::core",
                    unit = %self.unit.name,
                    waited = %format_timespan(self.config.network_wait),
                    "network not up in time; starting anyway"
                );
                self.emit(self.event(EventKind::NetworkTimeout));
                false
            }
        }
    }

    /// One attempt: pre-commands, spawn, wait. Every failure is folded into a [`Termination`].
    async fn start_once(&self, invocation: &Invocation, cancel: &CancellationToken) -> Termination {
        let unit = &self.unit;
        self.status.send_modify(|s| {
            s.attempt = invocation.attempt;
            s.invocation = Some(invocation.id.clone());
        });
        self.emit(self.event(EventKind::Starting).with_attempt(invocation.attempt));

        for pre in &unit.service.exec_start_pre {
            let program = pre.program.display().to_string();
            let failure = match self.launcher.run_pre(unit, pre, invocation, cancel).await {
                Ok(t) if t.is_success() => None,
                Ok(t) => Some(t.to_string()),
                Err(e) => Some(e.to_string()),
            };
            let Some(reason) = failure else { continue };
            if pre.ignore_failure {
                debug!(target: "warden::core", unit = %unit.name, %program, %reason, "pre-start command failed; ignored");
                continue;
            }
            self.emit(
                self.event(EventKind::PreFailed)
                    .with_attempt(invocation.attempt)
                    .with_reason(format!("{program}: {reason}")),
            );
            return Termination::StartFailed(format!("{program}: {reason}"));
        }

        let mut instance = match self.launcher.spawn(unit, invocation).await {
            Ok(instance) => instance,
            Err(e) => return Termination::StartFailed(e.to_string()),
        };

        let pid = instance.pid();
        self.status.send_modify(|s| {
            s.state = ServiceState::Running;
            s.pid = pid;
        });
        self.emit(
            self.event(EventKind::Started)
                .with_attempt(invocation.attempt)
                .with_pid(pid),
        );

        let stop_watch = cancel.clone();
        let bus = self.bus.clone();
        let name = unit.name.clone();
        let announce = tokio::spawn(async move {
            stop_watch.cancelled().await;
            bus.publish(Event::new(EventKind::StopRequested, name).with_pid(pid));
        });

        let result = instance.wait(cancel, unit.service.timeout_stop_sec).await;
        announce.abort();

        match result {
            Ok(t) => t,
            Err(e) => Termination::StartFailed(e.to_string()),
        }
    }

    fn finish_stopped(&self) -> Outcome {
        self.status.send_modify(|s| {
            if s.state != ServiceState::Failed {
                s.state = ServiceState::Stopped;
            }
            s.pid = None;
        });
        self.emit(self.event(EventKind::Stopped).with_reason("stop requested"));
        Outcome::Stopped
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicU32, Ordering},
        },
        time::Duration,
    };

    use async_trait::async_trait;
    use warden_model::{ExecCommand, RestartPolicy};

    use super::*;
    use crate::{
        event::Subscribe,
        launcher::{Instance, LaunchError},
    };

    /// Plays back a fixed list of terminations, then runs until cancelled.
    struct Scripted {
        script: Mutex<VecDeque<Result<Termination, LaunchError>>>,
        pre: Mutex<VecDeque<Termination>>,
        spawns: AtomicU32,
    }

    impl Scripted {
        fn new(script: Vec<Result<Termination, LaunchError>>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                pre: Mutex::new(VecDeque::new()),
                spawns: AtomicU32::new(0),
            })
        }

        fn spawns(&self) -> u32 {
            self.spawns.load(Ordering::SeqCst)
        }
    }

    struct Fake {
        pid: u32,
        outcome: Option<Termination>,
    }

    #[async_trait]
    impl Instance for Fake {
        fn pid(&self) -> Option<u32> {
            Some(self.pid)
        }

        async fn wait(
            &mut self,
            cancel: &CancellationToken,
            _grace: Duration,
        ) -> Result<Termination, LaunchError> {
            match self.outcome.take() {
                Some(t) => Ok(t),
                None => {
                    cancel.cancelled().await;
                    Ok(Termination::Signaled(15))
                }
            }
        }
    }

    #[async_trait]
    impl Launcher for Scripted {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn run_pre(
            &self,
            _unit: &ServiceUnit,
            _cmd: &ExecCommand,
            _invocation: &Invocation,
            _cancel: &CancellationToken,
        ) -> Result<Termination, LaunchError> {
            Ok(self.pre.lock().unwrap().pop_front().unwrap_or(Termination::Exited(0)))
        }

        async fn spawn(
            &self,
            _unit: &ServiceUnit,
            _invocation: &Invocation,
        ) -> Result<Box<dyn Instance>, LaunchError> {
            let n = self.spawns.fetch_add(1, Ordering::SeqCst) + 1;
            match self.script.lock().unwrap().pop_front() {
                Some(Ok(t)) => Ok(Box::new(Fake { pid: 1000 + n, outcome: Some(t) })),
                Some(Err(e)) => Err(e),
                None => Ok(Box::new(Fake { pid: 1000 + n, outcome: None })),
            }
        }
    }

    struct Kinds(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Kinds {
        async fn on_event(&self, event: &Event) {
            self.0.lock().unwrap().push(event.kind);
        }
        fn name(&self) -> &'static str {
            "kinds"
        }
    }

    fn unit(restart: RestartPolicy) -> Arc<ServiceUnit> {
        let text = format!(
            "[Unit]\nStartLimitBurst=0\n[Service]\nExecStart=/usr/bin/python3 main.py\nRestart={}\nRestartSec=0\n",
            restart.as_str()
        );
        Arc::new(ServiceUnit::parse("audio-recorder.service", &text).unwrap())
    }

    fn config() -> SupervisorConfig {
        SupervisorConfig {
            gate_network: false,
            ..SupervisorConfig::default()
        }
    }

    #[tokio::test]
    async fn always_restarts_exactly_once_per_exit_for_every_code() {
        let script = vec![
            Ok(Termination::Exited(0)),
            Ok(Termination::Exited(1)),
            Ok(Termination::Exited(255)),
            Ok(Termination::Signaled(9)),
            Ok(Termination::Signaled(15)),
        ];
        let exits = script.len() as u32;
        let launcher = Scripted::new(script);
        let kinds = Arc::new(Kinds(Mutex::new(Vec::new())));
        let (bus, workers) = Bus::start(vec![kinds.clone() as Arc<dyn Subscribe>]);

        let sup = Arc::new(Supervisor::new(unit(RestartPolicy::Always), launcher.clone(), config()).with_bus(bus));
        let mut status = sup.status();
        let cancel = CancellationToken::new();

        let run = tokio::spawn({
            let sup = Arc::clone(&sup);
            let cancel = cancel.clone();
            async move { sup.run(cancel).await }
        });

        // After the scripted exits the next instance stays up.
        status
            .wait_for(|s| s.state == ServiceState::Running && s.attempt == exits + 1)
            .await
            .unwrap();
        assert_eq!(launcher.spawns(), exits + 1);

        cancel.cancel();
        assert_eq!(run.await.unwrap(), Outcome::Stopped);
        drop(sup);
        workers.join().await;

        let kinds = kinds.0.lock().unwrap().clone();
        let count = |k: EventKind| kinds.iter().filter(|x| **x == k).count() as u32;
        assert_eq!(count(EventKind::Starting), exits + 1);
        assert_eq!(count(EventKind::Started), exits + 1);
        assert_eq!(count(EventKind::RestartScheduled), exits);
        assert_eq!(count(EventKind::Exited), exits + 1);
        assert_eq!(kinds.last(), Some(&EventKind::Stopped));
    }

    #[tokio::test]
    async fn policy_no_finishes_after_first_exit() {
        let launcher = Scripted::new(vec![Ok(Termination::Exited(3))]);
        let sup = Supervisor::new(unit(RestartPolicy::No), launcher.clone(), config());

        let outcome = sup.run(CancellationToken::new()).await;
        assert_eq!(outcome, Outcome::Finished(Termination::Exited(3)));
        assert_eq!(launcher.spawns(), 1);

        let status = sup.status().borrow().clone();
        assert_eq!(status.state, ServiceState::Stopped);
        assert_eq!(status.last_exit, Some(Termination::Exited(3)));
    }

    #[tokio::test]
    async fn on_failure_stops_after_clean_exit() {
        let launcher = Scripted::new(vec![Ok(Termination::Exited(1)), Ok(Termination::Exited(0))]);
        let sup = Supervisor::new(unit(RestartPolicy::OnFailure), launcher.clone(), config());

        let outcome = sup.run(CancellationToken::new()).await;
        assert_eq!(outcome, Outcome::Finished(Termination::Exited(0)));
        assert_eq!(launcher.spawns(), 2);
    }

    #[tokio::test]
    async fn spawn_failure_is_restarted_under_always() {
        let launcher = Scripted::new(vec![
            Err(LaunchError::Spawn("No such file or directory".into())),
            Err(LaunchError::Identity("unknown user pi".into())),
        ]);
        let sup = Arc::new(Supervisor::new(unit(RestartPolicy::Always), launcher.clone(), config()));
        let mut status = sup.status();
        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let sup = Arc::clone(&sup);
            let cancel = cancel.clone();
            async move { sup.run(cancel).await }
        });

        status.wait_for(|s| s.state == ServiceState::Running).await.unwrap();
        assert_eq!(launcher.spawns(), 3);
        assert!(matches!(
            status.borrow().last_exit,
            Some(Termination::StartFailed(_))
        ));

        cancel.cancel();
        assert_eq!(run.await.unwrap(), Outcome::Stopped);
    }

    #[tokio::test]
    async fn start_limit_bounds_restarts() {
        let text = "[Unit]\nStartLimitBurst=3\nStartLimitIntervalSec=1h\n\
                    [Service]\nExecStart=/bin/false\nRestart=always\nRestartSec=0\n";
        let unit = Arc::new(ServiceUnit::parse("x.service", text).unwrap());
        let launcher = Scripted::new((0..10).map(|_| Ok(Termination::Exited(1))).collect());
        let sup = Supervisor::new(unit, launcher.clone(), config());

        assert_eq!(sup.run(CancellationToken::new()).await, Outcome::StartLimitHit);
        assert_eq!(launcher.spawns(), 3);
        assert_eq!(sup.status().borrow().state, ServiceState::Failed);
    }

    #[tokio::test]
    async fn failing_pre_command_aborts_the_attempt() {
        let text = "[Service]\nExecStartPre=/bin/mkdir -p /var/lib/rec\nExecStart=/bin/true\n";
        let unit = Arc::new(ServiceUnit::parse("x.service", text).unwrap());
        let launcher = Scripted::new(vec![]);
        launcher.pre.lock().unwrap().push_back(Termination::Exited(1));
        let sup = Supervisor::new(unit, launcher.clone(), config());

        let outcome = sup.run(CancellationToken::new()).await;
        assert!(matches!(outcome, Outcome::Finished(Termination::StartFailed(_))));
        assert_eq!(launcher.spawns(), 0);
    }

    #[tokio::test]
    async fn ignored_pre_failure_still_starts() {
        let text = "[Service]\nExecStartPre=-/bin/mkdir /var/lib/rec\nExecStart=/bin/true\n";
        let unit = Arc::new(ServiceUnit::parse("x.service", text).unwrap());
        let launcher = Scripted::new(vec![Ok(Termination::Exited(0))]);
        launcher.pre.lock().unwrap().push_back(Termination::Exited(1));
        let sup = Supervisor::new(unit, launcher.clone(), config());

        assert_eq!(
            sup.run(CancellationToken::new()).await,
            Outcome::Finished(Termination::Exited(0))
        );
        assert_eq!(launcher.spawns(), 1);
    }

    #[tokio::test]
    async fn cancel_during_restart_delay_stops() {
        let text = "[Service]\nExecStart=/bin/false\nRestart=always\nRestartSec=1h\n";
        let unit = Arc::new(ServiceUnit::parse("x.service", text).unwrap());
        let launcher = Scripted::new(vec![Ok(Termination::Exited(1))]);
        let sup = Arc::new(Supervisor::new(unit, launcher.clone(), config()));
        let mut status = sup.status();
        let cancel = CancellationToken::new();
        let run = tokio::spawn({
            let sup = Arc::clone(&sup);
            let cancel = cancel.clone();
            async move { sup.run(cancel).await }
        });

        status.wait_for(|s| s.last_exit.is_some()).await.unwrap();
        cancel.cancel();
        assert_eq!(run.await.unwrap(), Outcome::Stopped);
        assert_eq!(launcher.spawns(), 1);
    }
}
