use std::{
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
};

use anyhow::{Context, bail};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use warden_core::{Bus, Installer, Manager, Outcome, Subscribe, Supervisor};
use warden_exec::ProcLauncher;
use warden_model::ServiceUnit;
use warden_observe::Journal;

use crate::config::Settings;

/// A path to a unit file, or the name of an installed unit.
pub fn resolve_unit(installer: &Installer, arg: &str) -> anyhow::Result<ServiceUnit> {
    let path = Path::new(arg);
    if arg.contains('/') || path.exists() {
        return load_file(path);
    }
    installer
        .load(arg)
        .with_context(|| format!("loading {arg} from {}", installer.unit_dir().display()))
}

pub fn load_file(path: &Path) -> anyhow::Result<ServiceUnit> {
    ServiceUnit::load(path).with_context(|| format!("loading {}", path.display()))
}

pub fn check(path: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let unit = load_file(path)?;
    serde_json::to_writer_pretty(&mut *out, &unit)?;
    writeln!(out)?;
    Ok(())
}

pub fn render(path: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let unit = load_file(path)?;
    out.write_all(unit.render().as_bytes())?;
    Ok(())
}

pub fn install(settings: &Settings, path: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let unit = load_file(path)?;
    let installer = Installer::new(&settings.unit_dir);
    let dest = installer.install(&unit)?;
    writeln!(out, "Installed {} as {}.", path.display(), dest.display())?;
    Ok(())
}

pub fn enable(settings: &Settings, arg: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let installer = Installer::new(&settings.unit_dir);
    let unit = resolve_unit(&installer, arg)?;
    for change in installer.enable(&unit)? {
        writeln!(out, "{change}")?;
    }
    Ok(())
}

pub fn disable(settings: &Settings, arg: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let installer = Installer::new(&settings.unit_dir);
    let unit = resolve_unit(&installer, arg)?;
    for change in installer.disable(&unit)? {
        writeln!(out, "{change}")?;
    }
    Ok(())
}

pub fn status(settings: &Settings, arg: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let installer = Installer::new(&settings.unit_dir);
    let unit = resolve_unit(&installer, arg)?;
    let installed: PathBuf = installer.unit_path(&unit.name);

    writeln!(
        out,
        "{} - {}",
        unit.name,
        unit.unit.description.as_deref().unwrap_or("(no description)")
    )?;
    if installed.exists() {
        let state = if installer.is_enabled(&unit) { "enabled" } else { "disabled" };
        writeln!(out, "     Loaded: {} ({state})", installed.display())?;
    } else {
        writeln!(out, "     Loaded: not installed")?;
    }
    let exec = &unit.service.exec_start;
    writeln!(out, "  ExecStart: {} {}", exec.program.display(), exec.args.join(" "))?;
    writeln!(out, "    Restart: {}", unit.service.restart.as_str())?;
    let targets: Vec<&str> = unit.targets().collect();
    if !targets.is_empty() {
        writeln!(out, "   WantedBy: {}", targets.join(" "))?;
    }
    Ok(())
}

fn is_failure(outcome: &Outcome) -> bool {
    match outcome {
        Outcome::Stopped => false,
        Outcome::Finished(t) => !t.is_success(),
        Outcome::StartLimitHit => true,
    }
}

fn exit_code(outcome: &Outcome) -> ExitCode {
    if is_failure(outcome) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn event_bus() -> (Bus, warden_core::BusWorkers) {
    Bus::start(vec![Arc::new(Journal::new()) as Arc<dyn Subscribe>])
}

pub async fn run(settings: &Settings, arg: &str) -> anyhow::Result<ExitCode> {
    let installer = Installer::new(&settings.unit_dir);
    let unit = resolve_unit(&installer, arg)?;

    let (bus, workers) = event_bus();
    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone())?;

    let supervisor = Supervisor::new(
        Arc::new(unit),
        Arc::new(ProcLauncher::new()),
        settings.supervisor.clone(),
    )
    .with_bus(bus);
    let outcome = supervisor.run(cancel).await;
    info!(target: "warden::core", unit = %supervisor.unit().name, ?outcome, "supervision ended");

    drop(supervisor);
    workers.join().await;
    Ok(exit_code(&outcome))
}

pub async fn boot(settings: &Settings, target: Option<String>) -> anyhow::Result<ExitCode> {
    let target = target.unwrap_or_else(|| settings.default_target.clone());
    let (bus, workers) = event_bus();
    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone())?;

    let manager = Manager::new(
        Installer::new(&settings.unit_dir),
        Arc::new(ProcLauncher::new()),
        settings.supervisor.clone(),
    )
    .with_bus(bus);
    let outcomes = manager.boot(&target, cancel).await?;

    drop(manager);
    workers.join().await;

    if outcomes.is_empty() {
        bail!("no units enabled for {target}");
    }
    let failed = outcomes.iter().filter(|(_, o)| is_failure(o)).count();
    if failed > 0 {
        warn!(target: "warden::core", failed, total = outcomes.len(), "some units ended in failure");
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Cancel `cancel` on the first SIGINT or SIGTERM.
fn spawn_shutdown_listener(cancel: CancellationToken) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut int = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = term.recv() => "SIGTERM",
            _ = int.recv() => "SIGINT",
        };
        info!(target: "warden::core", signal = name, "shutdown requested");
        cancel.cancel();
    });
    Ok(())
}
