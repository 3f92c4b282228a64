use std::{
    io,
    path::Path,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use tokio_util::sync::CancellationToken;
use warden_core::{Instance, Invocation, LaunchError, Launcher};
use warden_exec::ProcLauncher;
use warden_model::{ServiceUnit, Termination};

fn unit(service: &str) -> ServiceUnit {
    ServiceUnit::parse("sample.service", &format!("[Service]\n{service}\n")).unwrap()
}

async fn run_to_end(unit: &ServiceUnit) -> Result<Termination, LaunchError> {
    let launcher = ProcLauncher::new();
    let mut instance = launcher.spawn(unit, &Invocation::new(1)).await?;
    assert!(instance.pid().is_some());
    instance.wait(&CancellationToken::new(), Duration::from_secs(5)).await
}

fn read(path: &Path) -> String {
    std::fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn exit_code_is_reported() {
    let u = unit("ExecStart=/bin/sh -c \"exit 7\"");
    assert_eq!(run_to_end(&u).await.unwrap(), Termination::Exited(7));
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    let u = unit("ExecStart=/nonexistent/warden/missing");
    let err = ProcLauncher::new()
        .spawn(&u, &Invocation::new(1))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, LaunchError::Spawn(_)));
}

#[tokio::test]
async fn environment_is_assembled_from_scratch() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("env.out");
    let u = unit(&format!(
        "ExecStart=/bin/sh -c \"env > {}\"\nEnvironment=\"GREETING=hello world\" PATH=/usr/bin:/bin",
        out.display()
    ));

    let launcher = ProcLauncher::new();
    let invocation = Invocation::new(1);
    let mut instance = launcher.spawn(&u, &invocation).await.unwrap();
    let t = instance
        .wait(&CancellationToken::new(), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(t.is_success());

    let env = read(&out);
    assert!(env.lines().any(|l| l == "GREETING=hello world"));
    assert!(env.lines().any(|l| l == "PATH=/usr/bin:/bin"));
    assert!(env.lines().any(|l| l == format!("INVOCATION_ID={}", invocation.id)));
    assert!(!env.lines().any(|l| l.starts_with("CARGO=")));
}

#[tokio::test]
async fn working_directory_is_applied() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().canonicalize().unwrap();
    let u = unit(&format!(
        "ExecStart=/bin/sh -c \"pwd > pwd.out\"\nWorkingDirectory={}",
        work.display()
    ));
    assert!(run_to_end(&u).await.unwrap().is_success());
    assert_eq!(read(&work.join("pwd.out")).trim(), work.display().to_string());
}

#[tokio::test]
async fn missing_working_directory() {
    let required = unit("ExecStart=/bin/true\nWorkingDirectory=/nonexistent/warden");
    assert!(matches!(
        run_to_end(&required).await,
        Err(LaunchError::WorkingDirectory(_))
    ));

    let optional = unit("ExecStart=/bin/true\nWorkingDirectory=-/nonexistent/warden");
    assert!(run_to_end(&optional).await.unwrap().is_success());
}

#[tokio::test]
async fn runs_as_configured_user() {
    let tmp = tempfile::tempdir().unwrap();
    let out = tmp.path().join("id.out");
    let uid = nix::unistd::Uid::effective().as_raw();
    let gid = nix::unistd::Gid::effective().as_raw();
    let u = unit(&format!(
        "ExecStart=/bin/sh -c \"id -u > {0}; id -g >> {0}\"\nUser={uid}\nGroup={gid}",
        out.display()
    ));
    assert!(run_to_end(&u).await.unwrap().is_success());
    assert_eq!(read(&out), format!("{uid}\n{gid}\n"));
}

#[tokio::test]
async fn unknown_user_is_an_identity_error() {
    let u = unit("ExecStart=/bin/true\nUser=no-such-user-warden");
    assert!(matches!(
        run_to_end(&u).await,
        Err(LaunchError::Identity(_))
    ));
}

#[tokio::test]
async fn stop_sends_sigterm() {
    let u = unit("ExecStart=/bin/sleep 30");
    let mut instance = ProcLauncher::new()
        .spawn(&u, &Invocation::new(1))
        .await
        .unwrap();

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        stop.cancel();
    });

    let started = Instant::now();
    let t = instance.wait(&cancel, Duration::from_secs(10)).await.unwrap();
    assert_eq!(t, Termination::Signaled(15));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn stop_escalates_to_sigkill_after_grace() {
    let u = unit("ExecStart=/bin/sh -c \"trap '' TERM; while :; do sleep 0.1; done\"");
    let mut instance = ProcLauncher::new()
        .spawn(&u, &Invocation::new(1))
        .await
        .unwrap();

    // Let the shell install its trap.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let cancel = CancellationToken::new();
    cancel.cancel();
    let t = instance
        .wait(&cancel, Duration::from_millis(300))
        .await
        .unwrap();
    assert_eq!(t, Termination::Signaled(9));
}

#[tokio::test]
async fn pre_command_runs_to_completion() {
    let tmp = tempfile::tempdir().unwrap();
    let marker = tmp.path().join("pre.done");
    let u = unit(&format!(
        "ExecStartPre=/bin/sh -c \"touch {}\"\nExecStart=/bin/true",
        marker.display()
    ));
    let pre = &u.service.exec_start_pre[0];
    let t = ProcLauncher::new()
        .run_pre(&u, pre, &Invocation::new(1), &CancellationToken::new())
        .await
        .unwrap();
    assert!(t.is_success());
    assert!(marker.exists());
}

#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl io::Write for Capture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Capture {
    fn install() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Capture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        (capture, tracing::subscriber::set_default(subscriber))
    }

    fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

#[tokio::test(flavor = "current_thread")]
async fn output_lines_become_log_events() {
    let (capture, _guard) = Capture::install();

    let u = unit(
        "ExecStart=/bin/sh -c \"echo hello-out; echo hello-err >&2\"\nSyslogIdentifier=recorder",
    );
    assert!(run_to_end(&u).await.unwrap().is_success());

    let text = capture.text();
    let out = text.lines().find(|l| l.contains("hello-out")).unwrap();
    assert!(out.contains("warden::unit"));
    assert!(out.contains("stdout"));
    assert!(out.contains("recorder"));
    let err = text.lines().find(|l| l.contains("hello-err")).unwrap();
    assert!(err.contains("stderr"));
    assert!(err.contains("WARN"));
}

#[tokio::test(flavor = "current_thread")]
async fn invalid_utf8_does_not_stop_the_reader() {
    let (capture, _guard) = Capture::install();

    let u = unit("ExecStart=/bin/sh -c \"printf 'bad-\\377\\n'; sleep 0.3; echo after-bad-byte\"");
    assert_eq!(run_to_end(&u).await.unwrap(), Termination::Exited(0));

    let text = capture.text();
    assert!(text.lines().any(|l| l.contains("bad-\u{FFFD}")));
    assert!(text.contains("after-bad-byte"));
}

#[tokio::test(flavor = "current_thread")]
async fn long_lines_are_split() {
    let (capture, _guard) = Capture::install();

    let u = unit(
        "ExecStart=/bin/sh -c \"head -c 100000 /dev/zero | tr '\\000' a; echo; echo after-long\"",
    );
    assert!(run_to_end(&u).await.unwrap().is_success());

    let text = capture.text();
    let run = "a".repeat(1024);
    let pieces: Vec<&str> = text.lines().filter(|l| l.contains(&run)).collect();
    assert_eq!(pieces.len(), 3);
    assert!(pieces.iter().all(|l| l.len() < warden_exec::proc::output::LINE_MAX + 512));
    assert!(text.contains("after-long"));
}

#[tokio::test]
async fn descendant_holding_output_does_not_delay_exit() {
    let u = unit("ExecStart=/bin/sh -c \"sleep 5 & exit 0\"");
    let started = Instant::now();
    assert_eq!(run_to_end(&u).await.unwrap(), Termination::Exited(0));
    assert!(started.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn start_only_pre_command_runs_in_root() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().canonicalize().unwrap();
    let u = unit(&format!(
        "ExecStartPre=/bin/sh -c \"pwd > {0}/pre.out\"\nExecStart=/bin/sh -c \"pwd > main.out\"\n\
         WorkingDirectory={0}\nPermissionsStartOnly=true",
        work.display()
    ));

    let launcher = ProcLauncher::new();
    let pre = &u.service.exec_start_pre[0];
    let t = launcher
        .run_pre(&u, pre, &Invocation::new(1), &CancellationToken::new())
        .await
        .unwrap();
    assert!(t.is_success());
    assert_eq!(read(&work.join("pre.out")).trim(), "/");

    assert!(run_to_end(&u).await.unwrap().is_success());
    assert_eq!(read(&work.join("main.out")).trim(), work.display().to_string());
}

#[tokio::test]
async fn null_output_is_discarded() {
    let u = unit("ExecStart=/bin/sh -c \"echo dropped\"\nStandardOutput=null");
    assert!(run_to_end(&u).await.unwrap().is_success());
}
