//! Routing of a child's stdout/stderr into the log.
//!
//! Each line becomes one `tracing` event under target `warden::unit`, so whatever sink the
//! logger writes to (journald, text, json) receives the unit's output with its identifier.
//! Under journald the entry's `SYSLOG_IDENTIFIER` stays the manager's; the unit's identifier
//! is the `F_IDENTIFIER` field (`journalctl F_IDENTIFIER=python`).
//!
//! Bytes are read until EOF whatever they contain: invalid UTF-8 is replaced, and a line
//! longer than [`LINE_MAX`] is emitted in pieces.

use std::{sync::Arc, time::Duration};

use tokio::{
    io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader},
    process::Child,
    task::JoinHandle,
    time::{Instant, timeout_at},
};
use tracing::{debug, info, warn};
use warden_model::{OutputTarget, ServiceUnit};

/// Longest line emitted as one event (journald's `LineMax=` default).
pub const LINE_MAX: usize = 48 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

struct Source {
    unit: Arc<str>,
    identifier: Arc<str>,
    pid: Option<u32>,
}

impl Source {
    fn emit(&self, stream: Stream, line: &str) {
        let unit = &*self.unit;
        let identifier = &*self.identifier;
        match stream {
            Stream::Stdout => {
                info!(target: "warden::unit", unit, stream = stream.as_str(), identifier, pid = self.pid, "{line}")
            }
            Stream::Stderr => {
                warn!(target: "warden::unit", unit, stream = stream.as_str(), identifier, pid = self.pid, "{line}")
            }
        }
    }
}

/// Start one reader task per piped stream of `child`.
pub fn attach(child: &mut Child, unit: &ServiceUnit) -> Vec<JoinHandle<()>> {
    let source = Arc::new(Source {
        unit: Arc::from(unit.name.as_str()),
        identifier: Arc::from(unit.identifier()),
        pid: child.id(),
    });

    let mut handles = Vec::with_capacity(2);
    if let Some(out) = child.stdout.take() {
        let echo = unit.service.standard_output == OutputTarget::JournalConsole;
        handles.push(tokio::spawn(pump(out, Stream::Stdout, echo, Arc::clone(&source))));
    }
    if let Some(err) = child.stderr.take() {
        let echo = unit.service.effective_stderr() == OutputTarget::JournalConsole;
        handles.push(tokio::spawn(pump(err, Stream::Stderr, echo, source)));
    }
    handles
}

async fn pump<R>(reader: R, stream: Stream, echo: bool, source: Arc<Source>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(1024);
    loop {
        buf.clear();
        match (&mut reader).take(LINE_MAX as u64).read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(trim_newline(&buf));
                source.emit(stream, &line);
                if echo {
                    echo_line(stream, &line).await;
                }
            }
            Err(e) => {
                warn!(target: "warden::exec", unit = &*source.unit, stream = stream.as_str(), error = %e, "output reader failed");
                break;
            }
        }
    }
}

fn trim_newline(buf: &[u8]) -> &[u8] {
    let buf = buf.strip_suffix(b"\n").unwrap_or(buf);
    buf.strip_suffix(b"\r").unwrap_or(buf)
}

async fn echo_line(stream: Stream, line: &str) {
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    let _ = match stream {
        Stream::Stdout => tokio::io::stdout().write_all(&buf).await,
        Stream::Stderr => tokio::io::stderr().write_all(&buf).await,
    };
}

/// Wait up to `grace` for every reader to hit end of stream, then abort the rest.
///
/// A descendant that inherited the pipe can hold it open long after the main process exited.
pub async fn drain(handles: Vec<JoinHandle<()>>, grace: Duration) {
    let deadline = Instant::now() + grace;
    for mut h in handles {
        if timeout_at(deadline, &mut h).await.is_err() {
            debug!(target: "warden::exec", "output still open after exit; detaching reader");
            h.abort();
        }
    }
}
