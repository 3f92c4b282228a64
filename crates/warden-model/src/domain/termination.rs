use serde::{Deserialize, Serialize};

const SIGHUP: i32 = 1;
const SIGINT: i32 = 2;
const SIGPIPE: i32 = 13;
const SIGTERM: i32 = 15;

/// How one run of a process ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "value")]
pub enum Termination {
    /// The process called `exit` with this code.
    Exited(i32),
    /// The process was killed by this signal number.
    Signaled(i32),
    /// The process could not be started at all.
    StartFailed(String),
}

impl Termination {
    /// Exit code zero.
    pub fn is_success(&self) -> bool {
        matches!(self, Termination::Exited(0))
    }

    /// Exit code zero, or one of SIGHUP, SIGINT, SIGTERM, SIGPIPE.
    pub fn is_clean(&self) -> bool {
        match self {
            Termination::Exited(code) => *code == 0,
            Termination::Signaled(sig) => matches!(*sig, SIGHUP | SIGINT | SIGTERM | SIGPIPE),
            Termination::StartFailed(_) => false,
        }
    }

    pub fn code(&self) -> Option<i32> {
        match self {
            Termination::Exited(code) => Some(*code),
            _ => None,
        }
    }
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Termination::Exited(code) => write!(f, "exited with code {code}"),
            Termination::Signaled(sig) => write!(f, "killed by signal {sig}"),
            Termination::StartFailed(reason) => write!(f, "failed to start: {reason}"),
        }
    }
}
