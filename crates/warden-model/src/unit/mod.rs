//! The service descriptor.
//!
//! A [`ServiceUnit`] is the parsed form of a systemd-style `.service` file with three sections:
//! - `[Unit]`: description, ordering (`After=`/`Wants=`) and the start-rate limit;
//! - `[Service]`: what to run, as whom, with which environment, where output goes and when to restart;
//! - `[Install]`: which boot targets pull the unit in.
//!
//! The descriptor is read once and never mutated while the unit is supervised.

mod parse;
mod render;
mod value;

use std::{
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::{ParseError, ServiceEnv, Termination};

pub use value::{format_timespan, parse_env_file_line, parse_timespan_str};

/// Suffix every unit name carries.
pub const SERVICE_SUFFIX: &str = ".service";

/// A complete service descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceUnit {
    /// Unit file name, e.g. `audio-recorder.service`.
    pub name: String,
    pub unit: UnitSection,
    pub service: ServiceSection,
    pub install: InstallSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wants: Vec<String>,
    /// Window for [`UnitSection::start_limit_burst`]. Zero disables the limit.
    pub start_limit_interval: Duration,
    /// Maximum starts within the window. Zero disables the limit.
    pub start_limit_burst: u32,
}

impl Default for UnitSection {
    fn default() -> Self {
        Self {
            description: None,
            after: Vec::new(),
            wants: Vec::new(),
            start_limit_interval: Duration::from_secs(10),
            start_limit_burst: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceSection {
    pub kind: ServiceType,
    pub exec_start: ExecCommand,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exec_start_pre: Vec<ExecCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<WorkingDirectory>,
    pub restart: RestartPolicy,
    pub restart_sec: Duration,
    pub timeout_stop_sec: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "ServiceEnv::is_empty")]
    pub environment: ServiceEnv,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment_files: Vec<EnvFile>,
    pub standard_output: OutputTarget,
    /// [`OutputTarget::Inherit`] here means "same as standard output".
    pub standard_error: OutputTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub syslog_identifier: Option<String>,
    /// Apply identity and working directory to `ExecStart=` only.
    pub permissions_start_only: bool,
    #[serde(default, skip_serializing_if = "ResourceLimits::is_empty")]
    pub limits: ResourceLimits,
}

impl ServiceSection {
    pub(crate) fn with_exec(exec_start: ExecCommand) -> Self {
        Self {
            kind: ServiceType::Simple,
            exec_start,
            exec_start_pre: Vec::new(),
            working_directory: None,
            restart: RestartPolicy::No,
            restart_sec: Duration::from_millis(100),
            timeout_stop_sec: Duration::from_secs(90),
            user: None,
            group: None,
            environment: ServiceEnv::new(),
            environment_files: Vec::new(),
            standard_output: OutputTarget::Journal,
            standard_error: OutputTarget::Inherit,
            syslog_identifier: None,
            permissions_start_only: false,
            limits: ResourceLimits::default(),
        }
    }

    /// Where stderr actually goes once "inherit from stdout" is resolved.
    pub fn effective_stderr(&self) -> OutputTarget {
        match self.standard_error {
            OutputTarget::Inherit => self.standard_output,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallSection {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wanted_by: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required_by: Vec<String>,
}

impl InstallSection {
    pub fn is_empty(&self) -> bool {
        self.wanted_by.is_empty() && self.required_by.is_empty()
    }
}

/// Process type. Only foreground types are supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceType {
    /// Running as soon as the process has been forked.
    #[default]
    Simple,
    /// Running once the binary has been executed.
    Exec,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Simple => "simple",
            ServiceType::Exec => "exec",
        }
    }
}

impl FromStr for ServiceType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "simple" => Ok(ServiceType::Simple),
            "exec" => Ok(ServiceType::Exec),
            _ => Err(()),
        }
    }
}

/// `Restart=` policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    #[default]
    No,
    Always,
    OnSuccess,
    OnFailure,
    OnAbnormal,
    OnAbort,
}

impl RestartPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RestartPolicy::No => "no",
            RestartPolicy::Always => "always",
            RestartPolicy::OnSuccess => "on-success",
            RestartPolicy::OnFailure => "on-failure",
            RestartPolicy::OnAbnormal => "on-abnormal",
            RestartPolicy::OnAbort => "on-abort",
        }
    }

    /// Decide whether a run that ended with `termination` is followed by another start.
    ///
    /// | Termination    | no | always | on-success | on-failure | on-abnormal | on-abort |
    /// |----------------|----|--------|------------|------------|-------------|----------|
    /// | exit 0         |    |   X    |     X      |            |             |          |
    /// | exit != 0      |    |   X    |            |     X      |             |          |
    /// | clean signal   |    |   X    |     X      |            |             |          |
    /// | unclean signal |    |   X    |            |     X      |      X      |    X     |
    /// | start failure  |    |   X    |            |     X      |             |          |
    pub fn should_restart(&self, termination: &Termination) -> bool {
        match self {
            RestartPolicy::No => false,
            RestartPolicy::Always => true,
            RestartPolicy::OnSuccess => termination.is_clean(),
            RestartPolicy::OnFailure => !termination.is_clean(),
            RestartPolicy::OnAbnormal | RestartPolicy::OnAbort => {
                matches!(termination, Termination::Signaled(_)) && !termination.is_clean()
            }
        }
    }
}

impl FromStr for RestartPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "no" => Ok(RestartPolicy::No),
            "always" => Ok(RestartPolicy::Always),
            "on-success" => Ok(RestartPolicy::OnSuccess),
            "on-failure" => Ok(RestartPolicy::OnFailure),
            "on-abnormal" => Ok(RestartPolicy::OnAbnormal),
            "on-abort" => Ok(RestartPolicy::OnAbort),
            _ => Err(()),
        }
    }
}

/// Destination of a standard stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OutputTarget {
    #[default]
    Journal,
    JournalConsole,
    Inherit,
    Null,
}

impl OutputTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputTarget::Journal => "journal",
            OutputTarget::JournalConsole => "journal+console",
            OutputTarget::Inherit => "inherit",
            OutputTarget::Null => "null",
        }
    }

    /// Lines are captured and forwarded to the log sink.
    pub fn is_journal(&self) -> bool {
        matches!(self, OutputTarget::Journal | OutputTarget::JournalConsole)
    }
}

impl FromStr for OutputTarget {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "journal" | "syslog" | "kmsg" => Ok(OutputTarget::Journal),
            "journal+console" | "syslog+console" | "kmsg+console" => {
                Ok(OutputTarget::JournalConsole)
            }
            "inherit" | "tty" => Ok(OutputTarget::Inherit),
            "null" => Ok(OutputTarget::Null),
            _ => Err(()),
        }
    }
}

/// One `ExecStart=`/`ExecStartPre=` command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecCommand {
    /// Absolute path of the executable.
    pub program: PathBuf,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// `-` prefix: a failing exit is not treated as an error.
    #[serde(default)]
    pub ignore_failure: bool,
    /// `+` prefix: run with the manager's privileges, ignoring `User=`/`Group=`.
    #[serde(default)]
    pub privileged: bool,
}

impl ExecCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            ignore_failure: false,
            privileged: false,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Last path component of the program, used as default log identifier.
    pub fn program_name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
    }
}

/// `WorkingDirectory=`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingDirectory {
    pub path: PathBuf,
    /// `-` prefix: a missing directory is not fatal.
    #[serde(default)]
    pub optional: bool,
}

/// `EnvironmentFile=`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvFile {
    pub path: PathBuf,
    /// `-` prefix: a missing file is silently skipped.
    #[serde(default)]
    pub optional: bool,
}

/// `Limit*=` resource limits. `u64::MAX` stands for `infinity`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceLimits {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nofile: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fsize: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub core: Option<u64>,
}

impl ResourceLimits {
    pub fn is_empty(&self) -> bool {
        self.nofile.is_none() && self.fsize.is_none() && self.core.is_none()
    }
}

impl ServiceUnit {
    /// Parse unit text. `name` must end in `.service`.
    pub fn parse(name: &str, text: &str) -> Result<Self, ParseError> {
        validate_name(name)?;
        parse::parse_unit(name, text)
    }

    /// Read and parse a unit file; the unit name is the file name.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ParseError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ParseError::InvalidName(path.display().to_string()))?;
        let text = std::fs::read_to_string(path).map_err(|e| ParseError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(name, &text)
    }

    /// Canonical unit-file text.
    pub fn render(&self) -> String {
        render::render_unit(self)
    }

    /// Every boot target that activates this unit: `WantedBy=` then `RequiredBy=`.
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.install
            .wanted_by
            .iter()
            .chain(self.install.required_by.iter())
            .map(String::as_str)
    }

    /// Identifier attached to every log line of the unit.
    pub fn identifier(&self) -> &str {
        self.service
            .syslog_identifier
            .as_deref()
            .unwrap_or_else(|| self.service.exec_start.program_name())
    }

    /// Whether the unit is ordered after one of the network targets.
    pub fn wants_network(&self) -> bool {
        self.unit
            .after
            .iter()
            .chain(self.unit.wants.iter())
            .any(|t| t == "network.target" || t == "network-online.target")
    }
}

impl std::fmt::Display for ServiceUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

fn validate_name(name: &str) -> Result<(), ParseError> {
    let stem = name.strip_suffix(SERVICE_SUFFIX);
    let ok = match stem {
        Some(stem) => {
            !stem.is_empty()
                && stem
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@' | ':' | '\\'))
        }
        None => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ParseError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_names_must_be_services() {
        assert!(validate_name("audio-recorder.service").is_ok());
        assert!(validate_name("getty@tty1.service").is_ok());
        assert!(validate_name(".service").is_err());
        assert!(validate_name("audio-recorder.socket").is_err());
        assert!(validate_name("a b.service").is_err());
    }

    #[test]
    fn restart_table_always() {
        let p = RestartPolicy::Always;
        assert!(p.should_restart(&Termination::Exited(0)));
        assert!(p.should_restart(&Termination::Exited(1)));
        assert!(p.should_restart(&Termination::Signaled(9)));
        assert!(p.should_restart(&Termination::Signaled(15)));
        assert!(p.should_restart(&Termination::StartFailed("x".into())));
    }

    #[test]
    fn restart_table_no() {
        let p = RestartPolicy::No;
        assert!(!p.should_restart(&Termination::Exited(0)));
        assert!(!p.should_restart(&Termination::Exited(1)));
        assert!(!p.should_restart(&Termination::Signaled(9)));
    }

    #[test]
    fn restart_table_on_success_and_on_failure() {
        assert!(RestartPolicy::OnSuccess.should_restart(&Termination::Exited(0)));
        assert!(RestartPolicy::OnSuccess.should_restart(&Termination::Signaled(15)));
        assert!(!RestartPolicy::OnSuccess.should_restart(&Termination::Exited(2)));

        assert!(RestartPolicy::OnFailure.should_restart(&Termination::Exited(2)));
        assert!(RestartPolicy::OnFailure.should_restart(&Termination::Signaled(11)));
        assert!(RestartPolicy::OnFailure.should_restart(&Termination::StartFailed("x".into())));
        assert!(!RestartPolicy::OnFailure.should_restart(&Termination::Exited(0)));
        assert!(!RestartPolicy::OnFailure.should_restart(&Termination::Signaled(15)));
    }

    #[test]
    fn restart_table_abnormal() {
        for p in [RestartPolicy::OnAbnormal, RestartPolicy::OnAbort] {
            assert!(p.should_restart(&Termination::Signaled(6)));
            assert!(!p.should_restart(&Termination::Signaled(1)));
            assert!(!p.should_restart(&Termination::Exited(1)));
            assert!(!p.should_restart(&Termination::StartFailed("x".into())));
        }
    }

    #[test]
    fn stderr_inherits_stdout_target() {
        let mut s = ServiceSection::with_exec(ExecCommand::new("/bin/true"));
        s.standard_output = OutputTarget::Null;
        assert_eq!(s.effective_stderr(), OutputTarget::Null);

        s.standard_error = OutputTarget::Journal;
        assert_eq!(s.effective_stderr(), OutputTarget::Journal);
    }

    #[test]
    fn program_name_is_file_name() {
        let cmd = ExecCommand::new("/usr/bin/python3").arg("main.py");
        assert_eq!(cmd.program_name(), "python3");
    }
}
