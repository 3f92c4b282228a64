use std::fmt::Write;

use crate::unit::{
    ExecCommand, OutputTarget, RestartPolicy, ServiceSection, ServiceUnit, UnitSection,
    value::{format_limit, format_timespan},
};

fn quote(word: &str) -> String {
    match shlex::try_quote(word) {
        Ok(q) => q.into_owned(),
        Err(_) => word.to_string(),
    }
}

fn exec_line(cmd: &ExecCommand) -> String {
    let mut line = String::new();
    if cmd.ignore_failure {
        line.push('-');
    }
    if cmd.privileged {
        line.push('+');
    }
    line.push_str(&quote(&cmd.program.to_string_lossy()));
    for arg in &cmd.args {
        line.push(' ');
        line.push_str(&quote(arg));
    }
    line
}

// Writes into a String never fail.
macro_rules! kv {
    ($out:expr, $key:expr, $val:expr) => {
        let _ = writeln!($out, "{}={}", $key, $val);
    };
}

fn render_unit_section(out: &mut String, u: &UnitSection) {
    let defaults = UnitSection::default();
    out.push_str("[Unit]\n");
    if let Some(d) = &u.description {
        kv!(out, "Description", d);
    }
    if !u.after.is_empty() {
        kv!(out, "After", u.after.join(" "));
    }
    if !u.wants.is_empty() {
        kv!(out, "Wants", u.wants.join(" "));
    }
    if u.start_limit_interval != defaults.start_limit_interval {
        kv!(out, "StartLimitIntervalSec", format_timespan(u.start_limit_interval));
    }
    if u.start_limit_burst != defaults.start_limit_burst {
        kv!(out, "StartLimitBurst", u.start_limit_burst);
    }
}

fn render_service_section(out: &mut String, s: &ServiceSection) {
    let defaults = ServiceSection::with_exec(s.exec_start.clone());
    out.push_str("\n[Service]\n");
    kv!(out, "Type", s.kind.as_str());
    for pre in &s.exec_start_pre {
        kv!(out, "ExecStartPre", exec_line(pre));
    }
    kv!(out, "ExecStart", exec_line(&s.exec_start));
    if let Some(wd) = &s.working_directory {
        let prefix = if wd.optional { "-" } else { "" };
        kv!(out, "WorkingDirectory", format!("{prefix}{}", wd.path.display()));
    }
    if s.restart != RestartPolicy::No {
        kv!(out, "Restart", s.restart.as_str());
    }
    if s.restart_sec != defaults.restart_sec {
        kv!(out, "RestartSec", format_timespan(s.restart_sec));
    }
    if s.timeout_stop_sec != defaults.timeout_stop_sec {
        kv!(out, "TimeoutStopSec", format_timespan(s.timeout_stop_sec));
    }
    if let Some(user) = &s.user {
        kv!(out, "User", user);
    }
    if let Some(group) = &s.group {
        kv!(out, "Group", group);
    }
    for kv in s.environment.iter() {
        kv!(out, "Environment", quote(&format!("{}={}", kv.key(), kv.value())));
    }
    for file in &s.environment_files {
        let prefix = if file.optional { "-" } else { "" };
        kv!(out, "EnvironmentFile", format!("{prefix}{}", file.path.display()));
    }
    kv!(out, "StandardOutput", s.standard_output.as_str());
    if s.standard_error != OutputTarget::Inherit {
        kv!(out, "StandardError", s.standard_error.as_str());
    }
    if let Some(id) = &s.syslog_identifier {
        kv!(out, "SyslogIdentifier", id);
    }
    if s.permissions_start_only {
        kv!(out, "PermissionsStartOnly", "true");
    }
    if let Some(v) = s.limits.nofile {
        kv!(out, "LimitNOFILE", format_limit(v));
    }
    if let Some(v) = s.limits.fsize {
        kv!(out, "LimitFSIZE", format_limit(v));
    }
    if let Some(v) = s.limits.core {
        kv!(out, "LimitCORE", format_limit(v));
    }
}

pub(crate) fn render_unit(unit: &ServiceUnit) -> String {
    let mut out = String::new();
    render_unit_section(&mut out, &unit.unit);
    render_service_section(&mut out, &unit.service);

    if !unit.install.is_empty() {
        out.push_str("\n[Install]\n");
        if !unit.install.wanted_by.is_empty() {
            kv!(out, "WantedBy", unit.install.wanted_by.join(" "));
        }
        if !unit.install.required_by.is_empty() {
            kv!(out, "RequiredBy", unit.install.required_by.join(" "));
        }
    }
    out
}
