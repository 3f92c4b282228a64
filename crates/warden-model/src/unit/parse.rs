//! Unit-file text to [`ServiceUnit`].
//!
//! Parsing happens in two passes: the text is split into sections of
//! `(line, key, value)` entries, then each known section is folded into its
//! typed counterpart in file order, so later assignments win and empty
//! assignments reset list-valued keys.

use tracing::warn;

use crate::{
    ParseError,
    unit::{
        EnvFile, InstallSection, OutputTarget, RestartPolicy, ServiceSection, ServiceType,
        ServiceUnit, UnitSection, value,
    },
};

struct Entry<'a> {
    line: u32,
    key: &'a str,
    value: String,
}

struct RawSection<'a> {
    name: &'a str,
    entries: Vec<Entry<'a>>,
}

fn is_comment(line: &str) -> bool {
    line.starts_with('#') || line.starts_with(';')
}

fn split_sections(text: &str) -> Result<Vec<RawSection<'_>>, ParseError> {
    let mut sections: Vec<RawSection<'_>> = Vec::new();
    // (start line, key, accumulated value) of an assignment continued with `\`.
    let mut pending: Option<(u32, &str, String)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx as u32 + 1;
        let line = raw.trim();

        if let Some((start, key, mut acc)) = pending.take() {
            if is_comment(line) {
                pending = Some((start, key, acc));
                continue;
            }
            let (chunk, continues) = match line.strip_suffix('\\') {
                Some(head) => (head.trim_end(), true),
                None => (line, false),
            };
            if !acc.is_empty() && !chunk.is_empty() {
                acc.push(' ');
            }
            acc.push_str(chunk);
            if continues {
                pending = Some((start, key, acc));
            } else {
                push_entry(&mut sections, start, key, acc)?;
            }
            continue;
        }

        if line.is_empty() || is_comment(line) {
            continue;
        }

        if let Some(inner) = line.strip_prefix('[') {
            let name = inner.strip_suffix(']').ok_or_else(|| ParseError::Malformed {
                line: line_no,
                text: line.to_string(),
            })?;
            if sections.iter().any(|s| s.name == name) {
                return Err(ParseError::DuplicateSection(name.to_string()));
            }
            sections.push(RawSection {
                name,
                entries: Vec::new(),
            });
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| ParseError::Malformed {
            line: line_no,
            text: line.to_string(),
        })?;
        let key = key.trim_end();
        let value = value.trim_start();
        if key.is_empty() {
            return Err(ParseError::Malformed {
                line: line_no,
                text: line.to_string(),
            });
        }

        match value.strip_suffix('\\') {
            Some(head) => pending = Some((line_no, key, head.trim_end().to_string())),
            None => push_entry(&mut sections, line_no, key, value.to_string())?,
        }
    }

    // A continuation on the last line ends with the file.
    if let Some((start, key, acc)) = pending {
        push_entry(&mut sections, start, key, acc)?;
    }
    Ok(sections)
}

fn push_entry<'a>(
    sections: &mut [RawSection<'a>],
    line: u32,
    key: &'a str,
    value: String,
) -> Result<(), ParseError> {
    let section = sections
        .last_mut()
        .ok_or(ParseError::OutsideSection { line })?;
    section.entries.push(Entry { line, key, value });
    Ok(())
}

fn unknown(line: u32, key: &str, value: &str) -> ParseError {
    ParseError::UnknownValue {
        line,
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn skip_key(section: &str, e: &Entry<'_>) {
    if !e.key.starts_with("X-") {
        warn!(target: "warden::model", section, key = e.key, line = e.line, "unknown key ignored");
    }
}

fn apply_unit(section: &RawSection<'_>, out: &mut UnitSection) -> Result<(), ParseError> {
    for e in &section.entries {
        let v = e.value.as_str();
        match e.key {
            "Description" => out.description = (!v.is_empty()).then(|| v.to_string()),
            "After" if v.is_empty() => out.after.clear(),
            "After" => out.after.extend(value::split_list(v)),
            "Wants" if v.is_empty() => out.wants.clear(),
            "Wants" => out.wants.extend(value::split_list(v)),
            "StartLimitIntervalSec" | "StartLimitInterval" => {
                out.start_limit_interval = value::parse_timespan(e.line, e.key, v)?
            }
            "StartLimitBurst" => out.start_limit_burst = value::parse_u32(e.line, e.key, v)?,
            _ => skip_key("Unit", e),
        }
    }
    Ok(())
}

fn apply_service(section: &RawSection<'_>) -> Result<ServiceSection, ParseError> {
    // ExecStart= is mandatory, so it is resolved first and the rest is folded on top.
    let mut exec_start = None;
    let mut kind = ServiceType::Simple;
    for e in &section.entries {
        match e.key {
            "Type" => {
                kind = e
                    .value
                    .parse()
                    .map_err(|_| unknown(e.line, e.key, &e.value))?
            }
            "ExecStart" if e.value.is_empty() => exec_start = None,
            "ExecStart" => {
                if exec_start.is_some() {
                    return Err(ParseError::DuplicateExecStart {
                        line: e.line,
                        kind: kind.as_str(),
                    });
                }
                exec_start = Some(value::parse_exec(e.line, e.key, &e.value)?);
            }
            _ => {}
        }
    }
    let exec_start = exec_start.ok_or(ParseError::MissingExecStart)?;

    let mut out = ServiceSection::with_exec(exec_start);
    out.kind = kind;

    for e in &section.entries {
        let v = e.value.as_str();
        match e.key {
            "Type" | "ExecStart" => {}
            "ExecStartPre" if v.is_empty() => out.exec_start_pre.clear(),
            "ExecStartPre" => out
                .exec_start_pre
                .push(value::parse_exec(e.line, e.key, v)?),
            "WorkingDirectory" if v.is_empty() => out.working_directory = None,
            "WorkingDirectory" => {
                out.working_directory = Some(value::parse_working_directory(e.line, e.key, v)?)
            }
            "Restart" => out.restart = v.parse::<RestartPolicy>().map_err(|_| unknown(e.line, e.key, v))?,
            "RestartSec" => out.restart_sec = value::parse_timespan(e.line, e.key, v)?,
            "TimeoutStopSec" => out.timeout_stop_sec = value::parse_timespan(e.line, e.key, v)?,
            "User" => out.user = (!v.is_empty()).then(|| v.to_string()),
            "Group" => out.group = (!v.is_empty()).then(|| v.to_string()),
            "Environment" if v.is_empty() => out.environment.clear(),
            "Environment" => out.environment.0.extend(value::parse_environment(e.line, v)?),
            "EnvironmentFile" if v.is_empty() => out.environment_files.clear(),
            "EnvironmentFile" => {
                let (path, optional) = value::parse_optional_path(e.line, e.key, v)?;
                out.environment_files.push(EnvFile { path, optional });
            }
            "StandardOutput" => {
                out.standard_output = v.parse::<OutputTarget>().map_err(|_| unknown(e.line, e.key, v))?
            }
            "StandardError" => {
                out.standard_error = v.parse::<OutputTarget>().map_err(|_| unknown(e.line, e.key, v))?
            }
            "SyslogIdentifier" => out.syslog_identifier = (!v.is_empty()).then(|| v.to_string()),
            "PermissionsStartOnly" => out.permissions_start_only = value::parse_bool(e.line, e.key, v)?,
            "LimitNOFILE" => out.limits.nofile = Some(value::parse_limit(e.line, e.key, v)?),
            "LimitFSIZE" => out.limits.fsize = Some(value::parse_limit(e.line, e.key, v)?),
            "LimitCORE" => out.limits.core = Some(value::parse_limit(e.line, e.key, v)?),
            _ => skip_key("Service", e),
        }
    }
    Ok(out)
}

fn apply_install(section: &RawSection<'_>, out: &mut InstallSection) {
    for e in &section.entries {
        let v = e.value.as_str();
        match e.key {
            "WantedBy" if v.is_empty() => out.wanted_by.clear(),
            "WantedBy" => out.wanted_by.extend(value::split_list(v)),
            "RequiredBy" if v.is_empty() => out.required_by.clear(),
            "RequiredBy" => out.required_by.extend(value::split_list(v)),
            _ => skip_key("Install", e),
        }
    }
}

pub(crate) fn parse_unit(name: &str, text: &str) -> Result<ServiceUnit, ParseError> {
    let sections = split_sections(text)?;

    let mut unit = UnitSection::default();
    let mut service = None;
    let mut install = InstallSection::default();

    for section in &sections {
        match section.name {
            "Unit" => apply_unit(section, &mut unit)?,
            "Service" => service = Some(apply_service(section)?),
            "Install" => apply_install(section, &mut install),
            other => warn!(target: "warden::model", section = other, "unknown section ignored"),
        }
    }

    Ok(ServiceUnit {
        name: name.to_string(),
        unit,
        service: service.ok_or(ParseError::MissingService)?,
        install,
    })
}
