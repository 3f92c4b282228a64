//! Typed values of unit-file assignments.

use std::{path::PathBuf, time::Duration};

use tracing::trace;

use crate::{
    KeyValue, ParseError,
    unit::{ExecCommand, WorkingDirectory},
};

pub(crate) fn parse_bool(line: u32, key: &str, value: &str) -> Result<bool, ParseError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "yes" | "true" | "on" => Ok(true),
        "0" | "no" | "false" | "off" => Ok(false),
        _ => Err(ParseError::InvalidBool {
            line,
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

pub(crate) fn parse_u32(line: u32, key: &str, value: &str) -> Result<u32, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidNumber {
        line,
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// Parse a time span such as `5`, `100ms`, `1min 30s` or `infinity`.
///
/// A bare number is seconds.
pub fn parse_timespan_str(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value == "infinity" {
        return Some(Duration::MAX);
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
        rest = rest.trim_start();
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return None;
        }
        let n: u64 = rest[..digits].parse().ok()?;
        rest = rest[digits..].trim_start();
        let unit_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];

        let part = match unit {
            "us" | "usec" => Duration::from_micros(n),
            "ms" | "msec" => Duration::from_millis(n),
            "" | "s" | "sec" | "second" | "seconds" => Duration::from_secs(n),
            "m" | "min" | "minute" | "minutes" => Duration::from_secs(n.checked_mul(60)?),
            "h" | "hr" | "hour" | "hours" => Duration::from_secs(n.checked_mul(3600)?),
            "d" | "day" | "days" => Duration::from_secs(n.checked_mul(86_400)?),
            _ => return None,
        };
        total = total.checked_add(part)?;
    }
    Some(total)
}

/// Inverse of [`parse_timespan_str`] for values it produced.
pub fn format_timespan(d: Duration) -> String {
    if d == Duration::MAX {
        return "infinity".to_string();
    }
    if d.subsec_nanos() == 0 {
        return format!("{}s", d.as_secs());
    }
    if d.subsec_nanos() % 1_000_000 == 0 {
        return format!("{}ms", d.as_millis());
    }
    format!("{}us", d.as_micros())
}

pub(crate) fn parse_timespan(line: u32, key: &str, value: &str) -> Result<Duration, ParseError> {
    parse_timespan_str(value).ok_or_else(|| ParseError::InvalidTimespan {
        line,
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// `After=`, `Wants=`, `WantedBy=`: comma or whitespace separated.
pub(crate) fn split_list(value: &str) -> impl Iterator<Item = String> + '_ {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// `Environment=`: shell-split words, each `KEY=VALUE`.
pub(crate) fn parse_environment(line: u32, value: &str) -> Result<Vec<KeyValue>, ParseError> {
    let words = shlex::split(value).ok_or_else(|| ParseError::Quoting {
        line,
        value: value.to_string(),
    })?;
    trace!(target: "warden::model", ?words, "environment assignment");

    words
        .into_iter()
        .map(|word| match word.split_once('=') {
            Some((k, v)) if KeyValue::is_valid_key(k) => Ok(KeyValue::new(k, v)),
            _ => Err(ParseError::InvalidEnvironment { line, value: word }),
        })
        .collect()
}

/// Parse one line of an environment file (`KEY=VALUE`, `#`/`;` comments, optional quoting).
pub fn parse_env_file_line(raw: &str) -> Option<KeyValue> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
        return None;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    let (key, value) = line.split_once('=')?;
    let key = key.trim();
    if !KeyValue::is_valid_key(key) {
        return None;
    }
    let value = value.trim();
    let value = shlex::split(value)
        .map(|words| words.join(" "))
        .unwrap_or_else(|| value.to_string());
    Some(KeyValue::new(key, value))
}

/// `ExecStart=`/`ExecStartPre=`: optional `-`/`+` prefixes, absolute program, shell-split args.
pub(crate) fn parse_exec(line: u32, key: &str, value: &str) -> Result<ExecCommand, ParseError> {
    let mut ignore_failure = false;
    let mut privileged = false;
    let mut rest = value;
    loop {
        match rest.chars().next() {
            Some('-') => ignore_failure = true,
            Some('+') => privileged = true,
            Some('@' | '!' | ':') => {
                return Err(ParseError::UnknownValue {
                    line,
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
            _ => break,
        }
        rest = &rest[1..];
    }

    let mut words = shlex::split(rest)
        .ok_or_else(|| ParseError::Quoting {
            line,
            value: value.to_string(),
        })?
        .into_iter();
    let program = words.next().ok_or_else(|| ParseError::EmptyCommand {
        line,
        key: key.to_string(),
    })?;
    let program = PathBuf::from(program);
    if !program.is_absolute() {
        return Err(ParseError::RelativePath {
            line,
            key: key.to_string(),
            value: program.display().to_string(),
        });
    }

    Ok(ExecCommand {
        program,
        args: words.collect(),
        ignore_failure,
        privileged,
    })
}

/// A path that may carry a `-` prefix meaning "missing is fine".
pub(crate) fn parse_optional_path(
    line: u32,
    key: &str,
    value: &str,
) -> Result<(PathBuf, bool), ParseError> {
    let (optional, raw) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value),
    };
    let path = PathBuf::from(raw);
    if !path.is_absolute() {
        return Err(ParseError::RelativePath {
            line,
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok((path, optional))
}

pub(crate) fn parse_working_directory(
    line: u32,
    key: &str,
    value: &str,
) -> Result<WorkingDirectory, ParseError> {
    let (path, optional) = parse_optional_path(line, key, value)?;
    Ok(WorkingDirectory { path, optional })
}

/// `Limit*=`: a number with an optional binary suffix (`K`, `M`, `G`, `T`) or `infinity`.
pub(crate) fn parse_limit(line: u32, key: &str, value: &str) -> Result<u64, ParseError> {
    let err = || ParseError::InvalidNumber {
        line,
        key: key.to_string(),
        value: value.to_string(),
    };
    if value == "infinity" {
        return Ok(u64::MAX);
    }
    let (digits, shift) = match value.chars().last() {
        Some('K') => (&value[..value.len() - 1], 10),
        Some('M') => (&value[..value.len() - 1], 20),
        Some('G') => (&value[..value.len() - 1], 30),
        Some('T') => (&value[..value.len() - 1], 40),
        _ => (value, 0),
    };
    let n: u64 = digits.parse().map_err(|_| err())?;
    n.checked_mul(1u64 << shift).ok_or_else(err)
}

pub(crate) fn format_limit(v: u64) -> String {
    if v == u64::MAX {
        "infinity".to_string()
    } else {
        v.to_string()
    }
}
