//! Environment of a unit's processes.
//!
//! Layers, later ones overriding earlier ones key by key:
//! base (`PATH`, `INVOCATION_ID`, login variables of `User=`), then `EnvironmentFile=`
//! files in order, then `Environment=` assignments.

use std::{fs, io};

use tracing::debug;
use warden_model::{EnvFile, ServiceEnv, ServiceUnit, unit::parse_env_file_line};

use crate::{
    error::{ExecError, ExecResult},
    utils::identity::Identity,
};

pub const DEFAULT_PATH: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";

pub fn base_env(invocation_id: &str, identity: Option<&Identity>) -> ServiceEnv {
    let mut env = ServiceEnv::new();
    env.push("PATH", DEFAULT_PATH);
    env.push("INVOCATION_ID", invocation_id);
    if let Some(id) = identity {
        if let Some(home) = &id.home {
            env.push("HOME", home.to_string_lossy());
        }
        if let Some(name) = &id.name {
            env.push("USER", name.as_str());
            env.push("LOGNAME", name.as_str());
        }
        if let Some(shell) = &id.shell {
            env.push("SHELL", shell.to_string_lossy());
        }
    }
    env
}

pub fn read_env_file(file: &EnvFile) -> ExecResult<ServiceEnv> {
    match fs::read_to_string(&file.path) {
        Ok(text) => Ok(text.lines().filter_map(parse_env_file_line).collect()),
        Err(e) if e.kind() == io::ErrorKind::NotFound && file.optional => {
            debug!(target: "warden::exec", path = %file.path.display(), "optional environment file missing");
            Ok(ServiceEnv::new())
        }
        Err(e) => Err(ExecError::EnvironmentFile {
            path: file.path.clone(),
            reason: e.to_string(),
        }),
    }
}

/// Full environment for one process of `unit`, overrides collapsed.
pub fn build_env(
    unit: &ServiceUnit,
    invocation_id: &str,
    identity: Option<&Identity>,
) -> ExecResult<Vec<(String, String)>> {
    let mut env = base_env(invocation_id, identity);
    for file in &unit.service.environment_files {
        env = env.merged(&read_env_file(file)?);
    }
    env = env.merged(&unit.service.environment);
    Ok(env
        .resolved()
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(env: &'a [(String, String)], key: &str) -> Option<&'a str> {
        env.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn unit_environment_overrides_files_and_base() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("recorder.env");
        fs::write(&file, "# comment\nexport RATE=44100\nCHANNELS=\"2\"\nPATH=/from/file\n").unwrap();

        let text = format!(
            "[Service]\nExecStart=/bin/true\nEnvironmentFile={}\nEnvironment=RATE=48000 \"LABEL=kitchen mic\"\n",
            file.display()
        );
        let unit = ServiceUnit::parse("rec.service", &text).unwrap();
        let env = build_env(&unit, "abc123", None).unwrap();

        assert_eq!(lookup(&env, "RATE"), Some("48000"));
        assert_eq!(lookup(&env, "CHANNELS"), Some("2"));
        assert_eq!(lookup(&env, "LABEL"), Some("kitchen mic"));
        assert_eq!(lookup(&env, "PATH"), Some("/from/file"));
        assert_eq!(lookup(&env, "INVOCATION_ID"), Some("abc123"));
        assert_eq!(lookup(&env, "HOME"), None);
        assert_eq!(env.iter().filter(|(k, _)| k == "RATE").count(), 1);
    }

    #[test]
    fn optional_missing_file_is_skipped() {
        let unit = ServiceUnit::parse(
            "rec.service",
            "[Service]\nExecStart=/bin/true\nEnvironmentFile=-/nonexistent/warden.env\n",
        )
        .unwrap();
        assert!(build_env(&unit, "id", None).is_ok());
    }

    #[test]
    fn required_missing_file_fails() {
        let unit = ServiceUnit::parse(
            "rec.service",
            "[Service]\nExecStart=/bin/true\nEnvironmentFile=/nonexistent/warden.env\n",
        )
        .unwrap();
        assert!(matches!(
            build_env(&unit, "id", None),
            Err(ExecError::EnvironmentFile { .. })
        ));
    }

    #[test]
    fn user_adds_login_variables() {
        let root = Identity::resolve(Some("root"), None).unwrap();
        let env = base_env("id", root.as_ref());
        assert_eq!(env.get("USER"), Some("root"));
        assert_eq!(env.get("LOGNAME"), Some("root"));
        assert!(env.get("HOME").is_some());
    }
}
