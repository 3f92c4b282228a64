//! Daemon settings: defaults, then the optional TOML file, then flags and environment.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::Deserialize;
use warden_core::SupervisorConfig;
use warden_observe::{LoggerConfig, LoggerFormat};

use crate::cli::Cli;

pub const DEFAULT_UNIT_DIR: &str = "/etc/warden/system";
pub const DEFAULT_TARGET: &str = "multi-user.target";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DaemonFile {
    pub unit_dir: Option<PathBuf>,
    pub default_target: Option<String>,
    pub network_wait_secs: Option<u64>,
    pub log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    pub format: Option<String>,
    pub level: Option<String>,
    pub with_targets: Option<bool>,
}

impl DaemonFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub unit_dir: PathBuf,
    pub default_target: String,
    pub supervisor: SupervisorConfig,
    pub logger: LoggerConfig,
}

impl Settings {
    pub fn resolve(cli: &Cli) -> anyhow::Result<Self> {
        let file = match &cli.config {
            Some(path) => DaemonFile::load(path)?,
            None => DaemonFile::default(),
        };
        Self::merge(cli, file)
    }

    fn merge(cli: &Cli, file: DaemonFile) -> anyhow::Result<Self> {
        let unit_dir = cli
            .unit_dir
            .clone()
            .or(file.unit_dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_UNIT_DIR));

        let mut supervisor = SupervisorConfig::default();
        if let Some(secs) = file.network_wait_secs {
            supervisor.network_wait = Duration::from_secs(secs);
        }

        let mut logger = LoggerConfig::default();
        if let Some(format) = cli.log_format.as_deref().or(file.log.format.as_deref()) {
            logger.format = format
                .parse::<LoggerFormat>()
                .with_context(|| format!("log format {format:?}"))?;
        }
        if let Some(level) = cli.log_level.clone().or(file.log.level) {
            logger.level = level;
        }
        if let Some(with_targets) = file.log.with_targets {
            logger.with_targets = with_targets;
        }

        Ok(Self {
            unit_dir,
            default_target: file.default_target.unwrap_or_else(|| DEFAULT_TARGET.to_string()),
            supervisor,
            logger,
        })
    }
}
