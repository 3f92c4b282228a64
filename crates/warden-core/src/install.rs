//! Boot activation.
//!
//! A unit is enabled for a target by a symlink `<unit_dir>/<target>.wants/<unit>` (or
//! `.requires/` for `RequiredBy=`) pointing at `<unit_dir>/<unit>`. Enabling and disabling
//! are idempotent: repeating either converges to the same set of links.

use std::{
    fmt, fs, io,
    os::unix::fs::symlink,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};
use warden_model::ServiceUnit;

use crate::error::CoreError;

const WANTS: &str = ".wants";
const REQUIRES: &str = ".requires";

/// A filesystem change made by [`Installer::enable`] or [`Installer::disable`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Created { link: PathBuf, target: PathBuf },
    Removed { link: PathBuf },
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::Created { link, target } => {
                write!(f, "Created symlink {} → {}.", link.display(), target.display())
            }
            Change::Removed { link } => write!(f, "Removed \"{}\".", link.display()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Installer {
    unit_dir: PathBuf,
}

impl Installer {
    pub fn new(unit_dir: impl Into<PathBuf>) -> Self {
        Self {
            unit_dir: unit_dir.into(),
        }
    }

    pub fn unit_dir(&self) -> &Path {
        &self.unit_dir
    }

    pub fn unit_path(&self, name: &str) -> PathBuf {
        self.unit_dir.join(name)
    }

    /// Write the canonical text of `unit` into the unit directory.
    pub fn install(&self, unit: &ServiceUnit) -> Result<PathBuf, CoreError> {
        fs::create_dir_all(&self.unit_dir).map_err(|e| CoreError::io(&self.unit_dir, e))?;
        let path = self.unit_path(&unit.name);
        let tmp = self.unit_dir.join(format!(".{}.tmp", unit.name));
        fs::write(&tmp, unit.render()).map_err(|e| CoreError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| CoreError::io(&path, e))?;
        info!(target: "warden::core", unit = %unit.name, path = %path.display(), "unit installed");
        Ok(path)
    }

    /// Load an installed unit by name.
    pub fn load(&self, name: &str) -> Result<ServiceUnit, CoreError> {
        let path = self.unit_path(name);
        if !path.exists() {
            return Err(CoreError::NotInstalled(name.to_string()));
        }
        Ok(ServiceUnit::load(&path)?)
    }

    fn links_for(&self, unit: &ServiceUnit) -> Result<Vec<PathBuf>, CoreError> {
        let wants = unit.install.wanted_by.iter().map(|t| (t, WANTS));
        let requires = unit.install.required_by.iter().map(|t| (t, REQUIRES));
        wants
            .chain(requires)
            .map(|(target, suffix)| {
                if !is_target_name(target) {
                    return Err(CoreError::InvalidTarget {
                        unit: unit.name.clone(),
                        target: target.clone(),
                    });
                }
                Ok(self
                    .unit_dir
                    .join(format!("{target}{suffix}"))
                    .join(&unit.name))
            })
            .collect()
    }

    pub fn enable(&self, unit: &ServiceUnit) -> Result<Vec<Change>, CoreError> {
        if unit.install.is_empty() {
            return Err(CoreError::NotInstallable(unit.name.clone()));
        }
        let target = self.unit_path(&unit.name);
        if !target.exists() {
            return Err(CoreError::NotInstalled(unit.name.clone()));
        }

        let mut changes = Vec::new();
        for link in self.links_for(unit)? {
            if let Some(dir) = link.parent() {
                fs::create_dir_all(dir).map_err(|e| CoreError::io(dir, e))?;
            }
            match fs::read_link(&link) {
                Ok(existing) if existing == target => {
                    debug!(target: "warden::core", link = %link.display(), "already enabled");
                    continue;
                }
                Ok(_) => {
                    fs::remove_file(&link).map_err(|e| CoreError::io(&link, e))?;
                    changes.push(Change::Removed { link: link.clone() });
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CoreError::io(&link, e)),
            }
            symlink(&target, &link).map_err(|e| CoreError::io(&link, e))?;
            changes.push(Change::Created {
                link,
                target: target.clone(),
            });
        }
        Ok(changes)
    }

    /// Remove every `*.wants`/`*.requires` link to the unit, whichever targets it names now.
    pub fn disable(&self, unit: &ServiceUnit) -> Result<Vec<Change>, CoreError> {
        let mut changes = Vec::new();
        for dir in self.target_dirs()? {
            let link = dir.join(&unit.name);
            match fs::symlink_metadata(&link) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    fs::remove_file(&link).map_err(|e| CoreError::io(&link, e))?;
                    changes.push(Change::Removed { link });
                }
                Ok(_) => {
                    warn!(target: "warden::core", path = %link.display(), "not a symlink; left in place")
                }
                Err(_) => {}
            }
        }
        Ok(changes)
    }

    pub fn is_enabled(&self, unit: &ServiceUnit) -> bool {
        let target = self.unit_path(&unit.name);
        self.links_for(unit)
            .unwrap_or_default()
            .iter()
            .any(|link| fs::read_link(link).is_ok_and(|dest| dest == target))
    }

    /// Unit files linked under `target`, sorted by name.
    pub fn enabled_units(&self, target: &str) -> Result<Vec<PathBuf>, CoreError> {
        if !is_target_name(target) {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for suffix in [WANTS, REQUIRES] {
            let dir = self.unit_dir.join(format!("{target}{suffix}"));
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(CoreError::io(&dir, e)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| CoreError::io(&dir, e))?;
                let path = entry.path();
                if path.extension().is_some_and(|ext| ext == "service") && !out.contains(&path) {
                    out.push(path);
                }
            }
        }
        out.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        out.dedup_by(|a, b| a.file_name() == b.file_name());
        Ok(out)
    }

    fn target_dirs(&self) -> Result<Vec<PathBuf>, CoreError> {
        let entries = match fs::read_dir(&self.unit_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CoreError::io(&self.unit_dir, e)),
        };
        let mut dirs = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CoreError::io(&self.unit_dir, e))?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if (name.ends_with(WANTS) || name.ends_with(REQUIRES)) && entry.path().is_dir() {
                dirs.push(entry.path());
            }
        }
        Ok(dirs)
    }
}

/// A target is a plain file name inside the unit directory.
fn is_target_name(target: &str) -> bool {
    !target.is_empty() && target != "." && target != ".." && !target.contains('/')
}
