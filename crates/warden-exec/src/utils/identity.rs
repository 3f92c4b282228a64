//! `User=`/`Group=` resolution against the system user database.

use std::{ffi::CString, path::PathBuf};

use nix::unistd::{Gid, Group, Uid, User, getgrouplist};

use crate::error::{ExecError, ExecResult};

/// Credentials a unit's processes run under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub uid: Uid,
    pub gid: Gid,
    /// Login name, when the uid is known to the user database.
    pub name: Option<String>,
    pub home: Option<PathBuf>,
    pub shell: Option<PathBuf>,
}

impl Identity {
    /// Resolve `user` and `group`. Returns `None` when neither is set.
    ///
    /// Both accept a name or a numeric id. With only `user` set, the user's primary group is used.
    pub fn resolve(user: Option<&str>, group: Option<&str>) -> ExecResult<Option<Identity>> {
        if user.is_none() && group.is_none() {
            return Ok(None);
        }

        let mut identity = match user {
            Some(user) => {
                let found = lookup_user(user)?;
                Identity {
                    uid: found.uid,
                    gid: found.gid,
                    name: Some(found.name),
                    home: Some(found.dir),
                    shell: Some(found.shell),
                }
            }
            None => Identity {
                uid: Uid::effective(),
                gid: Gid::effective(),
                name: None,
                home: None,
                shell: None,
            },
        };
        if let Some(group) = group {
            identity.gid = lookup_group(group)?;
        }
        Ok(Some(identity))
    }

    pub fn is_current(&self) -> bool {
        self.uid == Uid::effective() && self.gid == Gid::effective()
    }

    pub(crate) fn c_name(&self) -> Option<CString> {
        self.name.as_deref().and_then(|n| CString::new(n).ok())
    }

    /// Supplementary groups for the switch: the user's memberships plus `gid`.
    /// Without a login name only `gid` is kept.
    pub fn groups(&self) -> ExecResult<Vec<Gid>> {
        let Some(name) = self.c_name() else {
            return Ok(vec![self.gid]);
        };
        let mut groups = getgrouplist(&name, self.gid).map_err(|e| ExecError::Lookup {
            name: name.to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;
        if !groups.contains(&self.gid) {
            groups.push(self.gid);
        }
        Ok(groups)
    }
}

fn lookup_user(who: &str) -> ExecResult<User> {
    let found = match who.parse::<u32>() {
        Ok(raw) => User::from_uid(Uid::from_raw(raw)),
        Err(_) => User::from_name(who),
    };
    match found {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err(ExecError::UnknownUser(who.to_string())),
        Err(e) => Err(ExecError::Lookup {
            name: who.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn lookup_group(who: &str) -> ExecResult<Gid> {
    if let Ok(raw) = who.parse::<u32>() {
        // Numeric gids need no database entry.
        return Ok(Gid::from_raw(raw));
    }
    match Group::from_name(who) {
        Ok(Some(group)) => Ok(group.gid),
        Ok(None) => Err(ExecError::UnknownGroup(who.to_string())),
        Err(e) => Err(ExecError::Lookup {
            name: who.to_string(),
            reason: e.to_string(),
        }),
    }
}
