//! Records stored in the cache and the update they are built from.

use crate::error::{CacheError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User as stored in `UserByName` and `UserByID`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Login name.
    pub name: String,
    /// Numeric user ID.
    pub uid: u32,
    /// Primary group ID.
    pub gid: u32,
    /// GECOS field.
    pub gecos: String,
    /// Home directory.
    pub dir: String,
    /// Login shell.
    pub shell: String,
    /// Last time the user authenticated through the daemon.
    pub last_login: DateTime<Utc>,
}

/// Group as stored in `GroupByName` and `GroupByID`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRecord {
    /// Group name.
    pub name: String,
    /// Numeric group ID.
    pub gid: u32,
}

/// Group with the names of its members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    /// Group name.
    pub name: String,
    /// Numeric group ID.
    pub gid: u32,
    /// Member login names, in UID order.
    pub members: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct UserToGroups {
    pub uid: u32,
    pub gids: Vec<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct GroupToUsers {
    pub gid: u32,
    pub uids: Vec<u32>,
}

/// Group membership reported for a user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupInfo {
    /// Group name.
    pub name: String,
    /// Numeric group ID.
    pub gid: u32,
}

impl GroupInfo {
    /// Create a group membership.
    #[must_use]
    pub fn new(name: impl Into<String>, gid: u32) -> Self {
        Self {
            name: name.into(),
            gid,
        }
    }
}

/// Resolved identity of an authenticated user, with IDs already assigned.
///
/// The first group is the primary group. A user without groups gets a
/// primary group ID equal to its UID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    /// Login name.
    pub name: String,
    /// Numeric user ID.
    pub uid: u32,
    /// GECOS field.
    pub gecos: String,
    /// Home directory.
    pub dir: String,
    /// Login shell.
    pub shell: String,
    /// Group memberships, primary group first.
    pub groups: Vec<GroupInfo>,
}

impl UserInfo {
    /// Groups of the user with exact repeats dropped, in order.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidUserInfo`] if two groups share a name
    /// but not a GID, or a GID but not a name.
    pub fn unique_groups(&self) -> Result<Vec<&GroupInfo>> {
        let mut unique: Vec<&GroupInfo> = Vec::with_capacity(self.groups.len());
        for group in &self.groups {
            let Some(seen) = unique
                .iter()
                .find(|seen| seen.name == group.name || seen.gid == group.gid)
            else {
                unique.push(group);
                continue;
            };
            if **seen != *group {
                return Err(CacheError::InvalidUserInfo {
                    user: self.name.clone(),
                    reason: format!(
                        "groups {:?} ({}) and {:?} ({}) conflict",
                        seen.name, seen.gid, group.name, group.gid
                    ),
                });
            }
        }
        Ok(unique)
    }

    pub(crate) fn primary_gid(&self) -> u32 {
        self.groups.first().map_or(self.uid, |group| group.gid)
    }

    pub(crate) fn to_record(&self, last_login: DateTime<Utc>) -> UserRecord {
        UserRecord {
            name: self.name.clone(),
            uid: self.uid,
            gid: self.primary_gid(),
            gecos: self.gecos.clone(),
            dir: self.dir.clone(),
            shell: self.shell.clone(),
            last_login,
        }
    }
}
