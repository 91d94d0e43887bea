//! Caching users granted by a broker.
//!
//! Brokers identify users and groups by name and opaque IDs; the cache
//! stores numeric ones. Names already cached keep their IDs, new names get
//! fresh ones from an [`IdGenerator`].

use crate::db::Cache;
use crate::error::Result;
use crate::idgen::IdGenerator;
use crate::records::{GroupInfo, UserInfo};
use std::collections::BTreeSet;

impl Cache {
    /// Assign numeric IDs to a user granted by a broker and store it.
    ///
    /// The user gets a private group named after it, with GID equal to its
    /// UID, as primary group. Broker groups without a `ugid` are local
    /// groups, managed outside the cache, and are skipped.
    ///
    /// # Errors
    ///
    /// Returns error if no ID is left in a range, or if the update is
    /// refused (see [`Cache::update_from_user_info`]).
    pub fn register_user(&self, info: &authd_broker::UserInfo, ids: &IdGenerator) -> Result<UserInfo> {
        let result = self.assign_ids(info, ids).and_then(|user| {
            self.update_from_user_info(&user)?;
            Ok(user)
        });
        ids.clear_pending();

        if let Ok(user) = &result {
            tracing::info!(user = %user.name, uid = user.uid, "Registered user in cache");
        }
        result
    }

    fn assign_ids(&self, info: &authd_broker::UserInfo, ids: &IdGenerator) -> Result<UserInfo> {
        let gids: BTreeSet<u32> = self.all_groups()?.iter().map(|group| group.gid).collect();

        let uid = match self.user_by_name(&info.name) {
            Ok(user) => user.uid,
            Err(e) if e.is_not_found() => {
                let mut taken: BTreeSet<u32> = self.all_users()?.iter().map(|user| user.uid).collect();
                taken.extend(&gids);
                ids.generate_uid(&taken)?
            }
            Err(e) => return Err(e),
        };

        let mut groups = vec![GroupInfo::new(info.name.as_str(), uid)];
        for group in info.groups.iter().filter(|group| !group.ugid.is_empty()) {
            let gid = match self.group_by_name(&group.name) {
                Ok(cached) => cached.gid,
                Err(e) if e.is_not_found() => ids.generate_gid(&gids)?,
                Err(e) => return Err(e),
            };
            groups.push(GroupInfo::new(group.name.as_str(), gid));
        }

        Ok(UserInfo {
            name: info.name.clone(),
            uid,
            gecos: info.gecos.clone(),
            dir: info.dir.clone(),
            shell: info.shell.clone(),
            groups,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use crate::idgen::IdRange;

    fn broker_user(name: &str, groups: &[(&str, &str)]) -> authd_broker::UserInfo {
        authd_broker::UserInfo {
            name: name.to_string(),
            uuid: format!("uuid-{name}"),
            gecos: name.to_string(),
            dir: format!("/home/{name}"),
            shell: "/usr/bin/bash".to_string(),
            groups: groups
                .iter()
                .map(|(name, ugid)| authd_broker::GroupInfo {
                    name: (*name).to_string(),
                    ugid: (*ugid).to_string(),
                })
                .collect(),
        }
    }

    fn ids() -> IdGenerator {
        IdGenerator::new(IdRange::new(10_000, 19_999), IdRange::new(20_000, 29_999))
    }

    #[test]
    fn test_new_user_gets_fresh_ids() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(&CacheConfig::new(dir.path())).unwrap();
        let ids = ids();

        let user = cache
            .register_user(&broker_user("user1", &[("group1", "ugid-1"), ("local", "")]), &ids)
            .unwrap();

        assert_eq!(user.uid, 10_000);
        assert_eq!(user.groups, vec![GroupInfo::new("user1", 10_000), GroupInfo::new("group1", 20_000)]);
        assert_eq!(cache.user_by_name("user1").unwrap().gid, 10_000);
        assert!(cache.group_by_name("local").unwrap_err().is_not_found());
    }

    #[test]
    fn test_known_names_keep_their_ids() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(&CacheConfig::new(dir.path())).unwrap();
        let ids = ids();

        let first = cache
            .register_user(&broker_user("user1", &[("shared", "ugid-shared")]), &ids)
            .unwrap();
        let again = cache
            .register_user(&broker_user("user1", &[("shared", "ugid-shared")]), &ids)
            .unwrap();
        assert_eq!(first, again);

        let other = cache
            .register_user(&broker_user("user2", &[("shared", "ugid-shared"), ("team", "ugid-team")]), &ids)
            .unwrap();
        assert_eq!(other.uid, 10_001);
        assert_eq!(other.groups[1], GroupInfo::new("shared", 20_000));
        assert_eq!(other.groups[2], GroupInfo::new("team", 20_001));

        let members = cache.group_entry_by_name("shared").unwrap().members;
        assert_eq!(members, vec!["user1".to_string(), "user2".to_string()]);
    }
}
