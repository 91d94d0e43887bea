//! Typed user and group queries and updates.
//!
//! Values are JSON records keyed by name or by stringified numeric ID. A
//! record that cannot be decoded, or a membership pointing at a record that
//! does not exist, means the file can no longer be trusted: the query asks
//! for a rebuild and reports the entry as not found.

use crate::db::{
    Cache, GROUP_BY_ID, GROUP_BY_NAME, GROUP_TO_USERS, Table, USER_BY_ID, USER_BY_NAME,
    USER_TO_GROUPS,
};
use crate::error::{CacheError, Result};
use crate::records::{
    GroupEntry, GroupInfo, GroupRecord, GroupToUsers, UserInfo, UserRecord, UserToGroups,
};
use chrono::{DateTime, Utc};
use redb::{ReadTransaction, ReadableTable, TableHandle, WriteTransaction};
use serde::Serialize;
use serde::de::DeserializeOwned;

type RwTable<'txn> = redb::Table<'txn, &'static str, &'static [u8]>;

impl Cache {
    /// User with login `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoDataFound`] if no such user is cached.
    pub fn user_by_name(&self, name: &str) -> Result<UserRecord> {
        self.query(|txn| lookup(txn, USER_BY_NAME, name))
    }

    /// User with ID `uid`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoDataFound`] if no such user is cached.
    pub fn user_by_id(&self, uid: u32) -> Result<UserRecord> {
        self.query(|txn| lookup(txn, USER_BY_ID, &uid.to_string()))
    }

    /// Group named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoDataFound`] if no such group is cached.
    pub fn group_by_name(&self, name: &str) -> Result<GroupRecord> {
        self.query(|txn| lookup(txn, GROUP_BY_NAME, name))
    }

    /// Group with ID `gid`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoDataFound`] if no such group is cached.
    pub fn group_by_id(&self, gid: u32) -> Result<GroupRecord> {
        self.query(|txn| lookup(txn, GROUP_BY_ID, &gid.to_string()))
    }

    /// Groups of the user with ID `uid`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoDataFound`] if the user has no cached memberships.
    pub fn user_groups(&self, uid: u32) -> Result<Vec<GroupRecord>> {
        self.query(|txn| {
            let link: UserToGroups = lookup(txn, USER_TO_GROUPS, &uid.to_string())?;
            let groups = txn.open_table(GROUP_BY_ID)?;
            link.gids
                .iter()
                .map(|gid| member(&groups, GROUP_BY_ID, *gid))
                .collect()
        })
    }

    /// Members of the group with ID `gid`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoDataFound`] if the group has no cached members.
    pub fn group_members(&self, gid: u32) -> Result<Vec<UserRecord>> {
        self.query(|txn| {
            let link: GroupToUsers = lookup(txn, GROUP_TO_USERS, &gid.to_string())?;
            let users = txn.open_table(USER_BY_ID)?;
            link.uids
                .iter()
                .map(|uid| member(&users, USER_BY_ID, *uid))
                .collect()
        })
    }

    /// Group named `name` with its member names.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoDataFound`] if no such group is cached.
    pub fn group_entry_by_name(&self, name: &str) -> Result<GroupEntry> {
        self.query(|txn| group_entry(txn, lookup(txn, GROUP_BY_NAME, name)?))
    }

    /// Group with ID `gid` with its member names.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoDataFound`] if no such group is cached.
    pub fn group_entry_by_gid(&self, gid: u32) -> Result<GroupEntry> {
        self.query(|txn| group_entry(txn, lookup(txn, GROUP_BY_ID, &gid.to_string())?))
    }

    /// Every cached user, by UID.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be read.
    pub fn all_users(&self) -> Result<Vec<UserRecord>> {
        let mut users: Vec<UserRecord> = self.query(|txn| all(txn, USER_BY_ID))?;
        users.sort_by_key(|user| user.uid);
        Ok(users)
    }

    /// Every cached group, by GID.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be read.
    pub fn all_groups(&self) -> Result<Vec<GroupRecord>> {
        let mut groups: Vec<GroupRecord> = self.query(|txn| all(txn, GROUP_BY_ID))?;
        groups.sort_by_key(|group| group.gid);
        Ok(groups)
    }

    /// Store a freshly authenticated user, its groups and memberships.
    ///
    /// Runs as one transaction: a renamed user or group loses its stale name
    /// entry, groups the user left no longer list it, and groups left without
    /// members are removed. Stamps `last_login` with the cache clock.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidUserInfo`] if two groups share a name or
    /// a GID, before anything is written.
    /// Returns [`CacheError::Corrupted`] if existing records cannot be
    /// decoded; a rebuild is requested and nothing is written.
    pub fn update_from_user_info(&self, info: &UserInfo) -> Result<()> {
        let groups = info.unique_groups()?;
        let now = self.clock.now();
        let result = self.with_db(|db| {
            let txn = db.begin_write()?;
            update_user(&txn, info, &groups, now)?;
            txn.commit()?;
            Ok(())
        });

        match &result {
            Ok(()) => tracing::debug!(user = %info.name, uid = info.uid, "Updated cached user"),
            Err(CacheError::Corrupted { table, key, reason }) => {
                tracing::warn!(table = %table, key = %key, reason = %reason, "Cache corrupted, requesting rebuild");
                self.request_rebuild();
            }
            Err(_) => {}
        }
        result
    }

    /// Run a read-only query, turning corruption into a rebuild request.
    fn query<T>(&self, f: impl FnOnce(&ReadTransaction) -> Result<T>) -> Result<T> {
        let result = self.with_db(|db| {
            let txn = db.begin_read()?;
            f(&txn)
        });

        match result {
            Err(CacheError::Corrupted { key, table, reason }) => {
                tracing::warn!(table = %table, key = %key, reason = %reason, "Cache corrupted, requesting rebuild");
                self.request_rebuild();
                Err(CacheError::NoDataFound { key, table })
            }
            other => other,
        }
    }
}

/// Decode the value stored under `key`, if any.
fn fetch<T, R>(table: &R, name: &str, key: &str) -> Result<Option<T>>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    table
        .get(key)?
        .map(|value| decode(name, key, value.value()))
        .transpose()
}

fn decode<T: DeserializeOwned>(table: &str, key: &str, bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| CacheError::Corrupted {
        key: key.to_string(),
        table: table.to_string(),
        reason: format!("can't decode record: {e}"),
    })
}

fn lookup<T: DeserializeOwned>(txn: &ReadTransaction, def: Table, key: &str) -> Result<T> {
    let table = txn.open_table(def)?;
    fetch(&table, def.name(), key)?.ok_or_else(|| CacheError::not_found(key, def.name()))
}

/// Record referenced by a membership; a missing one is corruption.
fn member<T, R>(table: &R, def: Table, id: u32) -> Result<T>
where
    T: DeserializeOwned,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    let key = id.to_string();
    fetch(table, def.name(), &key)?.ok_or_else(|| CacheError::Corrupted {
        key,
        table: def.name().to_string(),
        reason: "referenced by a membership but missing".to_string(),
    })
}

fn all<T: DeserializeOwned>(txn: &ReadTransaction, def: Table) -> Result<Vec<T>> {
    let table = txn.open_table(def)?;
    let mut records = Vec::new();
    for entry in table.iter()? {
        let (key, value) = entry?;
        records.push(decode(def.name(), key.value(), value.value())?);
    }
    Ok(records)
}

fn group_entry(txn: &ReadTransaction, group: GroupRecord) -> Result<GroupEntry> {
    let links = txn.open_table(GROUP_TO_USERS)?;
    let uids = fetch::<GroupToUsers, _>(&links, GROUP_TO_USERS.name(), &group.gid.to_string())?
        .map(|link| link.uids)
        .unwrap_or_default();

    let users = txn.open_table(USER_BY_ID)?;
    let members = uids
        .into_iter()
        .map(|uid| member::<UserRecord, _>(&users, USER_BY_ID, uid).map(|user| user.name))
        .collect::<Result<Vec<_>>>()?;

    Ok(GroupEntry {
        name: group.name,
        gid: group.gid,
        members,
    })
}

fn put<T: Serialize>(table: &mut RwTable<'_>, key: &str, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value)?;
    table.insert(key, bytes.as_slice())?;
    Ok(())
}

fn update_user(
    txn: &WriteTransaction,
    info: &UserInfo,
    groups: &[&GroupInfo],
    now: DateTime<Utc>,
) -> Result<()> {
    let mut tables = WriteTables::open(txn)?;

    tables.upsert_user(&info.to_record(now))?;
    for group in groups {
        tables.upsert_group(&GroupRecord {
            name: group.name.clone(),
            gid: group.gid,
        })?;
    }

    let gids: Vec<u32> = groups.iter().map(|group| group.gid).collect();

    let previous = tables.replace_user_groups(info.uid, &gids)?;
    for gid in &gids {
        tables.add_member(*gid, info.uid)?;
    }
    for gid in previous.into_iter().filter(|gid| !gids.contains(gid)) {
        tables.remove_member(gid, info.uid)?;
    }

    Ok(())
}

/// All tables of one write transaction.
struct WriteTables<'txn> {
    user_by_name: RwTable<'txn>,
    user_by_id: RwTable<'txn>,
    group_by_name: RwTable<'txn>,
    group_by_id: RwTable<'txn>,
    user_to_groups: RwTable<'txn>,
    group_to_users: RwTable<'txn>,
}

impl<'txn> WriteTables<'txn> {
    fn open(txn: &'txn WriteTransaction) -> Result<Self> {
        Ok(Self {
            user_by_name: txn.open_table(USER_BY_NAME)?,
            user_by_id: txn.open_table(USER_BY_ID)?,
            group_by_name: txn.open_table(GROUP_BY_NAME)?,
            group_by_id: txn.open_table(GROUP_BY_ID)?,
            user_to_groups: txn.open_table(USER_TO_GROUPS)?,
            group_to_users: txn.open_table(GROUP_TO_USERS)?,
        })
    }

    fn upsert_user(&mut self, user: &UserRecord) -> Result<()> {
        let key = user.uid.to_string();

        let previous: Option<UserRecord> = fetch(&self.user_by_id, USER_BY_ID.name(), &key)?;
        if let Some(previous) = previous.filter(|previous| previous.name != user.name) {
            tracing::debug!(uid = user.uid, from = %previous.name, to = %user.name, "Renaming cached user");
            self.user_by_name.remove(previous.name.as_str())?;
        }

        // The name moved to another UID: the old one is gone.
        let owner: Option<UserRecord> = fetch(&self.user_by_name, USER_BY_NAME.name(), &user.name)?;
        if let Some(owner) = owner.filter(|owner| owner.uid != user.uid) {
            self.evict_user(owner.uid)?;
        }

        put(&mut self.user_by_id, &key, user)?;
        put(&mut self.user_by_name, &user.name, user)
    }

    fn upsert_group(&mut self, group: &GroupRecord) -> Result<()> {
        let key = group.gid.to_string();

        let previous: Option<GroupRecord> = fetch(&self.group_by_id, GROUP_BY_ID.name(), &key)?;
        if let Some(previous) = previous.filter(|previous| previous.name != group.name) {
            tracing::debug!(gid = group.gid, from = %previous.name, to = %group.name, "Renaming cached group");
            self.group_by_name.remove(previous.name.as_str())?;
        }

        let owner: Option<GroupRecord> = fetch(&self.group_by_name, GROUP_BY_NAME.name(), &group.name)?;
        if let Some(owner) = owner.filter(|owner| owner.gid != group.gid) {
            self.remove_group(owner.gid)?;
        }

        put(&mut self.group_by_id, &key, group)?;
        put(&mut self.group_by_name, &group.name, group)
    }

    /// Set the groups of `uid`, returning the previous ones.
    fn replace_user_groups(&mut self, uid: u32, gids: &[u32]) -> Result<Vec<u32>> {
        let key = uid.to_string();
        let previous: Option<UserToGroups> = fetch(&self.user_to_groups, USER_TO_GROUPS.name(), &key)?;
        put(
            &mut self.user_to_groups,
            &key,
            &UserToGroups {
                uid,
                gids: gids.to_vec(),
            },
        )?;
        Ok(previous.map(|link| link.gids).unwrap_or_default())
    }

    fn add_member(&mut self, gid: u32, uid: u32) -> Result<()> {
        let key = gid.to_string();
        let mut link: GroupToUsers = fetch(&self.group_to_users, GROUP_TO_USERS.name(), &key)?
            .unwrap_or(GroupToUsers { gid, uids: Vec::new() });
        if !link.uids.contains(&uid) {
            link.uids.push(uid);
            link.uids.sort_unstable();
        }
        put(&mut self.group_to_users, &key, &link)
    }

    /// Drop `uid` from the members of `gid`, removing the group once empty.
    fn remove_member(&mut self, gid: u32, uid: u32) -> Result<()> {
        let key = gid.to_string();
        let Some(mut link) = fetch::<GroupToUsers, _>(&self.group_to_users, GROUP_TO_USERS.name(), &key)? else {
            return Ok(());
        };

        link.uids.retain(|member| *member != uid);
        if link.uids.is_empty() {
            return self.remove_group(gid);
        }
        put(&mut self.group_to_users, &key, &link)
    }

    /// Remove a group and every membership pointing at it.
    fn remove_group(&mut self, gid: u32) -> Result<()> {
        let key = gid.to_string();

        if let Some(group) = fetch::<GroupRecord, _>(&self.group_by_id, GROUP_BY_ID.name(), &key)? {
            let owned = fetch::<GroupRecord, _>(&self.group_by_name, GROUP_BY_NAME.name(), &group.name)?
                .is_some_and(|owner| owner.gid == gid);
            if owned {
                self.group_by_name.remove(group.name.as_str())?;
            }
        }
        self.group_by_id.remove(key.as_str())?;

        let members = fetch::<GroupToUsers, _>(&self.group_to_users, GROUP_TO_USERS.name(), &key)?
            .map(|link| link.uids)
            .unwrap_or_default();
        self.group_to_users.remove(key.as_str())?;

        for uid in members {
            let user_key = uid.to_string();
            if let Some(mut link) = fetch::<UserToGroups, _>(&self.user_to_groups, USER_TO_GROUPS.name(), &user_key)? {
                link.gids.retain(|member| *member != gid);
                put(&mut self.user_to_groups, &user_key, &link)?;
            }
        }

        tracing::debug!(gid, "Removed cached group");
        Ok(())
    }

    /// Remove a user record by ID and its memberships; its name entry is
    /// about to be overwritten.
    fn evict_user(&mut self, uid: u32) -> Result<()> {
        let key = uid.to_string();
        self.user_by_id.remove(key.as_str())?;

        let gids = fetch::<UserToGroups, _>(&self.user_to_groups, USER_TO_GROUPS.name(), &key)?
            .map(|link| link.gids)
            .unwrap_or_default();
        self.user_to_groups.remove(key.as_str())?;
        for gid in gids {
            self.remove_member(gid, uid)?;
        }

        tracing::debug!(uid, "Evicted cached user");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheConfig;
    use std::time::{Duration, Instant};

    fn open(dir: &std::path::Path) -> Cache {
        Cache::new(&CacheConfig::new(dir)).unwrap()
    }

    fn user(name: &str, uid: u32, groups: &[(&str, u32)]) -> UserInfo {
        UserInfo {
            name: name.to_string(),
            uid,
            gecos: format!("gecos for {name}"),
            dir: format!("/home/{name}"),
            shell: "/usr/bin/bash".to_string(),
            groups: groups.iter().map(|(n, g)| GroupInfo::new(*n, *g)).collect(),
        }
    }

    fn write_raw(cache: &Cache, def: Table, key: &str, value: &[u8]) {
        cache
            .with_db(|db| {
                let txn = db.begin_write()?;
                txn.open_table(def)?.insert(key, value)?;
                txn.commit()?;
                Ok(())
            })
            .unwrap();
    }

    fn wait_for(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn test_user_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache
            .update_from_user_info(&user("user1", 1111, &[("group1", 11111)]))
            .unwrap();

        let by_name = cache.user_by_name("user1").unwrap();
        let by_id = cache.user_by_id(1111).unwrap();
        assert_eq!(by_name, by_id);
        assert_eq!(by_name.gid, 11111);
        assert_eq!(cache.group_by_name("group1").unwrap().gid, 11111);
        assert_eq!(cache.group_by_id(11111).unwrap().name, "group1");
    }

    #[test]
    fn test_missing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());

        assert!(cache.user_by_name("nobody").unwrap_err().is_not_found());
        assert!(cache.user_by_id(4242).unwrap_err().is_not_found());
        assert!(cache.group_by_name("nogroup").unwrap_err().is_not_found());
        assert!(cache.group_members(4242).unwrap_err().is_not_found());
        assert!(cache.all_users().unwrap().is_empty());
    }

    #[test]
    fn test_memberships_both_ways() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache
            .update_from_user_info(&user("user1", 1111, &[("group1", 11111), ("shared", 33333)]))
            .unwrap();
        cache
            .update_from_user_info(&user("user2", 2222, &[("group2", 22222), ("shared", 33333)]))
            .unwrap();

        let groups: Vec<u32> = cache.user_groups(1111).unwrap().iter().map(|g| g.gid).collect();
        assert_eq!(groups, vec![11111, 33333]);

        let entry = cache.group_entry_by_name("shared").unwrap();
        assert_eq!(entry.members, vec!["user1".to_string(), "user2".to_string()]);
        assert_eq!(cache.group_entry_by_gid(33333).unwrap(), entry);

        let members: Vec<u32> = cache.group_members(33333).unwrap().iter().map(|u| u.uid).collect();
        assert_eq!(members, vec![1111, 2222]);
    }

    #[test]
    fn test_left_groups_are_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache
            .update_from_user_info(&user("user1", 1111, &[("group1", 11111), ("shared", 33333)]))
            .unwrap();
        cache
            .update_from_user_info(&user("user2", 2222, &[("shared", 33333)]))
            .unwrap();

        cache
            .update_from_user_info(&user("user1", 1111, &[("group1", 11111)]))
            .unwrap();

        assert_eq!(cache.group_entry_by_gid(33333).unwrap().members, vec!["user2".to_string()]);

        cache
            .update_from_user_info(&user("user2", 2222, &[("group2", 22222)]))
            .unwrap();
        assert!(cache.group_by_id(33333).unwrap_err().is_not_found());
        assert!(cache.group_by_name("shared").unwrap_err().is_not_found());
    }

    #[test]
    fn test_renamed_user_drops_stale_name() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache
            .update_from_user_info(&user("user1", 1111, &[("group1", 11111)]))
            .unwrap();
        cache
            .update_from_user_info(&user("renamed", 1111, &[("group1", 11111)]))
            .unwrap();

        assert!(cache.user_by_name("user1").unwrap_err().is_not_found());
        assert_eq!(cache.user_by_id(1111).unwrap().name, "renamed");
        assert_eq!(cache.group_entry_by_gid(11111).unwrap().members, vec!["renamed".to_string()]);
    }

    #[test]
    fn test_name_reused_by_another_uid() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache
            .update_from_user_info(&user("user1", 1111, &[("group1", 11111)]))
            .unwrap();
        cache
            .update_from_user_info(&user("user1", 5555, &[("group5", 55555)]))
            .unwrap();

        assert!(cache.user_by_id(1111).unwrap_err().is_not_found());
        assert!(cache.group_by_id(11111).unwrap_err().is_not_found());
        assert_eq!(cache.user_by_name("user1").unwrap().uid, 5555);
        assert_eq!(cache.all_users().unwrap().len(), 1);
    }

    #[test]
    fn test_enumeration_is_sorted_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache.update_from_user_info(&user("b", 10000, &[("gb", 200)])).unwrap();
        cache.update_from_user_info(&user("a", 999, &[("ga", 1000)])).unwrap();

        let uids: Vec<u32> = cache.all_users().unwrap().iter().map(|u| u.uid).collect();
        assert_eq!(uids, vec![999, 10000]);
        let gids: Vec<u32> = cache.all_groups().unwrap().iter().map(|g| g.gid).collect();
        assert_eq!(gids, vec![200, 1000]);
    }

    #[test]
    fn test_undecodable_record_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache
            .update_from_user_info(&user("user1", 1111, &[("group1", 11111)]))
            .unwrap();
        write_raw(&cache, USER_BY_NAME, "user1", b"not json");

        assert!(cache.user_by_name("user1").unwrap_err().is_not_found());

        // The rebuild wipes everything, including the healthy records.
        wait_for(|| cache.user_by_id(1111).is_err_and(|e| e.is_not_found()));
        assert!(cache.is_available());
        assert!(!dir.path().join(crate::config::DIRTY_FLAG_NAME).exists());
    }

    #[test]
    fn test_dangling_membership_triggers_rebuild() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache
            .update_from_user_info(&user("user1", 1111, &[("group1", 11111)]))
            .unwrap();
        write_raw(&cache, USER_TO_GROUPS, "1111", br#"{"uid":1111,"gids":[11111,77777]}"#);

        assert!(cache.user_groups(1111).unwrap_err().is_not_found());
        wait_for(|| cache.user_by_name("user1").is_err_and(|e| e.is_not_found()));
    }

    #[test]
    fn test_update_over_corrupted_record_is_rolled_back() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        write_raw(&cache, USER_BY_ID, "1111", b"garbage");

        let err = cache
            .update_from_user_info(&user("user1", 1111, &[("group1", 11111)]))
            .unwrap_err();
        assert!(matches!(err, CacheError::Corrupted { .. }));
        assert!(err.is_retryable());

        wait_for(|| cache.all_users().is_ok_and(|users| users.is_empty()));
        cache
            .update_from_user_info(&user("user1", 1111, &[("group1", 11111)]))
            .unwrap();
    }

    #[test]
    fn test_conflicting_groups_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache
            .update_from_user_info(&user("user1", 1111, &[("group1", 11111)]))
            .unwrap();

        let err = cache
            .update_from_user_info(&user("user1", 1111, &[("dup", 1), ("dup", 2)]))
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidUserInfo { .. }));
        let err = cache
            .update_from_user_info(&user("user1", 1111, &[("a", 1), ("b", 1)]))
            .unwrap_err();
        assert!(matches!(err, CacheError::InvalidUserInfo { .. }));

        // Nothing was written and no rebuild was requested.
        let groups: Vec<u32> = cache.user_groups(1111).unwrap().iter().map(|g| g.gid).collect();
        assert_eq!(groups, vec![11111]);
        assert!(cache.group_by_name("dup").unwrap_err().is_not_found());
        assert!(!dir.path().join(crate::config::DIRTY_FLAG_NAME).exists());
    }

    #[test]
    fn test_repeated_group_is_stored_once() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache
            .update_from_user_info(&user("user1", 1111, &[("group1", 11111), ("group1", 11111)]))
            .unwrap();

        assert_eq!(cache.user_groups(1111).unwrap().len(), 1);
        assert_eq!(
            cache.group_entry_by_gid(11111).unwrap().members,
            vec!["user1".to_string()]
        );
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;
        use std::collections::{BTreeMap, BTreeSet};

        const GROUPS: [(&str, u32); 4] = [("g0", 5000), ("g1", 5001), ("g2", 5002), ("g3", 5003)];

        fn updates() -> impl Strategy<Value = Vec<(u32, Vec<usize>)>> {
            proptest::collection::vec(
                (0u32..3, proptest::sample::subsequence(vec![0usize, 1, 2, 3], 1..=4)),
                1..8,
            )
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn prop_memberships_match_last_update(updates in updates()) {
                let dir = tempfile::tempdir().unwrap();
                let cache = open(dir.path());
                let mut expected: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();

                for (n, groups) in &updates {
                    let uid = 1000 + n;
                    let groups: Vec<(&str, u32)> = groups.iter().map(|i| GROUPS[*i]).collect();
                    cache.update_from_user_info(&user(&format!("user{n}"), uid, &groups)).unwrap();
                    expected.insert(uid, groups.iter().map(|(_, gid)| *gid).collect());
                }

                for (uid, gids) in &expected {
                    let cached: BTreeSet<u32> = cache.user_groups(*uid).unwrap().iter().map(|g| g.gid).collect();
                    prop_assert_eq!(&cached, gids);
                }

                for (_, gid) in GROUPS {
                    let want: BTreeSet<u32> = expected
                        .iter()
                        .filter(|(_, gids)| gids.contains(&gid))
                        .map(|(uid, _)| *uid)
                        .collect();
                    match cache.group_members(gid) {
                        Ok(members) => {
                            let got: BTreeSet<u32> = members.iter().map(|u| u.uid).collect();
                            prop_assert_eq!(got, want);
                        }
                        Err(e) => {
                            prop_assert!(e.is_not_found());
                            prop_assert!(want.is_empty());
                        }
                    }
                }
            }
        }
    }
}
