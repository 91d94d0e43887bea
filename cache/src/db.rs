//! Database lifecycle.
//!
//! Opening the cache heals it: a dirty marker or a corrupted file wipes the
//! database, unknown tables are dropped and missing ones created. At runtime
//! [`Cache::request_rebuild`] marks the database dirty and wakes a background
//! worker that reopens it under the handle write lock, so readers never see a
//! half rebuilt store.

use crate::clock::{Clock, SystemClock};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result, is_corruption};
use redb::{Database, MultimapTableHandle, TableDefinition, TableHandle};
use std::fs::{self, OpenOptions};
use std::io;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;

pub(crate) type Table = TableDefinition<'static, &'static str, &'static [u8]>;

pub(crate) const USER_BY_NAME: Table = TableDefinition::new("UserByName");
pub(crate) const USER_BY_ID: Table = TableDefinition::new("UserByID");
pub(crate) const GROUP_BY_NAME: Table = TableDefinition::new("GroupByName");
pub(crate) const GROUP_BY_ID: Table = TableDefinition::new("GroupByID");
pub(crate) const USER_TO_GROUPS: Table = TableDefinition::new("UserToGroups");
pub(crate) const GROUP_TO_USERS: Table = TableDefinition::new("GroupToUsers");

/// Every table of the schema. Anything else found on open is deleted.
pub(crate) const ALL_TABLES: [Table; 6] = [
    USER_BY_NAME,
    USER_BY_ID,
    GROUP_BY_NAME,
    GROUP_BY_ID,
    USER_TO_GROUPS,
    GROUP_TO_USERS,
];

/// Required permission bits of the database file.
pub const DB_MODE: u32 = 0o600;

/// Durable user and group cache.
///
/// Reads run concurrently; a rebuild excludes every reader and writer.
/// Dropping the cache stops the rebuild worker like [`Cache::close`] does.
pub struct Cache {
    shared: Arc<Shared>,
    pub(crate) clock: Arc<dyn Clock>,
    rebuild: Option<SyncSender<()>>,
    worker: Option<JoinHandle<()>>,
}

struct Shared {
    db: RwLock<Option<Database>>,
    db_path: PathBuf,
    dirty_flag_path: PathBuf,
    open_retries: u32,
}

enum OpenFailure {
    /// The file was wiped; opening again starts from scratch.
    Corrupted(redb::Error),
    Fatal(CacheError),
}

impl Cache {
    /// Open the cache in `config.dir`, creating or healing it as needed.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The database stays corrupted after `config.open_retries` wipes
    /// - The database file does not have `0600` permissions
    /// - The rebuild worker cannot be started
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Open the cache with a custom time source for `last_login` stamps.
    ///
    /// # Errors
    ///
    /// Same as [`Cache::new`].
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let mut shared = Shared {
            db: RwLock::new(None),
            db_path: config.db_path(),
            dirty_flag_path: config.dirty_flag_path(),
            open_retries: config.open_retries,
        };
        let db = shared.open()?;
        shared.db = RwLock::new(Some(db));
        let shared = Arc::new(shared);

        // One queued request is enough: later ones coalesce into it.
        let (rebuild, requests) = mpsc::sync_channel::<()>(1);
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("authd-cache-rebuild".to_string())
            .spawn(move || {
                for () in requests {
                    worker_shared.rebuild();
                }
                tracing::debug!("Cache rebuild worker stopped");
            })?;

        tracing::info!(path = %shared.db_path.display(), "Opened cache database");

        Ok(Self {
            shared,
            clock,
            rebuild: Some(rebuild),
            worker: Some(worker),
        })
    }

    /// Mark the database dirty and ask the worker to rebuild it.
    ///
    /// Never blocks: a request made while one is already pending joins it.
    /// Failing to write the dirty marker is logged, not returned.
    pub fn request_rebuild(&self) {
        if let Err(e) = write_private_file(&self.shared.dirty_flag_path, true) {
            tracing::warn!(
                path = %self.shared.dirty_flag_path.display(),
                error = %e,
                "Could not write dirty marker to request a cache rebuild"
            );
        }

        let Some(rebuild) = &self.rebuild else {
            return;
        };
        match rebuild.try_send(()) {
            Ok(()) => tracing::debug!("Requested cache rebuild"),
            Err(TrySendError::Full(())) => tracing::debug!("Cache rebuild already pending"),
            Err(TrySendError::Disconnected(())) => {
                tracing::warn!("Cache rebuild worker is not running");
            }
        }
    }

    /// Stop the rebuild worker, wait for it, then close the database.
    ///
    /// # Errors
    ///
    /// Returns error if the worker panicked.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    /// Whether the database handle is open.
    ///
    /// `false` only after a rebuild failed to recreate the database.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.shared
            .db
            .read()
            .is_ok_and(|db| db.is_some())
    }

    /// Path of the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.shared.db_path
    }

    /// Run `f` with the database under the shared handle lock.
    pub(crate) fn with_db<T>(&self, f: impl FnOnce(&Database) -> Result<T>) -> Result<T> {
        let db = self.shared.db.read().map_err(|_| CacheError::poisoned())?;
        let db = db.as_ref().ok_or(CacheError::Unavailable)?;
        f(db)
    }

    fn shutdown(&mut self) -> Result<()> {
        // Closing the channel ends the worker loop.
        drop(self.rebuild.take());
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| CacheError::Internal("cache rebuild worker panicked".to_string()))?;
        }

        let db = self
            .shared
            .db
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if db.is_some() {
            drop(db);
            tracing::info!(path = %self.shared.db_path.display(), "Closed cache database");
        }
        Ok(())
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::warn!(error = %e, "Could not close cache cleanly");
        }
    }
}

impl std::fmt::Debug for Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("db_path", &self.shared.db_path)
            .finish_non_exhaustive()
    }
}

impl Shared {
    /// Open the database, wiping and retrying on corruption.
    fn open(&self) -> Result<Database> {
        let mut retries = 0;
        loop {
            match open_and_init(&self.db_path, &self.dirty_flag_path) {
                Ok(db) => return Ok(db),
                Err(OpenFailure::Corrupted(e)) if retries < self.open_retries => {
                    retries += 1;
                    tracing::warn!(
                        path = %self.db_path.display(),
                        error = %e,
                        retry = retries,
                        "Cache database is corrupted, starting from scratch"
                    );
                }
                Err(OpenFailure::Corrupted(e)) => return Err(CacheError::Redb(e)),
                Err(OpenFailure::Fatal(e)) => return Err(e),
            }
        }
    }

    fn rebuild(&self) {
        let mut db = self.db.write().unwrap_or_else(PoisonError::into_inner);

        // The old handle must release the file before it is wiped.
        drop(db.take());

        match self.open() {
            Ok(new_db) => {
                *db = Some(new_db);
                tracing::info!(path = %self.db_path.display(), "Rebuilt cache database");
            }
            Err(e) => {
                tracing::error!(
                    path = %self.db_path.display(),
                    error = %e,
                    "Could not recreate cache database, cache is unavailable"
                );
            }
        }
    }
}

fn open_and_init(db_path: &Path, dirty_flag_path: &Path) -> std::result::Result<Database, OpenFailure> {
    if dirty_flag_path.exists() {
        tracing::info!(path = %db_path.display(), "Cache marked dirty, clearing database");
        clear_database(db_path, dirty_flag_path);
    }

    write_private_file(db_path, false).map_err(|e| OpenFailure::Fatal(e.into()))?;

    let db = Database::create(db_path)
        .map_err(|e| classify(e.into(), db_path, dirty_flag_path))?;

    check_permissions(db_path).map_err(OpenFailure::Fatal)?;

    if let Err(e) = init_schema(&db) {
        drop(db);
        return Err(match e {
            CacheError::Redb(e) => classify(e, db_path, dirty_flag_path),
            other => OpenFailure::Fatal(other),
        });
    }

    Ok(db)
}

fn classify(error: redb::Error, db_path: &Path, dirty_flag_path: &Path) -> OpenFailure {
    if is_corruption(&error) {
        clear_database(db_path, dirty_flag_path);
        OpenFailure::Corrupted(error)
    } else {
        OpenFailure::Fatal(error.into())
    }
}

fn check_permissions(db_path: &Path) -> Result<()> {
    let mode = fs::metadata(db_path)?.permissions().mode() & 0o777;
    if mode != DB_MODE {
        return Err(CacheError::Permission {
            path: db_path.to_path_buf(),
            mode,
        });
    }
    Ok(())
}

/// Create every table of the schema and delete any other.
fn init_schema(db: &Database) -> Result<()> {
    let txn = db.begin_write()?;

    for table in ALL_TABLES {
        txn.open_table(table)?;
    }

    let known: Vec<String> = ALL_TABLES.iter().map(|t| t.name().to_string()).collect();
    let unknown: Vec<_> = txn
        .list_tables()?
        .filter(|table| !known.iter().any(|name| name == table.name()))
        .collect();
    for table in unknown {
        let name = table.name().to_string();
        match txn.delete_table(table) {
            Ok(_) => tracing::debug!(table = %name, "Deleted unknown cache table"),
            Err(e) => tracing::warn!(table = %name, error = %e, "Could not delete unknown cache table"),
        }
    }

    let multimaps: Vec<_> = txn.list_multimap_tables()?.collect();
    for table in multimaps {
        let name = table.name().to_string();
        match txn.delete_multimap_table(table) {
            Ok(_) => tracing::debug!(table = %name, "Deleted unknown cache table"),
            Err(e) => tracing::warn!(table = %name, error = %e, "Could not delete unknown cache table"),
        }
    }

    txn.commit()?;
    Ok(())
}

fn clear_database(db_path: &Path, dirty_flag_path: &Path) {
    for path in [db_path, dirty_flag_path] {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::error!(path = %path.display(), error = %e, "Could not delete cache file");
            }
        }
    }
}

/// Create `path` with `0600` permissions, truncating it if asked.
///
/// An existing file keeps its permissions.
fn write_private_file(path: &Path, truncate: bool) -> io::Result<()> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(truncate)
        .mode(DB_MODE)
        .open(path)
        .map(drop)
}

#[cfg(test)]
mod tests {
    use super::*;
    use redb::ReadableTableMetadata;

    fn open(dir: &Path) -> Cache {
        Cache::new(&CacheConfig::new(dir)).unwrap()
    }

    fn table_names(cache: &Cache) -> Vec<String> {
        cache
            .with_db(|db| {
                let txn = db.begin_read()?;
                let names = txn.list_tables()?.map(|t| t.name().to_string()).collect();
                Ok(names)
            })
            .unwrap()
    }

    #[test]
    fn test_new_database_has_schema_and_mode() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());

        let mut names = table_names(&cache);
        names.sort();
        let mut expected: Vec<String> = ALL_TABLES.iter().map(|t| t.name().to_string()).collect();
        expected.sort();
        assert_eq!(names, expected);

        let mode = fs::metadata(cache.db_path()).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, DB_MODE);
        cache.close().unwrap();
    }

    #[test]
    fn test_unknown_tables_are_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache
            .with_db(|db| {
                let txn = db.begin_write()?;
                txn.open_table(TableDefinition::<&str, &[u8]>::new("Leftover"))?;
                txn.commit()?;
                Ok(())
            })
            .unwrap();
        cache.close().unwrap();

        let cache = open(dir.path());
        assert!(!table_names(&cache).contains(&"Leftover".to_string()));
    }

    #[test]
    fn test_unknown_multimap_tables_are_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache
            .with_db(|db| {
                let txn = db.begin_write()?;
                txn.open_multimap_table(redb::MultimapTableDefinition::<&str, &str>::new("Members"))?
                    .insert("group1", "user1")?;
                txn.commit()?;
                Ok(())
            })
            .unwrap();
        cache.close().unwrap();

        let cache = open(dir.path());
        let multimaps = cache
            .with_db(|db| Ok(db.begin_read()?.list_multimap_tables()?.count()))
            .unwrap();
        assert_eq!(multimaps, 0);
    }

    #[test]
    fn test_dirty_marker_wipes_database() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache
            .with_db(|db| {
                let txn = db.begin_write()?;
                txn.open_table(USER_BY_NAME)?.insert("user1", b"{}".as_slice())?;
                txn.commit()?;
                Ok(())
            })
            .unwrap();
        cache.close().unwrap();

        fs::write(dir.path().join(crate::config::DIRTY_FLAG_NAME), b"").unwrap();
        let cache = open(dir.path());

        let len = cache
            .with_db(|db| Ok(db.begin_read()?.open_table(USER_BY_NAME)?.len()?))
            .unwrap();
        assert_eq!(len, 0);
        assert!(!dir.path().join(crate::config::DIRTY_FLAG_NAME).exists());
    }

    #[test]
    fn test_close_is_final() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open(dir.path());
        cache.close().unwrap();

        // The file lock is released: a new handle can open it.
        let cache = open(dir.path());
        assert!(cache.is_available());
    }
}
