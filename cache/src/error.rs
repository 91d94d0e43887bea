//! Error types for cache operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors returned by the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    // ═══════════════════════════════════════════════════════════
    // Lookup Errors
    // ═══════════════════════════════════════════════════════════

    /// No entry matches the key.
    ///
    /// Test with [`CacheError::is_not_found`], which ignores key and table.
    #[error("no result matching {key} in {table}")]
    NoDataFound {
        /// Key that was looked up
        key: String,
        /// Table that was searched
        table: String,
    },

    /// A stored record could not be decoded, or points at a missing record.
    ///
    /// Queries never return this: they request a rebuild and report
    /// [`CacheError::NoDataFound`] instead.
    #[error("corrupted entry {key} in {table}: {reason}")]
    Corrupted {
        /// Key of the bad record
        key: String,
        /// Table holding it
        table: String,
        /// What is wrong with it
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Update Errors
    // ═══════════════════════════════════════════════════════════

    /// The user information cannot be stored as given.
    #[error("invalid user information for {user}: {reason}")]
    InvalidUserInfo {
        /// User being stored
        user: String,
        /// What is wrong with it
        reason: String,
    },

    /// Every ID of the range is taken.
    #[error("no available ID in range {min}-{max}")]
    NoAvailableId {
        /// Lowest ID of the range
        min: u32,
        /// Highest ID of the range
        max: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // Configuration Errors
    // ═══════════════════════════════════════════════════════════

    /// The database file does not have the expected `0600` permissions.
    #[error("wrong file permission for {}: {mode:o}", path.display())]
    Permission {
        /// Database file
        path: PathBuf,
        /// Permission bits found on disk
        mode: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// The database handle is gone after a failed rebuild.
    #[error("cache is unavailable: database could not be recreated")]
    Unavailable,

    /// Storage engine failure.
    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal failure (lock poisoning, worker shutdown).
    #[error("internal error: {0}")]
    Internal(String),
}

macro_rules! from_redb {
    ($($error:ty),* $(,)?) => {
        $(
            impl From<$error> for CacheError {
                fn from(error: $error) -> Self {
                    Self::Redb(error.into())
                }
            }
        )*
    };
}

from_redb!(
    redb::DatabaseError,
    redb::TransactionError,
    redb::TableError,
    redb::StorageError,
    redb::CommitError,
);

impl CacheError {
    /// Returns `true` if no entry matched, whatever the key and table.
    ///
    /// # Examples
    ///
    /// ```
    /// # use authd_cache::CacheError;
    /// let err = CacheError::NoDataFound { key: "1000".into(), table: "UserByID".into() };
    /// assert!(err.is_not_found());
    /// assert!(!CacheError::Unavailable.is_not_found());
    /// ```
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NoDataFound { .. })
    }

    /// Returns `true` if the operation may succeed once a rebuild completes.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Corrupted { .. } | Self::Unavailable)
    }

    /// Returns `true` for faults that need an administrator, not a retry.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Permission { .. })
    }

    pub(crate) fn not_found(key: impl ToString, table: &str) -> Self {
        Self::NoDataFound {
            key: key.to_string(),
            table: table.to_string(),
        }
    }

    pub(crate) fn poisoned() -> Self {
        Self::Internal("database lock poisoned".to_string())
    }
}

/// Whether an engine error means the file content cannot be trusted.
pub(crate) fn is_corruption(error: &redb::Error) -> bool {
    match error {
        redb::Error::Corrupted(_)
        | redb::Error::UpgradeRequired(_)
        | redb::Error::RepairAborted
        | redb::Error::TableTypeMismatch { .. }
        | redb::Error::TableIsMultimap(_)
        | redb::Error::TableIsNotMultimap(_) => true,
        redb::Error::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::InvalidData
        ),
        _ => false,
    }
}
