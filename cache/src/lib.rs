//! # authd Cache
//!
//! Durable user and group cache for the authd daemon.
//!
//! Identities resolved through brokers are stored in a single embedded
//! database file, indexed by name and by numeric ID, with group membership
//! kept in both directions. The cache heals itself: a corrupted file or a
//! leftover dirty marker wipes it on open, and corruption found at runtime
//! schedules a rebuild in the background. Losing cached data is preferred to
//! serving inconsistent data; the next authentication repopulates it.
//!
//! Users granted by a broker are stored with [`Cache::register_user`], which
//! assigns numeric IDs to names seen for the first time.
//!
//! ## Layout
//!
//! ```text
//! <dir>/authd.db        database (mode 0600)
//! <dir>/authd.db.dirty  present when the database must be wiped
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use authd_cache::{Cache, CacheConfig, GroupInfo, UserInfo};
//!
//! # fn example() -> authd_cache::Result<()> {
//! let cache = Cache::new(&CacheConfig::new("/var/cache/authd"))?;
//! cache.update_from_user_info(&UserInfo {
//!     name: "user1".to_string(),
//!     uid: 1111,
//!     gecos: "User 1".to_string(),
//!     dir: "/home/user1".to_string(),
//!     shell: "/bin/bash".to_string(),
//!     groups: vec![GroupInfo::new("group1", 11111)],
//! })?;
//!
//! let user = cache.user_by_name("user1")?;
//! assert_eq!(user.uid, 1111);
//! cache.close()?;
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod idgen;
pub mod records;
pub mod store;
pub mod users;

// Re-export main types for convenience
pub use clock::{Clock, SystemClock};
pub use config::CacheConfig;
pub use db::Cache;
pub use error::{CacheError, Result};
pub use idgen::{IdGenerator, IdRange};
pub use records::{GroupEntry, GroupInfo, GroupRecord, UserInfo, UserRecord};
