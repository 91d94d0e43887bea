//! # authd Testing
//!
//! Testing utilities and fixtures shared by the authd crates.
//!
//! This crate provides:
//! - Tracing setup for tests
//! - A fixed clock for deterministic `last_login` stamps
//! - Temporary cache directories
//! - Declared UI layout fixtures
//! - Helpers to build authentication data and read result payloads
//! - [`SessionFlow`], a step-by-step driver for broker sessions

pub mod flow;

pub use flow::SessionFlow;

use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a `tracing` subscriber honouring `RUST_LOG`, once per process.
///
/// Output goes through the test writer so it is captured per test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Mock implementations of environment traits.
pub mod mocks {
    use authd_cache::Clock;
    use chrono::{DateTime, TimeZone, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use authd_testing::mocks::FixedClock;
    /// use authd_cache::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0)
                .single()
                .unwrap_or_default(),
        )
    }
}

/// Temporary cache directories.
pub mod cache {
    use authd_cache::{Cache, CacheConfig};
    use std::sync::Arc;
    use tempfile::TempDir;

    /// Cache opened in a directory removed when dropped.
    #[derive(Debug)]
    pub struct TempCache {
        /// Open cache.
        pub cache: Cache,
        /// Configuration it was opened with.
        pub config: CacheConfig,
        dir: TempDir,
    }

    impl TempCache {
        /// Open a cache in a fresh temporary directory, stamped by the test clock.
        ///
        /// # Errors
        ///
        /// Returns error if the directory or the cache cannot be created.
        pub fn new() -> anyhow::Result<Self> {
            let dir = tempfile::tempdir()?;
            let config = CacheConfig::new(dir.path());
            let cache = Cache::with_clock(&config, Arc::new(super::mocks::test_clock()))?;
            Ok(Self { cache, config, dir })
        }

        /// Close the cache, keeping the directory for a reopen.
        ///
        /// # Errors
        ///
        /// Returns error if the cache does not close cleanly.
        pub fn close(self) -> anyhow::Result<(TempDir, CacheConfig)> {
            self.cache.close()?;
            Ok((self.dir, self.config))
        }
    }
}

/// Declared UI layout fixtures, as a client would send them.
pub mod layouts {
    use authd_broker::{LayoutType, UiLayout};

    /// Form with a password entry only.
    #[must_use]
    pub fn password_form() -> Vec<UiLayout> {
        vec![UiLayout::new(LayoutType::Form).with_entry("chars_password")]
    }

    /// Every layout and capability a rich client supports.
    #[must_use]
    pub fn all() -> Vec<UiLayout> {
        vec![
            UiLayout::new(LayoutType::Form)
                .with_label("")
                .with_entry("optional:chars,chars_password")
                .with_wait("optional:true,false")
                .with_button("optional"),
            UiLayout::new(LayoutType::Form).with_entry("digits"),
            UiLayout::new(LayoutType::QrCode)
                .with_content("required")
                .with_wait("required:true,false")
                .with_button("optional"),
            new_password(true).remove(0),
        ]
    }

    /// Layouts for the password reset step, with or without a skip button.
    #[must_use]
    pub fn new_password(with_button: bool) -> Vec<UiLayout> {
        let layout = UiLayout::new(LayoutType::NewPassword).with_entry("chars_password");
        if with_button {
            vec![layout.with_button("optional")]
        } else {
            vec![layout]
        }
    }
}

/// Authentication data and result payload helpers.
pub mod payloads {
    use authd_broker::{AuthResult, UserInfo};
    use serde_json::Value;

    /// `{"challenge": ...}` authentication data.
    #[must_use]
    pub fn challenge(value: &str) -> String {
        serde_json::json!({ "challenge": value }).to_string()
    }

    /// `{"wait": "true"}` authentication data.
    #[must_use]
    pub fn wait() -> String {
        serde_json::json!({ "wait": "true" }).to_string()
    }

    /// Message carried by a non granted result.
    ///
    /// # Errors
    ///
    /// Returns error if the payload has no message.
    pub fn message(result: &AuthResult) -> anyhow::Result<String> {
        let value: Value = serde_json::from_str(&result.data)?;
        value["message"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("no message in {:?}", result.data))
    }

    /// User information carried by a granted result.
    ///
    /// # Errors
    ///
    /// Returns error if the payload has no user information.
    pub fn userinfo(result: &AuthResult) -> anyhow::Result<UserInfo> {
        Ok(UserInfo::from_payload(&result.data)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use authd_broker::{AuthAccess, AuthResult};
    use authd_cache::Clock;
    use cache::TempCache;

    #[test]
    fn test_fixed_clock() {
        let clock = mocks::test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_payload_helpers() {
        assert_eq!(payloads::challenge("goodpass"), r#"{"challenge":"goodpass"}"#);

        let result = AuthResult::with_message(AuthAccess::Retry, "try again");
        assert_eq!(payloads::message(&result).unwrap(), "try again");
        assert!(payloads::userinfo(&result).is_err());
    }

    #[test]
    fn test_temp_cache_reopens() {
        let temp = TempCache::new().unwrap();
        let (dir, config) = temp.close().unwrap();
        assert!(config.db_path().starts_with(dir.path()));
        assert!(config.db_path().exists());
    }
}
