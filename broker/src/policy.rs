//! Per-user authentication requirements.
//!
//! A production broker looks these up from the account backend. The example
//! broker derives them from fixed test user names.

use crate::error::{BrokerError, Result};
use crate::state::{AuthRequirements, PasswdReset};

/// Decides what a user has to go through before being granted access.
pub trait SessionPolicy: Send + Sync {
    /// Requirements for a new session of `username`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UserNotFound`] when no session may be opened.
    fn requirements(&self, username: &str) -> Result<AuthRequirements>;

    /// Whether `username` is known once its credentials were verified.
    fn is_known_user(&self, username: &str) -> bool;
}

/// Users known by the example broker.
pub const EXAMPLE_USERS: [&str; 6] = [
    "user1",
    "user2",
    "user-mfa",
    "user-needs-reset",
    "user-can-reset",
    "user-local-groups",
];

/// Prefix accepted for users created by integration tests.
pub const INTEGRATION_USER_PREFIX: &str = "user-integration";

/// User name the example broker refuses to open sessions for.
pub const NONEXISTENT_USER: &str = "user-unexistent";

/// Test fixture policy keyed on user names.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExampleUserPolicy;

impl SessionPolicy for ExampleUserPolicy {
    fn requirements(&self, username: &str) -> Result<AuthRequirements> {
        let (needed_auth_steps, pwd_change) = match username {
            "user-mfa" => (3, PasswdReset::None),
            "user-needs-reset" => (2, PasswdReset::MustReset),
            "user-can-reset" => (2, PasswdReset::CanReset),
            "user-mfa-with-reset" => (3, PasswdReset::CanReset),
            NONEXISTENT_USER => {
                return Err(BrokerError::UserNotFound {
                    username: username.to_string(),
                });
            }
            _ => (1, PasswdReset::None),
        };

        Ok(AuthRequirements {
            needed_auth_steps,
            pwd_change,
        })
    }

    fn is_known_user(&self, username: &str) -> bool {
        EXAMPLE_USERS.contains(&username) || username.starts_with(INTEGRATION_USER_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_example_requirements() {
        let policy = ExampleUserPolicy;

        assert_eq!(policy.requirements("user1").unwrap(), AuthRequirements::default());
        assert_eq!(policy.requirements("user-mfa").unwrap().needed_auth_steps, 3);

        let reset = policy.requirements("user-needs-reset").unwrap();
        assert_eq!(reset.needed_auth_steps, 2);
        assert_eq!(reset.pwd_change, PasswdReset::MustReset);

        let reset = policy.requirements("user-mfa-with-reset").unwrap();
        assert_eq!(reset.needed_auth_steps, 3);
        assert_eq!(reset.pwd_change, PasswdReset::CanReset);
    }

    #[test]
    fn test_nonexistent_user_is_rejected() {
        let err = ExampleUserPolicy.requirements(NONEXISTENT_USER).unwrap_err();
        assert_eq!(
            err.to_string(),
            "user \"user-unexistent\" does not exist"
        );
    }

    #[test]
    fn test_known_users() {
        assert!(ExampleUserPolicy.is_known_user("user2"));
        assert!(ExampleUserPolicy.is_known_user("user-integration-ssh"));
        assert!(!ExampleUserPolicy.is_known_user("stranger"));
        // Sessions can be opened for it, but it is not granted.
        assert!(!ExampleUserPolicy.is_known_user("user-mfa-with-reset"));
    }
}
