//! Session state types.
//!
//! All types are `Clone`: operations work on a copy of the session and write
//! it back through the registry once done.

use crate::modes::ModeDescriptor;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

// ═══════════════════════════════════════════════════════════════════════
// ID Types
// ═══════════════════════════════════════════════════════════════════════

/// Unique identifier for an authentication session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    /// Generate a new random `SessionId`.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Parse a session ID received from a caller.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::SessionNotFound`](crate::BrokerError) when the
    /// value cannot name any session.
    pub fn parse(value: &str) -> crate::Result<Self> {
        uuid::Uuid::parse_str(value)
            .map(Self)
            .map_err(|_| crate::BrokerError::SessionNotFound {
                session_id: value.to_string(),
            })
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Session
// ═══════════════════════════════════════════════════════════════════════

/// Password reset obligation of a user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswdReset {
    /// No reset is needed.
    #[default]
    None,
    /// The user may reset and may skip it.
    CanReset,
    /// The user must reset before being granted access.
    MustReset,
}

/// Authentication steps needed by a user and their reset obligation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthRequirements {
    /// Number of steps to complete, at least 1.
    pub needed_auth_steps: u32,
    /// Password reset obligation, handled on the last step.
    pub pwd_change: PasswdReset,
}

impl Default for AuthRequirements {
    fn default() -> Self {
        Self {
            needed_auth_steps: 1,
            pwd_change: PasswdReset::None,
        }
    }
}

/// One in-progress authentication attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// User being authenticated.
    pub username: String,

    /// Language requested by the caller.
    pub lang: String,

    /// Mode currently selected by the caller.
    pub selected_mode: Option<String>,

    /// Modes offered at the last resolution, keyed by mode id.
    pub all_modes: BTreeMap<String, ModeDescriptor>,

    /// Consecutive failures per mode.
    pub attempts_per_mode: HashMap<String, u32>,

    /// Password reset obligation.
    pub pwd_change: PasswdReset,

    /// Steps needed to be fully authenticated.
    pub needed_auth_steps: u32,

    /// Current step, starting at 1.
    pub current_auth_step: u32,

    /// Mode chosen on the first step.
    pub first_selected_mode: Option<String>,
}

impl Session {
    /// Create a session at its first step.
    #[must_use]
    pub fn new(username: impl Into<String>, lang: impl Into<String>, requirements: AuthRequirements) -> Self {
        Self {
            username: username.into(),
            lang: lang.into(),
            selected_mode: None,
            all_modes: BTreeMap::new(),
            attempts_per_mode: HashMap::new(),
            pwd_change: requirements.pwd_change,
            needed_auth_steps: requirements.needed_auth_steps.max(1),
            current_auth_step: 1,
            first_selected_mode: None,
        }
    }

    /// Whether the current step is the last one needed.
    #[must_use]
    pub const fn is_last_step(&self) -> bool {
        self.current_auth_step == self.needed_auth_steps
    }

    /// Whether the session is past its first step and still in progress.
    #[must_use]
    pub const fn is_multi_factor_step(&self) -> bool {
        self.current_auth_step > 1 && self.current_auth_step <= self.needed_auth_steps
    }

    /// Selected mode, or an empty string.
    #[must_use]
    pub fn selected_mode(&self) -> &str {
        self.selected_mode.as_deref().unwrap_or_default()
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Outcomes
// ═══════════════════════════════════════════════════════════════════════

/// Outcome of an authentication evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthAccess {
    /// Fully authenticated.
    Granted,
    /// Refused; the session cannot succeed anymore on this mode.
    Denied,
    /// Wrong answer; the caller may try again.
    Retry,
    /// Step completed, another one is needed.
    Next,
    /// The evaluation was cancelled; the caller may select a mode again.
    Cancelled,
}

impl AuthAccess {
    /// Wire name of the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Denied => "denied",
            Self::Retry => "retry",
            Self::Next => "next",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AuthAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome plus the JSON payload returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthResult {
    /// Authentication outcome.
    pub access: AuthAccess,
    /// JSON payload (user info or message), possibly empty.
    pub data: String,
}

impl AuthResult {
    /// Build a result.
    #[must_use]
    pub fn new(access: AuthAccess, data: impl Into<String>) -> Self {
        Self {
            access,
            data: data.into(),
        }
    }

    /// Build a result with a `{"message": ...}` payload.
    #[must_use]
    pub fn with_message(access: AuthAccess, message: &str) -> Self {
        Self::new(access, serde_json::json!({ "message": message }).to_string())
    }

    /// Build a result without payload.
    #[must_use]
    pub const fn empty(access: AuthAccess) -> Self {
        Self {
            access,
            data: String::new(),
        }
    }
}

/// An offered mode as listed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthMode {
    /// Mode identifier to send back on selection.
    pub id: String,
    /// Label shown in the mode selection list.
    pub label: String,
}
