//! Error types for broker session operations.

use thiserror::Error;

/// Result type alias for broker operations.
pub type Result<T> = std::result::Result<T, BrokerError>;

/// Error taxonomy for the session authentication engine.
///
/// Cancellation is not an error: a cancelled evaluation is an
/// [`AuthAccess::Cancelled`](crate::state::AuthAccess::Cancelled) outcome.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerError {
    // ═══════════════════════════════════════════════════════════
    // Lookup Errors
    // ═══════════════════════════════════════════════════════════

    /// The session ID does not match an active session.
    #[error("{session_id} is not a current transaction")]
    SessionNotFound {
        /// Session identifier that was looked up
        session_id: String,
    },

    /// The broker refuses to open a session for this user.
    #[error("user {username:?} does not exist")]
    UserNotFound {
        /// Requested user name
        username: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Policy Errors
    // ═══════════════════════════════════════════════════════════

    /// The requested transition is not allowed by the session policy, or the
    /// selected mode was never offered.
    #[error("{reason}")]
    PolicyViolation {
        /// Human readable reason
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════
    // Request Errors
    // ═══════════════════════════════════════════════════════════

    /// An evaluation is already running for this session.
    #[error("IsAuthenticated already running for session {session_id:?}")]
    Busy {
        /// Session with the in-flight evaluation
        session_id: String,
    },

    /// The authentication data is not well-formed.
    #[error("authentication data is not a valid json value")]
    InvalidInput,

    // ═══════════════════════════════════════════════════════════
    // System Errors
    // ═══════════════════════════════════════════════════════════

    /// Internal failure (lock poisoning, serialization).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrokerError {
    /// Returns `true` if the error stems from caller input rather than the broker.
    ///
    /// # Examples
    ///
    /// ```
    /// # use authd_broker::BrokerError;
    /// assert!(BrokerError::InvalidInput.is_user_error());
    /// assert!(!BrokerError::Internal("boom".into()).is_user_error());
    /// ```
    #[must_use]
    pub const fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput | Self::UserNotFound { .. }
        )
    }

    /// Returns `true` if the same request may succeed later without changes.
    ///
    /// # Examples
    ///
    /// ```
    /// # use authd_broker::BrokerError;
    /// assert!(BrokerError::Busy { session_id: "s".into() }.is_retryable());
    /// assert!(!BrokerError::InvalidInput.is_retryable());
    /// ```
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy { .. })
    }

    /// Returns `true` for a missing session.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound { .. })
    }

    pub(crate) fn not_found(session_id: &crate::state::SessionId) -> Self {
        Self::SessionNotFound {
            session_id: session_id.to_string(),
        }
    }

    pub(crate) fn poisoned() -> Self {
        Self::Internal("lock poisoned".to_string())
    }

    pub(crate) fn policy(reason: impl Into<String>) -> Self {
        Self::PolicyViolation {
            reason: reason.into(),
        }
    }
}
