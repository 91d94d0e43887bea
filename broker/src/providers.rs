//! Broker contract.
//!
//! Every authentication backend plugged into the daemon implements
//! [`Broker`]. The daemon drives a session through it:
//!
//! ```text
//! new_session ─► authentication_modes ─► select_authentication_mode ─► is_authenticated
//!                      ▲                                                     │
//!                      └──────────────── next / retry / cancelled ◄──────────┘
//!                                                                            │
//!                                     granted / denied ─► end_session ◄──────┘
//! ```
//!
//! `cancel_is_authenticated` may be called at any time from another task to
//! interrupt a pending `is_authenticated`.

use crate::error::Result;
use crate::layout::UiLayout;
use crate::state::{AuthMode, AuthResult, SessionId};
use std::future::Future;

/// Identity of a broker as shown to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerInfo {
    /// Identifier used in configuration.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Path of the brand icon.
    pub brand_icon: String,
}

impl BrokerInfo {
    /// Derive display name and icon path from a broker identifier.
    #[must_use]
    pub fn from_id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.replace('_', " "),
            brand_icon: format!("/usr/share/brokers/{id}.png"),
        }
    }
}

/// Authentication backend.
///
/// All methods are safe to call concurrently from independent tasks.
pub trait Broker: Send + Sync {
    /// Identity of this broker.
    fn info(&self) -> &BrokerInfo;

    /// Open a session for `username`.
    ///
    /// Returns the session ID and the key material for the session.
    ///
    /// # Errors
    ///
    /// Returns error if the user cannot authenticate with this broker.
    fn new_session(
        &self,
        username: &str,
        lang: &str,
    ) -> impl Future<Output = Result<(SessionId, String)>> + Send;

    /// List the modes offered for the current step, in display order.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The session is not active
    /// - The reset policy cannot be met with `layouts`
    fn authentication_modes(
        &self,
        session_id: &SessionId,
        layouts: &[UiLayout],
    ) -> impl Future<Output = Result<Vec<AuthMode>>> + Send;

    /// Select a mode and get the layout to display for it.
    ///
    /// # Errors
    ///
    /// Returns error if the session is not active or the mode was not offered.
    fn select_authentication_mode(
        &self,
        session_id: &SessionId,
        mode_id: &str,
    ) -> impl Future<Output = Result<UiLayout>> + Send;

    /// Evaluate the caller's answer for the selected mode.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - The session is not active
    /// - `auth_data` is malformed
    /// - Another evaluation is running for the session
    fn is_authenticated(
        &self,
        session_id: &SessionId,
        auth_data: &str,
    ) -> impl Future<Output = Result<AuthResult>> + Send;

    /// End a session, cancelling its pending evaluation.
    ///
    /// # Errors
    ///
    /// Returns error if the session is not active.
    fn end_session(&self, session_id: &SessionId) -> impl Future<Output = Result<()>> + Send;

    /// Cancel the pending evaluation of a session. No-op without one.
    fn cancel_is_authenticated(&self, session_id: &SessionId) -> impl Future<Output = ()> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_broker_info_from_id() {
        let info = BrokerInfo::from_id("example_broker");
        assert_eq!(info.name, "example broker");
        assert_eq!(info.brand_icon, "/usr/share/brokers/example_broker.png");
    }
}
