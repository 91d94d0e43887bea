//! Reference broker.
//!
//! Implements the [`Broker`] contract with fixed test users and simulated
//! out-of-band interactions. It exercises every path of the contract (MFA,
//! password reset, retries, remote denial, cancellation) and is what the
//! daemon's tests run against.
//!
//! # Example
//!
//! ```no_run
//! use authd_broker::{Broker, ExampleBroker, LayoutType, UiLayout};
//!
//! # async fn example() -> authd_broker::Result<()> {
//! let broker = ExampleBroker::new("example_broker");
//! let (session_id, _key) = broker.new_session("user1", "en").await?;
//!
//! let layouts = [UiLayout::new(LayoutType::Form).with_entry("chars_password")];
//! let modes = broker.authentication_modes(&session_id, &layouts).await?;
//! broker.select_authentication_mode(&session_id, &modes[0].id).await?;
//!
//! let result = broker
//!     .is_authenticated(&session_id, r#"{"challenge": "goodpass"}"#)
//!     .await?;
//! println!("{}", result.access);
//! # Ok(())
//! # }
//! ```

use crate::config::BrokerConfig;
use crate::error::Result;
use crate::evaluator;
use crate::inflight::InFlightEvaluations;
use crate::layout::{AuthData, UiLayout};
use crate::modes;
use crate::policy::{ExampleUserPolicy, SessionPolicy};
use crate::providers::{Broker, BrokerInfo};
use crate::registry::{LastSelectedModes, SessionRegistry};
use crate::state::{AuthAccess, AuthMode, AuthResult, SessionId};
use std::sync::Arc;

/// Example broker with in-memory sessions.
#[derive(Debug)]
pub struct ExampleBroker {
    info: BrokerInfo,
    config: BrokerConfig,
    sessions: SessionRegistry,
    last_selected: LastSelectedModes,
    in_flight: InFlightEvaluations,
}

impl ExampleBroker {
    /// Create a broker with default configuration.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self::with_config(id, BrokerConfig::default())
    }

    /// Create a broker with the given configuration.
    #[must_use]
    pub fn with_config(id: &str, config: BrokerConfig) -> Self {
        Self::with_policy(id, config, Arc::new(ExampleUserPolicy))
    }

    /// Create a broker applying a custom session policy.
    #[must_use]
    pub fn with_policy(id: &str, config: BrokerConfig, policy: Arc<dyn SessionPolicy>) -> Self {
        Self {
            info: BrokerInfo::from_id(id),
            config,
            sessions: SessionRegistry::new(policy),
            last_selected: LastSelectedModes::new(),
            in_flight: InFlightEvaluations::new(),
        }
    }

    /// Session registry, for inspection.
    #[must_use]
    pub const fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Configuration in use.
    #[must_use]
    pub const fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Whether an evaluation is running for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the in-flight map lock is poisoned.
    pub fn is_evaluating(&self, session_id: &SessionId) -> Result<bool> {
        self.in_flight.is_running(session_id)
    }

    async fn evaluate(&self, session_id: &SessionId, auth_data: &str) -> Result<AuthResult> {
        let session = self.sessions.get(session_id)?;
        let data = AuthData::parse(auth_data)?;
        let mode = session.selected_mode().to_string();

        tracing::debug!(
            session_id = %session_id,
            mode = %mode,
            waiting = data.is_waiting(),
            "Evaluating authentication data"
        );

        let mut guard = self.in_flight.register(*session_id)?;

        let verdict = if evaluator::attempts_exhausted(&session, self.config.max_attempts) {
            AuthResult::with_message(AuthAccess::Denied, "too many failed attempts")
        } else {
            let known_user = self.sessions.is_known_user(&session.username);
            evaluator::verify(&session, &data, guard.token(), &self.config, known_user).await?
        };

        // A cancelled call may already be overtaken by a newer one: it leaves
        // the session untouched.
        if verdict.access == AuthAccess::Cancelled || guard.token().is_cancelled() {
            drop(guard);
            tracing::debug!(session_id = %session_id, mode = %mode, "Evaluation cancelled");
            return Ok(AuthResult::empty(AuthAccess::Cancelled));
        }

        let max_attempts = self.config.max_attempts;
        let (result, first_mode) = self.sessions.modify(session_id, |current| {
            let result = evaluator::refine_outcome(current, &mode, verdict, max_attempts);
            (result, current.first_selected_mode.clone())
        })?;
        drop(guard);

        // Remember the mode the user authenticated with for the next session.
        if result.access == AuthAccess::Granted {
            if let Some(first_mode) = first_mode {
                self.last_selected.set(&session.username, &first_mode)?;
            }
        }

        tracing::debug!(session_id = %session_id, access = %result.access, "Evaluation done");
        Ok(result)
    }
}

impl Broker for ExampleBroker {
    fn info(&self) -> &BrokerInfo {
        &self.info
    }

    async fn new_session(&self, username: &str, lang: &str) -> Result<(SessionId, String)> {
        self.sessions.create(username, lang)
    }

    async fn authentication_modes(
        &self,
        session_id: &SessionId,
        layouts: &[UiLayout],
    ) -> Result<Vec<AuthMode>> {
        let mut session = self.sessions.get(session_id)?;
        let last_selection = self.last_selected.get(&session.username)?;

        let resolved = modes::resolve(&session, layouts, last_selection.as_deref())?;
        session.all_modes = resolved.modes;
        self.sessions.update(session_id, session)?;

        Ok(resolved.ordered)
    }

    async fn select_authentication_mode(
        &self,
        session_id: &SessionId,
        mode_id: &str,
    ) -> Result<UiLayout> {
        let mut session = self.sessions.get(session_id)?;
        let ui = evaluator::select_mode(&mut session, mode_id)?;
        self.sessions.update(session_id, session)?;

        tracing::debug!(session_id = %session_id, mode = %mode_id, "Selected authentication mode");
        Ok(ui)
    }

    async fn is_authenticated(&self, session_id: &SessionId, auth_data: &str) -> Result<AuthResult> {
        self.evaluate(session_id, auth_data).await
    }

    async fn end_session(&self, session_id: &SessionId) -> Result<()> {
        self.sessions.get(session_id)?;
        self.cancel_is_authenticated(session_id).await;
        self.sessions.end(session_id)
    }

    async fn cancel_is_authenticated(&self, session_id: &SessionId) {
        if let Err(e) = self.in_flight.cancel(session_id) {
            tracing::warn!(session_id = %session_id, error = %e, "Could not cancel evaluation");
        }
    }
}
