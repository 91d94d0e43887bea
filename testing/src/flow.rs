//! Step-by-step driver for broker sessions.
//!
//! Wraps the calls a client makes on a [`Broker`] so tests read like the
//! dialogue they exercise.

use authd_broker::{AuthResult, Broker, SessionId, UiLayout};

/// One session opened on a broker.
///
/// # Example
///
/// ```no_run
/// use authd_broker::{AuthAccess, ExampleBroker};
/// use authd_testing::{SessionFlow, layouts};
///
/// # async fn example() -> anyhow::Result<()> {
/// let broker = ExampleBroker::new("example_broker");
/// let flow = SessionFlow::start(&broker, "user1").await?;
///
/// let result = flow
///     .step(&layouts::password_form(), "password", r#"{"challenge": "goodpass"}"#)
///     .await?;
/// assert_eq!(result.access, AuthAccess::Granted);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SessionFlow<'b, B: Broker> {
    broker: &'b B,
    session_id: SessionId,
}

impl<'b, B: Broker> SessionFlow<'b, B> {
    /// Open a session for `username` in English.
    ///
    /// # Errors
    ///
    /// Returns error if the broker refuses the session.
    pub async fn start(broker: &'b B, username: &str) -> anyhow::Result<Self> {
        let (session_id, _key) = broker.new_session(username, "en").await?;
        Ok(Self { broker, session_id })
    }

    /// Session identifier.
    #[must_use]
    pub const fn id(&self) -> SessionId {
        self.session_id
    }

    /// Mode ids offered for `layouts`, in display order.
    ///
    /// # Errors
    ///
    /// Returns error if the broker cannot resolve modes.
    pub async fn modes(&self, layouts: &[UiLayout]) -> anyhow::Result<Vec<String>> {
        let modes = self
            .broker
            .authentication_modes(&self.session_id, layouts)
            .await?;
        Ok(modes.into_iter().map(|mode| mode.id).collect())
    }

    /// Select `mode`.
    ///
    /// # Errors
    ///
    /// Returns error if the mode was not offered.
    pub async fn select(&self, mode: &str) -> anyhow::Result<UiLayout> {
        Ok(self
            .broker
            .select_authentication_mode(&self.session_id, mode)
            .await?)
    }

    /// Send raw authentication data.
    ///
    /// # Errors
    ///
    /// Returns error if the broker rejects the request.
    pub async fn send(&self, auth_data: &str) -> anyhow::Result<AuthResult> {
        Ok(self
            .broker
            .is_authenticated(&self.session_id, auth_data)
            .await?)
    }

    /// Resolve modes, select `mode` and send `auth_data`.
    ///
    /// # Errors
    ///
    /// Returns error from whichever call fails first.
    pub async fn step(
        &self,
        layouts: &[UiLayout],
        mode: &str,
        auth_data: &str,
    ) -> anyhow::Result<AuthResult> {
        self.modes(layouts).await?;
        self.select(mode).await?;
        self.send(auth_data).await
    }

    /// End the session.
    ///
    /// # Errors
    ///
    /// Returns error if the session already ended.
    pub async fn end(self) -> anyhow::Result<()> {
        Ok(self.broker.end_session(&self.session_id).await?)
    }
}
