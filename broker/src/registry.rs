//! Session registry and per-user mode preferences.
//!
//! Both are lock-guarded maps behind explicit accessors. Operations clone
//! sessions out of the registry and write them back with [`SessionRegistry::update`],
//! which refuses to resurrect a session ended in the meantime. Long running
//! operations apply their result with [`SessionRegistry::modify`] instead, so
//! they never clobber what happened while they were suspended.

use crate::error::{BrokerError, Result};
use crate::policy::SessionPolicy;
use crate::state::{Session, SessionId};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Size of the per-session key material, in bytes.
const SESSION_KEY_LEN: usize = 32;

/// Active authentication sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Session>>,
    policy: Arc<dyn SessionPolicy>,
}

impl SessionRegistry {
    /// Create an empty registry applying `policy` to new sessions.
    #[must_use]
    pub fn new(policy: Arc<dyn SessionPolicy>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            policy,
        }
    }

    /// Open a session for `username`.
    ///
    /// Returns the session ID and fresh base64 encoded key material for the
    /// caller.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::UserNotFound`] if the policy refuses the user.
    pub fn create(&self, username: &str, lang: &str) -> Result<(SessionId, String)> {
        let requirements = self.policy.requirements(username)?;
        let session = Session::new(username, lang, requirements);

        let mut guard = self.sessions.write().map_err(|_| BrokerError::poisoned())?;
        let mut session_id = SessionId::new();
        while guard.contains_key(&session_id) {
            session_id = SessionId::new();
        }
        guard.insert(session_id, session);
        drop(guard);

        tracing::info!(
            session_id = %session_id,
            username = %username,
            needed_auth_steps = requirements.needed_auth_steps,
            "Created authentication session"
        );

        Ok((session_id, new_session_key()))
    }

    /// Get a copy of an active session.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::SessionNotFound`] if the session is not active.
    pub fn get(&self, session_id: &SessionId) -> Result<Session> {
        self.sessions
            .read()
            .map_err(|_| BrokerError::poisoned())?
            .get(session_id)
            .cloned()
            .ok_or_else(|| BrokerError::not_found(session_id))
    }

    /// Replace an active session.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::SessionNotFound`] if the session was ended,
    /// in which case it is not recreated.
    pub fn update(&self, session_id: &SessionId, session: Session) -> Result<()> {
        let mut guard = self.sessions.write().map_err(|_| BrokerError::poisoned())?;
        match guard.get_mut(session_id) {
            Some(current) => {
                *current = session;
                Ok(())
            }
            None => Err(BrokerError::not_found(session_id)),
        }
    }

    /// Apply `f` to an active session in place, under the write lock.
    ///
    /// Unlike [`update`](Self::update) this never overwrites changes made
    /// since the caller last read the session.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::SessionNotFound`] if the session was ended.
    pub fn modify<T>(&self, session_id: &SessionId, f: impl FnOnce(&mut Session) -> T) -> Result<T> {
        let mut guard = self.sessions.write().map_err(|_| BrokerError::poisoned())?;
        guard
            .get_mut(session_id)
            .map(f)
            .ok_or_else(|| BrokerError::not_found(session_id))
    }

    /// Remove an active session.
    ///
    /// Callers cancel in-flight evaluations first.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::SessionNotFound`] if the session is not active.
    pub fn end(&self, session_id: &SessionId) -> Result<()> {
        let removed = self
            .sessions
            .write()
            .map_err(|_| BrokerError::poisoned())?
            .remove(session_id);
        if removed.is_none() {
            return Err(BrokerError::not_found(session_id));
        }

        tracing::info!(session_id = %session_id, "Ended authentication session");
        Ok(())
    }

    /// Whether `username` is accepted once verified.
    #[must_use]
    pub fn is_known_user(&self, username: &str) -> bool {
        self.policy.is_known_user(username)
    }

    /// Number of active sessions.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.sessions.read().map_err(|_| BrokerError::poisoned())?.len())
    }

    /// Whether no session is active.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry").finish_non_exhaustive()
    }
}

fn new_session_key() -> String {
    let mut key = [0_u8; SESSION_KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    STANDARD.encode(key)
}

/// Last mode each user was fully granted with.
#[derive(Debug, Default)]
pub struct LastSelectedModes {
    modes: Mutex<HashMap<String, String>>,
}

impl LastSelectedModes {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mode last used by `username`.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn get(&self, username: &str) -> Result<Option<String>> {
        Ok(self
            .modes
            .lock()
            .map_err(|_| BrokerError::poisoned())?
            .get(username)
            .cloned())
    }

    /// Remember `mode` for `username`.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn set(&self, username: &str, mode: &str) -> Result<()> {
        self.modes
            .lock()
            .map_err(|_| BrokerError::poisoned())?
            .insert(username.to_string(), mode.to_string());
        Ok(())
    }
}
