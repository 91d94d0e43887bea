//! In-flight evaluation tracking and cooperative cancellation.
//!
//! Each running evaluation registers a cancellation channel under its session
//! ID. The registration lives as long as the returned [`EvaluationGuard`], so a
//! session has at most one evaluation at a time and `cancel` can reach it.

use crate::error::{BrokerError, Result};
use crate::state::SessionId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;

struct Registration {
    generation: u64,
    cancel: watch::Sender<bool>,
}

/// Evaluations currently running, keyed by session.
#[derive(Default)]
pub struct InFlightEvaluations {
    calls: Mutex<HashMap<SessionId, Registration>>,
    next_generation: AtomicU64,
}

impl InFlightEvaluations {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an evaluation for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Busy`] if an evaluation is already running for
    /// this session. The call is rejected, not queued.
    pub fn register(&self, session_id: SessionId) -> Result<EvaluationGuard<'_>> {
        let mut calls = self.calls.lock().map_err(|_| BrokerError::poisoned())?;
        if calls.contains_key(&session_id) {
            return Err(BrokerError::Busy {
                session_id: session_id.to_string(),
            });
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let (cancel, rx) = watch::channel(false);
        calls.insert(session_id, Registration { generation, cancel });

        Ok(EvaluationGuard {
            owner: self,
            session_id,
            generation,
            token: CancelToken { rx },
        })
    }

    /// Cancel the evaluation running for `session_id`, if any.
    ///
    /// Returns whether an evaluation was signalled. Without one this is a no-op.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn cancel(&self, session_id: &SessionId) -> Result<bool> {
        let registration = self
            .calls
            .lock()
            .map_err(|_| BrokerError::poisoned())?
            .remove(session_id);

        let Some(registration) = registration else {
            return Ok(false);
        };
        // The receiver may already be gone if the evaluation just returned.
        let _ = registration.cancel.send(true);
        tracing::debug!(session_id = %session_id, "Cancelled in-flight evaluation");
        Ok(true)
    }

    /// Whether an evaluation is running for `session_id`.
    ///
    /// # Errors
    ///
    /// Returns error if the lock is poisoned.
    pub fn is_running(&self, session_id: &SessionId) -> Result<bool> {
        Ok(self
            .calls
            .lock()
            .map_err(|_| BrokerError::poisoned())?
            .contains_key(session_id))
    }
}

impl std::fmt::Debug for InFlightEvaluations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InFlightEvaluations").finish_non_exhaustive()
    }
}

/// Registration of one running evaluation; unregisters on drop.
pub struct EvaluationGuard<'a> {
    owner: &'a InFlightEvaluations,
    session_id: SessionId,
    generation: u64,
    token: CancelToken,
}

impl EvaluationGuard<'_> {
    /// Cancellation token to pass to every wait of the evaluation.
    pub fn token(&mut self) -> &mut CancelToken {
        &mut self.token
    }
}

impl Drop for EvaluationGuard<'_> {
    fn drop(&mut self) {
        let mut calls = self
            .owner
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // A cancelled registration may already have been replaced by a newer call.
        if calls
            .get(&self.session_id)
            .is_some_and(|r| r.generation == self.generation)
        {
            calls.remove(&self.session_id);
        }
    }
}

/// Receiving side of a cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Token that is never cancelled.
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is requested.
    ///
    /// If the registration goes away without a cancel, this never resolves.
    pub async fn cancelled(&mut self) {
        let signalled = self.rx.wait_for(|cancelled| *cancelled).await.map(|_| ());
        if signalled.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
