//! Session enforcement for protected calls.
//!
//! Every protected operation (submit, status, list, delete) runs through
//! `AuthGuard::guarded`. The guard is the only component allowed to clear
//! the session.

use std::future::Future;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::session::{Session, SessionStore};

const SESSION_EVENT_CAPACITY: usize = 16;

/// Emitted once when a session is invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEnded {
    pub generation: u64,
}

#[derive(Clone)]
pub struct AuthGuard {
    store: SessionStore,
    ended_tx: broadcast::Sender<SessionEnded>,
}

impl AuthGuard {
    pub fn new(store: SessionStore) -> Self {
        let (ended_tx, _) = broadcast::channel(SESSION_EVENT_CAPACITY);
        Self { store, ended_tx }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Subscribes to session-ended events. Each invalidated session produces
    /// exactly one event, however many calls failed with it.
    pub fn session_ended(&self) -> broadcast::Receiver<SessionEnded> {
        self.ended_tx.subscribe()
    }

    /// Runs `op` with the current session.
    ///
    /// # Errors
    ///
    /// * `NotAuthenticated` if no session is established; `op` is not called.
    /// * `Unauthorized` if `op` reported an authorization failure, or if the
    ///   session it ran under was invalidated before it completed.
    /// * Any other error from `op` unchanged.
    pub async fn guarded<T, F, Fut>(&self, op: F) -> Result<T, AppError>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let ticket = self
            .store
            .current()
            .await
            .ok_or(AppError::NotAuthenticated)?;

        match op(ticket.session).await {
            Err(AppError::Unauthorized) => {
                self.invalidate(ticket.generation).await;
                Err(AppError::Unauthorized)
            }
            Ok(value) => {
                if self.store.is_current(ticket.generation).await {
                    Ok(value)
                } else {
                    debug!("[AUTH] Discarding result of call made under an ended session");
                    Err(AppError::Unauthorized)
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Ends the session of `generation`. Only the call that actually clears
    /// it emits the event.
    async fn invalidate(&self, generation: u64) -> bool {
        if !self.store.invalidate(generation).await {
            return false;
        }
        warn!("[AUTH] Session rejected by server; cleared and halting protected calls");
        // No subscribers is fine; the session is cleared either way.
        let _ = self.ended_tx.send(SessionEnded { generation });
        true
    }
}
