//! Session credential and its process-wide holder.
//!
//! The bearer token is wrapped in `SecretString` and the custom `Debug`
//! implementation redacts it. `SessionStore` is readable by every component
//! but only the auth guard may clear it (see `api::guard`).

use std::fmt;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// Authorization credential attached to protected calls.
#[derive(Clone)]
pub struct Session {
    access_token: SecretString,
    token_type: String,
}

impl Session {
    /// Creates a bearer session from a raw access token.
    pub fn bearer(access_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            token_type: "bearer".to_string(),
        }
    }

    /// Creates a session with an explicit token type as returned by `/login`.
    pub fn with_type(access_token: impl Into<String>, token_type: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            token_type: token_type.into(),
        }
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// `Authorization` header value. The `bearer` scheme is normalized to
    /// `Bearer`; any other type returned by `/login` is sent as is.
    pub fn authorization(&self) -> String {
        let scheme = if self.token_type.eq_ignore_ascii_case("bearer") {
            "Bearer"
        } else {
            self.token_type.as_str()
        };
        format!("{} {}", scheme, self.access_token.expose_secret())
    }

    /// Exposes the raw token. Callers must never log the result.
    pub fn expose_token(&self) -> &str {
        self.access_token.expose_secret()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SessionStore
// ─────────────────────────────────────────────────────────────────────────────

/// A session as observed at the start of a protected call.
#[derive(Debug, Clone)]
pub struct SessionTicket {
    pub session: Session,
    /// Generation of the store when the ticket was issued.
    pub generation: u64,
}

struct SessionSlot {
    session: Option<Session>,
    generation: u64,
    /// Cancelled when the current session is invalidated. Replaced on every
    /// `establish`, so loops started under a new session are unaffected.
    scope: CancellationToken,
}

/// Process-wide session holder.
///
/// Cloning is cheap; all clones share the same slot.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<SessionSlot>>,
}

impl SessionStore {
    /// Creates an empty store. Protected calls fail with `NotAuthenticated`
    /// until a session is established.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionSlot {
                session: None,
                generation: 0,
                scope: CancellationToken::new(),
            })),
        }
    }

    /// Creates a store that already holds `session`.
    pub fn with_session(session: Session) -> Self {
        Self {
            inner: Arc::new(RwLock::new(SessionSlot {
                session: Some(session),
                generation: 1,
                scope: CancellationToken::new(),
            })),
        }
    }

    /// Installs a new session, starting a new generation.
    pub async fn establish(&self, session: Session) {
        let mut slot = self.inner.write().await;
        slot.generation += 1;
        slot.session = Some(session);
        if slot.scope.is_cancelled() {
            slot.scope = CancellationToken::new();
        }
    }

    /// Returns the current session and its generation, if any.
    pub async fn current(&self) -> Option<SessionTicket> {
        let slot = self.inner.read().await;
        slot.session.as_ref().map(|session| SessionTicket {
            session: session.clone(),
            generation: slot.generation,
        })
    }

    /// True while the session of `generation` is still the live one.
    pub async fn is_current(&self, generation: u64) -> bool {
        let slot = self.inner.read().await;
        slot.session.is_some() && slot.generation == generation
    }

    pub async fn is_established(&self) -> bool {
        self.inner.read().await.session.is_some()
    }

    /// Token cancelled when the current session ends.
    pub async fn scope(&self) -> CancellationToken {
        self.inner.read().await.scope.clone()
    }

    /// Clears the session of `generation`. Returns `true` only for the call
    /// that actually cleared it.
    pub(crate) async fn invalidate(&self, generation: u64) -> bool {
        let mut slot = self.inner.write().await;
        if slot.session.is_none() || slot.generation != generation {
            return false;
        }
        slot.session = None;
        slot.scope.cancel();
        true
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}
