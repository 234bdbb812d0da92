//! Application state: every service wired to one transport and one session.

use std::sync::Arc;

use secrecy::SecretString;
use tokio::sync::broadcast;
use tracing::info;

use crate::api::auth;
use crate::api::documents::DocumentService;
use crate::api::guard::{AuthGuard, SessionEnded};
use crate::api::ingest::IngestApi;
use crate::api::query::QueryService;
use crate::api::transport::{HttpTransport, Transport};
use crate::config::Config;
use crate::error::AppError;
use crate::session::{Session, SessionStore};
use crate::tracking::model::{ItemMap, JobId};
use crate::tracking::poll::{PollHandle, PollLoop};
use crate::tracking::sink::PresentationSink;
use crate::tracking::submitter::TaskSubmitter;
use crate::tracking::upload::UploadSession;

// ─────────────────────────────────────────────────────────────────────────────
// Application State
// ─────────────────────────────────────────────────────────────────────────────

/// Shared state handed to every front end (CLI or otherwise).
///
/// Cloning is cheap; all clones share the session and the poll registry.
#[derive(Clone)]
pub struct AppState {
    config: Config,
    transport: Arc<dyn Transport>,
    guard: AuthGuard,
    pub submitter: TaskSubmitter,
    pub poller: PollLoop,
    pub documents: DocumentService,
    pub query: QueryService,
    pub uploads: UploadSession,
}

impl AppState {
    /// Builds the HTTP transport from `config` and wires every service to it.
    pub fn from_config(config: Config, sink: Arc<dyn PresentationSink>) -> Result<Self, AppError> {
        let transport = HttpTransport::new(config.base_url()?, config.timeout())?
            .with_logging_mode(config.logging.mode);
        info!("[HTTP] Using document service at {}", transport.base_url());
        Ok(Self::with_transport(config, Arc::new(transport), sink))
    }

    /// Wires every service to an existing transport.
    pub fn with_transport(
        config: Config,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn PresentationSink>,
    ) -> Self {
        let guard = AuthGuard::new(SessionStore::new());
        let ingest = IngestApi::new(Arc::clone(&transport));
        let submitter = TaskSubmitter::new(ingest.clone(), guard.clone());
        let poller = PollLoop::new(ingest.clone(), guard.clone(), Arc::clone(&sink));
        let uploads = UploadSession::new(
            submitter.clone(),
            poller.clone(),
            sink,
            config.poll_interval(),
        );

        Self {
            documents: DocumentService::new(ingest, guard.clone()),
            query: QueryService::new(Arc::clone(&transport)),
            config,
            transport,
            guard,
            submitter,
            poller,
            uploads,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn session_store(&self) -> &SessionStore {
        self.guard.store()
    }

    pub fn session_ended(&self) -> broadcast::Receiver<SessionEnded> {
        self.guard.session_ended()
    }

    /// Logs in and installs the resulting session.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<Session, AppError> {
        let session = auth::login(self.transport.as_ref(), username, password).await?;
        self.guard.store().establish(session.clone()).await;
        Ok(session)
    }

    /// Installs a session from a previously issued token.
    pub async fn use_token(&self, token: impl Into<String>) {
        self.guard.store().establish(Session::bearer(token)).await;
    }

    /// Starts polling an already-submitted job at the configured interval.
    pub async fn track(&self, job_id: JobId, seed: ItemMap) -> Result<PollHandle, AppError> {
        self.poller
            .start_seeded(job_id, self.config.poll_interval(), seed)
            .await
    }
}
