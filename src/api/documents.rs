//! Ingested document management.

use tracing::info;

use crate::api::guard::AuthGuard;
use crate::api::ingest::IngestApi;
use crate::error::AppError;

/// Guarded list and delete operations on ingested documents.
#[derive(Clone)]
pub struct DocumentService {
    api: IngestApi,
    guard: AuthGuard,
}

impl DocumentService {
    pub fn new(api: IngestApi, guard: AuthGuard) -> Self {
        Self { api, guard }
    }

    /// Authoritative list of ingested document names.
    pub async fn list(&self) -> Result<Vec<String>, AppError> {
        let api = &self.api;
        self.guard
            .guarded(|session| async move { api.list(&session).await })
            .await
    }

    /// Deletes `name`. Returns the server's confirmation message, if any.
    ///
    /// The server re-derives the remaining documents afterwards, so callers
    /// should re-fetch the list rather than patch a local copy.
    pub async fn delete(&self, name: &str) -> Result<Option<String>, AppError> {
        if name.trim().is_empty() {
            return Err(AppError::InvalidInput("Document name is required".into()));
        }
        let api = &self.api;
        self.guard
            .guarded(|session| async move { api.delete(&session, name).await })
            .await
    }

    /// Deletes `name`, then returns the refreshed document list.
    pub async fn delete_and_refresh(&self, name: &str) -> Result<Vec<String>, AppError> {
        self.delete(name).await?;
        let names = self.list().await?;
        info!("[DOCS] {} document(s) remain", names.len());
        Ok(names)
    }
}
