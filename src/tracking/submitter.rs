//! Batch submission.

use tracing::info;

use crate::api::guard::AuthGuard;
use crate::api::ingest::{FileBlob, IngestApi, Submission};
use crate::error::AppError;

/// Submits batches of files for ingestion. Does not start polling.
#[derive(Clone)]
pub struct TaskSubmitter {
    api: IngestApi,
    guard: AuthGuard,
}

impl TaskSubmitter {
    pub fn new(api: IngestApi, guard: AuthGuard) -> Self {
        Self { api, guard }
    }

    /// Uploads `items` as one job.
    ///
    /// On success the returned `assigned_names` are the keys the server will
    /// report status under; they may differ from the local file names.
    ///
    /// # Errors
    ///
    /// * `NoItems` if `items` is empty; no request is made.
    /// * `Unauthorized` if the server rejected the session, which is then
    ///   cleared. `NotAuthenticated` if there was no session to begin with.
    /// * `ServerRejection` carrying the server's message for other non-2xx
    ///   responses, or a transport-class error.
    pub async fn submit(&self, items: Vec<FileBlob>) -> Result<Submission, AppError> {
        if items.is_empty() {
            return Err(AppError::NoItems);
        }

        let total_bytes: usize = items.iter().map(FileBlob::len).sum();
        info!(
            "[SUBMIT] Uploading {} file(s), {} bytes",
            items.len(),
            total_bytes
        );

        let api = &self.api;
        self.guard
            .guarded(|session| async move { api.submit(&session, items).await })
            .await
    }
}
