//! Upload-then-track flow.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::api::ingest::FileBlob;
use crate::error::AppError;
use crate::tracking::model::{seed_items, JobId};
use crate::tracking::poll::{PollLoop, PollReport};
use crate::tracking::sink::PresentationSink;
use crate::tracking::submitter::TaskSubmitter;

/// Result of a tracked upload.
#[derive(Debug)]
pub struct UploadReport {
    pub job_id: JobId,
    pub poll: PollReport,
}

/// Submits a batch, then polls the resulting job until it ends.
///
/// Upload controls are locked for the duration and unlocked on every exit
/// path, success or not.
#[derive(Clone)]
pub struct UploadSession {
    submitter: TaskSubmitter,
    poller: PollLoop,
    sink: Arc<dyn PresentationSink>,
    interval: Duration,
}

impl UploadSession {
    pub fn new(
        submitter: TaskSubmitter,
        poller: PollLoop,
        sink: Arc<dyn PresentationSink>,
        interval: Duration,
    ) -> Self {
        Self {
            submitter,
            poller,
            sink,
            interval,
        }
    }

    /// Uploads `items` and tracks the job to its end.
    ///
    /// # Errors
    ///
    /// Returns the submission error if the batch was not accepted. Once the
    /// job is running, its end state is reported in `UploadReport::poll`.
    pub async fn run(&self, items: Vec<FileBlob>) -> Result<UploadReport, AppError> {
        self.sink.set_controls_locked(true);
        let result = self.submit_and_track(items).await;
        self.sink.set_controls_locked(false);

        match &result {
            Ok(report) if report.poll.outcome.is_success() => {}
            Ok(report) => warn!(
                "[SUBMIT] Job {} did not complete: {}",
                report.job_id.redacted(),
                report.poll.outcome
            ),
            Err(e) => warn!("[SUBMIT] Upload not accepted: {}", e),
        }
        result
    }

    async fn submit_and_track(&self, items: Vec<FileBlob>) -> Result<UploadReport, AppError> {
        let submission = self.submitter.submit(items).await?;
        info!(
            "[SUBMIT] Tracking job {} ({} item(s))",
            submission.job_id.redacted(),
            submission.assigned_names.len()
        );

        let seed = seed_items(submission.assigned_names);
        let handle = self
            .poller
            .start_seeded(submission.job_id.clone(), self.interval, seed)
            .await?;

        Ok(UploadReport {
            job_id: submission.job_id,
            poll: handle.finished().await,
        })
    }
}
