//! Consumer of reconciliation output.
//!
//! The core never renders anything itself; every visible change goes
//! through a `PresentationSink`.

use tracing::{info, warn};

use crate::tracking::model::{Anomaly, Delta, DeltaKind, JobId, Status};
use crate::tracking::poll::PollOutcome;

/// Receives deltas and lifecycle notifications from the tracking core.
///
/// Methods are called from the job's poll task, in order, one at a time per
/// job. Implementations must not block.
pub trait PresentationSink: Send + Sync {
    /// Item transitions produced by one poll tick. Never called with an
    /// empty slice.
    fn on_deltas(&self, job_id: &JobId, deltas: &[Delta]);

    /// Server-reported aggregate status after every successful tick.
    fn on_job_status(&self, _job_id: &JobId, _status: Status) {}

    fn on_anomaly(&self, _job_id: &JobId, _anomaly: &Anomaly) {}

    /// The poll loop for `job_id` has ended and will not tick again.
    fn on_finished(&self, job_id: &JobId, outcome: &PollOutcome);

    /// Authoritative document list, re-fetched after a job ends or a
    /// document is deleted.
    fn on_documents(&self, _names: &[String]) {}

    /// Upload input and submit action should be disabled (`true`) or
    /// re-enabled (`false`).
    fn set_controls_locked(&self, _locked: bool) {}
}

/// Sink that reports everything through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl PresentationSink for TracingSink {
    fn on_deltas(&self, job_id: &JobId, deltas: &[Delta]) {
        for delta in deltas {
            match delta.kind {
                DeltaKind::Created => info!(
                    "[POLL] {} {}: discovered as {}",
                    job_id.redacted(),
                    delta.name,
                    delta.current
                ),
                DeltaKind::StatusChanged => info!(
                    "[POLL] {} {}: {} -> {}",
                    job_id.redacted(),
                    delta.name,
                    delta.previous,
                    delta.current
                ),
                DeltaKind::ProgressOnly => info!(
                    "[POLL] {} {}: {}%",
                    job_id.redacted(),
                    delta.name,
                    delta.progress.unwrap_or(0)
                ),
            }
        }
    }

    fn on_anomaly(&self, job_id: &JobId, anomaly: &Anomaly) {
        warn!(
            "[POLL] {} {}: status regressed {} -> {}",
            job_id.redacted(),
            anomaly.name,
            anomaly.from,
            anomaly.to
        );
    }

    fn on_finished(&self, job_id: &JobId, outcome: &PollOutcome) {
        info!("[POLL] {} finished: {}", job_id.redacted(), outcome);
    }

    fn on_documents(&self, names: &[String]) {
        info!("[DOCS] {} document(s) ingested", names.len());
    }
}
