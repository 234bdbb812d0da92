//! Per-job status polling.
//!
//! Each job gets one spawned task that fetches its status on a fixed
//! interval, reconciles the snapshot into the job's item map and forwards the
//! deltas to the presentation sink. A fetch still outstanding when the next
//! interval elapses causes that tick to be skipped, never queued.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::guard::AuthGuard;
use crate::api::ingest::IngestApi;
use crate::error::AppError;
use crate::tracking::model::{ItemMap, JobId, Status, StatusSnapshot};
use crate::tracking::reconcile::reconcile;
use crate::tracking::sink::PresentationSink;

// ─────────────────────────────────────────────────────────────────────────────
// Outcome
// ─────────────────────────────────────────────────────────────────────────────

/// Why a poll loop ended.
#[derive(Debug)]
pub enum PollOutcome {
    /// The server reported the job `COMPLETED`.
    Completed,
    /// The server reported the job `FAILED`.
    Failed,
    /// The session ended, either on this loop's own fetch or elsewhere.
    Unauthorized,
    /// The loop was stopped by its owner or replaced by a newer loop.
    Stopped,
    /// A fetch failed for a reason other than authorization. Not retried.
    Error(AppError),
}

impl PollOutcome {
    /// Short machine-friendly name.
    pub fn label(&self) -> &'static str {
        match self {
            PollOutcome::Completed => "completed",
            PollOutcome::Failed => "failed",
            PollOutcome::Unauthorized => "unauthorized",
            PollOutcome::Stopped => "stopped",
            PollOutcome::Error(_) => "error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PollOutcome::Completed)
    }
}

impl fmt::Display for PollOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollOutcome::Error(e) => write!(f, "error ({})", e),
            other => f.write_str(other.label()),
        }
    }
}

/// Final state handed back when a loop ends.
#[derive(Debug)]
pub struct PollReport {
    pub outcome: PollOutcome,
    /// Item map as of the last applied snapshot.
    pub items: ItemMap,
}

// ─────────────────────────────────────────────────────────────────────────────
// Registry
// ─────────────────────────────────────────────────────────────────────────────

struct RegistryEntry {
    loop_id: u64,
    token: CancellationToken,
}

/// Live poll loops keyed by job id. At most one entry per job.
#[derive(Clone, Default)]
pub struct PollRegistry {
    entries: Arc<Mutex<HashMap<JobId, RegistryEntry>>>,
    next_loop_id: Arc<AtomicU64>,
}

impl PollRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a loop for `job_id`, stopping any loop already registered
    /// for it. Returns the new loop's id.
    async fn register(&self, job_id: &JobId, token: CancellationToken) -> u64 {
        let loop_id = self.next_loop_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut entries = self.entries.lock().await;
        if let Some(previous) = entries.insert(job_id.clone(), RegistryEntry { loop_id, token }) {
            info!("[POLL] Replacing live loop for job {}", job_id.redacted());
            previous.token.cancel();
        }
        loop_id
    }

    /// Removes the entry for `job_id` if it still belongs to `loop_id`.
    async fn release(&self, job_id: &JobId, loop_id: u64) {
        let mut entries = self.entries.lock().await;
        if entries.get(job_id).is_some_and(|e| e.loop_id == loop_id) {
            entries.remove(job_id);
        }
    }

    pub async fn is_active(&self, job_id: &JobId) -> bool {
        self.entries.lock().await.contains_key(job_id)
    }

    pub async fn active_count(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Stops every live loop.
    pub async fn stop_all(&self) {
        let mut entries = self.entries.lock().await;
        for (job_id, entry) in entries.drain() {
            debug!("[POLL] Stopping job {}", job_id.redacted());
            entry.token.cancel();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Handle
// ─────────────────────────────────────────────────────────────────────────────

/// Owner's view of a running poll loop.
#[derive(Debug)]
pub struct PollHandle {
    job_id: JobId,
    token: CancellationToken,
    task: JoinHandle<PollReport>,
}

impl PollHandle {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Stops the loop. Safe to call any number of times, including after the
    /// loop has already ended. A fetch in flight is abandoned and its result
    /// never applied.
    pub fn stop(&self) {
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled() || self.task.is_finished()
    }

    /// Waits for the loop to end.
    pub async fn finished(self) -> PollReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => PollReport {
                outcome: PollOutcome::Error(AppError::Internal(format!(
                    "Poll task for job {} aborted: {}",
                    self.job_id.redacted(),
                    e
                ))),
                items: ItemMap::new(),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// PollLoop
// ─────────────────────────────────────────────────────────────────────────────

/// Starts and stops per-job poll loops.
#[derive(Clone)]
pub struct PollLoop {
    api: IngestApi,
    guard: AuthGuard,
    registry: PollRegistry,
    sink: Arc<dyn PresentationSink>,
}

impl PollLoop {
    pub fn new(api: IngestApi, guard: AuthGuard, sink: Arc<dyn PresentationSink>) -> Self {
        Self {
            api,
            guard,
            registry: PollRegistry::new(),
            sink,
        }
    }

    pub fn registry(&self) -> &PollRegistry {
        &self.registry
    }

    /// Starts polling `job_id` with an empty item map.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `interval` is zero.
    pub async fn start(&self, job_id: JobId, interval: Duration) -> Result<PollHandle, AppError> {
        self.start_seeded(job_id, interval, ItemMap::new()).await
    }

    /// Starts polling `job_id`, reconciling against `seed`.
    ///
    /// The first fetch happens one `interval` after the call. Any loop
    /// already live for the same job is stopped first.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `interval` is zero.
    pub async fn start_seeded(
        &self,
        job_id: JobId,
        interval: Duration,
        seed: ItemMap,
    ) -> Result<PollHandle, AppError> {
        if interval.is_zero() {
            return Err(AppError::Config(
                "Poll interval must be greater than zero".to_string(),
            ));
        }

        let scope = self.guard.store().scope().await;
        let token = scope.child_token();
        let loop_id = self.registry.register(&job_id, token.clone()).await;

        info!(
            "[POLL] Starting job {} every {}ms",
            job_id.redacted(),
            interval.as_millis()
        );

        let task = JobPoller {
            job_id: job_id.clone(),
            loop_id,
            interval,
            items: seed,
            token: token.clone(),
            scope,
            api: self.api.clone(),
            guard: self.guard.clone(),
            registry: self.registry.clone(),
            sink: Arc::clone(&self.sink),
        };

        Ok(PollHandle {
            job_id,
            token,
            task: tokio::spawn(task.run()),
        })
    }

    /// Stops the loop behind `handle`. Idempotent.
    pub fn stop(&self, handle: &PollHandle) {
        handle.stop();
    }

    pub async fn stop_all(&self) {
        self.registry.stop_all().await;
    }
}

/// State owned by one running loop.
struct JobPoller {
    job_id: JobId,
    loop_id: u64,
    interval: Duration,
    items: ItemMap,
    token: CancellationToken,
    /// Session scope the loop's token descends from.
    scope: CancellationToken,
    api: IngestApi,
    guard: AuthGuard,
    registry: PollRegistry,
    sink: Arc<dyn PresentationSink>,
}

enum Tick {
    Continue,
    Done(PollOutcome),
}

impl JobPoller {
    async fn run(mut self) -> PollReport {
        let outcome = self.poll_until_done().await;

        // Stop before any terminal side effect so nothing can tick again.
        self.token.cancel();
        self.registry.release(&self.job_id, self.loop_id).await;

        info!("[POLL] Job {} ended: {}", self.job_id.redacted(), outcome);
        self.sink.on_finished(&self.job_id, &outcome);

        if matches!(outcome, PollOutcome::Completed | PollOutcome::Failed) {
            self.refresh_documents().await;
        }

        PollReport {
            outcome,
            items: self.items,
        }
    }

    async fn poll_until_done(&mut self) -> PollOutcome {
        let first_tick = Instant::now() + self.interval;
        let mut ticker = interval_at(first_tick, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = self.token.cancelled() => return self.cancelled_outcome(),
                _ = ticker.tick() => {}
            }

            let api = &self.api;
            let job_id = &self.job_id;
            let fetched = tokio::select! {
                biased;
                _ = self.token.cancelled() => {
                    debug!("[POLL] Discarding in-flight fetch for job {}", job_id.redacted());
                    return self.cancelled_outcome();
                }
                result = self.guard.guarded(|session| async move {
                    api.status(&session, job_id).await
                }) => result,
            };

            // Ticks that elapsed while the fetch was outstanding are dropped.
            ticker.reset_at(next_boundary(first_tick, self.interval, Instant::now()));

            match self.accept(fetched) {
                Tick::Continue => {}
                Tick::Done(outcome) => return outcome,
            }
        }
    }

    /// Applies a fetch result unless the loop was stopped after it resolved.
    fn accept(&mut self, fetched: Result<StatusSnapshot, AppError>) -> Tick {
        if self.token.is_cancelled() {
            debug!(
                "[POLL] Discarding fetch for job {} resolved after stop",
                self.job_id.redacted()
            );
            return Tick::Done(self.cancelled_outcome());
        }
        self.apply(fetched)
    }

    /// Applies one fetch result. Runs to completion before the next tick.
    fn apply(&mut self, fetched: Result<StatusSnapshot, AppError>) -> Tick {
        let snapshot = match fetched {
            Ok(snapshot) => snapshot,
            Err(e) if e.is_auth() => {
                warn!(
                    "[POLL] Job {} stopped: session no longer valid",
                    self.job_id.redacted()
                );
                return Tick::Done(PollOutcome::Unauthorized);
            }
            Err(e) => {
                warn!(
                    "[POLL] Job {} stopped after fetch failure: {}",
                    self.job_id.redacted(),
                    e
                );
                return Tick::Done(PollOutcome::Error(e));
            }
        };

        let local = std::mem::take(&mut self.items);
        let reconciled = reconcile(local, &snapshot.files);
        self.items = reconciled.items;

        for anomaly in &reconciled.anomalies {
            self.sink.on_anomaly(&self.job_id, anomaly);
        }
        if !reconciled.deltas.is_empty() {
            self.sink.on_deltas(&self.job_id, &reconciled.deltas);
        }
        self.sink.on_job_status(&self.job_id, snapshot.status);

        match snapshot.status {
            Status::Completed => Tick::Done(PollOutcome::Completed),
            Status::Failed => Tick::Done(PollOutcome::Failed),
            Status::Pending | Status::InProgress => Tick::Continue,
        }
    }

    fn cancelled_outcome(&self) -> PollOutcome {
        if self.scope.is_cancelled() {
            PollOutcome::Unauthorized
        } else {
            PollOutcome::Stopped
        }
    }

    /// Re-fetches the authoritative document list once the job has ended.
    async fn refresh_documents(&self) {
        let api = &self.api;
        match self
            .guard
            .guarded(|session| async move { api.list(&session).await })
            .await
        {
            Ok(names) => self.sink.on_documents(&names),
            Err(e) => warn!(
                "[POLL] Document refresh after job {} failed: {}",
                self.job_id.redacted(),
                e
            ),
        }
    }
}

/// First cadence instant strictly after `now`.
fn next_boundary(first_tick: Instant, interval: Duration, now: Instant) -> Instant {
    let behind = now.saturating_duration_since(first_tick).as_nanos();
    let periods = behind / interval.as_nanos() + 1;
    let periods = u32::try_from(periods).unwrap_or(u32::MAX);
    first_tick + interval * periods
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
