//! In-memory fakes for the `Transport` and `PresentationSink` seams.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::{Method, StatusCode};

use crate::api::transport::{ApiRequest, ApiResponse, Transport};
use crate::error::AppError;
use crate::tracking::model::{Anomaly, Delta, JobId, Status};
use crate::tracking::poll::PollOutcome;
use crate::tracking::sink::PresentationSink;

// ─────────────────────────────────────────────────────────────────────────────
// FakeTransport
// ─────────────────────────────────────────────────────────────────────────────

/// Scripted reply for one request.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    Json(u16, serde_json::Value),
    /// Network-level failure.
    Fail,
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub(crate) fn ok(value: serde_json::Value) -> Self {
        Reply::Json(200, value)
    }

    pub(crate) fn status(code: u16) -> Self {
        Reply::Json(code, serde_json::json!({ "detail": "scripted failure" }))
    }

    pub(crate) fn after(self, delay: Duration) -> Self {
        Reply::Delayed(delay, Box::new(self))
    }

    fn resolve(self) -> (Option<Duration>, Result<ApiResponse, AppError>) {
        match self {
            Reply::Json(code, value) => {
                let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                (None, Ok(ApiResponse::json_body(status, &value)))
            }
            Reply::Fail => (None, Err(AppError::ConnectionFailed("scripted".into()))),
            Reply::Delayed(delay, inner) => {
                let (_, result) = inner.resolve();
                (Some(delay), result)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Call {
    pub method: Method,
    pub path: String,
    pub authed: bool,
}

/// Transport answering from per-path reply queues. The last reply of a
/// queue repeats; unscripted paths answer 404.
#[derive(Default)]
pub(crate) struct FakeTransport {
    routes: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<Call>>,
}

impl FakeTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(&self, path: &str, reply: Reply) -> &Self {
        self.routes
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    pub(crate) fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.path == path)
            .count()
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn next_reply(&self, path: &str) -> Reply {
        let mut routes = self.routes.lock().unwrap();
        match routes.get_mut(path) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::status(404)),
            None => Reply::status(404),
        }
    }
}

impl Transport for FakeTransport {
    fn send(
        &self,
        req: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, AppError>> + Send + '_>> {
        let path = req.path();
        self.calls.lock().unwrap().push(Call {
            method: req.method.clone(),
            path: path.clone(),
            authed: req.session.is_some(),
        });
        let (delay, result) = self.next_reply(&path).resolve();

        Box::pin(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            result
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RecordingSink
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SinkEvent {
    Deltas(Vec<Delta>),
    JobStatus(Status),
    Anomaly(Anomaly),
    Finished(&'static str),
    Documents(Vec<String>),
    Controls(bool),
}

#[derive(Default)]
pub(crate) struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub(crate) fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, event: SinkEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl PresentationSink for RecordingSink {
    fn on_deltas(&self, _job_id: &JobId, deltas: &[Delta]) {
        self.push(SinkEvent::Deltas(deltas.to_vec()));
    }

    fn on_job_status(&self, _job_id: &JobId, status: Status) {
        self.push(SinkEvent::JobStatus(status));
    }

    fn on_anomaly(&self, _job_id: &JobId, anomaly: &Anomaly) {
        self.push(SinkEvent::Anomaly(anomaly.clone()));
    }

    fn on_finished(&self, _job_id: &JobId, outcome: &PollOutcome) {
        self.push(SinkEvent::Finished(outcome.label()));
    }

    fn on_documents(&self, names: &[String]) {
        self.push(SinkEvent::Documents(names.to_vec()));
    }

    fn set_controls_locked(&self, locked: bool) {
        self.push(SinkEvent::Controls(locked));
    }
}
