//! Job and item state shared by the submitter, poll loop and reconciler.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::api::ingest::redact_id;

// ─────────────────────────────────────────────────────────────────────────────
// Status
// ─────────────────────────────────────────────────────────────────────────────

/// Processing status of an item or of a whole job.
///
/// Items move forward through `PENDING → IN_PROGRESS → {COMPLETED, FAILED}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl Status {
    /// Position in the forward-only lattice. Both terminal states share a rank.
    pub fn rank(self) -> u8 {
        match self {
            Status::Pending => 0,
            Status::InProgress => 1,
            Status::Completed | Status::Failed => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "PENDING",
            Status::InProgress => "IN_PROGRESS",
            Status::Completed => "COMPLETED",
            Status::Failed => "FAILED",
        }
    }

    /// True when moving from `self` to `next` breaks the forward-only rule.
    pub fn is_regression_to(self, next: Status) -> bool {
        if self == next {
            return false;
        }
        next.rank() < self.rank() || (self.is_terminal() && next.is_terminal())
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// JobId
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque job identifier assigned by the server at submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shortened form for log lines.
    pub fn redacted(&self) -> String {
        redact_id(&self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Items
// ─────────────────────────────────────────────────────────────────────────────

/// Highest progress value an item can report.
pub const MAX_PROGRESS: u8 = 100;

/// Client-side view of one item in a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub name: String,
    pub status: Status,
    /// Percentage, meaningful only while `IN_PROGRESS`.
    pub progress: Option<u8>,
}

impl Item {
    /// A freshly submitted item.
    pub fn pending(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: Status::Pending,
            progress: None,
        }
    }
}

/// Items of one job keyed by their server-assigned name.
pub type ItemMap = BTreeMap<String, Item>;

/// Builds a map of `PENDING` items from server-assigned names.
pub fn seed_items<I, S>(names: I) -> ItemMap
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names
        .into_iter()
        .map(|name| {
            let item = Item::pending(name);
            (item.name.clone(), item)
        })
        .collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Snapshot
// ─────────────────────────────────────────────────────────────────────────────

/// One item as reported by a status poll.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ItemReport {
    #[serde(rename = "filename", alias = "name")]
    pub name: String,
    pub status: Status,
    #[serde(default)]
    pub progress: Option<u32>,
}

impl ItemReport {
    pub fn new(name: impl Into<String>, status: Status) -> Self {
        Self {
            name: name.into(),
            status,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: u32) -> Self {
        self.progress = Some(progress);
        self
    }
}

/// Point-in-time status report for a job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub task_id: Option<String>,
    /// Aggregate status, taken from the server as-is.
    pub status: Status,
    #[serde(default)]
    pub files: Vec<ItemReport>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Deltas
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    /// The server reported an item the client had not rendered yet.
    Created,
    StatusChanged,
    /// Same status (`IN_PROGRESS`), new progress value.
    ProgressOnly,
}

/// A recorded transition of one item between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delta {
    pub name: String,
    pub kind: DeltaKind,
    /// Status before the transition. Created items start from `PENDING`.
    pub previous: Status,
    pub current: Status,
    pub progress: Option<u8>,
}

/// A snapshot moved an item backwards in the status lattice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub name: String,
    pub from: Status,
    pub to: Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_screaming_snake_case() {
        assert_eq!(
            serde_json::to_string(&Status::InProgress).unwrap(),
            "\"IN_PROGRESS\""
        );
        let parsed: Status = serde_json::from_str("\"COMPLETED\"").unwrap();
        assert_eq!(parsed, Status::Completed);
    }

    #[test]
    fn regression_detection() {
        assert!(!Status::Pending.is_regression_to(Status::InProgress));
        assert!(!Status::InProgress.is_regression_to(Status::Failed));
        assert!(!Status::Completed.is_regression_to(Status::Completed));
        assert!(Status::Completed.is_regression_to(Status::Pending));
        assert!(Status::InProgress.is_regression_to(Status::Pending));
        assert!(Status::Completed.is_regression_to(Status::Failed));
    }

    #[test]
    fn item_report_reads_filename_field() {
        let report: ItemReport =
            serde_json::from_str(r#"{"filename":"a.txt","status":"PENDING"}"#).unwrap();
        assert_eq!(report.name, "a.txt");
        assert_eq!(report.progress, None);
    }

    #[test]
    fn snapshot_tolerates_missing_optional_fields() {
        let snapshot: StatusSnapshot = serde_json::from_str(r#"{"status":"FAILED"}"#).unwrap();
        assert_eq!(snapshot.status, Status::Failed);
        assert!(snapshot.files.is_empty());
        assert!(snapshot.task_id.is_none());
    }

    #[test]
    fn seed_items_are_pending() {
        let items = seed_items(["a.txt", "b.txt"]);
        assert_eq!(items.len(), 2);
        assert!(items.values().all(|i| i.status == Status::Pending));
    }

    #[test]
    fn job_id_redacted_for_logs() {
        let id = JobId::new("0f6a1c2e-aaaa-bbbb-cccc-123456789abc");
        assert_eq!(id.redacted(), "0f6a1c2e...");
        assert_eq!(id.to_string(), "0f6a1c2e-aaaa-bbbb-cccc-123456789abc");
    }
}
