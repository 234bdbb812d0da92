//! Applies a status snapshot to the client's item map.
//!
//! Pure: no I/O and no failure path. Deltas are the only output consumers
//! see; the aggregate job status is never recomputed here.

use crate::tracking::model::{
    Anomaly, Delta, DeltaKind, Item, ItemMap, ItemReport, Status, MAX_PROGRESS,
};

/// Result of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciled {
    pub items: ItemMap,
    /// In snapshot order.
    pub deltas: Vec<Delta>,
    pub anomalies: Vec<Anomaly>,
}

/// Merges `snapshot` into `local`.
///
/// * Known items get a `StatusChanged` delta when the status differs, or a
///   `ProgressOnly` delta when an `IN_PROGRESS` item reports new progress.
/// * Unknown items are inserted from a `PENDING` baseline and yield a single
///   `Created` delta carrying the reported status.
/// * Items missing from the snapshot are left as they are.
///
/// A backwards move in the status lattice is applied anyway and recorded as
/// an anomaly.
pub fn reconcile(mut local: ItemMap, snapshot: &[ItemReport]) -> Reconciled {
    let mut deltas = Vec::new();
    let mut anomalies = Vec::new();

    for report in snapshot {
        match local.get_mut(&report.name) {
            Some(item) => {
                let previous = item.status;
                let previous_progress = item.progress;
                let progress = next_progress(report, previous_progress, previous);

                if previous != report.status {
                    if previous.is_regression_to(report.status) {
                        anomalies.push(Anomaly {
                            name: report.name.clone(),
                            from: previous,
                            to: report.status,
                        });
                    }
                    item.status = report.status;
                    item.progress = progress;
                    deltas.push(Delta {
                        name: report.name.clone(),
                        kind: DeltaKind::StatusChanged,
                        previous,
                        current: report.status,
                        progress,
                    });
                } else if report.status == Status::InProgress && progress != previous_progress {
                    item.progress = progress;
                    deltas.push(Delta {
                        name: report.name.clone(),
                        kind: DeltaKind::ProgressOnly,
                        previous,
                        current: report.status,
                        progress,
                    });
                }
            }
            None => {
                let progress = next_progress(report, None, Status::Pending);
                local.insert(
                    report.name.clone(),
                    Item {
                        name: report.name.clone(),
                        status: report.status,
                        progress,
                    },
                );
                deltas.push(Delta {
                    name: report.name.clone(),
                    kind: DeltaKind::Created,
                    previous: Status::Pending,
                    current: report.status,
                    progress,
                });
            }
        }
    }

    Reconciled {
        items: local,
        deltas,
        anomalies,
    }
}

/// Progress to store after applying `report`. Only `IN_PROGRESS` items carry
/// progress; a report without a value keeps the last known one.
fn next_progress(report: &ItemReport, current: Option<u8>, current_status: Status) -> Option<u8> {
    if report.status != Status::InProgress {
        return None;
    }
    match report.progress {
        Some(p) => Some(p.min(u32::from(MAX_PROGRESS)) as u8),
        None if current_status == Status::InProgress => current,
        None => None,
    }
}
