//! Job tracking: submission, polling and reconciliation.

pub mod model;
pub mod poll;
pub mod reconcile;
pub mod sink;
pub mod submitter;
pub mod upload;

pub use model::{
    Anomaly, Delta, DeltaKind, Item, ItemMap, ItemReport, JobId, Status, StatusSnapshot,
};
pub use poll::{PollHandle, PollLoop, PollOutcome, PollRegistry, PollReport};
pub use reconcile::{reconcile, Reconciled};
pub use sink::{PresentationSink, TracingSink};
pub use submitter::TaskSubmitter;
pub use upload::{UploadReport, UploadSession};
