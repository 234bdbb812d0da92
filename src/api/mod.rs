//! Document service API layer.
//!
//! - **Transport seam** (`Transport`) so every call can be faked in tests
//! - **Safe logging** that never leaks tokens or sensitive URL parameters
//! - **Auth guard** that clears the session on the first 401 and halts
//!   every protected call made with it

pub mod auth;
pub mod documents;
pub mod guard;
pub mod ingest;
pub mod query;
pub mod transport;

pub use auth::login;
pub use documents::DocumentService;
pub use guard::{AuthGuard, SessionEnded};
pub use ingest::{FileBlob, IngestApi, Submission};
pub use query::{Answer, Citation, HealthStatus, QueryService, DEFAULT_SNIPPET_CHARS};
pub use transport::{ApiRequest, ApiResponse, HttpTransport, LoggingMode, RequestBody, Transport};
