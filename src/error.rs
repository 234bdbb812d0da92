use serde::Serialize;
use thiserror::Error;

/// Patterns (lowercase) that indicate sensitive data not safe for UI display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "bearer ",
    "access_token",
    "authorization:",
    "password",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for UI display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// User-friendly error presentation for a frontend.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Application-wide error type.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Caller ────────────────────────────────────────────────────────────────
    #[error("No items to submit")]
    NoItems,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ── Auth ──────────────────────────────────────────────────────────────────
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Login failed: {0}")]
    LoginFailed(String),

    // ── API ───────────────────────────────────────────────────────────────────
    #[error("Server rejected request ({status}): {message}")]
    ServerRejection { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    // ── Transport ─────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    // ── Local ─────────────────────────────────────────────────────────────────
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True for network and payload-parse failures. Polling for a job stops on
    /// these and the caller may restart it.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            AppError::ConnectionFailed(_) | AppError::InvalidResponse(_)
        )
    }

    /// True when the failure means the session can no longer be used.
    pub fn is_auth(&self) -> bool {
        matches!(self, AppError::Unauthorized | AppError::NotAuthenticated)
    }

    /// Converts the error into a user-friendly presentation suitable for UI display.
    /// Never leaks tokens or credentials.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Caller ────────────────────────────────────────────────────────
            AppError::NoItems => ErrorPresentation {
                title: "Nothing to Upload".into(),
                message: "Please select or drag files to upload.".into(),
                action: Some("Select files".into()),
            },
            AppError::InvalidInput(msg) => ErrorPresentation {
                title: "Invalid Input".into(),
                message: sanitize_message(msg, "The request was not valid."),
                action: None,
            },

            // ── Auth ──────────────────────────────────────────────────────────
            AppError::NotAuthenticated => ErrorPresentation {
                title: "Not Logged In".into(),
                message: "You need to log in to continue.".into(),
                action: Some("Log in".into()),
            },

            AppError::Unauthorized => ErrorPresentation {
                title: "Session Expired".into(),
                message: "Your session has expired or is invalid.".into(),
                action: Some("Log in again".into()),
            },

            AppError::LoginFailed(msg) => ErrorPresentation {
                title: "Login Failed".into(),
                message: sanitize_message(msg, "Could not complete the login."),
                action: Some("Check your credentials and log in again".into()),
            },

            // ── API ───────────────────────────────────────────────────────────
            AppError::ServerRejection { message, .. } => ErrorPresentation {
                title: "Request Rejected".into(),
                message: sanitize_message(message, "The server rejected the request."),
                action: None,
            },

            AppError::NotFound(msg) => ErrorPresentation {
                title: "Not Found".into(),
                message: sanitize_message(msg, "The requested item was not found."),
                action: Some("Refresh the document list".into()),
            },

            AppError::QueryFailed(msg) => ErrorPresentation {
                title: "Query Failed".into(),
                message: sanitize_message(msg, "The answer could not be generated."),
                action: Some("Try a shorter query or retry".into()),
            },

            // ── Transport ─────────────────────────────────────────────────────
            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not reach the document service.".into(),
                action: Some("Check network and retry".into()),
            },

            AppError::InvalidResponse(_) => ErrorPresentation {
                title: "Unexpected Response".into(),
                message: "The document service returned a response that could not be read."
                    .into(),
                action: Some("Retry".into()),
            },

            // ── Local ─────────────────────────────────────────────────────────
            AppError::Config(msg) => ErrorPresentation {
                title: "Configuration Error".into(),
                message: sanitize_message(msg, "The configuration is invalid."),
                action: Some("Fix the configuration file".into()),
            },

            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_presentation().serialize(serializer)
    }
}
