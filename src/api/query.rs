//! Question answering and health probe. Both endpoints are public.

use std::sync::Arc;

use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info};

use crate::api::transport::{ApiRequest, RequestBody, Transport};
use crate::error::AppError;

const QUERY_PATH: &str = "query";
const HEALTH_PATH: &str = "health";

/// Default snippet length for citation previews.
pub const DEFAULT_SNIPPET_CHARS: usize = 250;

const UNKNOWN_SOURCE: &str = "Unknown Source";

// ─────────────────────────────────────────────────────────────────────────────
// Types
// ─────────────────────────────────────────────────────────────────────────────

/// A source passage the answer was drawn from.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub page_content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Citation {
    /// File name of the cited source, from `metadata.source`. Handles both
    /// `/` and `\` separators.
    pub fn source_filename(&self) -> &str {
        let source = match self.metadata.get("source").and_then(|v| v.as_str()) {
            Some(s) if !s.is_empty() => s,
            _ => return UNKNOWN_SOURCE,
        };
        source
            .rsplit(|c| c == '/' || c == '\\')
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or(source)
    }

    /// First `limit` characters of the passage, with `...` appended when cut.
    pub fn snippet(&self, limit: usize) -> String {
        match self.page_content.char_indices().nth(limit) {
            Some((idx, _)) => format!("{}...", &self.page_content[..idx]),
            None => self.page_content.clone(),
        }
    }
}

/// Generated answer plus its sources.
#[derive(Debug, Clone, PartialEq)]
pub struct Answer {
    pub answer: String,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Deserialize)]
struct WireAnswer {
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    source_documents: Vec<Citation>,
    #[serde(default)]
    error: Option<String>,
}

/// `/health` payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub message: String,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// QueryService
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct QueryService {
    transport: Arc<dyn Transport>,
}

impl QueryService {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Asks a question over the ingested documents.
    ///
    /// # Errors
    ///
    /// * `QueryFailed` for an empty query (no request is made), a non-2xx
    ///   response, or a body carrying an `error` field.
    /// * A transport-class error if the service is unreachable or the body
    ///   is unreadable.
    pub async fn ask(&self, query: &str) -> Result<Answer, AppError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::QueryFailed("Please enter a question".into()));
        }

        let request = ApiRequest::new(Method::POST, [QUERY_PATH])
            .body(RequestBody::Json(serde_json::json!({ "query": query })));
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            let message = response.detail().unwrap_or_else(|| {
                format!("HTTP error! status: {}", response.status.as_u16())
            });
            return Err(AppError::QueryFailed(message));
        }

        let wire: WireAnswer = response.json("query response")?;
        if let Some(error) = wire.error {
            return Err(AppError::QueryFailed(error));
        }
        let answer = wire
            .answer
            .ok_or_else(|| AppError::InvalidResponse("Query response has no answer".into()))?;

        info!(
            "[QUERY] Answer received with {} source(s)",
            wire.source_documents.len()
        );
        Ok(Answer {
            answer,
            citations: wire.source_documents,
        })
    }

    /// Probes `/health`.
    pub async fn health(&self) -> Result<HealthStatus, AppError> {
        let response = self.transport.send(ApiRequest::get([HEALTH_PATH])).await?;
        if !response.is_success() {
            return Err(response.into_error("Health endpoint not found"));
        }
        let health: HealthStatus = response.json("health response")?;
        debug!("[HTTP] Health: {}", health.status);
        Ok(health)
    }
}
