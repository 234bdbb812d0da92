//! HTTP transport with safe request logging.
//!
//! `Transport` is the seam every remote call goes through. `HttpTransport`
//! is the `reqwest` implementation; tests substitute in-memory fakes.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::multipart::{Form, Part};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::info;
use url::Url;

use crate::api::ingest::FileBlob;
use crate::error::AppError;
use crate::session::Session;

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// User agent string for all requests.
const CLIENT_USER_AGENT: &str = concat!("privdoc/", env!("CARGO_PKG_VERSION"));

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Query parameter keys (case-insensitive) that should have their values redacted.
const SENSITIVE_QUERY_PARAMS: &[&str] = &[
    "access_token",
    "token",
    "password",
    "username",
    "authorization",
];

// ─────────────────────────────────────────────────────────────────────────────
// LoggingMode
// ─────────────────────────────────────────────────────────────────────────────

/// Controls how URLs are sanitized for logging.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoggingMode {
    /// Log only the path component.
    /// Example: `/ingestion_status/1b2c...`
    #[default]
    PathOnly,

    /// Log path and query parameters, but redact sensitive values.
    /// Example: `/list_documents?token=***&page=2`
    PathAndQueryRedacted,
}

fn is_sensitive_param(key: &str) -> bool {
    let key_lower = key.to_ascii_lowercase();
    SENSITIVE_QUERY_PARAMS
        .iter()
        .any(|&sensitive| key_lower == sensitive)
}

/// Sanitizes a URL for safe logging based on the specified mode.
///
/// The result never contains the scheme, host, or fragment.
pub fn sanitize_url_for_logs(url: &Url, mode: LoggingMode) -> String {
    let path = url.path();

    match mode {
        LoggingMode::PathOnly => path.to_string(),
        LoggingMode::PathAndQueryRedacted => {
            let query_pairs: Vec<_> = url.query_pairs().collect();
            if query_pairs.is_empty() {
                return path.to_string();
            }

            let redacted_pairs: Vec<String> = query_pairs
                .into_iter()
                .map(|(key, value)| {
                    if is_sensitive_param(&key) {
                        format!("{}=***", key)
                    } else {
                        format!("{}={}", key, value)
                    }
                })
                .collect();

            format!("{}?{}", path, redacted_pairs.join("&"))
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request / Response
// ─────────────────────────────────────────────────────────────────────────────

/// Request payload variants used by the service.
#[derive(Debug, Clone, Default)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    /// Multipart batch; every blob is sent under the same field name.
    Files {
        field: &'static str,
        blobs: Vec<FileBlob>,
    },
}

/// A transport-agnostic request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path segments below the base URL. Each segment is percent-encoded on
    /// its own, so names containing `/` or spaces stay a single segment.
    pub segments: Vec<String>,
    pub session: Option<Session>,
    pub body: RequestBody,
}

impl ApiRequest {
    pub fn new<I, S>(method: Method, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            method,
            segments: segments.into_iter().map(Into::into).collect(),
            session: None,
            body: RequestBody::Empty,
        }
    }

    pub fn get<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(Method::GET, segments)
    }

    pub fn authed(mut self, session: &Session) -> Self {
        self.session = Some(session.clone());
        self
    }

    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Slash-joined path, for logs and test assertions.
    pub fn path(&self) -> String {
        format!("/{}", self.segments.join("/"))
    }
}

/// Status code plus raw body text.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Error body shape used by the service (`{"detail": "..."}`).
#[derive(Debug, Deserialize)]
struct WireErrorDetail {
    detail: serde_json::Value,
}

impl ApiResponse {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Builds a response from a JSON value.
    pub fn json_body(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string())
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    /// Parses the body as `T`. A parse failure is a transport-class error.
    pub fn json<T: DeserializeOwned>(&self, what: &str) -> Result<T, AppError> {
        serde_json::from_str(&self.body)
            .map_err(|e| AppError::InvalidResponse(format!("Failed to parse {}: {}", what, e)))
    }

    /// Server-supplied error message, if the body carries one.
    pub fn detail(&self) -> Option<String> {
        let wire: WireErrorDetail = serde_json::from_str(&self.body).ok()?;
        match wire.detail {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        }
    }

    /// Maps a non-2xx response onto the error taxonomy.
    pub fn into_error(self, not_found: &str) -> AppError {
        if self.is_unauthorized() {
            return AppError::Unauthorized;
        }
        let detail = self.detail();
        if self.status == StatusCode::NOT_FOUND {
            return AppError::NotFound(detail.unwrap_or_else(|| not_found.to_string()));
        }
        AppError::ServerRejection {
            status: self.status.as_u16(),
            message: detail.unwrap_or_else(|| {
                format!(
                    "HTTP {} - {}",
                    self.status.as_u16(),
                    self.status.canonical_reason().unwrap_or("Unknown error")
                )
            }),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Issues requests and returns status plus body, or a transport error.
///
/// Authorization failures come back as a normal `ApiResponse` with status 401
/// so callers can tell them apart from other non-2xx statuses.
pub trait Transport: Send + Sync {
    fn send(
        &self,
        req: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, AppError>> + Send + '_>>;
}

/// `reqwest`-backed transport.
#[derive(Clone)]
pub struct HttpTransport {
    http: reqwest::Client,
    base_url: Url,
    logging_mode: LoggingMode,
}

impl HttpTransport {
    /// Creates a transport rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the URL cannot carry path segments and
    /// `AppError::Internal` if the HTTP client fails to initialize.
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, AppError> {
        if base_url.cannot_be_a_base() {
            return Err(AppError::Config(format!(
                "Base URL cannot carry paths: {}",
                base_url.scheme()
            )));
        }
        Ok(Self {
            http: build_http_client(timeout)?,
            base_url,
            logging_mode: LoggingMode::default(),
        })
    }

    pub fn with_logging_mode(mut self, mode: LoggingMode) -> Self {
        self.logging_mode = mode;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Appends the request segments to the base URL.
    pub fn build_url(&self, segments: &[String]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Config("Invalid base URL".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn execute(&self, req: ApiRequest) -> Result<ApiResponse, AppError> {
        let url = self.build_url(&req.segments)?;
        let start = Instant::now();
        let sanitized_url = sanitize_url_for_logs(&url, self.logging_mode);
        let method = req.method.clone();

        let mut request = self.http.request(req.method, url.as_str());
        if let Some(session) = &req.session {
            let mut value = HeaderValue::from_str(&session.authorization()).map_err(|_| {
                AppError::Internal("Access token is not a valid header value".to_string())
            })?;
            value.set_sensitive(true);
            request = request.header(AUTHORIZATION, value);
        }
        request = match req.body {
            RequestBody::Empty => request,
            RequestBody::Json(value) => request.json(&value),
            RequestBody::Form(pairs) => request.form(&pairs),
            RequestBody::Files { field, blobs } => request.multipart(build_multipart(field, blobs)?),
        };

        let result = request.send().await;
        let duration_ms = start.elapsed().as_millis();

        let response = match result {
            Ok(response) => response,
            Err(_) => {
                // The raw reqwest error may echo the full URL; keep it out of logs.
                info!("[HTTP] {} {} FAILED {}ms", method, sanitized_url, duration_ms);
                return Err(AppError::ConnectionFailed(
                    "Connection to document service failed".to_string(),
                ));
            }
        };

        let status = response.status();
        info!(
            "[HTTP] {} {} {} {}ms",
            method,
            sanitized_url,
            status.as_u16(),
            duration_ms
        );

        let body = response.text().await.map_err(|_| {
            AppError::ConnectionFailed("Failed to read response body".to_string())
        })?;

        Ok(ApiResponse { status, body })
    }
}

impl Transport for HttpTransport {
    fn send(
        &self,
        req: ApiRequest,
    ) -> Pin<Box<dyn Future<Output = Result<ApiResponse, AppError>> + Send + '_>> {
        Box::pin(self.execute(req))
    }
}

fn build_multipart(field: &'static str, blobs: Vec<FileBlob>) -> Result<Form, AppError> {
    let mut form = Form::new();
    for blob in blobs {
        let (name, content_type, bytes) = blob.into_parts();
        let part = Part::bytes(bytes)
            .file_name(name)
            .mime_str(&content_type)
            .map_err(|e| {
                AppError::Internal(format!("Invalid content type {}: {}", content_type, e))
            })?;
        form = form.part(field, part);
    }
    Ok(form)
}

/// Builds the configured HTTP client.
fn build_http_client(timeout: Duration) -> Result<reqwest::Client, AppError> {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));

    reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_transport(mock_url: &str) -> HttpTransport {
        HttpTransport::new(Url::parse(mock_url).unwrap(), Duration::from_secs(5)).unwrap()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // URL Sanitization Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn sanitize_strips_scheme_and_host() {
        let url = Url::parse("http://127.0.0.1:8000/ingestion_status/abc").unwrap();

        let result = sanitize_url_for_logs(&url, LoggingMode::PathOnly);

        assert_eq!(result, "/ingestion_status/abc");
        assert!(!result.contains("127.0.0.1"));
    }

    #[test]
    fn path_and_query_redacted_redacts_sensitive_keys() {
        let url =
            Url::parse("http://example.com/login?username=admin&password=hunter2&page=2").unwrap();

        let result = sanitize_url_for_logs(&url, LoggingMode::PathAndQueryRedacted);

        assert!(result.contains("username=***"));
        assert!(result.contains("password=***"));
        assert!(result.contains("page=2"));
        assert!(!result.contains("hunter2"));
        assert!(!result.contains("admin"));
    }

    #[test]
    fn sanitize_handles_empty_query_string() {
        let url = Url::parse("http://example.com/list_documents").unwrap();

        let result = sanitize_url_for_logs(&url, LoggingMode::PathAndQueryRedacted);

        assert_eq!(result, "/list_documents");
    }

    #[test]
    fn is_sensitive_param_requires_exact_match() {
        assert!(is_sensitive_param("ACCESS_TOKEN"));
        assert!(!is_sensitive_param("tokens"));
        assert!(!is_sensitive_param("my_password"));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // URL Building Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn build_url_encodes_each_segment() {
        let transport = create_test_transport("http://127.0.0.1:8000");

        let url = transport
            .build_url(&["delete_document".to_string(), "my report/v2.pdf".to_string()])
            .unwrap();

        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:8000/delete_document/my%20report%2Fv2.pdf"
        );
    }

    #[test]
    fn build_url_keeps_base_path_prefix() {
        let transport = create_test_transport("http://example.com/api/");

        let url = transport.build_url(&["list_documents".to_string()]).unwrap();

        assert_eq!(url.as_str(), "http://example.com/api/list_documents");
    }

    #[test]
    fn new_rejects_non_base_url() {
        let result = HttpTransport::new(
            Url::parse("mailto:ops@example.com").unwrap(),
            Duration::from_secs(1),
        );
        assert!(matches!(result, Err(AppError::Config(_))));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Response Mapping Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn into_error_maps_401_to_unauthorized() {
        let response = ApiResponse::new(StatusCode::UNAUTHORIZED, r#"{"detail":"nope"}"#);
        assert!(matches!(response.into_error("x"), AppError::Unauthorized));
    }

    #[test]
    fn into_error_uses_server_detail() {
        let response = ApiResponse::new(StatusCode::BAD_REQUEST, r#"{"detail":"No files uploaded."}"#);

        match response.into_error("x") {
            AppError::ServerRejection { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "No files uploaded.");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn into_error_falls_back_to_generic_message() {
        let response = ApiResponse::new(StatusCode::BAD_GATEWAY, "<html>oops</html>");

        match response.into_error("x") {
            AppError::ServerRejection { message, .. } => {
                assert_eq!(message, "HTTP 502 - Bad Gateway");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn into_error_maps_404_with_fallback() {
        let response = ApiResponse::new(StatusCode::NOT_FOUND, "");
        match response.into_error("Task not found") {
            AppError::NotFound(msg) => assert_eq!(msg, "Task not found"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn json_parse_failure_is_transport_class() {
        let response = ApiResponse::new(StatusCode::OK, "not json");
        let err = response.json::<Vec<String>>("document list").unwrap_err();
        assert!(err.is_transport());
    }

    // ─────────────────────────────────────────────────────────────────────────
    // HttpTransport Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn send_attaches_bearer_token() {
        let mock_server = MockServer::start().await;
        let transport = create_test_transport(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/list_documents"))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!(["a.txt"])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let response = transport
            .send(ApiRequest::get(["list_documents"]).authed(&Session::bearer("test_token")))
            .await
            .unwrap();

        assert!(response.is_success());
        assert_eq!(response.json::<Vec<String>>("list").unwrap(), vec!["a.txt"]);
    }

    #[tokio::test]
    async fn send_uses_token_type_from_login() {
        let mock_server = MockServer::start().await;
        let transport = create_test_transport(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/list_documents"))
            .and(header("Authorization", "MAC test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&mock_server)
            .await;

        let response = transport
            .send(
                ApiRequest::get(["list_documents"])
                    .authed(&Session::with_type("test_token", "MAC")),
            )
            .await
            .unwrap();

        assert!(response.is_success());
    }

    #[tokio::test]
    async fn send_surfaces_401_as_status() {
        let mock_server = MockServer::start().await;
        let transport = create_test_transport(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/list_documents"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let response = transport
            .send(ApiRequest::get(["list_documents"]))
            .await
            .unwrap();

        assert!(response.is_unauthorized());
    }

    #[tokio::test]
    async fn send_maps_network_failure_to_connection_failed() {
        // Nothing listens on port 9 of localhost in test environments.
        let transport = create_test_transport("http://127.0.0.1:9");

        let result = transport.send(ApiRequest::get(["health"])).await;

        assert!(matches!(result, Err(AppError::ConnectionFailed(_))));
    }
}
