//! Ingestion endpoints: batch upload, job status, document list and delete.
//!
//! Every call here is protected and takes the `Session` to attach. Routing
//! through the auth guard is the caller's job (see `api::guard`).

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use reqwest::{Method, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use crate::api::transport::{ApiRequest, RequestBody, Transport};
use crate::error::AppError;
use crate::session::Session;
use crate::tracking::model::{JobId, StatusSnapshot};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

const UPLOAD_PATH: &str = "upload_and_ingest";
const STATUS_PATH: &str = "ingestion_status";
const LIST_PATH: &str = "list_documents";
const DELETE_PATH: &str = "delete_document";

/// Multipart field every uploaded file is sent under.
const FILES_FIELD: &str = "files";

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

// ─────────────────────────────────────────────────────────────────────────────
// FileBlob
// ─────────────────────────────────────────────────────────────────────────────

/// One file queued for submission.
#[derive(Clone)]
pub struct FileBlob {
    name: String,
    content_type: String,
    bytes: Vec<u8>,
}

impl FileBlob {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let content_type = guess_content_type(&name).to_string();
        Self {
            name,
            content_type,
            bytes: bytes.into(),
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Reads `path` from disk. The blob is named after the file's last
    /// path component.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the path has no file name or cannot
    /// be read.
    pub async fn from_path(path: &Path) -> Result<Self, AppError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                AppError::Internal(format!("Not a file path: {}", path.display()))
            })?
            .to_string();

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read {}: {}", name, e)))?;

        Ok(Self::new(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Splits the blob into `(name, content_type, bytes)` for the multipart encoder.
    pub(crate) fn into_parts(self) -> (String, String, Vec<u8>) {
        (self.name, self.content_type, self.bytes)
    }
}

impl fmt::Debug for FileBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBlob")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

fn guess_content_type(name: &str) -> &'static str {
    let ext = match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_ascii_lowercase(),
        None => return DEFAULT_CONTENT_TYPE,
    };
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "eml" => "message/rfc822",
        "epub" => "application/epub+zip",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct WireSubmitResponse {
    #[serde(default)]
    message: Option<String>,
    #[serde(alias = "jobId")]
    task_id: String,
    #[serde(default)]
    filenames: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    message: Option<String>,
}

/// Result of a successful batch submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub job_id: JobId,
    /// Names the server will report status under. These replace the local
    /// names as reconciliation keys.
    pub assigned_names: Vec<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// IngestApi
// ─────────────────────────────────────────────────────────────────────────────

/// Client for the ingestion endpoints.
#[derive(Clone)]
pub struct IngestApi {
    transport: Arc<dyn Transport>,
}

impl IngestApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Uploads a batch of files for background ingestion.
    ///
    /// # Arguments
    ///
    /// * `session` - Credential attached to the request
    /// * `blobs` - Files to upload; sent as one multipart request
    ///
    /// # Errors
    ///
    /// `Unauthorized` on 401, `ServerRejection` on any other non-2xx, and a
    /// transport-class error if the request or the response body fails.
    pub async fn submit(
        &self,
        session: &Session,
        blobs: Vec<FileBlob>,
    ) -> Result<Submission, AppError> {
        let count = blobs.len();
        let request = ApiRequest::new(Method::POST, [UPLOAD_PATH])
            .authed(session)
            .body(RequestBody::Files {
                field: FILES_FIELD,
                blobs,
            });

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(response.into_error("Upload endpoint not found"));
        }

        let wire: WireSubmitResponse = response.json("upload response")?;
        let job_id = JobId::new(wire.task_id);

        info!(
            "[SUBMIT] Accepted {} file(s) as job {}",
            count,
            job_id.redacted()
        );
        if let Some(message) = &wire.message {
            debug!("[SUBMIT] Server message: {}", message);
        }

        Ok(Submission {
            job_id,
            assigned_names: wire.filenames,
        })
    }

    /// Fetches the current status snapshot of a job.
    ///
    /// # Errors
    ///
    /// `NotFound` when the server no longer knows the job, `Unauthorized` on
    /// 401, transport-class errors otherwise.
    pub async fn status(
        &self,
        session: &Session,
        job_id: &JobId,
    ) -> Result<StatusSnapshot, AppError> {
        let request =
            ApiRequest::get([STATUS_PATH, job_id.as_str()]).authed(session);

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(response.into_error("Task ID not found."));
        }

        let snapshot: StatusSnapshot = response.json("ingestion status")?;
        debug!(
            "[POLL] Job {} reported {} with {} file(s)",
            job_id.redacted(),
            snapshot.status,
            snapshot.files.len()
        );
        Ok(snapshot)
    }

    /// Fetches the authoritative list of ingested document names.
    pub async fn list(&self, session: &Session) -> Result<Vec<String>, AppError> {
        let request = ApiRequest::get([LIST_PATH]).authed(session);

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(response.into_error("Document list not found"));
        }

        response.json("document list")
    }

    /// Deletes one document by name. The name travels as a single encoded
    /// path segment.
    ///
    /// Returns the server's confirmation message, if any.
    pub async fn delete(&self, session: &Session, name: &str) -> Result<Option<String>, AppError> {
        let request = ApiRequest::new(Method::DELETE, [DELETE_PATH, name]).authed(session);

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(response.into_error(&format!("Document '{}' not found", name)));
        }

        info!("[DOCS] Deleted document {}", name);
        // The confirmation body is informational; an unexpected shape is not a failure.
        if response.status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        Ok(serde_json::from_str::<WireMessage>(&response.body)
            .ok()
            .and_then(|m| m.message))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Shortens an identifier for logs.
pub(crate) fn redact_id(id: &str) -> String {
    match id.char_indices().nth(8) {
        Some((idx, _)) => format!("{}...", &id[..idx]),
        None => id.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::transport::HttpTransport;
    use crate::tracking::model::Status;
    use std::io::Write;
    use std::time::Duration;
    use url::Url;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_api(mock_url: &str) -> IngestApi {
        let transport =
            HttpTransport::new(Url::parse(mock_url).unwrap(), Duration::from_secs(5)).unwrap();
        IngestApi::new(Arc::new(transport))
    }

    fn test_session() -> Session {
        Session::bearer("test_token")
    }

    // ─────────────────────────────────────────────────────────────────────────
    // FileBlob Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[test]
    fn content_type_guessed_from_extension() {
        assert_eq!(FileBlob::new("a.PDF", vec![]).content_type(), "application/pdf");
        assert_eq!(FileBlob::new("notes.txt", vec![]).content_type(), "text/plain");
        assert_eq!(
            FileBlob::new("README", vec![]).content_type(),
            "application/octet-stream"
        );
    }

    #[test]
    fn debug_omits_contents() {
        let blob = FileBlob::new("a.txt", b"top secret".to_vec());
        let output = format!("{:?}", blob);
        assert!(!output.contains("top secret"));
        assert!(output.contains("len: 10"));
    }

    #[tokio::test]
    async fn from_path_reads_file() {
        let mut temp = tempfile::Builder::new().suffix(".md").tempfile().unwrap();
        temp.write_all(b"# heading").unwrap();

        let blob = FileBlob::from_path(temp.path()).await.unwrap();

        assert_eq!(blob.len(), 9);
        assert_eq!(blob.content_type(), "text/markdown");
        assert!(blob.name().ends_with(".md"));
    }

    #[tokio::test]
    async fn from_path_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileBlob::from_path(&dir.path().join("missing.txt")).await;
        assert!(matches!(result, Err(AppError::Internal(_))));
    }

    #[test]
    fn redact_id_truncates_long_ids() {
        assert_eq!(redact_id("1b2c3d4e-5f60-7182"), "1b2c3d4e...");
        assert_eq!(redact_id("short"), "short");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Submit Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn submit_returns_job_and_assigned_names() {
        let mock_server = MockServer::start().await;
        let api = create_test_api(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/upload_and_ingest"))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "message": "Files uploaded. Ingestion started in background.",
                "task_id": "job-123",
                "filenames": ["a.txt", "b (1).txt"]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let submission = api
            .submit(
                &test_session(),
                vec![FileBlob::new("a.txt", b"a".to_vec()), FileBlob::new("b.txt", b"b".to_vec())],
            )
            .await
            .unwrap();

        assert_eq!(submission.job_id.as_str(), "job-123");
        assert_eq!(submission.assigned_names, vec!["a.txt", "b (1).txt"]);
    }

    #[tokio::test]
    async fn submit_accepts_job_id_alias() {
        let mock_server = MockServer::start().await;
        let api = create_test_api(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/upload_and_ingest"))
            .respond_with(ResponseTemplate::new(202).set_body_json(serde_json::json!({
                "jobId": "J1",
                "filenames": ["a.txt"]
            })))
            .mount(&mock_server)
            .await;

        let submission = api
            .submit(&test_session(), vec![FileBlob::new("a.txt", b"a".to_vec())])
            .await
            .unwrap();

        assert_eq!(submission.job_id.as_str(), "J1");
    }

    #[tokio::test]
    async fn submit_surfaces_server_message() {
        let mock_server = MockServer::start().await;
        let api = create_test_api(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/upload_and_ingest"))
            .respond_with(ResponseTemplate::new(500).set_body_json(serde_json::json!({
                "detail": "Failed to process files: disk full"
            })))
            .mount(&mock_server)
            .await;

        let err = api
            .submit(&test_session(), vec![FileBlob::new("a.txt", b"a".to_vec())])
            .await
            .unwrap_err();

        match err {
            AppError::ServerRejection { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "Failed to process files: disk full");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn submit_401_is_unauthorized() {
        let mock_server = MockServer::start().await;
        let api = create_test_api(&mock_server.uri());

        Mock::given(method("POST"))
            .and(path("/upload_and_ingest"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "detail": "Could not validate credentials"
            })))
            .mount(&mock_server)
            .await;

        let err = api
            .submit(&test_session(), vec![FileBlob::new("a.txt", b"a".to_vec())])
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Status / List / Delete Tests
    // ─────────────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn status_parses_snapshot() {
        let mock_server = MockServer::start().await;
        let api = create_test_api(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/ingestion_status/job-123"))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "task_id": "job-123",
                "status": "IN_PROGRESS",
                "files": [
                    {"filename": "a.txt", "status": "IN_PROGRESS", "progress": 40},
                    {"filename": "b.txt", "status": "PENDING"}
                ]
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let snapshot = api
            .status(&test_session(), &JobId::new("job-123"))
            .await
            .unwrap();

        assert_eq!(snapshot.status, Status::InProgress);
        assert_eq!(snapshot.files.len(), 2);
        assert_eq!(snapshot.files[0].name, "a.txt");
        assert_eq!(snapshot.files[0].progress, Some(40));
        assert_eq!(snapshot.files[1].progress, None);
    }

    #[tokio::test]
    async fn status_404_is_not_found() {
        let mock_server = MockServer::start().await;
        let api = create_test_api(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/ingestion_status/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "detail": "Task ID not found."
            })))
            .mount(&mock_server)
            .await;

        let err = api
            .status(&test_session(), &JobId::new("gone"))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::NotFound(ref m) if m == "Task ID not found."));
    }

    #[tokio::test]
    async fn status_with_unknown_status_is_invalid_response() {
        let mock_server = MockServer::start().await;
        let api = create_test_api(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/ingestion_status/job-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "status": "EXPLODED",
                "files": []
            })))
            .mount(&mock_server)
            .await;

        let err = api
            .status(&test_session(), &JobId::new("job-1"))
            .await
            .unwrap_err();

        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn list_returns_names() {
        let mock_server = MockServer::start().await;
        let api = create_test_api(&mock_server.uri());

        Mock::given(method("GET"))
            .and(path("/list_documents"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!(["a.txt", "b.pdf"])),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        let names = api.list(&test_session()).await.unwrap();
        assert_eq!(names, vec!["a.txt", "b.pdf"]);
    }

    #[tokio::test]
    async fn delete_encodes_name_as_single_segment() {
        let mock_server = MockServer::start().await;
        let api = create_test_api(&mock_server.uri());

        Mock::given(method("DELETE"))
            .and(path("/delete_document/my%20file.txt"))
            .and(header("Authorization", "Bearer test_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "message": "Document 'my file.txt' and its embeddings successfully deleted."
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        let message = api.delete(&test_session(), "my file.txt").await.unwrap();
        assert!(message.unwrap().contains("successfully deleted"));
    }

    #[tokio::test]
    async fn delete_missing_document_is_not_found() {
        let mock_server = MockServer::start().await;
        let api = create_test_api(&mock_server.uri());

        Mock::given(method("DELETE"))
            .and(path("/delete_document/nope.txt"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "detail": "Document 'nope.txt' not found in source directory."
            })))
            .mount(&mock_server)
            .await;

        let err = api.delete(&test_session(), "nope.txt").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
