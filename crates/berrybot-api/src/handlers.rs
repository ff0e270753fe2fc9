//! Route handlers for the admin REST API.

use axum::extract::{Query, RawPathParams, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};

use berrybot_core::protocol::{
    DeleteFileResponse, EndpointRef, FileActions, FileEntry, FileListing, InboundEmail,
    InboundEmailResponse, SyncDetails, SyncResponse, UploadFileRequest, UploadFileResponse,
    UploadedFile, AnalyticsReport,
};
use berrybot_core::types::Timeframe;

use crate::documents::validate_key;
use crate::error::ApiError;
use crate::state::AppState;

const SYNC_INITIATED: &str = "Knowledge base sync initiated";

// =============================================================================
// Query parameter types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct AnalyticsParams {
    pub timeframe: Option<String>,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub documents: u64,
    pub logged_queries: u64,
}

// =============================================================================
// Health
// =============================================================================

/// GET /health
pub async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let documents = state.documents.list()?.len() as u64;
    Ok(Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        documents,
        logged_queries: state.session_log.len() as u64,
    }))
}

// =============================================================================
// Files
// =============================================================================

/// Endpoint path for one document, with the key form-encoded.
pub fn file_endpoint(key: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
    format!("/files/{}", encoded)
}

/// Decode the `{key}` path segment. `+` means space, `%2F` a slash.
fn document_key(params: &RawPathParams) -> Result<String, ApiError> {
    let raw = params
        .iter()
        .find(|(name, _)| *name == "key")
        .map(|(_, value)| value)
        .unwrap_or_default();
    let spaced = raw.replace('+', " ");
    let key = percent_decode_str(&spaced)
        .decode_utf8()
        .map_err(|_| ApiError::BadRequest("File key is not valid UTF-8".to_string()))?
        .into_owned();
    if key.is_empty() {
        return Err(ApiError::BadRequest("File key not provided".to_string()));
    }
    validate_key(&key).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    Ok(key)
}

fn start_sync(state: &AppState, reason: &str) -> SyncDetails {
    let count = match state.documents.list() {
        Ok(docs) => docs.len(),
        Err(e) => {
            tracing::warn!(error = %e, "Could not count documents for sync");
            0
        }
    };
    state.knowledge_base.start_ingestion(reason, count)
}

/// GET /files
pub async fn list_files(State(state): State<AppState>) -> Result<Json<FileListing>, ApiError> {
    let files = state
        .documents
        .list()?
        .into_iter()
        .map(|doc| {
            let endpoint = file_endpoint(&doc.key);
            FileEntry {
                key: doc.key,
                size: doc.size,
                last_modified: doc.last_modified.to_rfc3339(),
                actions: FileActions {
                    download: EndpointRef::new("GET", endpoint.clone()),
                    delete: EndpointRef::new("DELETE", endpoint),
                },
            }
        })
        .collect();

    Ok(Json(FileListing {
        files,
        upload: EndpointRef::new("POST", "/files"),
        sync: EndpointRef::new("POST", "/sync"),
    }))
}

/// POST /files - store a base64 document and re-index.
pub async fn upload_file(
    State(state): State<AppState>,
    Json(body): Json<UploadFileRequest>,
) -> Result<Json<UploadFileResponse>, ApiError> {
    let name = match body.filename.as_deref().map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("doc_{}", Utc::now().format("%Y%m%d_%H%M%S")),
    };
    validate_key(&name).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let bytes = BASE64
        .decode(body.content.trim())
        .map_err(|e| ApiError::BadRequest(format!("content is not valid base64: {}", e)))?;

    state
        .documents
        .put(&name, &bytes, body.content_type.as_deref())?;
    start_sync(&state, "upload");

    Ok(Json(UploadFileResponse {
        message: "File uploaded successfully".to_string(),
        file: UploadedFile {
            url: file_endpoint(&name),
            name,
        },
        kb_sync: SYNC_INITIATED.to_string(),
    }))
}

/// GET /files/{key} - raw document bytes.
pub async fn download_file(
    State(state): State<AppState>,
    params: RawPathParams,
) -> Result<Response, ApiError> {
    let key = document_key(&params)?;
    let Some((bytes, content_type)) = state.documents.get(&key)? else {
        return Err(ApiError::NotFound(format!("File \"{}\" not found", key)));
    };
    let file_name = key.rsplit('/').next().unwrap_or(&key).replace('"', "");
    Ok((
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// DELETE /files/{key}
pub async fn delete_file(
    State(state): State<AppState>,
    params: RawPathParams,
) -> Result<Json<DeleteFileResponse>, ApiError> {
    let key = document_key(&params)?;
    if !state.documents.delete(&key)? {
        return Err(ApiError::NotFound(format!("File \"{}\" not found", key)));
    }
    start_sync(&state, "delete");
    Ok(Json(DeleteFileResponse {
        message: "File deleted successfully".to_string(),
        deleted_file: key,
        kb_sync: SYNC_INITIATED.to_string(),
    }))
}

/// POST /sync - manual re-index.
pub async fn sync(State(state): State<AppState>) -> Json<SyncResponse> {
    Json(SyncResponse {
        message: SYNC_INITIATED.to_string(),
        details: start_sync(&state, "manual"),
    })
}

// =============================================================================
// Analytics
// =============================================================================

/// GET /analytics?timeframe=today|weekly|monthly|yearly
pub async fn analytics(
    State(state): State<AppState>,
    Query(params): Query<AnalyticsParams>,
) -> Result<Json<AnalyticsReport>, ApiError> {
    let raw = params
        .timeframe
        .unwrap_or_else(|| "today".to_string())
        .to_lowercase();
    let timeframe: Timeframe = raw.parse()?;
    let report = state.session_log.aggregate(timeframe, Utc::now())?;
    Ok(Json(report))
}

// =============================================================================
// Email replies
// =============================================================================

/// Document key for an admin email reply.
fn reply_key(subject: &str) -> String {
    let slug: String = subject
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .take(40)
        .collect();
    let slug = slug.trim_matches('_');
    let slug = if slug.is_empty() { "reply" } else { slug };
    let unique = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "email-replies/{}_{}_{}.txt",
        Utc::now().format("%Y%m%d_%H%M%S"),
        &unique[..8],
        slug
    )
}

/// POST /email/inbound - add an admin's emailed answer to the knowledge base.
pub async fn email_inbound(
    State(state): State<AppState>,
    Json(email): Json<InboundEmail>,
) -> Result<Json<InboundEmailResponse>, ApiError> {
    if email.from.trim().is_empty() {
        return Err(ApiError::BadRequest("from is required".to_string()));
    }
    if email.body.trim().is_empty() {
        return Err(ApiError::BadRequest("body is required".to_string()));
    }

    let key = reply_key(&email.subject);
    let document = format!(
        "From: {}\nSubject: {}\n\n{}\n",
        email.from.trim(),
        email.subject.trim(),
        email.body.trim()
    );
    state
        .documents
        .put(&key, document.as_bytes(), Some("text/plain"))?;
    tracing::info!(from = %email.from, key = %key, "Email reply ingested");

    Ok(Json(InboundEmailResponse {
        message: "Email reply stored".to_string(),
        kb_sync: start_sync(&state, "email"),
        stored_as: key,
    }))
}
