//! Wire types shared by the clients and the gateway.
//!
//! Chat frames travel as single JSON text messages over the WebSocket; the
//! admin types are the JSON bodies of the file and analytics endpoints.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::types::Timeframe;

/// Route key the gateway dispatches chat requests on.
pub const SEND_MESSAGE_ACTION: &str = "sendMessage";

// =============================================================================
// Chat frames
// =============================================================================

/// Outbound chat request frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequestFrame {
    pub action: String,
    pub querytext: String,
    pub session_id: String,
    pub location: String,
    /// Set when re-sending a query after the user supplied an email address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Correlates the response with the placeholder that awaits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Uuid>,
}

impl ChatRequestFrame {
    pub fn send_message(
        querytext: impl Into<String>,
        session_id: Uuid,
        location: impl Into<String>,
        request_id: Uuid,
    ) -> Self {
        Self {
            action: SEND_MESSAGE_ACTION.to_string(),
            querytext: querytext.into(),
            session_id: session_id.to_string(),
            location: location.into(),
            email: None,
            request_id: Some(request_id),
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }
}

/// Inbound chat response frame.
///
/// Only `responsetext` is required by the router; a non-string value there
/// fails the frame. The other fields are optional extensions some
/// deployments send, and a value of the wrong type reads as absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatResponseFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responsetext: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub request_id: Option<Uuid>,
    #[serde(
        default,
        deserialize_with = "lenient_flag",
        skip_serializing_if = "std::ops::Not::not"
    )]
    pub requires_email: bool,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub email_status: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).ok())
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient::<D, bool>(deserializer)?.unwrap_or(false))
}

impl ChatResponseFrame {
    pub fn answer(text: impl Into<String>, request_id: Option<Uuid>) -> Self {
        Self {
            responsetext: Some(text.into()),
            request_id,
            ..Self::default()
        }
    }

    pub fn failure(message: impl Into<String>, request_id: Option<Uuid>) -> Self {
        Self {
            error: Some(message.into()),
            request_id,
            ..Self::default()
        }
    }
}

// =============================================================================
// Admin file API
// =============================================================================

/// An HTTP method/endpoint pair advertised by the file listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointRef {
    pub method: String,
    pub endpoint: String,
}

impl EndpointRef {
    pub fn new(method: &str, endpoint: impl Into<String>) -> Self {
        Self {
            method: method.to_string(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileActions {
    pub download: EndpointRef,
    pub delete: EndpointRef,
}

/// One document in the knowledge-base bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub key: String,
    pub size: u64,
    /// RFC 3339 timestamp.
    pub last_modified: String,
    pub actions: FileActions,
}

/// Body of `GET /files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListing {
    pub files: Vec<FileEntry>,
    pub upload: EndpointRef,
    pub sync: EndpointRef,
}

/// Body of `POST /files`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFileRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    /// Base64-encoded document bytes.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadFileResponse {
    pub message: String,
    pub file: UploadedFile,
    pub kb_sync: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFileResponse {
    pub message: String,
    pub deleted_file: String,
    pub kb_sync: String,
}

/// Outcome of starting a knowledge-base ingestion job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDetails {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
    pub message: String,
    pub details: SyncDetails,
}

/// Body of `POST /email/inbound`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEmail {
    pub from: String,
    #[serde(default)]
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundEmailResponse {
    pub message: String,
    pub stored_as: String,
    pub kb_sync: SyncDetails,
}

// =============================================================================
// Analytics
// =============================================================================

/// Body of `GET /analytics?timeframe=...`.
///
/// Every field defaults so that sparse responses still deserialize.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    #[serde(default)]
    pub timeframe: Timeframe,
    #[serde(default)]
    pub start_date: String,
    #[serde(default)]
    pub end_date: String,
    #[serde(default)]
    pub user_count: u64,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub categories: HashMap<String, u64>,
}
