//! REST client for the admin file and analytics endpoints.

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

use berrybot_core::config::GatewayConfig;
use berrybot_core::credentials::CredentialProvider;
use berrybot_core::protocol::{
    AnalyticsReport, DeleteFileResponse, FileListing, SyncResponse, UploadFileRequest,
    UploadFileResponse,
};
use berrybot_core::types::Timeframe;

use crate::error::AdminError;

/// Error body returned by the API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Authenticated client for the document and analytics endpoints.
///
/// Every call attaches `Authorization: Bearer <token>` taken from the
/// credential provider at call time. Without a token, calls fail with
/// `AdminError::NotLoggedIn` before any request is made.
#[derive(Clone)]
pub struct AdminClient {
    http: Client,
    api_url: Url,
    analytics_url: Url,
    credentials: Arc<dyn CredentialProvider>,
}

impl AdminClient {
    pub fn new(
        api_url: &str,
        analytics_url: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, AdminError> {
        Ok(Self {
            http: Client::new(),
            api_url: parse_http_url(api_url)?,
            analytics_url: parse_http_url(analytics_url)?,
            credentials,
        })
    }

    pub fn from_config(
        config: &GatewayConfig,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Result<Self, AdminError> {
        Self::new(&config.api_url, &config.analytics_url, credentials)
    }

    /// List stored documents.
    pub async fn list_files(&self) -> Result<FileListing, AdminError> {
        let url = self.endpoint(&["files"])?;
        let resp = self.authorized(self.http.get(url))?.send().await?;
        read_json(resp).await
    }

    /// Upload a document. The server picks a name when `filename` is `None`.
    pub async fn upload_file(
        &self,
        filename: Option<&str>,
        content_type: Option<&str>,
        bytes: &[u8],
    ) -> Result<UploadFileResponse, AdminError> {
        let body = UploadFileRequest {
            filename: filename.map(str::to_string),
            content_type: content_type.map(str::to_string),
            content: BASE64.encode(bytes),
        };
        let url = self.endpoint(&["files"])?;
        tracing::debug!(filename = ?filename, size = bytes.len(), "Uploading document");
        let resp = self
            .authorized(self.http.post(url))?
            .json(&body)
            .send()
            .await?;
        read_json(resp).await
    }

    /// Fetch the raw bytes of one document.
    pub async fn download_file(&self, key: &str) -> Result<Vec<u8>, AdminError> {
        let url = self.file_endpoint(key)?;
        let resp = check(self.authorized(self.http.get(url))?.send().await?).await?;
        Ok(resp.bytes().await?.to_vec())
    }

    pub async fn delete_file(&self, key: &str) -> Result<DeleteFileResponse, AdminError> {
        let url = self.file_endpoint(key)?;
        let resp = self.authorized(self.http.delete(url))?.send().await?;
        read_json(resp).await
    }

    /// Start a knowledge-base ingestion job.
    pub async fn sync_knowledge_base(&self) -> Result<SyncResponse, AdminError> {
        let url = self.endpoint(&["sync"])?;
        let resp = self.authorized(self.http.post(url))?.send().await?;
        read_json(resp).await
    }

    pub async fn fetch_analytics(
        &self,
        timeframe: Timeframe,
    ) -> Result<AnalyticsReport, AdminError> {
        let mut url = self.analytics_url.clone();
        url.query_pairs_mut()
            .append_pair("timeframe", timeframe.as_str());
        let resp = self.authorized(self.http.get(url))?.send().await?;
        read_json(resp).await
    }

    fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, AdminError> {
        let token = self
            .credentials
            .bearer_token()
            .ok_or(AdminError::NotLoggedIn)?;
        Ok(builder.bearer_auth(token))
    }

    /// `api_url` with `segments` appended, each percent-encoded on its own.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, AdminError> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|_| AdminError::Config(format!("API URL '{}' cannot be a base", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Endpoint of one document. The key is form-encoded, so `/` and `+`
    /// inside it survive the trip.
    fn file_endpoint(&self, key: &str) -> Result<Url, AdminError> {
        let mut url = self.endpoint(&["files"])?;
        let encoded: String = url::form_urlencoded::byte_serialize(key.as_bytes()).collect();
        let path = format!("{}/{}", url.path(), encoded);
        url.set_path(&path);
        Ok(url)
    }
}

fn parse_http_url(raw: &str) -> Result<Url, AdminError> {
    let url = Url::parse(raw).map_err(|e| AdminError::Config(format!("invalid URL '{}': {}", raw, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(AdminError::Config(format!(
            "unsupported URL scheme '{}' in '{}'",
            other, raw
        ))),
    }
}

/// Map non-success statuses to `AdminError`.
async fn check(resp: Response) -> Result<Response, AdminError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let text = resp.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.message.or(body.error))
        .unwrap_or(text);
    tracing::warn!(status = status.as_u16(), message = %message, "Admin API request failed");

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AdminError::Unauthorized(message),
        StatusCode::NOT_FOUND => AdminError::NotFound(message),
        other => AdminError::Api {
            status: other.as_u16(),
            message,
        },
    })
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, AdminError> {
    let resp = check(resp).await?;
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use berrybot_core::credentials::StaticCredentials;

    fn client(api_url: &str) -> AdminClient {
        AdminClient::new(
            api_url,
            "http://127.0.0.1:3040/analytics",
            Arc::new(StaticCredentials::new("t")),
        )
        .unwrap()
    }

    #[test]
    fn test_file_endpoint_encodes_keys() {
        let c = client("http://127.0.0.1:3040");
        let url = c.file_endpoint("email-replies/re: pH+.txt").unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:3040/files/email-replies%2Fre%3A+pH%2B.txt"
        );
    }

    #[test]
    fn test_endpoint_keeps_stage_prefix() {
        let c = client("https://abc.execute-api.us-west-2.amazonaws.com/prod/");
        let url = c.endpoint(&["sync"]).unwrap();
        assert_eq!(
            url.as_str(),
            "https://abc.execute-api.us-west-2.amazonaws.com/prod/sync"
        );
    }

    #[test]
    fn test_rejects_non_http_urls() {
        let creds: Arc<dyn CredentialProvider> = Arc::new(StaticCredentials::anonymous());
        assert!(AdminClient::new("ws://x", "http://x", creds.clone()).is_err());
        assert!(AdminClient::new("http://x", "nope", creds).is_err());
    }

    #[tokio::test]
    async fn test_missing_token_fails_before_request() {
        let c = AdminClient::new(
            "http://127.0.0.1:9",
            "http://127.0.0.1:9/analytics",
            Arc::new(StaticCredentials::anonymous()),
        )
        .unwrap();
        assert!(matches!(c.list_files().await, Err(AdminError::NotLoggedIn)));
        assert!(matches!(
            c.fetch_analytics(Timeframe::Weekly).await,
            Err(AdminError::NotLoggedIn)
        ));
    }
}
