//! Username/password login against the hosted user directory.
//!
//! Speaks the directory's JSON RPC dialect: one POST per call, the operation
//! named in `X-Amz-Target`. Issued tokens are persisted in a `TokenStore`,
//! which then serves as the `CredentialProvider` for the other clients.

use std::collections::HashMap;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use berrybot_core::config::{expand_home, AuthConfig};
use berrybot_core::credentials::{TokenSet, TokenStore};

use crate::error::AdminError;

const INITIATE_AUTH_TARGET: &str = "AWSCognitoIdentityProviderService.InitiateAuth";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthRequest<'a> {
    auth_flow: &'a str,
    client_id: &'a str,
    auth_parameters: HashMap<&'a str, &'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    #[serde(default)]
    authentication_result: Option<AuthenticationResult>,
    #[serde(default)]
    challenge_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    access_token: String,
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DirectoryError {
    #[serde(rename = "__type", default)]
    kind: Option<String>,
    #[serde(alias = "Message", default)]
    message: Option<String>,
}

/// Login, refresh and logout against the user directory.
pub struct UserDirectoryAuth {
    http: Client,
    endpoint: String,
    client_id: String,
    store: TokenStore,
}

impl UserDirectoryAuth {
    pub fn new(endpoint: impl Into<String>, client_id: impl Into<String>, store: TokenStore) -> Self {
        Self {
            http: Client::new(),
            endpoint: endpoint.into(),
            client_id: client_id.into(),
            store,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.endpoint.clone(),
            config.client_id.clone(),
            TokenStore::new(expand_home(&config.token_file)),
        )
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Exchange a username and password for a token set and persist it.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenSet, AdminError> {
        if username.is_empty() || password.is_empty() {
            return Err(AdminError::Authentication(
                "username and password are required".to_string(),
            ));
        }
        let params = HashMap::from([("USERNAME", username), ("PASSWORD", password)]);
        let tokens = self.initiate_auth("USER_PASSWORD_AUTH", params).await?;
        self.store.save(&tokens)?;
        tracing::info!(username = %username, "Logged in");
        Ok(tokens)
    }

    /// Renew the access token with the stored refresh token.
    ///
    /// The directory does not rotate the refresh token, so the stored one is
    /// kept when the response omits it.
    pub async fn refresh(&self) -> Result<TokenSet, AdminError> {
        let current = self.store.load()?.ok_or(AdminError::NotLoggedIn)?;
        let refresh_token = current.refresh_token.clone().ok_or_else(|| {
            AdminError::Authentication("no refresh token stored; log in again".to_string())
        })?;

        let params = HashMap::from([("REFRESH_TOKEN", refresh_token.as_str())]);
        let mut tokens = self.initiate_auth("REFRESH_TOKEN_AUTH", params).await?;
        if tokens.refresh_token.is_none() {
            tokens.refresh_token = Some(refresh_token);
        }
        self.store.save(&tokens)?;
        tracing::info!("Access token refreshed");
        Ok(tokens)
    }

    /// Forget the stored tokens.
    pub fn logout(&self) -> Result<(), AdminError> {
        self.store.clear()?;
        tracing::info!("Logged out");
        Ok(())
    }

    async fn initiate_auth(
        &self,
        flow: &str,
        auth_parameters: HashMap<&str, &str>,
    ) -> Result<TokenSet, AdminError> {
        if self.client_id.is_empty() {
            return Err(AdminError::Config("auth.client_id is not set".to_string()));
        }

        let request = InitiateAuthRequest {
            auth_flow: flow,
            client_id: &self.client_id,
            auth_parameters,
        };
        let body = serde_json::to_vec(&request)?;
        let resp = self
            .http
            .post(&self.endpoint)
            .header("X-Amz-Target", INITIATE_AUTH_TARGET)
            .header("Content-Type", CONTENT_TYPE)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            let err = serde_json::from_str::<DirectoryError>(&text).ok();
            let kind = err.as_ref().and_then(|e| e.kind.clone()).unwrap_or_default();
            let message = err
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("user directory returned {}", status));
            tracing::warn!(status = status.as_u16(), kind = %kind, "Login rejected");
            return Err(AdminError::Authentication(message));
        }

        let parsed: InitiateAuthResponse = serde_json::from_str(&text)?;
        match (parsed.authentication_result, parsed.challenge_name) {
            (Some(result), _) => Ok(TokenSet {
                access_token: result.access_token,
                id_token: result.id_token,
                refresh_token: result.refresh_token,
            }),
            (None, Some(challenge)) => Err(AdminError::Authentication(format!(
                "unsupported challenge: {}",
                challenge
            ))),
            (None, None) => Err(AdminError::Authentication(
                "user directory returned no tokens".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_auth_request_shape() {
        let request = InitiateAuthRequest {
            auth_flow: "USER_PASSWORD_AUTH",
            client_id: "client-1",
            auth_parameters: HashMap::from([("USERNAME", "admin")]),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["AuthFlow"], "USER_PASSWORD_AUTH");
        assert_eq!(json["ClientId"], "client-1");
        assert_eq!(json["AuthParameters"]["USERNAME"], "admin");
    }

    #[test]
    fn test_initiate_auth_response_parses_tokens() {
        let raw = r#"{"AuthenticationResult":{"AccessToken":"a","IdToken":"i","RefreshToken":"r","ExpiresIn":3600,"TokenType":"Bearer"},"ChallengeParameters":{}}"#;
        let parsed: InitiateAuthResponse = serde_json::from_str(raw).unwrap();
        let result = parsed.authentication_result.unwrap();
        assert_eq!(result.access_token, "a");
        assert_eq!(result.refresh_token.as_deref(), Some("r"));
    }

    #[tokio::test]
    async fn test_login_rejects_blank_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let auth = UserDirectoryAuth::new(
            "http://127.0.0.1:9/",
            "client-1",
            TokenStore::new(dir.path().join("tokens.json")),
        );
        assert!(matches!(
            auth.login("", "pw").await,
            Err(AdminError::Authentication(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_requires_login() {
        let dir = tempfile::tempdir().unwrap();
        let auth = UserDirectoryAuth::new(
            "http://127.0.0.1:9/",
            "client-1",
            TokenStore::new(dir.path().join("tokens.json")),
        );
        assert!(matches!(auth.refresh().await, Err(AdminError::NotLoggedIn)));
    }

    #[test]
    fn test_logout_clears_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        store
            .save(&TokenSet {
                access_token: "a".to_string(),
                id_token: "i".to_string(),
                refresh_token: None,
            })
            .unwrap();
        let auth = UserDirectoryAuth::new("http://127.0.0.1:9/", "c", store);
        auth.logout().unwrap();
        assert!(auth.store().load().unwrap().is_none());
        // Second logout is a no-op.
        auth.logout().unwrap();
    }
}
