//! Bearer credentials for the chat gateway and the admin API.
//!
//! Clients never read tokens from ambient storage. They are handed a
//! `CredentialProvider`, which is either a fixed value or the on-disk
//! `TokenStore` written by the login command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BerrybotError, Result};

/// Source of the bearer token attached to outbound requests.
pub trait CredentialProvider: Send + Sync {
    /// Current bearer token, if any. `None` is not an error: callers still
    /// connect and let the server reject them.
    fn bearer_token(&self) -> Option<String>;
}

impl<T: CredentialProvider + ?Sized> CredentialProvider for Arc<T> {
    fn bearer_token(&self) -> Option<String> {
        (**self).bearer_token()
    }
}

/// A fixed token, or none at all.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials(Option<String>);

impl StaticCredentials {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

impl CredentialProvider for StaticCredentials {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Tokens issued by the user directory after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub id_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

/// JSON file holding the current `TokenSet`.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored tokens. A missing file means "not logged in".
    pub fn load(&self) -> Result<Option<TokenSet>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let tokens = serde_json::from_str(&contents).map_err(|e| {
                    BerrybotError::Credentials(format!(
                        "corrupt token file {}: {}",
                        self.path.display(),
                        e
                    ))
                })?;
                Ok(Some(tokens))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist tokens, restricting the file to its owner.
    pub fn save(&self, tokens: &TokenSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(tokens)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }
        tracing::info!(path = %self.path.display(), "Tokens saved");
        Ok(())
    }

    /// Forget the stored tokens. Clearing an empty store is not an error.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::info!(path = %self.path.display(), "Tokens removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

impl CredentialProvider for TokenStore {
    fn bearer_token(&self) -> Option<String> {
        match self.load() {
            Ok(tokens) => tokens.map(|t| t.access_token),
            Err(e) => {
                tracing::warn!(error = %e, "Ignoring unreadable token store");
                None
            }
        }
    }
}
