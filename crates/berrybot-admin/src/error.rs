use berrybot_core::error::BerrybotError;

/// Errors from the admin client and the user-directory login.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    #[error("not logged in")]
    NotLoggedIn,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("credential error: {0}")]
    Credentials(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AdminError {
    /// True when the caller should log in again.
    pub fn needs_login(&self) -> bool {
        matches!(self, AdminError::NotLoggedIn | AdminError::Unauthorized(_))
    }
}

impl From<BerrybotError> for AdminError {
    fn from(err: BerrybotError) -> Self {
        match err {
            BerrybotError::Config(msg) => AdminError::Config(msg),
            BerrybotError::Serialization(msg) => AdminError::Serialization(msg),
            other => AdminError::Credentials(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AdminError {
    fn from(err: reqwest::Error) -> Self {
        AdminError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for AdminError {
    fn from(err: serde_json::Error) -> Self {
        AdminError::Serialization(err.to_string())
    }
}
