use thiserror::Error;

/// Top-level error type for Berrybot.
///
/// Subsystem crates define their own error types and implement
/// `From<BerrybotError>` so that `?` works across crate boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BerrybotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Credential error: {0}")]
    Credentials(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Agent error: {0}")]
    Agent(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid timeframe: {0}")]
    InvalidTimeframe(String),
}

impl From<toml::de::Error> for BerrybotError {
    fn from(err: toml::de::Error) -> Self {
        BerrybotError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for BerrybotError {
    fn from(err: toml::ser::Error) -> Self {
        BerrybotError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for BerrybotError {
    fn from(err: serde_json::Error) -> Self {
        BerrybotError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Berrybot operations.
pub type Result<T> = std::result::Result<T, BerrybotError>;
