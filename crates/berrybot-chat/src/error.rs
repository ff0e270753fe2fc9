//! Error types for the chat surface.

use berrybot_core::error::BerrybotError;

/// Errors from the chat client.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("message cannot be empty")]
    EmptyMessage,
    #[error("gateway error: {0}")]
    Gateway(String),
    #[error("connection closed before the request was sent")]
    ConnectionClosed,
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("session state unavailable: {0}")]
    State(String),
}

impl From<BerrybotError> for ChatError {
    fn from(err: BerrybotError) -> Self {
        match err {
            BerrybotError::Serialization(msg) => ChatError::Serialization(msg),
            other => ChatError::Gateway(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_error_display() {
        assert_eq!(ChatError::EmptyMessage.to_string(), "message cannot be empty");
        assert_eq!(
            ChatError::Gateway("refused".to_string()).to_string(),
            "gateway error: refused"
        );
        assert_eq!(
            ChatError::ConnectionClosed.to_string(),
            "connection closed before the request was sent"
        );
        assert_eq!(
            ChatError::State("lock poisoned".to_string()).to_string(),
            "session state unavailable: lock poisoned"
        );
    }

    #[test]
    fn test_chat_error_from_core_error() {
        let err: ChatError = BerrybotError::Gateway("down".to_string()).into();
        assert!(matches!(err, ChatError::Gateway(_)));
        assert!(err.to_string().contains("down"));

        let err: ChatError = BerrybotError::Serialization("bad".to_string()).into();
        assert!(matches!(err, ChatError::Serialization(_)));
    }

    #[test]
    fn test_chat_error_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: ChatError = err.into();
        assert!(matches!(err, ChatError::Serialization(_)));
    }
}
