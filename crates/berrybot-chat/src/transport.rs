//! Transport seam between the chat client and the messaging gateway.

use async_trait::async_trait;

use crate::error::ChatError;

/// Something that happened on an open gateway connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// One inbound text frame.
    Text(String),
    /// The connection failed. No further events follow.
    Error(String),
    /// The peer closed the connection.
    Closed { code: u16, reason: String },
}

/// Opens connections to the messaging gateway.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Open a connection, presenting `token` as the bearer credential.
    ///
    /// A missing token is passed through; rejecting it is the gateway's job.
    async fn connect(&self, token: Option<&str>)
        -> Result<Box<dyn GatewayConnection>, ChatError>;
}

/// A single full-duplex connection.
#[async_trait]
pub trait GatewayConnection: Send {
    async fn send_text(&mut self, text: String) -> Result<(), ChatError>;

    /// Next event, or `None` once the connection is finished.
    async fn next_event(&mut self) -> Option<ConnectionEvent>;

    async fn close(&mut self) -> Result<(), ChatError>;
}
