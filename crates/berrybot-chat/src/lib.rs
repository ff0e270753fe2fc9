//! Chat surface of Berrybot.
//!
//! Holds the per-session conversation state, turns user utterances into
//! request frames, and routes response frames back onto the placeholder
//! that awaits them. The transport to the messaging gateway sits behind the
//! `Gateway` trait; `WebSocketGateway` is the production implementation.

pub mod client;
pub mod error;
pub mod session;
pub mod transport;
pub mod ws;

pub use client::{ChatClient, ChatEvent, SendOutcome};
pub use error::ChatError;
pub use session::{ChatSession, Dispatch, RouteOutcome};
pub use transport::{ConnectionEvent, Gateway, GatewayConnection};
pub use ws::WebSocketGateway;
