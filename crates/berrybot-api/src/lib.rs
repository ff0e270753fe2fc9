//! Berrybot API crate - local stand-in for the hosted backend.
//!
//! Serves the WebSocket chat gateway (relaying queries to the agent) and
//! the authenticated admin REST API: document CRUD, knowledge-base sync,
//! session analytics and email-reply ingestion.

pub mod agent;
pub mod auth;
pub mod documents;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod knowledge_base;
pub mod notify;
pub mod routes;
pub mod session_log;
pub mod state;

pub use agent::{Agent, AgentReply, AgentRequest, HttpAgent};
pub use error::ApiError;
pub use notify::{AdminNotification, Notifier, OutboxNotifier};
pub use routes::{create_router, start_server};
pub use state::AppState;
