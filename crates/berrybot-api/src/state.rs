//! Application state shared across all route handlers.

use std::sync::Arc;
use std::time::Instant;

use berrybot_core::config::{expand_home, BerrybotConfig};
use berrybot_core::error::Result;

use crate::agent::{Agent, HttpAgent, UnconfiguredAgent};
use crate::documents::DocumentStore;
use crate::knowledge_base::KnowledgeBase;
use crate::notify::{Notifier, OutboxNotifier};
use crate::session_log::SessionLog;

/// Shared application state. Cloned into every handler task.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BerrybotConfig>,
    pub documents: Arc<DocumentStore>,
    pub knowledge_base: Arc<KnowledgeBase>,
    pub session_log: Arc<SessionLog>,
    pub agent: Arc<dyn Agent>,
    pub notifier: Arc<dyn Notifier>,
    /// Bearer token required by protected routes and the chat gateway.
    pub api_token: String,
    pub start_time: Instant,
}

impl AppState {
    /// State over `config.general.data_dir`, with explicit collaborators.
    pub fn new(
        config: BerrybotConfig,
        agent: Arc<dyn Agent>,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let data_dir = expand_home(&config.general.data_dir);
        let documents = DocumentStore::open(data_dir.join("documents"))?;
        let session_log = SessionLog::open(data_dir.join("sessions.jsonl"))?;
        Ok(Self {
            config: Arc::new(config),
            documents: Arc::new(documents),
            knowledge_base: Arc::new(KnowledgeBase::new()),
            session_log: Arc::new(session_log),
            agent,
            notifier,
            api_token: crate::auth::generate_token(),
            start_time: Instant::now(),
        })
    }

    /// State with the agent and notifier the config describes.
    pub fn from_config(config: BerrybotConfig) -> Result<Self> {
        let agent: Arc<dyn Agent> = match config.server.agent_endpoint.as_deref() {
            Some(endpoint) if !endpoint.is_empty() => {
                tracing::info!(endpoint = %endpoint, "Relaying chat queries to HTTP agent");
                Arc::new(HttpAgent::new(endpoint))
            }
            _ => {
                tracing::warn!("No agent endpoint configured; chat queries will fail");
                Arc::new(UnconfiguredAgent)
            }
        };
        let outbox = expand_home(&config.general.data_dir).join("outbox");
        let notifier: Arc<dyn Notifier> = Arc::new(OutboxNotifier::new(outbox));
        Self::new(config, agent, notifier)
    }
}
