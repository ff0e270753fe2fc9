//! The hosted agent the chat gateway relays queries to.
//!
//! The agent decides what to answer, how to categorize the question, and
//! whether a human should follow up. The gateway only moves frames.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use berrybot_core::error::{BerrybotError, Result};

/// One query forwarded to the agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRequest {
    pub session_id: String,
    pub querytext: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// The agent's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentReply {
    #[serde(rename = "responsetext")]
    pub text: String,
    /// Question category for analytics.
    #[serde(default)]
    pub category: Option<String>,
    /// The agent wants a human to follow up by email.
    #[serde(default)]
    pub requires_email: bool,
}

impl AgentReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            category: None,
            requires_email: false,
        }
    }
}

#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentReply>;
}

/// Invoke `agent`, trying up to `max_attempts` times (at least once).
/// Returns the last error if every attempt fails.
pub async fn invoke_with_retries(
    agent: &dyn Agent,
    request: &AgentRequest,
    max_attempts: u32,
) -> Result<AgentReply> {
    let attempts = max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match agent.invoke(request).await {
            Ok(reply) => return Ok(reply),
            Err(e) if attempt < attempts => {
                tracing::warn!(attempt, session_id = %request.session_id, error = %e, "Agent attempt failed");
                attempt += 1;
            }
            Err(e) => {
                tracing::error!(attempt, session_id = %request.session_id, error = %e, "Agent attempt failed");
                return Err(e);
            }
        }
    }
}

/// Agent reached over HTTP: the request is POSTed as JSON and the reply
/// parsed from the JSON response body.
pub struct HttpAgent {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpAgent {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Agent for HttpAgent {
    async fn invoke(&self, request: &AgentRequest) -> Result<AgentReply> {
        let resp = self
            .http
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| BerrybotError::Agent(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BerrybotError::Agent(format!(
                "agent returned {}: {}",
                status, body
            )));
        }
        resp.json::<AgentReply>()
            .await
            .map_err(|e| BerrybotError::Agent(format!("invalid agent reply: {}", e)))
    }
}

/// Stand-in used when no agent endpoint is configured. Every call fails.
pub struct UnconfiguredAgent;

#[async_trait]
impl Agent for UnconfiguredAgent {
    async fn invoke(&self, _request: &AgentRequest) -> Result<AgentReply> {
        Err(BerrybotError::Agent(
            "no agent endpoint configured (server.agent_endpoint)".to_string(),
        ))
    }
}
