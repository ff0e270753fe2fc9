//! Admin notification when a grower asks for human follow-up.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use berrybot_core::config::ServerConfig;
use berrybot_core::error::Result;

pub const ASSISTANCE_SUBJECT: &str = "Agent Assistance Requested";

/// A composed notification message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminNotification {
    pub to: String,
    pub from: String,
    pub subject: String,
    pub body: String,
}

impl AdminNotification {
    /// Ask the admin to follow up on a question the agent could not settle.
    pub fn assistance_request(
        config: &ServerConfig,
        user_email: &str,
        question: &str,
        agent_response: &str,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let body = format!(
            "Hello Admin,\n\
             \n\
             A user needs assistance with this question:\n\
             \n\
             \u{20}\u{20}\u{2022} User Email: {user_email}\n\
             \u{20}\u{20}\u{2022} Original Question: {question}\n\
             \u{20}\u{20}\u{2022} Agent's Response: {agent_response}\n\
             \n\
             Timestamp: {timestamp}\n\
             \n\
             Please assist as needed.\n\
             \n\
             Thanks,\n\
             Blueberry BOT",
            timestamp = timestamp.to_rfc3339(),
        );
        Self {
            to: config.admin_email.clone(),
            from: config.source_email.clone(),
            subject: ASSISTANCE_SUBJECT.to_string(),
            body,
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &AdminNotification) -> Result<()>;
}

/// Writes each notification as a text file into an outbox directory,
/// for a mail relay to pick up.
pub struct OutboxNotifier {
    dir: PathBuf,
}

impl OutboxNotifier {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn notify(&self, notification: &AdminNotification) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let name = format!(
            "{}-{}.txt",
            Utc::now().format("%Y%m%dT%H%M%S"),
            uuid::Uuid::new_v4().simple()
        );
        let path = self.dir.join(name);
        let contents = format!(
            "From: {}\nTo: {}\nSubject: {}\n\n{}\n",
            notification.from, notification.to, notification.subject, notification.body
        );
        tokio::fs::write(&path, contents).await?;
        tracing::info!(to = %notification.to, path = %path.display(), "Admin notified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_assistance_request_body() {
        let config = ServerConfig::default();
        let ts = Utc.with_ymd_and_hms(2024, 5, 15, 9, 30, 0).unwrap();
        let n = AdminNotification::assistance_request(
            &config,
            "grower@example.com",
            "What is blueberry pH?",
            "I am not sure.",
            ts,
        );
        assert_eq!(n.to, config.admin_email);
        assert_eq!(n.from, config.source_email);
        assert_eq!(n.subject, "Agent Assistance Requested");
        assert!(n.body.starts_with("Hello Admin,\n\nA user needs assistance"));
        assert!(n.body.contains("  \u{2022} User Email: grower@example.com\n"));
        assert!(n.body.contains("Original Question: What is blueberry pH?"));
        assert!(n.body.contains("Agent's Response: I am not sure."));
        assert!(n.body.contains("Timestamp: 2024-05-15T09:30:00+00:00"));
        assert!(n.body.ends_with("Thanks,\nBlueberry BOT"));
    }

    #[tokio::test]
    async fn test_outbox_notifier_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = OutboxNotifier::new(dir.path().join("outbox"));
        let n = AdminNotification::assistance_request(
            &ServerConfig::default(),
            "a@b.c",
            "q",
            "r",
            Utc::now(),
        );
        notifier.notify(&n).await.unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path().join("outbox"))
            .unwrap()
            .collect();
        assert_eq!(entries.len(), 1);
        let text = std::fs::read_to_string(entries[0].as_ref().unwrap().path()).unwrap();
        assert!(text.starts_with("From: noreply@example.com\nTo: admin@example.com\n"));
    }
}
