//! Knowledge-base ingestion jobs.
//!
//! The vector index itself is a managed service; locally a sync only
//! records an ingestion job over the current document set.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use berrybot_core::protocol::SyncDetails;

/// Record of one ingestion job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionJob {
    pub job_id: String,
    pub reason: String,
    pub document_count: usize,
    pub started_at: DateTime<Utc>,
}

/// Number of most recent jobs kept in memory.
pub const JOB_HISTORY_LIMIT: usize = 100;

#[derive(Default)]
pub struct KnowledgeBase {
    jobs: Mutex<VecDeque<IngestionJob>>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start an ingestion job. Failures are reported in the details, not
    /// as an error, so the caller's own operation still succeeds.
    pub fn start_ingestion(&self, reason: &str, document_count: usize) -> SyncDetails {
        let job = IngestionJob {
            job_id: Uuid::new_v4().to_string(),
            reason: reason.to_string(),
            document_count,
            started_at: Utc::now(),
        };
        match self.jobs.lock() {
            Ok(mut jobs) => {
                tracing::info!(job_id = %job.job_id, reason = %reason, document_count, "Knowledge base sync initiated");
                let job_id = job.job_id.clone();
                if jobs.len() >= JOB_HISTORY_LIMIT {
                    jobs.pop_front();
                }
                jobs.push_back(job);
                SyncDetails {
                    status: "success".to_string(),
                    job_id: Some(job_id),
                    message: None,
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Error syncing knowledge base");
                SyncDetails {
                    status: "error".to_string(),
                    job_id: None,
                    message: Some(e.to_string()),
                }
            }
        }
    }

    /// Most recent jobs, oldest first.
    pub fn jobs(&self) -> Vec<IngestionJob> {
        self.jobs
            .lock()
            .map(|jobs| jobs.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_ingestion_records_job() {
        let kb = KnowledgeBase::new();
        let details = kb.start_ingestion("upload", 3);
        assert_eq!(details.status, "success");

        let jobs = kb.jobs();
        assert_eq!(jobs.len(), 1);
        assert_eq!(Some(jobs[0].job_id.clone()), details.job_id);
        assert_eq!(jobs[0].reason, "upload");
        assert_eq!(jobs[0].document_count, 3);
    }

    #[test]
    fn test_job_history_keeps_most_recent() {
        let kb = KnowledgeBase::new();
        for n in 0..JOB_HISTORY_LIMIT + 5 {
            kb.start_ingestion("upload", n);
        }
        let jobs = kb.jobs();
        assert_eq!(jobs.len(), JOB_HISTORY_LIMIT);
        assert_eq!(jobs[0].document_count, 5);
        assert_eq!(jobs[JOB_HISTORY_LIMIT - 1].document_count, JOB_HISTORY_LIMIT + 4);
    }

    #[test]
    fn test_job_ids_are_unique() {
        let kb = KnowledgeBase::new();
        let a = kb.start_ingestion("manual", 0).job_id;
        let b = kb.start_ingestion("manual", 0).job_id;
        assert_ne!(a, b);
    }
}
