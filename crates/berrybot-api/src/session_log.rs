//! Append-only log of answered chat queries, aggregated for analytics.
//!
//! Records are kept in memory and mirrored to a JSON-lines file so that
//! analytics survive a restart.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use berrybot_core::error::{BerrybotError, Result};
use berrybot_core::protocol::AnalyticsReport;
use berrybot_core::types::Timeframe;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub location: String,
    pub category: String,
    pub timestamp: DateTime<Utc>,
}

pub struct SessionLog {
    path: Option<PathBuf>,
    records: Mutex<Vec<SessionRecord>>,
}

impl SessionLog {
    /// A log that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: Mutex::new(Vec::new()),
        }
    }

    /// Open the log at `path`, loading any records already there.
    ///
    /// Unreadable lines are skipped with a warning.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = match std::fs::read_to_string(&path) {
            Ok(raw) => raw
                .lines()
                .filter(|line| !line.trim().is_empty())
                .filter_map(|line| match serde_json::from_str(line) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping unreadable session log line");
                        None
                    }
                })
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: Some(path),
            records: Mutex::new(records),
        })
    }

    pub fn append(&self, record: SessionRecord) -> Result<()> {
        let mut records = self.lock()?;
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            writeln!(file, "{}", serde_json::to_string(&record)?)?;
        }
        tracing::debug!(session_id = %record.session_id, category = %record.category, "Session record appended");
        records.push(record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summarize the records whose timestamp falls in `timeframe`'s window
    /// ending at `now` (both ends inclusive).
    pub fn aggregate(&self, timeframe: Timeframe, now: DateTime<Utc>) -> Result<AnalyticsReport> {
        let start = timeframe.window_start(now);
        let records = self.lock()?;

        let mut sessions = HashSet::new();
        let mut locations = BTreeSet::new();
        let mut categories: HashMap<String, u64> = HashMap::new();
        for record in records
            .iter()
            .filter(|r| r.timestamp >= start && r.timestamp <= now)
        {
            if !record.session_id.is_empty() {
                sessions.insert(record.session_id.as_str());
            }
            if !record.location.is_empty() {
                locations.insert(record.location.clone());
            }
            if !record.category.is_empty() {
                *categories.entry(record.category.clone()).or_insert(0) += 1;
            }
        }

        Ok(AnalyticsReport {
            timeframe,
            start_date: start.format("%Y-%m-%d").to_string(),
            end_date: now.format("%Y-%m-%d").to_string(),
            user_count: sessions.len() as u64,
            locations: locations.into_iter().collect(),
            categories,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<SessionRecord>>> {
        self.records
            .lock()
            .map_err(|e| BerrybotError::Storage(format!("session log poisoned: {}", e)))
    }
}
