//! Fix history
//!
//! Successful suggestions are appended to `.deflake/history.json`, a JSON
//! array read by the local dashboard. Callers wrap [`HistoryLog::append`] in
//! `fail_open`: a history problem never changes the outcome of a run.

use chrono::{DateTime, Utc};
use deflake_core::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

/// One recorded suggestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub log_path: Option<PathBuf>,
    pub artifact_path: Option<PathBuf>,
    pub spec_file: Option<String>,
    pub fix: Value,
    /// `Suggested` or `Applied`
    pub status: String,
}

impl HistoryEntry {
    pub fn new(fix: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            log_path: None,
            artifact_path: None,
            spec_file: None,
            fix,
            status: "Suggested".to_string(),
        }
    }
}

/// Append-only store backed by a JSON file
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all entries; an unreadable or corrupt file yields an empty history
    pub async fn load(&self) -> Vec<HistoryEntry> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(_) => return Vec::new(),
        };
        match serde_json::from_str(&content) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    "Ignoring corrupt history at {}: {}",
                    self.path.display(),
                    e
                );
                Vec::new()
            }
        }
    }

    /// Append one entry and rewrite the file
    pub async fn append(&self, entry: HistoryEntry) -> Result<()> {
        let mut entries = self.load().await;
        entries.push(entry);

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(&entries)?;
        tokio::fs::write(&self.path, content).await?;

        debug!(
            "Recorded fix in {} ({} entries)",
            self.path.display(),
            entries.len()
        );
        Ok(())
    }
}
