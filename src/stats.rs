//! Rating statistics written next to the collections after each run.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::models::{Record, Status, UNRATED};

/// Per-run statistics. Bucket keys are the raw rating values, so the
/// sentinel shows up as its own bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub total: usize,
    pub by_bucket: BTreeMap<String, usize>,
    pub by_status: BTreeMap<String, usize>,
    pub last_update: DateTime<Utc>,
    pub source_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,

    // Run counters
    pub display_total: usize,
    pub backup_total: usize,
    pub new_display: usize,
    pub new_backup: usize,
    pub skipped_rows: usize,
}

impl Stats {
    /// Aggregate counts over `records`. Everything except `last_update`
    /// is a pure function of the input.
    pub fn compute(records: &[Record], source_label: &str, now: DateTime<Utc>) -> Self {
        let mut by_bucket = BTreeMap::new();
        let mut by_status: BTreeMap<String, usize> = Status::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();

        for record in records {
            let bucket = match record.rating_raw.trim() {
                "" => UNRATED,
                raw => raw,
            };
            *by_bucket.entry(bucket.to_string()).or_insert(0) += 1;
            *by_status.entry(record.status.as_str().to_string()).or_insert(0) += 1;
        }

        Self {
            total: records.len(),
            by_bucket,
            by_status,
            last_update: now,
            source_label: source_label.to_string(),
            ..Default::default()
        }
    }

    /// Write to a JSON file
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write stats to {}", path.display()))?;
        Ok(())
    }
}
