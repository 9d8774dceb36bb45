//! Persisted collections: read once at start, written once at the end.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;

use crate::models::{DisplayRecord, Record};

/// Load a persisted collection. A missing file is an empty collection;
/// an unreadable or malformed one is an error.
pub fn load_collection(path: &Path) -> Result<Vec<Record>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read collection {}", path.display()))?;
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&text)
        .with_context(|| format!("Collection {} is not a valid record array", path.display()))
}

/// Write the display-shaped subset of `records`.
pub fn save_display(path: &Path, records: &[Record]) -> Result<()> {
    let view: Vec<DisplayRecord> = records.iter().map(DisplayRecord::from).collect();
    write_pretty(path, &view)
}

/// Write the full record set.
pub fn save_backup(path: &Path, records: &[Record]) -> Result<()> {
    write_pretty(path, records)
}

fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
