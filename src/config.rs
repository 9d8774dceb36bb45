//! Pipeline configuration: per-kind presets, TOML overlay, validation.
//!
//! Resolution order (later wins):
//! 1. Built-in preset for the media kind
//! 2. `--config <file>` TOML, deep-merged table by table (`card` is replaced whole)
//! 3. Command-line flags, applied by the binary

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::assets::{default_patterns, CdnTemplate, ResolverSettings, DEFAULT_USER_AGENT};
use crate::card::CardLayout;
use crate::classify::Selection;
use crate::models::{MediaKind, Record};
use crate::safety::validate_output_paths;
use crate::schedule::DelayPolicy;

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// `.json` files are JSON, anything else is delimited text
    #[default]
    Auto,
    Csv,
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InputConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub format: InputFormat,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    /// Column names for exports without a header row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
}

fn default_delimiter() -> char {
    ','
}

impl InputConfig {
    /// Concrete format after resolving `auto` from the file extension.
    pub fn resolved_format(&self) -> InputFormat {
        match self.format {
            InputFormat::Auto => {
                let is_json = self
                    .path
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.eq_ignore_ascii_case("json"))
                    .unwrap_or(false);
                if is_json {
                    InputFormat::Json
                } else {
                    InputFormat::Csv
                }
            }
            other => other,
        }
    }
}

/// Public-facing collection: filtered, sorted, optionally capped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DisplayConfig {
    pub path: PathBuf,
    pub selection: Selection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_len: Option<usize>,
}

/// Full history collection. Never capped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackupConfig {
    pub path: PathBuf,
    pub selection: Selection,
}

/// Which new records get their image resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetScope {
    /// Only records entering the display collection
    Display,
    /// Every new backup record
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AssetsConfig {
    pub enabled: bool,
    pub dir: PathBuf,
    pub scope: AssetScope,
    pub cdn: CdnTemplate,
    pub patterns: Vec<String>,
    pub user_agent: String,
    pub referer: String,
    pub page_timeout_secs: u64,
    pub image_timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
}

impl AssetsConfig {
    fn preset(kind: MediaKind) -> Self {
        let sub = match kind {
            MediaKind::Movie => "posters",
            MediaKind::Book => "covers",
        };
        Self {
            enabled: true,
            dir: PathBuf::from("images").join(sub),
            scope: AssetScope::Display,
            cdn: CdnTemplate {
                host: "cdn.jsdelivr.net".to_string(),
                repo: "gh/luli-lula/douban-data@main".to_string(),
                path: format!("images/{}", sub),
            },
            patterns: default_patterns(kind),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: kind.site_root().to_string(),
            page_timeout_secs: 15,
            image_timeout_secs: 25,
            retries: 2,
            retry_backoff_ms: 2_000,
        }
    }

    pub fn settings(&self) -> ResolverSettings {
        ResolverSettings {
            page_timeout: Duration::from_secs(self.page_timeout_secs),
            image_timeout: Duration::from_secs(self.image_timeout_secs),
            retries: self.retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
        }
    }
}

/// Manual correction applied to a freshly parsed record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
}

// ============================================================================
// Pipeline Config
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    pub kind: MediaKind,
    pub source_label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub stats_path: PathBuf,
    pub input: InputConfig,
    pub card: CardLayout,
    pub display: DisplayConfig,
    pub backup: BackupConfig,
    pub assets: AssetsConfig,
    #[serde(default)]
    pub pacing: DelayPolicy,
    #[serde(default)]
    pub overrides: BTreeMap<String, RecordOverride>,
}

impl PipelineConfig {
    /// Built-in layout for a media kind, rooted at the working directory.
    pub fn preset(kind: MediaKind) -> Self {
        let plural = kind.plural();
        let stats_name = match kind {
            MediaKind::Movie => "stats.json".to_string(),
            MediaKind::Book => "book-stats.json".to_string(),
        };
        Self {
            kind,
            source_label: "douban".to_string(),
            user_id: None,
            note: None,
            stats_path: PathBuf::from("data").join(stats_name),
            input: InputConfig {
                path: PathBuf::from(format!("data/raw/{}.csv", kind.as_str())),
                format: InputFormat::Auto,
                delimiter: default_delimiter(),
                columns: None,
            },
            card: CardLayout::for_kind(kind),
            display: DisplayConfig {
                path: PathBuf::from(format!("data/{}.json", plural)),
                selection: Selection::rated_at_least(5),
                max_len: Some(100),
            },
            backup: BackupConfig {
                path: PathBuf::from(format!("data/backup/all-{}.json", plural)),
                selection: Selection::everything(),
            },
            assets: AssetsConfig::preset(kind),
            pacing: DelayPolicy::default(),
            overrides: BTreeMap::new(),
        }
    }

    /// Preset for `kind`, with `path` (if any) deep-merged over it.
    pub fn load(kind: MediaKind, path: Option<&Path>) -> Result<Self> {
        let preset = Self::preset(kind);
        let Some(path) = path else {
            return Ok(preset);
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::overlay(preset, &text).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Deep-merge TOML `text` over `base`.
    pub fn overlay(base: Self, text: &str) -> Result<Self> {
        let kind = base.kind;
        let overlay: toml::Value = toml::from_str(text)?;
        let mut merged = toml::Value::try_from(&base).context("Failed to serialize preset")?;
        merge_tables(&mut merged, overlay);
        let config: Self = merged.try_into()?;
        if config.kind != kind {
            bail!(
                "config declares kind '{}' but the pipeline was started for '{}'",
                config.kind,
                kind
            );
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.card.validate()?;
        self.pacing.validate()?;

        if self.input.delimiter == '"' {
            bail!("input.delimiter cannot be a quote character");
        }
        if self.display.max_len == Some(0) {
            bail!("display.max_len must be at least 1 when set");
        }
        for (name, selection) in [("display", &self.display.selection), ("backup", &self.backup.selection)] {
            if selection.statuses.is_empty() {
                bail!("{}.selection.statuses must not be empty", name);
            }
            if let Some(min) = selection.min_rating {
                if !(1..=5).contains(&min) {
                    bail!("{}.selection.min_rating must be within 1..5, got {}", name, min);
                }
            }
        }

        let cdn = &self.assets.cdn;
        for (field, value) in [("host", &cdn.host), ("repo", &cdn.repo), ("path", &cdn.path)] {
            if value.trim().is_empty() {
                bail!("assets.cdn.{} must not be empty", field);
            }
        }
        for pattern in &self.assets.patterns {
            Regex::new(pattern).with_context(|| format!("assets.patterns: invalid regex {}", pattern))?;
        }

        validate_output_paths(
            &self.input.path,
            &[
                ("display", self.display.path.as_path()),
                ("backup", self.backup.path.as_path()),
                ("stats", self.stats_path.as_path()),
            ],
        )
    }

    /// Apply manual corrections to freshly parsed records.
    /// Returns the number of records changed.
    pub fn apply_overrides(&self, records: &mut [Record]) -> usize {
        let mut changed = 0;
        for record in records.iter_mut() {
            let Some(fix) = self.overrides.get(&record.id) else {
                continue;
            };
            if let Some(contributors) = &fix.contributors {
                record.contributors = contributors.clone();
            }
            if let Some(year) = &fix.year {
                record.year = year.clone();
            }
            changed += 1;
        }
        changed
    }

    /// Whether a new record needs its image resolved.
    pub fn wants_asset(&self, record: &Record) -> bool {
        match self.assets.scope {
            AssetScope::Display => self.display.selection.admits(record),
            AssetScope::All => true,
        }
    }
}

/// Recursively merge `overlay` into `base`. Tables merge key by key, every
/// other value (arrays included) replaces. The `card` table is replaced
/// whole so a layout never mixes positions from two versions.
fn merge_tables(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) if key != "card" => merge_tables(existing, value),
                    _ => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}
