//! One ingestion run: export → records → collections + stats on disk.
//!
//! Order of operations:
//! 1. Parse the export and apply manual overrides
//! 2. Load the persisted display/backup collections (missing = empty)
//! 3. Select and keep only ids not already persisted
//! 4. Resolve images for the new records, one at a time, paced
//! 5. Merge, sort newest first, cap the display collection
//! 6. Write both collections and the stats file

use anyhow::{Context, Result};
use rand::Rng;
use rustc_hash::{FxHashMap, FxHashSet};
use std::fs;
use tracing::{debug, info, warn};

use crate::assets::{AssetResolver, Resolution};
use crate::classify::{self, Selection};
use crate::config::{InputFormat, PipelineConfig};
use crate::merge::{merge, sort_by_mark_date_desc, trim, unseen};
use crate::models::Record;
use crate::parse::{ParseReport, RecordParser};
use crate::progress::PhaseProgress;
use crate::schedule::{Clock, Pacer};
use crate::stats::Stats;
use crate::store;

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// The export was absent; nothing was read or written
    pub input_missing: bool,
    pub parsed: usize,
    pub skipped: usize,
    pub overridden: usize,
    pub new_display: usize,
    pub new_backup: usize,
    pub display_total: usize,
    pub backup_total: usize,
    pub assets: AssetCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetCounts {
    pub downloaded: usize,
    pub cached: usize,
    pub failed: usize,
    pub no_source: usize,
}

impl AssetCounts {
    fn record(&mut self, resolution: &Resolution) {
        match resolution {
            Resolution::Downloaded(_) => self.downloaded += 1,
            Resolution::Cached(_) => self.cached += 1,
            Resolution::Failed(_) => self.failed += 1,
            Resolution::NoSource => self.no_source += 1,
        }
    }

    pub fn attempted(&self) -> usize {
        self.downloaded + self.cached + self.failed + self.no_source
    }
}

/// Run the pipeline once.
///
/// `resolver` is `None` when image resolution is disabled; new records then
/// keep whatever image URL the export carried. `rng` drives pacing jitter.
pub fn run<R: Rng>(
    config: &PipelineConfig,
    clock: &dyn Clock,
    resolver: Option<&dyn AssetResolver>,
    rng: R,
) -> Result<RunSummary> {
    config.validate()?;
    let mut summary = RunSummary::default();

    // ------------------------------------------------------------------------
    // Parse
    // ------------------------------------------------------------------------
    let input = &config.input.path;
    if !input.exists() {
        info!(path = %input.display(), "input export not found, nothing to do");
        summary.input_missing = true;
        return Ok(summary);
    }
    let text = fs::read_to_string(input)
        .with_context(|| format!("Failed to read input {}", input.display()))?;
    let mut report = parse_export(config, &text, clock)?;
    summary.overridden = config.apply_overrides(&mut report.records);
    summary.parsed = report.records.len();
    summary.skipped = report.skipped;
    info!(
        kind = %config.kind,
        parsed = summary.parsed,
        skipped = summary.skipped,
        "parsed export"
    );

    // ------------------------------------------------------------------------
    // Select new records
    // ------------------------------------------------------------------------
    let existing_display = load_restamped(&config.display.path)?;
    let existing_backup = load_restamped(&config.backup.path)?;

    let mut new_display = unseen(
        &existing_display,
        &select(&report.records, &config.display.selection),
    );
    let mut new_backup = unseen(
        &existing_backup,
        &select(&report.records, &config.backup.selection),
    );
    summary.new_display = new_display.len();
    summary.new_backup = new_backup.len();
    info!(
        new_display = summary.new_display,
        new_backup = summary.new_backup,
        "selected new records"
    );

    // ------------------------------------------------------------------------
    // Assets
    // ------------------------------------------------------------------------
    if let Some(resolver) = resolver.filter(|_| config.assets.enabled) {
        let targets = asset_targets(config, &new_display, &new_backup);
        let mut pacer = Pacer::new(config.pacing.clone(), rng);
        let (resolved, counts) = resolve_assets(resolver, &targets, clock, &mut pacer);
        for record in new_display.iter_mut().chain(new_backup.iter_mut()) {
            if let Some(url) = resolved.get(&record.id) {
                record.image_url = url.clone();
            }
        }
        summary.assets = counts;
    }

    // ------------------------------------------------------------------------
    // Merge and persist
    // ------------------------------------------------------------------------
    let mut display = merge(new_display, existing_display);
    sort_by_mark_date_desc(&mut display);
    trim(&mut display, config.display.max_len);

    let mut backup = merge(new_backup, existing_backup);
    sort_by_mark_date_desc(&mut backup);

    store::save_display(&config.display.path, &display)?;
    store::save_backup(&config.backup.path, &backup)?;
    summary.display_total = display.len();
    summary.backup_total = backup.len();

    let mut stats = Stats::compute(&report.records, &config.source_label, clock.now());
    stats.user_id = config.user_id.clone();
    stats.note = config.note.clone();
    stats.display_total = summary.display_total;
    stats.backup_total = summary.backup_total;
    stats.new_display = summary.new_display;
    stats.new_backup = summary.new_backup;
    stats.skipped_rows = summary.skipped;
    stats.write_to_file(&config.stats_path)?;

    info!(
        display = summary.display_total,
        backup = summary.backup_total,
        "collections written"
    );
    Ok(summary)
}

fn parse_export(config: &PipelineConfig, text: &str, clock: &dyn Clock) -> Result<ParseReport> {
    let parser = RecordParser::new(
        config.kind,
        config.card.clone(),
        config.input.delimiter,
        clock.today(),
    )
    .with_columns(config.input.columns.clone());
    match config.input.resolved_format() {
        InputFormat::Json => parser
            .parse_json(text)
            .with_context(|| format!("Failed to parse {}", config.input.path.display())),
        InputFormat::Csv | InputFormat::Auto => Ok(parser.parse_delimited(text)),
    }
}

/// Load a persisted collection and recompute each record's status, so
/// files written before the status field existed still filter correctly.
fn load_restamped(path: &std::path::Path) -> Result<Vec<Record>> {
    let mut records = store::load_collection(path)?;
    records.iter_mut().for_each(classify::apply);
    debug!(path = %path.display(), count = records.len(), "loaded collection");
    Ok(records)
}

fn select(records: &[Record], selection: &Selection) -> Vec<Record> {
    records
        .iter()
        .filter(|r| selection.admits(r))
        .cloned()
        .collect()
}

/// New records needing an image, display ones first, one entry per id.
fn asset_targets<'a>(
    config: &PipelineConfig,
    new_display: &'a [Record],
    new_backup: &'a [Record],
) -> Vec<&'a Record> {
    let mut seen = FxHashSet::default();
    new_display
        .iter()
        .chain(new_backup)
        .filter(|r| config.wants_asset(r))
        .filter(|r| seen.insert(r.id.as_str()))
        .collect()
}

/// Resolve sequentially; the next record starts only after the previous
/// one settled, with a pause after each network-touching resolution.
fn resolve_assets<R: Rng>(
    resolver: &dyn AssetResolver,
    targets: &[&Record],
    clock: &dyn Clock,
    pacer: &mut Pacer<R>,
) -> (FxHashMap<String, String>, AssetCounts) {
    let mut resolved = FxHashMap::default();
    let mut counts = AssetCounts::default();
    let progress = PhaseProgress::new("assets", targets.len() as u64, 10);

    for (i, record) in targets.iter().enumerate() {
        let resolution = resolver.resolve_image(&record.source_url, &record.id, clock);
        counts.record(&resolution);
        match &resolution {
            Resolution::Failed(reason) => {
                warn!(id = %record.id, title = %record.title, reason = %reason, "image not resolved")
            }
            other => debug!(id = %record.id, resolution = ?other, "image resolved"),
        }
        if let Some(url) = resolution.url() {
            resolved.insert(record.id.clone(), url.to_string());
        }
        progress.step(&record.title);

        if resolution.touched_network() && i + 1 < targets.len() {
            pacer.pause(clock);
        }
    }
    progress.finish();
    (resolved, counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MediaKind, Status};
    use crate::schedule::{DelayPolicy, FixedClock};
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::path::Path;
    use tempfile::TempDir;

    const HEADER: &str = "id,title,star,card,star_time,comment,poster,url";

    /// Downloads every id except those listed as failing.
    struct ScriptedResolver {
        failing: Vec<&'static str>,
        calls: RefCell<Vec<String>>,
    }

    impl AssetResolver for ScriptedResolver {
        fn resolve_image(&self, _source_url: &str, id: &str, _clock: &dyn Clock) -> Resolution {
            self.calls.borrow_mut().push(id.to_string());
            if self.failing.iter().any(|f| *f == id) {
                Resolution::Failed("HTTP status 404".to_string())
            } else {
                Resolution::Downloaded(format!("https://cdn/{}.jpg", id))
            }
        }
    }

    fn clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap())
    }

    fn config_in(dir: &Path) -> PipelineConfig {
        let mut config = PipelineConfig::preset(MediaKind::Book);
        config.input.path = dir.join("raw/book.csv");
        config.display.path = dir.join("books.json");
        config.backup.path = dir.join("backup/all-books.json");
        config.stats_path = dir.join("book-stats.json");
        config.assets.dir = dir.join("covers");
        config.pacing = DelayPolicy {
            every: 2,
            short_ms: (10, 10),
            long_ms: (50, 50),
        };
        config
    }

    fn write_input(config: &PipelineConfig, rows: &[&str]) {
        let path = &config.input.path;
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, format!("{}\n{}\n", HEADER, rows.join("\n"))).unwrap();
    }

    #[test]
    fn test_missing_input_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        let summary = run(&config, &clock(), None, StdRng::seed_from_u64(1)).unwrap();
        assert!(summary.input_missing);
        assert!(!config.display.path.exists());
        assert!(!config.stats_path.exists());
    }

    #[test]
    fn test_resolved_urls_applied_and_failures_keep_prior_url() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        write_input(
            &config,
            &[
                "1,a,5,\"甲 / 2001\",2020-01-03,,https://origin/1.jpg,https://x/subject/1/",
                "2,b,5,\"乙 / 2002\",2020-01-02,,https://origin/2.jpg,https://x/subject/2/",
                "3,c,5,\"丙 / 2003\",2020-01-01,,,https://x/subject/3/",
                "4,d,3,\"丁 / 2004\",2020-01-04,,https://origin/4.jpg,https://x/subject/4/",
            ],
        );
        let resolver = ScriptedResolver {
            failing: vec!["2"],
            calls: RefCell::default(),
        };
        let clock = clock();
        let summary = run(&config, &clock, Some(&resolver), StdRng::seed_from_u64(1)).unwrap();

        // display scope: the 3-star record is not resolved
        assert_eq!(*resolver.calls.borrow(), vec!["1", "2", "3"]);
        assert_eq!(summary.assets.downloaded, 2);
        assert_eq!(summary.assets.failed, 1);
        // pauses between records only: short, long
        assert_eq!(
            clock.sleeps(),
            vec![std::time::Duration::from_millis(10), std::time::Duration::from_millis(50)]
        );

        let backup = store::load_collection(&config.backup.path).unwrap();
        let url = |id: &str| backup.iter().find(|r| r.id == id).unwrap().image_url.clone();
        assert_eq!(url("1"), "https://cdn/1.jpg");
        assert_eq!(url("2"), "https://origin/2.jpg");
        assert_eq!(url("3"), "https://cdn/3.jpg");
        assert_eq!(url("4"), "https://origin/4.jpg");
    }

    #[test]
    fn test_existing_records_are_not_resolved_again() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        write_input(&config, &["1,a,5,,2020-01-03,,,https://x/subject/1/"]);
        let resolver = ScriptedResolver {
            failing: vec![],
            calls: RefCell::default(),
        };
        run(&config, &clock(), Some(&resolver), StdRng::seed_from_u64(1)).unwrap();
        run(&config, &clock(), Some(&resolver), StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(resolver.calls.borrow().len(), 1);
    }

    #[test]
    fn test_disabled_assets_skip_resolver() {
        let dir = TempDir::new().unwrap();
        let mut config = config_in(dir.path());
        config.assets.enabled = false;
        write_input(&config, &["1,a,5,,2020-01-03,,,https://x/subject/1/"]);
        let resolver = ScriptedResolver {
            failing: vec![],
            calls: RefCell::default(),
        };
        let summary = run(&config, &clock(), Some(&resolver), StdRng::seed_from_u64(1)).unwrap();
        assert!(resolver.calls.borrow().is_empty());
        assert_eq!(summary.assets.attempted(), 0);
    }

    #[test]
    fn test_statuses_restamped_on_load() {
        let dir = TempDir::new().unwrap();
        let config = config_in(dir.path());
        // backup written by an older run, without status fields
        fs::create_dir_all(config.backup.path.parent().unwrap()).unwrap();
        fs::write(
            &config.backup.path,
            r#"[{"id": "9", "title": "old", "rating": "unrated", "comment": "kept a note", "mark_date": "2019-01-01"}]"#,
        )
        .unwrap();
        write_input(&config, &["1,a,5,,2020-01-03,,,https://x/subject/1/"]);
        run(&config, &clock(), None, StdRng::seed_from_u64(1)).unwrap();

        let backup = store::load_collection(&config.backup.path).unwrap();
        let old = backup.iter().find(|r| r.id == "9").unwrap();
        assert_eq!(old.status, Status::NotedOnly);
    }
}
