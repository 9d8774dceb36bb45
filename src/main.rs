use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use shelf_ingest::assets::{AssetResolver, HttpFetcher, ImageResolver};
use shelf_ingest::config::PipelineConfig;
use shelf_ingest::models::MediaKind;
use shelf_ingest::pipeline::{self, RunSummary};
use shelf_ingest::progress::{format_duration, set_log_only};
use shelf_ingest::schedule::SystemClock;

#[derive(Parser)]
#[command(name = "shelf-ingest")]
#[command(about = "Merge a reading/watching export into display and backup collections")]
struct Args {
    /// Data type of the export
    #[arg(value_enum)]
    kind: MediaKind,

    /// TOML file merged over the built-in preset
    #[arg(long)]
    config: Option<PathBuf>,

    /// Raw export (CSV/TSV or JSON)
    #[arg(long)]
    input: Option<PathBuf>,

    #[arg(long)]
    display: Option<PathBuf>,

    #[arg(long)]
    backup: Option<PathBuf>,

    #[arg(long)]
    stats: Option<PathBuf>,

    /// Cap for the display collection (0 = uncapped)
    #[arg(long)]
    max_display: Option<usize>,

    /// Directory for downloaded images
    #[arg(long)]
    assets_dir: Option<PathBuf>,

    /// Skip image resolution entirely
    #[arg(long)]
    no_assets: bool,

    /// Disable progress bars, log periodic status lines instead
    #[arg(long)]
    log_only: bool,
}

impl Args {
    fn apply(&self, config: &mut PipelineConfig) {
        if let Some(path) = &self.input {
            config.input.path = path.clone();
        }
        if let Some(path) = &self.display {
            config.display.path = path.clone();
        }
        if let Some(path) = &self.backup {
            config.backup.path = path.clone();
        }
        if let Some(path) = &self.stats {
            config.stats_path = path.clone();
        }
        if let Some(cap) = self.max_display {
            config.display.max_len = (cap > 0).then_some(cap);
        }
        if let Some(dir) = &self.assets_dir {
            config.assets.dir = dir.clone();
        }
        if self.no_assets {
            config.assets.enabled = false;
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    set_log_only(args.log_only);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_ansi(!args.log_only)
        .init();

    let start = Instant::now();
    let mut config = PipelineConfig::load(args.kind, args.config.as_deref())?;
    args.apply(&mut config);

    println!("Ingesting {} export: {:?}", config.kind, config.input.path);

    let resolver = if config.assets.enabled {
        let fetcher = HttpFetcher::new(&config.assets.user_agent, &config.assets.referer)?;
        Some(ImageResolver::new(
            fetcher,
            &config.assets.dir,
            config.assets.cdn.clone(),
            &config.assets.patterns,
            config.assets.settings(),
        )?)
    } else {
        None
    };

    let summary = pipeline::run(
        &config,
        &SystemClock,
        resolver.as_ref().map(|r| r as &dyn AssetResolver),
        StdRng::from_entropy(),
    )?;

    print_summary(&config, &summary, start);
    Ok(())
}

fn print_summary(config: &PipelineConfig, summary: &RunSummary, start: Instant) {
    println!("\n{:=<60}", "");
    if summary.input_missing {
        println!("No export found at {:?}, nothing to do.", config.input.path);
        println!("{:=<60}", "");
        return;
    }
    println!("Ingestion complete!");
    println!("  Parsed rows:   {}", summary.parsed);
    println!("  Skipped rows:  {}", summary.skipped);
    if summary.overridden > 0 {
        println!("  Overrides:     {}", summary.overridden);
    }
    println!(
        "  Display:       {} total, {} new -> {:?}",
        summary.display_total, summary.new_display, config.display.path
    );
    println!(
        "  Backup:        {} total, {} new -> {:?}",
        summary.backup_total, summary.new_backup, config.backup.path
    );
    if summary.assets.attempted() > 0 {
        let a = &summary.assets;
        println!(
            "  Images:        {} downloaded, {} cached, {} failed, {} without source",
            a.downloaded, a.cached, a.failed, a.no_source
        );
    }
    println!("  Elapsed:       {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");
}
