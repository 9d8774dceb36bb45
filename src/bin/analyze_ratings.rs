//! Summarize ratings in a persisted collection or a raw export (read-only)
//!
//! Usage: analyze-ratings <books.json | book.csv> [--kind book] [--format auto|csv|json]

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::fs;
use std::path::PathBuf;

use shelf_ingest::card::CardLayout;
use shelf_ingest::classify;
use shelf_ingest::config::InputFormat;
use shelf_ingest::models::{MediaKind, Record, Status};
use shelf_ingest::parse::RecordParser;
use shelf_ingest::stats::Stats;

#[derive(Parser)]
#[command(name = "analyze-ratings")]
#[command(about = "Rating histogram and status breakdown for a collection or export")]
struct Args {
    file: PathBuf,

    /// Card layout and subject site used when the file is a raw export
    #[arg(long, value_enum, default_value = "movie")]
    kind: MediaKind,

    #[arg(long, value_enum, default_value = "auto")]
    format: InputFormat,

    /// Field delimiter for delimited exports
    #[arg(long, default_value = ",")]
    delimiter: char,

    /// How many recent top-rated entries to list
    #[arg(long, default_value = "10")]
    top: usize,
}

/// Collections are JSON arrays of records; anything else goes through the parser.
fn load(args: &Args) -> Result<(Vec<Record>, &'static str)> {
    let text = fs::read_to_string(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let parser = RecordParser::new(
        args.kind,
        CardLayout::for_kind(args.kind),
        args.delimiter,
        Local::now().date_naive(),
    );

    let is_json = match args.format {
        InputFormat::Json => true,
        InputFormat::Csv => false,
        InputFormat::Auto => args
            .file
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("json")),
    };
    if !is_json {
        return Ok((parser.parse_delimited(&text).records, "delimited export"));
    }

    match serde_json::from_str::<Vec<Record>>(&text) {
        Ok(mut records) => {
            records.iter_mut().for_each(classify::apply);
            Ok((records, "collection"))
        }
        Err(_) => Ok((parser.parse_json(&text)?.records, "JSON export")),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let (mut records, source) = load(&args)?;
    println!("Loaded {} records from {} ({})", records.len(), args.file.display(), source);

    let stats = Stats::compute(&records, source, chrono::Utc::now());
    let widest = stats.by_bucket.values().copied().max().unwrap_or(0).max(1);

    println!("\n{:=<60}", "");
    println!("Rating histogram");
    for (bucket, count) in &stats.by_bucket {
        let bar = "#".repeat(count * 40 / widest);
        println!("  {:>8}  {:>6}  {}", bucket, count, bar);
    }

    println!("\nStatus breakdown (heuristic: rating/comment presence)");
    for status in Status::ALL {
        let count = stats.by_status.get(status.as_str()).copied().unwrap_or(0);
        let pct = if stats.total == 0 {
            0.0
        } else {
            100.0 * count as f64 / stats.total as f64
        };
        println!("  {:>10}  {:>6}  ({:.1}%)", status.as_str(), count, pct);
    }

    records.retain(|r| r.rating_value() == Some(5));
    records.sort_by(|a, b| b.mark_date.cmp(&a.mark_date));
    println!("\nMost recent 5-star entries");
    for r in records.iter().take(args.top) {
        let by = r.contributors.join(", ");
        println!("  {}  {} ({}) {}", r.mark_date, r.title, r.year, by);
    }
    println!("{:=<60}", "");
    Ok(())
}
