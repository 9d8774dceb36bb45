//! Core data models for the ingestion pipeline.
//!
//! This module contains the normalized `Record`, its classification
//! `Status`, the media kinds the pipeline knows about, and the
//! display-shaped view written to the public collection file.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ============================================================================
// Constants
// ============================================================================

/// Sentinel stored in the rating field when the export carries no personal rating.
pub const UNRATED: &str = "unrated";

fn unrated() -> String {
    UNRATED.to_string()
}

// ============================================================================
// Media Kinds
// ============================================================================

/// Data type being ingested. Selects presets (paths, card layout, CDN path).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Book,
}

impl MediaKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Book => "book",
        }
    }

    /// Plural noun used in file names and summaries ("movies", "books")
    pub fn plural(self) -> &'static str {
        match self {
            MediaKind::Movie => "movies",
            MediaKind::Book => "books",
        }
    }

    /// Site root for this kind; also the Referer sent with asset requests.
    pub fn site_root(self) -> &'static str {
        match self {
            MediaKind::Movie => "https://movie.douban.com/",
            MediaKind::Book => "https://book.douban.com/",
        }
    }

    /// Canonical subject page for an id of this kind.
    pub fn subject_url(self, id: &str) -> String {
        format!("{}subject/{}/", self.site_root(), id)
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Heuristic consumption status inferred from rating and comment.
///
/// The source site distinguishes "rated", "commented" and "planned" states
/// imperfectly, so this is a proxy rather than ground truth:
///
/// - `Rated`: a personal rating 1..=5 is present
/// - `NotedOnly`: no valid rating, but a non-blank comment
/// - `Unmarked`: neither; often a "want to read/watch" mark, but an item
///   consumed without rating or comment looks identical
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum Status {
    Rated,
    NotedOnly,
    #[default]
    Unmarked,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Rated, Status::NotedOnly, Status::Unmarked];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Rated => "rated",
            Status::NotedOnly => "notedOnly",
            Status::Unmarked => "unmarked",
        }
    }
}

// ============================================================================
// Records
// ============================================================================

/// One normalized unit of consumed-media metadata (a book or a movie).
///
/// Created by the parser, stamped by the classifier, and possibly given a
/// CDN image URL by the asset resolver before it is first persisted.
/// Persisted files of either shape (display or backup) deserialize back
/// into this struct; absent fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub year: String,
    /// Raw personal rating: "1".."5" or [`UNRATED`]
    #[serde(rename = "rating", default = "unrated")]
    pub rating_raw: String,
    /// Authors for books, directors for movies
    #[serde(default)]
    pub contributors: Vec<String>,
    /// Contributors in a secondary role (cast, translators)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondary: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub source_url: String,
    pub mark_date: NaiveDate,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub status: Status,

    // Backup-only extras carried through from the export
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tags: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub intro: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pubdate: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub site_rating: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_status: Option<String>,
}

impl Record {
    /// Bare record with only the required fields set.
    pub fn new(id: impl Into<String>, mark_date: NaiveDate) -> Self {
        Self {
            id: id.into(),
            title: String::new(),
            year: String::new(),
            rating_raw: unrated(),
            contributors: Vec::new(),
            secondary: Vec::new(),
            publisher: None,
            genres: Vec::new(),
            image_url: String::new(),
            source_url: String::new(),
            mark_date,
            comment: String::new(),
            status: Status::Unmarked,
            tags: String::new(),
            intro: String::new(),
            pubdate: String::new(),
            site_rating: String::new(),
            source_status: None,
        }
    }

    /// Personal rating as a number, only when it lies in 1..=5.
    pub fn rating_value(&self) -> Option<u8> {
        match self.rating_raw.trim().parse::<u8>() {
            Ok(n @ 1..=5) => Some(n),
            _ => None,
        }
    }
}

/// Public-facing subset of a record, as written to the display collection.
#[derive(Debug, Serialize)]
pub struct DisplayRecord<'a> {
    pub id: &'a str,
    pub title: &'a str,
    pub year: &'a str,
    pub rating: &'a str,
    pub contributors: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<&'a str>,
    pub genres: &'a [String],
    pub image_url: &'a str,
    pub source_url: &'a str,
    pub mark_date: NaiveDate,
    pub comment: &'a str,
}

impl<'a> From<&'a Record> for DisplayRecord<'a> {
    fn from(r: &'a Record) -> Self {
        Self {
            id: &r.id,
            title: &r.title,
            year: &r.year,
            rating: &r.rating_raw,
            contributors: &r.contributors,
            publisher: r.publisher.as_deref(),
            genres: &r.genres,
            image_url: &r.image_url,
            source_url: &r.source_url,
            mark_date: r.mark_date,
            comment: &r.comment,
        }
    }
}
