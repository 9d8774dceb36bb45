//! Record parser: delimited exports and JSON exports into `Record`s.
//!
//! Delimited input is split into rows with minimal quote handling (a
//! delimiter or line break inside a quoted span is not a boundary, quote
//! characters are dropped). Rows are mapped by header name when a header is present or
//! configured, and by position otherwise. Any row that fails is logged and
//! skipped; a bad row never aborts the batch.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::card::{CardLayout, CARD_SEPARATOR};
use crate::classify;
use crate::error::RowError;
use crate::models::{MediaKind, Record, UNRATED};
use crate::normalize::{
    clean_field, date_part, first_year, is_numeric_id, is_url_like, subject_id, DATE_ANYWHERE,
    IMAGE_URL, SUBJECT_URL,
};

/// Ordered fields from one delimited line.
pub type RawRow = Vec<String>;

/// Records parsed from one export plus the number of rows that were skipped.
#[derive(Debug, Default)]
pub struct ParseReport {
    pub records: Vec<Record>,
    pub skipped: usize,
}

impl ParseReport {
    fn push(&mut self, location: usize, result: Result<Record, RowError>) {
        match result {
            Ok(record) => self.records.push(record),
            Err(e) => {
                warn!(row = location, error = %e, "skipping row");
                self.skipped += 1;
            }
        }
    }
}

// ============================================================================
// Splitting
// ============================================================================

/// Split one line on `delim`, treating quoted spans as opaque.
/// Quote characters toggle the quoted state and are not copied.
pub fn split_quoted(line: &str, delim: char) -> RawRow {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in line.chars() {
        match ch {
            '"' => in_quotes = !in_quotes,
            c if c == delim && !in_quotes => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);
    fields
}

/// Group physical lines into logical rows, continuing a row while a quoted
/// span is open. Each row carries the 1-based line it starts on; blank lines
/// between rows are dropped.
fn logical_rows(text: &str) -> Vec<(usize, String)> {
    let mut rows = Vec::new();
    let mut pending: Option<(usize, String)> = None;
    let mut open = false;

    for (i, line) in text.lines().enumerate() {
        match pending.as_mut() {
            Some((_, row)) => {
                row.push('\n');
                row.push_str(line);
            }
            None if line.trim().is_empty() => continue,
            None => pending = Some((i + 1, line.to_string())),
        }
        open ^= line.matches('"').count() % 2 == 1;
        if !open {
            rows.extend(pending.take());
        }
    }
    rows.extend(pending);
    rows
}

fn has_open_quote(row: &str) -> bool {
    row.matches('"').count() % 2 == 1
}

// ============================================================================
// Intermediate Row Shape
// ============================================================================

/// Raw string fields gathered by either front end before normalization.
#[derive(Debug, Default)]
struct RowFields {
    id: String,
    title: String,
    rating: String,
    card: String,
    date: String,
    comment: String,
    image_url: String,
    source_url: String,
    /// Explicit year (JSON exports); card and pubdate are fallbacks
    year: String,
    /// Explicit names (JSON exports); card decomposition is the fallback
    contributors: Vec<String>,
    genres: Vec<String>,
    pubdate: String,
    tags: String,
    intro: String,
    site_rating: String,
    source_status: Option<String>,
    /// Whole raw line, searched when the id field is unusable
    raw: String,
}

/// Header name → column position
struct ColumnIndex(FxHashMap<String, usize>);

impl ColumnIndex {
    fn new(names: &[String]) -> Self {
        let mut map = FxHashMap::default();
        for (i, name) in names.iter().enumerate() {
            map.entry(clean_field(name).to_lowercase()).or_insert(i);
        }
        Self(map)
    }

    fn get(&self, row: &RawRow, name: &str) -> String {
        self.0
            .get(name)
            .and_then(|&i| row.get(i))
            .map(|s| clean_field(s))
            .unwrap_or_default()
    }
}

// ============================================================================
// Parser
// ============================================================================

/// Turns export rows into classified records for one data type.
pub struct RecordParser {
    kind: MediaKind,
    layout: CardLayout,
    delimiter: char,
    columns: Option<Vec<String>>,
    today: NaiveDate,
}

impl RecordParser {
    /// `today` is the mark date given to rows that carry none. `kind` picks
    /// the subject URL built for JSON entries that lack one.
    pub fn new(kind: MediaKind, layout: CardLayout, delimiter: char, today: NaiveDate) -> Self {
        Self {
            kind,
            layout,
            delimiter,
            columns: None,
            today,
        }
    }

    /// Column names to use when the export has no header row.
    pub fn with_columns(mut self, columns: Option<Vec<String>>) -> Self {
        self.columns = columns.filter(|c| !c.is_empty());
        self
    }

    /// Parse a delimited export (CSV/TSV).
    pub fn parse_delimited(&self, text: &str) -> ParseReport {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let mut rows = logical_rows(text).into_iter().peekable();
        let mut report = ParseReport::default();

        let header = match rows.peek() {
            Some((_, line)) if is_header(line, self.delimiter) => {
                let columns = ColumnIndex::new(&split_quoted(line, self.delimiter));
                rows.next();
                Some(columns)
            }
            _ => self.columns.as_deref().map(ColumnIndex::new),
        };

        for (line_no, line) in rows {
            let result = if has_open_quote(&line) {
                Err(RowError::Malformed("unterminated quoted field".to_string()))
            } else {
                match &header {
                    Some(columns) => self.parse_row(columns, &line),
                    None => self.parse_positional(&line),
                }
            };
            report.push(line_no, result);
        }
        report
    }

    fn parse_row(&self, columns: &ColumnIndex, line: &str) -> Result<Record, RowError> {
        let row = split_quoted(line, self.delimiter);
        let genres = columns.get(&row, "genres");
        let fields = RowFields {
            id: columns.get(&row, "id"),
            title: columns.get(&row, "title"),
            rating: columns.get(&row, "star"),
            card: columns.get(&row, "card"),
            date: columns.get(&row, "star_time"),
            comment: columns.get(&row, "comment"),
            image_url: columns.get(&row, "poster"),
            source_url: columns.get(&row, "url"),
            genres: split_list(&genres),
            pubdate: columns.get(&row, "pubdate"),
            tags: columns.get(&row, "tags"),
            intro: columns.get(&row, "intro"),
            site_rating: columns.get(&row, "rating"),
            raw: line.to_string(),
            ..Default::default()
        };
        self.finish(fields)
    }

    /// Headerless line: id first, title second, composite card trailing.
    fn parse_positional(&self, line: &str) -> Result<Record, RowError> {
        let row = split_quoted(line, self.delimiter);
        if row.len() < 2 {
            return Err(RowError::Malformed(format!(
                "expected at least 2 fields, found {}",
                row.len()
            )));
        }

        let card = row
            .iter()
            .skip(2)
            .rev()
            .find(|f| f.contains(CARD_SEPARATOR))
            .or_else(|| row.last())
            .map(|s| clean_field(s))
            .unwrap_or_default();

        // headerless rating: a lone 1-5 digit between two delimiters
        let rating = row[2..]
            .iter()
            .map(|f| f.trim())
            .find(|f| matches!(f.as_bytes(), [b'1'..=b'5']))
            .unwrap_or_default()
            .to_string();
        let sep = self.delimiter.to_string();
        let rest = row[2..].join(sep.as_str());

        let fields = RowFields {
            id: clean_field(&row[0]),
            title: clean_field(&row[1]),
            rating,
            card,
            date: DATE_ANYWHERE
                .find(&rest)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            image_url: IMAGE_URL
                .find(line)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            source_url: SUBJECT_URL
                .find(line)
                .map(|m| m.as_str().to_string())
                .unwrap_or_default(),
            raw: line.to_string(),
            ..Default::default()
        };
        self.finish(fields)
    }

    /// Parse a JSON export: an array of flat or interest-shaped objects.
    /// A document that is not an array is an error; a bad element is skipped.
    pub fn parse_json(&self, text: &str) -> Result<ParseReport> {
        let entries: Vec<Value> =
            serde_json::from_str(text).context("JSON export must be an array of objects")?;
        let mut report = ParseReport::default();
        for (i, entry) in entries.into_iter().enumerate() {
            let result = serde_json::from_value::<JsonEntry>(entry)
                .map_err(RowError::from)
                .and_then(|e| self.finish(e.into_fields(self.kind)));
            report.push(i, result);
        }
        Ok(report)
    }

    /// Normalize gathered fields into a classified record.
    fn finish(&self, f: RowFields) -> Result<Record, RowError> {
        let id = if is_numeric_id(&f.id) {
            f.id.clone()
        } else {
            subject_id(&f.source_url)
                .or_else(|| subject_id(&f.raw))
                .ok_or_else(|| RowError::MissingId(f.id.clone()))?
        };

        let mark_date = if f.date.trim().is_empty() {
            self.today
        } else {
            date_part(&f.date)
                .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                .ok_or_else(|| RowError::BadDate(f.date.clone()))?
        };

        let title = if f.title.is_empty() || is_url_like(&f.title) {
            f.card
                .split(CARD_SEPARATOR)
                .next()
                .map(str::trim)
                .filter(|s| !s.is_empty() && !is_url_like(s))
                .unwrap_or_default()
                .to_string()
        } else {
            f.title
        };

        let card = self.layout.decompose(&f.card);
        let year = [&f.year, &card.year]
            .into_iter()
            .find_map(|s| first_year(s))
            .or_else(|| first_year(&f.pubdate))
            .unwrap_or_default();

        let mut record = Record::new(id, mark_date);
        record.title = title;
        record.year = year;
        record.rating_raw = normalize_rating(&f.rating)?;
        record.contributors = if f.contributors.is_empty() {
            card.contributors
        } else {
            f.contributors
        };
        record.secondary = card.secondary;
        record.publisher = card.publisher;
        record.genres = if f.genres.is_empty() { card.genres } else { f.genres };
        record.image_url = f.image_url;
        record.source_url = f.source_url;
        record.comment = f.comment.trim().to_string();
        record.tags = f.tags;
        record.intro = f.intro;
        record.pubdate = f.pubdate;
        record.site_rating = f.site_rating;
        record.source_status = f.source_status;
        classify::apply(&mut record);
        Ok(record)
    }
}

/// First line is a header when its first field is `id`.
fn is_header(line: &str, delim: char) -> bool {
    split_quoted(line, delim)
        .first()
        .map(|f| clean_field(f).trim_start_matches('\u{feff}').eq_ignore_ascii_case("id"))
        .unwrap_or(false)
}

/// Comma-joined list column ("剧情,爱情") into trimmed items.
fn split_list(s: &str) -> Vec<String> {
    s.split([',', '，'])
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_string)
        .collect()
}

/// Empty/null ratings become the sentinel; numbers must lie in 1..=5.
fn normalize_rating(raw: &str) -> Result<String, RowError> {
    let t = raw.trim();
    if t.is_empty() || t.eq_ignore_ascii_case(UNRATED) || t.eq_ignore_ascii_case("null") {
        return Ok(UNRATED.to_string());
    }
    match t.parse::<f64>() {
        Ok(v) if v.fract() == 0.0 && (1.0..=5.0).contains(&v) => Ok(format!("{}", v as u8)),
        Ok(_) => Err(RowError::RatingOutOfRange(t.to_string())),
        Err(_) => Err(RowError::Malformed(format!("rating {:?} is not a number", t))),
    }
}

// ============================================================================
// JSON Export Shapes
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JsonEntry {
    Interest(InterestEntry),
    Flat(FlatEntry),
}

/// User interest wrapping a subject (mobile API export)
#[derive(Debug, Deserialize)]
struct InterestEntry {
    #[serde(default)]
    rating: Value,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    create_time: Option<String>,
    #[serde(default)]
    status: Option<String>,
    subject: Subject,
}

#[derive(Debug, Deserialize)]
struct Subject {
    id: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    year: Value,
    #[serde(default)]
    directors: Vec<NameValue>,
    #[serde(default, alias = "author")]
    authors: Vec<NameValue>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    pic: Option<Pic>,
    #[serde(default)]
    cover_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    card_subtitle: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Pic {
    #[serde(default)]
    normal: Option<String>,
    #[serde(default)]
    large: Option<String>,
}

/// Flat per-item object (scraper export)
#[derive(Debug, Deserialize)]
struct FlatEntry {
    id: Value,
    #[serde(default)]
    title: String,
    #[serde(default)]
    year: Value,
    #[serde(default)]
    rating: Value,
    #[serde(default)]
    directors: Vec<NameValue>,
    #[serde(default, alias = "author")]
    authors: Vec<NameValue>,
    #[serde(default)]
    genres: Vec<String>,
    #[serde(default)]
    pic: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    card: Option<String>,
    #[serde(default)]
    create_time: Option<String>,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    #[serde(default)]
    review: Option<String>,
}

/// A person given either as a bare string or as `{ "name": ... }`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NameValue {
    Plain(String),
    Named { name: String },
}

impl NameValue {
    fn into_name(self) -> String {
        match self {
            NameValue::Plain(s) | NameValue::Named { name: s } => s.trim().to_string(),
        }
    }
}

fn names(primary: Vec<NameValue>, alt: Vec<NameValue>) -> Vec<String> {
    let list = if primary.is_empty() { alt } else { primary };
    list.into_iter()
        .map(NameValue::into_name)
        .filter(|n| !n.is_empty())
        .collect()
}

/// Scalar JSON value as text: strings as-is, numbers printed, null empty.
fn value_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

/// Ratings arrive as null, 5, "5", 5.0 or `{ "value": 5, "max": 5 }`.
fn rating_text(v: &Value) -> String {
    match v {
        Value::Object(map) => map.get("value").map(rating_text).unwrap_or_default(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        other => value_text(other),
    }
}

impl JsonEntry {
    fn into_fields(self, kind: MediaKind) -> RowFields {
        match self {
            JsonEntry::Interest(e) => {
                let s = e.subject;
                let id = value_text(&s.id);
                let source_url = s.url.unwrap_or_else(|| kind.subject_url(&id));
                let image_url = s
                    .pic
                    .and_then(|p| p.normal.or(p.large))
                    .or(s.cover_url)
                    .unwrap_or_default();
                RowFields {
                    raw: source_url.clone(),
                    id,
                    title: s.title.trim().to_string(),
                    rating: rating_text(&e.rating),
                    card: s.card_subtitle.unwrap_or_default(),
                    date: e.create_time.unwrap_or_default(),
                    comment: e.comment.unwrap_or_default(),
                    image_url,
                    source_url,
                    year: value_text(&s.year),
                    contributors: names(s.directors, s.authors),
                    genres: s.genres,
                    source_status: e.status,
                    ..Default::default()
                }
            }
            JsonEntry::Flat(e) => {
                let id = value_text(&e.id);
                let source_url = e.url.unwrap_or_else(|| kind.subject_url(&id));
                RowFields {
                    raw: source_url.clone(),
                    id,
                    title: e.title.trim().to_string(),
                    rating: rating_text(&e.rating),
                    card: e.card.unwrap_or_default(),
                    date: e.create_time.or(e.date).unwrap_or_default(),
                    comment: e.comment.or(e.review).unwrap_or_default(),
                    image_url: e.pic.or(e.image).unwrap_or_default(),
                    source_url,
                    year: value_text(&e.year),
                    contributors: names(e.directors, e.authors),
                    genres: e.genres,
                    ..Default::default()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 18).unwrap()
    }

    fn book_parser() -> RecordParser {
        RecordParser::new(MediaKind::Book, CardLayout::book(), ',', today())
    }

    const HEADER: &str = "id,title,star,card,star_time,comment,poster,url";

    #[test]
    fn test_split_quoted_keeps_embedded_delimiter() {
        let row = split_quoted(r#"1,"title, with comma",5"#, ',');
        assert_eq!(row, vec!["1", "title, with comma", "5"]);
    }

    #[test]
    fn test_split_quoted_empty_fields() {
        assert_eq!(split_quoted("a,,b,", ','), vec!["a", "", "b", ""]);
        assert_eq!(split_quoted("a\tb", '\t'), vec!["a", "b"]);
    }

    #[test]
    fn test_header_row_example() {
        let text = format!(
            "{}\n1400705,\"情人\",5,\"[法] 玛格丽特·杜拉斯 / 2005\",\"2020-01-01 00:00:00\",\"\",,https://x/subject/1400705/\n",
            HEADER
        );
        let report = book_parser().parse_delimited(&text);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.records.len(), 1);
        let r = &report.records[0];
        assert_eq!(r.id, "1400705");
        assert_eq!(r.title, "情人");
        assert_eq!(r.rating_raw, "5");
        assert_eq!(r.year, "2005");
        assert_eq!(r.contributors, vec!["玛格丽特·杜拉斯".to_string()]);
        assert_eq!(r.mark_date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(r.source_url, "https://x/subject/1400705/");
        assert_eq!(r.status, Status::Rated);
    }

    #[test]
    fn test_quoted_title_with_comma() {
        let text = format!(
            "{}\n42,\"title, with comma\",,\"甲 / 1999\",2021-02-03,note,,https://x/subject/42/",
            HEADER
        );
        let report = book_parser().parse_delimited(&text);
        let r = &report.records[0];
        assert_eq!(r.title, "title, with comma");
        assert_eq!(r.rating_raw, UNRATED);
        assert_eq!(r.status, Status::NotedOnly);
    }

    #[test]
    fn test_id_recovered_from_url() {
        let text = format!(
            "{}\nabc,书,4,\"甲 / 2001\",,,,https://book.douban.com/subject/777/",
            HEADER
        );
        let report = book_parser().parse_delimited(&text);
        assert_eq!(report.records[0].id, "777");
        // missing date defaults to the processing date
        assert_eq!(report.records[0].mark_date, today());
    }

    #[test]
    fn test_title_recovered_from_card_when_url_like() {
        let text = format!(
            "{}\n9,https://x/subject/9/,3,\"某标题 / 2001\",2020-05-01,,,https://x/subject/9/",
            HEADER
        );
        let report = book_parser().parse_delimited(&text);
        assert_eq!(report.records[0].title, "某标题");
    }

    #[test]
    fn test_bad_rows_are_skipped_not_fatal() {
        let text = format!(
            "{}\n1,a,7,,2020-01-01,,,\nnope,b,3,,2020-01-01,,,\n2,c,3,,not-a-date,,,\n3,d,2,,2020-01-02,,,",
            HEADER
        );
        let report = book_parser().parse_delimited(&text);
        assert_eq!(report.skipped, 3);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].id, "3");
    }

    #[test]
    fn test_crlf_and_blank_lines() {
        let text = format!("{}\r\n\r\n5,x,1,,2020-01-01,,,\r\n", HEADER);
        let report = book_parser().parse_delimited(&text);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].rating_raw, "1");
    }

    #[test]
    fn test_quoted_comment_spanning_lines_stays_one_row() {
        let text = format!(
            "{}\n123,\"活着\",5,\"余华 / 2012\",2019-06-01,\"第一行\n第二行 https://book.douban.com/subject/123/\",,https://book.douban.com/subject/123/\n124,b,4,,2019-06-02,,,",
            HEADER
        );
        let report = book_parser().parse_delimited(&text);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.records.len(), 2);
        let r = &report.records[0];
        assert_eq!(r.id, "123");
        assert_eq!(r.rating_raw, "5");
        assert_eq!(r.comment, "第一行\n第二行 https://book.douban.com/subject/123/");
        assert_eq!(r.source_url, "https://book.douban.com/subject/123/");
        assert_eq!(report.records[1].id, "124");
    }

    #[test]
    fn test_unterminated_quote_is_skipped() {
        let text = format!("{}\n1,a,5,,2020-01-01,,,\n2,\"b,3,,2020-01-01,,,\n", HEADER);
        let report = book_parser().parse_delimited(&text);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.records.len(), 1);
        assert_eq!(report.records[0].id, "1");
    }

    #[test]
    fn test_logical_rows_keep_start_line() {
        let rows = logical_rows("a\n\n\"b\n\nc\"\nd");
        assert_eq!(
            rows,
            vec![
                (1, "a".to_string()),
                (3, "\"b\n\nc\"".to_string()),
                (6, "d".to_string())
            ]
        );
    }

    #[test]
    fn test_configured_columns_without_header() {
        let parser = book_parser().with_columns(Some(
            HEADER.split(',').map(str::to_string).collect(),
        ));
        let report = parser.parse_delimited("8,t,2,\"甲 / 2010\",2020-01-01,,,");
        assert_eq!(report.records[0].id, "8");
        assert_eq!(report.records[0].year, "2010");
    }

    #[test]
    fn test_positional_fallback() {
        let line = r#"123,"活着",5,"余华 / 2012 / 作家出版社",2019-06-01,https://img1.doubanio.com/view/subject/s/public/s1.jpg,https://book.douban.com/subject/123/"#;
        let report = book_parser().parse_delimited(line);
        assert_eq!(report.skipped, 0);
        let r = &report.records[0];
        assert_eq!(r.id, "123");
        assert_eq!(r.title, "活着");
        assert_eq!(r.rating_raw, "5");
        assert_eq!(r.contributors, vec!["余华".to_string()]);
        assert_eq!(r.publisher.as_deref(), Some("作家出版社"));
        assert_eq!(r.mark_date, NaiveDate::from_ymd_opt(2019, 6, 1).unwrap());
        assert!(r.image_url.ends_with("s1.jpg"));
        assert_eq!(r.source_url, "https://book.douban.com/subject/123/");
    }

    #[test]
    fn test_positional_bad_id_and_title() {
        let line = r#"x1,,"余华 / 2012",https://book.douban.com/subject/456/"#;
        let report = book_parser().parse_delimited(line);
        let r = &report.records[0];
        assert_eq!(r.id, "456");
        assert_eq!(r.title, "余华");
        assert_eq!(r.rating_raw, UNRATED);
    }

    #[test]
    fn test_json_interest_entries() {
        let text = r#"[
            {"rating": null, "comment": "", "create_time": "2025-08-05 10:14:19", "status": "done",
             "subject": {"id": "36996737", "title": "简·奥斯汀毁了我的生活", "year": "2024",
                         "directors": [{"name": "劳拉·皮亚尼"}], "genres": ["喜剧", "爱情"],
                         "pic": {"normal": "https://img9.doubanio.com/p1.jpg"},
                         "url": "https://movie.douban.com/subject/36996737/",
                         "card_subtitle": "2024 / 法国 / 喜剧 爱情 / 劳拉·皮亚尼 / 卡米莉·拉瑟福德"}},
            {"rating": {"value": 5, "max": 5}, "comment": "好", "create_time": "2025-01-01",
             "subject": {"id": 1292052, "title": "肖申克的救赎"}},
            {"rating": 9, "subject": {"id": "1"}},
            {"nonsense": true}
        ]"#;
        let parser = RecordParser::new(MediaKind::Movie, CardLayout::movie(), ',', today());
        let report = parser.parse_json(text).unwrap();
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.skipped, 2);

        let first = &report.records[0];
        assert_eq!(first.id, "36996737");
        assert_eq!(first.rating_raw, UNRATED);
        assert_eq!(first.status, Status::Unmarked);
        assert_eq!(first.contributors, vec!["劳拉·皮亚尼".to_string()]);
        assert_eq!(first.secondary, vec!["卡米莉·拉瑟福德".to_string()]);
        assert_eq!(first.source_status.as_deref(), Some("done"));
        assert_eq!(first.image_url, "https://img9.doubanio.com/p1.jpg");

        let second = &report.records[1];
        assert_eq!(second.id, "1292052");
        assert_eq!(second.rating_raw, "5");
        assert_eq!(second.source_url, "https://movie.douban.com/subject/1292052/");
    }

    #[test]
    fn test_json_flat_entries() {
        let text = r#"[{"id": 7, "title": "Heat", "year": 1995, "rating": "5", "directors": ["Michael Mann"],
                        "pic": "https://img/p7.jpg", "date": "2020-02-02", "review": "great"}]"#;
        let parser = RecordParser::new(MediaKind::Movie, CardLayout::movie(), ',', today());
        let report = parser.parse_json(text).unwrap();
        let r = &report.records[0];
        assert_eq!(r.id, "7");
        assert_eq!(r.contributors, vec!["Michael Mann".to_string()]);
        assert_eq!(r.comment, "great");
        assert_eq!(r.image_url, "https://img/p7.jpg");
        assert_eq!(r.year, "1995");
    }

    #[test]
    fn test_json_book_entry_gets_book_subject_url() {
        let text = r#"[{"id": 1400705, "title": "情人", "rating": 5, "date": "2020-01-01"}]"#;
        let report = book_parser().parse_json(text).unwrap();
        assert_eq!(
            report.records[0].source_url,
            "https://book.douban.com/subject/1400705/"
        );
    }

    #[test]
    fn test_json_document_must_be_array() {
        let parser = RecordParser::new(MediaKind::Movie, CardLayout::movie(), ',', today());
        assert!(parser.parse_json(r#"{"id": 1}"#).is_err());
    }

    #[test]
    fn test_normalize_rating() {
        assert_eq!(normalize_rating("").unwrap(), UNRATED);
        assert_eq!(normalize_rating("null").unwrap(), UNRATED);
        assert_eq!(normalize_rating("4").unwrap(), "4");
        assert_eq!(normalize_rating("5.0").unwrap(), "5");
        assert!(matches!(normalize_rating("0"), Err(RowError::RatingOutOfRange(_))));
        assert!(matches!(normalize_rating("x"), Err(RowError::Malformed(_))));
    }
}
