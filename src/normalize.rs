//! Shared text normalization helpers for export fields.
//! Used by the card decomposer and both parser front ends (CSV and JSON).

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// REGEX PATTERNS
// ============================================================================

/// Subject id embedded in a source URL: "https://book.douban.com/subject/1400705/"
pub static SUBJECT_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"/subject/(\d+)").unwrap());

/// Whole subject URL somewhere in a raw line
pub static SUBJECT_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s,"]*/subject/\d+/?"#).unwrap());

/// Direct image URL somewhere in a raw line
pub static IMAGE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)https?://[^\s,"]+\.(?:jpe?g|webp|png)"#).unwrap());

/// First run of four consecutive digits
pub static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d{4}").unwrap());

/// Calendar date at the start of a timestamp: "2020-01-01 00:00:00"
pub static DATE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4}-\d{1,2}-\d{1,2})(?:[ T].*)?$").unwrap());

/// Calendar date anywhere in a raw line (headerless exports)
pub static DATE_ANYWHERE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").unwrap());

/// Nationality/role marker in front of a name: "[法] ", "(美)", "（日）", "【英】"
pub static NATIONALITY_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[\[【(（〔][^\]】)）〕]{1,12}[\]】)）〕]\s*").unwrap());

/// Separators between several contributors inside one card sub-field
pub static CONTRIBUTOR_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*[,、]\s*").unwrap());

// ============================================================================
// NORMALIZATION FUNCTIONS
// ============================================================================

/// NFKC fold: full-width digits, commas and brackets become their ASCII forms.
/// "（美）２００５，" → "(美)2005,"
pub fn fold_width(s: &str) -> String {
    s.nfkc().collect()
}

/// Field looks like a link rather than human text.
pub fn is_url_like(s: &str) -> bool {
    let t = s.trim();
    t.contains("://") || t.starts_with("www.")
}

/// Non-empty and made of ASCII digits only.
pub fn is_numeric_id(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Recover a subject id from any text containing a subject URL.
pub fn subject_id(text: &str) -> Option<String> {
    SUBJECT_ID
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// First 4-digit run in the text.
pub fn first_year(text: &str) -> Option<String> {
    YEAR.find(text).map(|m| m.as_str().to_string())
}

/// Drop a leading nationality/role bracket from a name.
pub fn strip_nationality(name: &str) -> &str {
    match NATIONALITY_PREFIX.find(name) {
        Some(m) => name[m.end()..].trim(),
        None => name.trim(),
    }
}

/// Split a sub-field holding one or more names into trimmed, bracket-free names.
/// Expects width-folded input, so "，" has already become ",".
pub fn split_contributors(field: &str) -> Vec<String> {
    CONTRIBUTOR_SEPARATOR
        .split(field)
        .map(strip_nationality)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Date part of a timestamp, or None when the text is not a date.
/// "2020-01-01 00:00:00" → "2020-01-01"
pub fn date_part(s: &str) -> Option<&str> {
    DATE_PREFIX
        .captures(s.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Trim and strip any stray quote characters left by the splitter.
pub fn clean_field(s: &str) -> String {
    s.replace('"', "").trim().to_string()
}
