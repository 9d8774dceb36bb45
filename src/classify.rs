//! Three-way status inference and collection inclusion policy.
//!
//! The classifier only reports what the rating/comment pair looks like.
//! Whether `Unmarked` items belong in a collection is a caller decision,
//! expressed as a [`Selection`] in the pipeline configuration.

use serde::{Deserialize, Serialize};

use crate::models::{Record, Status};

/// Classify from the raw rating and the comment.
pub fn classify(rating_raw: &str, comment: &str) -> Status {
    let rated = matches!(rating_raw.trim().parse::<u8>(), Ok(1..=5));
    if rated {
        Status::Rated
    } else if !comment.trim().is_empty() {
        Status::NotedOnly
    } else {
        Status::Unmarked
    }
}

/// Stamp a record with its status. Pure function of rating and comment,
/// so re-stamping a reloaded record never changes a stored value.
pub fn apply(record: &mut Record) {
    record.status = classify(&record.rating_raw, &record.comment);
}

/// Which classified records a collection admits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Selection {
    /// Statuses admitted into the collection
    pub statuses: Vec<Status>,
    /// When set, rated records also need at least this rating
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_rating: Option<u8>,
}

impl Selection {
    /// Every record, whatever its status.
    pub fn everything() -> Self {
        Self {
            statuses: Status::ALL.to_vec(),
            min_rating: None,
        }
    }

    /// Only rated records with a rating of at least `min`.
    pub fn rated_at_least(min: u8) -> Self {
        Self {
            statuses: vec![Status::Rated],
            min_rating: Some(min),
        }
    }

    pub fn admits(&self, record: &Record) -> bool {
        if !self.statuses.contains(&record.status) {
            return false;
        }
        match (self.min_rating, record.rating_value()) {
            (Some(min), Some(value)) => value >= min,
            // min_rating only constrains records that carry a rating
            (Some(_), None) => record.status != Status::Rated,
            (None, _) => true,
        }
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::everything()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(rating: &str, comment: &str) -> Record {
        let mut r = Record::new("1", NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        r.rating_raw = rating.to_string();
        r.comment = comment.to_string();
        apply(&mut r);
        r
    }

    #[test]
    fn test_classify_rated() {
        for n in ["1", "2", "3", "4", "5", " 5 "] {
            assert_eq!(classify(n, ""), Status::Rated, "rating {:?}", n);
        }
    }

    #[test]
    fn test_classify_noted_only() {
        assert_eq!(classify("unrated", "worth a reread"), Status::NotedOnly);
        assert_eq!(classify("", "好"), Status::NotedOnly);
        assert_eq!(classify("0", "x"), Status::NotedOnly);
    }

    #[test]
    fn test_classify_unmarked() {
        assert_eq!(classify("unrated", ""), Status::Unmarked);
        assert_eq!(classify("", "   "), Status::Unmarked);
        assert_eq!(classify("9", ""), Status::Unmarked);
    }

    #[test]
    fn test_total_coverage() {
        // every combination lands in exactly one bucket
        let ratings = ["", "unrated", "0", "1", "3", "5", "6", "abc"];
        let comments = ["", " ", "note"];
        for r in ratings {
            for c in comments {
                let status = classify(r, c);
                assert_eq!(
                    Status::ALL.iter().filter(|s| **s == status).count(),
                    1
                );
            }
        }
    }

    #[test]
    fn test_selection_five_star() {
        let sel = Selection::rated_at_least(5);
        assert!(sel.admits(&record("5", "")));
        assert!(!sel.admits(&record("4", "")));
        assert!(!sel.admits(&record("unrated", "note")));
        assert!(!sel.admits(&record("unrated", "")));
    }

    #[test]
    fn test_selection_consumed() {
        let sel = Selection {
            statuses: vec![Status::Rated, Status::NotedOnly],
            min_rating: None,
        };
        assert!(sel.admits(&record("2", "")));
        assert!(sel.admits(&record("unrated", "note")));
        assert!(!sel.admits(&record("unrated", "")));
    }

    #[test]
    fn test_selection_everything() {
        assert!(Selection::everything().admits(&record("unrated", "")));
    }
}
