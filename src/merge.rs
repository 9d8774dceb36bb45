//! Incremental merge of freshly parsed records into a persisted collection.
//!
//! Identity is the record id and the first occurrence wins: an item already
//! on disk is never replaced by a newer export of the same item, and a
//! duplicate inside one batch keeps its earliest row.

use rustc_hash::FxHashSet;
use tracing::warn;

use crate::models::Record;

/// Records from `incoming` whose id is neither in `existing` nor earlier in
/// `incoming`. Input order is preserved.
pub fn unseen(existing: &[Record], incoming: &[Record]) -> Vec<Record> {
    let mut seen: FxHashSet<&str> = existing.iter().map(|r| r.id.as_str()).collect();
    incoming
        .iter()
        .filter(|r| seen.insert(r.id.as_str()))
        .cloned()
        .collect()
}

/// New records first, then the existing ones, with one entry per id.
///
/// `new_records` is expected to come from [`unseen`]; an id that still
/// shows up twice (e.g. a hand-edited collection file) keeps its first
/// occurrence and the rest are dropped with a warning.
pub fn merge(new_records: Vec<Record>, existing: Vec<Record>) -> Vec<Record> {
    let mut ids: FxHashSet<String> = FxHashSet::default();
    let mut merged = Vec::with_capacity(new_records.len() + existing.len());
    for record in new_records.into_iter().chain(existing) {
        if ids.insert(record.id.clone()) {
            merged.push(record);
        } else {
            warn!(id = %record.id, "dropping duplicate id in collection");
        }
    }
    merged
}

/// Stable sort by mark date, newest first. Equal dates keep merge order.
pub fn sort_by_mark_date_desc(records: &mut [Record]) {
    records.sort_by(|a, b| b.mark_date.cmp(&a.mark_date));
}

/// Keep at most `cap` records (the first ones, i.e. the newest after sorting).
pub fn trim(records: &mut Vec<Record>, cap: Option<usize>) {
    if let Some(cap) = cap {
        records.truncate(cap);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn rec(id: &str, date: (i32, u32, u32)) -> Record {
        let mut r = Record::new(id, NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap());
        r.title = format!("title-{}", id);
        r
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_unseen_filters_existing_and_batch_duplicates() {
        let existing = vec![rec("1", (2020, 1, 1))];
        let mut dup = rec("2", (2021, 1, 1));
        dup.title = "second copy".to_string();
        let incoming = vec![rec("1", (2022, 1, 1)), rec("2", (2021, 1, 1)), dup, rec("3", (2019, 1, 1))];

        let fresh = unseen(&existing, &incoming);
        assert_eq!(ids(&fresh), vec!["2", "3"]);
        assert_eq!(fresh[0].title, "title-2");
    }

    #[test]
    fn test_existing_record_is_never_replaced() {
        let mut old = rec("1", (2020, 1, 1));
        old.image_url = "https://cdn/1.jpg".to_string();
        let mut newer = rec("1", (2024, 1, 1));
        newer.image_url = "https://origin/1.jpg".to_string();

        let fresh = unseen(&[old.clone()], &[newer]);
        let merged = merge(fresh, vec![old]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].image_url, "https://cdn/1.jpg");
    }

    #[test]
    fn test_merge_is_idempotent() {
        let existing = vec![rec("1", (2020, 1, 1)), rec("2", (2020, 2, 1))];
        let incoming = vec![rec("3", (2021, 1, 1)), rec("1", (2020, 1, 1))];

        let once = merge(unseen(&existing, &incoming), existing);
        let twice = merge(unseen(&once, &incoming), once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_merge_drops_duplicates_in_existing() {
        let merged = merge(vec![rec("9", (2022, 1, 1))], vec![rec("1", (2020, 1, 1)), rec("1", (2019, 1, 1))]);
        assert_eq!(ids(&merged), vec!["9", "1"]);
        assert_eq!(merged[1].mark_date, NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
    }

    #[test]
    fn test_sort_is_descending_and_stable() {
        let mut records = vec![
            rec("a", (2020, 1, 1)),
            rec("b", (2022, 1, 1)),
            rec("c", (2020, 1, 1)),
            rec("d", (2021, 6, 1)),
        ];
        sort_by_mark_date_desc(&mut records);
        assert_eq!(ids(&records), vec!["b", "d", "a", "c"]);
    }

    #[test]
    fn test_trim_keeps_newest() {
        let mut records: Vec<Record> = (0..5).map(|i| rec(&i.to_string(), (2020 + i, 1, 1))).collect();
        sort_by_mark_date_desc(&mut records);
        trim(&mut records, Some(2));
        assert_eq!(ids(&records), vec!["4", "3"]);

        let mut all = records.clone();
        trim(&mut all, None);
        assert_eq!(all.len(), 2);
    }
}
