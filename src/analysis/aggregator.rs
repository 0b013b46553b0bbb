//! Record aggregation and duplicate accounting.
//!
//! This module merges per-chunk record lists into the master collection
//! and measures how many records share an identity key. Duplicates are
//! counted, never removed: two hits on one physical page are legitimate
//! until someone has looked at them.

use crate::models::{ChunkResult, IdentityKey, Period, Record};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// A record plus the calendar fields rollups need.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterEntry {
    pub record: Record,
    /// `None` when the record's date is missing or unparsable.
    pub period: Option<Period>,
}

/// Raw vs identity-distinct record counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DedupStats {
    pub total: usize,
    pub unique: usize,
    pub duplicates: usize,
}

/// Every record of a run, in chunk order.
#[derive(Debug, Clone, Default)]
pub struct MasterCollection {
    pub entries: Vec<MasterEntry>,
    pub stats: DedupStats,
}

impl MasterCollection {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Concatenate chunk results into the master collection.
pub fn merge(results: &[ChunkResult]) -> MasterCollection {
    let entries: Vec<MasterEntry> = results
        .iter()
        .flat_map(|r| r.records.iter())
        .map(|record| MasterEntry {
            period: record.period(),
            record: record.clone(),
        })
        .collect();

    let stats = dedup_stats(entries.iter().map(|e| &e.record));

    MasterCollection { entries, stats }
}

/// Count records and distinct identity keys.
pub fn dedup_stats<'a, I>(records: I) -> DedupStats
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut total = 0;
    let mut keys: HashSet<IdentityKey> = HashSet::new();

    for record in records {
        total += 1;
        keys.insert(record.identity_key());
    }

    DedupStats {
        total,
        unique: keys.len(),
        duplicates: total - keys.len(),
    }
}

/// Identity keys seen more than once, most repeated first.
pub fn duplicate_groups(collection: &MasterCollection) -> Vec<(IdentityKey, usize)> {
    let mut counts: HashMap<IdentityKey, usize> = HashMap::new();

    for entry in &collection.entries {
        *counts.entry(entry.record.identity_key()).or_default() += 1;
    }

    let mut groups: Vec<_> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1) // Only repeated keys
        .collect();

    groups.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{parse_date, ChunkStatus, Granularity, NO_TITLE};
    use crate::planner::plan_chunks;
    use std::time::Duration;

    fn create_test_record(date: &str, publisher: &str, page: &str, matches: u64) -> Record {
        Record {
            date_text: date.to_string(),
            date: parse_date(date),
            publisher: publisher.to_string(),
            title: NO_TITLE.to_string(),
            page: Some(page.to_string()),
            location: "us-ca".to_string(),
            match_count: matches,
            url: None,
            content: None,
            chunk: "1870_Jan_Mar".to_string(),
        }
    }

    fn chunk_result(records: Vec<Record>) -> ChunkResult {
        ChunkResult {
            chunk: plan_chunks(1870, 1870, Granularity::Quarterly).unwrap()[0].clone(),
            records,
            status: ChunkStatus::Complete,
            elapsed: Duration::from_secs(1),
            last_progress: None,
        }
    }

    #[test]
    fn test_same_page_counted_as_duplicate() {
        let results = vec![chunk_result(vec![
            create_test_record("1870-03-01", "Daily Herald", "2", 3),
            create_test_record("1870-03-01", "Daily Herald", "2", 7),
        ])];

        let master = merge(&results);

        assert_eq!(master.len(), 2);
        assert_eq!(
            master.stats,
            DedupStats {
                total: 2,
                unique: 1,
                duplicates: 1
            }
        );
    }

    #[test]
    fn test_merge_preserves_chunk_order_and_provenance() {
        let mut later = create_test_record("1870-05-01", "Los Angeles Star", "1", 1);
        later.chunk = "1870_Apr_Jun".to_string();
        let results = vec![
            chunk_result(vec![create_test_record("1870-01-03", "Daily Herald", "1", 1)]),
            chunk_result(vec![]),
            chunk_result(vec![later]),
        ];

        let master = merge(&results);

        let chunks: Vec<_> = master.entries.iter().map(|e| e.record.chunk.as_str()).collect();
        assert_eq!(chunks, vec!["1870_Jan_Mar", "1870_Apr_Jun"]);
        assert_eq!(master.stats.duplicates, 0);
        assert_eq!(master.stats.unique, master.stats.total);
    }

    #[test]
    fn test_unique_never_exceeds_total() {
        let records: Vec<_> = (0..20)
            .map(|i| create_test_record("1871-06-01", "Daily Herald", &(i % 7).to_string(), i))
            .collect();

        let stats = dedup_stats(&records);

        assert_eq!(stats.total, 20);
        assert_eq!(stats.unique, 7);
        assert!(stats.unique <= stats.total);
        assert_eq!(stats.total - stats.unique, stats.duplicates);
    }

    #[test]
    fn test_missing_date_has_no_period() {
        let results = vec![chunk_result(vec![create_test_record("", "Daily Herald", "1", 1)])];
        let master = merge(&results);
        assert_eq!(master.entries[0].period, None);
    }

    #[test]
    fn test_duplicate_groups() {
        let results = vec![chunk_result(vec![
            create_test_record("1870-03-01", "Daily Herald", "2", 3),
            create_test_record("1870-03-01", "Daily Herald", "2", 7),
            create_test_record("1870-03-01", "Daily Herald", "2", 1),
            create_test_record("1870-03-02", "Daily Herald", "1", 1),
        ])];

        let groups = duplicate_groups(&merge(&results));

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].0.page, "2");
        assert_eq!(groups[0].1, 3);
    }
}
