//! Rollup tables over the master collection.
//!
//! Pure functions: no I/O, deterministic ordering, safe to recompute at
//! any point of a run for intermediate reporting.

use crate::analysis::aggregator::{MasterCollection, MasterEntry};
use crate::analysis::publishers::PublisherDirectory;
use crate::models::{Location, Period};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::Hash;

/// Coverage of one publisher.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PublisherRollup {
    pub publisher: String,
    pub location: Location,
    pub total_pages: usize,
    pub total_matches: u64,
    /// `None` for a group with no pages.
    pub avg_matches_per_page: Option<f64>,
}

/// Coverage of one calendar period. `key` is `None` for undated records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRollup<K> {
    pub key: Option<K>,
    pub total_pages: usize,
    pub total_matches: u64,
    pub distinct_publishers: usize,
    pub avg_matches_per_page: Option<f64>,
}

/// Calendar quarter of a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct YearQuarter {
    pub year: i32,
    pub quarter: u32,
}

impl fmt::Display for YearQuarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-Q{}", self.year, self.quarter)
    }
}

/// Pages at or below this many matches count as brief mentions.
pub const LOW_MATCH_THRESHOLD: u64 = 3;

/// Pages sharing one match count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchBucket {
    pub match_count: u64,
    pub pages: usize,
    /// Share of all pages, one decimal.
    pub percentage: f64,
    /// Pages with this many matches or fewer.
    pub cumulative_pages: usize,
}

/// How many pages mention the keyword only briefly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LowMatchShare {
    pub threshold: u64,
    pub pages: usize,
    pub percentage: Option<f64>,
}

impl Default for LowMatchShare {
    fn default() -> Self {
        Self {
            threshold: LOW_MATCH_THRESHOLD,
            pages: 0,
            percentage: None,
        }
    }
}

/// All rollup tables for one collection.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Rollups {
    pub by_publisher: Vec<PublisherRollup>,
    pub by_month: Vec<PeriodRollup<Period>>,
    pub by_quarter: Vec<PeriodRollup<YearQuarter>>,
    pub by_year: Vec<PeriodRollup<i32>>,
    pub match_distribution: Vec<MatchBucket>,
    pub low_match: LowMatchShare,
}

/// Compute every rollup table.
pub fn summarize(collection: &MasterCollection, directory: &PublisherDirectory) -> Rollups {
    let match_distribution = match_distribution(collection);
    let low_match = low_match_share(&match_distribution, LOW_MATCH_THRESHOLD);

    Rollups {
        by_publisher: by_publisher(collection, directory),
        by_month: rollup_by(collection, |e| e.period),
        by_quarter: rollup_by(collection, |e| {
            e.period.map(|p| YearQuarter {
                year: p.year,
                quarter: p.quarter(),
            })
        }),
        by_year: rollup_by(collection, |e| e.period.map(|p| p.year)),
        match_distribution,
        low_match,
    }
}

/// Group by publisher, most pages first.
pub fn by_publisher(
    collection: &MasterCollection,
    directory: &PublisherDirectory,
) -> Vec<PublisherRollup> {
    let mut groups: HashMap<&str, (usize, u64)> = HashMap::new();

    for entry in &collection.entries {
        let group = groups.entry(entry.record.publisher.as_str()).or_default();
        group.0 += 1;
        group.1 = group.1.saturating_add(entry.record.match_count);
    }

    let mut rows: Vec<PublisherRollup> = groups
        .into_iter()
        .map(|(publisher, (pages, matches))| PublisherRollup {
            publisher: publisher.to_string(),
            location: directory.lookup(publisher).clone(),
            total_pages: pages,
            total_matches: matches,
            avg_matches_per_page: average(matches, pages),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.total_pages
            .cmp(&a.total_pages)
            .then_with(|| a.publisher.cmp(&b.publisher))
    });

    rows
}

#[derive(Default)]
struct PeriodAccumulator<'a> {
    pages: usize,
    matches: u64,
    publishers: HashSet<&'a str>,
}

/// Group entries by a calendar key, ascending, undated last.
fn rollup_by<'a, K, F>(collection: &'a MasterCollection, key_of: F) -> Vec<PeriodRollup<K>>
where
    K: Copy + Ord + Hash,
    F: Fn(&MasterEntry) -> Option<K>,
{
    let mut groups: HashMap<Option<K>, PeriodAccumulator<'a>> = HashMap::new();

    for entry in &collection.entries {
        let acc = groups.entry(key_of(entry)).or_default();
        acc.pages += 1;
        acc.matches = acc.matches.saturating_add(entry.record.match_count);
        acc.publishers.insert(entry.record.publisher.as_str());
    }

    let mut rows: Vec<PeriodRollup<K>> = groups
        .into_iter()
        .map(|(key, acc)| PeriodRollup {
            key,
            total_pages: acc.pages,
            total_matches: acc.matches,
            distinct_publishers: acc.publishers.len(),
            avg_matches_per_page: average(acc.matches, acc.pages),
        })
        .collect();

    rows.sort_by_key(|r| (r.key.is_none(), r.key));
    rows
}

/// Pages per match count, ascending.
pub fn match_distribution(collection: &MasterCollection) -> Vec<MatchBucket> {
    let mut counts: BTreeMap<u64, usize> = BTreeMap::new();
    for entry in &collection.entries {
        *counts.entry(entry.record.match_count).or_default() += 1;
    }

    let total = collection.len();
    let mut cumulative = 0;

    counts
        .into_iter()
        .map(|(match_count, pages)| {
            cumulative += pages;
            MatchBucket {
                match_count,
                pages,
                percentage: percent(pages, total).unwrap_or_default(),
                cumulative_pages: cumulative,
            }
        })
        .collect()
}

/// Pages with at most `threshold` matches.
pub fn low_match_share(buckets: &[MatchBucket], threshold: u64) -> LowMatchShare {
    let total: usize = buckets.iter().map(|b| b.pages).sum();
    let pages = buckets
        .iter()
        .take_while(|b| b.match_count <= threshold)
        .map(|b| b.pages)
        .sum();

    LowMatchShare {
        threshold,
        pages,
        percentage: percent(pages, total),
    }
}

fn percent(part: usize, whole: usize) -> Option<f64> {
    if whole == 0 {
        return None;
    }
    let pct = part as f64 * 100.0 / whole as f64;
    Some((pct * 10.0).round() / 10.0)
}

/// Matches per page rounded to two decimals; undefined for zero pages.
pub fn average(matches: u64, pages: usize) -> Option<f64> {
    if pages == 0 {
        return None;
    }
    let avg = matches as f64 / pages as f64;
    Some((avg * 100.0).round() / 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::aggregator::merge;
    use crate::models::{parse_date, ChunkResult, ChunkStatus, Granularity, Record, NO_TITLE};
    use crate::planner::plan_chunks;
    use std::time::Duration;

    fn create_test_record(date: &str, publisher: &str, matches: u64) -> Record {
        Record {
            date_text: date.to_string(),
            date: parse_date(date),
            publisher: publisher.to_string(),
            title: NO_TITLE.to_string(),
            page: Some("1".to_string()),
            location: "us-ca".to_string(),
            match_count: matches,
            url: None,
            content: None,
            chunk: "test".to_string(),
        }
    }

    fn collection(records: Vec<Record>) -> MasterCollection {
        merge(&[ChunkResult {
            chunk: plan_chunks(1870, 1870, Granularity::Yearly).unwrap()[0].clone(),
            records,
            status: ChunkStatus::Complete,
            elapsed: Duration::ZERO,
            last_progress: None,
        }])
    }

    fn sample() -> MasterCollection {
        let mut records = Vec::new();
        for day in 1..=4 {
            records.push(create_test_record(
                &format!("1870-0{}-01", day),
                "Daily Evening Herald",
                2,
            ));
        }
        for day in 1..=6 {
            let publisher = if day % 2 == 0 {
                "The Sacramento Bee"
            } else {
                "Daily Evening Herald"
            };
            records.push(create_test_record(&format!("1871-03-0{}", day), publisher, day));
        }
        collection(records)
    }

    #[test]
    fn test_yearly_rollup_rows() {
        let rollups = summarize(&sample(), &PublisherDirectory::default());

        assert_eq!(rollups.by_year.len(), 2);
        assert_eq!(rollups.by_year[0].key, Some(1870));
        assert_eq!(rollups.by_year[0].total_pages, 4);
        assert_eq!(rollups.by_year[1].key, Some(1871));
        assert_eq!(rollups.by_year[1].total_pages, 6);
        assert_eq!(rollups.by_year[1].distinct_publishers, 2);
        assert_eq!(rollups.by_year[1].total_matches, 21);
        assert_eq!(rollups.by_year[1].avg_matches_per_page, Some(3.5));
    }

    #[test]
    fn test_rollup_totals_match_collection_size() {
        let master = sample();
        let rollups = summarize(&master, &PublisherDirectory::default());

        let publisher_pages: usize = rollups.by_publisher.iter().map(|r| r.total_pages).sum();
        let year_pages: usize = rollups.by_year.iter().map(|r| r.total_pages).sum();
        let month_pages: usize = rollups.by_month.iter().map(|r| r.total_pages).sum();
        let quarter_pages: usize = rollups.by_quarter.iter().map(|r| r.total_pages).sum();

        assert_eq!(publisher_pages, master.len());
        assert_eq!(year_pages, master.len());
        assert_eq!(month_pages, master.len());
        assert_eq!(quarter_pages, master.len());
    }

    #[test]
    fn test_publisher_rollup_sorted_by_pages() {
        let rollups = summarize(&sample(), &PublisherDirectory::default());

        assert_eq!(rollups.by_publisher[0].publisher, "Daily Evening Herald");
        assert_eq!(rollups.by_publisher[0].total_pages, 7);
        assert_eq!(rollups.by_publisher[0].location.city, "Stockton");
        assert_eq!(rollups.by_publisher[1].publisher, "The Sacramento Bee");
        assert_eq!(rollups.by_publisher[1].total_pages, 3);
        assert_eq!(rollups.by_publisher[1].total_matches, 12);
        assert_eq!(rollups.by_publisher[1].avg_matches_per_page, Some(4.0));
    }

    #[test]
    fn test_unmapped_publisher_gets_unknown_location() {
        let master = collection(vec![create_test_record("1870-01-01", "Weekly Nowhere", 1)]);
        let rollups = summarize(&master, &PublisherDirectory::default());
        assert_eq!(rollups.by_publisher[0].location, Location::unknown());
    }

    #[test]
    fn test_monthly_rollup_ordering_and_undated_last() {
        let master = collection(vec![
            create_test_record("1871-01-15", "A", 1),
            create_test_record("", "A", 1),
            create_test_record("1870-12-01", "B", 1),
            create_test_record("1870-02-01", "A", 1),
            create_test_record("1870-02-09", "B", 3),
        ]);

        let rollups = summarize(&master, &PublisherDirectory::default());
        let keys: Vec<_> = rollups
            .by_month
            .iter()
            .map(|r| r.key.map(|p| (p.year, p.month)))
            .collect();

        assert_eq!(
            keys,
            vec![Some((1870, 2)), Some((1870, 12)), Some((1871, 1)), None]
        );
        assert_eq!(rollups.by_month[0].distinct_publishers, 2);
        assert_eq!(rollups.by_month[0].avg_matches_per_page, Some(2.0));
        assert_eq!(rollups.by_year.last().unwrap().key, None);
    }

    #[test]
    fn test_quarter_rollup() {
        let rollups = summarize(&sample(), &PublisherDirectory::default());
        let labels: Vec<_> = rollups
            .by_quarter
            .iter()
            .map(|r| r.key.unwrap().to_string())
            .collect();
        assert_eq!(labels, vec!["1870-Q1", "1870-Q2", "1871-Q1"]);
        assert_eq!(rollups.by_quarter[0].total_pages, 3);
    }

    #[test]
    fn test_average_rounding_and_zero_pages() {
        assert_eq!(average(10, 3), Some(3.33));
        assert_eq!(average(2, 3), Some(0.67));
        assert_eq!(average(0, 0), None);
    }

    #[test]
    fn test_empty_collection() {
        let rollups = summarize(&MasterCollection::default(), &PublisherDirectory::default());
        assert!(rollups.by_publisher.is_empty());
        assert!(rollups.by_year.is_empty());
        assert!(rollups.match_distribution.is_empty());
        assert_eq!(rollups.low_match.pages, 0);
        assert_eq!(rollups.low_match.percentage, None);
    }

    #[test]
    fn test_huge_match_counts_saturate() {
        let master = collection(vec![
            create_test_record("1870-01-01", "Daily Evening Herald", u64::MAX),
            create_test_record("1870-01-02", "Daily Evening Herald", u64::MAX),
        ]);

        let rollups = summarize(&master, &PublisherDirectory::default());

        assert_eq!(rollups.by_publisher[0].total_matches, u64::MAX);
        assert_eq!(rollups.by_month[0].total_matches, u64::MAX);
        assert_eq!(rollups.by_year[0].total_matches, u64::MAX);
        assert_eq!(rollups.match_distribution[0].pages, 2);
    }

    #[test]
    fn test_match_distribution() {
        // sample() has four pages with 2 matches and one each with 1..=6
        let rollups = summarize(&sample(), &PublisherDirectory::default());
        let counts: Vec<_> = rollups
            .match_distribution
            .iter()
            .map(|b| (b.match_count, b.pages))
            .collect();

        assert_eq!(
            counts,
            vec![(1, 1), (2, 5), (3, 1), (4, 1), (5, 1), (6, 1)]
        );
        assert_eq!(rollups.match_distribution[1].percentage, 50.0);
        assert_eq!(rollups.match_distribution[5].cumulative_pages, 10);

        assert_eq!(rollups.low_match.threshold, LOW_MATCH_THRESHOLD);
        assert_eq!(rollups.low_match.pages, 7);
        assert_eq!(rollups.low_match.percentage, Some(70.0));
    }

    #[test]
    fn test_low_match_share_rounds_to_one_decimal() {
        let master = collection(vec![
            create_test_record("1870-01-01", "A", 0),
            create_test_record("1870-01-02", "A", 9),
            create_test_record("1870-01-03", "A", 12),
        ]);

        let buckets = match_distribution(&master);
        assert_eq!(buckets[0].match_count, 0);
        assert_eq!(buckets[0].percentage, 33.3);

        let share = low_match_share(&buckets, 10);
        assert_eq!(share.pages, 2);
        assert_eq!(share.percentage, Some(66.7));
    }
}
