//! Data models for the collection pipeline.
//!
//! This module contains the records returned by the retrieval source,
//! the chunks a run is partitioned into, and the per-chunk results the
//! executor hands to aggregation and export.

use chrono::{DateTime, Datelike, Month, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Publisher name used when the source omits one.
pub const UNKNOWN_PUBLISHER: &str = "Unknown";

/// Title used when the source omits one.
pub const NO_TITLE: &str = "No Title";

/// Label for anything that cannot be placed on the calendar.
pub const UNKNOWN: &str = "Unknown";

/// Calendar unit a run is partitioned by.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Granularity {
    /// One chunk per calendar year
    Yearly,
    /// One chunk per calendar quarter (default)
    #[default]
    Quarterly,
    /// One chunk per calendar month
    Monthly,
    /// Two chunks per month (1st-15th, 16th-end)
    HalfMonthly,
}

impl Granularity {
    /// The next finer unit, used when a truncated chunk is re-split.
    pub fn finer(self) -> Option<Granularity> {
        match self {
            Granularity::Yearly => Some(Granularity::Quarterly),
            Granularity::Quarterly => Some(Granularity::Monthly),
            Granularity::Monthly => Some(Granularity::HalfMonthly),
            Granularity::HalfMonthly => None,
        }
    }

    /// Number of chunks this granularity produces for one calendar year.
    pub fn chunks_per_year(self) -> usize {
        match self {
            Granularity::Yearly => 1,
            Granularity::Quarterly => 4,
            Granularity::Monthly => 12,
            Granularity::HalfMonthly => 24,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Granularity::Yearly => write!(f, "yearly"),
            Granularity::Quarterly => write!(f, "quarterly"),
            Granularity::Monthly => write!(f, "monthly"),
            Granularity::HalfMonthly => write!(f, "half-monthly"),
        }
    }
}

/// One bounded sub-query of a run.
///
/// Created by the planner, consumed once by the executor, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique, deterministic name (e.g. `1870_Jan_Mar`).
    pub name: String,
    /// Human-readable label (e.g. `January-March 1870`).
    pub label: String,
    /// First day covered, inclusive.
    pub start: NaiveDate,
    /// Last day covered, inclusive.
    pub end: NaiveDate,
    /// Calendar unit the chunk was cut at.
    pub granularity: Granularity,
}

impl Chunk {
    /// The `[startYear, endYear]` pair the retrieval source expects.
    pub fn year_range(&self) -> [i32; 2] {
        [self.start.year(), self.end.year()]
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Record payload exactly as the retrieval source sends it.
///
/// Every field is optional; [`Record::from_raw`] applies the defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default, alias = "newspaper")]
    pub publisher: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "pageNumber")]
    pub page: Option<Value>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default, alias = "keywordMatches", alias = "matches")]
    pub match_count: Option<Value>,
    #[serde(default, alias = "pageUrl")]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

/// One page match, normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Publication date as the source reported it.
    pub date_text: String,
    /// Parsed publication date, `None` when missing or unparsable.
    pub date: Option<NaiveDate>,
    pub publisher: String,
    pub title: String,
    pub page: Option<String>,
    /// Source location code (e.g. `us-ca`).
    pub location: String,
    /// Keyword hits on the page, never negative.
    pub match_count: u64,
    pub url: Option<String>,
    pub content: Option<String>,
    /// Name of the chunk that produced this record.
    pub chunk: String,
}

impl Record {
    /// Normalize a source payload, substituting sentinels for missing fields.
    pub fn from_raw(raw: RawRecord, chunk: &str) -> Self {
        let date_text = non_empty(raw.date).unwrap_or_default();
        let date = parse_date(&date_text);

        Self {
            date_text,
            date,
            publisher: non_empty(raw.publisher).unwrap_or_else(|| UNKNOWN_PUBLISHER.to_string()),
            title: non_empty(raw.title).unwrap_or_else(|| NO_TITLE.to_string()),
            page: raw.page.as_ref().and_then(value_to_text),
            location: non_empty(raw.location).unwrap_or_default(),
            match_count: raw.match_count.as_ref().map(coerce_match_count).unwrap_or(0),
            url: non_empty(raw.url),
            content: non_empty(raw.content),
            chunk: chunk.to_string(),
        }
    }

    /// The `(date, publisher, page)` tuple used to spot duplicates.
    ///
    /// A parsed date is keyed in ISO form so differently formatted
    /// renderings of one day collide; unparseable dates key on the raw text.
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey {
            date: self
                .date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| self.date_text.clone()),
            publisher: self.publisher.clone(),
            page: self.page.clone().unwrap_or_default(),
        }
    }

    /// Calendar position of the record, if its date parsed.
    pub fn period(&self) -> Option<Period> {
        self.date.map(|d| Period {
            year: d.year(),
            month: d.month(),
        })
    }
}

/// Duplicate-detection key. Derived, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub date: String,
    pub publisher: String,
    pub page: String,
}

/// Year and month a record falls in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Period {
    pub year: i32,
    /// 1-based month.
    pub month: u32,
}

impl Period {
    /// 1-based quarter of the year.
    pub fn quarter(&self) -> u32 {
        (self.month - 1) / 3 + 1
    }

    /// `YYYY-Qn` label.
    pub fn year_quarter(&self) -> String {
        format!("{}-Q{}", self.year, self.quarter())
    }

    pub fn month_name(&self) -> &'static str {
        month_name(self.month)
    }
}

/// Page progress reported by the source while a chunk runs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Progress {
    pub current: u64,
    pub total: u64,
    #[serde(default)]
    pub percentage: f64,
}

/// How a chunk ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ChunkStatus {
    /// Source reported completion.
    Complete,
    /// Source reported an error; records gathered before it are kept.
    Partial { message: String },
    /// Served from a previous run's per-chunk file.
    Resumed,
}

impl ChunkStatus {
    pub fn is_success(&self) -> bool {
        !matches!(self, ChunkStatus::Partial { .. })
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChunkStatus::Complete => write!(f, "Complete"),
            ChunkStatus::Partial { .. } => write!(f, "Partial"),
            ChunkStatus::Resumed => write!(f, "Resumed"),
        }
    }
}

/// Outcome of driving one chunk against the source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkResult {
    pub chunk: Chunk,
    pub records: Vec<Record>,
    pub status: ChunkStatus,
    #[serde(with = "duration_secs")]
    pub elapsed: Duration,
    /// Last progress notification seen, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_progress: Option<Progress>,
}

impl ChunkResult {
    /// True when the chunk returned as many records as it was allowed to,
    /// which means the source may have cut the population short.
    pub fn is_truncated(&self, limit: usize) -> bool {
        limit > 0 && self.records.len() >= limit
    }
}

/// City/county/state of a publisher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub city: String,
    pub county: String,
    pub state: String,
}

impl Location {
    pub fn new(city: &str, county: &str, state: &str) -> Self {
        Self {
            city: city.to_string(),
            county: county.to_string(),
            state: state.to_string(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(UNKNOWN, UNKNOWN, UNKNOWN)
    }
}

/// English month name for a 1-based month, `Unknown` when out of range.
pub fn month_name(month: u32) -> &'static str {
    u8::try_from(month)
        .ok()
        .and_then(|m| Month::try_from(m).ok())
        .map(|m| m.name())
        .unwrap_or(UNKNOWN)
}

/// Coerce a match-count value to a non-negative integer.
///
/// Numbers are truncated toward zero, strings are read from their leading
/// digits, and everything else (including negatives) is 0.
pub fn coerce_match_count(value: &Value) -> u64 {
    match value {
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                u
            } else if let Some(f) = n.as_f64() {
                if f.is_finite() && f > 0.0 {
                    f.trunc() as u64
                } else {
                    0
                }
            } else {
                0
            }
        }
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().unwrap_or(0)
        }
        _ => 0,
    }
}

/// Parse the date formats the archive is known to emit.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    for fmt in ["%Y-%m-%d", "%Y/%m/%d", "%B %d, %Y", "%b %d, %Y", "%d %B %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(date);
        }
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.date());
    }

    // Timestamps with trailing junk still carry an ISO date up front
    text.get(..10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn value_to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(Some(s.clone())),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs.max(0.0)))
    }
}
