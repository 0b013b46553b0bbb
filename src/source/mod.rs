//! Retrieval source boundary.
//!
//! The archive answers one bounded query at a time and reports what it
//! finds as a stream of typed events. Everything behind this trait
//! (browser automation, login, pagination) belongs to the source.

pub mod http;
pub mod replay;

pub use http::HttpSource;
pub use replay::ReplaySource;

use crate::models::{Chunk, Progress, RawRecord};
use chrono::NaiveDate;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

/// Lazily produced events for one query, in arrival order.
pub type EventStream = BoxStream<'static, SourceEvent>;

/// Something that can answer a bounded keyword query.
pub trait RetrievalSource {
    /// Start one retrieval. The stream ends after a terminal event.
    fn retrieve(&self, query: RetrievalQuery) -> EventStream;
}

/// Notification delivered by the source while a query runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceEvent {
    /// One matching page.
    Record(RawRecord),
    /// Pages processed so far.
    Progress(Progress),
    /// Terminal: the query finished normally.
    Complete,
    /// Terminal: the query failed.
    Error { message: String },
}

impl SourceEvent {
    pub fn error(message: impl Into<String>) -> Self {
        SourceEvent::Error {
            message: message.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SourceEvent::Complete | SourceEvent::Error { .. })
    }
}

/// Run-wide query parameters shared by every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryTemplate {
    pub keyword: String,
    /// Source location code (e.g. `us-ca`).
    pub location: String,
    /// Result cap per chunk; set well above the expected chunk volume.
    pub per_chunk_limit: usize,
}

impl QueryTemplate {
    /// Bind the template to one chunk's date bounds.
    pub fn for_chunk(&self, chunk: &Chunk) -> RetrievalQuery {
        RetrievalQuery {
            keyword: self.keyword.clone(),
            limit: self.per_chunk_limit,
            date_range: chunk.year_range(),
            start_date: chunk.start,
            end_date: chunk.end,
            location: self.location.clone(),
        }
    }
}

/// One concrete query sent to the source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalQuery {
    pub keyword: String,
    pub limit: usize,
    /// `[startYear, endYear]`, inclusive.
    pub date_range: [i32; 2],
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub location: String,
}

/// Parse one NDJSON line into an event. Blank lines yield `None`.
pub fn parse_event_line(line: &str) -> Option<Result<SourceEvent, serde_json::Error>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(serde_json::from_str(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Granularity;
    use crate::planner::plan_chunks;

    #[test]
    fn test_query_binds_chunk_bounds() {
        let chunk = plan_chunks(1871, 1871, Granularity::Quarterly).unwrap()[2].clone();
        let template = QueryTemplate {
            keyword: "rancho".to_string(),
            location: "us-ca".to_string(),
            per_chunk_limit: 1000,
        };

        let query = template.for_chunk(&chunk);
        assert_eq!(query.date_range, [1871, 1871]);
        assert_eq!(query.start_date, NaiveDate::from_ymd_opt(1871, 7, 1).unwrap());
        assert_eq!(query.end_date, NaiveDate::from_ymd_opt(1871, 9, 30).unwrap());

        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["dateRange"], serde_json::json!([1871, 1871]));
        assert_eq!(json["limit"], 1000);
    }

    #[test]
    fn test_parse_event_lines() {
        let record = parse_event_line(
            r#"{"type":"record","date":"1870-01-04","newspaper":"Daily Alta California","keywordMatches":2}"#,
        )
        .unwrap()
        .unwrap();
        match record {
            SourceEvent::Record(raw) => {
                assert_eq!(raw.publisher.as_deref(), Some("Daily Alta California"));
            }
            other => panic!("expected record, got {:?}", other),
        }

        let progress = parse_event_line(r#"{"type":"progress","current":10,"total":40,"percentage":25.0}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            progress,
            SourceEvent::Progress(Progress {
                current: 10,
                total: 40,
                percentage: 25.0
            })
        );

        let done = parse_event_line(r#"{"type":"complete"}"#).unwrap().unwrap();
        assert!(done.is_terminal());

        let failed = parse_event_line(r#"{"type":"error","message":"captcha"}"#)
            .unwrap()
            .unwrap();
        assert_eq!(failed, SourceEvent::error("captcha"));

        assert!(parse_event_line("   ").is_none());
        assert!(parse_event_line("{not json").unwrap().is_err());
    }
}
