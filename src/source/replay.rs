//! Replay source.
//!
//! Answers queries from recorded NDJSON event files, one file per chunk
//! window named `{start}_{end}.jsonl` after the ISO chunk bounds. Used
//! for offline runs and for exercising the pipeline without the archive.

use crate::source::{parse_event_line, EventStream, RetrievalQuery, RetrievalSource, SourceEvent};
use futures::stream::{self, StreamExt};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub struct ReplaySource {
    dir: PathBuf,
}

impl ReplaySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the recording that answers `query`.
    pub fn recording_path(&self, query: &RetrievalQuery) -> PathBuf {
        self.dir.join(format!(
            "{}_{}.jsonl",
            query.start_date.format("%Y-%m-%d"),
            query.end_date.format("%Y-%m-%d")
        ))
    }
}

impl RetrievalSource for ReplaySource {
    fn retrieve(&self, query: RetrievalQuery) -> EventStream {
        let path = self.recording_path(&query);
        let events = load_recording(&path, query.limit);
        stream::iter(events).boxed()
    }
}

/// Read a recording, keeping at most `limit` record events.
fn load_recording(path: &Path, limit: usize) -> Vec<SourceEvent> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            return vec![SourceEvent::error(format!(
                "No recording at {}: {}",
                path.display(),
                e
            ))]
        }
    };

    debug!("Replaying {}", path.display());

    let mut events = Vec::new();
    let mut records = 0usize;
    for (index, line) in content.lines().enumerate() {
        match parse_event_line(line) {
            Some(Ok(SourceEvent::Record(raw))) => {
                if records < limit {
                    records += 1;
                    events.push(SourceEvent::Record(raw));
                }
            }
            Some(Ok(event)) => {
                let terminal = event.is_terminal();
                events.push(event);
                if terminal {
                    break;
                }
            }
            Some(Err(e)) => {
                warn!("{}:{}: skipping unparsable event: {}", path.display(), index + 1, e);
            }
            None => {}
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Granularity;
    use crate::planner::plan_chunks;
    use crate::source::QueryTemplate;
    use tempfile::TempDir;

    fn first_quarter_query(limit: usize) -> RetrievalQuery {
        let chunk = plan_chunks(1870, 1870, Granularity::Quarterly).unwrap()[0].clone();
        QueryTemplate {
            keyword: "rancho".to_string(),
            location: "us-ca".to_string(),
            per_chunk_limit: limit,
        }
        .for_chunk(&chunk)
    }

    #[test]
    fn test_replays_recording_in_order() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("1870-01-01_1870-03-31.jsonl"),
            concat!(
                "{\"type\":\"record\",\"title\":\"A\"}\n",
                "{\"type\":\"progress\",\"current\":1,\"total\":2,\"percentage\":50.0}\n",
                "not json\n",
                "{\"type\":\"record\",\"title\":\"B\"}\n",
                "{\"type\":\"complete\"}\n",
                "{\"type\":\"record\",\"title\":\"after the end\"}\n",
            ),
        )
        .unwrap();

        let source = ReplaySource::new(dir.path());
        let events: Vec<_> = tokio_test::block_on(source.retrieve(first_quarter_query(100)).collect());

        assert_eq!(events.len(), 4);
        assert!(matches!(events[1], SourceEvent::Progress(_)));
        assert_eq!(events[3], SourceEvent::Complete);
    }

    #[test]
    fn test_limit_caps_records() {
        let dir = TempDir::new().unwrap();
        let mut body = String::new();
        for i in 0..5 {
            body.push_str(&format!("{{\"type\":\"record\",\"title\":\"{}\"}}\n", i));
        }
        body.push_str("{\"type\":\"complete\"}\n");
        fs::write(dir.path().join("1870-01-01_1870-03-31.jsonl"), body).unwrap();

        let source = ReplaySource::new(dir.path());
        let events: Vec<_> = tokio_test::block_on(source.retrieve(first_quarter_query(3)).collect());
        let records = events
            .iter()
            .filter(|e| matches!(e, SourceEvent::Record(_)))
            .count();
        assert_eq!(records, 3);
    }

    #[test]
    fn test_missing_recording_is_error_event() {
        let dir = TempDir::new().unwrap();
        let source = ReplaySource::new(dir.path());
        let events: Vec<_> = tokio_test::block_on(source.retrieve(first_quarter_query(10)).collect());
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], SourceEvent::Error { .. }));
    }

    #[tokio::test]
    async fn test_bundled_recordings_run_end_to_end() {
        use crate::analysis::merge;
        use crate::executor::{ChunkExecutor, ExecutorOptions, RunObserver};
        use std::time::Duration;

        struct NoFiles;
        impl RunObserver for NoFiles {}

        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/replay");
        let executor = ChunkExecutor::new(
            Box::new(ReplaySource::new(dir)),
            ExecutorOptions {
                delay: Duration::ZERO,
                refine_truncated: true,
                show_progress: false,
            },
        );
        let template = QueryTemplate {
            keyword: "rancho".to_string(),
            location: "us-ca".to_string(),
            per_chunk_limit: 1000,
        };

        let chunks = plan_chunks(1870, 1870, Granularity::Quarterly).unwrap();
        let state = executor.run(chunks, &template, &mut NoFiles).await;

        assert_eq!(state.successful(), 3);
        assert_eq!(state.partial(), 1);
        assert_eq!(state.total_records(), 8);

        let master = merge(&state.results);
        assert_eq!(master.stats.total, 8);
        assert_eq!(master.stats.unique, 7);
        assert_eq!(master.stats.duplicates, 1);
        assert_eq!(master.entries[7].record.publisher, "Daily Evening Herald");
    }
}
