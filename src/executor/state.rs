//! Accumulated state of one collection run.

use crate::models::{ChunkResult, ChunkStatus};
use std::time::Duration;

/// Everything a run has collected so far.
///
/// Owned by the run loop and only changed between chunks.
#[derive(Debug, Default)]
pub struct RunState {
    /// Accepted chunk results, in execution order.
    pub results: Vec<ChunkResult>,
    /// Wall time since the run started.
    pub elapsed: Duration,
    /// Chunks that came back full and were re-split.
    pub refined: usize,
}

impl RunState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: ChunkResult) {
        self.results.push(result);
    }

    /// Chunks that completed or were resumed from disk.
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|r| r.status.is_success()).count()
    }

    pub fn partial(&self) -> usize {
        self.results.len() - self.successful()
    }

    pub fn resumed(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.status == ChunkStatus::Resumed)
            .count()
    }

    pub fn total_records(&self) -> usize {
        self.results.iter().map(|r| r.records.len()).sum()
    }

    pub fn partial_chunks(&self) -> impl Iterator<Item = &ChunkResult> {
        self.results.iter().filter(|r| !r.status.is_success())
    }

    /// Mean time per chunk that actually hit the source.
    pub fn average_chunk_time(&self) -> Option<Duration> {
        let executed: Vec<_> = self
            .results
            .iter()
            .filter(|r| r.status != ChunkStatus::Resumed)
            .collect();
        if executed.is_empty() {
            return None;
        }
        let total: Duration = executed.iter().map(|r| r.elapsed).sum();
        Some(total / executed.len() as u32)
    }
}
