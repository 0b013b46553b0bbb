//! Chunk executor.
//!
//! Drives chunks one at a time against the retrieval source. A chunk that
//! fails keeps whatever it collected and the run moves on; chunks never
//! overlap and a fixed delay separates consecutive source calls.

pub mod state;

pub use state::RunState;

use crate::models::{Chunk, ChunkResult, ChunkStatus, Progress, Record};
use crate::source::{QueryTemplate, RetrievalSource, SourceEvent};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Execution settings for a run.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Pause between consecutive source calls.
    pub delay: Duration,
    /// Re-split chunks that come back with `per_chunk_limit` records.
    pub refine_truncated: bool,
    /// Render a page progress bar per chunk.
    pub show_progress: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(45),
            refine_truncated: true,
            show_progress: true,
        }
    }
}

/// Hooks the run loop calls between chunks.
pub trait RunObserver {
    /// Records already collected for this chunk by an earlier run.
    fn cached(&mut self, _chunk: &Chunk) -> Option<Vec<Record>> {
        None
    }

    /// Called once for every accepted chunk result.
    fn chunk_finished(&mut self, _result: &ChunkResult) {}
}

/// Runs chunks sequentially against one retrieval source.
pub struct ChunkExecutor {
    source: Box<dyn RetrievalSource>,
    options: ExecutorOptions,
}

impl ChunkExecutor {
    pub fn new(source: Box<dyn RetrievalSource>, options: ExecutorOptions) -> Self {
        Self { source, options }
    }

    /// Issue one retrieval for `chunk` and consume its events to a terminal.
    pub async fn execute(&self, chunk: &Chunk, template: &QueryTemplate) -> ChunkResult {
        let started = Instant::now();
        info!("Scanning {} ({})", chunk.name, chunk.label);

        let progress_bar = self.progress_bar(chunk);
        let mut events = self.source.retrieve(template.for_chunk(chunk));
        let mut records: Vec<Record> = Vec::new();
        let mut last_progress: Option<Progress> = None;

        let status = loop {
            match events.next().await {
                Some(SourceEvent::Record(raw)) => {
                    records.push(Record::from_raw(raw, &chunk.name));
                    if records.len() % 25 == 0 {
                        debug!("{} records found in {}", records.len(), chunk.name);
                    }
                }
                Some(SourceEvent::Progress(progress)) => {
                    progress_bar.set_length(progress.total);
                    progress_bar.set_position(progress.current);
                    if progress.current % 10 == 0 {
                        debug!(
                            "Pages: {}/{} ({:.1}%)",
                            progress.current, progress.total, progress.percentage
                        );
                    }
                    last_progress = Some(progress);
                }
                Some(SourceEvent::Complete) => break ChunkStatus::Complete,
                Some(SourceEvent::Error { message }) => {
                    warn!("Error in {}: {}", chunk.name, message);
                    break ChunkStatus::Partial { message };
                }
                None => {
                    warn!("Source stream for {} ended without a terminal event", chunk.name);
                    break ChunkStatus::Partial {
                        message: "source stream ended without a terminal event".to_string(),
                    };
                }
            }
        };

        progress_bar.finish_and_clear();

        let outside = records
            .iter()
            .filter(|r| r.date.is_some_and(|d| !chunk.contains(d)))
            .count();
        if outside > 0 {
            warn!(
                "{} of {} records in {} are dated outside {}..{}",
                outside,
                records.len(),
                chunk.name,
                chunk.start,
                chunk.end
            );
        }

        match &status {
            ChunkStatus::Complete => info!("Complete: {} records in {}", records.len(), chunk.name),
            _ => info!("Partial: kept {} records from {}", records.len(), chunk.name),
        }

        ChunkResult {
            chunk: chunk.clone(),
            records,
            status,
            elapsed: started.elapsed(),
            last_progress,
        }
    }

    /// Execute every chunk in order and collect the results.
    pub async fn run<O: RunObserver>(
        &self,
        chunks: Vec<Chunk>,
        template: &QueryTemplate,
        observer: &mut O,
    ) -> RunState {
        let run_start = Instant::now();
        let mut queue: VecDeque<Chunk> = chunks.into();
        let mut state = RunState::new();

        while let Some(chunk) = queue.pop_front() {
            let (result, hit_source) = match observer.cached(&chunk) {
                Some(records) => {
                    info!("Resuming {} from disk ({} records)", chunk.name, records.len());
                    let result = ChunkResult {
                        chunk,
                        records,
                        status: ChunkStatus::Resumed,
                        elapsed: Duration::ZERO,
                        last_progress: None,
                    };
                    (result, false)
                }
                None => (self.execute(&chunk, template).await, true),
            };

            if hit_source
                && self.options.refine_truncated
                && result.is_truncated(template.per_chunk_limit)
            {
                match result.chunk.split() {
                    Some(parts) => {
                        warn!(
                            "{} returned {} records (limit {}); re-splitting into {} chunks",
                            result.chunk.name,
                            result.records.len(),
                            template.per_chunk_limit,
                            parts.len()
                        );
                        for part in parts.into_iter().rev() {
                            queue.push_front(part);
                        }
                        state.refined += 1;
                        self.pause().await;
                        continue;
                    }
                    None => warn!(
                        "{} hit the {} record limit and cannot be split further; results may be truncated",
                        result.chunk.name, template.per_chunk_limit
                    ),
                }
            }

            observer.chunk_finished(&result);
            state.record(result);
            state.elapsed = run_start.elapsed();
            log_run_progress(&state, queue.len());

            if hit_source && !queue.is_empty() {
                self.pause().await;
            }
        }

        state.elapsed = run_start.elapsed();
        state
    }

    async fn pause(&self) {
        if self.options.delay.is_zero() {
            return;
        }
        info!(
            "Waiting {}s before the next chunk...",
            self.options.delay.as_secs()
        );
        tokio::time::sleep(self.options.delay).await;
    }

    fn progress_bar(&self, chunk: &Chunk) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(0);
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} pages")
        {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb.set_prefix(chunk.name.clone());
        pb
    }
}

fn log_run_progress(state: &RunState, remaining: usize) {
    let done = state.results.len();
    let percent = done as f64 / (done + remaining) as f64 * 100.0;

    info!(
        "Total so far: {} records | progress {:.1}% ({}/{} chunks) | elapsed {:.1} min",
        state.total_records(),
        percent,
        done,
        done + remaining,
        state.elapsed.as_secs_f64() / 60.0
    );

    if remaining > 0 {
        if let Some(avg) = state.average_chunk_time() {
            let estimate = avg.as_secs_f64() * remaining as f64 / 60.0;
            info!("Estimated remaining: {:.1} min", estimate);
        }
    }
}
