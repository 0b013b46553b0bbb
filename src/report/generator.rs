//! Run report generation.
//!
//! Renders a finished collection run as Markdown or JSON: what was asked,
//! how each chunk ended, and the headline rollups.

use crate::analysis::aggregator::{DedupStats, MasterCollection};
use crate::analysis::rollup::{LowMatchShare, MatchBucket, PeriodRollup, PublisherRollup, Rollups};
use crate::executor::RunState;
use crate::models::{ChunkStatus, Granularity};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

/// Publishers listed in the report.
pub const TOP_PUBLISHERS: usize = 10;

/// What the run was asked to do.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub keyword: String,
    pub start_year: i32,
    pub end_year: i32,
    pub location: String,
    pub granularity: Granularity,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Run-level counts.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RunTotals {
    pub chunks: usize,
    pub successful: usize,
    pub partial: usize,
    pub resumed: usize,
    pub refined: usize,
    pub records: usize,
}

/// One row of the chunk table.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkSummary {
    pub name: String,
    pub label: String,
    pub status: String,
    pub records: usize,
    pub elapsed_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Complete run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub metadata: RunMetadata,
    pub totals: RunTotals,
    pub chunks: Vec<ChunkSummary>,
    pub dedup: DedupStats,
    pub top_publishers: Vec<PublisherRollup>,
    pub by_year: Vec<PeriodRollup<i32>>,
    pub match_distribution: Vec<MatchBucket>,
    pub low_match: LowMatchShare,
    pub files: Vec<PathBuf>,
}

impl RunReport {
    pub fn new(
        metadata: RunMetadata,
        state: &RunState,
        collection: &MasterCollection,
        rollups: &Rollups,
        files: Vec<PathBuf>,
    ) -> Self {
        let chunks = state
            .results
            .iter()
            .map(|r| ChunkSummary {
                name: r.chunk.name.clone(),
                label: r.chunk.label.clone(),
                status: r.status.to_string(),
                records: r.records.len(),
                elapsed_seconds: r.elapsed.as_secs_f64(),
                message: match &r.status {
                    ChunkStatus::Partial { message } => Some(message.clone()),
                    _ => None,
                },
            })
            .collect();

        let totals = RunTotals {
            chunks: state.results.len(),
            successful: state.successful(),
            partial: state.partial(),
            resumed: state.resumed(),
            refined: state.refined,
            records: state.total_records(),
        };

        Self {
            metadata,
            totals,
            chunks,
            dedup: collection.stats,
            top_publishers: rollups
                .by_publisher
                .iter()
                .take(TOP_PUBLISHERS)
                .cloned()
                .collect(),
            by_year: rollups.by_year.clone(),
            match_distribution: rollups.match_distribution.clone(),
            low_match: rollups.low_match,
            files,
        }
    }

    pub fn partial_chunks(&self) -> impl Iterator<Item = &ChunkSummary> {
        self.chunks.iter().filter(|c| c.message.is_some())
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &RunReport) -> String {
    let mut output = String::new();

    output.push_str(&format!(
        "# Collection Report: {}\n\n",
        report.metadata.keyword
    ));

    output.push_str(&generate_metadata_section(&report.metadata, &report.totals));
    output.push_str(&generate_chunks_section(&report.chunks));
    output.push_str(&generate_dedup_section(&report.dedup));
    output.push_str(&generate_publishers_section(&report.top_publishers));
    output.push_str(&generate_yearly_section(&report.by_year));
    output.push_str(&generate_match_section(
        &report.match_distribution,
        &report.low_match,
    ));
    output.push_str(&generate_partial_section(report));
    output.push_str(&generate_files_section(&report.files));
    output.push_str(&generate_footer());

    output
}

fn generate_metadata_section(metadata: &RunMetadata, totals: &RunTotals) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!("- **Keyword:** {}\n", metadata.keyword));
    section.push_str(&format!(
        "- **Date Range:** {}-{}\n",
        metadata.start_year, metadata.end_year
    ));
    if !metadata.location.is_empty() {
        section.push_str(&format!("- **Location:** `{}`\n", metadata.location));
    }
    section.push_str(&format!("- **Granularity:** {}\n", metadata.granularity));
    section.push_str(&format!(
        "- **Started:** {}\n",
        metadata.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Duration:** {:.1} minutes\n",
        metadata.duration_seconds / 60.0
    ));
    section.push_str(&format!(
        "- **Chunks:** {} ({} successful, {} partial)\n",
        totals.chunks, totals.successful, totals.partial
    ));
    if totals.resumed > 0 {
        section.push_str(&format!("- **Resumed From Disk:** {}\n", totals.resumed));
    }
    if totals.refined > 0 {
        section.push_str(&format!("- **Re-split (truncated):** {}\n", totals.refined));
    }
    section.push_str(&format!("- **Total Records:** {}\n", totals.records));
    section.push('\n');

    section
}

fn generate_chunks_section(chunks: &[ChunkSummary]) -> String {
    let mut section = String::new();

    section.push_str("## Chunks\n\n");
    if chunks.is_empty() {
        section.push_str("No chunks were executed.\n\n");
        return section;
    }

    section.push_str("| Chunk | Period | Status | Records | Time |\n");
    section.push_str("|:---|:---|:---:|---:|---:|\n");
    for chunk in chunks {
        section.push_str(&format!(
            "| `{}` | {} | {} | {} | {:.1}s |\n",
            chunk.name, chunk.label, chunk.status, chunk.records, chunk.elapsed_seconds
        ));
    }
    section.push('\n');

    section
}

fn generate_dedup_section(stats: &DedupStats) -> String {
    let mut section = String::new();

    section.push_str("## Duplicate Check\n\n");
    section.push_str("| Total Records | Unique Keys | Duplicates |\n");
    section.push_str("|---:|---:|---:|\n");
    section.push_str(&format!(
        "| {} | {} | {} |\n\n",
        stats.total, stats.unique, stats.duplicates
    ));
    if stats.duplicates > 0 {
        section.push_str(
            "Records sharing a date, publisher and page are kept in every export.\n\n",
        );
    }

    section
}

fn generate_publishers_section(publishers: &[PublisherRollup]) -> String {
    if publishers.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Top Publishers\n\n");
    section.push_str("| Publisher | Location | Pages | Matches | Avg/Page |\n");
    section.push_str("|:---|:---|---:|---:|---:|\n");
    for row in publishers {
        section.push_str(&format!(
            "| {} | {}, {} | {} | {} | {} |\n",
            row.publisher,
            row.location.city,
            row.location.state,
            row.total_pages,
            row.total_matches,
            format_avg(row.avg_matches_per_page)
        ));
    }
    section.push('\n');

    section
}

fn generate_yearly_section(years: &[PeriodRollup<i32>]) -> String {
    if years.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## By Year\n\n");
    section.push_str("| Year | Pages | Matches | Publishers | Avg/Page |\n");
    section.push_str("|:---|---:|---:|---:|---:|\n");
    for row in years {
        let year = row
            .key
            .map(|y| y.to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        section.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            year,
            row.total_pages,
            row.total_matches,
            row.distinct_publishers,
            format_avg(row.avg_matches_per_page)
        ));
    }
    section.push('\n');

    section
}

fn generate_match_section(buckets: &[MatchBucket], low: &LowMatchShare) -> String {
    if buckets.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Match Distribution\n\n");
    section.push_str("| Matches/Page | Pages | Share |\n");
    section.push_str("|---:|---:|---:|\n");
    for bucket in buckets {
        section.push_str(&format!(
            "| {} | {} | {:.1}% |\n",
            bucket.match_count, bucket.pages, bucket.percentage
        ));
    }
    section.push('\n');

    if let Some(pct) = low.percentage {
        section.push_str(&format!(
            "{} pages ({:.1}%) have {} or fewer matches.\n\n",
            low.pages, pct, low.threshold
        ));
    }

    section
}

fn generate_partial_section(report: &RunReport) -> String {
    let partial: Vec<_> = report.partial_chunks().collect();
    if partial.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Partial Chunks\n\n");
    for chunk in partial {
        section.push_str(&format!(
            "- **{}** ({} records kept): {}\n",
            chunk.label,
            chunk.records,
            chunk.message.as_deref().unwrap_or_default()
        ));
    }
    section.push_str("\nRe-run with `--resume` to retry only these chunks.\n\n");

    section
}

fn generate_files_section(files: &[PathBuf]) -> String {
    if files.is_empty() {
        return String::new();
    }

    let mut section = String::new();

    section.push_str("## Files Written\n\n");
    for file in files {
        section.push_str(&format!("- `{}`\n", file.display()));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    format!(
        "---\n\n*Report generated by paperchase v{}*\n",
        env!("CARGO_PKG_VERSION")
    )
}

fn format_avg(avg: Option<f64>) -> String {
    avg.map(|a| format!("{:.2}", a))
        .unwrap_or_else(|| "-".to_string())
}

/// Generate a JSON report.
pub fn generate_json_report(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}
