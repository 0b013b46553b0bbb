//! Tabular export of records and rollups.
//!
//! Every table is written with the `csv` crate from a serde row struct, so
//! header order follows field order and quoting is standard. Missing values
//! become empty fields.

use crate::analysis::aggregator::MasterCollection;
use crate::analysis::publishers::PublisherDirectory;
use crate::analysis::rollup::{MatchBucket, PeriodRollup, PublisherRollup, Rollups, YearQuarter};
use crate::error::ExportError;
use crate::executor::RunObserver;
use crate::models::{parse_date, Chunk, ChunkResult, ChunkStatus, Period, Record, UNKNOWN};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// One exported record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRow {
    #[serde(rename = "Publisher")]
    pub publisher: String,
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Page")]
    pub page: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Match_Count")]
    pub match_count: u64,
    #[serde(rename = "Source_URL")]
    pub source_url: String,
    #[serde(rename = "Keyword")]
    pub keyword: String,
    #[serde(rename = "Year")]
    pub year: Option<i32>,
    #[serde(rename = "Month")]
    pub month: Option<u32>,
    #[serde(rename = "Month_Name")]
    pub month_name: String,
    #[serde(rename = "Year_Quarter")]
    pub year_quarter: String,
    #[serde(rename = "Chunk")]
    pub chunk: String,
    #[serde(rename = "Chunk_Label")]
    pub chunk_label: String,
    #[serde(rename = "City")]
    pub city: String,
    #[serde(rename = "County")]
    pub county: String,
    #[serde(rename = "State")]
    pub state: String,
    #[serde(rename = "Content_Preview")]
    pub content_preview: String,
}

impl RecordRow {
    /// Rebuild a record from an exported row.
    ///
    /// The content comes back as the stored preview, not the full text.
    pub fn into_record(self) -> Record {
        Record {
            date: parse_date(&self.date),
            date_text: self.date,
            publisher: self.publisher,
            title: self.title,
            page: non_empty(self.page),
            location: self.location,
            match_count: self.match_count,
            url: non_empty(self.source_url),
            content: non_empty(self.content_preview),
            chunk: self.chunk,
        }
    }
}

#[derive(Debug, Serialize)]
struct PublisherRow<'a> {
    #[serde(rename = "Publisher")]
    publisher: &'a str,
    #[serde(rename = "City")]
    city: &'a str,
    #[serde(rename = "County")]
    county: &'a str,
    #[serde(rename = "State")]
    state: &'a str,
    #[serde(rename = "Total_Pages")]
    total_pages: usize,
    #[serde(rename = "Total_Matches")]
    total_matches: u64,
    #[serde(rename = "Avg_Matches_Per_Page")]
    avg: String,
}

#[derive(Debug, Serialize)]
struct MonthRow {
    #[serde(rename = "Year")]
    year: String,
    #[serde(rename = "Month")]
    month: String,
    #[serde(rename = "Month_Name")]
    month_name: String,
    #[serde(rename = "Total_Pages")]
    total_pages: usize,
    #[serde(rename = "Total_Matches")]
    total_matches: u64,
    #[serde(rename = "Distinct_Publishers")]
    distinct_publishers: usize,
    #[serde(rename = "Avg_Matches_Per_Page")]
    avg: String,
}

#[derive(Debug, Serialize)]
struct QuarterRow {
    #[serde(rename = "Year_Quarter")]
    year_quarter: String,
    #[serde(rename = "Total_Pages")]
    total_pages: usize,
    #[serde(rename = "Total_Matches")]
    total_matches: u64,
    #[serde(rename = "Distinct_Publishers")]
    distinct_publishers: usize,
    #[serde(rename = "Avg_Matches_Per_Page")]
    avg: String,
}

#[derive(Debug, Serialize)]
struct YearRow {
    #[serde(rename = "Year")]
    year: String,
    #[serde(rename = "Total_Pages")]
    total_pages: usize,
    #[serde(rename = "Total_Matches")]
    total_matches: u64,
    #[serde(rename = "Distinct_Publishers")]
    distinct_publishers: usize,
    #[serde(rename = "Avg_Matches_Per_Page")]
    avg: String,
}

#[derive(Debug, Serialize)]
struct MatchRow {
    #[serde(rename = "Match_Count")]
    match_count: u64,
    #[serde(rename = "Pages")]
    pages: usize,
    #[serde(rename = "Percentage")]
    percentage: String,
    #[serde(rename = "Cumulative_Pages")]
    cumulative_pages: usize,
}

/// Which rollup table a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollupKind {
    Publisher,
    Monthly,
    Quarterly,
    Yearly,
    MatchDistribution,
}

impl RollupKind {
    fn file_tag(self) -> &'static str {
        match self {
            RollupKind::Publisher => "publisher_summary",
            RollupKind::Monthly => "monthly_summary",
            RollupKind::Quarterly => "quarterly_summary",
            RollupKind::Yearly => "yearly_summary",
            RollupKind::MatchDistribution => "match_distribution",
        }
    }
}

/// Turns records into rows for one keyword.
#[derive(Debug, Clone)]
pub struct RecordExporter {
    keyword: String,
    directory: PublisherDirectory,
    preview_chars: usize,
}

impl RecordExporter {
    pub fn new(keyword: &str, directory: PublisherDirectory, preview_chars: usize) -> Self {
        Self {
            keyword: keyword.to_string(),
            directory,
            preview_chars,
        }
    }

    pub fn keyword(&self) -> &str {
        &self.keyword
    }

    /// Build the export row for one record.
    pub fn row(&self, record: &Record, chunk_label: &str) -> RecordRow {
        let period = record.period();
        let location = self.directory.lookup(&record.publisher);

        RecordRow {
            publisher: record.publisher.clone(),
            title: record.title.clone(),
            date: record.date_text.clone(),
            page: record.page.clone().unwrap_or_default(),
            location: record.location.clone(),
            match_count: record.match_count,
            source_url: record.url.clone().unwrap_or_default(),
            keyword: self.keyword.clone(),
            year: period.map(|p| p.year),
            month: period.map(|p| p.month),
            month_name: period
                .map(|p| p.month_name().to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            year_quarter: period
                .map(|p| p.year_quarter())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            chunk: record.chunk.clone(),
            chunk_label: chunk_label.to_string(),
            city: location.city.clone(),
            county: location.county.clone(),
            state: location.state.clone(),
            content_preview: record
                .content
                .as_deref()
                .map(|c| preview(c, self.preview_chars))
                .unwrap_or_default(),
        }
    }

    /// Write one chunk's records.
    pub fn write_chunk(&self, path: &Path, chunk: &Chunk, records: &[Record]) -> Result<(), ExportError> {
        write_rows(path, records.iter().map(|r| self.row(r, &chunk.label)))
    }

    /// Write the whole master collection. `labels` maps chunk name to label.
    pub fn write_collection(
        &self,
        path: &Path,
        collection: &MasterCollection,
        labels: &HashMap<String, String>,
    ) -> Result<(), ExportError> {
        write_rows(
            path,
            collection.entries.iter().map(|e| {
                let label = labels
                    .get(&e.record.chunk)
                    .map(String::as_str)
                    .unwrap_or(e.record.chunk.as_str());
                self.row(&e.record, label)
            }),
        )
    }
}

/// Serialize rows to `path`, header first.
pub fn write_rows<T, I>(path: &Path, rows: I) -> Result<(), ExportError>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let write_err = |source| ExportError::Write {
        path: path.to_path_buf(),
        source,
    };

    let mut writer = csv::Writer::from_path(path).map_err(write_err)?;
    for row in rows {
        writer.serialize(row).map_err(write_err)?;
    }
    writer.flush()?;

    Ok(())
}

/// Parse a record file written by [`RecordExporter`].
pub fn read_records(path: &Path) -> Result<Vec<Record>, ExportError> {
    let read_err = |source| ExportError::Read {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::Reader::from_path(path).map_err(read_err)?;
    let mut records = Vec::new();
    for row in reader.deserialize::<RecordRow>() {
        records.push(row.map_err(read_err)?.into_record());
    }

    Ok(records)
}

pub fn write_publisher_rollup(path: &Path, rows: &[PublisherRollup]) -> Result<(), ExportError> {
    write_rows(
        path,
        rows.iter().map(|r| PublisherRow {
            publisher: &r.publisher,
            city: &r.location.city,
            county: &r.location.county,
            state: &r.location.state,
            total_pages: r.total_pages,
            total_matches: r.total_matches,
            avg: format_avg(r.avg_matches_per_page),
        }),
    )
}

pub fn write_monthly_rollup(path: &Path, rows: &[PeriodRollup<Period>]) -> Result<(), ExportError> {
    write_rows(
        path,
        rows.iter().map(|r| MonthRow {
            year: key_text(r.key.map(|p| p.year)),
            month: key_text(r.key.map(|p| p.month)),
            month_name: r
                .key
                .map(|p| p.month_name().to_string())
                .unwrap_or_else(|| UNKNOWN.to_string()),
            total_pages: r.total_pages,
            total_matches: r.total_matches,
            distinct_publishers: r.distinct_publishers,
            avg: format_avg(r.avg_matches_per_page),
        }),
    )
}

pub fn write_quarterly_rollup(
    path: &Path,
    rows: &[PeriodRollup<YearQuarter>],
) -> Result<(), ExportError> {
    write_rows(
        path,
        rows.iter().map(|r| QuarterRow {
            year_quarter: key_text(r.key),
            total_pages: r.total_pages,
            total_matches: r.total_matches,
            distinct_publishers: r.distinct_publishers,
            avg: format_avg(r.avg_matches_per_page),
        }),
    )
}

pub fn write_yearly_rollup(path: &Path, rows: &[PeriodRollup<i32>]) -> Result<(), ExportError> {
    write_rows(
        path,
        rows.iter().map(|r| YearRow {
            year: key_text(r.key),
            total_pages: r.total_pages,
            total_matches: r.total_matches,
            distinct_publishers: r.distinct_publishers,
            avg: format_avg(r.avg_matches_per_page),
        }),
    )
}

pub fn write_match_distribution(path: &Path, rows: &[MatchBucket]) -> Result<(), ExportError> {
    write_rows(
        path,
        rows.iter().map(|b| MatchRow {
            match_count: b.match_count,
            pages: b.pages,
            percentage: format!("{:.1}", b.percentage),
            cumulative_pages: b.cumulative_pages,
        }),
    )
}

/// Write the combined record file and every rollup table into `dir`.
///
/// Each file is its own step: a failure is logged and the remaining files
/// are still written. Returns the paths that made it to disk.
pub fn write_collection_exports(
    exporter: &RecordExporter,
    dir: &Path,
    years: [i32; 2],
    labels: &HashMap<String, String>,
    collection: &MasterCollection,
    rollups: &Rollups,
) -> Vec<PathBuf> {
    let mut written = Vec::new();

    if collection.is_empty() {
        warn!("No records collected, skipping combined and summary exports");
        return written;
    }

    let keyword = exporter.keyword();
    let mut export = |path: PathBuf, result: Result<(), ExportError>| match result {
        Ok(()) => {
            info!("Saved {}", path.display());
            written.push(path);
        }
        Err(e) => error!("Export failed: {}", e),
    };

    let path = dir.join(combined_file_name(keyword, years, collection.len()));
    let result = exporter.write_collection(&path, collection, labels);
    export(path, result);

    let path = dir.join(rollup_file_name(keyword, RollupKind::Publisher, years));
    let result = write_publisher_rollup(&path, &rollups.by_publisher);
    export(path, result);

    let path = dir.join(rollup_file_name(keyword, RollupKind::Monthly, years));
    let result = write_monthly_rollup(&path, &rollups.by_month);
    export(path, result);

    let path = dir.join(rollup_file_name(keyword, RollupKind::Quarterly, years));
    let result = write_quarterly_rollup(&path, &rollups.by_quarter);
    export(path, result);

    let path = dir.join(rollup_file_name(keyword, RollupKind::Yearly, years));
    let result = write_yearly_rollup(&path, &rollups.by_year);
    export(path, result);

    let path = dir.join(rollup_file_name(keyword, RollupKind::MatchDistribution, years));
    let result = write_match_distribution(&path, &rollups.match_distribution);
    export(path, result);

    written
}

/// Lowercase alphanumerics joined by single underscores.
pub fn slug(keyword: &str) -> String {
    let mut out = String::with_capacity(keyword.len());
    for c in keyword.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.is_empty() && !out.ends_with('_') {
            out.push('_');
        }
    }
    let trimmed = out.trim_end_matches('_');
    if trimmed.is_empty() {
        "query".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn chunk_file_name(keyword: &str, chunk: &str, count: usize, partial: bool) -> String {
    if partial {
        format!("{}_{}_partial_{}_records.csv", slug(keyword), chunk, count)
    } else {
        format!("{}_{}_{}_records.csv", slug(keyword), chunk, count)
    }
}

pub fn combined_file_name(keyword: &str, years: [i32; 2], count: usize) -> String {
    format!(
        "{}_{}_{}_combined_{}_records.csv",
        slug(keyword),
        years[0],
        years[1],
        count
    )
}

pub fn rollup_file_name(keyword: &str, kind: RollupKind, years: [i32; 2]) -> String {
    format!(
        "{}_{}_{}_{}.csv",
        slug(keyword),
        kind.file_tag(),
        years[0],
        years[1]
    )
}

pub fn report_file_name(keyword: &str, years: [i32; 2], extension: &str) -> String {
    format!(
        "{}_{}_{}_run_report.{}",
        slug(keyword),
        years[0],
        years[1],
        extension
    )
}

/// Locate a complete per-chunk file from an earlier run.
///
/// Partial files are ignored so an interrupted chunk gets retried. With
/// several candidates the one holding the most records wins.
pub fn find_chunk_file(dir: &Path, keyword: &str, chunk: &str) -> Option<PathBuf> {
    let prefix = format!("{}_{}_", slug(keyword), chunk);
    let entries = std::fs::read_dir(dir).ok()?;

    entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            let count: usize = name
                .strip_prefix(&prefix)?
                .strip_suffix("_records.csv")?
                .parse()
                .ok()?;
            Some((count, e.path()))
        })
        .max_by_key(|(count, _)| *count)
        .map(|(_, path)| path)
}

/// Writes each finished chunk to its own file and serves resumed chunks.
pub struct ChunkFileSink {
    exporter: RecordExporter,
    output_dir: PathBuf,
    write_files: bool,
    resume: bool,
    written: Vec<PathBuf>,
}

impl ChunkFileSink {
    pub fn new(exporter: RecordExporter, output_dir: &Path, write_files: bool, resume: bool) -> Self {
        Self {
            exporter,
            output_dir: output_dir.to_path_buf(),
            write_files,
            resume,
            written: Vec::new(),
        }
    }

    pub fn into_written(self) -> Vec<PathBuf> {
        self.written
    }
}

impl RunObserver for ChunkFileSink {
    fn cached(&mut self, chunk: &Chunk) -> Option<Vec<Record>> {
        if !self.resume {
            return None;
        }

        let path = find_chunk_file(&self.output_dir, self.exporter.keyword(), &chunk.name)?;
        match read_records(&path) {
            Ok(records) => {
                info!(
                    "Resuming {} from {} ({} records)",
                    chunk.name,
                    path.display(),
                    records.len()
                );
                Some(records)
            }
            Err(e) => {
                warn!("Ignoring unreadable chunk file: {}", e);
                None
            }
        }
    }

    fn chunk_finished(&mut self, result: &ChunkResult) {
        if !self.write_files || result.status == ChunkStatus::Resumed {
            return;
        }
        if result.records.is_empty() {
            debug!("No records for {}, skipping chunk file", result.chunk.name);
            return;
        }

        let name = chunk_file_name(
            self.exporter.keyword(),
            &result.chunk.name,
            result.records.len(),
            !result.status.is_success(),
        );
        let path = self.output_dir.join(name);

        match self
            .exporter
            .write_chunk(&path, &result.chunk, &result.records)
        {
            Ok(()) => {
                info!("Saved {} records to {}", result.records.len(), path.display());
                self.written.push(path);
            }
            Err(e) => error!("Chunk export failed: {}", e),
        }
    }
}

fn preview(content: &str, max_chars: usize) -> String {
    content.chars().take(max_chars).collect()
}

fn format_avg(avg: Option<f64>) -> String {
    avg.map(|a| format!("{:.2}", a)).unwrap_or_default()
}

fn key_text<K: ToString>(key: Option<K>) -> String {
    key.map(|k| k.to_string())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
