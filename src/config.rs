//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.paperchase.toml` files.

use crate::analysis::publishers::PublisherDirectory;
use crate::cli::{Args, OutputFormat};
use crate::error::PipelineError;
use crate::executor::ExecutorOptions;
use crate::models::{Granularity, Location};
use crate::source::http::{BrowserOptions, HttpSourceConfig};
use crate::source::QueryTemplate;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = ".paperchase.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// What to collect.
    #[serde(default)]
    pub run: RunConfig,

    /// Where records come from.
    #[serde(default)]
    pub source: SourceConfig,

    /// Output settings.
    #[serde(default)]
    pub export: ExportConfig,

    /// Extra publisher locations, merged over the built-in table.
    #[serde(default)]
    pub publishers: BTreeMap<String, Location>,
}

/// Query and pacing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Search keyword.
    #[serde(default)]
    pub keyword: String,

    #[serde(default = "default_start_year")]
    pub start_year: i32,

    #[serde(default = "default_end_year")]
    pub end_year: i32,

    /// Archive location code.
    #[serde(default = "default_location")]
    pub location: String,

    #[serde(default)]
    pub granularity: Granularity,

    /// Result cap sent with every chunk query.
    #[serde(default = "default_per_chunk_limit")]
    pub per_chunk_limit: usize,

    /// Pause between source calls.
    #[serde(default = "default_delay")]
    pub delay_seconds: u64,

    /// Re-split chunks that hit the result cap.
    #[serde(default = "default_true")]
    pub refine_truncated: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            keyword: String::new(),
            start_year: default_start_year(),
            end_year: default_end_year(),
            location: default_location(),
            granularity: Granularity::default(),
            per_chunk_limit: default_per_chunk_limit(),
            delay_seconds: default_delay(),
            refine_truncated: true,
        }
    }
}

fn default_start_year() -> i32 {
    1870
}

fn default_end_year() -> i32 {
    1874
}

fn default_location() -> String {
    "us-ca".to_string()
}

fn default_per_chunk_limit() -> usize {
    1000
}

fn default_delay() -> u64 {
    45
}

/// Retrieval source kind.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Live retrieval service over HTTP (default)
    #[default]
    Http,
    /// Recorded NDJSON event files
    Replay,
}

/// Retrieval source settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Retrieval service URL.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Directory of recordings for the replay source.
    #[serde(default = "default_replay_dir")]
    pub replay_dir: PathBuf,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    #[serde(default)]
    pub proxy: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Browser executable the service should launch.
    #[serde(default)]
    pub browser_path: Option<String>,

    #[serde(default = "default_true")]
    pub headless: bool,

    /// Extra browser launch arguments.
    #[serde(default)]
    pub browser_args: Vec<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            endpoint: default_endpoint(),
            replay_dir: default_replay_dir(),
            timeout_seconds: default_timeout(),
            proxy: None,
            user_agent: default_user_agent(),
            browser_path: None,
            headless: true,
            browser_args: Vec::new(),
        }
    }
}

fn default_endpoint() -> String {
    "http://localhost:3000".to_string()
}

fn default_replay_dir() -> PathBuf {
    PathBuf::from("fixtures/replay")
}

fn default_timeout() -> u64 {
    1800 // a dense chunk can page for a long time
}

fn default_user_agent() -> String {
    format!("paperchase/{}", env!("CARGO_PKG_VERSION"))
}

/// Export settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Characters of page content kept in exports.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,

    /// Write one file per finished chunk.
    #[serde(default = "default_true")]
    pub write_chunk_files: bool,

    #[serde(default)]
    pub report_format: OutputFormat,

    /// Start from the built-in publisher table.
    #[serde(default = "default_true")]
    pub include_builtin_publishers: bool,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            preview_chars: default_preview_chars(),
            write_chunk_files: true,
            report_format: OutputFormat::default(),
            include_builtin_publishers: true,
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_preview_chars() -> usize {
    200
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only values the user actually passed override the file.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref keyword) = args.keyword {
            self.run.keyword = keyword.clone();
        }
        if let Some(year) = args.start_year {
            self.run.start_year = year;
        }
        if let Some(year) = args.end_year {
            self.run.end_year = year;
        }
        if let Some(ref location) = args.location {
            self.run.location = location.clone();
        }
        if let Some(granularity) = args.granularity {
            self.run.granularity = granularity;
        }
        if let Some(limit) = args.limit {
            self.run.per_chunk_limit = limit;
        }
        if let Some(delay) = args.delay {
            self.run.delay_seconds = delay;
        }
        if args.no_refine {
            self.run.refine_truncated = false;
        }

        if let Some(kind) = args.source {
            self.source.kind = kind;
        }
        if let Some(ref endpoint) = args.endpoint {
            self.source.endpoint = endpoint.clone();
        }
        if let Some(ref dir) = args.replay_dir {
            self.source.replay_dir = dir.clone();
        }

        if let Some(ref dir) = args.output_dir {
            self.export.output_dir = dir.clone();
        }
        if let Some(format) = args.format {
            self.export.report_format = format;
        }
    }

    /// Check the merged settings before anything runs.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.run.keyword.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "a keyword is required (--keyword, PAPERCHASE_KEYWORD or [run].keyword)"
                    .to_string(),
            ));
        }

        if self.run.start_year > self.run.end_year {
            return Err(PipelineError::InvalidRange {
                start: self.run.start_year,
                end: self.run.end_year,
            });
        }

        if self.run.per_chunk_limit == 0 {
            return Err(PipelineError::Configuration(
                "per_chunk_limit must be at least 1".to_string(),
            ));
        }

        if self.source.kind == SourceKind::Http
            && !self.source.endpoint.starts_with("http://")
            && !self.source.endpoint.starts_with("https://")
        {
            return Err(PipelineError::Configuration(format!(
                "endpoint must start with 'http://' or 'https://': {}",
                self.source.endpoint
            )));
        }

        Ok(())
    }

    pub fn query_template(&self) -> QueryTemplate {
        QueryTemplate {
            keyword: self.run.keyword.clone(),
            location: self.run.location.clone(),
            per_chunk_limit: self.run.per_chunk_limit,
        }
    }

    pub fn executor_options(&self, show_progress: bool) -> ExecutorOptions {
        ExecutorOptions {
            delay: Duration::from_secs(self.run.delay_seconds),
            refine_truncated: self.run.refine_truncated,
            show_progress,
        }
    }

    pub fn http_source_config(&self) -> HttpSourceConfig {
        HttpSourceConfig {
            endpoint: self.source.endpoint.clone(),
            timeout_seconds: self.source.timeout_seconds,
            proxy: self.source.proxy.clone(),
            user_agent: self.source.user_agent.clone(),
            browser: BrowserOptions {
                executable_path: self.source.browser_path.clone(),
                headless: self.source.headless,
                args: self.source.browser_args.clone(),
            },
        }
    }

    /// Built-in publisher table (unless disabled) with `[publishers]` on top.
    pub fn publisher_directory(&self) -> PublisherDirectory {
        let mut directory = if self.export.include_builtin_publishers {
            PublisherDirectory::default()
        } else {
            PublisherDirectory::empty()
        };
        directory.extend(self.publishers.clone());
        directory
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let mut config = Config::default();
        config.run.keyword = "rancho".to_string();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
