//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::config::SourceKind;
use crate::models::Granularity;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Paperchase - chunked keyword collection from a rate-limited newspaper archive
///
/// Splits a year range into calendar chunks, queries the archive one chunk
/// at a time, and exports records plus publisher and period rollups as CSV.
///
/// Examples:
///   paperchase --keyword rancho --start-year 1870 --end-year 1874
///   paperchase --keyword rancho --granularity monthly --delay 30
///   paperchase --keyword rancho --source replay --replay-dir fixtures/replay --delay 0
///   paperchase --keyword rancho --resume --strict
///   paperchase --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Keyword to search for
    ///
    /// Can also be set via PAPERCHASE_KEYWORD or [run].keyword in .paperchase.toml.
    #[arg(short, long, env = "PAPERCHASE_KEYWORD")]
    pub keyword: Option<String>,

    /// First year of the range (inclusive)
    #[arg(long, value_name = "YEAR")]
    pub start_year: Option<i32>,

    /// Last year of the range (inclusive)
    #[arg(long, value_name = "YEAR")]
    pub end_year: Option<i32>,

    /// Archive location code (e.g. us-ca)
    #[arg(short, long, value_name = "CODE")]
    pub location: Option<String>,

    /// Calendar unit each chunk spans
    #[arg(short, long, value_name = "UNIT")]
    pub granularity: Option<Granularity>,

    /// Result cap per chunk query
    ///
    /// Keep this well above the expected chunk volume. A chunk that
    /// returns this many records is re-split unless --no-refine is set.
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<usize>,

    /// Seconds to wait between source calls
    #[arg(long, value_name = "SECS")]
    pub delay: Option<u64>,

    /// Where records come from
    #[arg(long, value_name = "KIND")]
    pub source: Option<SourceKind>,

    /// Retrieval service URL
    #[arg(long, value_name = "URL", env = "PAPERCHASE_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Directory of recorded query results for --source replay
    #[arg(long, value_name = "DIR")]
    pub replay_dir: Option<PathBuf>,

    /// Directory for CSV exports and the run report
    #[arg(short, long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .paperchase.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run report format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Reuse per-chunk files from an earlier run in the output directory
    ///
    /// Only complete chunk files are reused; partial chunks are retried.
    #[arg(long)]
    pub resume: bool,

    /// Accept chunks that hit the result cap instead of re-splitting them
    #[arg(long)]
    pub no_refine: bool,

    /// Exit with code 2 if any chunk ended partial
    #[arg(long)]
    pub strict: bool,

    /// Dry run: print the chunk plan without querying the source
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .paperchase.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the run report.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Markdown => "md",
            OutputFormat::Json => "json",
        }
    }
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        if let (Some(start), Some(end)) = (self.start_year, self.end_year) {
            if start > end {
                return Err(format!(
                    "Start year {} is after end year {}",
                    start, end
                ));
            }
        }

        if self.limit == Some(0) {
            return Err("Limit must be at least 1".to_string());
        }

        if let Some(ref endpoint) = self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err("Endpoint URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(ref keyword) = self.keyword {
            if keyword.trim().is_empty() {
                return Err("Keyword must not be empty".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref dir) = self.replay_dir {
            if !dir.is_dir() {
                return Err(format!(
                    "Replay directory does not exist: {}",
                    dir.display()
                ));
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            keyword: Some("rancho".to_string()),
            start_year: Some(1870),
            end_year: Some(1874),
            location: None,
            granularity: None,
            limit: None,
            delay: None,
            source: None,
            endpoint: None,
            replay_dir: None,
            output_dir: None,
            config: None,
            format: None,
            verbose: false,
            quiet: false,
            resume: false,
            no_refine: false,
            strict: false,
            dry_run: false,
            init_config: false,
        }
    }

    #[test]
    fn test_parse_flags() {
        let args = Args::parse_from([
            "paperchase",
            "-k",
            "rancho",
            "--start-year",
            "1870",
            "--end-year",
            "1871",
            "--granularity",
            "half-monthly",
            "--source",
            "replay",
            "--format",
            "json",
            "--strict",
        ]);

        assert_eq!(args.keyword.as_deref(), Some("rancho"));
        assert_eq!(args.granularity, Some(Granularity::HalfMonthly));
        assert_eq!(args.source, Some(SourceKind::Replay));
        assert_eq!(args.format, Some(OutputFormat::Json));
        assert!(args.strict);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_inverted_range() {
        let mut args = make_args();
        args.start_year = Some(1875);
        args.end_year = Some(1870);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_invalid_endpoint() {
        let mut args = make_args();
        args.endpoint = Some("localhost:3000".to_string());
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_limit() {
        let mut args = make_args();
        args.limit = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.keyword = Some(String::new());
        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }

    #[test]
    fn test_report_extension() {
        assert_eq!(OutputFormat::Markdown.extension(), "md");
        assert_eq!(OutputFormat::Json.extension(), "json");
    }
}
