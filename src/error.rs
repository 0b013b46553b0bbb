//! Error types for the collection pipeline.
//!
//! Only run-level misconfiguration and export I/O are errors. Source
//! failures degrade a chunk to partial and malformed record fields fall
//! back to sentinels, so neither has a variant here.

use std::path::PathBuf;
use thiserror::Error;

/// Failures that stop a run before any chunk executes.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid date range: start year {start} is after end year {end}")]
    InvalidRange { start: i32, end: i32 },

    #[error("year {0} is outside the supported calendar range")]
    YearOutOfRange(i32),

    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Failure writing or reading one tabular file.
///
/// Scoped to a single export step; callers log it and move on.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_range_message() {
        let err = PipelineError::InvalidRange {
            start: 1875,
            end: 1870,
        };
        assert_eq!(
            err.to_string(),
            "invalid date range: start year 1875 is after end year 1870"
        );
    }
}
