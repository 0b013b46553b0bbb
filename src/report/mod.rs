//! Export and reporting.
//!
//! This module writes record and rollup tables to CSV and renders the
//! run report in Markdown or JSON.

pub mod csv_export;
pub mod generator;

pub use csv_export::{ChunkFileSink, RecordExporter};
pub use generator::{generate_json_report, generate_markdown_report, RunMetadata, RunReport};
