//! Aggregation and rollups over collected records.

pub mod aggregator;
pub mod publishers;
pub mod rollup;

pub use aggregator::{merge, MasterCollection};
pub use publishers::PublisherDirectory;
pub use rollup::{summarize, Rollups};
