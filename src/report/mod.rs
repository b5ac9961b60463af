//! Period reports: chart buckets, statistics and the markdown export.

pub mod chart;
pub mod generator;
pub mod stats;

pub use generator::{render_report, write_report, ReportInput};
