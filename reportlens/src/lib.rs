//! Find the latest report in a storage backend and analyze it.
//!
//! ```text
//! ReportAnalyzer::analyze_latest_report
//!   -> locator   (list candidates, pick the newest)
//!   -> storage   (read raw bytes)
//!   -> parser    (bytes -> StructuredReport)
//!   -> analyzer  (StructuredReport -> Analysis)
//! ```

pub mod analyzer;
pub mod config;
pub mod error;
pub mod facade;
pub mod locator;
pub mod parser;
pub mod report;

pub use analyzer::{Analysis, Analyzer, MetricStats, MetricValue, SummaryAnalyzer};
pub use config::Config;
pub use error::{Error, Result};
pub use facade::ReportAnalyzer;
pub use parser::{DefaultReportParser, ReportFormat, ReportParser};
pub use report::StructuredReport;

pub use reportlens_storage as storage;
