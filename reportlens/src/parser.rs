//! Report parsing.
//!
//! Two formats are understood. JSON reports are objects:
//!
//! ```json
//! {
//!   "timestamp": "2024-05-01T06:30:00Z",
//!   "title": "Nightly build",
//!   "metrics": { "duration_s": 812.5, "failed": 0 },
//!   "attributes": { "branch": "main" }
//! }
//! ```
//!
//! Text reports are line oriented. `key: value` lines are header fields
//! (`timestamp`, `title`, anything else becomes an attribute) and
//! `key = value` lines are numeric metrics. Blank lines and lines starting
//! with `#` are skipped:
//!
//! ```text
//! timestamp: 2024-05-01T06:30:00Z
//! title: Nightly build
//! branch: main
//!
//! duration_s = 812.5
//! failed = 0
//! ```

use chrono::{DateTime, NaiveDateTime, Utc};
use reportlens_storage::RawReport;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::report::StructuredReport;

/// Converts raw report bytes into a [`StructuredReport`].
///
/// Implementations must be pure: no I/O and no shared mutable state, so the
/// same bytes always parse to the same report.
pub trait ReportParser: Send + Sync {
    fn parse(&self, raw: &RawReport) -> Result<StructuredReport>;
}

/// Report encodings understood by [`DefaultReportParser`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// JSON when the content starts with `{`, text otherwise
    #[default]
    Auto,
    Json,
    Text,
}

impl ReportFormat {
    /// Resolve `Auto` against actual content.
    pub fn detect(self, data: &[u8]) -> ReportFormat {
        match self {
            ReportFormat::Auto => {
                let first = data
                    .strip_prefix(b"\xEF\xBB\xBF")
                    .unwrap_or(data)
                    .iter()
                    .find(|b| !b.is_ascii_whitespace());
                if first == Some(&b'{') {
                    ReportFormat::Json
                } else {
                    ReportFormat::Text
                }
            }
            other => other,
        }
    }
}

impl FromStr for ReportFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(ReportFormat::Auto),
            "json" => Ok(ReportFormat::Json),
            "text" | "txt" => Ok(ReportFormat::Text),
            other => Err(Error::Configuration(format!(
                "unknown report format '{}', expected auto, json or text",
                other
            ))),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportFormat::Auto => write!(f, "auto"),
            ReportFormat::Json => write!(f, "json"),
            ReportFormat::Text => write!(f, "text"),
        }
    }
}

/// Parser for the JSON and text report formats.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultReportParser {
    format: ReportFormat,
}

impl DefaultReportParser {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ReportFormat {
        self.format
    }
}

impl ReportParser for DefaultReportParser {
    fn parse(&self, raw: &RawReport) -> Result<StructuredReport> {
        let source = raw.source_id();
        let data = raw.data.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(&raw.data[..]);

        if data.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(Error::malformed(source, "report is empty"));
        }

        match self.format.detect(data) {
            ReportFormat::Json => parse_json(source, data),
            _ => parse_text(source, data),
        }
    }
}

fn parse_json(source: &str, data: &[u8]) -> Result<StructuredReport> {
    let mut report: StructuredReport = serde_json::from_slice(data)
        .map_err(|e| Error::malformed(source, format!("invalid JSON report: {}", e)))?;
    report.source = source.to_string();
    Ok(report)
}

fn parse_text(source: &str, data: &[u8]) -> Result<StructuredReport> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::malformed(source, format!("not valid UTF-8: {}", e)))?;

    let mut timestamp = None;
    let mut title = None;
    let mut metrics = BTreeMap::new();
    let mut attributes = BTreeMap::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some(sep) = line.find(|c: char| c == ':' || c == '=') else {
            return Err(Error::malformed(
                source,
                format!("line {}: expected 'key: value' or 'key = value'", line_no),
            ));
        };
        let key = line[..sep].trim();
        let value = line[sep + 1..].trim();
        if key.is_empty() {
            return Err(Error::malformed(
                source,
                format!("line {}: empty key", line_no),
            ));
        }
        let duplicate = || {
            Error::malformed(
                source,
                format!("line {}: duplicate key '{}'", line_no, key),
            )
        };

        if line.as_bytes()[sep] == b'=' {
            let number = value
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .ok_or_else(|| {
                    Error::malformed(
                        source,
                        format!(
                            "line {}: metric '{}' is not a finite number: '{}'",
                            line_no, key, value
                        ),
                    )
                })?;
            if metrics.insert(key.to_string(), number).is_some() {
                return Err(duplicate());
            }
            continue;
        }

        match key {
            "timestamp" => {
                if timestamp.is_some() {
                    return Err(duplicate());
                }
                let parsed = parse_timestamp(value).ok_or_else(|| {
                    Error::malformed(
                        source,
                        format!("line {}: invalid timestamp '{}'", line_no, value),
                    )
                })?;
                timestamp = Some(parsed);
            }
            "title" => {
                if title.is_some() {
                    return Err(duplicate());
                }
                title = Some(value.to_string());
            }
            _ => {
                if attributes.insert(key.to_string(), value.to_string()).is_some() {
                    return Err(duplicate());
                }
            }
        }
    }

    let timestamp = timestamp.ok_or_else(|| Error::malformed(source, "missing timestamp"))?;

    Ok(StructuredReport {
        source: source.to_string(),
        timestamp,
        title,
        metrics,
        attributes,
    })
}

/// RFC 3339, or `YYYY-MM-DD HH:MM:SS` taken as UTC.
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}
