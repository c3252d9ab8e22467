//! Report handles and the default recency ordering.
//!
//! A [`ReportHandle`] identifies one stored report inside a backend. Handles
//! are produced by listing and are only ever used to fetch content or to
//! compare recency.
//!
//! ```
//! use reportlens_storage::ReportHandle;
//! use chrono::{TimeZone, Utc};
//!
//! let older = ReportHandle::new("r1.txt")
//!     .with_last_modified(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap());
//! let newer = ReportHandle::new("r2.txt")
//!     .with_last_modified(Utc.with_ymd_and_hms(2024, 5, 2, 8, 0, 0).unwrap());
//!
//! assert!(newer.cmp_recency(&older).is_gt());
//! ```

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::SystemTime;

/// Opaque reference to a discovered report.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportHandle {
    /// Backend-relative identifier (relative path or object key)
    pub key: String,
    /// Size in bytes at listing time
    pub size: u64,
    /// Last modification time, if the backend reports one
    pub last_modified: Option<DateTime<Utc>>,
    /// ETag or version identifier if available
    pub version: Option<String>,
}

impl ReportHandle {
    /// Create a handle with only a key.
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            size: 0,
            last_modified: None,
            version: None,
        }
    }

    /// Set the size in bytes.
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Set the last modification time.
    pub fn with_last_modified(mut self, last_modified: DateTime<Utc>) -> Self {
        self.last_modified = Some(last_modified);
        self
    }

    /// Set the version identifier.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Final path component of the key.
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Lowercased extension of the key, without the dot.
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(name[idx + 1..].to_ascii_lowercase()),
        }
    }

    /// Whether the key's extension is in `extensions` (already normalized).
    ///
    /// An empty list accepts every key.
    pub fn has_extension_in(&self, extensions: &[String]) -> bool {
        extensions.is_empty()
            || self
                .extension()
                .is_some_and(|ext| extensions.iter().any(|e| *e == ext))
    }

    /// Default recency ordering.
    ///
    /// Newer `last_modified` wins; a handle without a timestamp is older than
    /// any handle with one. Equal timestamps fall back to the lexicographically
    /// greater key, so the order is total.
    ///
    /// The tie-break compares the whole key, not just the file name. Keys are
    /// unique within a backend while file names are not once listings
    /// recurse, so `b/r1.txt` ranks above `a/r9.txt` at the same timestamp.
    pub fn cmp_recency(&self, other: &Self) -> Ordering {
        self.last_modified
            .cmp(&other.last_modified)
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl fmt::Display for ReportHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Lowercase extensions and strip leading dots, dropping empty entries.
pub(crate) fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    extensions
        .iter()
        .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

/// Convert a filesystem timestamp to UTC.
pub(crate) fn system_time_to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

/// Raw bytes of a report together with the handle they were read from.
#[derive(Debug, Clone)]
pub struct RawReport {
    /// Handle the content was read for
    pub handle: ReportHandle,
    /// Report content
    pub data: Bytes,
}

impl RawReport {
    /// Create a raw report.
    pub fn new(handle: ReportHandle, data: impl Into<Bytes>) -> Self {
        Self {
            handle,
            data: data.into(),
        }
    }

    /// Identifier used in diagnostics.
    pub fn source_id(&self) -> &str {
        &self.handle.key
    }
}
