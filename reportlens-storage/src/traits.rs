//! Core storage trait definitions.
//!
//! The `ReportStorage` trait is the seam between report discovery and the
//! storage technology holding the reports (local filesystem, S3, ...).

use async_trait::async_trait;
use std::cmp::Ordering;

use crate::error::Result;
use crate::handle::{RawReport, ReportHandle};

/// Read-only report storage backend.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` so a single backend can serve
/// concurrent lookups. Backends hold no mutable state of their own.
///
/// # Error Handling
///
/// `read` returns `StorageError::NotFound` when a previously listed handle no
/// longer resolves. Callers may re-list and retry.
#[async_trait]
pub trait ReportStorage: Send + Sync {
    /// List every report currently visible to this backend.
    ///
    /// An empty result is valid and means "no reports".
    async fn list_candidates(&self) -> Result<Vec<ReportHandle>>;

    /// Read the content behind a handle.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the handle no longer resolves.
    async fn read(&self, handle: &ReportHandle) -> Result<RawReport>;

    /// Recency ordering between two handles of this backend.
    ///
    /// Must be a total order. Backends with their own notion of "newer"
    /// (version counters, sequence numbers) override this.
    fn compare_recency(&self, a: &ReportHandle, b: &ReportHandle) -> Ordering {
        a.cmp_recency(b)
    }

    /// Get a human-readable name for this storage backend.
    fn backend_name(&self) -> &'static str;

    /// Where this backend reads from, for diagnostics.
    fn location(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StorageError;
    use chrono::{TimeZone, Utc};

    struct Fixed(Vec<ReportHandle>);

    #[async_trait]
    impl ReportStorage for Fixed {
        async fn list_candidates(&self) -> Result<Vec<ReportHandle>> {
            Ok(self.0.clone())
        }

        async fn read(&self, handle: &ReportHandle) -> Result<RawReport> {
            Err(StorageError::NotFound(handle.key.clone()))
        }

        fn backend_name(&self) -> &'static str {
            "fixed"
        }

        fn location(&self) -> String {
            "memory".to_string()
        }
    }

    #[test]
    fn test_default_compare_recency_delegates_to_handle() {
        let storage = Fixed(Vec::new());
        let a = ReportHandle::new("a").with_last_modified(Utc.timestamp_opt(1, 0).unwrap());
        let b = ReportHandle::new("b").with_last_modified(Utc.timestamp_opt(2, 0).unwrap());

        assert_eq!(storage.compare_recency(&a, &b), Ordering::Less);
        assert_eq!(storage.compare_recency(&b, &a), Ordering::Greater);
        assert_eq!(storage.compare_recency(&a, &a), Ordering::Equal);
    }

    #[tokio::test]
    async fn test_trait_object_usage() {
        let storage: Box<dyn ReportStorage> = Box::new(Fixed(vec![ReportHandle::new("x")]));
        let listed = storage.list_candidates().await.unwrap();
        assert_eq!(listed.len(), 1);

        let err = storage.read(&listed[0]).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(storage.backend_name(), "fixed");
    }
}
