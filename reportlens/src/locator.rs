//! Latest-report resolution.
//!
//! "Latest" is whatever the backend's [`ReportStorage::compare_recency`]
//! ranks highest. Because that ordering is total, repeated lookups against
//! an unchanged backend always resolve to the same handle.

use reportlens_storage::{RawReport, ReportHandle, ReportStorage};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Pick the most recent of `candidates` using the backend's ordering.
pub fn select_latest(
    storage: &dyn ReportStorage,
    candidates: Vec<ReportHandle>,
) -> Option<ReportHandle> {
    candidates
        .into_iter()
        .max_by(|a, b| storage.compare_recency(a, b))
}

/// Find the latest report handle.
///
/// # Errors
///
/// `Error::NoReportsFound` when the backend lists nothing.
pub async fn find_latest(storage: &dyn ReportStorage) -> Result<ReportHandle> {
    let candidates = storage.list_candidates().await?;
    debug!(
        backend = storage.backend_name(),
        candidates = candidates.len(),
        "Listed report candidates"
    );

    select_latest(storage, candidates).ok_or_else(|| Error::NoReportsFound {
        location: storage.location(),
    })
}

/// Find and read the latest report.
///
/// If the chosen report disappears between listing and reading, the backend
/// is listed once more and the new latest report is read. A second
/// disappearance is returned as `Error::NotFound`.
pub async fn fetch_latest(storage: &dyn ReportStorage) -> Result<RawReport> {
    let handle = find_latest(storage).await?;

    match storage.read(&handle).await {
        Ok(raw) => Ok(raw),
        Err(e) if e.is_not_found() => {
            warn!(
                key = %handle.key,
                "Latest report vanished before it could be read, re-listing"
            );
            let handle = find_latest(storage).await?;
            Ok(storage.read(&handle).await?)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use reportlens_storage::{Bytes, StorageError};
    use std::cmp::Ordering;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    /// In-memory backend that can lose reports after a number of listings.
    #[derive(Default)]
    struct ScriptedStorage {
        reports: Mutex<Vec<(ReportHandle, &'static str)>>,
        /// Keys removed right after each successive listing
        vanish_after_list: Mutex<Vec<Vec<&'static str>>>,
        lists: AtomicUsize,
        reads: AtomicUsize,
    }

    impl ScriptedStorage {
        fn with(reports: &[(&'static str, i64, &'static str)]) -> Self {
            let reports = reports
                .iter()
                .map(|(key, secs, body)| {
                    let handle = ReportHandle::new(*key)
                        .with_last_modified(Utc.timestamp_opt(*secs, 0).unwrap());
                    (handle, *body)
                })
                .collect();
            Self {
                reports: Mutex::new(reports),
                ..Default::default()
            }
        }

        fn vanish(self, rounds: Vec<Vec<&'static str>>) -> Self {
            *self.vanish_after_list.lock().unwrap() = rounds;
            self
        }
    }

    #[async_trait]
    impl ReportStorage for ScriptedStorage {
        async fn list_candidates(&self) -> reportlens_storage::Result<Vec<ReportHandle>> {
            self.lists.fetch_add(1, AtomicOrdering::SeqCst);
            let listed: Vec<ReportHandle> = self
                .reports
                .lock()
                .unwrap()
                .iter()
                .map(|(h, _)| h.clone())
                .collect();

            let mut rounds = self.vanish_after_list.lock().unwrap();
            if !rounds.is_empty() {
                let gone = rounds.remove(0);
                self.reports
                    .lock()
                    .unwrap()
                    .retain(|(h, _)| !gone.iter().any(|k| *k == h.key));
            }
            Ok(listed)
        }

        async fn read(&self, handle: &ReportHandle) -> reportlens_storage::Result<RawReport> {
            self.reads.fetch_add(1, AtomicOrdering::SeqCst);
            self.reports
                .lock()
                .unwrap()
                .iter()
                .find(|(h, _)| h.key == handle.key)
                .map(|(h, body)| RawReport::new(h.clone(), Bytes::from_static(body.as_bytes())))
                .ok_or_else(|| StorageError::NotFound(handle.key.clone()))
        }

        fn backend_name(&self) -> &'static str {
            "scripted"
        }

        fn location(&self) -> String {
            "memory://scripted".to_string()
        }
    }

    #[tokio::test]
    async fn test_find_latest_picks_newest() {
        let storage = ScriptedStorage::with(&[
            ("r1.txt", 100, "a"),
            ("r3.txt", 50, "c"),
            ("r2.txt", 200, "b"),
        ]);
        let handle = find_latest(&storage).await.unwrap();
        assert_eq!(handle.key, "r2.txt");
    }

    #[tokio::test]
    async fn test_find_latest_is_idempotent_under_ties() {
        let storage = ScriptedStorage::with(&[
            ("b.txt", 100, ""),
            ("c.txt", 100, ""),
            ("a.txt", 100, ""),
        ]);
        for _ in 0..5 {
            assert_eq!(find_latest(&storage).await.unwrap().key, "c.txt");
        }
    }

    #[tokio::test]
    async fn test_empty_backend_reports_no_reports_and_does_not_read() {
        let storage = ScriptedStorage::with(&[]);
        let err = fetch_latest(&storage).await.unwrap_err();

        assert!(
            matches!(err, Error::NoReportsFound { ref location } if location == "memory://scripted")
        );
        assert_eq!(storage.reads.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_vanished_report_retries_against_fresh_listing() {
        let storage = ScriptedStorage::with(&[("r1.txt", 100, "old"), ("r2.txt", 200, "new")])
            .vanish(vec![vec!["r2.txt"]]);

        let raw = fetch_latest(&storage).await.unwrap();
        assert_eq!(raw.handle.key, "r1.txt");
        assert_eq!(raw.data, Bytes::from_static(b"old"));
        assert_eq!(storage.lists.load(AtomicOrdering::SeqCst), 2);
        assert_eq!(storage.reads.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_second_vanish_surfaces_not_found() {
        let storage = ScriptedStorage::with(&[("r1.txt", 100, "old"), ("r2.txt", 200, "new")])
            .vanish(vec![vec!["r2.txt"], vec!["r1.txt"]]);

        let err = fetch_latest(&storage).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(ref k) if k == "r1.txt"));
        assert_eq!(storage.lists.load(AtomicOrdering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_everything_vanished_surfaces_no_reports() {
        let storage =
            ScriptedStorage::with(&[("r1.txt", 100, "only")]).vanish(vec![vec!["r1.txt"]]);

        let err = fetch_latest(&storage).await.unwrap_err();
        assert!(matches!(err, Error::NoReportsFound { .. }));
    }

    /// Backend ordering by a numeric version instead of timestamps.
    struct Versioned(Vec<ReportHandle>);

    #[async_trait]
    impl ReportStorage for Versioned {
        async fn list_candidates(&self) -> reportlens_storage::Result<Vec<ReportHandle>> {
            Ok(self.0.clone())
        }

        async fn read(&self, handle: &ReportHandle) -> reportlens_storage::Result<RawReport> {
            Ok(RawReport::new(handle.clone(), Bytes::new()))
        }

        fn compare_recency(&self, a: &ReportHandle, b: &ReportHandle) -> Ordering {
            let version =
                |h: &ReportHandle| h.version.as_deref().and_then(|v| v.parse::<u64>().ok());
            version(a).cmp(&version(b)).then_with(|| a.key.cmp(&b.key))
        }

        fn backend_name(&self) -> &'static str {
            "versioned"
        }

        fn location(&self) -> String {
            "versioned".to_string()
        }
    }

    #[tokio::test]
    async fn test_backend_supplied_ordering() {
        let now = Utc.timestamp_opt(1_000, 0).unwrap();
        let storage = Versioned(vec![
            ReportHandle::new("v9").with_version("9").with_last_modified(now),
            ReportHandle::new("v10").with_version("10"),
            ReportHandle::new("v2").with_version("2").with_last_modified(now),
        ]);

        assert_eq!(find_latest(&storage).await.unwrap().key, "v10");
    }
}
