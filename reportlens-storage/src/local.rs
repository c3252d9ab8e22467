//! Local filesystem storage implementation.
//!
//! This is the default backend: reports are regular files inside one
//! directory. The backend only reads; it never writes, renames or deletes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, instrument, warn};

use crate::error::{Result, StorageError};
use crate::handle::{normalize_extensions, system_time_to_utc, RawReport, ReportHandle};
use crate::traits::ReportStorage;

/// Configuration for the local filesystem backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// Directory holding the reports
    pub directory_path: PathBuf,
    /// Also consider files in subdirectories
    #[serde(default)]
    pub recursive: bool,
    /// Only consider files with one of these extensions (empty = all)
    #[serde(default)]
    pub extensions: Vec<String>,
}

impl LocalConfig {
    /// Create a configuration for a directory.
    pub fn new(directory_path: impl Into<PathBuf>) -> Self {
        Self {
            directory_path: directory_path.into(),
            recursive: false,
            extensions: Vec::new(),
        }
    }

    /// Enable or disable recursive listing.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Restrict candidates to the given extensions.
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }
}

/// Local filesystem storage backend.
///
/// Handle keys are paths relative to the base directory, `/`-separated.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    recursive: bool,
    extensions: Vec<String>,
}

impl LocalStorage {
    /// Open a local backend, validating the directory up front.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Config` if the directory does not exist, is not
    /// a directory, or cannot be listed.
    pub fn open(config: LocalConfig) -> Result<Self> {
        let base_path = config.directory_path;

        let metadata = match std::fs::metadata(&base_path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::Config(format!(
                    "report directory does not exist: {}",
                    base_path.display()
                )));
            }
            Err(e) => {
                return Err(StorageError::Config(format!(
                    "cannot access report directory {}: {}",
                    base_path.display(),
                    e
                )));
            }
        };

        if !metadata.is_dir() {
            return Err(StorageError::Config(format!(
                "report path is not a directory: {}",
                base_path.display()
            )));
        }

        if let Err(e) = std::fs::read_dir(&base_path) {
            return Err(StorageError::Config(format!(
                "report directory is not readable {}: {}",
                base_path.display(),
                e
            )));
        }

        let extensions = normalize_extensions(&config.extensions);

        debug!("Opened local report storage at {:?}", base_path);

        Ok(Self {
            base_path,
            recursive: config.recursive,
            extensions,
        })
    }

    /// Get the base path for this storage.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Resolve a handle key to a filesystem path inside the base directory.
    fn to_fs_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StorageError::InvalidPath(key.to_string()));
        }
        Ok(self.base_path.join(relative))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.base_path).ok()?;
        let parts: Option<Vec<&str>> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect();
        parts.map(|p| p.join("/"))
    }

    /// Collect candidate files in a directory, descending when recursive.
    #[async_recursion::async_recursion]
    async fn collect(&self, dir: &Path, results: &mut Vec<ReportHandle>) -> Result<()> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            // A subdirectory removed while the walk is in progress holds no reports.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && dir != self.base_path => {
                debug!("Skipping vanished directory {:?}", dir);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(t) => t,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Skipping vanished entry {:?}", path);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            // Symlinked directories are not followed, which rules out cycles.
            if file_type.is_dir() {
                if self.recursive {
                    self.collect(&path, results).await?;
                }
                continue;
            }

            let metadata = match fs::metadata(&path).await {
                Ok(m) => m,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Skipping vanished or dangling entry {:?}", path);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if !metadata.is_file() {
                continue;
            }

            let Some(key) = self.key_for(&path) else {
                warn!("Skipping report with non UTF-8 name: {:?}", path);
                continue;
            };

            let mut handle = ReportHandle::new(key).with_size(metadata.len());
            if !handle.has_extension_in(&self.extensions) {
                continue;
            }
            if let Ok(modified) = metadata.modified() {
                handle = handle.with_last_modified(system_time_to_utc(modified));
            }
            results.push(handle);
        }

        Ok(())
    }
}

#[async_trait]
impl ReportStorage for LocalStorage {
    #[instrument(skip(self), fields(dir = %self.base_path.display()))]
    async fn list_candidates(&self) -> Result<Vec<ReportHandle>> {
        let mut results = Vec::new();
        self.collect(&self.base_path, &mut results).await?;
        results.sort_by(|a, b| a.key.cmp(&b.key));

        debug!("Found {} candidate reports", results.len());
        Ok(results)
    }

    #[instrument(skip(self), fields(key = %handle.key))]
    async fn read(&self, handle: &ReportHandle) -> Result<RawReport> {
        let fs_path = self.to_fs_path(&handle.key)?;
        debug!("Reading report from {:?}", fs_path);

        match fs::read(&fs_path).await {
            Ok(data) => Ok(RawReport::new(handle.clone(), data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(handle.key.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }

    fn location(&self) -> String {
        self.base_path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn write_report(dir: &Path, name: &str, content: &str, age_secs: u64) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, content).unwrap();
        let file = std::fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(age_secs))
            .unwrap();
    }

    fn open(dir: &TempDir) -> LocalStorage {
        LocalStorage::open(LocalConfig::new(dir.path())).unwrap()
    }

    #[test]
    fn test_open_missing_directory() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope");

        let err = LocalStorage::open(LocalConfig::new(&missing)).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_open_file_instead_of_directory() {
        let temp = TempDir::new().unwrap();
        write_report(temp.path(), "report.txt", "x", 0);

        let err = LocalStorage::open(LocalConfig::new(temp.path().join("report.txt"))).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }

    #[tokio::test]
    async fn test_list_empty_directory() {
        let temp = TempDir::new().unwrap();
        let storage = open(&temp);

        let results = storage.list_candidates().await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_list_is_non_recursive_by_default() {
        let temp = TempDir::new().unwrap();
        write_report(temp.path(), "r1.txt", "a", 10);
        write_report(temp.path(), "archive/r0.txt", "b", 20);

        let storage = open(&temp);
        let results = storage.list_candidates().await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, "r1.txt");
        assert_eq!(results[0].size, 1);
        assert!(results[0].last_modified.is_some());
    }

    #[tokio::test]
    async fn test_list_recursive() {
        let temp = TempDir::new().unwrap();
        write_report(temp.path(), "r1.txt", "a", 10);
        write_report(temp.path(), "archive/2024/r0.txt", "b", 20);

        let config = LocalConfig::new(temp.path()).with_recursive(true);
        let storage = LocalStorage::open(config).unwrap();
        let keys: Vec<String> = storage
            .list_candidates()
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.key)
            .collect();

        assert_eq!(keys, vec!["archive/2024/r0.txt", "r1.txt"]);
    }

    #[tokio::test]
    async fn test_vanished_subdirectory_is_skipped() {
        let temp = TempDir::new().unwrap();
        write_report(temp.path(), "r1.txt", "a", 10);
        let config = LocalConfig::new(temp.path()).with_recursive(true);
        let storage = LocalStorage::open(config).unwrap();

        let mut results = Vec::new();
        storage
            .collect(&temp.path().join("removed-mid-walk"), &mut results)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_vanished_base_directory_still_fails() {
        let temp = TempDir::new().unwrap();
        let base = temp.path().join("reports");
        std::fs::create_dir(&base).unwrap();
        let storage = LocalStorage::open(LocalConfig::new(&base).with_recursive(true)).unwrap();
        std::fs::remove_dir(&base).unwrap();

        let err = storage.list_candidates().await.unwrap_err();
        assert!(matches!(err, StorageError::Io(_)));
    }

    #[tokio::test]
    async fn test_list_extension_filter() {
        let temp = TempDir::new().unwrap();
        write_report(temp.path(), "r1.json", "{}", 10);
        write_report(temp.path(), "r2.TXT", "x", 10);
        write_report(temp.path(), "notes.md", "x", 10);

        let config = LocalConfig::new(temp.path()).with_extensions([".json", "txt"]);
        let storage = LocalStorage::open(config).unwrap();
        let results = storage.list_candidates().await.unwrap();

        let keys: Vec<&str> = results.iter().map(|h| h.key.as_str()).collect();
        assert_eq!(keys, vec!["r1.json", "r2.TXT"]);
    }

    #[tokio::test]
    async fn test_read() {
        let temp = TempDir::new().unwrap();
        write_report(temp.path(), "r1.txt", "timestamp: 2024-05-01T00:00:00Z", 0);

        let storage = open(&temp);
        let handle = storage.list_candidates().await.unwrap().remove(0);
        let raw = storage.read(&handle).await.unwrap();

        assert_eq!(raw.handle, handle);
        assert_eq!(&raw.data[..], b"timestamp: 2024-05-01T00:00:00Z");
    }

    #[tokio::test]
    async fn test_read_after_delete_is_not_found() {
        let temp = TempDir::new().unwrap();
        write_report(temp.path(), "r1.txt", "x", 0);

        let storage = open(&temp);
        let handle = storage.list_candidates().await.unwrap().remove(0);
        std::fs::remove_file(temp.path().join("r1.txt")).unwrap();

        let err = storage.read(&handle).await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(ref k) if k == "r1.txt"));
    }

    #[tokio::test]
    async fn test_read_rejects_escaping_keys() {
        let temp = TempDir::new().unwrap();
        let storage = open(&temp);

        for key in ["../etc/passwd", "/etc/passwd", ""] {
            let err = storage.read(&ReportHandle::new(key)).await.unwrap_err();
            assert!(matches!(err, StorageError::InvalidPath(_)), "key {key:?}");
        }
    }

    #[tokio::test]
    async fn test_listing_does_not_modify_directory() {
        let temp = TempDir::new().unwrap();
        write_report(temp.path(), "r1.txt", "a", 10);
        write_report(temp.path(), "r2.txt", "b", 5);

        let storage = open(&temp);
        for handle in storage.list_candidates().await.unwrap() {
            storage.read(&handle).await.unwrap();
        }

        let mut names: Vec<String> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["r1.txt", "r2.txt"]);
    }

    #[test]
    fn test_backend_name_and_location() {
        let temp = TempDir::new().unwrap();
        let storage = open(&temp);
        assert_eq!(storage.backend_name(), "local");
        assert_eq!(storage.location(), temp.path().display().to_string());
        assert_eq!(storage.base_path(), temp.path());
    }
}
