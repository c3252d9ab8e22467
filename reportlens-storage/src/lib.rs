//! Pluggable report storage for reportlens.
//!
//! This crate provides the `ReportStorage` trait that report discovery runs
//! against, plus the backends that implement it. A backend only has to
//! enumerate the reports it can see and read one of them back; deciding which
//! report is "the latest" happens one layer up, using the backend's recency
//! ordering.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │            ┌─────────────────┐                  │
//! │            │  ReportStorage  │  ← Unified trait │
//! │            └────────┬────────┘                  │
//! │                     │                           │
//! │        ┌────────────┼────────────┐              │
//! │        ▼            ▼            ▼              │
//! │  ┌──────────┐ ┌──────────┐ ┌───────────────┐   │
//! │  │  Local   │ │   S3     │ │ Decompressing │   │
//! │  └──────────┘ └──────────┘ └───────────────┘   │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```no_run
//! use reportlens_storage::{create_storage, StorageConfig, StorageOptions};
//!
//! # async fn example() -> reportlens_storage::Result<()> {
//! let mut options = StorageOptions::new();
//! options.insert("directory_path".into(), "/var/reports".into());
//!
//! let config = StorageConfig::from_options("local", &options)?;
//! let storage = create_storage(&config)?;
//!
//! let latest = storage
//!     .list_candidates()
//!     .await?
//!     .into_iter()
//!     .max_by(|a, b| storage.compare_recency(a, b));
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `s3` - Enable S3/object storage backend (requires `object_store`)
//! - `compression-zstd`, `compression-lz4` - Decompress `.zst`/`.lz4` reports
//! - `full` - Enable all features

mod compressed;
mod config;
mod error;
mod handle;
mod local;
mod traits;

#[cfg(feature = "s3")]
mod s3;

pub use compressed::{CompressionAlgorithm, DecompressingStorage};
pub use config::{StorageConfig, StorageOptions, StorageType};
pub use error::{Result, StorageError};
pub use handle::{RawReport, ReportHandle};
pub use local::{LocalConfig, LocalStorage};
pub use traits::ReportStorage;

#[cfg(feature = "s3")]
pub use s3::{S3Config, S3Storage};

// Re-export bytes for convenience
pub use bytes::Bytes;

use std::sync::Arc;

/// Create a storage backend from configuration.
///
/// This is the single place where a configuration variant is turned into a
/// concrete backend. Local backends validate their directory here.
pub fn create_storage(config: &StorageConfig) -> Result<Arc<dyn ReportStorage>> {
    match config {
        StorageConfig::Local(local) => Ok(Arc::new(LocalStorage::open(local.clone())?)),
        #[cfg(feature = "s3")]
        StorageConfig::S3(s3_config) => Ok(Arc::new(S3Storage::new(s3_config.clone())?)),
        StorageConfig::Decompressed { inner } => {
            let inner_storage = create_storage(inner)?;
            Ok(Arc::new(DecompressingStorage::new(inner_storage)))
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::local("./reports")
    }
}
