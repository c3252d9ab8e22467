//! Transparent decompression of stored reports.
//!
//! Wraps any `ReportStorage` and decompresses reports whose key carries a
//! compression extension. Everything else passes through untouched.
//!
//! | Extension | Algorithm | Feature |
//! |-----------|-----------|---------|
//! | `.zst` | Zstd | `compression-zstd` |
//! | `.lz4` | LZ4 frame | `compression-lz4` |
//!
//! ```ignore
//! use reportlens_storage::{DecompressingStorage, LocalConfig, LocalStorage};
//! use std::sync::Arc;
//!
//! let inner = Arc::new(LocalStorage::open(LocalConfig::new("./reports"))?);
//! let storage = DecompressingStorage::new(inner);
//! ```

use async_trait::async_trait;
use bytes::Bytes;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::handle::{RawReport, ReportHandle};
use crate::traits::ReportStorage;

/// Compression algorithm, selected by key extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    /// LZ4 frame format
    Lz4,
    /// Zstandard
    Zstd,
}

impl CompressionAlgorithm {
    /// Detect the algorithm from a handle's extension.
    pub fn detect(handle: &ReportHandle) -> Option<Self> {
        match handle.extension()?.as_str() {
            "lz4" => Some(Self::Lz4),
            "zst" | "zstd" => Some(Self::Zstd),
            _ => None,
        }
    }

    /// Whether support for this algorithm is compiled in.
    pub fn is_available(self) -> bool {
        match self {
            Self::Lz4 => cfg!(feature = "compression-lz4"),
            Self::Zstd => cfg!(feature = "compression-zstd"),
        }
    }

    /// Algorithms compiled into this build.
    pub fn available() -> Vec<Self> {
        [Self::Lz4, Self::Zstd]
            .into_iter()
            .filter(|a| a.is_available())
            .collect()
    }
}

/// Storage wrapper that decompresses compressed reports on read.
pub struct DecompressingStorage {
    inner: Arc<dyn ReportStorage>,
}

impl DecompressingStorage {
    /// Wrap a backend.
    pub fn new(inner: Arc<dyn ReportStorage>) -> Self {
        Self { inner }
    }

    fn decompress(&self, algorithm: CompressionAlgorithm, key: &str, data: &[u8]) -> Result<Bytes> {
        match algorithm {
            CompressionAlgorithm::Lz4 => decompress_lz4(data),
            CompressionAlgorithm::Zstd => decompress_zstd(data),
        }
        .map_err(|e| StorageError::Compression(format!("{}: {}", key, e)))
    }
}

#[cfg(feature = "compression-lz4")]
fn decompress_lz4(data: &[u8]) -> std::result::Result<Bytes, String> {
    use std::io::Read;

    let mut decoder = lz4_flex::frame::FrameDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| format!("LZ4 decompression failed: {}", e))?;
    Ok(Bytes::from(out))
}

#[cfg(not(feature = "compression-lz4"))]
fn decompress_lz4(_data: &[u8]) -> std::result::Result<Bytes, String> {
    Err("LZ4 decompression requires 'compression-lz4' feature".to_string())
}

#[cfg(feature = "compression-zstd")]
fn decompress_zstd(data: &[u8]) -> std::result::Result<Bytes, String> {
    zstd::decode_all(data)
        .map(Bytes::from)
        .map_err(|e| format!("Zstd decompression failed: {}", e))
}

#[cfg(not(feature = "compression-zstd"))]
fn decompress_zstd(_data: &[u8]) -> std::result::Result<Bytes, String> {
    Err("Zstd decompression requires 'compression-zstd' feature".to_string())
}

impl std::fmt::Debug for DecompressingStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecompressingStorage")
            .field("inner", &self.inner.backend_name())
            .field("available", &CompressionAlgorithm::available())
            .finish()
    }
}

#[async_trait]
impl ReportStorage for DecompressingStorage {
    async fn list_candidates(&self) -> Result<Vec<ReportHandle>> {
        self.inner.list_candidates().await
    }

    #[instrument(skip(self), fields(key = %handle.key))]
    async fn read(&self, handle: &ReportHandle) -> Result<RawReport> {
        let mut raw = self.inner.read(handle).await?;

        if let Some(algorithm) = CompressionAlgorithm::detect(handle) {
            let decompressed = self.decompress(algorithm, &handle.key, &raw.data)?;
            debug!(
                "Decompressed {} bytes -> {} bytes ({:?})",
                raw.data.len(),
                decompressed.len(),
                algorithm
            );
            raw.data = decompressed;
        }

        Ok(raw)
    }

    fn compare_recency(&self, a: &ReportHandle, b: &ReportHandle) -> Ordering {
        self.inner.compare_recency(a, b)
    }

    fn backend_name(&self) -> &'static str {
        self.inner.backend_name()
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}
