//! Backend selection and per-backend configuration records.
//!
//! Callers hand over a storage type tag plus a flat string mapping of
//! options. Both are validated here, once, before any backend exists:
//! unknown tags and missing or malformed keys fail immediately.
//!
//! | Tag | Required keys | Optional keys |
//! |-----|---------------|---------------|
//! | `local` | `directory_path` | `recursive`, `extensions` |
//! | `s3` (feature `s3`) | `bucket` | `region`, `prefix`, `endpoint`, `force_path_style`, `allow_http`, `access_key_id`, `secret_access_key`, `recursive`, `extensions` |
//!
//! Every backend also accepts `decompress` to read `.zst`/`.lz4` reports.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

use crate::compressed::CompressionAlgorithm;
use crate::error::{Result, StorageError};
use crate::local::LocalConfig;

#[cfg(feature = "s3")]
use crate::s3::S3Config;

/// Flat backend options, as read from a config file or the command line.
pub type StorageOptions = BTreeMap<String, String>;

/// Storage backends compiled into this build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// Local filesystem directory
    Local,
    /// S3-compatible object storage
    #[cfg(feature = "s3")]
    S3,
}

impl StorageType {
    /// All registered storage types.
    pub fn registered() -> &'static [StorageType] {
        &[
            StorageType::Local,
            #[cfg(feature = "s3")]
            StorageType::S3,
        ]
    }

    /// Tag used in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageType::Local => "local",
            #[cfg(feature = "s3")]
            StorageType::S3 => "s3",
        }
    }
}

impl FromStr for StorageType {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_ascii_lowercase();
        Self::registered()
            .iter()
            .copied()
            .find(|t| t.as_str() == tag)
            .ok_or_else(|| StorageError::UnsupportedBackend(s.trim().to_string()))
    }
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated storage configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// Local filesystem storage
    Local(LocalConfig),
    /// S3-compatible object storage
    #[cfg(feature = "s3")]
    S3(S3Config),
    /// Decompress `.zst`/`.lz4` reports read from the inner backend
    Decompressed {
        /// Inner storage configuration
        inner: Box<StorageConfig>,
    },
}

impl StorageConfig {
    /// Local storage for a directory with default options.
    pub fn local(directory_path: impl Into<PathBuf>) -> Self {
        StorageConfig::Local(LocalConfig::new(directory_path))
    }

    /// Build and validate a configuration from a tag and flat options.
    ///
    /// # Errors
    ///
    /// `StorageError::UnsupportedBackend` for unknown tags,
    /// `StorageError::Config` for missing or malformed options.
    pub fn from_options(storage_type: &str, options: &StorageOptions) -> Result<Self> {
        let storage_type: StorageType = storage_type.parse()?;
        let mut reader = OptionReader::new(options);

        let config = match storage_type {
            StorageType::Local => {
                let directory_path = reader.required("directory_path")?;
                StorageConfig::Local(LocalConfig {
                    directory_path: PathBuf::from(directory_path),
                    recursive: reader.flag("recursive", false)?,
                    extensions: reader.list("extensions"),
                })
            }
            #[cfg(feature = "s3")]
            StorageType::S3 => {
                let mut config = S3Config::aws(
                    reader.required("bucket")?,
                    reader
                        .optional("region")
                        .unwrap_or_else(|| "us-east-1".to_string()),
                );
                config.prefix = reader.optional("prefix");
                config.endpoint = reader.optional("endpoint");
                config.force_path_style = reader.flag("force_path_style", false)?;
                config.allow_http = reader.flag("allow_http", false)?;
                config.access_key_id = reader.optional("access_key_id");
                config.secret_access_key = reader.optional("secret_access_key");
                config.recursive = reader.flag("recursive", false)?;
                config.extensions = reader.list("extensions");

                if config.access_key_id.is_some() != config.secret_access_key.is_some() {
                    return Err(StorageError::Config(
                        "access_key_id and secret_access_key must be set together".to_string(),
                    ));
                }
                StorageConfig::S3(config)
            }
        };

        let config = if reader.flag("decompress", false)? {
            config.decompressed()?
        } else {
            config
        };

        reader.warn_unused(storage_type);
        Ok(config)
    }

    /// Wrap this configuration so compressed reports are decompressed.
    ///
    /// # Errors
    ///
    /// `StorageError::Config` when no compression codec is compiled in.
    pub fn decompressed(self) -> Result<Self> {
        if CompressionAlgorithm::available().is_empty() {
            return Err(StorageError::Config(
                "decompress requires the 'compression-zstd' or 'compression-lz4' feature"
                    .to_string(),
            ));
        }
        Ok(StorageConfig::Decompressed {
            inner: Box::new(self),
        })
    }

    /// The backend this configuration ultimately reads from.
    pub fn storage_type(&self) -> StorageType {
        match self {
            StorageConfig::Local(_) => StorageType::Local,
            #[cfg(feature = "s3")]
            StorageConfig::S3(_) => StorageType::S3,
            StorageConfig::Decompressed { inner } => inner.storage_type(),
        }
    }
}

/// Tracks which options were consumed so leftovers can be reported.
struct OptionReader<'a> {
    options: &'a StorageOptions,
    used: BTreeSet<&'static str>,
}

impl<'a> OptionReader<'a> {
    fn new(options: &'a StorageOptions) -> Self {
        Self {
            options,
            used: BTreeSet::new(),
        }
    }

    fn optional(&mut self, key: &'static str) -> Option<String> {
        self.used.insert(key);
        self.options
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&mut self, key: &'static str) -> Result<String> {
        self.optional(key)
            .ok_or_else(|| StorageError::Config(format!("missing required option '{}'", key)))
    }

    fn flag(&mut self, key: &'static str, default: bool) -> Result<bool> {
        match self.optional(key) {
            None => Ok(default),
            Some(value) => parse_bool(&value).ok_or_else(|| {
                StorageError::Config(format!(
                    "option '{}' must be a boolean, got '{}'",
                    key, value
                ))
            }),
        }
    }

    fn list(&mut self, key: &'static str) -> Vec<String> {
        self.optional(key)
            .map(|v| {
                v.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    fn warn_unused(&self, storage_type: StorageType) {
        for key in self.options.keys() {
            if !self.used.contains(key.as_str()) {
                warn!("Ignoring unknown option '{}' for {} storage", key, storage_type);
            }
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
