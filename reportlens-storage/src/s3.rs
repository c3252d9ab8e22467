//! S3-compatible object storage backend.
//!
//! Uses the `object_store` crate for S3, MinIO, and other S3-compatible services.
//!
//! # Configuration
//!
//! ```toml
//! [storage]
//! backend = "s3"
//! bucket = "nightly-reports"
//! region = "us-east-1"
//! prefix = "builds/"
//!
//! # Optional: For MinIO or other S3-compatible services
//! endpoint = "http://localhost:9000"
//! force_path_style = true
//! ```

use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::error::{Result, StorageError};
use crate::handle::{normalize_extensions, RawReport, ReportHandle};
use crate::traits::ReportStorage;

/// Configuration for S3 storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct S3Config {
    /// S3 bucket name
    pub bucket: String,
    /// AWS region
    pub region: String,
    /// Optional prefix the reports live under
    pub prefix: Option<String>,
    /// Optional custom endpoint (for MinIO, etc.)
    pub endpoint: Option<String>,
    /// Use path-style requests (required for MinIO)
    pub force_path_style: bool,
    /// Optional access key (if not using IAM/env credentials)
    pub access_key_id: Option<String>,
    /// Optional secret key
    pub secret_access_key: Option<String>,
    /// Allow HTTP (non-HTTPS) connections
    pub allow_http: bool,
    /// Also consider objects below nested prefixes
    pub recursive: bool,
    /// Only consider keys with one of these extensions (empty = all)
    pub extensions: Vec<String>,
}

impl S3Config {
    /// Create a new S3 configuration for AWS.
    pub fn aws(bucket: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            region: region.into(),
            prefix: None,
            endpoint: None,
            force_path_style: false,
            access_key_id: None,
            secret_access_key: None,
            allow_http: false,
            recursive: false,
            extensions: Vec::new(),
        }
    }

    /// Create configuration for MinIO or other S3-compatible services.
    pub fn minio(bucket: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            force_path_style: true,
            allow_http: true,
            ..Self::aws(bucket, "us-east-1")
        }
    }

    /// Set the prefix reports live under.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Set explicit credentials.
    pub fn with_credentials(
        mut self,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        self.access_key_id = Some(access_key_id.into());
        self.secret_access_key = Some(secret_access_key.into());
        self
    }
}

/// S3-compatible object storage backend.
#[derive(Clone)]
pub struct S3Storage {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    prefix: String,
    recursive: bool,
    extensions: Vec<String>,
}

impl S3Storage {
    /// Create a new S3 storage backend from configuration.
    ///
    /// No request is made here; credentials and bucket access are checked
    /// by the first listing.
    pub fn new(config: S3Config) -> Result<Self> {
        if config.bucket.trim().is_empty() {
            return Err(StorageError::Config("s3 bucket must not be empty".into()));
        }

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&config.bucket)
            .with_region(&config.region)
            .with_allow_http(config.allow_http);

        if let Some(endpoint) = &config.endpoint {
            builder = builder.with_endpoint(endpoint);
        }

        if config.force_path_style {
            builder = builder.with_virtual_hosted_style_request(false);
        }

        if let (Some(key_id), Some(secret)) = (&config.access_key_id, &config.secret_access_key) {
            builder = builder
                .with_access_key_id(key_id)
                .with_secret_access_key(secret);
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(e.to_string()))?;

        Ok(Self {
            store: Arc::new(store),
            bucket: config.bucket,
            prefix: normalize_prefix(config.prefix.as_deref().unwrap_or_default()),
            recursive: config.recursive,
            extensions: normalize_extensions(&config.extensions),
        })
    }

    /// Create from an existing ObjectStore instance.
    pub fn from_store(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            bucket: "store".to_string(),
            prefix: normalize_prefix(&prefix.into()),
            recursive: false,
            extensions: Vec::new(),
        }
    }

    /// Enable or disable listing below nested prefixes.
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    /// Convert a handle key to an object_store Path.
    fn to_object_path(&self, key: &str) -> ObjectPath {
        if self.prefix.is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{}", self.prefix, key))
        }
    }

    /// Convert an object location back to a handle key.
    fn key_for(&self, location: &ObjectPath) -> Option<String> {
        let path_str = location.as_ref();
        let relative = if self.prefix.is_empty() {
            path_str
        } else {
            path_str.strip_prefix(&self.prefix)?.strip_prefix('/')?
        };
        (!relative.is_empty()).then(|| relative.to_string())
    }

    fn to_handle(&self, meta: &ObjectMeta) -> Option<ReportHandle> {
        let key = self.key_for(&meta.location)?;
        let mut handle = ReportHandle::new(key)
            .with_size(meta.size as u64)
            .with_last_modified(meta.last_modified);
        if let Some(etag) = meta.e_tag.as_ref().or(meta.version.as_ref()) {
            handle = handle.with_version(etag.clone());
        }
        handle
            .has_extension_in(&self.extensions)
            .then_some(handle)
    }
}

fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_matches('/').to_string()
}

impl std::fmt::Debug for S3Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Storage")
            .field("bucket", &self.bucket)
            .field("prefix", &self.prefix)
            .field("recursive", &self.recursive)
            .finish()
    }
}

#[async_trait]
impl ReportStorage for S3Storage {
    #[instrument(skip(self), fields(bucket = %self.bucket, prefix = %self.prefix))]
    async fn list_candidates(&self) -> Result<Vec<ReportHandle>> {
        use futures::TryStreamExt;

        let obj_prefix = (!self.prefix.is_empty()).then(|| ObjectPath::from(self.prefix.as_str()));
        debug!("Listing s3://{}/{}", self.bucket, self.prefix);

        let objects: Vec<ObjectMeta> = if self.recursive {
            self.store
                .list(obj_prefix.as_ref())
                .try_collect()
                .await
                .map_err(StorageError::from)?
        } else {
            self.store
                .list_with_delimiter(obj_prefix.as_ref())
                .await
                .map_err(StorageError::from)?
                .objects
        };

        let mut results: Vec<ReportHandle> =
            objects.iter().filter_map(|meta| self.to_handle(meta)).collect();
        results.sort_by(|a, b| a.key.cmp(&b.key));

        debug!("Found {} candidate reports", results.len());
        Ok(results)
    }

    #[instrument(skip(self), fields(key = %handle.key))]
    async fn read(&self, handle: &ReportHandle) -> Result<RawReport> {
        let obj_path = self.to_object_path(&handle.key);
        debug!("Reading from s3://{}/{}", self.bucket, obj_path);

        match self.store.get(&obj_path).await {
            Ok(result) => {
                let bytes = result.bytes().await.map_err(StorageError::from)?;
                Ok(RawReport::new(handle.clone(), bytes))
            }
            Err(object_store::Error::NotFound { .. }) => {
                Err(StorageError::NotFound(handle.key.clone()))
            }
            Err(e) => Err(StorageError::from(e)),
        }
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    fn location(&self) -> String {
        if self.prefix.is_empty() {
            format!("s3://{}", self.bucket)
        } else {
            format!("s3://{}/{}", self.bucket, self.prefix)
        }
    }
}
