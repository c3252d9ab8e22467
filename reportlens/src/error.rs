use reportlens_storage::StorageError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported storage backend: {0}")]
    UnsupportedBackend(String),

    #[error("No reports found in {location}")]
    NoReportsFound { location: String },

    #[error("Report not found: {0}")]
    NotFound(String),

    #[error("Malformed report {source_id}: {reason}")]
    MalformedReport { source_id: String, reason: String },

    #[error("Storage error: {0}")]
    Storage(#[source] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn malformed(source_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedReport {
            source_id: source_id.into(),
            reason: reason.into(),
        }
    }

    /// True for failures raised while building an analyzer rather than using one.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::Configuration(_) | Error::UnsupportedBackend(_) | Error::Toml(_)
        )
    }
}

impl From<StorageError> for Error {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Config(msg) => Error::Configuration(msg),
            StorageError::UnsupportedBackend(tag) => Error::UnsupportedBackend(tag),
            StorageError::NotFound(key) => Error::NotFound(key),
            other => Error::Storage(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_storage_error_classification() {
        let err: Error = StorageError::Config("missing directory_path".into()).into();
        assert!(matches!(err, Error::Configuration(_)));
        assert!(err.is_configuration());

        let err: Error = StorageError::UnsupportedBackend("s3".into()).into();
        assert!(matches!(err, Error::UnsupportedBackend(ref t) if t == "s3"));

        let err: Error = StorageError::NotFound("r1.txt".into()).into();
        assert!(matches!(err, Error::NotFound(ref k) if k == "r1.txt"));
    }

    #[test]
    fn test_io_failure_wrapped_with_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = StorageError::Io(io).into();

        assert!(matches!(err, Error::Storage(StorageError::Io(_))));
        assert!(!err.is_configuration());
        let source = err.source().expect("cause retained");
        assert!(source.to_string().contains("denied"));
    }

    #[test]
    fn test_malformed_display() {
        let err = Error::malformed("r2.txt", "line 3: missing separator");
        assert_eq!(
            err.to_string(),
            "Malformed report r2.txt: line 3: missing separator"
        );
    }
}
