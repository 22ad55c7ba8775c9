//! Metadata store error types

use thiserror::Error;
use zkmeta_common::{ConfigError, EncodingError};
use zkmeta_coord::CoordinationError;

/// Result type for metadata store operations
pub type MetadataStoreResult<T> = Result<T, MetadataStoreError>;

/// Errors surfaced by metadata stores
///
/// Expected races (node exists, no node, bad version) never show up here;
/// operations turn them into ordinary return values.
#[derive(Debug, Error)]
pub enum MetadataStoreError {
    #[error("error while writing key '{key}': {source}")]
    WriteFailed {
        key: String,
        #[source]
        source: CoordinationError,
    },

    #[error("cannot replace value for key '{key}': {source}")]
    CasFailed {
        key: String,
        #[source]
        source: CoordinationError,
    },

    #[error("metadata store has to be started before using")]
    NotStarted,

    #[error("failed to start metadata store: {0}")]
    StartFailed(#[source] CoordinationError),

    #[error("cannot reconfigure a running metadata store")]
    AlreadyRunning,

    #[error("metadata store is busy, retry the reconfiguration")]
    Busy,

    #[error("'root' must start with '/': {0}")]
    InvalidRoot(String),

    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error("configuration error: {0}")]
    Config(#[source] ConfigError),
}

impl MetadataStoreError {
    pub(crate) fn write_failed(key: &str, source: CoordinationError) -> Self {
        Self::WriteFailed {
            key: key.to_string(),
            source,
        }
    }

    pub(crate) fn cas_failed(key: &str, source: CoordinationError) -> Self {
        Self::CasFailed {
            key: key.to_string(),
            source,
        }
    }

    /// Check if the underlying coordination failure may clear on retry
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::WriteFailed { source, .. }
            | Self::CasFailed { source, .. }
            | Self::StartFailed(source) => source.is_retryable(),
            Self::Busy => true,
            _ => false,
        }
    }
}

impl From<ConfigError> for MetadataStoreError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::InvalidRoot(root) => Self::InvalidRoot(root),
            ConfigError::Encoding(e) => Self::Encoding(e),
            other @ ConfigError::Source(_) => Self::Config(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_retryable() {
        assert!(MetadataStoreError::write_failed("k", CoordinationError::ConnectionLoss).is_retryable());
        assert!(!MetadataStoreError::cas_failed("k", CoordinationError::SessionExpired).is_retryable());
        assert!(!MetadataStoreError::NotStarted.is_retryable());
        assert!(MetadataStoreError::Busy.is_retryable());
        assert!(!MetadataStoreError::AlreadyRunning.is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let err = MetadataStoreError::write_failed("a", CoordinationError::ConnectionLoss);
        assert_eq!(err.to_string(), "error while writing key 'a': connection loss");
        assert_eq!(
            MetadataStoreError::NotStarted.to_string(),
            "metadata store has to be started before using"
        );
    }
}
