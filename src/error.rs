//! Error types for storage operations.
//!
//! Absence is not an error: a missing or expired key comes back as `Ok(None)`
//! (or `Ok(false)` from `exists`). Only conditions the caller must react to
//! are represented here.

use crate::storage::record::CodecError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the storage facade and its backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The per-key lock could not be acquired within the configured budget.
    ///
    /// Another process (or thread) is holding the lock. Retrying is safe.
    /// `key` is the caller's key, or the file stem when raised by a sweep.
    #[error("timed out after {waited:?} waiting for lock on key {key:?}")]
    LockTimeout { key: String, waited: Duration },

    /// The storage medium failed (disk full, permission denied, missing mount).
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A zero TTL would create an entry that is expired at birth.
    #[error("ttl must be greater than zero")]
    InvalidTtl,

    /// A record could not be serialized for writing.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// Wraps an I/O error with the path it occurred on.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if the operation may succeed when simply retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::LockTimeout { .. })
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_is_retryable() {
        let err = StorageError::LockTimeout {
            key: "thread-1".into(),
            waited: Duration::from_millis(50),
        };
        assert!(err.is_retryable());
        assert!(err.to_string().contains("thread-1"));
    }

    #[test]
    fn test_io_is_not_retryable() {
        let err = StorageError::io(
            "/nowhere/file.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("/nowhere/file.json"));
    }

    #[test]
    fn test_codec_error_converts() {
        let err: StorageError = CodecError::Encode("value too deep".into()).into();
        assert!(!err.is_retryable());
        assert!(matches!(err, StorageError::Codec(CodecError::Encode(_))));
        assert_eq!(err.to_string(), "failed to encode record: value too deep");
    }
}
