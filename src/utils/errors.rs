// src/utils/errors.rs
//! Error types shared by every audit log component
//!
//! Variants follow the failure classes of the pipeline: configuration
//! problems are fatal at construction, encode failures abort a single
//! connection's recording, decode failures are reported per record and
//! upload failures feed the retry policy of the upload queue.

use thiserror::Error;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, AuditError>;

/// Errors produced by the audit log pipeline
#[derive(Debug, Error)]
pub enum AuditError {
    /// Invalid or incomplete configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Local I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding or writing an audit log failed
    #[error("failed to encode audit log: {0}")]
    Encode(String),

    /// The file header is not an audit log header
    #[error("invalid file format header: {0:02x?}")]
    InvalidHeader(Vec<u8>),

    /// The file was written by a newer format version
    #[error("file format version is higher than supported: {found} > {supported}")]
    UnsupportedVersion { found: u64, supported: u64 },

    /// A record declares a type this build does not know
    #[error("invalid message type: {0}")]
    UnknownEventType(i32),

    /// A record could not be decoded
    #[error("failed to decode audit log: {0}")]
    Decode(String),

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Object storage upload failure
    #[error("upload failed: {0}")]
    Upload(String),

    /// Object storage refused an operation that will not succeed on retry
    #[error("upload rejected: {0}")]
    UploadRejected(String),

    /// The event channel of a connection is already closed
    #[error("audit log channel closed")]
    ChannelClosed,
}

impl AuditError {
    /// Whether repeating the failed operation unchanged may succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            AuditError::Config(_) | AuditError::UploadRejected(_)
        )
    }
}

impl From<serde_json::Error> for AuditError {
    fn from(err: serde_json::Error) -> Self {
        AuditError::Decode(err.to_string())
    }
}

impl From<config::ConfigError> for AuditError {
    fn from(err: config::ConfigError) -> Self {
        AuditError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = AuditError::UnsupportedVersion {
            found: 2,
            supported: 1,
        };
        assert_eq!(
            err.to_string(),
            "file format version is higher than supported: 2 > 1"
        );

        let err = AuditError::UnknownEventType(9999);
        assert_eq!(err.to_string(), "invalid message type: 9999");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AuditError = io.into();
        assert!(matches!(err, AuditError::Io(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_rejected_upload_is_not_retryable() {
        assert!(!AuditError::UploadRejected("no such upload".to_string()).is_retryable());
        assert!(AuditError::Upload("timeout".to_string()).is_retryable());
    }
}
