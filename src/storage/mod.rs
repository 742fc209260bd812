// src/storage/mod.rs
//! Audit log storage backends
//!
//! Encoders write through a synchronous [`StorageWriter`] sink obtained from a
//! [`WritableStorage`], wrapped in a [`BlockingSink`] by the audit logger.
//! Backends that can also serve stored audit logs implement
//! [`ReadableStorage`].
//!
//! - **none**: discards everything
//! - **file**: one file per connection in a local directory
//! - **s3**: local staging directory plus a resumable multipart upload queue

pub mod blocking;
pub mod file;
pub mod none;
pub mod s3;

use crate::utils::config::{AuditConfig, StorageKind};
use crate::utils::errors::{AuditError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub use blocking::BlockingSink;
pub use file::FileStorage;
pub use none::NoneStorage;
pub use s3::S3Storage;

/// Write sink for one audit log
pub trait StorageWriter: Write + Send {
    /// Attach connection metadata to the audit log
    ///
    /// Called whenever a new piece of metadata becomes known; later calls
    /// replace earlier values.
    fn set_metadata(&mut self, start_time: i64, ip: &str, country: &str, username: Option<&str>);

    /// Finish the audit log; no further writes follow
    fn close(self: Box<Self>) -> Result<()>;
}

/// Storage that accepts new audit logs
#[async_trait]
pub trait WritableStorage: Send + Sync {
    /// Open a sink for the audit log called `name`
    fn open_writer(&self, name: &str) -> Result<Box<dyn StorageWriter>>;

    /// Finish pending work, giving up on retries once `deadline` is cancelled
    async fn shutdown(&self, deadline: CancellationToken);
}

/// Storage that can serve stored audit logs
#[async_trait]
pub trait ReadableStorage: Send + Sync {
    /// Open a stored audit log for reading
    async fn open_reader(&self, name: &str) -> Result<Box<dyn Read + Send>>;

    /// Stream the stored audit logs and any listing errors
    ///
    /// Both channels are closed once listing is complete.
    fn list(
        &self,
    ) -> (
        mpsc::UnboundedReceiver<Entry>,
        mpsc::UnboundedReceiver<AuditError>,
    );
}

/// Storage that supports both directions
pub trait ReadWriteStorage: ReadableStorage + WritableStorage {}

impl<T: ReadableStorage + WritableStorage> ReadWriteStorage for T {}

/// Stored audit log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub metadata: HashMap<String, String>,
}

/// Audit log names are bare hex identifiers; anything with a dot is a
/// temporary, sidecar or access-test file.
pub(crate) fn is_audit_log_name(name: &str) -> bool {
    !name.is_empty() && !name.contains('.')
}

/// Create the storage backend selected in the configuration
///
/// The S3 backend needs the `aws` feature for a native bucket client; use
/// [`new_storage_with_client`] to supply another client.
pub async fn new_storage(config: &AuditConfig) -> Result<Arc<dyn WritableStorage>> {
    match config.storage {
        StorageKind::S3 => {
            #[cfg(feature = "aws")]
            {
                config.s3.validate()?;
                let client = s3::aws::AwsBucketClient::new(&config.s3).await?;
                new_storage_with_client(config, Arc::new(client))
            }
            #[cfg(not(feature = "aws"))]
            {
                Err(AuditError::Config(
                    "s3 storage requires the `aws` feature or an explicit bucket client"
                        .to_string(),
                ))
            }
        }
        _ => new_local_storage(config),
    }
}

/// Create the storage backend, using `client` for object storage
pub fn new_storage_with_client(
    config: &AuditConfig,
    client: Arc<dyn s3::BucketClient>,
) -> Result<Arc<dyn WritableStorage>> {
    match config.storage {
        StorageKind::S3 => Ok(Arc::new(S3Storage::new(&config.s3, client)?)),
        _ => new_local_storage(config),
    }
}

fn new_local_storage(config: &AuditConfig) -> Result<Arc<dyn WritableStorage>> {
    match config.storage {
        StorageKind::None => Ok(Arc::new(NoneStorage::new())),
        StorageKind::File => Ok(Arc::new(FileStorage::new(&config.file)?)),
        StorageKind::S3 => Err(AuditError::Config(
            "s3 storage needs a bucket client".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::config::FileConfig;
    use tempfile::tempdir;

    #[test]
    fn test_audit_log_names() {
        assert!(is_audit_log_name("0a1b2c"));
        assert!(!is_audit_log_name(""));
        assert!(!is_audit_log_name(".accesstest"));
        assert!(!is_audit_log_name("0a1b2c.metadata.json"));
    }

    #[tokio::test]
    async fn test_factory_selects_backend() {
        let dir = tempdir().unwrap();
        let config = AuditConfig {
            storage: StorageKind::File,
            file: FileConfig {
                directory: dir.path().to_path_buf(),
            },
            ..Default::default()
        };
        let storage = new_storage(&config).await.unwrap();
        let mut writer = storage.open_writer("abcd").unwrap();
        writer.write_all(b"hello").unwrap();
        writer.close().unwrap();
        assert_eq!(std::fs::read(dir.path().join("abcd")).unwrap(), b"hello");

        let none = new_storage(&AuditConfig::default()).await.unwrap();
        assert!(none.open_writer("abcd").is_ok());
    }

    #[tokio::test]
    async fn test_factory_rejects_invalid_file_directory() {
        let dir = tempdir().unwrap();
        let config = AuditConfig {
            storage: StorageKind::File,
            file: FileConfig {
                directory: dir.path().join("missing"),
            },
            ..Default::default()
        };
        assert!(new_storage(&config).await.is_err());
    }
}
