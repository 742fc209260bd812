// src/storage/s3/mod.rs
//! S3-compatible object storage
//!
//! Audit logs are staged in a local directory and streamed to the bucket by
//! the [`UploadQueue`] while the connection is still running. Stored audit
//! logs are listed and read straight from the bucket.

#[cfg(feature = "aws")]
pub mod aws;
pub mod client;
pub mod memory;
pub mod metadata;
pub mod queue;
pub mod state;
mod writer;

pub use client::{BucketClient, BucketError, BucketResult, CompletedPart, MultipartUploadInfo, ObjectInfo};
pub use memory::InMemoryBucket;
pub use metadata::EntryMetadata;
pub use queue::{QueueOptions, UploadQueue};

use crate::storage::{is_audit_log_name, Entry, ReadableStorage, StorageWriter, WritableStorage};
use crate::utils::config::S3Config;
use crate::utils::errors::{AuditError, Result};
use async_trait::async_trait;
use std::io::{Cursor, Read};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Audit logs uploaded to a bucket
#[derive(Clone)]
pub struct S3Storage {
    queue: UploadQueue,
    client: Arc<dyn BucketClient>,
}

impl S3Storage {
    /// Start the upload queue on the configured staging directory
    ///
    /// Audit logs left in the directory by a previous run are uploaded again.
    pub fn new(config: &S3Config, client: Arc<dyn BucketClient>) -> Result<Self> {
        Self::with_options(config, client, QueueOptions::from_config(config))
    }

    pub fn with_options(
        config: &S3Config,
        client: Arc<dyn BucketClient>,
        options: QueueOptions,
    ) -> Result<Self> {
        let queue = UploadQueue::new(&config.local, client.clone(), options)?;
        info!(
            bucket = %config.bucket,
            local = %config.local.display(),
            recovered = queue.len(),
            "S3 audit log storage initialized"
        );
        Ok(Self { queue, client })
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }
}

#[async_trait]
impl WritableStorage for S3Storage {
    fn open_writer(&self, name: &str) -> Result<Box<dyn StorageWriter>> {
        self.queue.open_writer(name)
    }

    async fn shutdown(&self, deadline: CancellationToken) {
        self.queue.shutdown(deadline).await;
    }
}

#[async_trait]
impl ReadableStorage for S3Storage {
    async fn open_reader(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let data = self
            .client
            .get_object(name)
            .await
            .map_err(|e| AuditError::Storage(format!("failed to fetch audit log {}: {}", name, e)))?;
        Ok(Box::new(Cursor::new(data)))
    }

    fn list(
        &self,
    ) -> (
        mpsc::UnboundedReceiver<Entry>,
        mpsc::UnboundedReceiver<AuditError>,
    ) {
        let (entries_tx, entries_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();
        let client = self.client.clone();

        tokio::spawn(async move {
            match client.list_objects().await {
                Ok(objects) => {
                    for object in objects.into_iter().filter(|o| is_audit_log_name(&o.key)) {
                        let entry = Entry {
                            name: object.key,
                            metadata: object.metadata,
                        };
                        if entries_tx.send(entry).is_err() {
                            return;
                        }
                    }
                }
                Err(e) => {
                    let _ = errors_tx.send(AuditError::Storage(format!(
                        "failed to list audit logs: {}",
                        e
                    )));
                }
            }
        });

        (entries_rx, errors_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::collect;
    use std::io::Write;
    use tempfile::tempdir;

    fn config(dir: &std::path::Path) -> S3Config {
        S3Config {
            local: dir.to_path_buf(),
            access_key: "access".to_string(),
            secret_key: "secret".to_string(),
            bucket: "auditlog".to_string(),
            region: "us-east-1".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_write_list_read() {
        let dir = tempdir().unwrap();
        let bucket = InMemoryBucket::new();
        let storage = S3Storage::new(&config(dir.path()), Arc::new(bucket.clone())).unwrap();

        let mut writer = storage.open_writer("0a0b").unwrap();
        writer.set_metadata(7, "192.0.2.1", "XX", None);
        writer.write_all(b"audit").unwrap();
        writer.close().unwrap();
        storage.shutdown(CancellationToken::new()).await;

        let (entries, errors) = storage.list();
        let (entries, errors) = collect(entries, errors).await;
        assert!(errors.is_empty());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, "0a0b");
        assert_eq!(entries[0].metadata.get("timestamp").unwrap(), "7");
        assert!(!entries[0].metadata.contains_key("ip"));

        let mut data = Vec::new();
        storage
            .open_reader("0a0b")
            .await
            .unwrap()
            .read_to_end(&mut data)
            .unwrap();
        assert_eq!(data, b"audit");
    }

    #[tokio::test]
    async fn test_list_failure_is_reported() {
        let dir = tempdir().unwrap();
        let bucket = InMemoryBucket::new();
        let storage = S3Storage::new(&config(dir.path()), Arc::new(bucket.clone())).unwrap();
        bucket.fail_next(1);

        let (entries, errors) = storage.list();
        let (entries, errors) = collect(entries, errors).await;
        assert!(entries.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(storage.open_reader("missing").await.is_err());
    }
}
