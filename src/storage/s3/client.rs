// src/storage/s3/client.rs
//! Bucket client seam
//!
//! The upload queue only needs a handful of object storage operations. They
//! are expressed as an async trait so the queue can run against the AWS SDK
//! (`aws` feature) or the in-memory bucket used in tests.

use crate::utils::errors::AuditError;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

/// Object storage operation failure
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct BucketError {
    pub message: String,
    /// Whether repeating the operation may succeed
    pub retryable: bool,
}

impl BucketError {
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl From<BucketError> for AuditError {
    fn from(err: BucketError) -> Self {
        if err.retryable {
            AuditError::Upload(err.message)
        } else {
            AuditError::UploadRejected(err.message)
        }
    }
}

pub type BucketResult<T> = std::result::Result<T, BucketError>;

/// Part of a multipart upload confirmed by the bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    /// 1-based part number
    pub part_number: i32,
    pub etag: String,
}

/// Multipart upload that was started and neither completed nor aborted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartUploadInfo {
    pub key: String,
    pub upload_id: String,
}

/// Stored object with its user metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub metadata: HashMap<String, String>,
}

/// Authenticated client for one bucket
#[async_trait]
pub trait BucketClient: Send + Sync {
    /// Start a multipart upload, returning its upload id
    async fn create_multipart_upload(
        &self,
        key: &str,
        metadata: &HashMap<String, String>,
    ) -> BucketResult<String>;

    /// Upload one part, returning its ETag
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> BucketResult<String>;

    /// Assemble the object from `parts`, given in part number order
    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BucketResult<()>;

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> BucketResult<()>;

    /// In-progress multipart uploads whose key starts with `prefix`
    async fn list_multipart_uploads(&self, prefix: &str) -> BucketResult<Vec<MultipartUploadInfo>>;

    /// Upload the first `size` bytes of the file at `path` as one object
    ///
    /// The body is read from the file while the request is sent.
    async fn put_object(
        &self,
        key: &str,
        path: &Path,
        size: u64,
        metadata: &HashMap<String, String>,
    ) -> BucketResult<()>;

    async fn get_object(&self, key: &str) -> BucketResult<Bytes>;

    /// All stored objects with their metadata
    async fn list_objects(&self) -> BucketResult<Vec<ObjectInfo>>;
}
