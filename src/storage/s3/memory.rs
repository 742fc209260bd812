// src/storage/s3/memory.rs
//! In-memory bucket
//!
//! Implements [`BucketClient`] without a network so the upload queue can be
//! exercised in tests. Supports fault injection and inspection of stored
//! objects, completed part layouts and aborted uploads.

use crate::storage::s3::client::{
    BucketClient, BucketError, BucketResult, CompletedPart, MultipartUploadInfo, ObjectInfo,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    metadata: HashMap<String, String>,
    /// Sizes of the parts the object was assembled from, empty for single uploads
    part_sizes: Vec<usize>,
}

#[derive(Debug, Clone)]
struct PendingUpload {
    key: String,
    metadata: HashMap<String, String>,
    parts: BTreeMap<i32, (String, Bytes)>,
}

#[derive(Debug, Default)]
struct BucketState {
    objects: HashMap<String, StoredObject>,
    uploads: BTreeMap<String, PendingUpload>,
    aborted: Vec<MultipartUploadInfo>,
    next_id: u64,
    fail_next: usize,
    fail_always: bool,
    failed_operations: usize,
}

impl BucketState {
    fn check_fault(&mut self, operation: &str) -> BucketResult<()> {
        if self.fail_always || self.fail_next > 0 {
            self.fail_next = self.fail_next.saturating_sub(1);
            self.failed_operations += 1;
            return Err(BucketError::retryable(format!("injected failure in {}", operation)));
        }
        Ok(())
    }

    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{}-{:08}", prefix, self.next_id)
    }
}

/// Bucket kept in memory, cheap to clone and share between tasks
#[derive(Debug, Clone, Default)]
pub struct InMemoryBucket {
    state: Arc<Mutex<BucketState>>,
}

impl InMemoryBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` operations with a retryable error
    pub fn fail_next(&self, count: usize) {
        self.state.lock().fail_next = count;
    }

    /// Fail every operation until switched off
    pub fn set_fail_always(&self, fail: bool) {
        self.state.lock().fail_always = fail;
    }

    /// Number of operations that failed through fault injection
    pub fn failed_operations(&self) -> usize {
        self.state.lock().failed_operations
    }

    /// Start a multipart upload as a previous process would have left it
    pub fn seed_multipart_upload(&self, key: &str, part: &[u8]) -> String {
        let mut state = self.state.lock();
        let upload_id = state.next_id("upload");
        let mut parts = BTreeMap::new();
        parts.insert(1, ("stale".to_string(), Bytes::copy_from_slice(part)));
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                metadata: HashMap::new(),
                parts,
            },
        );
        upload_id
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.state.lock().objects.get(key).map(|o| o.data.clone())
    }

    pub fn object_metadata(&self, key: &str) -> Option<HashMap<String, String>> {
        self.state.lock().objects.get(key).map(|o| o.metadata.clone())
    }

    /// Part sizes an object was assembled from, empty for single uploads
    pub fn part_sizes(&self, key: &str) -> Option<Vec<usize>> {
        self.state.lock().objects.get(key).map(|o| o.part_sizes.clone())
    }

    pub fn object_count(&self) -> usize {
        self.state.lock().objects.len()
    }

    /// Multipart uploads neither completed nor aborted
    pub fn pending_uploads(&self) -> Vec<MultipartUploadInfo> {
        self.state
            .lock()
            .uploads
            .iter()
            .map(|(upload_id, upload)| MultipartUploadInfo {
                key: upload.key.clone(),
                upload_id: upload_id.clone(),
            })
            .collect()
    }

    pub fn aborted_uploads(&self) -> Vec<MultipartUploadInfo> {
        self.state.lock().aborted.clone()
    }
}

#[async_trait]
impl BucketClient for InMemoryBucket {
    async fn create_multipart_upload(
        &self,
        key: &str,
        metadata: &HashMap<String, String>,
    ) -> BucketResult<String> {
        let mut state = self.state.lock();
        state.check_fault("create_multipart_upload")?;
        let upload_id = state.next_id("upload");
        state.uploads.insert(
            upload_id.clone(),
            PendingUpload {
                key: key.to_string(),
                metadata: metadata.clone(),
                parts: BTreeMap::new(),
            },
        );
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: i32,
        body: Bytes,
    ) -> BucketResult<String> {
        let mut state = self.state.lock();
        state.check_fault("upload_part")?;
        if part_number < 1 {
            return Err(BucketError::permanent(format!(
                "invalid part number {}",
                part_number
            )));
        }
        let etag = state.next_id("etag");
        let upload = state
            .uploads
            .get_mut(upload_id)
            .filter(|u| u.key == key)
            .ok_or_else(|| BucketError::permanent(format!("no such upload: {}", upload_id)))?;
        upload.parts.insert(part_number, (etag.clone(), body));
        Ok(etag)
    }

    async fn complete_multipart_upload(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> BucketResult<()> {
        let mut state = self.state.lock();
        state.check_fault("complete_multipart_upload")?;
        let upload = state
            .uploads
            .get(upload_id)
            .filter(|u| u.key == key)
            .cloned()
            .ok_or_else(|| BucketError::permanent(format!("no such upload: {}", upload_id)))?;

        let mut data = BytesMut::new();
        let mut part_sizes = Vec::with_capacity(parts.len());
        let mut previous = 0;
        for part in parts {
            if part.part_number <= previous {
                return Err(BucketError::permanent("parts are not in ascending order"));
            }
            previous = part.part_number;
            let (etag, body) = upload.parts.get(&part.part_number).ok_or_else(|| {
                BucketError::permanent(format!("missing part {}", part.part_number))
            })?;
            if *etag != part.etag {
                return Err(BucketError::permanent(format!(
                    "etag mismatch for part {}",
                    part.part_number
                )));
            }
            data.extend_from_slice(body);
            part_sizes.push(body.len());
        }

        state.uploads.remove(upload_id);
        state.objects.insert(
            key.to_string(),
            StoredObject {
                data: data.freeze(),
                metadata: upload.metadata,
                part_sizes,
            },
        );
        Ok(())
    }

    async fn abort_multipart_upload(&self, key: &str, upload_id: &str) -> BucketResult<()> {
        let mut state = self.state.lock();
        state.check_fault("abort_multipart_upload")?;
        let known = state.uploads.get(upload_id).map_or(false, |u| u.key == key);
        if !known {
            return Err(BucketError::permanent(format!("no such upload: {}", upload_id)));
        }
        state.uploads.remove(upload_id);
        state.aborted.push(MultipartUploadInfo {
            key: key.to_string(),
            upload_id: upload_id.to_string(),
        });
        Ok(())
    }

    async fn list_multipart_uploads(&self, prefix: &str) -> BucketResult<Vec<MultipartUploadInfo>> {
        let mut state = self.state.lock();
        state.check_fault("list_multipart_uploads")?;
        Ok(state
            .uploads
            .iter()
            .filter(|(_, upload)| upload.key.starts_with(prefix))
            .map(|(upload_id, upload)| MultipartUploadInfo {
                key: upload.key.clone(),
                upload_id: upload_id.clone(),
            })
            .collect())
    }

    async fn put_object(
        &self,
        key: &str,
        path: &Path,
        size: u64,
        metadata: &HashMap<String, String>,
    ) -> BucketResult<()> {
        self.state.lock().check_fault("put_object")?;
        let mut body = tokio::fs::read(path)
            .await
            .map_err(|e| BucketError::retryable(format!("failed to read {}: {}", path.display(), e)))?;
        if (body.len() as u64) < size {
            return Err(BucketError::retryable(format!(
                "{} is shorter than {} bytes",
                path.display(),
                size
            )));
        }
        body.truncate(size as usize);
        let body = Bytes::from(body);

        let mut state = self.state.lock();
        state.objects.insert(
            key.to_string(),
            StoredObject {
                data: body,
                metadata: metadata.clone(),
                part_sizes: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get_object(&self, key: &str) -> BucketResult<Bytes> {
        let mut state = self.state.lock();
        state.check_fault("get_object")?;
        state
            .objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| BucketError::permanent(format!("no such key: {}", key)))
    }

    async fn list_objects(&self) -> BucketResult<Vec<ObjectInfo>> {
        let mut state = self.state.lock();
        state.check_fault("list_objects")?;
        let mut objects: Vec<ObjectInfo> = state
            .objects
            .iter()
            .map(|(key, object)| ObjectInfo {
                key: key.clone(),
                metadata: object.metadata.clone(),
            })
            .collect();
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}
