// src/storage/s3/queue.rs
//! Resumable multipart upload queue
//!
//! Audit logs are written to a local staging directory and uploaded while
//! they grow. Every tracked file has its own upload task; a semaphore caps
//! the number of bucket operations in flight across all of them.
//!
//! # Architecture
//!
//! ```text
//! QueueWriter ──write──→ local file ──notify──→ upload task ──→ BucketClient
//!                                                   │
//!                                  next_step(finished, uploaded, size)
//!                                                   │
//!              Discard | SingleShot | UploadPart | Finalize | Wait
//! ```
//!
//! A bucket error that is not retryable while a multipart upload is open
//! drops that upload, and the entry starts over from byte 0.
//!
//! Files found in the directory at startup are uploaded again from scratch
//! after any multipart upload a previous process left behind is aborted.

use crate::codes;
use crate::storage::is_audit_log_name;
use crate::storage::s3::client::BucketClient;
use crate::storage::s3::metadata::EntryMetadata;
use crate::storage::s3::state::{next_step, should_abandon, UploadPhase, UploadProgress, UploadStep};
use crate::storage::s3::writer::QueueWriter;
use crate::storage::StorageWriter;
use crate::utils::config::{S3Config, S3MetadataConfig, DEFAULT_PARALLEL_UPLOADS, MIN_PART_SIZE};
use crate::utils::errors::{AuditError, Result};
use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fs;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Upload queue tuning
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Size of multipart upload parts in bytes
    pub part_size: u64,
    /// Maximum number of concurrent bucket operations
    pub parallel_uploads: usize,
    /// Pause after a failed bucket operation
    pub retry_delay: Duration,
    /// Fallback wake-up for entries waiting on more data
    pub recheck_interval: Duration,
    /// Which connection metadata is sent with objects
    pub metadata: S3MetadataConfig,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            part_size: MIN_PART_SIZE,
            parallel_uploads: DEFAULT_PARALLEL_UPLOADS,
            retry_delay: Duration::from_secs(10),
            recheck_interval: Duration::from_secs(1),
            metadata: S3MetadataConfig::default(),
        }
    }
}

impl QueueOptions {
    pub fn from_config(config: &S3Config) -> Self {
        Self {
            part_size: config.upload_part_size,
            parallel_uploads: config.parallel_uploads,
            metadata: config.metadata,
            ..Default::default()
        }
    }
}

/// One audit log tracked by the queue
pub(crate) struct QueueEntry {
    pub name: String,
    pub path: PathBuf,
    pub sidecar: PathBuf,
    pub metadata: Mutex<EntryMetadata>,
    pub part_available: Notify,
    finished: AtomicBool,
    released: AtomicBool,
    recovered: bool,
}

impl QueueEntry {
    fn new(directory: &Path, name: &str, metadata: EntryMetadata, recovered: bool) -> Self {
        Self {
            name: name.to_string(),
            path: directory.join(name),
            sidecar: EntryMetadata::sidecar_path(directory, name),
            metadata: Mutex::new(metadata),
            part_available: Notify::new(),
            finished: AtomicBool::new(recovered),
            released: AtomicBool::new(false),
            recovered,
        }
    }

    /// No more bytes will be appended
    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
        self.part_available.notify_one();
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// The queue no longer tracks this entry
    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// Outcome of one successful step
enum StepOutcome {
    Progress,
    Done,
    Idle,
}

struct QueueInner {
    directory: PathBuf,
    client: Arc<dyn BucketClient>,
    options: QueueOptions,
    semaphore: Semaphore,
    entries: DashMap<String, Arc<QueueEntry>>,
    shutdown_requested: CancellationToken,
    deadline: CancellationToken,
    tracker: TaskTracker,
}

/// Queue of local audit logs awaiting upload
#[derive(Clone)]
pub struct UploadQueue {
    inner: Arc<QueueInner>,
}

impl UploadQueue {
    /// Create the queue and re-enqueue audit logs left in `directory`
    ///
    /// Must be called within a Tokio runtime.
    pub fn new(
        directory: impl Into<PathBuf>,
        client: Arc<dyn BucketClient>,
        options: QueueOptions,
    ) -> Result<Self> {
        let directory = directory.into();
        if options.part_size == 0 {
            return Err(AuditError::Config("upload part size must be positive".to_string()));
        }
        if options.parallel_uploads == 0 {
            return Err(AuditError::Config("parallel uploads must be positive".to_string()));
        }
        let stat = fs::metadata(&directory).map_err(|e| {
            AuditError::Config(format!(
                "invalid local audit directory {} ({})",
                directory.display(),
                e
            ))
        })?;
        if !stat.is_dir() {
            return Err(AuditError::Config(format!(
                "invalid local audit directory {} (not a directory)",
                directory.display()
            )));
        }

        let queue = Self {
            inner: Arc::new(QueueInner {
                directory,
                client,
                semaphore: Semaphore::new(options.parallel_uploads),
                options,
                entries: DashMap::new(),
                shutdown_requested: CancellationToken::new(),
                deadline: CancellationToken::new(),
                tracker: TaskTracker::new(),
            }),
        };
        queue.recover()?;
        Ok(queue)
    }

    pub fn directory(&self) -> &Path {
        &self.inner.directory
    }

    /// Number of audit logs not yet uploaded or abandoned
    pub fn len(&self) -> usize {
        self.inner.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.entries.contains_key(name)
    }

    /// Start a new audit log and its upload task
    pub fn open_writer(&self, name: &str) -> Result<Box<dyn StorageWriter>> {
        if !is_audit_log_name(name) || name.contains('/') || name.contains('\\') {
            return Err(AuditError::Storage(format!("invalid audit log name: {:?}", name)));
        }
        if self.inner.shutdown_requested.is_cancelled() {
            return Err(AuditError::Storage("upload queue is shutting down".to_string()));
        }

        let entry = match self.inner.entries.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(AuditError::Storage(format!(
                    "audit log {} is already queued",
                    name
                )));
            }
            dashmap::mapref::entry::Entry::Vacant(vacant) => {
                let entry = Arc::new(QueueEntry::new(
                    &self.inner.directory,
                    name,
                    EntryMetadata::default(),
                    false,
                ));
                vacant.insert(entry.clone());
                entry
            }
        };

        let file = match fs::File::create(&entry.path) {
            Ok(file) => file,
            Err(e) => {
                self.inner.entries.remove(name);
                return Err(AuditError::Storage(format!(
                    "failed to create audit log {}: {}",
                    entry.path.display(),
                    e
                )));
            }
        };

        let writer = QueueWriter::new(entry.clone(), file);
        self.spawn_upload(entry);
        Ok(Box::new(writer))
    }

    /// Stop accepting audit logs and wait for pending uploads
    ///
    /// Entries still failing are given up after more than three consecutive
    /// failures; once `deadline` is cancelled after one. Entries waiting for
    /// data at the deadline stay on disk for the next start.
    pub async fn shutdown(&self, deadline: CancellationToken) {
        self.inner.shutdown_requested.cancel();
        self.inner.tracker.close();

        tokio::select! {
            _ = self.inner.tracker.wait() => {}
            _ = deadline.cancelled() => {
                self.inner.deadline.cancel();
                self.inner.tracker.wait().await;
            }
        }
        info!(remaining = self.len(), "Upload queue shut down");
    }

    fn recover(&self) -> Result<()> {
        for dir_entry in fs::read_dir(&self.inner.directory)? {
            let dir_entry = dir_entry?;
            let stat = dir_entry.metadata()?;
            let name = dir_entry.file_name().to_string_lossy().into_owned();
            if !stat.is_file() || stat.len() == 0 || !is_audit_log_name(&name) {
                continue;
            }
            if self.inner.entries.contains_key(&name) {
                continue;
            }

            let sidecar = EntryMetadata::sidecar_path(&self.inner.directory, &name);
            let metadata = match EntryMetadata::load(&sidecar) {
                Ok(metadata) => metadata.unwrap_or_default(),
                Err(e) => {
                    warn!(
                        code = codes::E_FAILED_READING_METADATA_FILE,
                        name = %name,
                        error = %e,
                        "Failed to read audit log metadata file"
                    );
                    EntryMetadata::default()
                }
            };

            info!(
                code = codes::M_RECOVERING,
                name = %name,
                bytes = stat.len(),
                "Recovering audit log from previous run"
            );
            let entry = Arc::new(QueueEntry::new(&self.inner.directory, &name, metadata, true));
            self.inner.entries.insert(name, entry.clone());
            self.spawn_upload(entry);
        }
        Ok(())
    }

    fn spawn_upload(&self, entry: Arc<QueueEntry>) {
        let inner = self.inner.clone();
        self.inner.tracker.spawn(inner.upload_loop(entry));
    }
}

impl QueueInner {
    async fn upload_loop(self: Arc<Self>, entry: Arc<QueueEntry>) {
        let mut file = match File::open(&entry.path).await {
            Ok(file) => file,
            Err(e) => {
                error!(
                    code = codes::E_FAILED_QUEUE_STAT,
                    name = %entry.name,
                    error = %e,
                    "Failed to open queued audit log"
                );
                self.release(&entry);
                return;
            }
        };
        let mut progress = UploadProgress::default();
        let mut stale_cleared = !entry.recovered;

        loop {
            if should_abandon(
                progress.failures,
                self.shutdown_requested.is_cancelled(),
                self.deadline.is_cancelled(),
            ) {
                self.abandon(&entry, &progress).await;
                return;
            }

            let outcome = {
                let Ok(_permit) = self.semaphore.acquire().await else {
                    return;
                };
                self.step(&entry, &mut file, &mut progress, &mut stale_cleared)
                    .await
            };

            match outcome {
                Ok(StepOutcome::Progress) => progress.record_success(),
                Ok(StepOutcome::Done) => {
                    self.release(&entry);
                    return;
                }
                Ok(StepOutcome::Idle) => {
                    progress.record_success();
                    if self.deadline.is_cancelled() {
                        warn!(
                            name = %entry.name,
                            uploaded = progress.uploaded,
                            "Shutdown deadline reached while audit log is still open, leaving it for the next start"
                        );
                        if let Some(upload_id) = &progress.upload_id {
                            self.abort_upload(&entry.name, upload_id).await;
                        }
                        self.entries.remove(&entry.name);
                        return;
                    }
                    self.wait_for_data(&entry).await;
                }
                Err(e) => {
                    progress.record_failure();
                    metrics::counter!("sshaudit_upload_failures_total").increment(1);
                    debug!(
                        name = %entry.name,
                        failures = progress.failures,
                        error = %e,
                        "Upload step failed"
                    );
                    if !e.is_retryable() {
                        if let Some(upload_id) = progress.restart() {
                            warn!(
                                code = codes::E_MULTIPART_UPLOAD_RESTARTING,
                                name = %entry.name,
                                upload_id = %upload_id,
                                error = %e,
                                "Multipart upload rejected, starting over"
                            );
                            self.abort_upload(&entry.name, &upload_id).await;
                        }
                    }
                    self.backoff().await;
                }
            }
        }
    }

    async fn step(
        &self,
        entry: &QueueEntry,
        file: &mut File,
        progress: &mut UploadProgress,
        stale_cleared: &mut bool,
    ) -> Result<StepOutcome> {
        if !*stale_cleared {
            self.abort_stale_uploads(&entry.name).await?;
            *stale_cleared = true;
        }

        // finished must be read before the size so a final write is never missed
        let finished = entry.is_finished();
        let size = match file.metadata().await {
            Ok(stat) => stat.len(),
            Err(e) => {
                warn!(
                    code = codes::E_FAILED_QUEUE_STAT,
                    name = %entry.name,
                    error = %e,
                    "Failed to stat queued audit log"
                );
                return Err(e.into());
            }
        };

        let step = next_step(finished, progress.uploaded, size, self.options.part_size);
        debug!(
            name = %entry.name,
            phase = ?UploadPhase::of(finished, progress.uploaded, size),
            step = ?step,
            "Upload step"
        );

        match step {
            UploadStep::Wait => Ok(StepOutcome::Idle),
            UploadStep::Discard => {
                debug!(
                    code = codes::M_EMPTY_AUDIT_LOG_DISCARDED,
                    name = %entry.name,
                    "Discarding empty audit log"
                );
                Ok(StepOutcome::Done)
            }
            UploadStep::SingleShot => {
                self.single_upload(entry, size).await?;
                // a multipart upload whose first part never landed
                if let Some(upload_id) = progress.restart() {
                    self.abort_upload(&entry.name, &upload_id).await;
                }
                Ok(StepOutcome::Done)
            }
            UploadStep::UploadPart {
                part_number,
                start,
                end,
            } => {
                let upload_id = match &progress.upload_id {
                    Some(upload_id) => upload_id.clone(),
                    None => {
                        let upload_id = self.initialize_multipart(entry).await?;
                        progress.upload_id = Some(upload_id.clone());
                        upload_id
                    }
                };
                let etag = self
                    .upload_part(entry, file, &upload_id, part_number, start, end)
                    .await?;
                progress.record_part(part_number, etag, end - start);
                Ok(StepOutcome::Progress)
            }
            UploadStep::Finalize => {
                if let Some(upload_id) = &progress.upload_id {
                    self.finalize_multipart(entry, upload_id, progress).await?;
                }
                Ok(StepOutcome::Done)
            }
        }
    }

    fn object_metadata(&self, entry: &QueueEntry) -> std::collections::HashMap<String, String> {
        entry.metadata.lock().to_object_metadata(
            self.options.metadata.ip,
            self.options.metadata.username,
        )
    }

    /// Upload a finished audit log, streaming the body from the local file
    async fn single_upload(&self, entry: &QueueEntry, size: u64) -> Result<()> {
        debug!(code = codes::M_SINGLE_UPLOAD, name = %entry.name, bytes = size, "Uploading audit log in one request");
        let metadata = self.object_metadata(entry);

        match self.client.put_object(&entry.name, &entry.path, size, &metadata).await {
            Ok(()) => {
                info!(code = codes::M_SINGLE_UPLOAD_COMPLETE, name = %entry.name, bytes = size, "Audit log uploaded");
                metrics::counter!("sshaudit_uploads_completed_total", "kind" => "single").increment(1);
                Ok(())
            }
            Err(e) => {
                warn!(code = codes::E_SINGLE_UPLOAD_FAILED, name = %entry.name, error = %e, "Audit log upload failed");
                Err(e.into())
            }
        }
    }

    async fn initialize_multipart(&self, entry: &QueueEntry) -> Result<String> {
        debug!(code = codes::M_MULTIPART_UPLOAD, name = %entry.name, "Initializing multipart upload");
        let metadata = self.object_metadata(entry);

        self.client
            .create_multipart_upload(&entry.name, &metadata)
            .await
            .map_err(|e| {
                warn!(
                    code = codes::E_MULTIPART_UPLOAD_INITIALIZATION_FAILED,
                    name = %entry.name,
                    error = %e,
                    "Failed to initialize multipart upload"
                );
                e.into()
            })
    }

    async fn upload_part(
        &self,
        entry: &QueueEntry,
        file: &mut File,
        upload_id: &str,
        part_number: i32,
        start: u64,
        end: u64,
    ) -> Result<String> {
        debug!(
            code = codes::M_MULTIPART_PART_UPLOADING,
            name = %entry.name,
            part = part_number,
            bytes = end - start,
            "Uploading part"
        );
        let body = read_range(file, start, end).await?;

        match self
            .client
            .upload_part(&entry.name, upload_id, part_number, body)
            .await
        {
            Ok(etag) => {
                debug!(
                    code = codes::M_MULTIPART_PART_UPLOAD_COMPLETE,
                    name = %entry.name,
                    part = part_number,
                    "Part uploaded"
                );
                metrics::counter!("sshaudit_upload_parts_total").increment(1);
                Ok(etag)
            }
            Err(e) => {
                warn!(
                    code = codes::E_MULTIPART_PART_UPLOAD_FAILED,
                    name = %entry.name,
                    part = part_number,
                    error = %e,
                    "Failed to upload part"
                );
                Err(e.into())
            }
        }
    }

    async fn finalize_multipart(
        &self,
        entry: &QueueEntry,
        upload_id: &str,
        progress: &UploadProgress,
    ) -> Result<()> {
        debug!(
            code = codes::M_MULTIPART_UPLOAD_FINALIZING,
            name = %entry.name,
            upload_id = %upload_id,
            parts = progress.parts.len(),
            "Finalizing multipart upload"
        );

        match self
            .client
            .complete_multipart_upload(&entry.name, upload_id, &progress.parts)
            .await
        {
            Ok(()) => {
                info!(
                    code = codes::M_MULTIPART_UPLOAD_FINALIZED,
                    name = %entry.name,
                    bytes = progress.uploaded,
                    parts = progress.parts.len(),
                    "Audit log uploaded"
                );
                metrics::counter!("sshaudit_uploads_completed_total", "kind" => "multipart").increment(1);
                Ok(())
            }
            Err(e) => {
                warn!(
                    code = codes::E_MULTIPART_UPLOAD_FINALIZATION_FAILED,
                    name = %entry.name,
                    upload_id = %upload_id,
                    error = %e,
                    "Failed to finalize multipart upload"
                );
                Err(e.into())
            }
        }
    }

    /// Abort multipart uploads for `name` left behind by a previous process
    async fn abort_stale_uploads(&self, name: &str) -> Result<()> {
        let uploads = self.client.list_multipart_uploads(name).await.map_err(|e| {
            warn!(
                code = codes::E_MULTIPART_FAILED_LIST,
                name = %name,
                error = %e,
                "Failed to list existing multipart uploads"
            );
            AuditError::from(e)
        })?;

        for upload in uploads.iter().filter(|u| u.key == name) {
            debug!(name = %name, upload_id = %upload.upload_id, "Aborting previous multipart upload");
            self.client
                .abort_multipart_upload(&upload.key, &upload.upload_id)
                .await
                .map_err(|e| {
                    warn!(
                        code = codes::E_MULTIPART_FAILED_ABORT,
                        name = %name,
                        upload_id = %upload.upload_id,
                        error = %e,
                        "Failed to abort previous multipart upload"
                    );
                    AuditError::from(e)
                })?;
        }
        Ok(())
    }

    async fn abort_upload(&self, name: &str, upload_id: &str) {
        if let Err(e) = self.client.abort_multipart_upload(name, upload_id).await {
            warn!(
                code = codes::E_MULTIPART_FAILED_ABORT,
                name = %name,
                upload_id = %upload_id,
                error = %e,
                "Failed to abort multipart upload"
            );
        }
    }

    async fn wait_for_data(&self, entry: &QueueEntry) {
        tokio::select! {
            _ = entry.part_available.notified() => {}
            _ = tokio::time::sleep(self.options.recheck_interval) => {}
            _ = self.deadline.cancelled() => {}
        }
    }

    async fn backoff(&self) {
        tokio::select! {
            _ = tokio::time::sleep(self.options.retry_delay) => {}
            _ = self.deadline.cancelled() => {}
        }
    }

    /// Give up on an audit log after repeated failures
    async fn abandon(&self, entry: &QueueEntry, progress: &UploadProgress) {
        error!(
            code = codes::E_MULTIPART_ABORTING,
            name = %entry.name,
            failures = progress.failures,
            uploaded = progress.uploaded,
            "Giving up on audit log upload"
        );
        if let Some(upload_id) = &progress.upload_id {
            self.abort_upload(&entry.name, upload_id).await;
        }
        metrics::counter!("sshaudit_uploads_abandoned_total").increment(1);
        self.release(entry);
    }

    /// Delete the local copy and drop the entry
    fn release(&self, entry: &QueueEntry) {
        entry.released.store(true, Ordering::Release);
        for path in [&entry.path, &entry.sidecar] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(
                    code = codes::E_REMOVE_AUDIT_LOG_FAILED,
                    path = %path.display(),
                    error = %e,
                    "Failed to remove local audit log"
                ),
            }
        }
        self.entries.remove(&entry.name);
    }
}

async fn read_range(file: &mut File, start: u64, end: u64) -> Result<Bytes> {
    let length = usize::try_from(end - start)
        .map_err(|_| AuditError::Upload(format!("part too large: {} bytes", end - start)))?;
    let mut buffer = vec![0u8; length];
    file.seek(SeekFrom::Start(start)).await?;
    file.read_exact(&mut buffer).await?;
    Ok(Bytes::from(buffer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::s3::memory::InMemoryBucket;
    use std::io::Write;
    use tempfile::tempdir;

    fn options(part_size: u64) -> QueueOptions {
        QueueOptions {
            part_size,
            parallel_uploads: 4,
            retry_delay: Duration::from_millis(5),
            recheck_interval: Duration::from_millis(20),
            metadata: S3MetadataConfig {
                ip: true,
                username: true,
            },
        }
    }

    #[tokio::test]
    async fn test_rejects_missing_directory() {
        let dir = tempdir().unwrap();
        let result = UploadQueue::new(
            dir.path().join("missing"),
            Arc::new(InMemoryBucket::new()),
            options(16),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let dir = tempdir().unwrap();
        let bucket = InMemoryBucket::new();
        let queue = UploadQueue::new(dir.path(), Arc::new(bucket), options(16)).unwrap();

        let writer = queue.open_writer("abcd").unwrap();
        assert!(queue.open_writer("abcd").is_err());
        assert!(queue.open_writer("ab.cd").is_err());
        writer.close().unwrap();
        queue.shutdown(CancellationToken::new()).await;
    }

    #[tokio::test]
    async fn test_metadata_reaches_object() {
        let dir = tempdir().unwrap();
        let bucket = InMemoryBucket::new();
        let queue = UploadQueue::new(dir.path(), Arc::new(bucket.clone()), options(1024)).unwrap();

        let mut writer = queue.open_writer("abcd").unwrap();
        writer.set_metadata(1_600_000_000, "192.0.2.1", "DE", Some("foo"));
        assert!(dir.path().join("abcd.metadata.json").exists());
        writer.write_all(b"short session").unwrap();
        writer.close().unwrap();
        queue.shutdown(CancellationToken::new()).await;

        let metadata = bucket.object_metadata("abcd").unwrap();
        assert_eq!(metadata.get("timestamp").unwrap(), "1600000000");
        assert_eq!(metadata.get("ip").unwrap(), "192.0.2.1");
        assert_eq!(metadata.get("username").unwrap(), "foo");
        assert!(!dir.path().join("abcd.metadata.json").exists());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_dropped_writer_still_uploads() {
        let dir = tempdir().unwrap();
        let bucket = InMemoryBucket::new();
        let queue = UploadQueue::new(dir.path(), Arc::new(bucket.clone()), options(1024)).unwrap();

        let mut writer = queue.open_writer("abcd").unwrap();
        writer.write_all(b"data").unwrap();
        drop(writer);
        queue.shutdown(CancellationToken::new()).await;

        assert_eq!(bucket.object("abcd").unwrap(), Bytes::from_static(b"data"));
    }

    #[tokio::test]
    async fn test_recovered_entry_with_sidecar() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("beef"), b"left over").unwrap();
        EntryMetadata {
            start_time: 42,
            ip: "192.0.2.1".to_string(),
            country: "XX".to_string(),
            username: None,
        }
        .store(&EntryMetadata::sidecar_path(dir.path(), "beef"))
        .unwrap();
        fs::write(dir.path().join(".hidden"), b"ignored").unwrap();
        fs::write(dir.path().join("empty"), b"").unwrap();

        let bucket = InMemoryBucket::new();
        let queue = UploadQueue::new(dir.path(), Arc::new(bucket.clone()), options(1024)).unwrap();
        queue.shutdown(CancellationToken::new()).await;

        assert_eq!(bucket.object_count(), 1);
        assert_eq!(bucket.object("beef").unwrap(), Bytes::from_static(b"left over"));
        assert_eq!(bucket.object_metadata("beef").unwrap().get("timestamp").unwrap(), "42");
        assert!(dir.path().join(".hidden").exists());
        assert!(dir.path().join("empty").exists());
    }

    #[tokio::test]
    async fn test_open_entry_left_on_disk_at_deadline() {
        let dir = tempdir().unwrap();
        let bucket = InMemoryBucket::new();
        let queue = UploadQueue::new(dir.path(), Arc::new(bucket.clone()), options(1024)).unwrap();

        let mut writer = queue.open_writer("abcd").unwrap();
        writer.write_all(b"still running").unwrap();

        let deadline = CancellationToken::new();
        deadline.cancel();
        queue.shutdown(deadline).await;

        assert!(queue.is_empty());
        assert!(dir.path().join("abcd").exists());
        assert_eq!(bucket.object_count(), 0);
        drop(writer);
    }
}
