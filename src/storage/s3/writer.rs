// src/storage/s3/writer.rs
//! Sink that appends to a queued local audit log

use crate::codes;
use crate::storage::s3::queue::QueueEntry;
use crate::storage::StorageWriter;
use crate::utils::errors::Result;
use std::fs::File;
use std::io::{self, Write};
use std::sync::Arc;
use tracing::warn;

/// Appends to the staging file and wakes the upload task on every write
///
/// Dropping the writer without `close` still marks the audit log finished so
/// the upload task can complete it.
pub(crate) struct QueueWriter {
    entry: Arc<QueueEntry>,
    file: File,
    closed: bool,
}

impl QueueWriter {
    pub fn new(entry: Arc<QueueEntry>, file: File) -> Self {
        Self {
            entry,
            file,
            closed: false,
        }
    }
}

impl Write for QueueWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.file.write(buf)?;
        self.entry.part_available.notify_one();
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl StorageWriter for QueueWriter {
    fn set_metadata(&mut self, start_time: i64, ip: &str, country: &str, username: Option<&str>) {
        let snapshot = {
            let mut metadata = self.entry.metadata.lock();
            metadata.start_time = start_time;
            metadata.ip = ip.to_string();
            metadata.country = country.to_string();
            metadata.username = username.map(str::to_string);
            metadata.clone()
        };
        if self.entry.is_released() {
            return;
        }
        if let Err(e) = snapshot.store(&self.entry.sidecar) {
            warn!(
                code = codes::E_FAILED_WRITING_METADATA_FILE,
                name = %self.entry.name,
                error = %e,
                "Failed to write audit log metadata file"
            );
        }
    }

    fn close(mut self: Box<Self>) -> Result<()> {
        let flushed = self.file.flush().and_then(|_| self.file.sync_data());
        self.closed = true;
        self.entry.finish();
        flushed?;
        Ok(())
    }
}

impl Drop for QueueWriter {
    fn drop(&mut self) {
        if !self.closed {
            self.entry.finish();
        }
    }
}
