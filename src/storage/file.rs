// src/storage/file.rs
//! Local directory storage
//!
//! Each audit log is one file named after the connection. The directory
//! cannot hold metadata, so `set_metadata` is ignored and listed entries
//! carry an empty metadata map.

use crate::storage::{is_audit_log_name, Entry, ReadableStorage, StorageWriter, WritableStorage};
use crate::utils::config::FileConfig;
use crate::utils::errors::{AuditError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const ACCESS_TEST_FILE: &str = ".accesstest";

/// Audit logs stored in a local directory
#[derive(Debug, Clone)]
pub struct FileStorage {
    directory: PathBuf,
}

impl FileStorage {
    /// Open the storage directory, checking that it is writable
    pub fn new(config: &FileConfig) -> Result<Self> {
        config.validate()?;

        fs::write(config.directory.join(ACCESS_TEST_FILE), b"").map_err(|e| {
            AuditError::Storage(format!(
                "failed to create file in audit log directory {} ({})",
                config.directory.display(),
                e
            ))
        })?;

        info!("File audit log storage initialized at {:?}", config.directory);

        Ok(Self {
            directory: config.directory.clone(),
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_of(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty() || name.contains('/') || name.contains('\\') || name == ".." {
            return Err(AuditError::Storage(format!("invalid audit log name: {:?}", name)));
        }
        Ok(self.directory.join(name))
    }
}

#[async_trait]
impl WritableStorage for FileStorage {
    fn open_writer(&self, name: &str) -> Result<Box<dyn StorageWriter>> {
        let path = self.path_of(name)?;
        let file = File::create(&path).map_err(|e| {
            AuditError::Storage(format!("failed to create audit log {}: {}", path.display(), e))
        })?;
        debug!("Opened audit log {}", path.display());
        Ok(Box::new(FileWriter { file }))
    }

    async fn shutdown(&self, _deadline: CancellationToken) {}
}

#[async_trait]
impl ReadableStorage for FileStorage {
    async fn open_reader(&self, name: &str) -> Result<Box<dyn Read + Send>> {
        let path = self.path_of(name)?;
        let file = tokio::fs::File::open(&path).await.map_err(|e| {
            AuditError::Storage(format!("failed to open audit log {}: {}", path.display(), e))
        })?;
        Ok(Box::new(file.into_std().await))
    }

    fn list(
        &self,
    ) -> (
        mpsc::UnboundedReceiver<Entry>,
        mpsc::UnboundedReceiver<AuditError>,
    ) {
        let (entry_tx, entries) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();
        let directory = self.directory.clone();

        tokio::task::spawn_blocking(move || {
            if let Err(e) = list_directory(&directory, &entry_tx) {
                let _ = error_tx.send(e);
            }
        });

        (entries, errors)
    }
}

fn list_directory(directory: &Path, entries: &mpsc::UnboundedSender<Entry>) -> Result<()> {
    for dir_entry in fs::read_dir(directory)? {
        let dir_entry = dir_entry?;
        let metadata = dir_entry.metadata()?;
        let name = dir_entry.file_name().to_string_lossy().into_owned();
        if metadata.is_file() && metadata.len() > 0 && is_audit_log_name(&name) {
            let entry = Entry {
                name,
                metadata: HashMap::new(),
            };
            if entries.send(entry).is_err() {
                break;
            }
        }
    }
    Ok(())
}

struct FileWriter {
    file: File,
}

impl Write for FileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl StorageWriter for FileWriter {
    fn set_metadata(&mut self, _start_time: i64, _ip: &str, _country: &str, _username: Option<&str>) {}

    fn close(mut self: Box<Self>) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}
