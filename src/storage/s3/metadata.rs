// src/storage/s3/metadata.rs
//! Connection metadata of queued audit logs
//!
//! The latest metadata is kept next to the audit log in
//! `<name>.metadata.json` so uploads resumed after a restart still carry it.

use crate::utils::errors::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

const SIDECAR_SUFFIX: &str = ".metadata.json";

/// Metadata attached to an uploaded audit log
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    /// Connection start, Unix seconds
    pub start_time: i64,
    pub ip: String,
    pub country: String,
    pub username: Option<String>,
}

impl EntryMetadata {
    /// Object metadata sent to the bucket
    pub fn to_object_metadata(&self, include_ip: bool, include_username: bool) -> HashMap<String, String> {
        let mut metadata = HashMap::new();
        metadata.insert("timestamp".to_string(), self.start_time.to_string());
        if !self.country.is_empty() {
            metadata.insert("country".to_string(), self.country.clone());
        }
        if include_ip && !self.ip.is_empty() {
            metadata.insert("ip".to_string(), self.ip.clone());
        }
        if include_username {
            if let Some(username) = &self.username {
                metadata.insert("username".to_string(), username.clone());
            }
        }
        metadata
    }

    pub fn sidecar_path(directory: &Path, name: &str) -> PathBuf {
        directory.join(format!("{}{}", name, SIDECAR_SUFFIX))
    }

    /// Read a sidecar, `None` when there is none
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match fs::read(path) {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Write the sidecar through a temporary file
    pub fn store(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec(self).map_err(|e| AuditError::Storage(e.to_string()))?;
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample() -> EntryMetadata {
        EntryMetadata {
            start_time: 1_600_000_000,
            ip: "192.0.2.1".to_string(),
            country: "DE".to_string(),
            username: Some("foo".to_string()),
        }
    }

    #[test]
    fn test_object_metadata_flags() {
        let metadata = sample().to_object_metadata(false, false);
        assert_eq!(metadata.get("timestamp").unwrap(), "1600000000");
        assert_eq!(metadata.get("country").unwrap(), "DE");
        assert!(!metadata.contains_key("ip"));
        assert!(!metadata.contains_key("username"));

        let metadata = sample().to_object_metadata(true, true);
        assert_eq!(metadata.get("ip").unwrap(), "192.0.2.1");
        assert_eq!(metadata.get("username").unwrap(), "foo");
    }

    #[test]
    fn test_sidecar_roundtrip() {
        let dir = tempdir().unwrap();
        let path = EntryMetadata::sidecar_path(dir.path(), "abcd");
        assert_eq!(path.file_name().unwrap(), "abcd.metadata.json");
        assert_eq!(EntryMetadata::load(&path).unwrap(), None);

        sample().store(&path).unwrap();
        assert_eq!(EntryMetadata::load(&path).unwrap(), Some(sample()));
    }
}
