// src/utils/config.rs
//! Audit log configuration
//!
//! Configuration is loaded with the `config` crate from an optional file
//! (YAML, TOML or JSON, picked by extension) with `SSHAUDIT__*` environment
//! overrides layered on top. Only the section of the selected storage
//! backend is validated.

use crate::utils::errors::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Minimum part size accepted by S3-compatible object stores (5 MiB)
pub const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// Default number of concurrent uploads
pub const DEFAULT_PARALLEL_UPLOADS: usize = 20;

/// Audit log encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    /// Consume events without writing anything
    #[default]
    None,
    /// zstd-compressed record stream with a versioned header
    Binary,
    /// Asciicast v2 terminal recording
    Asciinema,
}

/// Audit log storage backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Discard everything
    #[default]
    None,
    /// Local directory
    File,
    /// S3-compatible object storage with a local staging directory
    S3,
}

/// Top-level audit log configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub format: Format,
    pub storage: StorageKind,
    pub intercept: InterceptConfig,
    pub file: FileConfig,
    pub s3: S3Config,
}

/// Which parts of a session are recorded
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptConfig {
    /// Record the standard input sent by the user
    pub stdin: bool,
    /// Record the standard output sent to the user
    pub stdout: bool,
    /// Record the standard error sent to the user
    pub stderr: bool,
    /// Record passwords of authentication attempts
    pub passwords: bool,
}

impl InterceptConfig {
    /// Intercept everything
    pub fn all() -> Self {
        Self {
            stdin: true,
            stdout: true,
            stderr: true,
            passwords: true,
        }
    }
}

/// Local directory storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("/var/log/audit"),
        }
    }
}

impl FileConfig {
    pub fn validate(&self) -> Result<()> {
        validate_directory("audit log directory", &self.directory)
    }
}

/// Which connection metadata is attached to uploaded objects
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct S3MetadataConfig {
    pub ip: bool,
    pub username: bool,
}

/// S3-compatible object storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Local staging directory for audit logs awaiting upload
    pub local: PathBuf,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: String,
    /// Custom endpoint for non-AWS object stores
    pub endpoint: Option<String>,
    /// PEM encoded CA certificate for the endpoint, rejected by
    /// [`S3Config::validate`] since the bucket client only trusts system roots
    pub ca_cert: Option<String>,
    /// Canned ACL applied to uploaded objects
    pub acl: Option<String>,
    pub path_style_access: bool,
    pub upload_part_size: u64,
    pub parallel_uploads: usize,
    pub metadata: S3MetadataConfig,
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            local: PathBuf::from("/var/lib/audit"),
            access_key: String::new(),
            secret_key: String::new(),
            bucket: String::new(),
            region: String::new(),
            endpoint: None,
            ca_cert: None,
            acl: None,
            path_style_access: false,
            upload_part_size: MIN_PART_SIZE,
            parallel_uploads: DEFAULT_PARALLEL_UPLOADS,
            metadata: S3MetadataConfig::default(),
        }
    }
}

impl S3Config {
    pub fn validate(&self) -> Result<()> {
        validate_directory("local directory", &self.local)?;
        if self.access_key.is_empty() {
            return Err(AuditError::Config("no access key provided".to_string()));
        }
        if self.secret_key.is_empty() {
            return Err(AuditError::Config("no secret key provided".to_string()));
        }
        if self.bucket.is_empty() {
            return Err(AuditError::Config("no bucket name provided".to_string()));
        }
        if self.region.is_empty() {
            return Err(AuditError::Config("no region name provided".to_string()));
        }
        if self.upload_part_size < MIN_PART_SIZE {
            return Err(AuditError::Config(format!(
                "upload part size too low {} (minimum 5 MB)",
                self.upload_part_size
            )));
        }
        if self.parallel_uploads < 1 {
            return Err(AuditError::Config(format!(
                "parallel uploads invalid: {} (must be positive)",
                self.parallel_uploads
            )));
        }
        if self.ca_cert.is_some() {
            return Err(AuditError::Config(
                "custom CA certificates are not supported, remove ca_cert to use the system roots"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl AuditConfig {
    /// Load configuration from a file with environment overrides
    pub fn load<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.as_ref()).required(true));
        }
        let loaded = builder
            .add_source(config::Environment::with_prefix("SSHAUDIT").separator("__"))
            .build()?;
        Ok(loaded.try_deserialize()?)
    }

    /// Validate the sections relevant to the selected backend
    pub fn validate(&self) -> Result<()> {
        match self.storage {
            StorageKind::None => Ok(()),
            StorageKind::File => self.file.validate(),
            StorageKind::S3 => self.s3.validate(),
        }
    }
}

fn validate_directory(what: &str, dir: &Path) -> Result<()> {
    if dir.as_os_str().is_empty() {
        return Err(AuditError::Config(format!("empty {} provided", what)));
    }
    let stat = std::fs::metadata(dir).map_err(|e| {
        AuditError::Config(format!("invalid {}: {} ({})", what, dir.display(), e))
    })?;
    if !stat.is_dir() {
        return Err(AuditError::Config(format!(
            "invalid {}: {} (not a directory)",
            what,
            dir.display()
        )));
    }
    Ok(())
}
