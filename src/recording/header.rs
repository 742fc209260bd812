// src/recording/header.rs
//! File format header of binary audit logs
//!
//! A fixed 32-byte magic token (ASCII, zero padded) followed by the format
//! version as a little-endian `u64`. The header is written uncompressed in
//! front of the zstd body.

use crate::utils::errors::{AuditError, Result};
use std::io::{Read, Write};

pub const FILE_FORMAT: &str = "SSHAudit-Auditlog";
pub const FILE_FORMAT_LENGTH: usize = 32;
pub const HEADER_LENGTH: usize = FILE_FORMAT_LENGTH + 8;
pub const CURRENT_VERSION: u64 = 1;

fn magic() -> [u8; FILE_FORMAT_LENGTH] {
    let mut bytes = [0u8; FILE_FORMAT_LENGTH];
    bytes[..FILE_FORMAT.len()].copy_from_slice(FILE_FORMAT.as_bytes());
    bytes
}

/// Header bytes for `version`
pub fn header_bytes(version: u64) -> [u8; HEADER_LENGTH] {
    let mut bytes = [0u8; HEADER_LENGTH];
    bytes[..FILE_FORMAT_LENGTH].copy_from_slice(&magic());
    bytes[FILE_FORMAT_LENGTH..].copy_from_slice(&version.to_le_bytes());
    bytes
}

pub fn write_header<W: Write + ?Sized>(writer: &mut W, version: u64) -> Result<()> {
    writer
        .write_all(&header_bytes(version))
        .map_err(|e| AuditError::Encode(format!("failed to write file format header: {}", e)))
}

/// Read and validate the header, returning the file's version
pub fn read_header<R: Read + ?Sized>(reader: &mut R, max_version: u64) -> Result<u64> {
    let mut bytes = [0u8; HEADER_LENGTH];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| AuditError::Decode(format!("failed to read file format header: {}", e)))?;

    if bytes[..FILE_FORMAT_LENGTH] != magic() {
        return Err(AuditError::InvalidHeader(bytes[..FILE_FORMAT_LENGTH].to_vec()));
    }

    let mut version = [0u8; 8];
    version.copy_from_slice(&bytes[FILE_FORMAT_LENGTH..]);
    let version = u64::from_le_bytes(version);
    if version > max_version {
        return Err(AuditError::UnsupportedVersion {
            found: version,
            supported: max_version,
        });
    }
    Ok(version)
}
