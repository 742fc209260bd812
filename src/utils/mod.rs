// src/utils/mod.rs
//! Shared configuration and error types

pub mod config;
pub mod errors;

pub use config::{AuditConfig, Format, InterceptConfig, StorageKind};
pub use errors::{AuditError, Result};
