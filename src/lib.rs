// src/lib.rs
//! SSH Audit Log Library
//!
//! Records everything that happens on an SSH connection as an ordered
//! stream of typed events, encodes it into an audit log and moves the audit
//! log to durable storage.
//!
//! # Architecture
//!
//! - **message**: event types and payloads
//! - **recording**: binary, asciinema and discard encoders plus the binary decoder
//! - **storage**: none, local file and S3 backends; the S3 backend uploads
//!   audit logs while they are written and resumes after restarts
//! - **session**: connection and channel callbacks feeding the encoders
//! - **observability**: tracing setup for binaries
//! - **utils**: configuration and errors

// Public module exports
pub mod codes;
pub mod geoip;
pub mod message;
pub mod observability;
pub mod recording;
pub mod session;
pub mod storage;
pub mod utils;

// Re-export commonly used types
pub use geoip::{GeoIpLookup, StaticGeoIp};
pub use message::{ChannelId, ConnectionId, Event, EventType, Payload};
pub use recording::{new_encoder, Decoder, Encoder};
pub use session::{AuditLogger, Channel, Connection};
pub use storage::{ReadWriteStorage, ReadableStorage, StorageWriter, WritableStorage};
pub use utils::config::AuditConfig;
pub use utils::errors::{AuditError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Newest binary audit log format version this build reads and writes
pub const FORMAT_VERSION: u64 = recording::header::CURRENT_VERSION;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert_eq!(FORMAT_VERSION, 1);
    }
}
