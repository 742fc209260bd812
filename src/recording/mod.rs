// src/recording/mod.rs
//! Audit log encoding and decoding
//!
//! Each connection's events are consumed by one [`Encoder`] task that
//! writes to a storage sink:
//!
//! - **Binary**: versioned header + zstd stream of one CBOR record array, decodable
//!   with [`BinaryDecoder`]
//! - **Asciinema**: asciicast v2 terminal recording
//! - **Discard**: consumes events, writes nothing
//!
//! # Architecture
//!
//! ```text
//! Connection/Channel → mpsc(1) → Encoder task → StorageWriter
//!                                    ↓
//!                           set_metadata(start, ip, country, user)
//! ```

pub mod asciinema;
pub mod binary;
pub mod compressor;
pub mod decoder;
pub mod discard;
pub mod header;
pub(crate) mod metadata;

use crate::codes;
use crate::geoip::GeoIpLookup;
use crate::message::Event;
use crate::storage::StorageWriter;
use crate::utils::config::Format;
use crate::utils::errors::{AuditError, Result};
use async_trait::async_trait;
use std::io::Read;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::error;

pub use asciinema::AsciinemaEncoder;
pub use binary::BinaryEncoder;
pub use compressor::{CompressionLevel, Compressor};
pub use decoder::BinaryDecoder;
pub use discard::DiscardEncoder;

/// Serializes the ordered event stream of one connection
#[async_trait]
pub trait Encoder: Send + Sync {
    /// Consume `events` until the channel closes or a disconnect event is
    /// seen, writing the encoded audit log to `sink`
    async fn encode(&self, events: mpsc::Receiver<Event>, sink: Box<dyn StorageWriter>)
        -> Result<()>;

    /// MIME type of the produced audit log
    fn mime_type(&self) -> &'static str;

    /// File extension of the produced audit log, including the dot
    fn file_extension(&self) -> &'static str;
}

/// Reconstructs events from an encoded audit log
pub trait Decoder: Send + Sync {
    /// Decode in the background, streaming events and per-record errors
    ///
    /// Both channels are closed when decoding completes.
    fn decode(
        &self,
        reader: Box<dyn Read + Send>,
    ) -> (
        mpsc::UnboundedReceiver<Event>,
        mpsc::UnboundedReceiver<AuditError>,
    );
}

/// Create the encoder for `format`
pub fn new_encoder(format: Format, geoip: Arc<dyn GeoIpLookup>) -> Arc<dyn Encoder> {
    match format {
        Format::None => Arc::new(DiscardEncoder::new()),
        Format::Binary => Arc::new(BinaryEncoder::new(geoip)),
        Format::Asciinema => Arc::new(AsciinemaEncoder::new(geoip)),
    }
}

/// Close the sink of a finished audit log
pub(crate) fn close_sink(sink: Box<dyn StorageWriter>) -> Result<()> {
    sink.close().map_err(|e| {
        error!(
            code = codes::E_AUDIT_LOG_STORAGE_CLOSE_FAILED,
            error = %e,
            "Failed to close audit log storage"
        );
        AuditError::Encode(format!("failed to close audit log: {}", e))
    })
}

/// Drain both decoder channels, preserving event order
pub async fn collect<T>(
    mut events: mpsc::UnboundedReceiver<T>,
    mut errors: mpsc::UnboundedReceiver<AuditError>,
) -> (Vec<T>, Vec<AuditError>) {
    let mut decoded = Vec::new();
    let mut failures = Vec::new();
    let mut events_open = true;
    let mut errors_open = true;

    while events_open || errors_open {
        tokio::select! {
            event = events.recv(), if events_open => match event {
                Some(event) => decoded.push(event),
                None => events_open = false,
            },
            error = errors.recv(), if errors_open => match error {
                Some(error) => failures.push(error),
                None => errors_open = false,
            },
        }
    }
    (decoded, failures)
}
