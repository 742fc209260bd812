// src/recording/compressor.rs
//! Streaming zstd compression for audit log bodies
//!
//! Records are compressed as they are produced so that an interrupted
//! connection still leaves a decodable prefix on the sink.

use crate::utils::errors::{AuditError, Result};
use std::io::{BufReader, Read, Write};
use tracing::debug;

/// Compression levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionLevel {
    /// Fast compression (level 1)
    Fast,

    /// Balanced (level 3)
    Balanced,

    /// Best compression (level 19)
    Best,
}

impl CompressionLevel {
    pub fn as_i32(&self) -> i32 {
        match self {
            CompressionLevel::Fast => 1,
            CompressionLevel::Balanced => 3,
            CompressionLevel::Best => 19,
        }
    }
}

/// Compressor using zstd
#[derive(Debug, Clone, Copy)]
pub struct Compressor {
    level: CompressionLevel,
}

impl Compressor {
    /// Create a new compressor
    pub fn new(level: CompressionLevel) -> Self {
        Self { level }
    }

    pub fn level(&self) -> CompressionLevel {
        self.level
    }

    /// Wrap `inner` in a compressing writer
    ///
    /// Call `finish()` on the returned writer to write the frame epilogue and
    /// get `inner` back.
    pub fn writer<W: Write>(&self, inner: W) -> Result<zstd::stream::write::Encoder<'static, W>> {
        let level = self.level.as_i32();
        debug!("Opening zstd stream at level {}", level);

        zstd::stream::write::Encoder::new(inner, level)
            .map_err(|e| AuditError::Encode(format!("failed to open zstd stream: {}", e)))
    }

    /// Wrap `inner` in a decompressing reader
    pub fn reader<R: Read>(inner: R) -> Result<zstd::stream::read::Decoder<'static, BufReader<R>>> {
        zstd::stream::read::Decoder::new(inner)
            .map_err(|e| AuditError::Decode(format!("failed to open zstd stream: {}", e)))
    }
}

impl Default for Compressor {
    fn default() -> Self {
        Self::new(CompressionLevel::Balanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_levels() {
        assert_eq!(CompressionLevel::Fast.as_i32(), 1);
        assert_eq!(CompressionLevel::Balanced.as_i32(), 3);
        assert_eq!(CompressionLevel::Best.as_i32(), 19);
    }

    #[test]
    fn test_stream_roundtrip() {
        let compressor = Compressor::default();
        let data = br#"{"connectionId":"YXNkZg==","timestamp":1,"type":0}"#.repeat(200);

        let mut writer = compressor.writer(Vec::new()).unwrap();
        for chunk in data.chunks(97) {
            writer.write_all(chunk).unwrap();
        }
        let compressed = writer.finish().unwrap();
        assert!(compressed.len() < data.len());

        let mut reader = Compressor::reader(compressed.as_slice()).unwrap();
        let mut decompressed = Vec::new();
        reader.read_to_end(&mut decompressed).unwrap();
        assert_eq!(decompressed, data);
    }

    #[test]
    fn test_levels_order_output_size() {
        let data = b"Test data for compression".repeat(100);
        let size = |level| {
            let mut w = Compressor::new(level).writer(Vec::new()).unwrap();
            w.write_all(&data).unwrap();
            w.finish().unwrap().len()
        };
        assert!(size(CompressionLevel::Best) <= size(CompressionLevel::Fast));
    }
}
