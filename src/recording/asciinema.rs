// src/recording/asciinema.rs
//! Asciicast v2 terminal recordings
//!
//! Newline-delimited JSON: one header object followed by `[time, "o", data]`
//! output frames. The header collects terminal size and environment until
//! the command is known (exec, shell or subsystem request) or the first I/O
//! arrives, and is written exactly once. Standard input is never recorded
//! as frames.

use crate::geoip::GeoIpLookup;
use crate::message::{Event, EventType, Payload, Stream};
use crate::recording::metadata::MetadataTracker;
use crate::recording::{close_sink, Encoder};
use crate::storage::StorageWriter;
use crate::utils::errors::{AuditError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

const DEFAULT_COMMAND: &str = "/bin/sh";

/// Asciicast frame marker for output
pub const FRAME_OUTPUT: &str = "o";
/// Asciicast frame marker for input, never produced
pub const FRAME_INPUT: &str = "i";

/// Asciicast v2 header line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AsciicastHeader {
    pub version: u32,
    pub width: u32,
    pub height: u32,
    /// Unix timestamp of the first event in seconds
    pub timestamp: i64,
    pub command: String,
    pub title: String,
    pub env: BTreeMap<String, String>,
}

impl Default for AsciicastHeader {
    fn default() -> Self {
        Self {
            version: 2,
            width: 80,
            height: 25,
            timestamp: 0,
            command: String::new(),
            title: String::new(),
            env: BTreeMap::new(),
        }
    }
}

/// Encoder producing replayable terminal recordings
pub struct AsciinemaEncoder {
    geoip: Arc<dyn GeoIpLookup>,
}

impl AsciinemaEncoder {
    pub fn new(geoip: Arc<dyn GeoIpLookup>) -> Self {
        Self { geoip }
    }
}

struct Recording {
    header: AsciicastHeader,
    header_written: bool,
    start_time: i64,
}

impl Recording {
    fn write_line<T: Serialize + ?Sized>(sink: &mut dyn StorageWriter, value: &T, what: &str) -> Result<()> {
        let mut line = serde_json::to_vec(value)
            .map_err(|e| AuditError::Encode(format!("failed to marshal asciicast {}: {}", what, e)))?;
        line.push(b'\n');
        sink.write_all(&line)
            .map_err(|e| AuditError::Encode(format!("failed to write asciicast {}: {}", what, e)))
    }

    fn send_header(&mut self, sink: &mut dyn StorageWriter, command: &str) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        self.header.command = command.to_string();
        Self::write_line(sink, &self.header, "header")?;
        self.header_written = true;
        Ok(())
    }

    fn handle(&mut self, event: &Event, sink: &mut dyn StorageWriter) -> Result<()> {
        match &event.payload {
            Some(Payload::ChannelRequestSetEnv(p)) if !self.header_written => {
                self.header.env.insert(p.name.clone(), p.value.clone());
            }
            Some(Payload::ChannelRequestPty(p)) if !self.header_written => {
                self.header.width = p.columns;
                self.header.height = p.rows;
            }
            Some(Payload::ChannelRequestExec(p)) => self.send_header(sink, &p.program)?,
            Some(Payload::ChannelRequestShell(_)) | Some(Payload::ChannelRequestSubsystem(_)) => {
                self.send_header(sink, DEFAULT_COMMAND)?
            }
            Some(Payload::Io(p)) => {
                self.send_header(sink, DEFAULT_COMMAND)?;
                if matches!(p.stream, Stream::Stdout | Stream::Stderr) {
                    let time = (event.timestamp - self.start_time) as f64 / 1_000_000_000.0;
                    let data = String::from_utf8_lossy(&p.data);
                    Self::write_line(sink, &(time, FRAME_OUTPUT, data.as_ref()), "frame")?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Encoder for AsciinemaEncoder {
    async fn encode(
        &self,
        mut events: mpsc::Receiver<Event>,
        mut sink: Box<dyn StorageWriter>,
    ) -> Result<()> {
        let mut metadata = MetadataTracker::new();
        let mut recording = Recording {
            header: AsciicastHeader::default(),
            header_written: false,
            start_time: 0,
        };

        while let Some(event) = events.recv().await {
            if recording.start_time == 0 {
                recording.start_time = event.timestamp;
                recording.header.timestamp = event.timestamp / 1_000_000_000;
            }
            metadata.observe(&event, self.geoip.as_ref(), sink.as_mut());
            recording.handle(&event, sink.as_mut())?;

            if event.event_type == EventType::Disconnect {
                break;
            }
        }

        sink.flush()
            .map_err(|e| AuditError::Encode(format!("failed to flush asciicast: {}", e)))?;
        close_sink(sink)?;

        debug!(header_written = recording.header_written, "Asciicast recording finished");
        Ok(())
    }

    fn mime_type(&self) -> &'static str {
        "application/x-asciicast"
    }

    fn file_extension(&self) -> &'static str {
        ".cast"
    }
}
