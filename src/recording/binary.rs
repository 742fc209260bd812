// src/recording/binary.rs
//! Binary audit log encoder
//!
//! Output layout: file format header, then a zstd stream holding one CBOR
//! indefinite-length array of event records. Records are written into the
//! compressor as they arrive; the array is closed and the stream finished
//! when the connection disconnects or the event channel closes. A log cut
//! short before the break byte still decodes up to its last whole record.

use crate::geoip::GeoIpLookup;
use crate::message::{Event, EventType};
use crate::recording::compressor::Compressor;
use crate::recording::header::{write_header, CURRENT_VERSION};
use crate::recording::metadata::MetadataTracker;
use crate::recording::{close_sink, Encoder};
use crate::storage::StorageWriter;
use crate::utils::errors::{AuditError, Result};
use async_trait::async_trait;
use std::io::Write;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// CBOR initial byte opening an indefinite-length array
pub(crate) const RECORDS_START: u8 = 0x9f;

/// CBOR break byte closing the record array
pub(crate) const RECORDS_END: u8 = 0xff;

/// Encoder for the binary audit log format
pub struct BinaryEncoder {
    geoip: Arc<dyn GeoIpLookup>,
    compressor: Compressor,
}

impl BinaryEncoder {
    pub fn new(geoip: Arc<dyn GeoIpLookup>) -> Self {
        Self::with_compressor(geoip, Compressor::default())
    }

    pub fn with_compressor(geoip: Arc<dyn GeoIpLookup>, compressor: Compressor) -> Self {
        Self { geoip, compressor }
    }
}

#[async_trait]
impl Encoder for BinaryEncoder {
    async fn encode(
        &self,
        mut events: mpsc::Receiver<Event>,
        mut sink: Box<dyn StorageWriter>,
    ) -> Result<()> {
        write_header(&mut sink, CURRENT_VERSION)?;
        let mut stream = self.compressor.writer(sink)?;
        stream.write_all(&[RECORDS_START])?;
        let mut metadata = MetadataTracker::new();
        let mut count = 0usize;

        while let Some(event) = events.recv().await {
            metadata.observe(&event, self.geoip.as_ref(), stream.get_mut().as_mut());

            let record = event.to_record()?;
            ciborium::into_writer(&record, &mut stream).map_err(|e| {
                AuditError::Encode(format!("failed to encode audit log message: {}", e))
            })?;
            count += 1;

            if event.event_type == EventType::Disconnect {
                break;
            }
        }

        stream.write_all(&[RECORDS_END])?;
        let sink = stream
            .finish()
            .map_err(|e| AuditError::Encode(format!("failed to flush audit log stream: {}", e)))?;
        close_sink(sink)?;

        debug!(records = count, "Binary audit log finished");
        Ok(())
    }

    fn mime_type(&self) -> &'static str {
        "application/octet-stream"
    }

    fn file_extension(&self) -> &'static str {
        ""
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geoip::StaticGeoIp;
    use crate::message::{ConnectionId, Payload, PayloadConnect};
    use crate::recording::decoder::BinaryDecoder;
    use crate::recording::header::HEADER_LENGTH;
    use crate::recording::{collect, Decoder};
    use parking_lot::Mutex;
    use std::io::{self, Cursor, Write};

    #[derive(Clone, Default)]
    struct SharedSink {
        data: Arc<Mutex<Vec<u8>>>,
        metadata_calls: Arc<Mutex<usize>>,
        closed: Arc<Mutex<bool>>,
    }

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl StorageWriter for SharedSink {
        fn set_metadata(&mut self, _: i64, _: &str, _: &str, _: Option<&str>) {
            *self.metadata_calls.lock() += 1;
        }

        fn close(self: Box<Self>) -> Result<()> {
            *self.closed.lock() = true;
            Ok(())
        }
    }

    fn event(timestamp: i64, event_type: EventType, payload: Option<Payload>) -> Event {
        Event {
            connection_id: ConnectionId::new(b"asdf".to_vec()),
            timestamp,
            event_type,
            payload,
            channel_id: None,
        }
    }

    #[tokio::test]
    async fn test_stops_at_disconnect() {
        let sink = SharedSink::default();
        let encoder = BinaryEncoder::new(Arc::new(StaticGeoIp::new()));
        let (tx, rx) = mpsc::channel(8);

        let connect = Payload::Connect(PayloadConnect {
            remote_addr: "127.0.0.1".to_string(),
            country: "XX".to_string(),
        });
        tx.send(event(1, EventType::Connect, Some(connect))).await.unwrap();
        tx.send(event(2, EventType::Disconnect, None)).await.unwrap();
        tx.send(event(3, EventType::Close, None)).await.unwrap();
        drop(tx);

        encoder.encode(rx, Box::new(sink.clone())).await.unwrap();
        assert!(*sink.closed.lock());
        assert_eq!(*sink.metadata_calls.lock(), 1);

        let data = sink.data.lock().clone();
        assert!(data.len() > HEADER_LENGTH);
        assert!(data.starts_with(b"SSHAudit-Auditlog"));

        let (events, errors) = BinaryDecoder::new().decode(Box::new(Cursor::new(data)));
        let (events, errors) = collect(events, errors).await;
        assert!(errors.is_empty());
        let types: Vec<_> = events.iter().map(|e| e.event_type).collect();
        assert_eq!(types, vec![EventType::Connect, EventType::Disconnect]);
    }

    #[tokio::test]
    async fn test_records_form_indefinite_cbor_array() {
        let sink = SharedSink::default();
        let encoder = BinaryEncoder::new(Arc::new(StaticGeoIp::new()));
        let (tx, rx) = mpsc::channel(8);
        tx.send(event(1, EventType::Close, None)).await.unwrap();
        tx.send(event(2, EventType::Disconnect, None)).await.unwrap();
        drop(tx);
        encoder.encode(rx, Box::new(sink.clone())).await.unwrap();

        let data = sink.data.lock().clone();
        let mut body = Vec::new();
        io::Read::read_to_end(
            &mut Compressor::reader(&data[HEADER_LENGTH..]).unwrap(),
            &mut body,
        )
        .unwrap();
        assert_eq!(body.first(), Some(&RECORDS_START));
        assert_eq!(body.last(), Some(&RECORDS_END));

        let array: ciborium::Value = ciborium::from_reader(&body[..]).unwrap();
        let records = array.as_array().unwrap();
        assert_eq!(records.len(), 2);
        let types: Vec<i32> = records
            .iter()
            .map(|record| {
                let record: crate::message::EventRecord = record.deserialized().unwrap();
                record.event_type
            })
            .collect();
        assert_eq!(types, vec![EventType::Close.code(), EventType::Disconnect.code()]);
    }

    #[tokio::test]
    async fn test_closed_channel_still_yields_valid_log() {
        let sink = SharedSink::default();
        let encoder = BinaryEncoder::new(Arc::new(StaticGeoIp::new()));
        let (tx, rx) = mpsc::channel(1);
        drop(tx);

        encoder.encode(rx, Box::new(sink.clone())).await.unwrap();
        assert!(*sink.closed.lock());
        assert_eq!(encoder.mime_type(), "application/octet-stream");
        assert_eq!(encoder.file_extension(), "");

        let data = sink.data.lock().clone();
        let (events, errors) = BinaryDecoder::new().decode(Box::new(Cursor::new(data)));
        let (events, errors) = collect(events, errors).await;
        assert!(events.is_empty());
        assert!(errors.is_empty());
    }
}
