// src/recording/decoder.rs
//! Binary audit log decoder
//!
//! Decoding runs on the blocking pool and streams results over two
//! channels. A bad header, a corrupt compressed stream or a body that is not
//! a CBOR record array ends decoding. A record with an unknown type or a
//! malformed payload is reported and skipped. A body ending without the
//! break byte yields every whole record before the cut.

use crate::message::{Event, EventRecord};
use crate::recording::binary::{RECORDS_END, RECORDS_START};
use crate::recording::compressor::Compressor;
use crate::recording::header::{read_header, CURRENT_VERSION};
use crate::recording::Decoder;
use crate::utils::errors::{AuditError, Result};
use std::io::{BufRead, BufReader, Read};
use tokio::sync::mpsc;
use tracing::debug;

/// Decoder for the binary audit log format
#[derive(Debug, Clone, Copy)]
pub struct BinaryDecoder {
    max_version: u64,
}

impl BinaryDecoder {
    pub fn new() -> Self {
        Self {
            max_version: CURRENT_VERSION,
        }
    }
}

impl Default for BinaryDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BinaryDecoder {
    fn decode(
        &self,
        reader: Box<dyn Read + Send>,
    ) -> (
        mpsc::UnboundedReceiver<Event>,
        mpsc::UnboundedReceiver<AuditError>,
    ) {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (error_tx, errors) = mpsc::unbounded_channel();
        let max_version = self.max_version;

        tokio::task::spawn_blocking(move || {
            if let Err(e) = decode_stream(reader, max_version, &event_tx, &error_tx) {
                let _ = error_tx.send(e);
            }
        });

        (events, errors)
    }
}

fn decode_stream(
    mut reader: Box<dyn Read + Send>,
    max_version: u64,
    events: &mpsc::UnboundedSender<Event>,
    errors: &mpsc::UnboundedSender<AuditError>,
) -> Result<()> {
    let version = read_header(&mut reader, max_version)?;
    debug!(version, "Decoding binary audit log");

    let mut body = BufReader::new(Compressor::reader(reader)?);
    match next_byte(&mut body)? {
        Some(RECORDS_START) => {}
        None => return Ok(()),
        Some(other) => {
            return Err(AuditError::Decode(format!(
                "expected record array, found initial byte {:#04x}",
                other
            )))
        }
    }

    loop {
        match peek_byte(&mut body)? {
            Some(RECORDS_END) | None => break,
            Some(_) => {}
        }
        let value: ciborium::Value = ciborium::from_reader(&mut body)
            .map_err(|e| AuditError::Decode(format!("failed to decode messages: {}", e)))?;

        let decoded = value
            .deserialized::<EventRecord>()
            .map_err(|e| AuditError::Decode(format!("invalid audit log message: {}", e)))
            .and_then(EventRecord::into_event);

        match decoded {
            Ok(event) => {
                if events.send(event).is_err() {
                    return Ok(());
                }
            }
            Err(e) => {
                let _ = errors.send(e);
            }
        }
    }
    Ok(())
}

fn peek_byte(reader: &mut impl BufRead) -> Result<Option<u8>> {
    Ok(reader.fill_buf()?.first().copied())
}

fn next_byte(reader: &mut impl BufRead) -> Result<Option<u8>> {
    let byte = peek_byte(reader)?;
    if byte.is_some() {
        reader.consume(1);
    }
    Ok(byte)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ConnectionId, EventType};
    use crate::recording::header::header_bytes;
    use crate::recording::collect;
    use std::io::Write;

    fn encode_raw(records: &[serde_json::Value]) -> Vec<u8> {
        let mut out = header_bytes(CURRENT_VERSION).to_vec();
        let mut stream = Compressor::default().writer(Vec::new()).unwrap();
        stream.write_all(&[RECORDS_START]).unwrap();
        for record in records {
            ciborium::into_writer(record, &mut stream).unwrap();
        }
        stream.write_all(&[RECORDS_END]).unwrap();
        out.extend(stream.finish().unwrap());
        out
    }

    #[tokio::test]
    async fn test_unknown_type_is_reported_and_skipped() {
        let id = ConnectionId::new(b"asdf".to_vec());
        let data = encode_raw(&[
            serde_json::json!({"connectionId": "YXNkZg==", "timestamp": 1, "type": 0,
                "payload": {"remoteAddr": "127.0.0.1", "country": "XX"}}),
            serde_json::json!({"connectionId": "YXNkZg==", "timestamp": 2, "type": 9999}),
            serde_json::json!({"connectionId": "YXNkZg==", "timestamp": 3, "type": 1}),
        ]);

        let (events, errors) = BinaryDecoder::new().decode(Box::new(std::io::Cursor::new(data)));
        let (events, errors) = collect(events, errors).await;

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].connection_id, id);
        assert_eq!(events[0].event_type, EventType::Connect);
        assert_eq!(events[1].event_type, EventType::Disconnect);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], AuditError::UnknownEventType(9999)));
    }

    #[tokio::test]
    async fn test_bad_header_aborts() {
        let mut data = encode_raw(&[]);
        data[0] = b'x';
        let (events, errors) = BinaryDecoder::new().decode(Box::new(std::io::Cursor::new(data)));
        let (events, errors) = collect(events, errors).await;
        assert!(events.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], AuditError::InvalidHeader(_)));
    }

    #[tokio::test]
    async fn test_newer_version_is_rejected() {
        let mut data = header_bytes(CURRENT_VERSION + 1).to_vec();
        data.write_all(b"ignored").unwrap();
        let (events, errors) = BinaryDecoder::new().decode(Box::new(std::io::Cursor::new(data)));
        let (events, errors) = collect(events, errors).await;
        assert!(events.is_empty());
        assert!(matches!(errors[0], AuditError::UnsupportedVersion { .. }));
    }

    #[tokio::test]
    async fn test_truncated_stream_keeps_decoded_prefix() {
        let record = serde_json::json!({"connectionId": "YXNkZg==", "timestamp": 1, "type": 1});
        let mut data = header_bytes(CURRENT_VERSION).to_vec();
        let mut stream = Compressor::default().writer(Vec::new()).unwrap();
        stream.write_all(&[RECORDS_START]).unwrap();
        ciborium::into_writer(&record, &mut stream).unwrap();
        stream.flush().unwrap();
        data.extend(stream.get_ref());

        let (events, errors) = BinaryDecoder::new().decode(Box::new(std::io::Cursor::new(data)));
        let (events, _errors) = collect(events, errors).await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_record_is_skipped() {
        let data = encode_raw(&[
            serde_json::json!({"connectionId": "YXNkZg==", "timestamp": "soon", "type": 0}),
            serde_json::json!({"connectionId": "YXNkZg==", "timestamp": 3, "type": 1}),
        ]);

        let (events, errors) = BinaryDecoder::new().decode(Box::new(std::io::Cursor::new(data)));
        let (events, errors) = collect(events, errors).await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::Disconnect);
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], AuditError::Decode(_)));
    }

    #[tokio::test]
    async fn test_body_without_record_array_is_rejected() {
        let mut data = header_bytes(CURRENT_VERSION).to_vec();
        let mut stream = Compressor::default().writer(Vec::new()).unwrap();
        ciborium::into_writer(&serde_json::json!({"type": 1}), &mut stream).unwrap();
        data.extend(stream.finish().unwrap());

        let (events, errors) = BinaryDecoder::new().decode(Box::new(std::io::Cursor::new(data)));
        let (events, errors) = collect(events, errors).await;
        assert!(events.is_empty());
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], AuditError::Decode(_)));
    }
}
