// src/recording/metadata.rs
//! Connection metadata forwarded to storage sinks while encoding

use crate::geoip::{GeoIpLookup, UNKNOWN_COUNTRY};
use crate::message::{Event, EventType, Payload};
use crate::storage::StorageWriter;
use std::net::IpAddr;

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Tracks start time, source address and username of one connection
///
/// The sink is told about the metadata on connect and again whenever a
/// username becomes known, so it can index the audit log before the
/// connection ends.
#[derive(Debug, Clone)]
pub(crate) struct MetadataTracker {
    start_time: i64,
    ip: String,
    country: String,
    username: Option<String>,
}

impl MetadataTracker {
    pub fn new() -> Self {
        Self {
            start_time: 0,
            ip: String::new(),
            country: UNKNOWN_COUNTRY.to_string(),
            username: None,
        }
    }

    /// Timestamp of the first event in nanoseconds, 0 before any event
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn observe(&mut self, event: &Event, geoip: &dyn GeoIpLookup, sink: &mut dyn StorageWriter) {
        if self.start_time == 0 {
            self.start_time = event.timestamp;
        }

        let updated = match (event.event_type, &event.payload) {
            (EventType::Connect, Some(Payload::Connect(payload))) => {
                self.ip = payload.remote_addr.clone();
                self.country = if !payload.country.is_empty() {
                    payload.country.clone()
                } else {
                    match payload.remote_addr.parse::<IpAddr>() {
                        Ok(ip) => geoip.lookup(ip),
                        Err(_) => UNKNOWN_COUNTRY.to_string(),
                    }
                };
                true
            }
            (EventType::AuthPasswordSuccessful, Some(Payload::AuthPassword(payload))) => {
                self.username = Some(payload.username.clone());
                true
            }
            (EventType::AuthPubKeySuccessful, Some(Payload::AuthPubKey(payload))) => {
                self.username = Some(payload.username.clone());
                true
            }
            (EventType::HandshakeSuccessful, Some(Payload::HandshakeSuccessful(payload))) => {
                self.username = Some(payload.username.clone());
                true
            }
            _ => false,
        };

        if updated {
            sink.set_metadata(
                self.start_time / NANOS_PER_SECOND,
                &self.ip,
                &self.country,
                self.username.as_deref(),
            );
        }
    }
}
