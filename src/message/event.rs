// src/message/event.rs
//! Event envelope and event type table

use crate::message::payload::*;
use crate::utils::errors::{AuditError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque connection identifier supplied by the SSH server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(#[serde(with = "base64_bytes")] pub Vec<u8>);

impl ConnectionId {
    pub fn new(id: impl Into<Vec<u8>>) -> Self {
        Self(id.into())
    }

    /// Hex form, used as the audit log artifact name
    pub fn hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.hex())
    }
}

/// Channel number within a connection, assigned in creation order from 0
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub u64);

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event types with their stable numeric codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum EventType {
    Connect = 0,
    Disconnect = 1,

    AuthPassword = 100,
    AuthPasswordSuccessful = 101,
    AuthPasswordFailed = 102,
    AuthPasswordBackendError = 103,
    AuthPubKey = 104,
    AuthPubKeySuccessful = 105,
    AuthPubKeyFailed = 106,
    AuthPubKeyBackendError = 107,
    HandshakeFailed = 198,
    HandshakeSuccessful = 199,

    GlobalRequestUnknown = 200,

    NewChannel = 300,
    NewChannelSuccessful = 301,
    NewChannelFailed = 302,
    Exit = 303,
    WriteClose = 304,
    Close = 305,

    ChannelRequestUnknownType = 400,
    ChannelRequestDecodeFailed = 401,
    ChannelRequestSetEnv = 402,
    ChannelRequestExec = 403,
    ChannelRequestPty = 404,
    ChannelRequestShell = 405,
    ChannelRequestSignal = 406,
    ChannelRequestSubsystem = 407,
    ChannelRequestWindow = 408,
    RequestFailed = 409,

    Io = 500,
}

impl EventType {
    pub const ALL: [EventType; 30] = [
        EventType::Connect,
        EventType::Disconnect,
        EventType::AuthPassword,
        EventType::AuthPasswordSuccessful,
        EventType::AuthPasswordFailed,
        EventType::AuthPasswordBackendError,
        EventType::AuthPubKey,
        EventType::AuthPubKeySuccessful,
        EventType::AuthPubKeyFailed,
        EventType::AuthPubKeyBackendError,
        EventType::HandshakeFailed,
        EventType::HandshakeSuccessful,
        EventType::GlobalRequestUnknown,
        EventType::NewChannel,
        EventType::NewChannelSuccessful,
        EventType::NewChannelFailed,
        EventType::Exit,
        EventType::WriteClose,
        EventType::Close,
        EventType::ChannelRequestUnknownType,
        EventType::ChannelRequestDecodeFailed,
        EventType::ChannelRequestSetEnv,
        EventType::ChannelRequestExec,
        EventType::ChannelRequestPty,
        EventType::ChannelRequestShell,
        EventType::ChannelRequestSignal,
        EventType::ChannelRequestSubsystem,
        EventType::ChannelRequestWindow,
        EventType::RequestFailed,
        EventType::Io,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<EventType> {
        Self::ALL.iter().copied().find(|t| t.code() == code)
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            EventType::Connect => "connect",
            EventType::Disconnect => "disconnect",
            EventType::AuthPassword => "auth_password",
            EventType::AuthPasswordSuccessful => "auth_password_successful",
            EventType::AuthPasswordFailed => "auth_password_failed",
            EventType::AuthPasswordBackendError => "auth_password_backend_error",
            EventType::AuthPubKey => "auth_pubkey",
            EventType::AuthPubKeySuccessful => "auth_pubkey_successful",
            EventType::AuthPubKeyFailed => "auth_pubkey_failed",
            EventType::AuthPubKeyBackendError => "auth_pubkey_backend_error",
            EventType::HandshakeFailed => "handshake_failed",
            EventType::HandshakeSuccessful => "handshake_successful",
            EventType::GlobalRequestUnknown => "global_request_unknown",
            EventType::NewChannel => "new_channel",
            EventType::NewChannelSuccessful => "new_channel_successful",
            EventType::NewChannelFailed => "new_channel_failed",
            EventType::Exit => "exit",
            EventType::WriteClose => "write_close",
            EventType::Close => "close",
            EventType::ChannelRequestUnknownType => "channel_request_unknown",
            EventType::ChannelRequestDecodeFailed => "channel_request_decode_failed",
            EventType::ChannelRequestSetEnv => "setenv",
            EventType::ChannelRequestExec => "exec",
            EventType::ChannelRequestPty => "pty",
            EventType::ChannelRequestShell => "shell",
            EventType::ChannelRequestSignal => "signal",
            EventType::ChannelRequestSubsystem => "subsystem",
            EventType::ChannelRequestWindow => "window",
            EventType::RequestFailed => "request_failed",
            EventType::Io => "io",
        }
    }

    /// Name of a raw code, `invalid` when the code is not known
    pub fn name_of(code: i32) -> &'static str {
        Self::from_code(code).map_or("invalid", EventType::name)
    }

    /// Decode the generic payload map into the shape this type carries
    pub fn decode_payload(self, value: Option<serde_json::Value>) -> Result<Option<Payload>> {
        fn shape<T: serde::de::DeserializeOwned>(
            value: Option<serde_json::Value>,
            wrap: fn(T) -> Payload,
        ) -> Result<Option<Payload>> {
            match value {
                Some(v) if !v.is_null() => Ok(Some(wrap(serde_json::from_value(v)?))),
                _ => Ok(None),
            }
        }

        match self {
            EventType::Disconnect | EventType::WriteClose | EventType::Close => Ok(None),
            EventType::Connect => shape(value, Payload::Connect),
            EventType::AuthPassword
            | EventType::AuthPasswordSuccessful
            | EventType::AuthPasswordFailed => shape(value, Payload::AuthPassword),
            EventType::AuthPasswordBackendError => shape(value, Payload::AuthPasswordBackendError),
            EventType::AuthPubKey
            | EventType::AuthPubKeySuccessful
            | EventType::AuthPubKeyFailed => shape(value, Payload::AuthPubKey),
            EventType::AuthPubKeyBackendError => shape(value, Payload::AuthPubKeyBackendError),
            EventType::HandshakeFailed => shape(value, Payload::HandshakeFailed),
            EventType::HandshakeSuccessful => shape(value, Payload::HandshakeSuccessful),
            EventType::GlobalRequestUnknown => shape(value, Payload::GlobalRequestUnknown),
            EventType::NewChannel => shape(value, Payload::NewChannel),
            EventType::NewChannelSuccessful => shape(value, Payload::NewChannelSuccessful),
            EventType::NewChannelFailed => shape(value, Payload::NewChannelFailed),
            EventType::Exit => shape(value, Payload::Exit),
            EventType::ChannelRequestUnknownType => shape(value, Payload::ChannelRequestUnknownType),
            EventType::ChannelRequestDecodeFailed => {
                shape(value, Payload::ChannelRequestDecodeFailed)
            }
            EventType::ChannelRequestSetEnv => shape(value, Payload::ChannelRequestSetEnv),
            EventType::ChannelRequestExec => shape(value, Payload::ChannelRequestExec),
            EventType::ChannelRequestPty => shape(value, Payload::ChannelRequestPty),
            EventType::ChannelRequestShell => shape(value, Payload::ChannelRequestShell),
            EventType::ChannelRequestSignal => shape(value, Payload::ChannelRequestSignal),
            EventType::ChannelRequestSubsystem => shape(value, Payload::ChannelRequestSubsystem),
            EventType::ChannelRequestWindow => shape(value, Payload::ChannelRequestWindow),
            EventType::RequestFailed => shape(value, Payload::RequestFailed),
            EventType::Io => shape(value, Payload::Io),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One audit log event
///
/// Two events are equal when connection id, timestamp, type and channel id
/// match and the payloads are either both absent or structurally equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub connection_id: ConnectionId,
    /// Unix timestamp in nanoseconds
    pub timestamp: i64,
    pub event_type: EventType,
    pub payload: Option<Payload>,
    /// Absent for connection-level events
    pub channel_id: Option<ChannelId>,
}

impl Event {
    /// Build an event stamped with the current wall-clock time
    pub fn now(
        connection_id: ConnectionId,
        event_type: EventType,
        payload: Option<Payload>,
        channel_id: Option<ChannelId>,
    ) -> Self {
        Self {
            connection_id,
            timestamp: now_nanos(),
            event_type,
            payload,
            channel_id,
        }
    }

    /// Convert into the self-describing record stored in binary audit logs
    pub fn to_record(&self) -> Result<EventRecord> {
        let payload = match &self.payload {
            Some(p) => Some(
                p.to_value()
                    .map_err(|e| AuditError::Encode(e.to_string()))?,
            ),
            None => None,
        };
        Ok(EventRecord {
            connection_id: self.connection_id.clone(),
            timestamp: self.timestamp,
            event_type: self.event_type.code(),
            payload,
            channel_id: self.channel_id,
        })
    }
}

/// Wire form of an event with the payload kept as a generic map
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    pub connection_id: ConnectionId,
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub event_type: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<ChannelId>,
}

impl EventRecord {
    /// Reconstruct the typed event, failing on unknown types or bad payloads
    pub fn into_event(self) -> Result<Event> {
        let event_type = EventType::from_code(self.event_type)
            .ok_or(AuditError::UnknownEventType(self.event_type))?;
        let payload = event_type.decode_payload(self.payload)?;
        Ok(Event {
            connection_id: self.connection_id,
            timestamp: self.timestamp,
            event_type,
            payload,
            channel_id: self.channel_id,
        })
    }
}

/// Current wall-clock time as Unix nanoseconds
pub fn now_nanos() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exit_event(status: u32) -> Event {
        Event {
            connection_id: ConnectionId::new(b"asdf".to_vec()),
            timestamp: 42,
            event_type: EventType::Exit,
            payload: Some(Payload::Exit(PayloadExit {
                exit_status: status,
            })),
            channel_id: Some(ChannelId(0)),
        }
    }

    #[test]
    fn test_type_names() {
        assert_eq!(EventType::Connect.name(), "connect");
        assert_eq!(EventType::ChannelRequestSetEnv.name(), "setenv");
        assert_eq!(EventType::name_of(500), "io");
        assert_eq!(EventType::name_of(9999), "invalid");
    }

    #[test]
    fn test_codes_are_unique_and_resolvable() {
        for t in EventType::ALL {
            assert_eq!(EventType::from_code(t.code()), Some(t));
        }
        assert_eq!(EventType::from_code(-1), None);
    }

    #[test]
    fn test_event_equality() {
        assert_eq!(exit_event(0), exit_event(0));
        assert_ne!(exit_event(0), exit_event(1));

        let mut without_payload = exit_event(0);
        without_payload.payload = None;
        assert_ne!(exit_event(0), without_payload);

        let mut other_channel = exit_event(0);
        other_channel.channel_id = Some(ChannelId(1));
        assert_ne!(exit_event(0), other_channel);
    }

    #[test]
    fn test_record_conversion() {
        let event = exit_event(3);
        let record = event.to_record().unwrap();
        assert_eq!(record.event_type, 303);
        assert_eq!(record.payload.as_ref().unwrap()["exitStatus"], 3);
        assert_eq!(record.into_event().unwrap(), event);
    }

    #[test]
    fn test_record_without_channel_omits_field() {
        let event = Event {
            connection_id: ConnectionId::new(vec![1, 2]),
            timestamp: 1,
            event_type: EventType::Disconnect,
            payload: None,
            channel_id: None,
        };
        let json = serde_json::to_string(&event.to_record().unwrap()).unwrap();
        assert!(!json.contains("channelId"));
        assert!(!json.contains("payload"));
        assert!(json.contains("\"type\":1"));
    }

    #[test]
    fn test_unknown_type_is_an_error() {
        let record = EventRecord {
            connection_id: ConnectionId::new(vec![1]),
            timestamp: 1,
            event_type: 9999,
            payload: None,
            channel_id: None,
        };
        assert!(matches!(
            record.into_event(),
            Err(AuditError::UnknownEventType(9999))
        ));
    }

    #[test]
    fn test_connection_id_hex() {
        assert_eq!(ConnectionId::new(vec![0xab, 0x01]).hex(), "ab01");
    }
}
