// src/message/payload.rs
//! Event payloads
//!
//! One struct per payload shape. Several event types share a shape (all
//! password authentication events carry a [`PayloadAuthPassword`]), so the
//! [`Payload`] enum is keyed by shape and the event type travels next to it
//! in the [`Event`](super::Event) envelope.

use serde::{Deserialize, Serialize};

/// Serialize byte fields as base64 strings inside the generic payload map
pub(crate) mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Payload of a connect event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadConnect {
    /// IP address of the connecting user
    pub remote_addr: String,
    /// Country code of the remote address, `XX` if the lookup failed
    pub country: String,
}

/// Password authentication attempt, success or failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadAuthPassword {
    pub username: String,
    #[serde(with = "base64_bytes")]
    pub password: Vec<u8>,
}

/// The authentication backend failed during password verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadAuthPasswordBackendError {
    pub username: String,
    #[serde(with = "base64_bytes")]
    pub password: Vec<u8>,
    pub reason: String,
}

/// Public key authentication attempt, success or failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadAuthPubKey {
    pub username: String,
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
}

/// The authentication backend failed during public key verification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadAuthPubKeyBackendError {
    pub username: String,
    #[serde(with = "base64_bytes")]
    pub key: Vec<u8>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadHandshakeFailed {
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadHandshakeSuccessful {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadGlobalRequestUnknown {
    pub request_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadNewChannel {
    pub channel_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadNewChannelSuccessful {
    pub channel_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadNewChannelFailed {
    pub channel_type: String,
    pub reason: String,
}

/// A channel request type the server does not support
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadChannelRequestUnknownType {
    pub request_id: u64,
    pub request_type: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
}

/// A supported channel request whose payload could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadChannelRequestDecodeFailed {
    pub request_id: u64,
    pub request_type: String,
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadChannelRequestSetEnv {
    pub request_id: u64,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadChannelRequestExec {
    pub request_id: u64,
    pub program: String,
}

/// Request for an interactive terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadChannelRequestPty {
    pub request_id: u64,
    pub term: String,
    pub columns: u32,
    pub rows: u32,
    pub width: u32,
    pub height: u32,
    #[serde(with = "base64_bytes")]
    pub mode_list: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadChannelRequestShell {
    pub request_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadChannelRequestSignal {
    pub request_id: u64,
    pub signal: String,
}

/// Request for a well-known subsystem such as `sftp`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadChannelRequestSubsystem {
    pub request_id: u64,
    pub subsystem: String,
}

/// Terminal resize
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadChannelRequestWindow {
    pub request_id: u64,
    pub columns: u32,
    pub rows: u32,
    pub width: u32,
    pub height: u32,
}

/// The backend failed to handle a channel request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadRequestFailed {
    pub request_id: u64,
    pub reason: String,
}

/// Standard stream an I/O event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Stream {
    Stdin,
    Stdout,
    Stderr,
}

impl From<Stream> for u8 {
    fn from(stream: Stream) -> u8 {
        match stream {
            Stream::Stdin => 0,
            Stream::Stdout => 1,
            Stream::Stderr => 2,
        }
    }
}

impl TryFrom<u8> for Stream {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Stream::Stdin),
            1 => Ok(Stream::Stdout),
            2 => Ok(Stream::Stderr),
            other => Err(format!("invalid stream: {}", other)),
        }
    }
}

/// Data sent to or received from the running program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadIo {
    pub stream: Stream,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadExit {
    pub exit_status: u32,
}

/// Every payload shape an event can carry
///
/// Equality is structural; payloads of different shapes never compare equal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Connect(PayloadConnect),
    AuthPassword(PayloadAuthPassword),
    AuthPasswordBackendError(PayloadAuthPasswordBackendError),
    AuthPubKey(PayloadAuthPubKey),
    AuthPubKeyBackendError(PayloadAuthPubKeyBackendError),
    HandshakeFailed(PayloadHandshakeFailed),
    HandshakeSuccessful(PayloadHandshakeSuccessful),
    GlobalRequestUnknown(PayloadGlobalRequestUnknown),
    NewChannel(PayloadNewChannel),
    NewChannelSuccessful(PayloadNewChannelSuccessful),
    NewChannelFailed(PayloadNewChannelFailed),
    ChannelRequestUnknownType(PayloadChannelRequestUnknownType),
    ChannelRequestDecodeFailed(PayloadChannelRequestDecodeFailed),
    ChannelRequestSetEnv(PayloadChannelRequestSetEnv),
    ChannelRequestExec(PayloadChannelRequestExec),
    ChannelRequestPty(PayloadChannelRequestPty),
    ChannelRequestShell(PayloadChannelRequestShell),
    ChannelRequestSignal(PayloadChannelRequestSignal),
    ChannelRequestSubsystem(PayloadChannelRequestSubsystem),
    ChannelRequestWindow(PayloadChannelRequestWindow),
    RequestFailed(PayloadRequestFailed),
    Io(PayloadIo),
    Exit(PayloadExit),
}

impl Payload {
    /// Convert into the generic key/value form stored in binary records
    pub fn to_value(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Payload::Connect(p) => serde_json::to_value(p),
            Payload::AuthPassword(p) => serde_json::to_value(p),
            Payload::AuthPasswordBackendError(p) => serde_json::to_value(p),
            Payload::AuthPubKey(p) => serde_json::to_value(p),
            Payload::AuthPubKeyBackendError(p) => serde_json::to_value(p),
            Payload::HandshakeFailed(p) => serde_json::to_value(p),
            Payload::HandshakeSuccessful(p) => serde_json::to_value(p),
            Payload::GlobalRequestUnknown(p) => serde_json::to_value(p),
            Payload::NewChannel(p) => serde_json::to_value(p),
            Payload::NewChannelSuccessful(p) => serde_json::to_value(p),
            Payload::NewChannelFailed(p) => serde_json::to_value(p),
            Payload::ChannelRequestUnknownType(p) => serde_json::to_value(p),
            Payload::ChannelRequestDecodeFailed(p) => serde_json::to_value(p),
            Payload::ChannelRequestSetEnv(p) => serde_json::to_value(p),
            Payload::ChannelRequestExec(p) => serde_json::to_value(p),
            Payload::ChannelRequestPty(p) => serde_json::to_value(p),
            Payload::ChannelRequestShell(p) => serde_json::to_value(p),
            Payload::ChannelRequestSignal(p) => serde_json::to_value(p),
            Payload::ChannelRequestSubsystem(p) => serde_json::to_value(p),
            Payload::ChannelRequestWindow(p) => serde_json::to_value(p),
            Payload::RequestFailed(p) => serde_json::to_value(p),
            Payload::Io(p) => serde_json::to_value(p),
            Payload::Exit(p) => serde_json::to_value(p),
        }
    }

    /// Structural comparison against a payload of any shape
    pub fn equals(&self, other: &Payload) -> bool {
        self == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_is_not_equal() {
        let exec = Payload::ChannelRequestExec(PayloadChannelRequestExec {
            request_id: 1,
            program: "ls".to_string(),
        });
        let subsystem = Payload::ChannelRequestSubsystem(PayloadChannelRequestSubsystem {
            request_id: 1,
            subsystem: "ls".to_string(),
        });
        assert!(!exec.equals(&subsystem));
        assert!(exec.equals(&exec.clone()));
    }

    #[test]
    fn test_bytes_are_base64_in_payload_map() {
        let payload = Payload::AuthPassword(PayloadAuthPassword {
            username: "foo".to_string(),
            password: b"bar".to_vec(),
        });
        let value = payload.to_value().unwrap();
        assert_eq!(value["username"], "foo");
        assert_eq!(value["password"], "YmFy");
    }

    #[test]
    fn test_stream_codes() {
        assert_eq!(u8::from(Stream::Stderr), 2);
        assert_eq!(Stream::try_from(1).unwrap(), Stream::Stdout);
        assert!(Stream::try_from(7).is_err());
    }
}
