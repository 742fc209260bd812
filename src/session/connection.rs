// src/session/connection.rs
//! Connection-level audit logging

use crate::message::*;
use crate::session::channel::Channel;
use crate::utils::config::InterceptConfig;
use parking_lot::Mutex;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// State shared by a connection and its channels
pub(crate) struct ConnectionShared {
    pub connection_id: ConnectionId,
    pub sender: mpsc::Sender<Event>,
    pub intercept: InterceptConfig,
}

impl ConnectionShared {
    /// Stamp and enqueue one event, waiting for room in the event channel
    pub async fn send(
        &self,
        event_type: EventType,
        payload: Option<Payload>,
        channel_id: Option<ChannelId>,
    ) {
        let event = Event::now(self.connection_id.clone(), event_type, payload, channel_id);
        if self.sender.send(event).await.is_err() {
            debug!(
                connection = %self.connection_id,
                event = %event_type,
                "Audit log encoder has stopped, dropping event"
            );
        }
    }

    /// Password as recorded, empty unless password interception is on
    fn password(&self, password: &[u8]) -> Vec<u8> {
        if self.intercept.passwords {
            password.to_vec()
        } else {
            Vec::new()
        }
    }
}

/// Audit logger for one SSH connection
///
/// Every `on_*` call records one event. Calls wait while the encoder is
/// busy, so events are recorded in the order the calls were made.
pub struct Connection {
    shared: Arc<ConnectionShared>,
    ip: IpAddr,
    next_channel_id: Mutex<u64>,
}

impl Connection {
    pub(crate) fn new(shared: ConnectionShared, ip: IpAddr) -> Self {
        Self {
            shared: Arc::new(shared),
            ip,
            next_channel_id: Mutex::new(0),
        }
    }

    pub fn connection_id(&self) -> &ConnectionId {
        &self.shared.connection_id
    }

    pub fn remote_ip(&self) -> IpAddr {
        self.ip
    }

    pub(crate) async fn on_connect(&self, country: String) {
        self.shared
            .send(
                EventType::Connect,
                Some(Payload::Connect(PayloadConnect {
                    remote_addr: self.ip.to_string(),
                    country,
                })),
                None,
            )
            .await;
    }

    /// Record the disconnect and end the audit log
    pub async fn on_disconnect(self) {
        self.shared.send(EventType::Disconnect, None, None).await;
    }

    pub async fn on_auth_password(&self, username: &str, password: &[u8]) {
        self.auth_password(EventType::AuthPassword, username, password)
            .await;
    }

    pub async fn on_auth_password_success(&self, username: &str, password: &[u8]) {
        self.auth_password(EventType::AuthPasswordSuccessful, username, password)
            .await;
    }

    pub async fn on_auth_password_failed(&self, username: &str, password: &[u8]) {
        self.auth_password(EventType::AuthPasswordFailed, username, password)
            .await;
    }

    /// The authentication backend failed while checking a password
    pub async fn on_auth_password_backend_error(&self, username: &str, password: &[u8], reason: &str) {
        let payload = PayloadAuthPasswordBackendError {
            username: username.to_string(),
            password: self.shared.password(password),
            reason: reason.to_string(),
        };
        self.shared
            .send(
                EventType::AuthPasswordBackendError,
                Some(Payload::AuthPasswordBackendError(payload)),
                None,
            )
            .await;
    }

    pub async fn on_auth_pubkey(&self, username: &str, key: &[u8]) {
        self.auth_pubkey(EventType::AuthPubKey, username, key).await;
    }

    pub async fn on_auth_pubkey_success(&self, username: &str, key: &[u8]) {
        self.auth_pubkey(EventType::AuthPubKeySuccessful, username, key)
            .await;
    }

    pub async fn on_auth_pubkey_failed(&self, username: &str, key: &[u8]) {
        self.auth_pubkey(EventType::AuthPubKeyFailed, username, key)
            .await;
    }

    /// The authentication backend failed while checking a public key
    pub async fn on_auth_pubkey_backend_error(&self, username: &str, key: &[u8], reason: &str) {
        let payload = PayloadAuthPubKeyBackendError {
            username: username.to_string(),
            key: key.to_vec(),
            reason: reason.to_string(),
        };
        self.shared
            .send(
                EventType::AuthPubKeyBackendError,
                Some(Payload::AuthPubKeyBackendError(payload)),
                None,
            )
            .await;
    }

    pub async fn on_handshake_failed(&self, reason: &str) {
        let payload = PayloadHandshakeFailed {
            reason: reason.to_string(),
        };
        self.shared
            .send(
                EventType::HandshakeFailed,
                Some(Payload::HandshakeFailed(payload)),
                None,
            )
            .await;
    }

    pub async fn on_handshake_successful(&self, username: &str) {
        let payload = PayloadHandshakeSuccessful {
            username: username.to_string(),
        };
        self.shared
            .send(
                EventType::HandshakeSuccessful,
                Some(Payload::HandshakeSuccessful(payload)),
                None,
            )
            .await;
    }

    pub async fn on_global_request_unknown(&self, request_type: &str) {
        let payload = PayloadGlobalRequestUnknown {
            request_type: request_type.to_string(),
        };
        self.shared
            .send(
                EventType::GlobalRequestUnknown,
                Some(Payload::GlobalRequestUnknown(payload)),
                None,
            )
            .await;
    }

    pub async fn on_new_channel(&self, channel_type: &str) {
        let payload = PayloadNewChannel {
            channel_type: channel_type.to_string(),
        };
        self.shared
            .send(EventType::NewChannel, Some(Payload::NewChannel(payload)), None)
            .await;
    }

    pub async fn on_new_channel_failed(&self, channel_type: &str, reason: &str) {
        let payload = PayloadNewChannelFailed {
            channel_type: channel_type.to_string(),
            reason: reason.to_string(),
        };
        self.shared
            .send(
                EventType::NewChannelFailed,
                Some(Payload::NewChannelFailed(payload)),
                None,
            )
            .await;
    }

    /// Record an accepted channel and return its audit logger
    ///
    /// Channel ids are assigned from 0 in acceptance order.
    pub async fn on_new_channel_success(&self, channel_type: &str) -> Channel {
        let channel_id = {
            let mut next = self.next_channel_id.lock();
            let id = ChannelId(*next);
            *next += 1;
            id
        };

        let payload = PayloadNewChannelSuccessful {
            channel_type: channel_type.to_string(),
        };
        self.shared
            .send(
                EventType::NewChannelSuccessful,
                Some(Payload::NewChannelSuccessful(payload)),
                Some(channel_id),
            )
            .await;

        Channel::new(self.shared.clone(), channel_id)
    }

    async fn auth_password(&self, event_type: EventType, username: &str, password: &[u8]) {
        let payload = PayloadAuthPassword {
            username: username.to_string(),
            password: self.shared.password(password),
        };
        self.shared
            .send(event_type, Some(Payload::AuthPassword(payload)), None)
            .await;
    }

    async fn auth_pubkey(&self, event_type: EventType, username: &str, key: &[u8]) {
        let payload = PayloadAuthPubKey {
            username: username.to_string(),
            key: key.to_vec(),
        };
        self.shared
            .send(event_type, Some(Payload::AuthPubKey(payload)), None)
            .await;
    }
}
