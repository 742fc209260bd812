// src/session/channel.rs
//! Channel-level audit logging

use crate::message::*;
use crate::session::connection::ConnectionShared;
use crate::session::proxy::{InterceptReader, InterceptWriter, Tap};
use std::fmt;
use std::sync::Arc;

/// Audit logger for one accepted channel of a connection
pub struct Channel {
    shared: Arc<ConnectionShared>,
    channel_id: ChannelId,
}

impl Channel {
    pub(crate) fn new(shared: Arc<ConnectionShared>, channel_id: ChannelId) -> Self {
        Self { shared, channel_id }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    async fn send(&self, event_type: EventType, payload: Option<Payload>) {
        self.shared
            .send(event_type, payload, Some(self.channel_id))
            .await;
    }

    /// A request type the server does not support
    pub async fn on_request_unknown(&self, request_id: u64, request_type: &str, payload: &[u8]) {
        let payload = PayloadChannelRequestUnknownType {
            request_id,
            request_type: request_type.to_string(),
            payload: payload.to_vec(),
        };
        self.send(
            EventType::ChannelRequestUnknownType,
            Some(Payload::ChannelRequestUnknownType(payload)),
        )
        .await;
    }

    /// A supported request type whose payload could not be decoded
    pub async fn on_request_decode_failed(
        &self,
        request_id: u64,
        request_type: &str,
        payload: &[u8],
        reason: &str,
    ) {
        let payload = PayloadChannelRequestDecodeFailed {
            request_id,
            request_type: request_type.to_string(),
            payload: payload.to_vec(),
            reason: reason.to_string(),
        };
        self.send(
            EventType::ChannelRequestDecodeFailed,
            Some(Payload::ChannelRequestDecodeFailed(payload)),
        )
        .await;
    }

    /// The backend failed to carry out a request
    pub async fn on_request_failed(&self, request_id: u64, reason: impl fmt::Display) {
        let payload = PayloadRequestFailed {
            request_id,
            reason: reason.to_string(),
        };
        self.send(EventType::RequestFailed, Some(Payload::RequestFailed(payload)))
            .await;
    }

    pub async fn on_request_set_env(&self, request_id: u64, name: &str, value: &str) {
        let payload = PayloadChannelRequestSetEnv {
            request_id,
            name: name.to_string(),
            value: value.to_string(),
        };
        self.send(
            EventType::ChannelRequestSetEnv,
            Some(Payload::ChannelRequestSetEnv(payload)),
        )
        .await;
    }

    pub async fn on_request_exec(&self, request_id: u64, program: &str) {
        let payload = PayloadChannelRequestExec {
            request_id,
            program: program.to_string(),
        };
        self.send(
            EventType::ChannelRequestExec,
            Some(Payload::ChannelRequestExec(payload)),
        )
        .await;
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn on_request_pty(
        &self,
        request_id: u64,
        term: &str,
        columns: u32,
        rows: u32,
        width: u32,
        height: u32,
        mode_list: &[u8],
    ) {
        let payload = PayloadChannelRequestPty {
            request_id,
            term: term.to_string(),
            columns,
            rows,
            width,
            height,
            mode_list: mode_list.to_vec(),
        };
        self.send(
            EventType::ChannelRequestPty,
            Some(Payload::ChannelRequestPty(payload)),
        )
        .await;
    }

    pub async fn on_request_shell(&self, request_id: u64) {
        self.send(
            EventType::ChannelRequestShell,
            Some(Payload::ChannelRequestShell(PayloadChannelRequestShell {
                request_id,
            })),
        )
        .await;
    }

    pub async fn on_request_signal(&self, request_id: u64, signal: &str) {
        let payload = PayloadChannelRequestSignal {
            request_id,
            signal: signal.to_string(),
        };
        self.send(
            EventType::ChannelRequestSignal,
            Some(Payload::ChannelRequestSignal(payload)),
        )
        .await;
    }

    pub async fn on_request_subsystem(&self, request_id: u64, subsystem: &str) {
        let payload = PayloadChannelRequestSubsystem {
            request_id,
            subsystem: subsystem.to_string(),
        };
        self.send(
            EventType::ChannelRequestSubsystem,
            Some(Payload::ChannelRequestSubsystem(payload)),
        )
        .await;
    }

    pub async fn on_request_window(
        &self,
        request_id: u64,
        columns: u32,
        rows: u32,
        width: u32,
        height: u32,
    ) {
        let payload = PayloadChannelRequestWindow {
            request_id,
            columns,
            rows,
            width,
            height,
        };
        self.send(
            EventType::ChannelRequestWindow,
            Some(Payload::ChannelRequestWindow(payload)),
        )
        .await;
    }

    /// The program running on the channel exited
    pub async fn on_exit(&self, exit_status: u32) {
        self.send(
            EventType::Exit,
            Some(Payload::Exit(PayloadExit { exit_status })),
        )
        .await;
    }

    /// The client will send no more data on this channel
    pub async fn on_write_close(&self) {
        self.send(EventType::WriteClose, None).await;
    }

    pub async fn on_close(&self) {
        self.send(EventType::Close, None).await;
    }

    /// Wrap the program's standard input
    pub fn stdin_proxy<R>(&self, stdin: R) -> InterceptReader<R> {
        InterceptReader::new(stdin, self.tap(self.shared.intercept.stdin, Stream::Stdin))
    }

    /// Wrap the program's standard output
    pub fn stdout_proxy<W>(&self, stdout: W) -> InterceptWriter<W> {
        InterceptWriter::new(stdout, self.tap(self.shared.intercept.stdout, Stream::Stdout))
    }

    /// Wrap the program's standard error
    pub fn stderr_proxy<W>(&self, stderr: W) -> InterceptWriter<W> {
        InterceptWriter::new(stderr, self.tap(self.shared.intercept.stderr, Stream::Stderr))
    }

    fn tap(&self, enabled: bool, stream: Stream) -> Option<Tap> {
        enabled.then(|| {
            Tap::new(
                self.shared.sender.clone(),
                self.shared.connection_id.clone(),
                self.channel_id,
                stream,
            )
        })
    }
}
