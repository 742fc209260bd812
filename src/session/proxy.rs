// src/session/proxy.rs
//! Stream interception proxies
//!
//! Wrap a channel's stdin reader or stdout/stderr writer and emit an IO
//! event for every chunk before the chunk is handed on. A proxy built for a
//! stream that is not intercepted forwards calls straight to the wrapped
//! stream.
//!
//! Events go through the connection's bounded event channel, so a slow
//! encoder slows the stream down instead of losing I/O. Once the encoder is
//! gone the proxy stops intercepting and keeps passing data through.

use crate::message::{ChannelId, ConnectionId, Event, EventType, Payload, PayloadIo, Stream};
use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

/// Event producer attached to one stream of one channel
pub(crate) struct Tap {
    sender: PollSender<Event>,
    connection_id: ConnectionId,
    channel_id: ChannelId,
    stream: Stream,
    unsent: Option<Event>,
}

impl Tap {
    pub fn new(
        sender: mpsc::Sender<Event>,
        connection_id: ConnectionId,
        channel_id: ChannelId,
        stream: Stream,
    ) -> Self {
        Self {
            sender: PollSender::new(sender),
            connection_id,
            channel_id,
            stream,
            unsent: None,
        }
    }

    fn record(&mut self, data: &[u8]) {
        self.unsent = Some(Event::now(
            self.connection_id.clone(),
            EventType::Io,
            Some(Payload::Io(PayloadIo {
                stream: self.stream,
                data: data.to_vec(),
            })),
            Some(self.channel_id),
        ));
    }

    /// Deliver the recorded event; `false` once the event channel is closed
    fn poll_deliver(&mut self, cx: &mut Context<'_>) -> Poll<bool> {
        if self.unsent.is_none() {
            return Poll::Ready(true);
        }
        match ready!(self.sender.poll_reserve(cx)) {
            Ok(()) => {
                let delivered = match self.unsent.take() {
                    Some(event) => self.sender.send_item(event).is_ok(),
                    None => true,
                };
                Poll::Ready(delivered)
            }
            Err(_) => {
                self.unsent = None;
                Poll::Ready(false)
            }
        }
    }
}

fn poll_tap(tap: &mut Option<Tap>, cx: &mut Context<'_>) -> Poll<()> {
    let closed = match tap {
        Some(active) => !ready!(active.poll_deliver(cx)),
        None => false,
    };
    if closed {
        *tap = None;
    }
    Poll::Ready(())
}

/// Reader that records everything read through it
pub struct InterceptReader<R> {
    inner: R,
    tap: Option<Tap>,
    /// Bytes read from `inner` whose event was not yet accepted
    stash: Vec<u8>,
}

impl<R> InterceptReader<R> {
    pub(crate) fn new(inner: R, tap: Option<Tap>) -> Self {
        Self {
            inner,
            tap,
            stash: Vec::new(),
        }
    }

    /// Whether reads currently produce IO events
    pub fn is_intercepting(&self) -> bool {
        self.tap.is_some()
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for InterceptReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(poll_tap(&mut this.tap, cx));

        if !this.stash.is_empty() {
            let n = this.stash.len().min(buf.remaining());
            buf.put_slice(&this.stash[..n]);
            this.stash.drain(..n);
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let Some(tap) = this.tap.as_mut() else {
            return Poll::Ready(Ok(()));
        };
        if buf.filled().len() == before {
            return Poll::Ready(Ok(()));
        }

        tap.record(&buf.filled()[before..]);
        if poll_tap(&mut this.tap, cx).is_pending() {
            this.stash.extend_from_slice(&buf.filled()[before..]);
            buf.set_filled(before);
            return Poll::Pending;
        }
        Poll::Ready(Ok(()))
    }
}

/// Writer that records everything written through it
pub struct InterceptWriter<W> {
    inner: W,
    tap: Option<Tap>,
    /// Bytes already written to `inner` whose event was not yet accepted
    written: Option<usize>,
}

impl<W> InterceptWriter<W> {
    pub(crate) fn new(inner: W, tap: Option<Tap>) -> Self {
        Self {
            inner,
            tap,
            written: None,
        }
    }

    /// Whether writes currently produce IO events
    pub fn is_intercepting(&self) -> bool {
        self.tap.is_some()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for InterceptWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if this.written.is_none() {
            let n = ready!(Pin::new(&mut this.inner).poll_write(cx, buf))?;
            match this.tap.as_mut() {
                Some(tap) if n > 0 => tap.record(&buf[..n]),
                _ => return Poll::Ready(Ok(n)),
            }
            this.written = Some(n);
        }

        ready!(poll_tap(&mut this.tap, cx));
        Poll::Ready(Ok(this.written.take().unwrap_or_default()))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(poll_tap(&mut this.tap, cx));
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        ready!(poll_tap(&mut this.tap, cx));
        Pin::new(&mut this.inner).poll_shutdown(cx)
    }
}
