//! Response body driven by reactor frames.
//!
//! The body asks the reactor for more output only when everything queued so
//! far has been handed to hyper, which keeps at most one chunk per connection
//! in flight.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_util::Stream;
use tokio::sync::mpsc;

use crate::net::ConnectionId;
use crate::reactor::{ConnectionEvent, Frame, ReactorHandle};

/// Sends the reactor's `Close` event when the exchange ends, however it ends.
#[derive(Debug)]
pub struct CloseGuard {
    id: ConnectionId,
    reactor: ReactorHandle,
}

impl CloseGuard {
    pub fn new(id: ConnectionId, reactor: ReactorHandle) -> Self {
        Self { id, reactor }
    }
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        self.reactor.event(self.id, ConnectionEvent::Close);
    }
}

/// Chunked body fed by `Frame::Chunk` until `Frame::End`.
pub struct FrameStream {
    id: ConnectionId,
    frames: mpsc::UnboundedReceiver<Frame>,
    reactor: ReactorHandle,
    awaiting: bool,
    done: bool,
    _guard: CloseGuard,
}

impl FrameStream {
    pub fn new(
        id: ConnectionId,
        frames: mpsc::UnboundedReceiver<Frame>,
        reactor: ReactorHandle,
        guard: CloseGuard,
    ) -> Self {
        Self {
            id,
            frames,
            reactor,
            awaiting: false,
            done: false,
            _guard: guard,
        }
    }
}

impl Stream for FrameStream {
    type Item = Result<Bytes, io::Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        loop {
            match this.frames.poll_recv(cx) {
                Poll::Ready(Some(Frame::Chunk(bytes))) => {
                    this.awaiting = false;
                    if bytes.is_empty() {
                        continue;
                    }
                    return Poll::Ready(Some(Ok(bytes)));
                }
                Poll::Ready(Some(Frame::End { .. })) => {
                    this.done = true;
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(_)) => {
                    tracing::trace!(connection_id = %this.id, "Unexpected frame in response body");
                }
                Poll::Ready(None) => {
                    // Reactor dropped the connection mid-response: abort it.
                    this.done = true;
                    return Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "response aborted",
                    ))));
                }
                Poll::Pending => {
                    if !this.awaiting {
                        this.awaiting = true;
                        this.reactor.event(this.id, ConnectionEvent::SendReady);
                    }
                    return Poll::Pending;
                }
            }
        }
    }
}
