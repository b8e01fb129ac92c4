//! Chunked response senders.
//!
//! A sender owns (or shares) a complete body and emits at most one chunk per
//! send-ready event, then the terminal chunk, then reports itself finished so
//! the connection can detach it.
//!
//! ```text
//! SendReady → sent < total  → Chunk(min(total - sent, chunk_size))
//! SendReady → sent == total → End, Finished (detach)
//! Close before End          → dropped, logged as aborted
//! ```

use bytes::Bytes;

use crate::net::ConnectionId;
use crate::observability::metrics;
use crate::reactor::connection::Outbound;

/// A body a sender can cut into chunks.
pub trait ChunkSource {
    fn total(&self) -> usize;
    fn slice(&self, start: usize, end: usize) -> Bytes;
}

/// Shared, immutable bytes (static assets). Chunks are zero-copy views.
impl ChunkSource for Bytes {
    fn total(&self) -> usize {
        self.len()
    }

    fn slice(&self, start: usize, end: usize) -> Bytes {
        Bytes::slice(self, start..end)
    }
}

/// Owned text produced by a page (command output).
impl ChunkSource for String {
    fn total(&self) -> usize {
        self.len()
    }

    fn slice(&self, start: usize, end: usize) -> Bytes {
        Bytes::copy_from_slice(&self.as_bytes()[start..end])
    }
}

/// Result of one send-ready step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendProgress {
    /// A data chunk was queued.
    Sent(usize),
    /// The terminal chunk was queued; the sender is done.
    Finished,
}

/// Emits a body in bounded chunks across send-ready events.
#[derive(Debug)]
pub struct ChunkSender<S> {
    source: S,
    sent: usize,
    total: usize,
    chunk_size: usize,
    keep_alive: bool,
    finished: bool,
    connection: ConnectionId,
}

pub type DataChunkSender = ChunkSender<Bytes>;
pub type StringChunkSender = ChunkSender<String>;

impl<S: ChunkSource> ChunkSender<S> {
    pub fn new(source: S, chunk_size: usize, keep_alive: bool, connection: ConnectionId) -> Self {
        let total = source.total();
        Self {
            source,
            sent: 0,
            total,
            chunk_size: chunk_size.max(1),
            keep_alive,
            finished: false,
            connection,
        }
    }

    pub fn on_send_ready(&mut self, outbound: &Outbound) -> SendProgress {
        if self.finished {
            return SendProgress::Finished;
        }

        if self.sent < self.total {
            let len = (self.total - self.sent).min(self.chunk_size);
            outbound.chunk(self.source.slice(self.sent, self.sent + len));
            self.sent += len;
            return SendProgress::Sent(len);
        }

        outbound.end(!self.keep_alive);
        self.finished = true;
        metrics::record_transfer("completed");
        tracing::trace!(connection_id = %self.connection, bytes = self.total, "Chunked transfer complete");
        SendProgress::Finished
    }
}

impl<S> ChunkSender<S> {
    pub fn sent(&self) -> usize {
        self.sent
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl<S> Drop for ChunkSender<S> {
    fn drop(&mut self) {
        if self.sent < self.total {
            tracing::debug!(
                connection_id = %self.connection,
                sent = self.sent,
                total = self.total,
                "Chunked transfer aborted"
            );
            metrics::record_transfer("aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactor::connection::Frame;
    use tokio::sync::mpsc;

    fn drive<S: ChunkSource>(mut sender: ChunkSender<S>) -> (Vec<usize>, usize) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outbound = Outbound::new(ConnectionId::new(), tx);

        let mut events = 0;
        while sender.on_send_ready(&outbound) != SendProgress::Finished {
            events += 1;
            assert!(events < 10_000);
        }

        let mut chunks = Vec::new();
        let mut terminals = 0;
        while let Ok(frame) = rx.try_recv() {
            match frame {
                Frame::Chunk(bytes) => {
                    assert_eq!(terminals, 0, "data after terminal chunk");
                    chunks.push(bytes.len());
                }
                Frame::End { .. } => terminals += 1,
                other => panic!("unexpected frame {other:?}"),
            }
        }
        (chunks, terminals)
    }

    #[test]
    fn emits_ceil_chunks_then_terminal() {
        for (size, chunk) in [(0usize, 4usize), (1, 4), (4, 4), (5, 4), (4096, 1024), (4097, 1024)] {
            let payload = Bytes::from(vec![b'x'; size]);
            let (chunks, terminals) = drive(DataChunkSender::new(payload, chunk, true, ConnectionId::new()));

            assert_eq!(chunks.len(), size.div_ceil(chunk), "size {size} chunk {chunk}");
            assert_eq!(chunks.iter().sum::<usize>(), size);
            assert!(chunks.iter().all(|&len| len > 0 && len <= chunk));
            assert_eq!(terminals, 1);
        }
    }

    #[test]
    fn string_sender_preserves_content() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outbound = Outbound::new(ConnectionId::new(), tx);
        let mut sender = StringChunkSender::new("hello world".to_string(), 4, false, ConnectionId::new());

        while sender.on_send_ready(&outbound) != SendProgress::Finished {}

        let mut body = Vec::new();
        let mut close = None;
        while let Ok(frame) = rx.try_recv() {
            match frame {
                Frame::Chunk(bytes) => body.extend_from_slice(&bytes),
                Frame::End { close: c } => close = Some(c),
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert_eq!(body, b"hello world");
        assert_eq!(close, Some(true));
        assert!(sender.is_finished());
    }

    #[test]
    fn partial_transfer_is_reported_not_finished() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let outbound = Outbound::new(ConnectionId::new(), tx);
        let mut sender = DataChunkSender::new(Bytes::from_static(b"abcdefgh"), 3, true, ConnectionId::new());

        assert_eq!(sender.on_send_ready(&outbound), SendProgress::Sent(3));
        assert_eq!(sender.sent(), 3);
        assert_eq!(sender.total(), 8);
        assert!(!sender.is_finished());
        drop(sender);
    }
}
