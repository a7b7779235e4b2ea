//! Transport - chunk sinks for response bodies
//!
//! Blocking producers (stream loop, chunked encoder) write response
//! bytes through `ChunkSink`. `BodySink` bridges a sink to an axum
//! streaming body over a bounded channel, so a slow peer blocks the
//! producer and a closed peer fails the next write.

use axum::body::Body;
use bytes::Bytes;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Chunks buffered between producer and socket
pub const BODY_CHANNEL_CAPACITY: usize = 1;

/// Write to peer failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Peer disconnected; the response body was dropped
    #[error("peer closed the connection")]
    PeerClosed,
}

/// Destination for response bytes
pub trait ChunkSink {
    /// Send one chunk, blocking until the transport accepts it
    fn accept(&mut self, chunk: &[u8]) -> Result<(), TransportError>;
}

impl<S: ChunkSink + ?Sized> ChunkSink for &mut S {
    fn accept(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        (**self).accept(chunk)
    }
}

/// Sink feeding a streaming HTTP response body
pub struct BodySink {
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
    bytes_sent: u64,
}

impl BodySink {
    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

impl ChunkSink for BodySink {
    /// Must be called from a blocking context (`spawn_blocking` or a plain thread)
    fn accept(&mut self, chunk: &[u8]) -> Result<(), TransportError> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx
            .blocking_send(Ok(Bytes::copy_from_slice(chunk)))
            .map_err(|_| TransportError::PeerClosed)?;
        self.bytes_sent += chunk.len() as u64;
        Ok(())
    }
}

/// Create a sink and the response body it feeds
pub fn body_channel() -> (BodySink, Body) {
    let (tx, rx) = mpsc::channel(BODY_CHANNEL_CAPACITY);
    let body = Body::from_stream(ReceiverStream::new(rx));
    (BodySink { tx, bytes_sent: 0 }, body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_body_receives_chunks_in_order() {
        let (mut sink, body) = body_channel();

        let producer = tokio::task::spawn_blocking(move || {
            sink.accept(b"hello ").unwrap();
            sink.accept(b"").unwrap();
            sink.accept(b"world").unwrap();
            sink.bytes_sent()
        });

        let collected = body.collect().await.unwrap().to_bytes();
        assert_eq!(&collected[..], b"hello world");
        assert_eq!(producer.await.unwrap(), 11);
    }

    #[tokio::test]
    async fn test_dropped_body_fails_write() {
        let (mut sink, body) = body_channel();
        drop(body);

        let result = tokio::task::spawn_blocking(move || sink.accept(b"frame"))
            .await
            .unwrap();
        assert_eq!(result, Err(TransportError::PeerClosed));
    }
}
