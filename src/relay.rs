//! The byte-counting relay between the download and upload legs.
//!
//! The two legs are connected by a bounded channel: the upload side pulls
//! chunks as the network response delivers them, and the producer blocks
//! once [CHANNEL_CAPACITY] chunks are in flight, so neither side ever holds
//! more than a small window of the body in memory.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use tokio::sync::mpsc;

use crate::error::{Result, TransferError};

/// Maximum number of chunks buffered between the download and upload legs.
pub const CHANNEL_CAPACITY: usize = 16;

/// One item on the relay channel: a body chunk, or the upstream error that
/// terminated the stream.
pub type Chunk = std::io::Result<Bytes>;

/// A monotonically increasing count of bytes observed by the relay.  Cloning
/// yields a handle to the same counter.  The total is only authoritative
/// once the upstream source has signalled end-of-stream or error.
#[derive(Debug, Clone, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    pub fn add(&self, n: u64) {
        self.0.fetch_add(n, Ordering::Relaxed);
    }

    pub fn total(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drain `body`, counting every chunk and forwarding it unchanged into `tx`.
///
/// An upstream error is forwarded downstream as the channel's terminating
/// item (no silent truncation) and also returned from here so the caller can
/// report the root cause.  A closed channel means the consumer failed and
/// hung up; the pump ends quietly and the consumer's own error surfaces
/// instead.
pub async fn pump<S>(mut body: S, counter: ByteCounter, tx: mpsc::Sender<Chunk>) -> Result<()>
where
    S: Stream<Item = Chunk> + Unpin,
{
    while let Some(next) = body.next().await {
        match next {
            Ok(chunk) => {
                counter.add(chunk.len() as u64);
                if tx.send(Ok(chunk)).await.is_err() {
                    return Ok(());
                }
            }
            Err(err) => {
                let message = format!("source body failed mid-stream: {err}");
                let _ = tx.send(Err(err)).await;
                return Err(TransferError::network(message, None));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use futures_util::stream;

    async fn drain(mut rx: mpsc::Receiver<Chunk>) -> (Vec<u8>, Option<std::io::Error>) {
        let mut collected = Vec::new();
        while let Some(item) = rx.recv().await {
            match item {
                Ok(chunk) => collected.extend_from_slice(&chunk),
                Err(err) => return (collected, Some(err)),
            }
        }
        (collected, None)
    }

    #[tokio::test]
    async fn counts_bytes_exactly_once() -> Result<()> {
        let chunks: Vec<Chunk> = vec![
            Ok(Bytes::from_static(b"hello")),
            Ok(Bytes::from_static(b", ")),
            Ok(Bytes::from_static(b"world")),
        ];
        let counter = ByteCounter::default();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let (pumped, (collected, err)) =
            tokio::join!(pump(stream::iter(chunks), counter.clone(), tx), drain(rx));
        pumped?;

        assert!(err.is_none());
        assert_eq!(collected, b"hello, world");
        assert_eq!(counter.total(), 12);
        Ok(())
    }

    #[tokio::test]
    async fn total_is_independent_of_chunk_boundaries() -> Result<()> {
        let one_byte_chunks: Vec<Chunk> = b"hello, world"
            .iter()
            .map(|b| Ok(Bytes::copy_from_slice(&[*b])))
            .collect();
        let counter = ByteCounter::default();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let (pumped, (collected, _)) =
            tokio::join!(pump(stream::iter(one_byte_chunks), counter.clone(), tx), drain(rx));
        pumped?;

        assert_eq!(collected, b"hello, world");
        assert_eq!(counter.total(), 12);
        Ok(())
    }

    #[tokio::test]
    async fn empty_body_counts_zero() -> Result<()> {
        let counter = ByteCounter::default();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let (pumped, (collected, err)) =
            tokio::join!(pump(stream::iter(Vec::new()), counter.clone(), tx), drain(rx));
        pumped?;

        assert!(err.is_none());
        assert!(collected.is_empty());
        assert_eq!(counter.total(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn upstream_error_terminates_the_channel() {
        let chunks: Vec<Chunk> = vec![
            Ok(Bytes::from_static(b"partial")),
            Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "connection reset",
            )),
        ];
        let counter = ByteCounter::default();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        let (pumped, (collected, err)) =
            tokio::join!(pump(stream::iter(chunks), counter.clone(), tx), drain(rx));

        // the consumer sees the error as the channel's last item..
        assert_eq!(collected, b"partial");
        assert!(err.unwrap().to_string().contains("connection reset"));
        // ..and the pump reports the root cause
        match pumped.unwrap_err() {
            TransferError::Network { message, status } => {
                assert!(message.contains("connection reset"));
                assert_eq!(status, None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn hung_up_consumer_ends_the_pump_without_error() -> Result<()> {
        let chunks: Vec<Chunk> = (0..64).map(|_| Ok(Bytes::from_static(b"xxxx"))).collect();
        let counter = ByteCounter::default();
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        pump(stream::iter(chunks), counter, tx).await?;
        Ok(())
    }
}
