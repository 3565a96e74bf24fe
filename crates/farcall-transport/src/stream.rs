use bytes::{Bytes, BytesMut};
use farcall_core::DispatchError;
use futures::stream::{self, BoxStream, Stream, StreamExt};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio_util::io::StreamReader;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

/// Raw chunk source a dispatcher plugs into a [`DataStream`].
pub type ChunkStream = BoxStream<'static, Result<Bytes, DispatchError>>;

/// Bounded byte stream over a remote object's binary content.
///
/// - Never yields more than `max_length` bytes in total; the chunk that
///   crosses the budget is truncated and the stream ends.
/// - Ends quietly when the source runs out first.
/// - Once cancelled, the pending read fails with a cancellation error and the
///   stream is finished.
pub struct DataStream {
    source: Option<ChunkStream>,
    remaining: u64,
    delivered: u64,
    cancelled: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
}

impl DataStream {
    pub fn new(source: ChunkStream, max_length: u64) -> Self {
        Self {
            source: Some(source),
            remaining: max_length,
            delivered: 0,
            cancelled: None,
        }
    }

    /// A stream over in-memory chunks. Mostly useful for fakes and tests.
    pub fn from_chunks<I>(chunks: I, max_length: u64) -> Self
    where
        I: IntoIterator<Item = Bytes>,
        I::IntoIter: Send + 'static,
    {
        Self::new(stream::iter(chunks.into_iter().map(Ok)).boxed(), max_length)
    }

    pub fn empty() -> Self {
        Self::new(stream::empty().boxed(), 0)
    }

    /// Aborts pending and future reads when `token` fires.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancelled = Some(Box::pin(token.cancelled_owned()));
        self
    }

    /// Bytes still allowed by the length budget.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Bytes handed out so far.
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    pub fn is_finished(&self) -> bool {
        self.source.is_none()
    }

    fn finish(&mut self) {
        self.source = None;
        self.cancelled = None;
    }

    /// Collects the whole stream.
    pub async fn read_to_end(mut self) -> Result<Bytes, DispatchError> {
        let mut buffer = BytesMut::new();
        while let Some(chunk) = self.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Adapts the stream to [`tokio::io::AsyncRead`].
    pub fn into_async_read(self) -> StreamReader<Self, Bytes> {
        StreamReader::new(self)
    }
}

impl fmt::Debug for DataStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStream")
            .field("remaining", &self.remaining)
            .field("delivered", &self.delivered)
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

impl DataStream {
    fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes, DispatchError>>> {
        if self.source.is_none() {
            return Poll::Ready(None);
        }

        if let Some(cancelled) = self.cancelled.as_mut() {
            if cancelled.as_mut().poll(cx).is_ready() {
                self.finish();
                return Poll::Ready(Some(Err(DispatchError::cancelled())));
            }
        }

        if self.remaining == 0 {
            self.finish();
            return Poll::Ready(None);
        }

        loop {
            let Some(source) = self.source.as_mut() else {
                return Poll::Ready(None);
            };
            match source.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    self.finish();
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(err))) => {
                    self.finish();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(Some(Ok(mut chunk))) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    if chunk.len() as u64 > self.remaining {
                        chunk.truncate(self.remaining as usize);
                    }
                    let len = chunk.len() as u64;
                    self.remaining -= len;
                    self.delivered += len;
                    return Poll::Ready(Some(Ok(chunk)));
                }
            }
        }
    }
}

impl Stream for DataStream {
    type Item = Result<Bytes, DispatchError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_chunk(cx)
    }
}
