//! Progress-tracking stream wrapper for download bodies.

use bytes::Bytes;
use futures_util::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::time::{Duration, Instant};

/// Callback for progress updates, receives the cumulative byte count
pub type ProgressCallback<'a> = Box<dyn FnMut(u64) + Send + 'a>;

/// Stream wrapper that counts received bytes and reports them at most once per
/// interval, plus once when the body ends.
pub struct ProgressStream<'a, S> {
    inner: S,
    bytes_transferred: u64,
    last_update: Instant,
    update_interval: Duration,
    callback: ProgressCallback<'a>,
}

impl<'a, S> ProgressStream<'a, S> {
    pub fn new(inner: S, update_interval: Duration, callback: ProgressCallback<'a>) -> Self {
        Self {
            inner,
            bytes_transferred: 0,
            last_update: Instant::now(),
            update_interval,
            callback,
        }
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }
}

impl<S, E> Stream for ProgressStream<'_, S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
{
    type Item = Result<Bytes, E>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(bytes))) => {
                this.bytes_transferred += bytes.len() as u64;

                let now = Instant::now();
                if now.duration_since(this.last_update) >= this.update_interval {
                    (this.callback)(this.bytes_transferred);
                    this.last_update = now;
                }

                Poll::Ready(Some(Ok(bytes)))
            }
            Poll::Ready(Some(Err(e))) => Poll::Ready(Some(Err(e))),
            Poll::Ready(None) => {
                // Final update on completion
                (this.callback)(this.bytes_transferred);
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
