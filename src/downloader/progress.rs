//! Byte counting around async writers.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;

/// Wraps a writer and counts every byte written through it.
///
/// The running total is also published to an optional shared counter so
/// observers on other tasks can follow a download while it streams.
pub struct ProgressWriter<W> {
    inner: W,
    total: u64,
    shared: Option<Arc<AtomicU64>>,
}

impl<W> ProgressWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            total: 0,
            shared: None,
        }
    }

    /// Publish progress to `counter`, which is reset to zero.
    pub fn with_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        counter.store(0, Ordering::Relaxed);
        self.shared = Some(counter);
        self
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for ProgressWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(n)) = &poll {
            this.total += *n as u64;
            if let Some(shared) = &this.shared {
                shared.store(this.total, Ordering::Relaxed);
            }
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_counts_written_bytes() {
        let counter = Arc::new(AtomicU64::new(99));
        let mut buf = Vec::new();
        let mut writer = ProgressWriter::new(&mut buf).with_counter(counter.clone());
        assert_eq!(counter.load(Ordering::Relaxed), 0);

        writer.write_all(b"hello ").await.unwrap();
        writer.write_all(b"world").await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(writer.total(), 11);
        assert_eq!(counter.load(Ordering::Relaxed), 11);
        drop(writer);
        assert_eq!(buf, b"hello world");
    }
}
