//! Byte streams attached to live backend resources

use crate::observability::ConsoleMetrics;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tracing::debug;

/// Readable stream handed to the web layer; dropping it closes the
/// backend-side connection.
pub type ByteStream = Pin<Box<dyn AsyncRead + Send>>;

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Wraps a backend stream so that its resources are released exactly once,
/// whether the client reads to the end, disconnects, or an error occurs.
pub struct GuardedStream {
    inner: ByteStream,
    label: String,
    bytes_read: u64,
    on_release: Option<ReleaseHook>,
    metrics: ConsoleMetrics,
}

impl GuardedStream {
    pub fn new(inner: impl AsyncRead + Send + 'static, label: impl Into<String>) -> Self {
        let metrics = ConsoleMetrics::new();
        metrics.inc_open_streams();
        Self {
            inner: Box::pin(inner),
            label: label.into(),
            bytes_read: 0,
            on_release: None,
            metrics,
        }
    }

    /// Run `hook` when the stream is dropped
    pub fn on_release(mut self, hook: impl FnOnce() + Send + 'static) -> Self {
        self.on_release = Some(Box::new(hook));
        self
    }

    pub fn into_byte_stream(self) -> ByteStream {
        Box::pin(self)
    }
}

impl AsyncRead for GuardedStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let poll = this.inner.as_mut().poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = &poll {
            this.bytes_read += (buf.filled().len() - before) as u64;
        }
        poll
    }
}

impl Drop for GuardedStream {
    fn drop(&mut self) {
        if let Some(hook) = self.on_release.take() {
            hook();
        }
        self.metrics.dec_open_streams();
        debug!(stream = %self.label, bytes = self.bytes_read, "Released backend stream");
    }
}
