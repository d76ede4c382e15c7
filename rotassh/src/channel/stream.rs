//! Byte stream abstraction underneath the expect engine.

use std::future::Future;
use std::io;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// A bidirectional interactive shell stream.
///
/// `recv` yields the remote side's output with stdout and stderr already
/// merged; `Ok(None)` means the remote side closed the stream.
pub trait ShellStream {
    /// Wait for the next chunk of output.
    fn recv(&mut self) -> impl Future<Output = io::Result<Option<Bytes>>>;

    /// Write raw bytes to the shell's input.
    fn send(&mut self, data: &[u8]) -> impl Future<Output = io::Result<()>>;

    /// Signal end of input and release the stream.
    fn shutdown(&mut self) -> impl Future<Output = io::Result<()>>;
}

/// [`ShellStream`] over any tokio `AsyncRead + AsyncWrite` value.
pub struct IoStream<T> {
    inner: T,
    read_buf: Box<[u8]>,
}

impl<T> IoStream<T> {
    /// Wrap an async byte stream.
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            read_buf: vec![0u8; 4096].into_boxed_slice(),
        }
    }

    /// Unwrap the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin> ShellStream for IoStream<T> {
    async fn recv(&mut self) -> io::Result<Option<Bytes>> {
        let n = self.inner.read(&mut self.read_buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(Bytes::copy_from_slice(&self.read_buf[..n])))
    }

    async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.inner.write_all(data).await?;
        self.inner.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        self.inner.shutdown().await
    }
}
