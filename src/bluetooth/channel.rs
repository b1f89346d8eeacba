// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Bidirectional byte channel with a thread-safe close.

use async_trait::async_trait;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};
use tracing::debug;

/// An open byte stream to a remote device.
///
/// `close` is the only cancellation primitive: once called, every pending
/// and future `read`/`write` completes with an error. It is idempotent and
/// may be called from any task while a read or write is in flight.
#[async_trait]
pub trait StreamChannel: Send + Sync + fmt::Debug {
    /// Read up to `buf.len()` bytes. `Ok(0)` means the peer closed the stream.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `data` and flush.
    async fn write(&self, data: &[u8]) -> io::Result<()>;

    /// Close the channel.
    fn close(&self);

    /// Whether `close` has been called.
    fn is_closed(&self) -> bool;
}

/// [`StreamChannel`] over any tokio stream (RFCOMM socket, in-memory duplex).
pub struct IoChannel<S> {
    reader: Mutex<ReadHalf<S>>,
    writer: Mutex<WriteHalf<S>>,
    closed: watch::Sender<bool>,
}

impl<S> IoChannel<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    /// Wrap a connected stream.
    pub fn new(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        let (closed, _) = watch::channel(false);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            closed,
        }
    }
}

impl<S> fmt::Debug for IoChannel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoChannel")
            .field("closed", &*self.closed.borrow())
            .finish()
    }
}

#[async_trait]
impl<S> StreamChannel for IoChannel<S>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let closed = self.closed.subscribe();
        tokio::select! {
            biased;
            _ = wait_closed(closed) => Err(closed_error()),
            result = async {
                let mut reader = self.reader.lock().await;
                reader.read(buf).await
            } => result,
        }
    }

    async fn write(&self, data: &[u8]) -> io::Result<()> {
        let closed = self.closed.subscribe();
        tokio::select! {
            biased;
            _ = wait_closed(closed) => Err(closed_error()),
            result = async {
                let mut writer = self.writer.lock().await;
                writer.write_all(data).await?;
                writer.flush().await
            } => result,
        }
    }

    fn close(&self) {
        if !self.closed.send_replace(true) {
            debug!("Channel closed");
        }
    }

    fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }
}

/// Resolves once the watched flag turns true (or its sender is gone).
pub(crate) async fn wait_closed(mut closed: watch::Receiver<bool>) {
    loop {
        if *closed.borrow_and_update() {
            return;
        }
        if closed.changed().await.is_err() {
            return;
        }
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "channel closed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test]
    async fn test_read_write_over_duplex() {
        let (local, mut remote) = tokio::io::duplex(1024);
        let channel = IoChannel::new(local);

        channel.write(b"ping").await.unwrap();
        let mut buf = [0u8; 4];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        remote.write_all(b"pong").await.unwrap();
        let mut buf = [0u8; 16];
        let n = channel.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_read() {
        let (local, _remote) = tokio::io::duplex(1024);
        let channel = Arc::new(IoChannel::new(local));

        let reader = channel.clone();
        let pending = tokio::spawn(async move {
            let mut buf = [0u8; 8];
            reader.read(&mut buf).await
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        channel.close();

        let result = timeout(Duration::from_secs(1), pending)
            .await
            .expect("read should unblock")
            .unwrap();
        assert_eq!(result.unwrap_err().kind(), io::ErrorKind::ConnectionAborted);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (local, _remote) = tokio::io::duplex(64);
        let channel = IoChannel::new(local);

        assert!(!channel.is_closed());
        channel.close();
        channel.close();
        assert!(channel.is_closed());

        assert!(channel.write(b"late").await.is_err());
        let mut buf = [0u8; 4];
        assert!(channel.read(&mut buf).await.is_err());
    }

    #[tokio::test]
    async fn test_peer_drop_reads_eof() {
        let (local, remote) = tokio::io::duplex(64);
        let channel = IoChannel::new(local);
        drop(remote);

        let mut buf = [0u8; 4];
        assert_eq!(channel.read(&mut buf).await.unwrap(), 0);
    }
}
