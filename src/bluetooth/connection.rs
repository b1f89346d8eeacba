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

//! Data transfer over an established connection.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::channel::StreamChannel;
use super::transport::DeviceId;
use crate::error::{LinkError, Result};

/// Default receive chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Events emitted by the connection manager.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Connection established.
    Connected { device: DeviceId },
    /// Connection closed.
    Disconnected,
    /// Bytes received, one event per read.
    DataReceived(Vec<u8>),
    /// Error occurred.
    Error(LinkError),
}

/// What the receive loop observed.
#[derive(Debug, Clone, PartialEq)]
pub enum PumpEvent {
    /// A chunk was read.
    Data(Vec<u8>),
    /// The stream ended cleanly: peer EOF or local close. Terminal.
    Closed,
    /// The read failed. Terminal.
    Failed(LinkError),
}

/// Owns an open channel: runs the receive loop and performs writes.
pub struct StreamPump {
    channel: Arc<dyn StreamChannel>,
    chunk_size: usize,
    started: AtomicBool,
}

impl StreamPump {
    /// Create a pump for `channel`. A zero chunk size is treated as one.
    pub fn new(channel: Arc<dyn StreamChannel>, chunk_size: usize) -> Self {
        Self {
            channel,
            chunk_size: chunk_size.max(1),
            started: AtomicBool::new(false),
        }
    }

    /// Spawn the receive loop. `sink` sees every [`PumpEvent`] in wire
    /// order and exactly one terminal event.
    pub fn start<F>(&self, sink: F) -> Result<JoinHandle<()>>
    where
        F: Fn(PumpEvent) + Send + Sync + 'static,
    {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(LinkError::InvalidState("stream pump already started".into()));
        }

        let channel = self.channel.clone();
        let chunk_size = self.chunk_size;
        Ok(tokio::spawn(async move {
            Self::receive_loop(channel, chunk_size, sink).await;
        }))
    }

    async fn receive_loop<F>(channel: Arc<dyn StreamChannel>, chunk_size: usize, sink: F)
    where
        F: Fn(PumpEvent) + Send + Sync + 'static,
    {
        info!("Receive loop started");
        let mut buf = vec![0u8; chunk_size];

        loop {
            match channel.read(&mut buf).await {
                Ok(0) => {
                    // EOF - connection closed
                    info!("Connection closed by remote");
                    sink(PumpEvent::Closed);
                    break;
                }
                Ok(n) => {
                    debug!("Received {} bytes", n);
                    sink(PumpEvent::Data(buf[..n].to_vec()));
                }
                Err(_) if channel.is_closed() => {
                    info!("Connection closed locally");
                    sink(PumpEvent::Closed);
                    break;
                }
                Err(e) => {
                    error!("Read error: {}", e);
                    sink(PumpEvent::Failed(LinkError::from_stream_io(e)));
                    break;
                }
            }
        }

        channel.close();
        info!("Receive loop stopped");
    }

    /// Write `data` in one call. A failed write leaves the receive loop running.
    pub async fn write(&self, data: &[u8]) -> Result<()> {
        self.channel.write(data).await.map_err(|e| {
            error!("Write error: {}", e);
            LinkError::from_stream_io(e)
        })?;
        debug!("Wrote {} bytes", data.len());
        Ok(())
    }

    /// Close the channel. The receive loop reports the termination.
    pub fn cancel(&self) {
        self.channel.close();
    }

    pub fn is_closed(&self) -> bool {
        self.channel.is_closed()
    }
}
