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

//! In-process transport backed by `tokio::io::duplex` pipes.
//!
//! Each registered peer decides how connection attempts to it behave.
//! Accepted connections hand the remote end of the pipe to the peer's
//! [`PeerHandle`].

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::channel::{IoChannel, StreamChannel};
use super::transport::{DeviceId, ServiceTarget, Transport};

/// Pipe capacity for accepted connections.
const DUPLEX_CAPACITY: usize = 64 * 1024;

/// How a peer answers connection attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerMode {
    /// Accept immediately.
    Accept,
    /// Fail with the given error kind.
    Refuse(io::ErrorKind),
    /// Never answer.
    Hang,
    /// Accept after a delay.
    Delay(Duration),
}

#[derive(Clone)]
struct Peer {
    mode: PeerMode,
    /// Service the peer offers. `None` accepts any service.
    service: Option<Uuid>,
    accepted: mpsc::UnboundedSender<DuplexStream>,
}

/// Remote side of a registered peer.
pub struct PeerHandle {
    accepted: mpsc::UnboundedReceiver<DuplexStream>,
}

impl PeerHandle {
    /// Wait for the next accepted connection.
    pub async fn accept(&mut self) -> Option<DuplexStream> {
        self.accepted.recv().await
    }

    /// Take an already accepted connection, if any.
    pub fn try_accept(&mut self) -> Option<DuplexStream> {
        self.accepted.try_recv().ok()
    }
}

/// Transport whose peers live in the same process.
pub struct MemoryTransport {
    available: AtomicBool,
    enabled: AtomicBool,
    discovering: AtomicBool,
    pauses: AtomicUsize,
    opens: AtomicUsize,
    peers: Mutex<HashMap<DeviceId, Peer>>,
}

impl MemoryTransport {
    /// Create an available, powered transport with no peers.
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
            enabled: AtomicBool::new(true),
            discovering: AtomicBool::new(false),
            pauses: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
            peers: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_discovering(&self, discovering: bool) {
        self.discovering.store(discovering, Ordering::SeqCst);
    }

    pub fn is_discovering_now(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }

    /// Register (or replace) a peer that accepts any service.
    pub fn add_peer(&self, device: impl Into<DeviceId>, mode: PeerMode) -> PeerHandle {
        self.insert_peer(device.into(), None, mode)
    }

    /// Register (or replace) a peer offering only `service`.
    pub fn add_service_peer(
        &self,
        device: impl Into<DeviceId>,
        service: Uuid,
        mode: PeerMode,
    ) -> PeerHandle {
        self.insert_peer(device.into(), Some(service), mode)
    }

    fn insert_peer(&self, device: DeviceId, service: Option<Uuid>, mode: PeerMode) -> PeerHandle {
        let (accepted, rx) = mpsc::unbounded_channel();
        self.peers.lock().insert(
            device,
            Peer {
                mode,
                service,
                accepted,
            },
        );
        PeerHandle { accepted: rx }
    }

    /// Number of `open_channel` calls so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Number of `pause_discovery` calls so far.
    pub fn pause_count(&self) -> usize {
        self.pauses.load(Ordering::SeqCst)
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    async fn is_discovering(&self) -> bool {
        self.discovering.load(Ordering::SeqCst)
    }

    async fn pause_discovery(&self) -> io::Result<()> {
        self.pauses.fetch_add(1, Ordering::SeqCst);
        self.discovering.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn open_channel(
        &self,
        device: &DeviceId,
        target: &ServiceTarget,
    ) -> io::Result<Arc<dyn StreamChannel>> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let peer = self.peers.lock().get(device).cloned();
        let Some(peer) = peer else {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such device: {}", device),
            ));
        };

        if peer.service.is_some_and(|service| service != target.uuid) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{} does not offer service {}", device, target.uuid),
            ));
        }

        match peer.mode {
            PeerMode::Refuse(kind) => {
                return Err(io::Error::new(kind, format!("{} refused the connection", device)));
            }
            PeerMode::Hang => std::future::pending::<()>().await,
            PeerMode::Delay(delay) => tokio::time::sleep(delay).await,
            PeerMode::Accept => {}
        }

        let (local, remote) = tokio::io::duplex(DUPLEX_CAPACITY);
        peer.accepted
            .send(remote)
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "peer is gone"))?;
        debug!("In-memory connection opened to {}", device);

        Ok(Arc::new(IoChannel::new(local)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::SPP_UUID;

    const CUSTOM_SERVICE: Uuid = Uuid::from_u128(0x6e40_0001_b5a3_f393_e0a9_e50e24dcca9e);

    #[tokio::test]
    async fn test_service_peer_matches_uuid() {
        let transport = MemoryTransport::new();
        let mut peer = transport.add_service_peer("AA:BB", CUSTOM_SERVICE, PeerMode::Accept);
        let device = DeviceId::from("AA:BB");

        let err = transport
            .open_channel(&device, &ServiceTarget::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
        assert!(peer.try_accept().is_none());

        let target = ServiceTarget {
            uuid: CUSTOM_SERVICE,
            ..ServiceTarget::default()
        };
        transport.open_channel(&device, &target).await.unwrap();
        assert!(peer.try_accept().is_some());
        assert_eq!(transport.open_count(), 2);
    }

    #[tokio::test]
    async fn test_plain_peer_accepts_any_service() {
        let transport = MemoryTransport::new();
        let mut peer = transport.add_peer("AA:BB", PeerMode::Accept);
        let target = ServiceTarget {
            uuid: CUSTOM_SERVICE,
            ..ServiceTarget::default()
        };

        transport
            .open_channel(&DeviceId::from("AA:BB"), &target)
            .await
            .unwrap();
        assert!(peer.try_accept().is_some());
        assert_eq!(ServiceTarget::default().uuid, SPP_UUID);
    }
}
