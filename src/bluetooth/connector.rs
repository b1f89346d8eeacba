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

//! A single outbound connection attempt.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::channel::{wait_closed, StreamChannel};
use super::transport::{DeviceId, ServiceTarget, Transport};
use crate::error::{LinkError, Result};

/// One connection attempt to one device. Runs at most once.
pub struct Connector {
    device: DeviceId,
    target: ServiceTarget,
    timeout: Option<Duration>,
    cancelled: watch::Sender<bool>,
    started: AtomicBool,
}

impl Connector {
    /// Create a connector for `device`.
    pub fn new(device: DeviceId, target: ServiceTarget) -> Self {
        let (cancelled, _) = watch::channel(false);
        Self {
            device,
            target,
            timeout: None,
            cancelled,
            started: AtomicBool::new(false),
        }
    }

    /// Bound the transport-level connect.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Abort the attempt. The pending connect is dropped, which releases
    /// the half-open socket; a channel that opens anyway is closed.
    pub fn cancel(&self) {
        if !self.cancelled.send_replace(true) {
            debug!("Connection attempt to {} cancelled", self.device);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancelled.borrow()
    }

    /// Run the attempt to completion.
    pub async fn run(&self, transport: &dyn Transport) -> Result<Arc<dyn StreamChannel>> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(LinkError::InvalidState("connector already started".into()));
        }

        info!(
            "Connecting to {} (service {}, channel {})",
            self.device, self.target.uuid, self.target.channel
        );

        let cancelled = self.cancelled.subscribe();
        let result = tokio::select! {
            biased;
            _ = wait_closed(cancelled) => Err(LinkError::Cancelled),
            result = self.attempt(transport) => result,
        };

        match result {
            Ok(channel) if self.is_cancelled() => {
                channel.close();
                Err(LinkError::Cancelled)
            }
            Ok(channel) => {
                info!("Connected to {}", self.device);
                Ok(channel)
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", self.device, e);
                Err(e)
            }
        }
    }

    async fn attempt(&self, transport: &dyn Transport) -> Result<Arc<dyn StreamChannel>> {
        // Discovery competes for the radio and slows the connect down.
        if transport.is_discovering().await {
            match transport.pause_discovery().await {
                Ok(()) => debug!("Discovery paused for connection"),
                Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                    warn!("Not permitted to pause discovery: {}", e)
                }
                Err(e) => warn!("Failed to pause discovery: {}", e),
            }
        }

        let open = transport.open_channel(&self.device, &self.target);
        let opened = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, open)
                .await
                .map_err(|_| LinkError::ConnectTimeout(limit))?,
            None => open.await,
        };

        opened.map_err(LinkError::from_connect_io)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::memory::{MemoryTransport, PeerMode};
    use tokio::io::AsyncReadExt;
    use tokio::time::timeout;

    fn connector(device: &str) -> Connector {
        Connector::new(DeviceId::from(device), ServiceTarget::default())
    }

    #[tokio::test]
    async fn test_connect_success_pauses_discovery() {
        let transport = MemoryTransport::new();
        transport.set_discovering(true);
        let mut peer = transport.add_peer("AA:BB", PeerMode::Accept);

        let channel = connector("AA:BB").run(&transport).await.unwrap();
        assert_eq!(transport.pause_count(), 1);
        assert!(!transport.is_discovering_now());

        let mut remote = peer.accept().await.unwrap();
        channel.write(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        remote.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn test_no_pause_when_not_discovering() {
        let transport = MemoryTransport::new();
        let _peer = transport.add_peer("AA:BB", PeerMode::Accept);

        connector("AA:BB").run(&transport).await.unwrap();
        assert_eq!(transport.pause_count(), 0);
    }

    #[tokio::test]
    async fn test_refused_connect() {
        let transport = MemoryTransport::new();
        let _peer = transport.add_peer("AA:BB", PeerMode::Refuse(io::ErrorKind::ConnectionRefused));

        let err = connector("AA:BB").run(&transport).await.unwrap_err();
        assert!(matches!(err, LinkError::ConnectFailed(_)));
    }

    #[tokio::test]
    async fn test_permission_denied_connect() {
        let transport = MemoryTransport::new();
        let _peer = transport.add_peer("AA:BB", PeerMode::Refuse(io::ErrorKind::PermissionDenied));

        let err = connector("AA:BB").run(&transport).await.unwrap_err();
        assert!(matches!(err, LinkError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_cancel_unblocks_hung_connect() {
        let transport = Arc::new(MemoryTransport::new());
        let _peer = transport.add_peer("AA:BB", PeerMode::Hang);
        let connector = Arc::new(connector("AA:BB"));

        let task = {
            let connector = connector.clone();
            let transport = transport.clone();
            tokio::spawn(async move { connector.run(transport.as_ref()).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        connector.cancel();

        let result = timeout(Duration::from_secs(1), task)
            .await
            .expect("cancel should unblock the connect")
            .unwrap();
        assert_eq!(result.err(), Some(LinkError::Cancelled));
    }

    #[tokio::test]
    async fn test_runs_only_once() {
        let transport = MemoryTransport::new();
        let _peer = transport.add_peer("AA:BB", PeerMode::Accept);
        let connector = connector("AA:BB");

        connector.run(&transport).await.unwrap();
        let err = connector.run(&transport).await.unwrap_err();
        assert!(matches!(err, LinkError::InvalidState(_)));
        assert_eq!(transport.open_count(), 1);
    }

    #[tokio::test]
    async fn test_connect_timeout() {
        let transport = MemoryTransport::new();
        let _peer = transport.add_peer("AA:BB", PeerMode::Hang);

        let err = connector("AA:BB")
            .with_timeout(Some(Duration::from_millis(30)))
            .run(&transport)
            .await
            .unwrap_err();
        assert_eq!(err, LinkError::ConnectTimeout(Duration::from_millis(30)));
    }

    #[tokio::test]
    async fn test_unknown_device_fails() {
        let transport = MemoryTransport::new();
        let err = connector("11:22").run(&transport).await.unwrap_err();
        assert!(matches!(err, LinkError::ConnectFailed(_)));
    }
}
