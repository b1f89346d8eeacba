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

//! BlueZ transport: RFCOMM stream sockets through `bluer`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bluer::rfcomm::{Profile, ProfileHandle, Role, SocketAddr, Stream};
use bluer::{Adapter, AdapterEvent, Address, Session};
use futures::{pin_mut, StreamExt};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::channel::{IoChannel, StreamChannel};
use super::transport::{DeviceId, ServiceTarget, Transport};

/// Transport backed by the system's default Bluetooth adapter.
pub struct BluezTransport {
    session: Session,
    adapter: Option<Adapter>,
    scan: Mutex<Option<JoinHandle<()>>>,
}

impl BluezTransport {
    /// Open a BlueZ session and pick the default adapter.
    ///
    /// A missing adapter is not an error here; connect attempts report
    /// `TransportUnavailable` instead.
    pub async fn new() -> Result<Self> {
        info!("Initializing BlueZ transport...");

        // Create BlueZ session
        let session = bluer::Session::new().await?;
        debug!("BlueZ session created");

        let adapter = match session.default_adapter().await {
            Ok(adapter) => {
                info!("Using Bluetooth adapter: {}", adapter.name());
                Some(adapter)
            }
            Err(e) => {
                warn!("No Bluetooth adapter: {}", e);
                None
            }
        };

        Ok(Self {
            session,
            adapter,
            scan: Mutex::new(None),
        })
    }

    /// Start a discovery session that logs every device found.
    /// Running discovery is what `pause_discovery` halts before a connect.
    pub async fn start_discovery(&self) -> Result<()> {
        let adapter = self
            .adapter
            .clone()
            .ok_or_else(|| anyhow!("No Bluetooth adapter"))?;

        self.stop_scan();

        let events = adapter.discover_devices().await?;
        info!("Discovery started");

        let handle = tokio::spawn(async move {
            pin_mut!(events);
            while let Some(event) = events.next().await {
                match event {
                    AdapterEvent::DeviceAdded(addr) => {
                        let name = match adapter.device(addr) {
                            Ok(device) => device.name().await.ok().flatten(),
                            Err(_) => None,
                        };
                        info!(
                            "Found device: {} - {}",
                            name.as_deref().unwrap_or("Unnamed Device"),
                            addr
                        );
                    }
                    AdapterEvent::DeviceRemoved(addr) => debug!("Device gone: {}", addr),
                    _ => {}
                }
            }
            info!("Discovery finished");
        });

        *self.scan.lock() = Some(handle);
        Ok(())
    }

    /// Stop our discovery session, if any. Returns whether one was running.
    pub fn stop_scan(&self) -> bool {
        match self.scan.lock().take() {
            Some(handle) => {
                // Dropping the event stream ends the discovery session.
                handle.abort();
                true
            }
            None => false,
        }
    }

    /// Connect through the peer's service record for `uuid`.
    ///
    /// Registers a client profile for the duration of the attempt and lets
    /// BlueZ pick the RFCOMM channel from the peer's SDP record.
    async fn connect_service(&self, address: Address, uuid: Uuid) -> Result<Stream> {
        let adapter = self
            .adapter
            .as_ref()
            .ok_or_else(|| anyhow!("No Bluetooth adapter"))?;
        let device = adapter.device(address)?;

        let mut requests = self.session.register_profile(client_profile(uuid)).await?;
        debug!("Client profile {} registered", uuid);

        // BlueZ hands the socket to the profile before connect_profile returns.
        let connect = device.connect_profile(&uuid);
        let accept = accept_from(&mut requests, address);
        tokio::pin!(connect, accept);

        tokio::select! {
            stream = &mut accept => stream,
            connected = &mut connect => {
                connected?;
                accept.await
            }
        }
    }

    fn scanning(&self) -> bool {
        self.scan
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

/// Client-role profile for an outbound connect to `uuid`.
fn client_profile(uuid: Uuid) -> Profile {
    Profile {
        uuid,
        role: Some(Role::Client),
        require_authentication: Some(false),
        require_authorization: Some(false),
        auto_connect: Some(false),
        ..Default::default()
    }
}

async fn accept_from(requests: &mut ProfileHandle, address: Address) -> Result<Stream> {
    while let Some(request) = requests.next().await {
        if request.device() == address {
            return Ok(request.accept()?);
        }
        debug!("Ignoring profile connection from {}", request.device());
    }
    Err(anyhow!("profile unregistered"))
}

impl Drop for BluezTransport {
    fn drop(&mut self) {
        self.stop_scan();
    }
}

#[async_trait]
impl Transport for BluezTransport {
    async fn is_available(&self) -> bool {
        self.adapter.is_some()
    }

    async fn is_enabled(&self) -> bool {
        match &self.adapter {
            Some(adapter) => adapter.is_powered().await.unwrap_or(false),
            None => false,
        }
    }

    async fn is_discovering(&self) -> bool {
        if self.scanning() {
            return true;
        }
        match &self.adapter {
            Some(adapter) => adapter.is_discovering().await.unwrap_or(false),
            None => false,
        }
    }

    async fn pause_discovery(&self) -> io::Result<()> {
        if self.stop_scan() {
            info!("Discovery cancelled for connection");
        } else {
            debug!("Discovery is driven by another client, leaving it running");
        }
        Ok(())
    }

    async fn open_channel(
        &self,
        device: &DeviceId,
        target: &ServiceTarget,
    ) -> io::Result<Arc<dyn StreamChannel>> {
        let address: Address = device.as_str().parse().map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("not a Bluetooth address: {}", device),
            )
        })?;

        let stream = match self.connect_service(address, target.uuid).await {
            Ok(stream) => {
                info!("RFCOMM stream open to {} via service {}", address, target.uuid);
                stream
            }
            Err(e) => {
                warn!(
                    "Service {} on {} not resolved ({}), dialing channel {}",
                    target.uuid, address, e, target.channel
                );

                // Connect via RFCOMM
                let socket_addr = SocketAddr::new(address, target.channel);
                let stream = Stream::connect(socket_addr).await?;
                info!("RFCOMM stream open to {} on channel {}", address, target.channel);
                stream
            }
        };

        Ok(Arc::new(IoChannel::new(stream)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::SPP_UUID;

    #[test]
    fn test_client_profile_targets_service() {
        let uuid = Uuid::from_u128(0x5eed_0000_0000_1000_8000_00805f9b34fb);
        let profile = client_profile(uuid);

        assert_eq!(profile.uuid, uuid);
        assert!(matches!(profile.role, Some(Role::Client)));
        assert_eq!(profile.channel, None);
        assert_eq!(client_profile(SPP_UUID).uuid, SPP_UUID);
    }
}
