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

//! Connection manager: owns at most one connector or stream pump and
//! serializes every lifecycle transition.
//!
//! Each attempt gets a token. Workers compare their token with the
//! current one under the manager lock before emitting anything, so a
//! superseded attempt or session can never report after its successor.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::channel::StreamChannel;
use super::connection::{ConnectionEvent, PumpEvent, StreamPump, DEFAULT_CHUNK_SIZE};
use super::connector::Connector;
use super::transport::{DeviceId, ServiceTarget, Transport};
use crate::error::{LinkError, Result};
use crate::state::ConnectionState;

/// Runtime settings for connection attempts and sessions.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkSettings {
    /// Service every connection is opened against.
    pub target: ServiceTarget,
    /// Upper bound for a single receive.
    pub read_chunk_size: usize,
    /// Give up on a connect after this long. `None` waits until cancelled.
    pub connect_timeout: Option<Duration>,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            target: ServiceTarget::default(),
            read_chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout: None,
        }
    }
}

/// The live worker, if any.
enum Slot {
    Empty,
    Connecting {
        token: u64,
        connector: Arc<Connector>,
    },
    Connected {
        token: u64,
        device: DeviceId,
        pump: Arc<StreamPump>,
    },
}

struct Inner {
    state: ConnectionState,
    token: u64,
    slot: Slot,
}

impl Inner {
    /// Cancel the live worker and invalidate its token.
    /// Returns whether anything was active.
    fn teardown(&mut self) -> bool {
        self.token = self.token.wrapping_add(1);
        match std::mem::replace(&mut self.slot, Slot::Empty) {
            Slot::Empty => false,
            Slot::Connecting { connector, .. } => {
                connector.cancel();
                true
            }
            Slot::Connected { pump, .. } => {
                pump.cancel();
                true
            }
        }
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    settings: LinkSettings,
    event_tx: mpsc::UnboundedSender<ConnectionEvent>,
    inner: Mutex<Inner>,
}

impl Shared {
    /// Emit an event. Callers hold the `inner` lock.
    fn emit(&self, event: ConnectionEvent) {
        if self.event_tx.send(event).is_err() {
            debug!("Event receiver dropped");
        }
    }

    fn on_connect_result(
        self: &Arc<Self>,
        token: u64,
        device: DeviceId,
        result: Result<Arc<dyn StreamChannel>>,
    ) {
        let mut inner = self.inner.lock();
        if inner.token != token {
            debug!("Dropping result of superseded attempt to {}", device);
            if let Ok(channel) = result {
                channel.close();
            }
            return;
        }

        let channel = match result {
            Ok(channel) => channel,
            Err(e) => {
                warn!("Connection to {} failed: {}", device, e);
                inner.slot = Slot::Empty;
                inner.state = ConnectionState::Failed(e.clone());
                self.emit(ConnectionEvent::Error(e));
                return;
            }
        };

        let pump = Arc::new(StreamPump::new(channel, self.settings.read_chunk_size));
        let weak: Weak<Shared> = Arc::downgrade(self);
        let started = pump.start(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.on_pump_event(token, event);
            }
        });

        if let Err(e) = started {
            pump.cancel();
            inner.slot = Slot::Empty;
            inner.state = ConnectionState::Failed(e.clone());
            self.emit(ConnectionEvent::Error(e));
            return;
        }

        info!("Session started with {}", device);
        inner.slot = Slot::Connected {
            token,
            device: device.clone(),
            pump,
        };
        inner.state = ConnectionState::Connected;
        self.emit(ConnectionEvent::Connected { device });
    }

    fn on_pump_event(&self, token: u64, event: PumpEvent) {
        let mut inner = self.inner.lock();
        if inner.token != token {
            debug!("Dropping event from superseded session");
            return;
        }

        match event {
            PumpEvent::Data(bytes) => self.emit(ConnectionEvent::DataReceived(bytes)),
            PumpEvent::Closed => {
                info!("Session closed");
                inner.teardown();
                inner.state = ConnectionState::Disconnected;
                self.emit(ConnectionEvent::Disconnected);
            }
            PumpEvent::Failed(e) => {
                warn!("Session failed: {}", e);
                inner.teardown();
                inner.state = ConnectionState::Failed(e.clone());
                self.emit(ConnectionEvent::Error(e));
                self.emit(ConnectionEvent::Disconnected);
            }
        }
    }
}

/// Single-connection lifecycle manager.
pub struct ConnectionManager {
    shared: Arc<Shared>,
    event_rx: Option<mpsc::UnboundedReceiver<ConnectionEvent>>,
}

impl ConnectionManager {
    /// Create a manager on top of `transport`.
    pub fn new(transport: Arc<dyn Transport>, settings: LinkSettings) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            transport,
            settings,
            event_tx,
            inner: Mutex::new(Inner {
                state: ConnectionState::Idle,
                token: 0,
                slot: Slot::Empty,
            }),
        });

        Self {
            shared,
            event_rx: Some(event_rx),
        }
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<ConnectionEvent>> {
        self.event_rx.take()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state.clone()
    }

    /// Device of the live session, if any.
    pub fn connected_device(&self) -> Option<DeviceId> {
        match &self.shared.inner.lock().slot {
            Slot::Connected { device, .. } => Some(device.clone()),
            _ => None,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.shared.inner.lock().slot, Slot::Connected { .. })
    }

    /// Start connecting to `device`, superseding any attempt or session.
    ///
    /// Failures are reported as [`ConnectionEvent::Error`]; nothing is
    /// returned to the caller.
    pub async fn connect(&self, device: impl Into<DeviceId>) {
        let device = device.into();
        info!("Attempting to connect to device: {}", device);

        let transport = &self.shared.transport;
        let rejection = if !transport.is_available().await {
            Some(LinkError::TransportUnavailable)
        } else if !transport.is_enabled().await {
            Some(LinkError::TransportDisabled)
        } else {
            None
        };

        let settings = &self.shared.settings;
        let connector = Arc::new(
            Connector::new(device.clone(), settings.target).with_timeout(settings.connect_timeout),
        );

        let token = {
            let mut inner = self.shared.inner.lock();
            if inner.teardown() {
                debug!("Superseding previous connection");
            }

            if let Some(e) = rejection {
                warn!("Cannot connect to {}: {}", device, e);
                inner.state = ConnectionState::Failed(e.clone());
                self.shared.emit(ConnectionEvent::Error(e));
                return;
            }

            let token = inner.token;
            inner.slot = Slot::Connecting {
                token,
                connector: connector.clone(),
            };
            inner.state = ConnectionState::Connecting;
            token
        };

        let shared = Arc::downgrade(&self.shared);
        let transport = self.shared.transport.clone();
        tokio::spawn(async move {
            let result = connector.run(transport.as_ref()).await;
            match shared.upgrade() {
                Some(shared) => shared.on_connect_result(token, device, result),
                None => {
                    if let Ok(channel) = result {
                        channel.close();
                    }
                }
            }
        });
    }

    /// Send `data` over the live session.
    ///
    /// Without a session this reports "not connected" and never touches
    /// the transport. A failed write is reported but leaves the session up.
    pub async fn send(&self, data: &[u8]) {
        let (token, pump) = {
            let inner = self.shared.inner.lock();
            match &inner.slot {
                Slot::Connected { token, pump, .. } => (*token, pump.clone()),
                _ => {
                    warn!("Not connected, cannot send {} bytes", data.len());
                    self.shared.emit(ConnectionEvent::Error(LinkError::NotConnected));
                    return;
                }
            }
        };

        if let Err(e) = pump.write(data).await {
            let inner = self.shared.inner.lock();
            if inner.token == token {
                self.shared.emit(ConnectionEvent::Error(e));
            } else {
                debug!("Dropping write error from superseded session");
            }
        }
    }

    /// Tear down whatever is active. A no-op when nothing is.
    pub fn disconnect(&self) {
        let mut inner = self.shared.inner.lock();
        if !inner.teardown() {
            debug!("Disconnect requested with no active connection");
            return;
        }

        info!("Disconnected");
        inner.state = ConnectionState::Disconnected;
        self.shared.emit(ConnectionEvent::Disconnected);
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.shared.inner.lock().teardown();
    }
}
