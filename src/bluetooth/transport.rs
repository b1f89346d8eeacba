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

//! Transport boundary: device identifiers, service targets and the
//! adapter abstraction the link engine drives.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::sync::Arc;
use uuid::Uuid;

use super::channel::StreamChannel;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// RFCOMM channel to use.
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Identifier of a remote endpoint, usually its Bluetooth address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The service a connection is opened against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTarget {
    /// Service record UUID.
    pub uuid: Uuid,
    /// RFCOMM channel the service listens on.
    pub channel: u8,
}

impl Default for ServiceTarget {
    fn default() -> Self {
        Self {
            uuid: SPP_UUID,
            channel: DEFAULT_RFCOMM_CHANNEL,
        }
    }
}

/// Adapter-level operations the link engine relies on.
///
/// Implementations must make `open_channel` cancel-safe: dropping the
/// returned future releases any half-open socket.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Whether an adapter exists at all.
    async fn is_available(&self) -> bool;

    /// Whether the adapter is powered on.
    async fn is_enabled(&self) -> bool;

    /// Whether device discovery is currently running.
    async fn is_discovering(&self) -> bool;

    /// Halt any running discovery.
    async fn pause_discovery(&self) -> io::Result<()>;

    /// Open a stream channel to `device`.
    async fn open_channel(
        &self,
        device: &DeviceId,
        target: &ServiceTarget,
    ) -> io::Result<Arc<dyn StreamChannel>>;
}
