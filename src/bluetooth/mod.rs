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

//! Bluetooth communication module.
//!
//! Opens a single RFCOMM stream connection to a remote device and moves
//! raw bytes over it.

#[cfg(feature = "bluez")]
mod bluez;
mod channel;
mod connection;
mod connector;
mod manager;
pub mod memory;
mod transport;

#[cfg(feature = "bluez")]
pub use bluez::BluezTransport;
pub use channel::{IoChannel, StreamChannel};
pub use connection::{ConnectionEvent, PumpEvent, StreamPump, DEFAULT_CHUNK_SIZE};
pub use connector::Connector;
pub use manager::{ConnectionManager, LinkSettings};
pub use memory::{MemoryTransport, PeerHandle, PeerMode};
pub use transport::{DeviceId, ServiceTarget, Transport, DEFAULT_RFCOMM_CHANNEL, SPP_UUID};
