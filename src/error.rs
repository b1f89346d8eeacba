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

//! Error types for the link engine.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Coarse classification of a [`LinkError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No adapter present.
    TransportUnavailable,
    /// Adapter present but powered off.
    TransportDisabled,
    /// The platform refused a privileged operation.
    PermissionDenied,
    /// The transport-level connect did not produce a channel.
    ConnectFailed,
    /// Read or write failed on an established channel.
    StreamIo,
    /// Operation not valid in the current state.
    InvalidState,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TransportUnavailable => "TransportUnavailable",
            ErrorKind::TransportDisabled => "TransportDisabled",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::ConnectFailed => "ConnectFailed",
            ErrorKind::StreamIo => "StreamIOError",
            ErrorKind::InvalidState => "InvalidState",
        }
    }
}

/// Errors reported by the link engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("TransportUnavailable")]
    TransportUnavailable,

    #[error("TransportDisabled")]
    TransportDisabled,

    #[error("PermissionDenied: {0}")]
    PermissionDenied(String),

    #[error("ConnectFailed: {0}")]
    ConnectFailed(String),

    #[error("ConnectFailed: invalid device id {0}")]
    InvalidDeviceId(String),

    #[error("ConnectFailed: timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("ConnectFailed: attempt cancelled")]
    Cancelled,

    #[error("StreamIOError: {0}")]
    StreamIo(String),

    #[error("not connected")]
    NotConnected,

    #[error("InvalidState: {0}")]
    InvalidState(String),
}

impl LinkError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LinkError::TransportUnavailable => ErrorKind::TransportUnavailable,
            LinkError::TransportDisabled => ErrorKind::TransportDisabled,
            LinkError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            LinkError::ConnectFailed(_)
            | LinkError::InvalidDeviceId(_)
            | LinkError::ConnectTimeout(_)
            | LinkError::Cancelled => ErrorKind::ConnectFailed,
            LinkError::StreamIo(_) => ErrorKind::StreamIo,
            LinkError::NotConnected | LinkError::InvalidState(_) => ErrorKind::InvalidState,
        }
    }

    /// Map an error from `Transport::open_channel`.
    pub fn from_connect_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => LinkError::PermissionDenied(err.to_string()),
            io::ErrorKind::InvalidInput => LinkError::InvalidDeviceId(err.to_string()),
            io::ErrorKind::TimedOut => LinkError::ConnectFailed(format!("timed out: {}", err)),
            _ => LinkError::ConnectFailed(err.to_string()),
        }
    }

    /// Map an error from a read or write on an open channel.
    pub fn from_stream_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::PermissionDenied => LinkError::PermissionDenied(err.to_string()),
            _ => LinkError::StreamIo(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;
