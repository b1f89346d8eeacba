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

//! Event processing and console rendering.

use anyhow::Result;
use std::io::Write;
use tracing::{debug, error, info};

use crate::bluetooth::{ConnectionEvent, DeviceId};
use crate::config::DisplayMode;
use crate::error::ErrorKind;

/// Running counters for the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Device of the live session.
    pub device: Option<DeviceId>,
    pub connected: bool,
    pub bytes_received: usize,
    pub chunks_received: usize,
    /// Errors seen since start, across sessions.
    pub errors: usize,
}

/// Render received bytes for display.
pub fn render_data(bytes: &[u8], mode: DisplayMode) -> String {
    match mode {
        DisplayMode::Text => String::from_utf8_lossy(bytes).into_owned(),
        DisplayMode::Hex => hex::encode(bytes),
    }
}

/// Renders connection events to a writer and tracks the session.
pub struct EventProcessor<W: Write> {
    out: W,
    mode: DisplayMode,
    summary: SessionSummary,
}

impl<W: Write> EventProcessor<W> {
    /// Create a new event processor.
    pub fn new(out: W, mode: DisplayMode) -> Self {
        Self {
            out,
            mode,
            summary: SessionSummary::default(),
        }
    }

    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    /// Status line for `/status`.
    pub fn status_line(&self) -> String {
        match (&self.summary.device, self.summary.connected) {
            (Some(device), true) => format!(
                "connected to {} ({} bytes in {} chunks)",
                device, self.summary.bytes_received, self.summary.chunks_received
            ),
            _ => "not connected".to_string(),
        }
    }

    /// Write a free-form status line.
    pub fn note(&mut self, message: &str) -> Result<()> {
        writeln!(self.out, "[{}]", message)?;
        self.out.flush()?;
        Ok(())
    }

    /// Process a single event.
    pub fn process_event(&mut self, event: &ConnectionEvent) -> Result<()> {
        match event {
            ConnectionEvent::Connected { device } => {
                info!("Device connected: {}", device);
                // Counters are per session
                self.summary.device = Some(device.clone());
                self.summary.connected = true;
                self.summary.bytes_received = 0;
                self.summary.chunks_received = 0;
                writeln!(self.out, "[connected to {}]", device)?;
            }
            ConnectionEvent::Disconnected => {
                info!("Device disconnected");
                self.summary.connected = false;
                self.summary.device = None;
                writeln!(self.out, "[disconnected]")?;
            }
            ConnectionEvent::DataReceived(bytes) => {
                debug!("Data received: {} bytes", bytes.len());
                self.summary.bytes_received += bytes.len();
                self.summary.chunks_received += 1;
                writeln!(self.out, "< {}", render_data(bytes, self.mode))?;
            }
            ConnectionEvent::Error(e) => {
                error!("Connection error: {}", e);
                self.summary.errors += 1;
                // Only stream errors can leave a session up; every other
                // error comes from a connect or send with no live session.
                if e.kind() != ErrorKind::StreamIo {
                    self.summary.connected = false;
                    self.summary.device = None;
                }
                writeln!(self.out, "[error] {}", e)?;
            }
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;

    fn output(processor: EventProcessor<Vec<u8>>) -> String {
        String::from_utf8(processor.into_inner()).unwrap()
    }

    #[test]
    fn test_render_modes() {
        assert_eq!(render_data(b"hello", DisplayMode::Text), "hello");
        assert_eq!(render_data(&[0xde, 0xad, 0x01], DisplayMode::Hex), "dead01");
        assert_eq!(render_data(&[0x68, 0xff], DisplayMode::Text), "h\u{fffd}");
    }

    #[test]
    fn test_session_flow() {
        let mut processor = EventProcessor::new(Vec::new(), DisplayMode::Text);
        let device = DeviceId::from("AA:BB");

        processor
            .process_event(&ConnectionEvent::Connected { device: device.clone() })
            .unwrap();
        processor
            .process_event(&ConnectionEvent::DataReceived(b"hello".to_vec()))
            .unwrap();
        processor
            .process_event(&ConnectionEvent::DataReceived(b" world".to_vec()))
            .unwrap();

        assert_eq!(processor.summary().bytes_received, 11);
        assert_eq!(processor.summary().chunks_received, 2);
        assert_eq!(processor.status_line(), "connected to AA:BB (11 bytes in 2 chunks)");

        processor.process_event(&ConnectionEvent::Disconnected).unwrap();
        assert!(!processor.summary().connected);
        assert_eq!(processor.status_line(), "not connected");

        assert_eq!(
            output(processor),
            "[connected to AA:BB]\n< hello\n<  world\n[disconnected]\n"
        );
    }

    #[test]
    fn test_errors_are_counted() {
        let mut processor = EventProcessor::new(Vec::new(), DisplayMode::Hex);
        processor
            .process_event(&ConnectionEvent::Error(LinkError::NotConnected))
            .unwrap();
        processor
            .process_event(&ConnectionEvent::Error(LinkError::TransportDisabled))
            .unwrap();

        assert_eq!(processor.summary().errors, 2);
        assert_eq!(
            output(processor),
            "[error] not connected\n[error] TransportDisabled\n"
        );
    }

    #[test]
    fn test_rejected_connect_ends_session() {
        let mut processor = EventProcessor::new(Vec::new(), DisplayMode::Text);
        processor
            .process_event(&ConnectionEvent::Connected { device: DeviceId::from("A") })
            .unwrap();
        processor
            .process_event(&ConnectionEvent::Error(LinkError::TransportDisabled))
            .unwrap();

        assert!(!processor.summary().connected);
        assert_eq!(processor.summary().device, None);
        assert_eq!(processor.status_line(), "not connected");
    }

    #[test]
    fn test_write_error_keeps_session() {
        let mut processor = EventProcessor::new(Vec::new(), DisplayMode::Text);
        processor
            .process_event(&ConnectionEvent::Connected { device: DeviceId::from("A") })
            .unwrap();
        processor
            .process_event(&ConnectionEvent::Error(LinkError::StreamIo("broken pipe".into())))
            .unwrap();

        assert!(processor.summary().connected);
        assert_eq!(processor.status_line(), "connected to A (0 bytes in 0 chunks)");
    }

    #[test]
    fn test_reconnect_resets_counters() {
        let mut processor = EventProcessor::new(Vec::new(), DisplayMode::Text);
        processor
            .process_event(&ConnectionEvent::Connected { device: DeviceId::from("A") })
            .unwrap();
        processor
            .process_event(&ConnectionEvent::DataReceived(vec![1, 2, 3]))
            .unwrap();
        processor
            .process_event(&ConnectionEvent::Connected { device: DeviceId::from("B") })
            .unwrap();

        assert_eq!(processor.summary().device, Some(DeviceId::from("B")));
        assert_eq!(processor.summary().bytes_received, 0);
    }
}
