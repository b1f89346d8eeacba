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

//! Console input parsing.
//!
//! A line starting with `/` is a command; anything else is data to send.
//! `//` escapes a leading slash.

use crate::bluetooth::DeviceId;

/// Console command types.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Connect to a device, superseding the current one.
    Connect(DeviceId),
    /// Tear down the current connection.
    Disconnect,
    /// Print connection status.
    Status,
    /// Start device discovery.
    Scan,
    /// Stop device discovery.
    StopScan,
    /// Disconnect and exit.
    Quit,
}

impl ConsoleCommand {
    /// Parse from a command word and its argument.
    pub fn parse(word: &str, arg: Option<&str>) -> Result<Self, String> {
        match word.trim().to_lowercase().as_str() {
            "connect" => match arg.map(str::trim).filter(|a| !a.is_empty()) {
                Some(address) => Ok(Self::Connect(DeviceId::from(address))),
                None => Err("usage: /connect <address>".to_string()),
            },
            "disconnect" => Ok(Self::Disconnect),
            "status" => Ok(Self::Status),
            "scan" => Ok(Self::Scan),
            "stop-scan" => Ok(Self::StopScan),
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command: /{}", other)),
        }
    }

    /// Get the command word.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::Disconnect => "disconnect",
            Self::Status => "status",
            Self::Scan => "scan",
            Self::StopScan => "stop-scan",
            Self::Quit => "quit",
        }
    }
}

/// One line of console input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Command(ConsoleCommand),
    /// Bytes to send as typed, without a line terminator.
    Data(Vec<u8>),
    /// Malformed command.
    Invalid(String),
    /// Blank line.
    Empty,
}

/// Classify a console line.
pub fn parse_line(line: &str) -> ConsoleInput {
    let line = line.trim_end_matches(['\r', '\n']);
    if line.is_empty() {
        return ConsoleInput::Empty;
    }

    if let Some(escaped) = line.strip_prefix("//") {
        let mut data = Vec::with_capacity(escaped.len() + 1);
        data.push(b'/');
        data.extend_from_slice(escaped.as_bytes());
        return ConsoleInput::Data(data);
    }

    match line.strip_prefix('/') {
        Some(command) => {
            let mut parts = command.splitn(2, char::is_whitespace);
            let word = parts.next().unwrap_or_default();
            match ConsoleCommand::parse(word, parts.next()) {
                Ok(command) => ConsoleInput::Command(command),
                Err(message) => ConsoleInput::Invalid(message),
            }
        }
        None => ConsoleInput::Data(line.as_bytes().to_vec()),
    }
}
