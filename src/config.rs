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

//! Configuration module.
//!
//! Handles loading and saving application settings.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use crate::bluetooth::{
    LinkSettings, ServiceTarget, DEFAULT_CHUNK_SIZE, DEFAULT_RFCOMM_CHANNEL, SPP_UUID,
};

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection settings.
    pub link: LinkConfig,

    /// Output settings.
    pub display: DisplayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Service record UUID of the remote service.
    pub service_uuid: Uuid,

    /// RFCOMM channel of the remote service.
    pub rfcomm_channel: u8,

    /// Maximum bytes per receive.
    pub read_chunk_size: usize,

    /// Abort a connect after this many seconds. Unset waits until cancelled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect_timeout_secs: Option<u64>,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            service_uuid: SPP_UUID,
            rfcomm_channel: DEFAULT_RFCOMM_CHANNEL,
            read_chunk_size: DEFAULT_CHUNK_SIZE,
            connect_timeout_secs: None,
        }
    }
}

impl LinkConfig {
    /// Runtime settings for the connection manager.
    pub fn settings(&self) -> LinkSettings {
        LinkSettings {
            target: ServiceTarget {
                uuid: self.service_uuid,
                channel: self.rfcomm_channel,
            },
            read_chunk_size: self.read_chunk_size.max(1),
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
        }
    }
}

/// How received bytes are printed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayMode {
    /// Lossy UTF-8.
    #[default]
    Text,
    /// Lowercase hex.
    Hex,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub mode: DisplayMode,
}

impl Config {
    /// Default location of the configuration file.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rfcomm-link")
            .join("config.toml")
    }

    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load configuration from `path`, writing defaults there if it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save configuration to `path`.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }
}
