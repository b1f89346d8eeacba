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

//! rfcomm-link console application

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rfcomm_link::bluetooth::{BluezTransport, ConnectionEvent, ConnectionManager};
use rfcomm_link::commands::{parse_line, ConsoleCommand, ConsoleInput};
use rfcomm_link::config::{Config, DisplayMode};
use rfcomm_link::events::EventProcessor;

/// Exchange raw bytes with a Bluetooth device over RFCOMM.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address of the device to connect to on start
    address: Option<String>,

    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print received bytes as hex
    #[arg(long)]
    hex: bool,

    /// Connect timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging; stdout carries the data
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rfcomm_link=info".parse()?),
        )
        .init();

    info!("Starting rfcomm-link v{}...", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if args.hex {
        config.display.mode = DisplayMode::Hex;
    }
    if let Some(secs) = args.timeout {
        config.link.connect_timeout_secs = Some(secs);
    }
    info!("Configuration loaded");

    let transport = Arc::new(BluezTransport::new().await?);
    let mut manager = ConnectionManager::new(transport.clone(), config.link.settings());
    let mut events = manager
        .take_event_receiver()
        .ok_or_else(|| anyhow!("event receiver already taken"))?;
    let mut processor = EventProcessor::new(std::io::stdout(), config.display.mode);

    if let Some(address) = args.address {
        manager.connect(address).await;
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                let terminal = matches!(
                    event,
                    ConnectionEvent::Disconnected | ConnectionEvent::Error(_)
                );
                if let Err(e) = processor.process_event(&event) {
                    error!("Error rendering event: {}", e);
                }
                if terminal && !stdin_open && !manager.state().is_active() {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line? else {
                    info!("Input closed");
                    stdin_open = false;
                    if !manager.state().is_active() {
                        break;
                    }
                    continue;
                };

                match parse_line(&line) {
                    ConsoleInput::Empty => {}
                    ConsoleInput::Data(bytes) => manager.send(&bytes).await,
                    ConsoleInput::Invalid(message) => processor.note(&message)?,
                    ConsoleInput::Command(command) => match command {
                        ConsoleCommand::Connect(device) => manager.connect(device).await,
                        ConsoleCommand::Disconnect => manager.disconnect(),
                        ConsoleCommand::Status => {
                            let status = format!(
                                "{} - {}",
                                manager.state().as_str(),
                                processor.status_line()
                            );
                            processor.note(&status)?;
                        }
                        ConsoleCommand::Scan => {
                            if let Err(e) = transport.start_discovery().await {
                                processor.note(&format!("scan failed: {}", e))?;
                            }
                        }
                        ConsoleCommand::StopScan => {
                            if !transport.stop_scan() {
                                processor.note("no scan running")?;
                            }
                        }
                        ConsoleCommand::Quit => {
                            info!("Quit requested");
                            break;
                        }
                    },
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    manager.disconnect();
    while let Ok(event) = events.try_recv() {
        processor.process_event(&event)?;
    }

    info!("rfcomm-link stopped");
    Ok(())
}
