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

//! Buzzlink demo: connect to the wristband and play a sweep on its motors.

use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use buzzlink::bluetooth::{BluerTransport, SessionHost};
use buzzlink::config::Config;
use buzzlink::events::SessionEvent;
use buzzlink::pattern::SweepPattern;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("buzzlink=info".parse()?),
        )
        .init();

    info!("Starting Buzzlink v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded from {}", Config::path().display());

    // Initialize BLE central
    let (transport, transport_events) = BluerTransport::new(None).await?;
    let host = SessionHost::new(
        Arc::new(transport),
        transport_events,
        config.session_settings(),
    );

    let mut events = host.events().subscribe();
    let session = host.start(config.scan_filter(), config.device.auto_reconnect);
    info!("Ready. Waiting for device...");

    loop {
        tokio::select! {
            event = events.recv() => {
                match event {
                    Ok(SessionEvent::ConnectionChanged(connected)) => {
                        info!("Device {}", if connected { "connected" } else { "disconnected" });
                    }
                    Ok(SessionEvent::CliReadinessChanged(true)) => {
                        session.send_developer_auth();
                        session.accept_terms();
                        let pattern = SweepPattern::new(
                            config.pattern.min_intensity,
                            config.pattern.max_intensity,
                        );
                        if !session.start_pattern(pattern) {
                            warn!("Could not start pattern");
                        }
                    }
                    Ok(SessionEvent::CliReadinessChanged(false)) => {
                        info!("Device CLI unavailable");
                    }
                    Ok(SessionEvent::ResponseText(text)) => {
                        info!("Device: {}", text.trim_end());
                    }
                    Ok(SessionEvent::ButtonPress(button)) => {
                        info!("Button {} pressed", button);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!("Missed {} session events", missed);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    host.shutdown().await;
    info!("Buzzlink stopped");
    Ok(())
}
