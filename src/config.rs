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
//! Handles loading application settings. The file is only ever read.

use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bluetooth::ble_constants::config as defaults;
use crate::bluetooth::{ScanFilter, SessionSettings};

/// Application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which device to connect to.
    pub device: DeviceConfig,

    /// Session timing.
    pub session: SessionConfig,

    /// Demo pattern settings.
    pub pattern: PatternConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Name fragments to match while scanning.
    pub names: Vec<String>,

    /// Exact Bluetooth address; takes precedence over `names`.
    pub address: Option<String>,

    /// Reconnect automatically after the link drops.
    pub auto_reconnect: bool,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            names: vec!["Buzz".to_string()],
            address: None,
            auto_reconnect: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of actuators on the device.
    pub motor_count: usize,

    /// Delay before an automatic reconnect, in milliseconds.
    pub reconnect_delay_ms: u64,

    /// Delay between resuming the device algorithm and disconnecting.
    pub disconnect_grace_ms: u64,

    /// Also reconnect after a disconnect we asked for.
    pub reconnect_after_requested_disconnect: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            motor_count: defaults::DEFAULT_MOTOR_COUNT,
            reconnect_delay_ms: defaults::RECONNECT_DELAY_MS,
            disconnect_grace_ms: defaults::DISCONNECT_GRACE_MS,
            reconnect_after_requested_disconnect: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// Interval between frames in milliseconds.
    pub frame_interval_ms: u64,

    /// Lowest amplitude of the sweep.
    pub min_intensity: u8,

    /// Highest amplitude of the sweep.
    pub max_intensity: u8,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            frame_interval_ms: defaults::FRAME_INTERVAL_MS,
            min_intensity: 40,
            max_intensity: 255,
        }
    }
}

impl Config {
    /// Load configuration from the user config directory, or defaults.
    pub fn load() -> Result<Self> {
        Self::from_path(&Self::path())
    }

    /// Default location of the configuration file.
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("buzzlink")
            .join("config.toml")
    }

    /// Load configuration from `path`; a missing file yields defaults.
    pub fn from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(
            self.pattern.frame_interval_ms > 0,
            "pattern.frame_interval_ms must be greater than zero"
        );
        ensure!(
            self.session.motor_count > 0,
            "session.motor_count must be greater than zero"
        );
        Ok(())
    }

    /// Discovery filter for the configured device.
    pub fn scan_filter(&self) -> ScanFilter {
        match &self.device.address {
            Some(address) if !address.is_empty() => ScanFilter::ByAddress(address.clone()),
            _ => ScanFilter::ByNames(self.device.names.clone()),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            motor_count: self.session.motor_count,
            reconnect_delay: Duration::from_millis(self.session.reconnect_delay_ms),
            disconnect_grace: Duration::from_millis(self.session.disconnect_grace_ms),
            frame_interval: Duration::from_millis(self.pattern.frame_interval_ms),
            reconnect_after_requested_disconnect: self
                .session
                .reconnect_after_requested_disconnect,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::from_path(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(config.session_settings(), SessionSettings::default());
        // Never written back.
        assert!(!dir.path().join("config.toml").exists());
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[session]\nreconnect_delay_ms = 1000\n\n[pattern]\nmin_intensity = 60\n",
        )
        .unwrap();

        let config = Config::from_path(&path).unwrap();
        assert_eq!(config.session.reconnect_delay_ms, 1000);
        assert_eq!(config.session.motor_count, 4);
        assert_eq!(config.pattern.min_intensity, 60);
        assert_eq!(config.pattern.max_intensity, 255);
        assert_eq!(
            config.session_settings().reconnect_delay,
            Duration::from_secs(1)
        );
    }

    #[test]
    fn test_scan_filter_prefers_address() {
        let mut config = Config::default();
        assert_eq!(
            config.scan_filter(),
            ScanFilter::ByNames(vec!["Buzz".to_string()])
        );

        config.device.address = Some("EB:CA:85:38:19:1D".to_string());
        assert_eq!(
            config.scan_filter(),
            ScanFilter::ByAddress("EB:CA:85:38:19:1D".to_string())
        );
    }

    #[test]
    fn test_zero_frame_interval_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pattern]\nframe_interval_ms = 0\n").unwrap();

        let err = Config::from_path(&path).unwrap_err();
        assert!(err.to_string().contains("frame_interval_ms"));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[session\nmotor_count = ").unwrap();

        assert!(Config::from_path(&path).is_err());
    }
}
