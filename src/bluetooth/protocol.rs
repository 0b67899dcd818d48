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

//! Device CLI protocol: command line encoding and notification decoding.
//!
//! Commands are newline-terminated ASCII lines written to the UART RX
//! characteristic. Motor frames travel as base64 inside the `motors vibrate`
//! line. Everything the device sends back is UTF-8 text, some of which is a
//! JSON event.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::Deserialize;
use tracing::debug;

/// Line terminator expected by the device CLI.
pub const LINE_TERMINATOR: char = '\n';

/// One amplitude per actuator, 0 (off) to 255 (full).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MotorFrame {
    amplitudes: Vec<u8>,
}

impl MotorFrame {
    /// A frame with every actuator off.
    pub fn zeroed(motor_count: usize) -> Self {
        Self {
            amplitudes: vec![0; motor_count],
        }
    }

    /// Build a frame for `motor_count` actuators, zero-padding missing entries.
    ///
    /// Returns `None` when more amplitudes than actuators are given; such a
    /// frame cannot be sent without dropping data.
    pub fn padded(amplitudes: &[u8], motor_count: usize) -> Option<Self> {
        if amplitudes.len() > motor_count {
            return None;
        }
        let mut frame = Self::zeroed(motor_count);
        frame.amplitudes[..amplitudes.len()].copy_from_slice(amplitudes);
        Some(frame)
    }

    /// Set one actuator. Out-of-range indices are ignored.
    pub fn set(&mut self, index: usize, amplitude: u8) {
        if let Some(slot) = self.amplitudes.get_mut(index) {
            *slot = amplitude;
        }
    }

    pub fn amplitudes(&self) -> &[u8] {
        &self.amplitudes
    }

    pub fn len(&self) -> usize {
        self.amplitudes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.amplitudes.is_empty()
    }

    /// True when every actuator is off.
    pub fn is_silent(&self) -> bool {
        self.amplitudes.iter().all(|a| *a == 0)
    }
}

impl From<Vec<u8>> for MotorFrame {
    fn from(amplitudes: Vec<u8>) -> Self {
        Self { amplitudes }
    }
}

/// Commands understood by the device CLI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// Request developer authorization.
    DeveloperAuth,
    /// Accept the developer terms after `DeveloperAuth`.
    AcceptTerms,
    /// Start microphone acquisition and the onboard algorithm.
    AudioStart,
    /// Stop microphone acquisition.
    AudioStop,
    /// Battery state of charge.
    BatteryLevel,
    /// Device and firmware information.
    DeviceInfo,
    /// Drop frames waiting in the motor FIFO.
    ClearMotorQueue,
    /// Start the motor drivers.
    EnableMotors,
    /// Clear the queue and shut the motor drivers down.
    DisableMotors,
    /// Set actuator amplitudes.
    Vibrate(MotorFrame),
}

impl CliCommand {
    /// Command text without arguments.
    pub fn name(&self) -> &'static str {
        match self {
            Self::DeveloperAuth => "auth as developer",
            Self::AcceptTerms => "accept",
            Self::AudioStart => "audio start",
            Self::AudioStop => "audio stop",
            Self::BatteryLevel => "device battery_soc",
            Self::DeviceInfo => "device info",
            Self::ClearMotorQueue => "motors clear_queue",
            Self::EnableMotors => "motors start",
            Self::DisableMotors => "motors stop",
            Self::Vibrate(_) => "motors vibrate",
        }
    }

    /// Encode to the bytes written on the wire.
    pub fn encode(&self) -> Vec<u8> {
        match self {
            Self::Vibrate(frame) => encode_motor_frame(frame.amplitudes()),
            other => encode(other.name(), ""),
        }
    }

    /// Parse a command line, with or without its terminator.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.strip_suffix(LINE_TERMINATOR).unwrap_or(line);
        match line {
            "auth as developer" => Some(Self::DeveloperAuth),
            "accept" => Some(Self::AcceptTerms),
            "audio start" => Some(Self::AudioStart),
            "audio stop" => Some(Self::AudioStop),
            "device battery_soc" => Some(Self::BatteryLevel),
            "device info" => Some(Self::DeviceInfo),
            "motors clear_queue" => Some(Self::ClearMotorQueue),
            "motors start" => Some(Self::EnableMotors),
            "motors stop" => Some(Self::DisableMotors),
            _ => {
                let payload = line.strip_prefix("motors vibrate ")?;
                let amplitudes = BASE64.decode(payload).ok()?;
                Some(Self::Vibrate(MotorFrame::from(amplitudes)))
            }
        }
    }
}

/// Encode `"<command> <args>\n"`.
///
/// No escaping is done; neither part may contain a newline.
pub fn encode(command: &str, args: &str) -> Vec<u8> {
    let line = if args.is_empty() {
        format!("{}{}", command, LINE_TERMINATOR)
    } else {
        format!("{} {}{}", command, args, LINE_TERMINATOR)
    };
    line.into_bytes()
}

/// Encode a `motors vibrate` line carrying raw amplitudes as base64.
pub fn encode_motor_frame(amplitudes: &[u8]) -> Vec<u8> {
    encode("motors vibrate", &BASE64.encode(amplitudes))
}

/// Decode notification bytes as text. Invalid UTF-8 is replaced, not rejected.
pub fn decode_notification(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Typed events the device reports as JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredEvent {
    /// A hardware button was pressed (ordinal 1-3).
    ButtonPress(u8),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
enum WireEvent {
    ButtonPress { button_val: u8 },
}

/// Try to read `text` as a structured event.
///
/// Anything that is not a recognised event yields `None`; the caller keeps
/// the raw text as the response.
pub fn parse_structured_event(text: &str) -> Option<StructuredEvent> {
    match serde_json::from_str::<WireEvent>(text.trim()) {
        Ok(WireEvent::ButtonPress { button_val }) if (1..=3).contains(&button_val) => {
            Some(StructuredEvent::ButtonPress(button_val))
        }
        Ok(WireEvent::ButtonPress { button_val }) => {
            debug!("Ignoring button press with ordinal {}", button_val);
            None
        }
        Err(_) => None,
    }
}
