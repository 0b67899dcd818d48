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

//! Host-side control of a BLE haptic wristband.
//!
//! [`bluetooth::SessionHost`] owns the single [`bluetooth::DeviceSession`],
//! which finds the device, keeps the link alive and exposes the device CLI
//! as typed commands. [`psychophysics`] turns perceptual intensities into
//! motor amplitudes and [`pattern`] streams frames to the motors.

pub mod bluetooth;
pub mod config;
pub mod events;
pub mod pattern;
pub mod psychophysics;
pub mod state;
