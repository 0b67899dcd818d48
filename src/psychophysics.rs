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

//! Perceptual motor encodings for the wristband.
//!
//! A linear change in motor amplitude does not feel like a linear change in
//! vibration strength, so intensities are requested on a perceptual [0, 1]
//! scale and mapped onto motor amplitudes here.

use std::f64::consts::E;

use crate::bluetooth::MotorFrame;

/// Lowest amplitude that is still reliably felt.
pub const MIN_INTENSITY: u8 = 15;

/// Full amplitude.
pub const MAX_INTENSITY: u8 = 255;

/// Actuators on the reference device.
pub const MOTOR_COUNT: usize = 4;

/// Motor off.
pub const MIN_VIBRATION_AMP: u8 = 0;

/// Motor at full amplitude.
pub const MAX_VIBRATION_AMP: u8 = 255;

/// Map a perceptual intensity on [0, 1] to a motor amplitude on [min, max].
///
/// Uses an exponential curve anchored so that 0 maps to `min` and 1 to `max`.
pub fn motor_intensity(linear: f32, min: u8, max: u8) -> u8 {
    if linear <= 0.0 {
        return min;
    }
    if linear >= 1.0 {
        return max;
    }
    let curve = (f64::from(linear)).exp_m1() / (E - 1.0);
    let span = f64::from(max) - f64::from(min);
    (curve * span + f64::from(min)).round() as u8
}

/// Activations producing a single perceived vibration point at `location`.
///
/// The point sits between the two nearest actuators, which share the
/// intensity by a constant-power pan law. `location` is clamped to [0, 1].
pub fn illusion_activation(linear: f32, location: f32, motor_count: usize) -> MotorFrame {
    let mut frame = MotorFrame::zeroed(motor_count);
    if linear <= 0.0 || motor_count == 0 {
        return frame;
    }

    let base = f64::from(motor_intensity(linear, MIN_INTENSITY, MAX_INTENSITY));
    let position = f64::from(location.clamp(0.0, 1.0)) * (motor_count - 1) as f64;
    let lower = position.floor();
    let upper = position.ceil();

    for index in [lower, upper] {
        let distance = (position - index).abs();
        let activation = (base * (1.0 - distance).sqrt()) as u8;
        // lower == upper writes the same value twice
        frame.set(index as usize, activation);
    }

    frame
}
