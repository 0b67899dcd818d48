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

//! Streaming motor patterns.
//!
//! A [`FrameSource`] produces frames; the worker sends one per tick until it
//! is told to stop or the session stops accepting commands, then silences the
//! motors and hands them back to the onboard algorithm.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::bluetooth::{DeviceSession, MotorFrame};
use crate::psychophysics;

/// Shortest frame period the worker will run at.
const MIN_FRAME_INTERVAL: Duration = Duration::from_millis(1);

/// Produces the next frame of a pattern.
pub trait FrameSource: Send {
    fn next_frame(&mut self, motor_count: usize) -> MotorFrame;
}

impl<F> FrameSource for F
where
    F: FnMut(usize) -> MotorFrame + Send,
{
    fn next_frame(&mut self, motor_count: usize) -> MotorFrame {
        self(motor_count)
    }
}

/// Walks a single active actuator across the device while its amplitude
/// ramps from `min` to `max` and wraps.
#[derive(Debug, Clone)]
pub struct SweepPattern {
    min: u8,
    max: u8,
    amplitude: u8,
    motor: usize,
}

impl SweepPattern {
    pub fn new(min: u8, max: u8) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            min,
            max,
            amplitude: min,
            motor: 0,
        }
    }
}

impl FrameSource for SweepPattern {
    fn next_frame(&mut self, motor_count: usize) -> MotorFrame {
        let mut frame = MotorFrame::zeroed(motor_count);
        if motor_count == 0 {
            return frame;
        }

        frame.set(self.motor % motor_count, self.amplitude);
        self.motor = (self.motor + 1) % motor_count;
        self.amplitude = if self.amplitude >= self.max {
            self.min
        } else {
            self.amplitude + 1
        };
        frame
    }
}

/// Moves a single perceived vibration point back and forth across the device.
#[derive(Debug, Clone)]
pub struct IllusionSweep {
    intensity: f32,
    step: f32,
    location: f32,
    forward: bool,
}

impl IllusionSweep {
    /// `intensity` is perceptual on [0, 1]; `step` is the distance travelled
    /// per frame on the same scale.
    pub fn new(intensity: f32, step: f32) -> Self {
        Self {
            intensity: intensity.clamp(0.0, 1.0),
            step: step.abs().clamp(f32::EPSILON, 1.0),
            location: 0.0,
            forward: true,
        }
    }
}

impl FrameSource for IllusionSweep {
    fn next_frame(&mut self, motor_count: usize) -> MotorFrame {
        let frame = psychophysics::illusion_activation(self.intensity, self.location, motor_count);

        let next = if self.forward {
            self.location + self.step
        } else {
            self.location - self.step
        };
        if next >= 1.0 {
            self.location = 1.0;
            self.forward = false;
        } else if next <= 0.0 {
            self.location = 0.0;
            self.forward = true;
        } else {
            self.location = next;
        }
        frame
    }
}

/// Control handle for a running pattern worker.
pub(crate) struct PatternHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PatternHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal the worker and wait until it has drained.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.task.await {
            error!("Pattern worker failed: {}", e);
        }
    }
}

pub(crate) struct PatternWorker;

impl PatternWorker {
    pub fn spawn(
        session: DeviceSession,
        source: Box<dyn FrameSource>,
        interval: Duration,
    ) -> PatternHandle {
        if interval < MIN_FRAME_INTERVAL {
            warn!("Frame interval {:?} too short, using {:?}", interval, MIN_FRAME_INTERVAL);
        }
        let interval = interval.max(MIN_FRAME_INTERVAL);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(Self::run(session, source, interval, stop_rx));
        PatternHandle { stop_tx, task }
    }

    async fn run(
        session: DeviceSession,
        mut source: Box<dyn FrameSource>,
        interval: Duration,
        mut stop_rx: watch::Receiver<bool>,
    ) {
        let motor_count = session.settings().motor_count;
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut frames: u64 = 0;

        loop {
            tokio::select! {
                biased;
                _ = stop_rx.changed() => {
                    debug!("Pattern stop requested");
                    break;
                }
                _ = ticker.tick() => {
                    let frame = source.next_frame(motor_count);
                    if !session.vibrate_motors(frame.amplitudes()) {
                        info!("Session stopped accepting frames");
                        break;
                    }
                    frames += 1;
                }
            }
        }

        debug!("Pattern sent {} frames, draining", frames);
        session.stop_motors();
        session.resume_device_algorithm();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_walks_motors() {
        let mut sweep = SweepPattern::new(40, 255);
        let frames: Vec<_> = (0..5).map(|_| sweep.next_frame(4)).collect();

        assert_eq!(frames[0].amplitudes(), &[40, 0, 0, 0]);
        assert_eq!(frames[1].amplitudes(), &[0, 41, 0, 0]);
        assert_eq!(frames[2].amplitudes(), &[0, 0, 42, 0]);
        assert_eq!(frames[3].amplitudes(), &[0, 0, 0, 43]);
        assert_eq!(frames[4].amplitudes(), &[44, 0, 0, 0]);
    }

    #[test]
    fn test_sweep_wraps_to_min() {
        let mut sweep = SweepPattern::new(250, 252);
        let amplitudes: Vec<u8> = (0..5)
            .map(|_| *sweep.next_frame(1).amplitudes().first().unwrap())
            .collect();
        assert_eq!(amplitudes, vec![250, 251, 252, 250, 251]);
    }

    #[test]
    fn test_sweep_without_motors() {
        let mut sweep = SweepPattern::new(40, 255);
        assert!(sweep.next_frame(0).is_empty());
    }

    #[test]
    fn test_illusion_sweep_bounces() {
        let mut sweep = IllusionSweep::new(1.0, 0.5);

        assert_eq!(sweep.next_frame(4).amplitudes(), &[255, 0, 0, 0]);
        sweep.next_frame(4);
        assert_eq!(sweep.next_frame(4).amplitudes(), &[0, 0, 0, 255]);
        sweep.next_frame(4);
        assert_eq!(sweep.next_frame(4).amplitudes(), &[255, 0, 0, 0]);
    }

    #[test]
    fn test_closure_source() {
        let mut source = |count: usize| MotorFrame::padded(&[7], count).unwrap_or_default();
        assert_eq!(source.next_frame(3).amplitudes(), &[7, 0, 0]);
    }
}
