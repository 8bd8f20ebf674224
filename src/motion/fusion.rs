//! Gyro calibration filter.
//!
//! Stand-in for a full sensor-fusion stack: the only output the pipeline
//! needs is a bias-corrected angular rate. Bias is learned while the
//! device is held still (small gyro spread, accel magnitude near 1 g) and
//! re-armed on every reset.

use std::collections::VecDeque;
use tracing::debug;

/// Calibration capability consumed by the motion pipeline.
pub trait MotionFilter {
    /// Clears learned state and re-arms stillness calibration.
    fn reset(&mut self);

    /// Feeds one sample. `gyro` in deg/s, `accel` in g, `dt` in seconds.
    fn process_motion(&mut self, gyro: [f32; 3], accel: [f32; 3], dt: f64);

    /// Bias-corrected angular rate of the most recent sample, deg/s.
    fn calibrated_gyro(&self) -> [f32; 3];
}

// Stillness thresholds: gyro spread within the window and deviation of
// accel magnitude from 1 g.
const STILLNESS_SPREAD_DPS: f32 = 1.5;
const STILLNESS_ACCEL_G: f32 = 0.1;
const WINDOW_LEN: usize = 64;
// Per-sample blend of the window mean into the bias while still.
const BIAS_ALPHA: f32 = 0.05;

/// Rolling-window stillness calibration.
pub struct StillnessFilter {
    window: VecDeque<[f32; 3]>,
    bias: [f32; 3],
    latest: [f32; 3],
    calibrating: bool,
}

impl StillnessFilter {
    pub fn new() -> Self {
        Self {
            window: VecDeque::with_capacity(WINDOW_LEN),
            bias: [0.0; 3],
            latest: [0.0; 3],
            calibrating: true,
        }
    }

    pub fn is_calibrating(&self) -> bool {
        self.calibrating
    }

    fn window_mean(&self) -> [f32; 3] {
        let n = self.window.len() as f32;
        let mut mean = [0.0; 3];
        for sample in &self.window {
            for axis in 0..3 {
                mean[axis] += sample[axis] / n;
            }
        }
        mean
    }

    fn window_spread(&self, mean: [f32; 3]) -> f32 {
        self.window
            .iter()
            .map(|s| {
                (0..3)
                    .map(|axis| (s[axis] - mean[axis]).abs())
                    .fold(0.0f32, f32::max)
            })
            .fold(0.0f32, f32::max)
    }
}

impl Default for StillnessFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl MotionFilter for StillnessFilter {
    fn reset(&mut self) {
        debug!("Resetting motion filter, calibration re-armed");
        self.window.clear();
        self.bias = [0.0; 3];
        self.latest = [0.0; 3];
        self.calibrating = true;
    }

    fn process_motion(&mut self, gyro: [f32; 3], accel: [f32; 3], _dt: f64) {
        if self.window.len() == WINDOW_LEN {
            self.window.pop_front();
        }
        self.window.push_back(gyro);

        let accel_mag = (accel[0] * accel[0] + accel[1] * accel[1] + accel[2] * accel[2]).sqrt();
        if self.window.len() == WINDOW_LEN && (accel_mag - 1.0).abs() < STILLNESS_ACCEL_G {
            let mean = self.window_mean();
            if self.window_spread(mean) < STILLNESS_SPREAD_DPS {
                for axis in 0..3 {
                    self.bias[axis] += (mean[axis] - self.bias[axis]) * BIAS_ALPHA;
                }
                self.calibrating = false;
            }
        }

        for axis in 0..3 {
            self.latest[axis] = gyro[axis] - self.bias[axis];
        }
    }

    fn calibrated_gyro(&self) -> [f32; 3] {
        self.latest
    }
}
