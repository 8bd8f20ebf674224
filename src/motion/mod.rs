//! Motion subsystem for gyro-assisted aiming.
//!
//! Implements a three-stage processing pipeline:
//!
//! 1. [`sampler`] - Raw IMU sample acquisition and unit conversion
//! 2. [`fusion`] - Gyro bias calibration (stillness detection)
//! 3. [`pipeline`] - Per-tick angular deltas with adaptive sensitivity
//!
//! # Architecture
//!
//! ```text
//! BMI160 ──► Sampler ──► Filter ──► Pipeline ──► VelocityEstimate
//!            (g, deg/s)  (bias)     (dt * sensitivity * rate)
//! ```
//!
//! The pipeline is pulled on demand by the gyro maintenance tick; a sensor
//! read failure or a missing sample degrades to the previous estimate and
//! never aborts the event loop.

pub mod fusion;
pub mod pipeline;
pub mod sampler;

pub use fusion::{MotionFilter, StillnessFilter};
pub use pipeline::{MotionPipeline, SensitivityCurve, VelocityEstimate};
pub use sampler::{Bmi160Sampler, MotionSample, MotionSampler};

use thiserror::Error;

/// Error types for the motion subsystem
#[derive(Debug, Error)]
pub enum MotionError {
    #[error("Failed to initialize IMU: {0}")]
    InitializationError(String),

    #[error("Sensor read failed: {0}")]
    SensorError(String),
}
