//! IMU sample acquisition.
//!
//! The BMI160 is read over I2C through the `bmi160` driver crate. Raw LSB
//! readings convert to physical units here so everything downstream works
//! in g and deg/s; the 24-bit sensor-time counter converts to seconds.

use crate::motion::MotionError;
use bmi160::{
    AccelerometerPowerMode, Bmi160, GyroscopePowerMode, SensorSelector, SlaveAddr,
};
use linux_embedded_hal::I2cdev;
use tracing::{debug, info};

/// One calibrated IMU reading in the sensor clock domain.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSample {
    /// Acceleration in g.
    pub accel: [f32; 3],
    /// Angular rate in deg/s.
    pub gyro: [f32; 3],
    /// Monotonic sensor time in seconds.
    pub sensor_time: f64,
}

/// Source of IMU samples. `Ok(None)` is the no-new-data sentinel; callers
/// treat it as zero-delta input, not an error.
pub trait MotionSampler {
    fn read_sample(&mut self) -> Result<Option<MotionSample>, MotionError>;
}

// Scale factors for the power-on default ranges (±2 g, ±2000 deg/s).
const LSB_PER_G: f32 = 16384.0;
const LSB_PER_DPS: f32 = 16.4;
// The sensor-time counter increments every 39 µs.
const SENSOR_TICK_SECS: f64 = 39.0e-6;

type Bmi160Driver = Bmi160<bmi160::interface::I2cInterface<I2cdev>>;

/// BMI160 over the Linux I2C character device.
pub struct Bmi160Sampler {
    driver: Bmi160Driver,
}

impl Bmi160Sampler {
    pub fn open(i2c_path: &str, alt_addr: bool) -> Result<Self, MotionError> {
        info!("Opening BMI160 on {}", i2c_path);
        let i2c = I2cdev::new(i2c_path)
            .map_err(|e| MotionError::InitializationError(format!("{e:?}")))?;

        let addr = if alt_addr {
            SlaveAddr::Alternative(true)
        } else {
            SlaveAddr::default()
        };
        let mut driver = Bmi160::new_with_i2c(i2c, addr);

        driver
            .set_accel_power_mode(AccelerometerPowerMode::Normal)
            .map_err(|e| MotionError::InitializationError(format!("{e:?}")))?;
        driver
            .set_gyro_power_mode(GyroscopePowerMode::Normal)
            .map_err(|e| MotionError::InitializationError(format!("{e:?}")))?;

        info!("BMI160 powered on (accel + gyro normal mode)");
        Ok(Self { driver })
    }
}

impl MotionSampler for Bmi160Sampler {
    fn read_sample(&mut self) -> Result<Option<MotionSample>, MotionError> {
        let selector = SensorSelector::new().accel().gyro().time();
        let data = self
            .driver
            .data(selector)
            .map_err(|e| MotionError::SensorError(format!("{e:?}")))?;

        let (Some(accel), Some(gyro), Some(time)) = (data.accel, data.gyro, data.time) else {
            debug!("Incomplete IMU reading, treating as no new data");
            return Ok(None);
        };

        Ok(Some(MotionSample {
            accel: [
                accel.x as f32 / LSB_PER_G,
                accel.y as f32 / LSB_PER_G,
                accel.z as f32 / LSB_PER_G,
            ],
            gyro: [
                gyro.x as f32 / LSB_PER_DPS,
                gyro.y as f32 / LSB_PER_DPS,
                gyro.z as f32 / LSB_PER_DPS,
            ],
            sensor_time: time as f64 * SENSOR_TICK_SECS,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sensor_tick_scales_to_seconds() {
        // 25641 ticks at 39 µs is just shy of one second.
        let secs = 25641.0 * SENSOR_TICK_SECS;
        assert!((secs - 1.0).abs() < 1e-3);
    }

    #[test]
    fn full_scale_lsb_converts_to_range_limits() {
        // ±2 g over the 16-bit range is exact; the datasheet gyro constant
        // 16.4 sits within rounding of 32768 / 2000.
        assert_eq!(32768.0 / LSB_PER_G, 2.0);
        assert!((LSB_PER_DPS - 32768.0 / 2000.0).abs() < 0.02);
    }
}
