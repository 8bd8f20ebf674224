//! Motion pipeline: samples to per-tick aiming deltas.
//!
//! `sample()` is safe to call at any rate; it is internally paced by the
//! sensor timestamp. The first call after construction or reset only
//! records the epoch and arms calibration, so callers always see a clean
//! zero before real motion data flows.

use crate::motion::{MotionFilter, MotionSampler};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

// Largest credible interval between consecutive samples. Anything wider
// means the maintenance tick was disarmed in between.
const MAX_SAMPLE_GAP_SECS: f64 = 0.25;

/// Per-tick angular delta for the two aiming axes.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VelocityEstimate {
    pub yaw: f64,
    pub pitch: f64,
}

/// Clamped linear interpolation from angular speed to a sensitivity
/// multiplier. The slow end damps hand tremor, the fast end lets
/// deliberate swings through, with a smooth blend between.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensitivityCurve {
    pub slow_factor: f32,
    pub fast_factor: f32,
    pub speed_min_thresh: f32,
    pub speed_max_thresh: f32,
}

impl Default for SensitivityCurve {
    fn default() -> Self {
        Self {
            slow_factor: 1.0,
            fast_factor: 2.0,
            speed_min_thresh: 0.0,
            speed_max_thresh: 75.0,
        }
    }
}

impl SensitivityCurve {
    pub fn multiplier(&self, speed: f32) -> f32 {
        let t = ((speed - self.speed_min_thresh)
            / (self.speed_max_thresh - self.speed_min_thresh))
            .clamp(0.0, 1.0);
        self.slow_factor * (1.0 - t) + self.fast_factor * t
    }
}

pub struct MotionPipeline {
    sampler: Box<dyn MotionSampler + Send>,
    filter: Box<dyn MotionFilter + Send>,
    curve: SensitivityCurve,
    settle: Duration,
    /// Sensor time of the previous sample; `None` until the warm-up tick.
    epoch: Option<f64>,
    settle_until: Option<Instant>,
    last: VelocityEstimate,
}

impl MotionPipeline {
    pub fn new(
        sampler: Box<dyn MotionSampler + Send>,
        filter: Box<dyn MotionFilter + Send>,
        curve: SensitivityCurve,
        settle: Duration,
    ) -> Self {
        Self {
            sampler,
            filter,
            curve,
            settle,
            epoch: None,
            settle_until: None,
            last: VelocityEstimate::default(),
        }
    }

    /// Returns to the first-sample state; the next `sample()` re-arms
    /// calibration and reports zero.
    pub fn reset(&mut self) {
        self.epoch = None;
        self.settle_until = None;
        self.last = VelocityEstimate::default();
        self.filter.reset();
    }

    pub fn sample(&mut self) -> VelocityEstimate {
        let sample = match self.sampler.read_sample() {
            Ok(Some(sample)) => sample,
            Ok(None) => return self.current(),
            Err(e) => {
                warn!("IMU read failed, keeping previous estimate: {}", e);
                return self.current();
            }
        };

        let Some(prev_time) = self.epoch else {
            debug!("Motion epoch at sensor time {:.3}s", sample.sensor_time);
            self.epoch = Some(sample.sensor_time);
            self.settle_until = Some(Instant::now() + self.settle);
            self.filter.reset();
            self.last = VelocityEstimate::default();
            return self.last;
        };

        let dt = sample.sensor_time - prev_time;
        self.epoch = Some(sample.sensor_time);
        if dt <= 0.0 || dt > MAX_SAMPLE_GAP_SECS {
            // Counter wrap, or a long gap while the tick was disarmed:
            // re-anchor and drop the stale estimate rather than turning
            // the whole gap into one huge angular delta.
            self.last = VelocityEstimate::default();
            return self.current();
        }

        self.filter.process_motion(sample.gyro, sample.accel, dt);
        let gyro = self.filter.calibrated_gyro();

        let speed = (gyro[0] * gyro[0] + gyro[1] * gyro[1]).sqrt();
        let sensitivity = self.curve.multiplier(speed) as f64;

        self.last = VelocityEstimate {
            yaw: dt * sensitivity * gyro[0] as f64,
            pitch: dt * sensitivity * gyro[1] as f64,
        };
        self.current()
    }

    fn settled(&self) -> bool {
        self.settle_until.map_or(false, |t| Instant::now() >= t)
    }

    fn current(&self) -> VelocityEstimate {
        if self.settled() {
            self.last
        } else {
            VelocityEstimate::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::sampler::MotionSample;
    use crate::motion::MotionError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct ScriptedSampler {
        samples: Vec<Option<MotionSample>>,
        cursor: usize,
    }

    impl ScriptedSampler {
        fn new(samples: Vec<Option<MotionSample>>) -> Self {
            Self { samples, cursor: 0 }
        }
    }

    impl MotionSampler for ScriptedSampler {
        fn read_sample(&mut self) -> Result<Option<MotionSample>, MotionError> {
            let sample = self.samples.get(self.cursor).cloned().flatten();
            self.cursor += 1;
            Ok(sample)
        }
    }

    /// Filter double that passes gyro through and records resets.
    struct PassthroughFilter {
        latest: [f32; 3],
        resets: Arc<AtomicUsize>,
    }

    impl PassthroughFilter {
        fn new(resets: Arc<AtomicUsize>) -> Self {
            Self {
                latest: [0.0; 3],
                resets,
            }
        }
    }

    impl MotionFilter for PassthroughFilter {
        fn reset(&mut self) {
            self.latest = [0.0; 3];
            self.resets.fetch_add(1, Ordering::Relaxed);
        }

        fn process_motion(&mut self, gyro: [f32; 3], _accel: [f32; 3], _dt: f64) {
            self.latest = gyro;
        }

        fn calibrated_gyro(&self) -> [f32; 3] {
            self.latest
        }
    }

    fn sample_at(t: f64, gyro: [f32; 3]) -> Option<MotionSample> {
        Some(MotionSample {
            accel: [0.0, 0.0, 1.0],
            gyro,
            sensor_time: t,
        })
    }

    fn flat_curve() -> SensitivityCurve {
        SensitivityCurve {
            slow_factor: 1.0,
            fast_factor: 1.0,
            speed_min_thresh: 0.0,
            speed_max_thresh: 75.0,
        }
    }

    fn pipeline_with(
        samples: Vec<Option<MotionSample>>,
        curve: SensitivityCurve,
        resets: Arc<AtomicUsize>,
    ) -> MotionPipeline {
        MotionPipeline::new(
            Box::new(ScriptedSampler::new(samples)),
            Box::new(PassthroughFilter::new(resets)),
            curve,
            Duration::ZERO,
        )
    }

    #[test]
    fn sensitivity_stays_within_factor_bounds() {
        let curve = SensitivityCurve::default();
        for speed in [-10.0, 0.0, 0.5, 37.5, 75.0, 75.1, 10_000.0] {
            let s = curve.multiplier(speed);
            assert!(
                (curve.slow_factor..=curve.fast_factor).contains(&s),
                "speed {speed} gave sensitivity {s}"
            );
        }
        assert_eq!(curve.multiplier(0.0), curve.slow_factor);
        assert_eq!(curve.multiplier(75.0), curve.fast_factor);
        assert_eq!(curve.multiplier(37.5), 1.5);
    }

    #[test]
    fn first_sample_is_zero_and_arms_calibration() {
        let resets = Arc::new(AtomicUsize::new(0));
        let mut pipeline = pipeline_with(
            vec![sample_at(1.0, [50.0, 50.0, 0.0])],
            SensitivityCurve::default(),
            resets.clone(),
        );

        assert_eq!(pipeline.sample(), VelocityEstimate::default());
        assert_eq!(resets.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn velocity_scales_with_dt_and_sensitivity() {
        let curve = flat_curve();
        let resets = Arc::new(AtomicUsize::new(0));
        let mut pipeline = pipeline_with(
            vec![
                sample_at(1.0, [0.0, 0.0, 0.0]),
                sample_at(1.01, [30.0, -15.0, 0.0]),
            ],
            curve,
            resets,
        );

        pipeline.sample();
        let v = pipeline.sample();
        // Flat curve: delta = dt * rate.
        assert!((v.yaw - 0.01 * 30.0).abs() < 1e-9);
        assert!((v.pitch - 0.01 * -15.0).abs() < 1e-9);
    }

    #[test]
    fn no_new_data_repeats_previous_estimate() {
        let resets = Arc::new(AtomicUsize::new(0));
        let mut pipeline = pipeline_with(
            vec![
                sample_at(1.0, [0.0, 0.0, 0.0]),
                sample_at(1.01, [10.0, 10.0, 0.0]),
                None,
                None,
            ],
            flat_curve(),
            resets,
        );

        pipeline.sample();
        let v = pipeline.sample();
        assert_ne!(v, VelocityEstimate::default());
        assert_eq!(pipeline.sample(), v);
        assert_eq!(pipeline.sample(), v);
    }

    #[test]
    fn long_gap_reanchors_without_velocity_spike() {
        let resets = Arc::new(AtomicUsize::new(0));
        let mut pipeline = pipeline_with(
            vec![
                sample_at(1.0, [0.0, 0.0, 0.0]),
                sample_at(1.01, [10.0, 0.0, 0.0]),
                // Tick disarmed for minutes, then re-armed.
                sample_at(300.0, [1.0, 0.0, 0.0]),
                None,
                sample_at(300.01, [1.0, 0.0, 0.0]),
            ],
            flat_curve(),
            resets,
        );

        pipeline.sample();
        pipeline.sample();
        // The gap-sized delta is discarded, and the no-data read that
        // follows repeats zero rather than a minutes-wide estimate.
        assert_eq!(pipeline.sample(), VelocityEstimate::default());
        assert_eq!(pipeline.sample(), VelocityEstimate::default());
        // Normal deltas resume on the next regular sample.
        let v = pipeline.sample();
        assert!((v.yaw - 0.01 * 1.0).abs() < 1e-9);
    }

    #[test]
    fn reset_returns_to_warmup_state() {
        let resets = Arc::new(AtomicUsize::new(0));
        let mut pipeline = pipeline_with(
            vec![
                sample_at(1.0, [0.0, 0.0, 0.0]),
                sample_at(1.01, [10.0, 10.0, 0.0]),
                sample_at(5.0, [10.0, 10.0, 0.0]),
            ],
            SensitivityCurve::default(),
            resets.clone(),
        );

        pipeline.sample();
        pipeline.sample();
        pipeline.reset();
        // Next sample is a fresh epoch: zero output, calibration re-armed.
        assert_eq!(pipeline.sample(), VelocityEstimate::default());
        // warm-up, explicit reset, new epoch
        assert_eq!(resets.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn settle_window_forces_zero_output() {
        let resets = Arc::new(AtomicUsize::new(0));
        let mut pipeline = MotionPipeline::new(
            Box::new(ScriptedSampler::new(vec![
                sample_at(1.0, [0.0, 0.0, 0.0]),
                sample_at(1.01, [40.0, 40.0, 0.0]),
            ])),
            Box::new(PassthroughFilter::new(resets)),
            SensitivityCurve::default(),
            Duration::from_secs(60),
        );

        pipeline.sample();
        assert_eq!(pipeline.sample(), VelocityEstimate::default());
    }
}
