//! Static configuration for the remapping daemon.
//!
//! All values have built-in defaults matching the shipped hardware; a
//! `config.toml` under the user config directory can override any subset.
//! There is no dynamic reconfiguration, settings are read once at startup.

use crate::motion::pipeline::SensitivityCurve;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid sensitivity curve: {0}")]
    InvalidCurve(String),

    #[error("Invalid timing value: {0}")]
    InvalidTiming(String),
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub motion: MotionSettings,
    pub router: RouterSettings,
    pub gesture: GestureSettings,
    pub timing: TimingSettings,
    pub devices: DeviceSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionSettings {
    pub curve: SensitivityCurve,
    /// Delay after the warm-up sample during which the pipeline reports
    /// zero velocity, covering sensor self-calibration.
    pub settle_ms: u64,
}

impl Default for MotionSettings {
    fn default() -> Self {
        Self {
            curve: SensitivityCurve::default(),
            settle_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterSettings {
    /// Raw right-stick magnitude below which the gyro replaces the stick.
    pub gyro_deadzone: i32,
    /// Scale K for mouse-mode stick-to-relative conversion.
    pub mouse_scale: f64,
    /// Scale for the secondary relative-Y magnitude next to wheel ticks.
    pub wheel_rel_scale: f64,
    /// Input band of the gyro-norm interpolation (per-tick angular delta).
    pub gyro_norm_min: f64,
    pub gyro_norm_max: f64,
    /// Output span of gyro contribution in raw axis units.
    pub gyro_span: f64,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            gyro_deadzone: 9000,
            mouse_scale: 7.0,
            wheel_rel_scale: 120.0,
            gyro_norm_min: 0.1,
            gyro_norm_max: 1.8,
            gyro_span: 22000.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureSettings {
    /// Single/double click disambiguation window.
    pub click_window_ms: u64,
    /// Delay between steps of the synthesized menu chord sequences.
    pub chord_step_ms: u64,
}

impl Default for GestureSettings {
    fn default() -> Self {
        Self {
            click_window_ms: 1000,
            chord_step_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    /// Period of the gyro maintenance tick and the relative-motion emitter.
    pub tick_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self { tick_ms: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    pub gamepad_name: String,
    pub fn_name: String,
    pub virtual_pad_name: String,
    pub virtual_mouse_name: String,
    pub i2c_path: String,
    /// BMI160 address pin pulled high (0x69 instead of 0x68).
    pub i2c_alt_addr: bool,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            gamepad_name: "Microsoft X-Box 360 pad".to_string(),
            fn_name: "AT Translated Set 2 keyboard".to_string(),
            virtual_pad_name: "Virtual XBox360".to_string(),
            virtual_mouse_name: "Virtual Mouse".to_string(),
            i2c_path: "/dev/i2c-1".to_string(),
            i2c_alt_addr: false,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("gyromap").join("config.toml"))
    }

    /// Loads settings from the user config file, falling back to defaults
    /// on a missing or unparsable file.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            debug!("No config directory available, using defaults");
            return Self::default();
        };

        match fs::read_to_string(&path) {
            Ok(raw) => match toml::from_str(&raw) {
                Ok(settings) => {
                    info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}, using defaults", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => {
                debug!("No config file at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.motion.curve.speed_max_thresh <= self.motion.curve.speed_min_thresh {
            return Err(ConfigError::InvalidCurve(format!(
                "speed_max_thresh ({}) must exceed speed_min_thresh ({})",
                self.motion.curve.speed_max_thresh, self.motion.curve.speed_min_thresh
            )));
        }
        if self.router.gyro_norm_max <= self.router.gyro_norm_min {
            return Err(ConfigError::InvalidCurve(format!(
                "gyro_norm_max ({}) must exceed gyro_norm_min ({})",
                self.router.gyro_norm_max, self.router.gyro_norm_min
            )));
        }
        if self.timing.tick_ms == 0 {
            return Err(ConfigError::InvalidTiming(
                "tick_ms must be nonzero".to_string(),
            ));
        }
        if self.gesture.click_window_ms == 0 {
            return Err(ConfigError::InvalidTiming(
                "click_window_ms must be nonzero".to_string(),
            ));
        }
        Ok(())
    }
}
