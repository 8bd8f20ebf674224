//! Routing state owned by the event loop.
//!
//! No globals: the router mutates this value in place and the engine reads
//! it to decide which timers stay armed.

/// Last known raw deflection of the right stick, kept across ticks so the
/// gyro contribution can be blended additively.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AxisAccumulator {
    pub rx: i32,
    pub ry: i32,
}

impl AxisAccumulator {
    pub fn magnitude(&self) -> f64 {
        (self.rx as f64).hypot(self.ry as f64)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouterState {
    /// true = gamepad passthrough (+ optional gyro), false = mouse emulation.
    pub joystick_mode: bool,
    /// Gyro maintenance tick armed.
    pub gyro_enabled: bool,
    pub stick: AxisAccumulator,
    /// Cached relative deltas for the continuous mouse emitter.
    pub mouse_rel_x: i32,
    pub mouse_rel_y: i32,
    /// Exponentially smoothed gyro velocity.
    pub yaw: f64,
    pub pitch: f64,
}

impl Default for RouterState {
    fn default() -> Self {
        Self {
            joystick_mode: true,
            gyro_enabled: false,
            stick: AxisAccumulator::default(),
            mouse_rel_x: 0,
            mouse_rel_y: 0,
            yaw: 0.0,
            pitch: 0.0,
        }
    }
}

impl RouterState {
    /// Clears the mode-dependent accumulators on a mode switch.
    pub fn reset_relative(&mut self) {
        self.mouse_rel_x = 0;
        self.mouse_rel_y = 0;
    }
}
