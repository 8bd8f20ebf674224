//! Mode-dependent event transformation.
//!
//! The router turns classified source events into per-sink batches. In
//! joystick mode pad input passes through (with the right stick diverted
//! through the gyro blend while the maintenance tick is armed); in mouse
//! mode the stick becomes cached relative deltas and face buttons become
//! mouse clicks. Batches accumulate until the source's synchronization
//! marker and are then committed atomically by the engine.

use crate::config::RouterSettings;
use crate::events::{
    EventBatch, MouseButton, OutputEvent, PadAxis, RelAxis, SourceEvent, VolumeKey,
};
use crate::motion::VelocityEstimate;
use crate::remap::state::RouterState;
use tracing::debug;

/// Which virtual device a batch is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkId {
    Pad,
    Mouse,
}

/// Maps `|val|` from the `[min, max]` band onto `[target_min, target_max]`.
/// Deliberately unclamped; the caller clamps the final axis value.
pub fn linear_range_interp(min: f64, max: f64, target_min: f64, target_max: f64, val: f64) -> f64 {
    (val.abs() - min) / (max - min) * (target_max - target_min) + target_min
}

fn clamp_axis(value: f64) -> i32 {
    value.round().clamp(i16::MIN as f64, i16::MAX as f64) as i32
}

// Smoothing factor for the gyro velocity estimate.
const SMOOTHING_KEEP: f64 = 0.8;
const SMOOTHING_NEW: f64 = 0.2;
// Below this per-tick norm the gyro contributes nothing; also guards the
// divide-by-norm in the blend.
const GYRO_NORM_EPSILON: f64 = 1e-9;

pub struct EventRouter {
    settings: RouterSettings,
    state: RouterState,
    /// Events accumulated from the gamepad stream since its last sync.
    batch: EventBatch,
    /// Volume-key passthrough from the fn device, always mouse-bound.
    fn_batch: EventBatch,
}

impl EventRouter {
    pub fn new(settings: RouterSettings) -> Self {
        Self {
            settings,
            state: RouterState::default(),
            batch: EventBatch::new(),
            fn_batch: EventBatch::new(),
        }
    }

    pub fn state(&self) -> &RouterState {
        &self.state
    }

    /// Routes one gamepad event. Returns a finished batch on the stream's
    /// synchronization marker.
    pub fn handle_pad_event(&mut self, ev: SourceEvent) -> Option<(SinkId, EventBatch)> {
        match ev {
            SourceEvent::Sync => {
                let sink = if self.state.joystick_mode {
                    SinkId::Pad
                } else {
                    SinkId::Mouse
                };
                Some((sink, self.batch.take()))
            }
            ev if self.state.joystick_mode => {
                self.route_as_joystick(ev);
                None
            }
            ev => {
                self.route_as_mouse(ev);
                None
            }
        }
    }

    fn route_as_joystick(&mut self, ev: SourceEvent) {
        match ev {
            SourceEvent::Button(button, value) => {
                self.batch.push(OutputEvent::Pad(button, value));
            }
            SourceEvent::Axis(axis, value) => {
                if axis == PadAxis::Rx {
                    self.state.stick.rx = value;
                } else if axis == PadAxis::Ry {
                    self.state.stick.ry = value;
                }
                // While the gyro tick is armed it owns the aiming axes;
                // emitting the raw value here would fight the blend.
                if axis.is_gyro_axis() && self.state.gyro_enabled {
                    return;
                }
                self.batch.push(OutputEvent::Axis(axis, value));
            }
            SourceEvent::Sync | SourceEvent::Other => {}
        }
    }

    fn route_as_mouse(&mut self, ev: SourceEvent) {
        match ev {
            SourceEvent::Button(button, value) => {
                let mapped = match button {
                    crate::events::PadButton::South => Some(MouseButton::Left),
                    crate::events::PadButton::East => Some(MouseButton::Right),
                    crate::events::PadButton::West => Some(MouseButton::Middle),
                    _ => None,
                };
                match mapped {
                    Some(mouse) => self.batch.push(OutputEvent::Mouse(mouse, value)),
                    None => debug!("Dropping unmapped button {:?} in mouse mode", button),
                }
            }
            SourceEvent::Axis(PadAxis::X, value) => {
                self.state.mouse_rel_x = self.stick_to_rel(value);
            }
            SourceEvent::Axis(PadAxis::Y, value) => {
                self.state.mouse_rel_y = self.stick_to_rel(value);
            }
            SourceEvent::Axis(PadAxis::Ry, value) => {
                let direction = if value > 1 { 1 } else { -1 };
                self.batch.push(OutputEvent::Rel(RelAxis::Wheel, direction));
                let magnitude =
                    (value.abs() as f64 / 32768.0 * self.settings.wheel_rel_scale).round() as i32;
                self.batch.push(OutputEvent::Rel(RelAxis::Y, magnitude));
            }
            SourceEvent::Axis(axis, _) => {
                debug!("Dropping unmapped axis {:?} in mouse mode", axis);
            }
            SourceEvent::Sync | SourceEvent::Other => {}
        }
    }

    fn stick_to_rel(&self, value: i32) -> i32 {
        (value as f64 / 32768.0 * self.settings.mouse_scale).round() as i32
    }

    /// Volume keys from the fn device forward to the virtual mouse, which
    /// is the output that declares them.
    pub fn handle_volume_key(&mut self, key: VolumeKey, value: i32) {
        self.fn_batch.push(OutputEvent::Volume(key, value));
    }

    /// Flushes fn-device passthrough on its synchronization marker.
    pub fn handle_fn_sync(&mut self) -> Option<(SinkId, EventBatch)> {
        if self.fn_batch.is_empty() {
            return None;
        }
        Some((SinkId::Mouse, self.fn_batch.take()))
    }

    /// Periodic gyro maintenance: smooth the velocity estimate and emit
    /// blended aiming-axis values.
    ///
    /// Below the stick deadzone the gyro contribution replaces the axis
    /// value outright (sub-deadzone stick noise is ignored); above it the
    /// contribution adds to the raw deflection so deliberate stick motion
    /// and gyro aiming combine.
    pub fn gyro_tick(&mut self, v: VelocityEstimate) -> (SinkId, EventBatch) {
        let s = &mut self.state;
        s.yaw = SMOOTHING_KEEP * s.yaw + SMOOTHING_NEW * v.yaw;
        s.pitch = SMOOTHING_KEEP * s.pitch + SMOOTHING_NEW * v.pitch;

        let gyro_norm = s.yaw.hypot(s.pitch);
        let stick_norm = s.stick.magnitude();
        let deadzone = self.settings.gyro_deadzone as f64;

        let (rx, ry) = if gyro_norm < GYRO_NORM_EPSILON {
            (s.stick.rx as f64, s.stick.ry as f64)
        } else if stick_norm <= deadzone {
            let scaled = linear_range_interp(
                self.settings.gyro_norm_min,
                self.settings.gyro_norm_max,
                deadzone,
                self.settings.gyro_span + deadzone,
                gyro_norm,
            );
            (s.yaw / gyro_norm * scaled, s.pitch / gyro_norm * scaled)
        } else {
            let scaled = linear_range_interp(
                self.settings.gyro_norm_min,
                self.settings.gyro_norm_max,
                0.0,
                self.settings.gyro_span,
                gyro_norm,
            );
            (
                s.yaw / gyro_norm * scaled + s.stick.rx as f64,
                s.pitch / gyro_norm * scaled + s.stick.ry as f64,
            )
        };

        let batch = EventBatch::from_iter([
            OutputEvent::Axis(PadAxis::Rx, clamp_axis(rx)),
            OutputEvent::Axis(PadAxis::Ry, clamp_axis(ry)),
        ]);
        (SinkId::Pad, batch)
    }

    /// Periodic relative-motion emission while in mouse mode. Returns
    /// `None` when no delta is cached; the engine skips the commit.
    pub fn rel_tick(&mut self) -> Option<(SinkId, EventBatch)> {
        let mut batch = EventBatch::new();
        if self.state.mouse_rel_x != 0 {
            batch.push(OutputEvent::Rel(RelAxis::X, self.state.mouse_rel_x));
        }
        if self.state.mouse_rel_y != 0 {
            batch.push(OutputEvent::Rel(RelAxis::Y, self.state.mouse_rel_y));
        }
        if batch.is_empty() {
            return None;
        }
        Some((SinkId::Mouse, batch))
    }

    /// Flips gyro assist; returns the new flag so the engine can arm or
    /// de-register the maintenance tick.
    pub fn toggle_gyro(&mut self) -> bool {
        self.state.gyro_enabled = !self.state.gyro_enabled;
        self.state.gyro_enabled
    }

    /// Flips joystick/mouse mode, resetting the relative accumulators.
    /// Returns the new `joystick_mode`.
    pub fn toggle_mode(&mut self) -> bool {
        self.state.joystick_mode = !self.state.joystick_mode;
        self.state.reset_relative();
        self.state.joystick_mode
    }
}
