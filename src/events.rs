//! Typed event model for the remapping pipeline.
//!
//! Raw evdev events are classified into closed per-domain enumerations as
//! early as possible; the router and gesture logic never touch numeric
//! type/code constants. Conversion back to `evdev::InputEvent` happens only
//! at the output sink boundary.

use evdev::{AbsoluteAxisType, EventType, InputEvent, InputEventKind, Key, RelativeAxisType};
use serde::{Deserialize, Serialize};

/// Buttons of the physical gamepad that survive onto the virtual pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PadButton {
    South,
    East,
    North,
    West,
    Tl,
    Tr,
    Select,
    Start,
    Mode,
    ThumbLeft,
    ThumbRight,
}

impl PadButton {
    pub const ALL: [PadButton; 11] = [
        PadButton::South,
        PadButton::East,
        PadButton::North,
        PadButton::West,
        PadButton::Tl,
        PadButton::Tr,
        PadButton::Select,
        PadButton::Start,
        PadButton::Mode,
        PadButton::ThumbLeft,
        PadButton::ThumbRight,
    ];

    pub fn key(self) -> Key {
        match self {
            PadButton::South => Key::BTN_SOUTH,
            PadButton::East => Key::BTN_EAST,
            PadButton::North => Key::BTN_NORTH,
            PadButton::West => Key::BTN_WEST,
            PadButton::Tl => Key::BTN_TL,
            PadButton::Tr => Key::BTN_TR,
            PadButton::Select => Key::BTN_SELECT,
            PadButton::Start => Key::BTN_START,
            PadButton::Mode => Key::BTN_MODE,
            PadButton::ThumbLeft => Key::BTN_THUMBL,
            PadButton::ThumbRight => Key::BTN_THUMBR,
        }
    }

    pub fn from_key(key: Key) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.key() == key)
    }
}

/// Absolute axes of the physical gamepad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PadAxis {
    X,
    Y,
    Z,
    Rx,
    Ry,
    Rz,
    Hat0X,
    Hat0Y,
}

impl PadAxis {
    pub const ALL: [PadAxis; 8] = [
        PadAxis::X,
        PadAxis::Y,
        PadAxis::Z,
        PadAxis::Rx,
        PadAxis::Ry,
        PadAxis::Rz,
        PadAxis::Hat0X,
        PadAxis::Hat0Y,
    ];

    pub fn abs(self) -> AbsoluteAxisType {
        match self {
            PadAxis::X => AbsoluteAxisType::ABS_X,
            PadAxis::Y => AbsoluteAxisType::ABS_Y,
            PadAxis::Z => AbsoluteAxisType::ABS_Z,
            PadAxis::Rx => AbsoluteAxisType::ABS_RX,
            PadAxis::Ry => AbsoluteAxisType::ABS_RY,
            PadAxis::Rz => AbsoluteAxisType::ABS_RZ,
            PadAxis::Hat0X => AbsoluteAxisType::ABS_HAT0X,
            PadAxis::Hat0Y => AbsoluteAxisType::ABS_HAT0Y,
        }
    }

    pub fn from_abs(abs: AbsoluteAxisType) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.abs() == abs)
    }

    /// The two axes the gyro blend writes into.
    pub fn is_gyro_axis(self) -> bool {
        matches!(self, PadAxis::Rx | PadAxis::Ry)
    }
}

/// Virtual mouse buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn key(self) -> Key {
        match self {
            MouseButton::Left => Key::BTN_LEFT,
            MouseButton::Right => Key::BTN_RIGHT,
            MouseButton::Middle => Key::BTN_MIDDLE,
        }
    }
}

/// Relative axes of the virtual mouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelAxis {
    X,
    Y,
    Wheel,
    WheelHiRes,
}

impl RelAxis {
    pub fn rel(self) -> RelativeAxisType {
        match self {
            RelAxis::X => RelativeAxisType::REL_X,
            RelAxis::Y => RelativeAxisType::REL_Y,
            RelAxis::Wheel => RelativeAxisType::REL_WHEEL,
            RelAxis::WheelHiRes => RelativeAxisType::REL_WHEEL_HI_RES,
        }
    }
}

/// Volume keys forwarded from the fn-key device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeKey {
    Up,
    Down,
}

impl VolumeKey {
    pub fn key(self) -> Key {
        match self {
            VolumeKey::Up => Key::KEY_VOLUMEUP,
            VolumeKey::Down => Key::KEY_VOLUMEDOWN,
        }
    }
}

/// Keys of the auxiliary fn-key device. The two fn buttons report as plain
/// keyboard scancodes on the aux device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FnKey {
    Left,
    Right,
    Volume(VolumeKey),
}

/// Classified event from the grabbed gamepad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SourceEvent {
    Button(PadButton, i32),
    Axis(PadAxis, i32),
    Sync,
    Other,
}

/// Classified event from the grabbed fn-key device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FnEvent {
    Key(FnKey, i32),
    Sync,
    Other,
}

pub fn classify_pad(ev: InputEvent) -> SourceEvent {
    match ev.kind() {
        InputEventKind::Key(key) => match PadButton::from_key(key) {
            Some(button) => SourceEvent::Button(button, ev.value()),
            None => SourceEvent::Other,
        },
        InputEventKind::AbsAxis(abs) => match PadAxis::from_abs(abs) {
            Some(axis) => SourceEvent::Axis(axis, ev.value()),
            None => SourceEvent::Other,
        },
        InputEventKind::Synchronization(_) => SourceEvent::Sync,
        _ => SourceEvent::Other,
    }
}

pub fn classify_fn(ev: InputEvent) -> FnEvent {
    match ev.kind() {
        InputEventKind::Key(key) => match key {
            Key::KEY_D => FnEvent::Key(FnKey::Left, ev.value()),
            Key::KEY_O => FnEvent::Key(FnKey::Right, ev.value()),
            Key::KEY_VOLUMEUP => FnEvent::Key(FnKey::Volume(VolumeKey::Up), ev.value()),
            Key::KEY_VOLUMEDOWN => FnEvent::Key(FnKey::Volume(VolumeKey::Down), ev.value()),
            _ => FnEvent::Other,
        },
        InputEventKind::Synchronization(_) => FnEvent::Sync,
        _ => FnEvent::Other,
    }
}

/// A single transformed event awaiting commit to a virtual device.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputEvent {
    Pad(PadButton, i32),
    Axis(PadAxis, i32),
    Mouse(MouseButton, i32),
    Rel(RelAxis, i32),
    Volume(VolumeKey, i32),
}

impl OutputEvent {
    pub fn into_input_event(self) -> InputEvent {
        match self {
            OutputEvent::Pad(button, value) => {
                InputEvent::new(EventType::KEY, button.key().code(), value)
            }
            OutputEvent::Axis(axis, value) => {
                InputEvent::new(EventType::ABSOLUTE, axis.abs().0, value)
            }
            OutputEvent::Mouse(button, value) => {
                InputEvent::new(EventType::KEY, button.key().code(), value)
            }
            OutputEvent::Rel(axis, value) => {
                InputEvent::new(EventType::RELATIVE, axis.rel().0, value)
            }
            OutputEvent::Volume(key, value) => {
                InputEvent::new(EventType::KEY, key.key().code(), value)
            }
        }
    }
}

/// Ordered batch of output events. Order is significant; the sink appends
/// the synchronization marker on commit.
#[derive(Debug, Clone, Default)]
pub struct EventBatch {
    events: Vec<OutputEvent>,
}

impl EventBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, ev: OutputEvent) {
        self.events.push(ev);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = OutputEvent>) {
        self.events.extend(events);
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    /// Moves the pending events out, leaving an empty batch behind.
    pub fn take(&mut self) -> EventBatch {
        EventBatch {
            events: std::mem::take(&mut self.events),
        }
    }

    pub fn into_input_events(self) -> Vec<InputEvent> {
        self.events
            .into_iter()
            .map(OutputEvent::into_input_event)
            .collect()
    }
}

impl FromIterator<OutputEvent> for EventBatch {
    fn from_iter<T: IntoIterator<Item = OutputEvent>>(iter: T) -> Self {
        EventBatch {
            events: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pad_button_mapping_round_trips() {
        for button in PadButton::ALL {
            assert_eq!(PadButton::from_key(button.key()), Some(button));
        }
    }

    #[test]
    fn pad_axis_mapping_round_trips() {
        for axis in PadAxis::ALL {
            assert_eq!(PadAxis::from_abs(axis.abs()), Some(axis));
        }
    }

    #[test]
    fn gyro_axes_are_right_stick() {
        assert!(PadAxis::Rx.is_gyro_axis());
        assert!(PadAxis::Ry.is_gyro_axis());
        assert!(!PadAxis::X.is_gyro_axis());
        assert!(!PadAxis::Hat0X.is_gyro_axis());
    }

    #[test]
    fn classify_pad_handles_keys_axes_and_sync() {
        let key = InputEvent::new(EventType::KEY, Key::BTN_SOUTH.code(), 1);
        assert_eq!(classify_pad(key), SourceEvent::Button(PadButton::South, 1));

        let abs = InputEvent::new(EventType::ABSOLUTE, AbsoluteAxisType::ABS_RX.0, 1200);
        assert_eq!(classify_pad(abs), SourceEvent::Axis(PadAxis::Rx, 1200));

        let sync = InputEvent::new(EventType::SYNCHRONIZATION, 0, 0);
        assert_eq!(classify_pad(sync), SourceEvent::Sync);

        let unknown = InputEvent::new(EventType::KEY, Key::KEY_Q.code(), 1);
        assert_eq!(classify_pad(unknown), SourceEvent::Other);
    }

    #[test]
    fn classify_fn_maps_aux_keys() {
        let left = InputEvent::new(EventType::KEY, Key::KEY_D.code(), 1);
        assert_eq!(classify_fn(left), FnEvent::Key(FnKey::Left, 1));

        let vol = InputEvent::new(EventType::KEY, Key::KEY_VOLUMEUP.code(), 1);
        assert_eq!(classify_fn(vol), FnEvent::Key(FnKey::Volume(VolumeKey::Up), 1));

        let stray = InputEvent::new(EventType::KEY, Key::KEY_A.code(), 1);
        assert_eq!(classify_fn(stray), FnEvent::Other);
    }

    #[test]
    fn batch_take_leaves_empty_batch() {
        let mut batch = EventBatch::new();
        batch.push(OutputEvent::Pad(PadButton::Mode, 1));
        batch.push(OutputEvent::Pad(PadButton::Mode, 0));

        let taken = batch.take();
        assert_eq!(taken.len(), 2);
        assert!(batch.is_empty());
    }
}
