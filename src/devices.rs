//! Physical and virtual device plumbing.
//!
//! Everything evdev-specific lives here: discovery by reported name,
//! exclusive grabbing, virtual device construction, the [`OutputSink`]
//! boundary, and the reader tasks that feed classified events into the
//! event loop's channels.

use crate::events::{
    classify_fn, classify_pad, EventBatch, FnEvent, MouseButton, PadAxis, PadButton, RelAxis,
    SourceEvent, VolumeKey,
};
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AbsInfo, AttributeSet, Device, Key, RelativeAxisType, UinputAbsSetup};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("No input device named '{0}' found")]
    NotFound(String),

    #[error("Failed to grab {0}: {1}")]
    GrabError(String, String),

    #[error("Failed to create virtual device '{0}': {1}")]
    CreateError(String, String),

    #[error("Failed to write to virtual device '{0}': {1}")]
    WriteError(String, String),

    #[error("Failed to start event stream: {0}")]
    StreamError(String),
}

/// Accepts ordered event batches and commits them atomically to one
/// virtual device. The commit terminates the report with a
/// synchronization marker even when the batch is empty.
pub trait OutputSink {
    fn commit(&mut self, batch: EventBatch) -> Result<(), DeviceError>;
    fn label(&self) -> &str;
}

/// Scans `/dev/input` for a device with the given reported name.
pub fn find_device(name: &str) -> Result<Device, DeviceError> {
    for (path, device) in evdev::enumerate() {
        if device.name() == Some(name) {
            info!("Found '{}' at {}", name, path.display());
            return Ok(device);
        }
    }
    Err(DeviceError::NotFound(name.to_string()))
}

/// Takes exclusive capture of a physical device. Without the grab, raw
/// events would leak to the rest of the system alongside the remapped
/// ones, so failure here is fatal at startup.
pub fn grab(device: &mut Device, label: &str) -> Result<(), DeviceError> {
    device
        .grab()
        .map_err(|e| DeviceError::GrabError(label.to_string(), e.to_string()))?;
    info!("Grabbed {} exclusively", label);
    Ok(())
}

/// Builds the virtual gamepad, cloning identity and axis ranges from the
/// physical pad so downstream consumers see the same device model.
pub fn build_virtual_pad(name: &str, source: &Device) -> Result<VirtualDevice, DeviceError> {
    let create_err = |e: std::io::Error| DeviceError::CreateError(name.to_string(), e.to_string());

    let keys: AttributeSet<Key> = PadButton::ALL.iter().map(|b| b.key()).collect();

    let abs_state = source.get_abs_state().map_err(create_err)?;

    let mut builder = VirtualDeviceBuilder::new()
        .map_err(create_err)?
        .name(name)
        .input_id(source.input_id())
        .with_keys(&keys)
        .map_err(create_err)?;

    for axis in PadAxis::ALL {
        let raw = abs_state[axis.abs().0 as usize];
        let info = AbsInfo::new(
            raw.value,
            raw.minimum,
            raw.maximum,
            raw.fuzz,
            raw.flat,
            raw.resolution,
        );
        debug!(
            "Virtual pad axis {:?}: range [{}, {}]",
            axis, raw.minimum, raw.maximum
        );
        builder = builder
            .with_absolute_axis(&UinputAbsSetup::new(axis.abs(), info))
            .map_err(create_err)?;
    }

    let device = builder.build().map_err(create_err)?;
    info!("Created virtual gamepad '{}'", name);
    Ok(device)
}

/// Builds the virtual mouse: three buttons, the volume keys forwarded
/// from the fn device, and the relative axes.
pub fn build_virtual_mouse(name: &str) -> Result<VirtualDevice, DeviceError> {
    let create_err = |e: std::io::Error| DeviceError::CreateError(name.to_string(), e.to_string());

    let keys: AttributeSet<Key> = [
        MouseButton::Left.key(),
        MouseButton::Right.key(),
        MouseButton::Middle.key(),
        VolumeKey::Up.key(),
        VolumeKey::Down.key(),
    ]
    .into_iter()
    .collect();

    let rel_axes: AttributeSet<RelativeAxisType> = [
        RelAxis::X.rel(),
        RelAxis::Y.rel(),
        RelAxis::Wheel.rel(),
        RelAxis::WheelHiRes.rel(),
    ]
    .into_iter()
    .collect();

    let device = VirtualDeviceBuilder::new()
        .map_err(create_err)?
        .name(name)
        .with_keys(&keys)
        .map_err(create_err)?
        .with_relative_axes(&rel_axes)
        .map_err(create_err)?
        .build()
        .map_err(create_err)?;

    info!("Created virtual mouse '{}'", name);
    Ok(device)
}

/// evdev-backed output sink. `VirtualDevice::emit` terminates each report
/// with a `SYN_REPORT`, which covers the empty-batch case too.
pub struct EvdevSink {
    label: String,
    device: VirtualDevice,
}

impl EvdevSink {
    pub fn new(label: impl Into<String>, device: VirtualDevice) -> Self {
        Self {
            label: label.into(),
            device,
        }
    }
}

impl OutputSink for EvdevSink {
    fn commit(&mut self, batch: EventBatch) -> Result<(), DeviceError> {
        let events = batch.into_input_events();
        self.device
            .emit(&events)
            .map_err(|e| DeviceError::WriteError(self.label.clone(), e.to_string()))
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Spawns a reader task forwarding classified gamepad events into the
/// event loop. Read errors after startup are logged and retried.
pub fn spawn_pad_reader(
    device: Device,
    tx: mpsc::Sender<SourceEvent>,
) -> Result<JoinHandle<()>, DeviceError> {
    let mut stream = device
        .into_event_stream()
        .map_err(|e| DeviceError::StreamError(e.to_string()))?;

    Ok(tokio::spawn(async move {
        loop {
            match stream.next_event().await {
                Ok(ev) => {
                    if tx.send(classify_pad(ev)).await.is_err() {
                        debug!("Gamepad channel closed, reader exiting");
                        break;
                    }
                }
                Err(e) => {
                    warn!("Gamepad read failed: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            }
        }
    }))
}

/// Same for the fn-key device.
pub fn spawn_fn_reader(
    device: Device,
    tx: mpsc::Sender<FnEvent>,
) -> Result<JoinHandle<()>, DeviceError> {
    let mut stream = device
        .into_event_stream()
        .map_err(|e| DeviceError::StreamError(e.to_string()))?;

    Ok(tokio::spawn(async move {
        loop {
            match stream.next_event().await {
                Ok(ev) => {
                    if tx.send(classify_fn(ev)).await.is_err() {
                        debug!("Fn-key channel closed, reader exiting");
                        break;
                    }
                }
                Err(e) => {
                    warn!("Fn-key read failed: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                }
            }
        }
    }))
}

#[cfg(test)]
pub mod testing {
    //! Sink double shared by the engine tests.

    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every committed batch, with the synchronization marker made
    /// explicit as a count per commit.
    #[derive(Default)]
    pub struct RecordingSink {
        pub commits: Rc<RefCell<Vec<EventBatch>>>,
    }

    impl RecordingSink {
        pub fn new() -> (Self, Rc<RefCell<Vec<EventBatch>>>) {
            let commits = Rc::new(RefCell::new(Vec::new()));
            (
                Self {
                    commits: commits.clone(),
                },
                commits,
            )
        }
    }

    impl OutputSink for RecordingSink {
        fn commit(&mut self, batch: EventBatch) -> Result<(), DeviceError> {
            self.commits.borrow_mut().push(batch);
            Ok(())
        }

        fn label(&self) -> &str {
            "recording"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;

    #[test]
    fn empty_batch_commit_succeeds_and_counts_one_sync() {
        let (mut sink, commits) = RecordingSink::new();
        sink.commit(EventBatch::new()).unwrap();

        // One commit means exactly one terminating sync marker, even
        // though the caller supplied no events.
        assert_eq!(commits.borrow().len(), 1);
        assert!(commits.borrow()[0].is_empty());
    }
}
