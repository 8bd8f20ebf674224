//! The remapping engine: single event loop over devices and timers.
//!
//! # State Machine
//!
//! ```text
//! Initializing ──► Running
//!   (warm-up)      (select loop)
//! ```
//!
//! One loop multiplexes the two device channels, the gesture deadline, the
//! chord-sequencer deadline, and the two recurring ticks. Timer callbacks
//! and device callbacks therefore never run concurrently, which is what
//! makes the gesture fire-vs-cancel race impossible. The recurring ticks
//! exist only while their owning mode is active: arming creates the
//! interval, disarming drops it.

use crate::config::Settings;
use crate::devices::OutputSink;
use crate::events::{EventBatch, FnEvent, FnKey, OutputEvent, PadButton, SourceEvent};
use crate::motion::MotionPipeline;
use crate::remap::{
    ChordSequencer, EventRouter, FnButton, GestureAction, GestureResolver, RemapError, SinkId,
};
use chrono::Local;
use statum::{machine, state};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{interval, sleep_until, Instant as TokioInstant, Interval};
use tracing::{debug, error, info};

#[state]
#[derive(Debug, Clone)]
pub enum EngineState {
    Initializing,
    Running,
}

#[machine]
pub struct Remapper<S: EngineState> {
    pipeline: MotionPipeline,
    router: EventRouter,
    resolver: GestureResolver,
    sequencer: ChordSequencer,
    pad_rx: mpsc::Receiver<SourceEvent>,
    fn_rx: mpsc::Receiver<FnEvent>,
    pad_sink: Box<dyn OutputSink>,
    mouse_sink: Box<dyn OutputSink>,
    chord_step: Duration,
    tick_period: Duration,
    gyro_tick: Option<Interval>,
    rel_tick: Option<Interval>,
}

/// What woke the loop; resolved before any handler mutates state.
enum Wake {
    Pad(Option<SourceEvent>),
    Fn(Option<FnEvent>),
    GestureDeadline,
    SequenceDeadline,
    GyroTick,
    RelTick,
}

impl Remapper<Initializing> {
    pub fn create(
        settings: &Settings,
        pipeline: MotionPipeline,
        pad_rx: mpsc::Receiver<SourceEvent>,
        fn_rx: mpsc::Receiver<FnEvent>,
        pad_sink: Box<dyn OutputSink>,
        mouse_sink: Box<dyn OutputSink>,
    ) -> Self {
        info!("Creating remapper engine");
        Self::new(
            pipeline,
            EventRouter::new(settings.router.clone()),
            GestureResolver::new(Duration::from_millis(settings.gesture.click_window_ms)),
            ChordSequencer::new(),
            pad_rx,
            fn_rx,
            pad_sink,
            mouse_sink,
            Duration::from_millis(settings.gesture.chord_step_ms),
            Duration::from_millis(settings.timing.tick_ms),
            None, // gyro_tick
            None, // rel_tick
        )
    }

    /// Runs the motion warm-up tick (epoch + calibration arm + settle
    /// window) and transitions to the running state. No recurring timer is
    /// armed yet: the daemon starts in joystick mode with gyro off.
    pub fn initialize(mut self) -> Remapper<Running> {
        let v = self.pipeline.sample();
        debug!("Warm-up velocity estimate: {:?}", v);
        info!("Remapper initialized: joystick mode, gyro assist off");
        self.transition()
    }
}

impl Remapper<Running> {
    pub async fn run(&mut self) -> Result<(), RemapError> {
        info!("Entering remap loop");
        loop {
            let wake = self.wait_for_wake().await;
            self.dispatch(wake)?;
        }
    }

    /// Sleeps until any source is ready. Only borrows the channel and
    /// timer fields so the dispatch step is free to mutate everything.
    async fn wait_for_wake(&mut self) -> Wake {
        let gesture_deadline = self.resolver.next_deadline().map(TokioInstant::from_std);
        let sequence_deadline = self.sequencer.next_deadline().map(TokioInstant::from_std);

        let Self {
            pad_rx,
            fn_rx,
            gyro_tick,
            rel_tick,
            ..
        } = self;

        tokio::select! {
            ev = pad_rx.recv() => Wake::Pad(ev),
            ev = fn_rx.recv() => Wake::Fn(ev),
            _ = sleep_until(gesture_deadline.unwrap_or_else(TokioInstant::now)),
                if gesture_deadline.is_some() => Wake::GestureDeadline,
            _ = sleep_until(sequence_deadline.unwrap_or_else(TokioInstant::now)),
                if sequence_deadline.is_some() => Wake::SequenceDeadline,
            _ = async { gyro_tick.as_mut().expect("guarded by is_some").tick().await },
                if gyro_tick.is_some() => Wake::GyroTick,
            _ = async { rel_tick.as_mut().expect("guarded by is_some").tick().await },
                if rel_tick.is_some() => Wake::RelTick,
        }
    }

    fn dispatch(&mut self, wake: Wake) -> Result<(), RemapError> {
        match wake {
            Wake::Pad(Some(ev)) => {
                if let Some((sink, batch)) = self.router.handle_pad_event(ev) {
                    self.commit(sink, batch);
                }
            }
            Wake::Pad(None) => {
                return Err(RemapError::ChannelClosed("gamepad".to_string()));
            }
            Wake::Fn(Some(ev)) => self.on_fn_event(ev),
            Wake::Fn(None) => {
                return Err(RemapError::ChannelClosed("fn-key device".to_string()));
            }
            Wake::GestureDeadline => {
                if let Some(action) = self.resolver.poll_expired(Instant::now()) {
                    self.apply_action(action);
                }
            }
            Wake::SequenceDeadline => {
                let events = self.sequencer.pop_due(Instant::now());
                if !events.is_empty() {
                    self.commit(SinkId::Pad, events.into_iter().collect());
                }
            }
            Wake::GyroTick => {
                let v = self.pipeline.sample();
                let (sink, batch) = self.router.gyro_tick(v);
                self.commit(sink, batch);
            }
            Wake::RelTick => {
                if let Some((sink, batch)) = self.router.rel_tick() {
                    self.commit(sink, batch);
                }
            }
        }
        Ok(())
    }

    fn on_fn_event(&mut self, ev: FnEvent) {
        match ev {
            // Gestures trigger on the initial down only; repeats and
            // releases are ignored.
            FnEvent::Key(FnKey::Left, 1) => self.on_fn_press(FnButton::Left),
            FnEvent::Key(FnKey::Right, 1) => self.on_fn_press(FnButton::Right),
            FnEvent::Key(FnKey::Volume(key), value) => {
                self.router.handle_volume_key(key, value);
            }
            FnEvent::Sync => {
                if let Some((sink, batch)) = self.router.handle_fn_sync() {
                    self.commit(sink, batch);
                }
            }
            FnEvent::Key(_, _) | FnEvent::Other => {}
        }
    }

    fn on_fn_press(&mut self, button: FnButton) {
        info!(
            "Fn button {:?} down at {}",
            button,
            Local::now().format("%H:%M:%S%.3f")
        );
        if let Some(action) = self.resolver.press(button, Instant::now()) {
            self.apply_action(action);
        }
    }

    fn apply_action(&mut self, action: GestureAction) {
        match action {
            GestureAction::SteamMenu => {
                let batch = EventBatch::from_iter([
                    OutputEvent::Pad(PadButton::Mode, 1),
                    OutputEvent::Pad(PadButton::Mode, 0),
                ]);
                self.commit(SinkId::Pad, batch);
            }
            GestureAction::QuickMenu => {
                let step = self.chord_step;
                self.sequencer.schedule(
                    Instant::now(),
                    [
                        (
                            Duration::ZERO,
                            vec![
                                OutputEvent::Pad(PadButton::Mode, 1),
                                OutputEvent::Pad(PadButton::South, 1),
                            ],
                        ),
                        (
                            step,
                            vec![
                                OutputEvent::Pad(PadButton::South, 0),
                                OutputEvent::Pad(PadButton::Mode, 0),
                            ],
                        ),
                    ],
                );
            }
            GestureAction::OnScreenKeyboard => {
                let step = self.chord_step;
                self.sequencer.schedule(
                    Instant::now(),
                    [
                        (Duration::ZERO, vec![OutputEvent::Pad(PadButton::Mode, 1)]),
                        (step, vec![OutputEvent::Pad(PadButton::North, 1)]),
                        (step * 2, vec![OutputEvent::Pad(PadButton::North, 0)]),
                        (step * 3, vec![OutputEvent::Pad(PadButton::Mode, 0)]),
                    ],
                );
            }
            GestureAction::ToggleGyro => {
                if self.router.toggle_gyro() {
                    // Refresh the sensor epoch so the first armed tick
                    // sees a sane dt instead of the whole off period.
                    let _ = self.pipeline.sample();
                    self.gyro_tick = Some(interval(self.tick_period));
                    info!("Gyro assist enabled");
                } else {
                    self.gyro_tick = None;
                    info!("Gyro assist disabled");
                }
            }
            GestureAction::ToggleMode => {
                if self.router.toggle_mode() {
                    self.rel_tick = None;
                    info!("Switched to joystick mode");
                } else {
                    self.rel_tick = Some(interval(self.tick_period));
                    info!("Switched to mouse mode");
                }
            }
        }
    }

    fn commit(&mut self, sink: SinkId, batch: EventBatch) {
        let sink = match sink {
            SinkId::Pad => &mut self.pad_sink,
            SinkId::Mouse => &mut self.mouse_sink,
        };
        if let Err(e) = sink.commit(batch) {
            // Best-effort delivery: the batch is dropped whole rather
            // than partially committed.
            error!("Dropped batch for {}: {}", sink.label(), e);
        }
    }
}
