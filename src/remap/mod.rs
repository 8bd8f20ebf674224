//! Event remapping and mode routing.
//!
//! This module contains the hot-path transformation logic:
//!
//! 1. [`state`] - Mode flags and accumulators owned by the event loop
//! 2. [`router`] - Per-mode event transformation and batch assembly
//! 3. [`gesture`] - Single/double/chord disambiguation on the fn keys
//! 4. [`sequencer`] - Timed multi-step menu chord emission
//!
//! # Architecture
//!
//! ```text
//! SourceEvent ──► EventRouter ──► EventBatch ──► OutputSink
//!                     ▲
//! FnEvent ──► GestureResolver ──► GestureAction ──► ChordSequencer
//! ```
//!
//! All types here are pure over explicit inputs (events, instants); the
//! event loop in [`crate::remapper`] owns the clock and the timers, which
//! keeps the timer-fire vs. cancel race structurally impossible.

pub mod gesture;
pub mod router;
pub mod sequencer;
pub mod state;

pub use gesture::{FnButton, GestureAction, GestureResolver};
pub use router::{EventRouter, SinkId};
pub use sequencer::ChordSequencer;
pub use state::{AxisAccumulator, RouterState};

use thiserror::Error;

/// Error types for the remapping engine
#[derive(Debug, Error)]
pub enum RemapError {
    #[error("Input channel closed: {0}")]
    ChannelClosed(String),

    #[error("Failed to commit output batch: {0}")]
    CommitError(String),
}
