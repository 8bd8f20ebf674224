//! Timed emission of multi-step chord sequences.
//!
//! Menu gestures synthesize press/release sequences with ~100 ms gaps.
//! Sleeping inline would stall the event loop, so the steps are queued
//! here with absolute deadlines and drained from the loop's timer arm.

use crate::events::OutputEvent;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub struct ChordSequencer {
    /// Pending steps, kept sorted by deadline.
    queue: VecDeque<(Instant, Vec<OutputEvent>)>,
}

impl ChordSequencer {
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Queues steps given as offsets from `now`.
    pub fn schedule(
        &mut self,
        now: Instant,
        steps: impl IntoIterator<Item = (Duration, Vec<OutputEvent>)>,
    ) {
        for (offset, events) in steps {
            let at = now + offset;
            let pos = self
                .queue
                .iter()
                .position(|(deadline, _)| *deadline > at)
                .unwrap_or(self.queue.len());
            self.queue.insert(pos, (at, events));
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.front().map(|(at, _)| *at)
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the events of every step due by `now`, in schedule order.
    pub fn pop_due(&mut self, now: Instant) -> Vec<OutputEvent> {
        let mut events = Vec::new();
        while self.queue.front().is_some_and(|(at, _)| *at <= now) {
            let (_, step) = self.queue.pop_front().expect("front checked above");
            events.extend(step);
        }
        events
    }
}

impl Default for ChordSequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::PadButton;

    fn ev(value: i32) -> OutputEvent {
        OutputEvent::Pad(PadButton::Mode, value)
    }

    #[test]
    fn steps_fire_in_schedule_order() {
        let base = Instant::now();
        let mut seq = ChordSequencer::new();
        seq.schedule(
            base,
            [
                (Duration::ZERO, vec![ev(1)]),
                (Duration::from_millis(100), vec![ev(0)]),
            ],
        );

        assert_eq!(seq.next_deadline(), Some(base));
        assert_eq!(seq.pop_due(base), vec![ev(1)]);
        assert!(!seq.is_idle());

        // Not yet due.
        assert_eq!(seq.pop_due(base + Duration::from_millis(50)), vec![]);
        assert_eq!(
            seq.pop_due(base + Duration::from_millis(100)),
            vec![ev(0)]
        );
        assert!(seq.is_idle());
    }

    #[test]
    fn late_poll_drains_all_due_steps_in_order() {
        let base = Instant::now();
        let mut seq = ChordSequencer::new();
        seq.schedule(
            base,
            [
                (Duration::from_millis(100), vec![ev(1)]),
                (Duration::from_millis(200), vec![ev(0)]),
            ],
        );

        let events = seq.pop_due(base + Duration::from_secs(1));
        assert_eq!(events, vec![ev(1), ev(0)]);
    }

    #[test]
    fn overlapping_sequences_interleave_by_deadline() {
        let base = Instant::now();
        let mut seq = ChordSequencer::new();
        seq.schedule(base, [(Duration::from_millis(300), vec![ev(3)])]);
        seq.schedule(base, [(Duration::from_millis(100), vec![ev(1)])]);

        assert_eq!(seq.next_deadline(), Some(base + Duration::from_millis(100)));
        assert_eq!(
            seq.pop_due(base + Duration::from_millis(300)),
            vec![ev(1), ev(3)]
        );
    }
}
