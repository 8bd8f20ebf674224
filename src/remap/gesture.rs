//! Single/double/chord disambiguation for the two fn buttons.
//!
//! Each button runs a small machine: `Idle` or `PendingSingleClick` with a
//! deadline. The resolver is pure over explicit instants; the event loop
//! feeds it presses and polls it when the earliest deadline passes. With
//! fire and cancel both funneled through the same loop, exactly one of
//! single/double/chord can ever execute for a given press pair.

use std::time::{Duration, Instant};
use tracing::{debug, info};

/// The two auxiliary hardware buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnButton {
    Left,
    Right,
}

/// Resolved gesture outcome, executed by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureAction {
    /// Left single click: steam-menu chord (mode press/release).
    SteamMenu,
    /// Right single click: quick-menu chord sequence.
    QuickMenu,
    /// Left double click: toggle gyro assist.
    ToggleGyro,
    /// Right double click: on-screen keyboard chord sequence.
    OnScreenKeyboard,
    /// Left+right chord: toggle joystick/mouse mode.
    ToggleMode,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ClickState {
    Idle,
    PendingSingleClick(Instant),
}

pub struct GestureResolver {
    window: Duration,
    left: ClickState,
    right: ClickState,
}

impl GestureResolver {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            left: ClickState::Idle,
            right: ClickState::Idle,
        }
    }

    fn single_action(button: FnButton) -> GestureAction {
        match button {
            FnButton::Left => GestureAction::SteamMenu,
            FnButton::Right => GestureAction::QuickMenu,
        }
    }

    fn double_action(button: FnButton) -> GestureAction {
        match button {
            FnButton::Left => GestureAction::ToggleGyro,
            FnButton::Right => GestureAction::OnScreenKeyboard,
        }
    }

    /// Handles a button-down. Returns an action when the press resolves a
    /// pending gesture immediately (double click or chord); a fresh press
    /// only arms the disambiguation window.
    pub fn press(&mut self, button: FnButton, now: Instant) -> Option<GestureAction> {
        let (own, other) = match button {
            FnButton::Left => (&mut self.left, &mut self.right),
            FnButton::Right => (&mut self.right, &mut self.left),
        };

        // The chord path wins over either button's own double-click: a
        // pending timer on the other button is cancelled first.
        if matches!(other, ClickState::PendingSingleClick(_)) {
            *other = ClickState::Idle;
            *own = ClickState::Idle;
            info!("Fn chord resolved: {:?}", GestureAction::ToggleMode);
            return Some(GestureAction::ToggleMode);
        }

        match *own {
            ClickState::Idle => {
                *own = ClickState::PendingSingleClick(now + self.window);
                debug!("Armed single-click window for {:?}", button);
                None
            }
            ClickState::PendingSingleClick(_) => {
                *own = ClickState::Idle;
                let action = Self::double_action(button);
                info!("Fn double click resolved: {:?}", action);
                Some(action)
            }
        }
    }

    /// Earliest pending deadline, if any; the event loop sleeps until it.
    pub fn next_deadline(&self) -> Option<Instant> {
        let deadline = |state: &ClickState| match state {
            ClickState::PendingSingleClick(at) => Some(*at),
            ClickState::Idle => None,
        };
        match (deadline(&self.left), deadline(&self.right)) {
            (Some(l), Some(r)) => Some(l.min(r)),
            (l, r) => l.or(r),
        }
    }

    /// Fires at most one expired single-click per call; the loop re-polls
    /// through `next_deadline` until drained.
    pub fn poll_expired(&mut self, now: Instant) -> Option<GestureAction> {
        for (button, state) in [
            (FnButton::Left, &mut self.left),
            (FnButton::Right, &mut self.right),
        ] {
            if let ClickState::PendingSingleClick(at) = *state {
                if at <= now {
                    *state = ClickState::Idle;
                    let action = Self::single_action(button);
                    info!("Fn single click resolved: {:?}", action);
                    return Some(action);
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_millis(1000);

    fn ms(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    /// Drives presses and expiries in timestamp order, collecting every
    /// resolved action.
    fn run_scenario(presses: &[(FnButton, u64)], until_ms: u64) -> Vec<(GestureAction, u64)> {
        let base = Instant::now();
        let mut resolver = GestureResolver::new(WINDOW);
        let mut actions = Vec::new();
        let mut press_iter = presses.iter().peekable();

        for t in 0..=until_ms {
            let now = ms(base, t);
            while resolver.next_deadline().is_some_and(|d| d <= now) {
                if let Some(action) = resolver.poll_expired(now) {
                    actions.push((action, t));
                }
            }
            while let Some(&&(button, at)) = press_iter.peek() {
                if at != t {
                    break;
                }
                press_iter.next();
                if let Some(action) = resolver.press(button, now) {
                    actions.push((action, t));
                }
            }
        }
        actions
    }

    #[test]
    fn lone_press_yields_exactly_one_single_click() {
        let actions = run_scenario(&[(FnButton::Left, 0)], 3000);
        assert_eq!(actions, vec![(GestureAction::SteamMenu, 1000)]);

        let actions = run_scenario(&[(FnButton::Right, 0)], 3000);
        assert_eq!(actions, vec![(GestureAction::QuickMenu, 1000)]);
    }

    #[test]
    fn double_press_fires_once_at_second_press() {
        let actions = run_scenario(&[(FnButton::Left, 0), (FnButton::Left, 300)], 3000);
        // Fires at t=300, not at the window end, and no single click.
        assert_eq!(actions, vec![(GestureAction::ToggleGyro, 300)]);

        let actions = run_scenario(&[(FnButton::Right, 0), (FnButton::Right, 999)], 3000);
        assert_eq!(actions, vec![(GestureAction::OnScreenKeyboard, 999)]);
    }

    #[test]
    fn cross_button_press_resolves_chord_only() {
        let actions = run_scenario(&[(FnButton::Left, 0), (FnButton::Right, 50)], 3000);
        assert_eq!(actions, vec![(GestureAction::ToggleMode, 50)]);

        let actions = run_scenario(&[(FnButton::Right, 0), (FnButton::Left, 50)], 3000);
        assert_eq!(actions, vec![(GestureAction::ToggleMode, 50)]);
    }

    #[test]
    fn chord_wins_even_at_window_edge() {
        let actions = run_scenario(&[(FnButton::Left, 0), (FnButton::Right, 999)], 3000);
        assert_eq!(actions, vec![(GestureAction::ToggleMode, 999)]);
    }

    #[test]
    fn presses_after_expiry_start_a_new_gesture() {
        let actions = run_scenario(&[(FnButton::Left, 0), (FnButton::Left, 1500)], 4000);
        assert_eq!(
            actions,
            vec![
                (GestureAction::SteamMenu, 1000),
                (GestureAction::SteamMenu, 2500),
            ]
        );
    }

    #[test]
    fn independent_singles_on_both_buttons() {
        // Second press lands after the first window closed: two singles,
        // no chord.
        let actions = run_scenario(&[(FnButton::Left, 0), (FnButton::Right, 1200)], 4000);
        assert_eq!(
            actions,
            vec![
                (GestureAction::SteamMenu, 1000),
                (GestureAction::QuickMenu, 2200),
            ]
        );
    }

    #[test]
    fn expiry_and_press_never_both_fire() {
        // Press exactly at the deadline: the loop polls expiries first, so
        // the single click wins and the press arms a new window.
        let base = Instant::now();
        let mut resolver = GestureResolver::new(WINDOW);

        assert_eq!(resolver.press(FnButton::Left, base), None);
        let deadline = resolver.next_deadline().unwrap();

        assert_eq!(
            resolver.poll_expired(deadline),
            Some(GestureAction::SteamMenu)
        );
        // The pending state is consumed; the same deadline cannot fire again.
        assert_eq!(resolver.poll_expired(deadline), None);
        assert_eq!(resolver.next_deadline(), None);

        // And the press that raced the deadline starts a fresh gesture
        // rather than resolving a double click.
        assert_eq!(resolver.press(FnButton::Left, deadline), None);
        assert!(resolver.next_deadline().is_some());
    }
}
