//! Capture button handling.
//!
//! The camera has a single button. [`ButtonTracker`] turns raw pressed /
//! released samples into the two gestures the controller cares about: a
//! short press (capture) and a hold (live preview).

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Default time a press must last to count as a hold.
pub const DEFAULT_HOLD: Duration = Duration::from_millis(1000);

/// Raw button level.
pub trait Button {
    fn is_pressed(&mut self) -> bool;
}

/// Gesture produced by one [`ButtonTracker::update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    /// Nothing changed
    None,
    /// Button went down
    Pressed,
    /// Released before the hold threshold
    ShortPress,
    /// Held for the hold threshold (fires once per press)
    Hold,
    /// Released after a hold, or after the press was consumed
    Released,
}

/// Edge and duration tracking for one button.
#[derive(Debug, Clone)]
pub struct ButtonTracker {
    hold_threshold: Duration,
    pressed_since: Option<Instant>,
    consumed: bool,
}

impl ButtonTracker {
    pub fn new(hold_threshold: Duration) -> Self {
        Self {
            hold_threshold,
            pressed_since: None,
            consumed: false,
        }
    }

    pub fn hold_threshold(&self) -> Duration {
        self.hold_threshold
    }

    pub fn is_down(&self) -> bool {
        self.pressed_since.is_some()
    }

    /// Feed one sample of the button level.
    pub fn update(&mut self, pressed: bool, now: Instant) -> ButtonEvent {
        match (self.pressed_since, pressed) {
            (None, true) => {
                self.pressed_since = Some(now);
                self.consumed = false;
                ButtonEvent::Pressed
            }
            (Some(since), true) => {
                if !self.consumed && now.saturating_duration_since(since) >= self.hold_threshold {
                    self.consumed = true;
                    ButtonEvent::Hold
                } else {
                    ButtonEvent::None
                }
            }
            (Some(_), false) => {
                self.pressed_since = None;
                if std::mem::take(&mut self.consumed) {
                    ButtonEvent::Released
                } else {
                    ButtonEvent::ShortPress
                }
            }
            (None, false) => ButtonEvent::None,
        }
    }

    /// Sample `button` and update.
    pub fn poll(&mut self, button: &mut dyn Button, now: Instant) -> ButtonEvent {
        let pressed = button.is_pressed();
        self.update(pressed, now)
    }

    /// Treat the current press as handled, so its release reports
    /// [`ButtonEvent::Released`] instead of a short press.
    pub fn consume(&mut self) {
        if self.pressed_since.is_some() {
            self.consumed = true;
        }
    }
}

impl Default for ButtonTracker {
    fn default() -> Self {
        Self::new(DEFAULT_HOLD)
    }
}

/// Button driven from another thread (keyboard reader, tests).
///
/// Each [`press_for`](ButtonHandle::press_for) keeps the button down until
/// the given duration has elapsed.
#[derive(Debug, Clone, Default)]
pub struct ButtonHandle {
    pressed_until: Arc<Mutex<Option<Instant>>>,
}

impl ButtonHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press_for(&self, duration: Duration) {
        if let Ok(mut until) = self.pressed_until.lock() {
            *until = Some(Instant::now() + duration);
        }
    }

    /// Pressed state as of `now`.
    pub fn is_pressed_at(&self, now: Instant) -> bool {
        match self.pressed_until.lock() {
            Ok(until) => until.is_some_and(|t| now < t),
            Err(_) => false,
        }
    }
}

impl Button for ButtonHandle {
    fn is_pressed(&mut self) -> bool {
        self.is_pressed_at(Instant::now())
    }
}
