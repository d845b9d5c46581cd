//! Top-level control states.

use std::fmt;

/// Phase of the camera control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    Boot,
    InitDisplay,
    InitStorage,
    InitCamera,
    Idle,
    Capture,
    Filter,
    Save,
    Feedback,
    Error,
}

impl AppState {
    pub fn name(&self) -> &'static str {
        match self {
            AppState::Boot => "boot",
            AppState::InitDisplay => "init-display",
            AppState::InitStorage => "init-storage",
            AppState::InitCamera => "init-camera",
            AppState::Idle => "idle",
            AppState::Capture => "capture",
            AppState::Filter => "filter",
            AppState::Save => "save",
            AppState::Feedback => "feedback",
            AppState::Error => "error",
        }
    }

    /// Whether `self -> next` is an allowed transition.
    pub fn can_transition_to(&self, next: AppState) -> bool {
        use AppState::*;
        matches!(
            (self, next),
            (Boot, InitDisplay)
                | (InitDisplay, InitStorage)
                | (InitDisplay, Error)
                | (InitStorage, InitCamera)
                | (InitStorage, Error)
                | (InitCamera, Idle)
                | (InitCamera, Error)
                | (Idle, Capture)
                | (Capture, Filter)
                | (Capture, Feedback)
                | (Filter, Save)
                | (Save, Feedback)
                | (Feedback, Idle)
                | (Error, InitDisplay)
        )
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
