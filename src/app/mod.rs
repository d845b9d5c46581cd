//! Application controller: bring-up, the capture flow and user feedback.
//!
//! ```text
//! Boot -> InitDisplay -> InitStorage -> InitCamera -> Idle
//! Idle -> Capture -> Filter -> Save -> Feedback -> Idle
//! any init failure -> Error -> (press) -> InitDisplay
//! ```
//!
//! Holding the button in `Idle` runs the live preview until the next press.

mod bringup;
mod controller;
mod state;

pub use bringup::{bring_up_sensor, BringUpOutcome, BringUpStep, SENSOR_BRINGUP};
pub use controller::{AppController, ControllerConfig};
pub use state::AppState;
