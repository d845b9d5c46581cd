//! Image sensor interface.
//!
//! The core only talks to the sensor through [`SensorDriver`]:
//! - Frame acquisition and release via [`SensorFrame`]
//! - Exposure controls used by the auto-tune loop
//! - Night/standard register presets used by capture-mode switches
//!
//! [`SimulatedSensor`] is a host-side driver that renders frames from a
//! scene, used by the CLI and the test suites.

mod driver;
mod simulated;
mod types;

pub use driver::{SensorDriver, EXPOSURE_MAX, EXPOSURE_MIN};
pub use simulated::{Scene, SensorStats, SimulatedSensor};
pub use types::{PixelFormat, SensorConfig, SensorError, SensorFrame};
