//! Sensor driver trait.

use super::types::{SensorConfig, SensorError, SensorFrame};

/// Lowest exposure compensation level.
pub const EXPOSURE_MIN: i8 = -2;
/// Highest exposure compensation level.
pub const EXPOSURE_MAX: i8 = 2;

/// Narrow interface to the physical image sensor.
///
/// Drivers hand out at most one [`SensorFrame`] at a time; callers must
/// return it with [`SensorDriver::release_frame`] before acquiring another.
pub trait SensorDriver {
    /// Configure the sensor for `config`. May be called again to reconfigure.
    fn init(&mut self, config: &SensorConfig) -> Result<(), SensorError>;

    /// Active configuration, if initialized.
    fn config(&self) -> Option<&SensorConfig>;

    /// Grab one frame. `None` when the sensor is not ready or already has a
    /// frame outstanding.
    fn acquire_frame(&mut self) -> Option<SensorFrame>;

    /// Return a frame obtained from [`SensorDriver::acquire_frame`].
    fn release_frame(&mut self, frame: SensorFrame);

    /// Exposure compensation in `EXPOSURE_MIN..=EXPOSURE_MAX`.
    fn set_exposure_level(&mut self, level: i8) -> Result<(), SensorError>;

    fn set_auto_exposure(&mut self, enabled: bool) -> Result<(), SensorError>;

    fn set_auto_gain(&mut self, enabled: bool) -> Result<(), SensorError>;

    /// Manual high-exposure, high-gain registers for low light.
    fn set_night_preset(&mut self) -> Result<(), SensorError>;

    /// Restore automatic exposure and gain.
    fn set_standard_preset(&mut self) -> Result<(), SensorError>;
}
