//! Data-driven sensor bring-up with format fallback.

use std::fmt;

use crate::sensor::{PixelFormat, SensorConfig, SensorDriver, SensorError};

/// One attempt in the bring-up order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BringUpStep {
    pub format: PixelFormat,
    /// Skip this step on boards without external RAM
    pub requires_external: bool,
}

/// Uncompressed RGB first (needs external RAM for its frame buffer),
/// then JPEG which fits anywhere.
pub const SENSOR_BRINGUP: [BringUpStep; 2] = [
    BringUpStep {
        format: PixelFormat::Rgb565,
        requires_external: true,
    },
    BringUpStep {
        format: PixelFormat::Jpeg,
        requires_external: false,
    },
];

/// How the sensor ended up configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BringUpOutcome {
    pub format: PixelFormat,
    /// A preferred step was skipped or failed before this one succeeded
    pub fallback_to_jpeg: bool,
}

impl BringUpOutcome {
    /// Camera line of the idle banner.
    pub fn label(&self) -> &'static str {
        match (self.format.is_compressed(), self.fallback_to_jpeg) {
            (false, _) => "RGB",
            (true, false) => "JPEG",
            (true, true) => "JPEG (fallback)",
        }
    }
}

impl fmt::Display for BringUpOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Walk `steps` until the sensor accepts a configuration.
///
/// # Arguments
/// * `sensor` - Driver to configure
/// * `steps` - Attempts in preference order
/// * `base` - Resolution and JPEG quality shared by every attempt
/// * `has_external` - Whether external RAM is fitted
/// * `prefer_rgb` - `false` skips uncompressed steps without counting it
///   as a fallback
///
/// # Returns
/// The chosen format, or the last init error if every step failed.
pub fn bring_up_sensor(
    sensor: &mut dyn SensorDriver,
    steps: &[BringUpStep],
    base: &SensorConfig,
    has_external: bool,
    prefer_rgb: bool,
) -> Result<BringUpOutcome, SensorError> {
    let mut fallback = false;
    let mut last_error = None;

    for step in steps {
        if !prefer_rgb && !step.format.is_compressed() {
            continue;
        }
        if step.requires_external && !has_external {
            log::warn!("Skipping {} sensor mode: no external RAM", step.format);
            fallback = true;
            continue;
        }

        let config = SensorConfig {
            format: step.format,
            ..base.clone()
        };
        match sensor.init(&config) {
            Ok(()) => {
                let outcome = BringUpOutcome {
                    format: step.format,
                    fallback_to_jpeg: fallback && step.format.is_compressed(),
                };
                log::info!(
                    "Sensor up: {} {}x{} ({})",
                    step.format,
                    config.width,
                    config.height,
                    outcome.label()
                );
                return Ok(outcome);
            }
            Err(e) => {
                log::warn!("Sensor init as {} failed: {}", step.format, e);
                fallback = true;
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| SensorError::InitFailed("no usable sensor mode".to_string())))
}
