//! Non-blocking exposure auto-tune loop.
//!
//! The tuner is polled by the control loop. Each due [`AutoTuner::tick`]
//! samples one frame, compares its average brightness against the target and
//! nudges exposure compensation by one step. Ticks that are not due, or that
//! arrive while tuning is inactive, do nothing, so callers can poll
//! unconditionally.
//!
//! ```text
//! Idle --start--> Sampling --off target--> Adjusting --> Sampling ...
//!                     |
//!                     +--within tolerance / max iterations--> Complete
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use crate::sensor::{SensorDriver, SensorError, EXPOSURE_MAX, EXPOSURE_MIN};

/// Tuner parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TuneConfig {
    /// Desired average brightness (0-255)
    pub target_brightness: u8,
    /// Accepted distance from the target
    pub tolerance: u8,
    /// Minimum time between samples
    pub sample_interval: Duration,
    /// Adjustments allowed before giving up
    pub max_iterations: u32,
    /// Byte stride used when averaging the raw frame
    pub sample_stride: usize,
    /// Auto-exposure flag applied when tuning starts
    pub auto_exposure: bool,
    /// Auto-gain flag applied when tuning starts
    pub auto_gain: bool,
}

impl Default for TuneConfig {
    fn default() -> Self {
        Self {
            target_brightness: 128,
            tolerance: 16,
            sample_interval: Duration::from_millis(200),
            max_iterations: 8,
            sample_stride: 64,
            auto_exposure: true,
            auto_gain: true,
        }
    }
}

/// What the standard preset puts back on the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StandardExposure {
    pub auto_exposure: bool,
    pub auto_gain: bool,
    /// Exposure compensation in `EXPOSURE_MIN..=EXPOSURE_MAX`
    pub level: i8,
}

impl StandardExposure {
    /// Untuned settings: the configured AE/AGC flags at level 0.
    pub fn from_config(config: &TuneConfig) -> Self {
        Self {
            auto_exposure: config.auto_exposure,
            auto_gain: config.auto_gain,
            level: 0,
        }
    }

    /// Leave any manual preset and restore AE/AGC and the exposure level.
    pub fn apply(&self, sensor: &mut dyn SensorDriver) -> Result<(), SensorError> {
        sensor.set_standard_preset()?;
        sensor.set_auto_exposure(self.auto_exposure)?;
        sensor.set_auto_gain(self.auto_gain)?;
        sensor.set_exposure_level(self.level)
    }
}

impl Default for StandardExposure {
    fn default() -> Self {
        Self::from_config(&TuneConfig::default())
    }
}

/// Tuner phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TuneState {
    Idle,
    Sampling,
    Adjusting,
    Complete,
}

impl fmt::Display for TuneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TuneState::Idle => "idle",
            TuneState::Sampling => "sampling",
            TuneState::Adjusting => "adjusting",
            TuneState::Complete => "complete",
        };
        f.write_str(s)
    }
}

/// Why tuning finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionReason {
    /// Brightness landed inside the tolerance band
    Converged,
    /// Iteration budget exhausted
    IterationLimit,
}

/// Result of one [`AutoTuner::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Tuning is not active
    Inactive,
    /// Nothing happened: sample not due, or frame unavailable
    Pending,
    /// Exposure was nudged to `level` after measuring `brightness`
    Adjusted { brightness: u8, level: i8 },
    /// Tuning finished this tick
    Complete(CompletionReason),
}

impl TickOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, TickOutcome::Complete(_))
    }
}

/// Average of every `stride`-th byte of a raw frame buffer.
///
/// This is an approximation: for compressed frames it averages bitstream
/// bytes rather than decoded luminance. It is cheap enough to run every
/// tick and tracks exposure changes well enough to steer the loop.
pub fn sample_brightness(data: &[u8], stride: usize) -> Option<u8> {
    let stride = stride.max(1);
    let mut sum = 0u64;
    let mut count = 0u64;
    for &b in data.iter().step_by(stride) {
        sum += b as u64;
        count += 1;
    }
    if count == 0 {
        return None;
    }
    Some((sum / count) as u8)
}

/// Exposure auto-tune controller.
#[derive(Debug)]
pub struct AutoTuner {
    config: TuneConfig,
    state: TuneState,
    iterations: u32,
    exposure_level: i8,
    last_sample: Option<Instant>,
    last_brightness: Option<u8>,
}

impl AutoTuner {
    pub fn new(config: TuneConfig) -> Self {
        Self {
            config,
            state: TuneState::Idle,
            iterations: 0,
            exposure_level: 0,
            last_sample: None,
            last_brightness: None,
        }
    }

    pub fn config(&self) -> &TuneConfig {
        &self.config
    }

    pub fn state(&self) -> TuneState {
        self.state
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn exposure_level(&self) -> i8 {
        self.exposure_level
    }

    pub fn last_brightness(&self) -> Option<u8> {
        self.last_brightness
    }

    /// Standard preset carrying the tuned exposure level.
    pub fn standard_exposure(&self) -> StandardExposure {
        StandardExposure {
            level: self.exposure_level,
            ..StandardExposure::from_config(&self.config)
        }
    }

    /// True while samples are still being taken.
    pub fn is_tuning(&self) -> bool {
        matches!(self.state, TuneState::Sampling | TuneState::Adjusting)
    }

    fn set_state(&mut self, next: TuneState) {
        debug_assert!(
            matches!(
                (self.state, next),
                (_, TuneState::Idle)
                    | (_, TuneState::Sampling)
                    | (TuneState::Sampling, TuneState::Adjusting)
                    | (TuneState::Sampling, TuneState::Complete)
            ),
            "invalid tune transition {} -> {}",
            self.state,
            next
        );
        log::trace!("Auto-tune {} -> {}", self.state, next);
        self.state = next;
    }

    /// Begin a new tuning run.
    ///
    /// Applies the configured auto-exposure/auto-gain flags, resets the
    /// iteration counter and makes the next tick due immediately.
    pub fn start_auto_tune(&mut self, sensor: &mut dyn SensorDriver) -> Result<(), SensorError> {
        sensor.set_auto_exposure(self.config.auto_exposure)?;
        sensor.set_auto_gain(self.config.auto_gain)?;
        self.iterations = 0;
        self.last_sample = None;
        self.last_brightness = None;
        self.set_state(TuneState::Sampling);
        log::info!(
            "Auto-tune started (target {} +/- {})",
            self.config.target_brightness,
            self.config.tolerance
        );
        Ok(())
    }

    /// Abort tuning and discard in-flight iteration state.
    pub fn cancel_auto_tune(&mut self) {
        if self.state != TuneState::Idle {
            log::info!("Auto-tune cancelled after {} iteration(s)", self.iterations);
        }
        self.iterations = 0;
        self.last_sample = None;
        self.set_state(TuneState::Idle);
    }

    /// Perform at most one sample-and-adjust step.
    pub fn tick(&mut self, sensor: &mut dyn SensorDriver, now: Instant) -> TickOutcome {
        if self.state != TuneState::Sampling {
            return TickOutcome::Inactive;
        }
        if let Some(last) = self.last_sample {
            if now.saturating_duration_since(last) < self.config.sample_interval {
                return TickOutcome::Pending;
            }
        }
        self.last_sample = Some(now);

        if self.iterations >= self.config.max_iterations {
            self.set_state(TuneState::Complete);
            log::info!(
                "Auto-tune stopped at iteration limit ({}), exposure {}",
                self.iterations,
                self.exposure_level
            );
            return TickOutcome::Complete(CompletionReason::IterationLimit);
        }

        let Some(frame) = sensor.acquire_frame() else {
            log::debug!("Auto-tune sample skipped: no frame");
            return TickOutcome::Pending;
        };
        let brightness = sample_brightness(frame.data(), self.config.sample_stride);
        sensor.release_frame(frame);
        let Some(brightness) = brightness else {
            return TickOutcome::Pending;
        };
        self.last_brightness = Some(brightness);

        let target = self.config.target_brightness as i16;
        let diff = brightness as i16 - target;
        if diff.abs() <= self.config.tolerance as i16 {
            self.set_state(TuneState::Complete);
            log::info!(
                "Auto-tune converged: brightness {} at exposure {} after {} iteration(s)",
                brightness,
                self.exposure_level,
                self.iterations
            );
            return TickOutcome::Complete(CompletionReason::Converged);
        }

        self.set_state(TuneState::Adjusting);
        let step = if diff > 0 { -1 } else { 1 };
        // Written every iteration, also when pinned at the clamp
        let level = (self.exposure_level + step).clamp(EXPOSURE_MIN, EXPOSURE_MAX);
        match sensor.set_exposure_level(level) {
            Ok(()) => self.exposure_level = level,
            Err(e) => log::warn!("Exposure write failed: {}", e),
        }
        self.iterations += 1;
        self.set_state(TuneState::Sampling);

        log::debug!(
            "Auto-tune iteration {}: brightness {} -> exposure {}",
            self.iterations,
            brightness,
            self.exposure_level
        );
        TickOutcome::Adjusted {
            brightness,
            level: self.exposure_level,
        }
    }

    /// One-shot low-light preset, outside the iterative loop.
    pub fn apply_night_mode(&mut self, sensor: &mut dyn SensorDriver) -> Result<(), SensorError> {
        self.cancel_auto_tune();
        sensor.set_night_preset()?;
        log::info!("Night exposure preset applied");
        Ok(())
    }

    /// Restore automatic exposure/gain and the tuned exposure level.
    pub fn apply_standard_mode(
        &mut self,
        sensor: &mut dyn SensorDriver,
    ) -> Result<(), SensorError> {
        self.standard_exposure().apply(sensor)?;
        log::info!("Standard exposure preset applied");
        Ok(())
    }
}
