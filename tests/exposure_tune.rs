//! Exposure auto-tune against scripted and simulated sensors.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use retrocam::exposure::{
    sample_brightness, AutoTuner, CompletionReason, TickOutcome, TuneConfig, TuneState,
};
use retrocam::sensor::{
    PixelFormat, Scene, SensorConfig, SensorDriver, SensorError, SensorFrame, SimulatedSensor,
    EXPOSURE_MAX, EXPOSURE_MIN,
};

/// Sensor that replays a fixed list of frame brightnesses.
struct ScriptedSensor {
    config: Option<SensorConfig>,
    script: VecDeque<u8>,
    levels: Vec<i8>,
    outstanding: bool,
    sequence: u64,
}

impl ScriptedSensor {
    fn new(script: &[u8]) -> Self {
        Self {
            config: Some(SensorConfig::qqvga(PixelFormat::Grayscale)),
            script: script.iter().copied().collect(),
            levels: Vec::new(),
            outstanding: false,
            sequence: 0,
        }
    }
}

impl SensorDriver for ScriptedSensor {
    fn init(&mut self, config: &SensorConfig) -> Result<(), SensorError> {
        self.config = Some(config.clone());
        Ok(())
    }

    fn config(&self) -> Option<&SensorConfig> {
        self.config.as_ref()
    }

    fn acquire_frame(&mut self) -> Option<SensorFrame> {
        if self.outstanding {
            return None;
        }
        let value = self.script.pop_front()?;
        self.outstanding = true;
        self.sequence += 1;
        Some(SensorFrame::new(
            vec![value; 160 * 120],
            160,
            120,
            PixelFormat::Grayscale,
            self.sequence,
        ))
    }

    fn release_frame(&mut self, _frame: SensorFrame) {
        self.outstanding = false;
    }

    fn set_exposure_level(&mut self, level: i8) -> Result<(), SensorError> {
        self.levels.push(level);
        Ok(())
    }

    fn set_auto_exposure(&mut self, _enabled: bool) -> Result<(), SensorError> {
        Ok(())
    }

    fn set_auto_gain(&mut self, _enabled: bool) -> Result<(), SensorError> {
        Ok(())
    }

    fn set_night_preset(&mut self) -> Result<(), SensorError> {
        Ok(())
    }

    fn set_standard_preset(&mut self) -> Result<(), SensorError> {
        Ok(())
    }
}

fn config(target: u8, tolerance: u8, max_iterations: u32) -> TuneConfig {
    TuneConfig {
        target_brightness: target,
        tolerance,
        max_iterations,
        ..TuneConfig::default()
    }
}

/// Tick with a clock that always satisfies the sample interval.
fn run_to_completion(
    tuner: &mut AutoTuner,
    sensor: &mut dyn SensorDriver,
    limit: usize,
) -> Option<(CompletionReason, usize)> {
    let mut now = Instant::now();
    let step = tuner.config().sample_interval;
    for ticks in 1..=limit {
        if let TickOutcome::Complete(reason) = tuner.tick(sensor, now) {
            return Some((reason, ticks));
        }
        now += step;
    }
    None
}

// ==================== Convergence ====================

#[test]
fn test_monotonic_decrease_converges_within_max_iterations() {
    let mut sensor = ScriptedSensor::new(&[220, 200, 180, 160, 140, 130]);
    let mut tuner = AutoTuner::new(config(128, 16, 8));
    tuner.start_auto_tune(&mut sensor).unwrap();

    let (reason, _) = run_to_completion(&mut tuner, &mut sensor, 20).unwrap();
    assert_eq!(reason, CompletionReason::Converged);
    assert!(tuner.iterations() <= 8);
    assert_eq!(tuner.state(), TuneState::Complete);
    assert!(sensor
        .levels
        .iter()
        .all(|l| (EXPOSURE_MIN..=EXPOSURE_MAX).contains(l)));
}

#[test]
fn test_level_is_clamped_when_scene_stays_bright() {
    let mut sensor = ScriptedSensor::new(&[250; 20]);
    let mut tuner = AutoTuner::new(config(100, 5, 10));
    tuner.start_auto_tune(&mut sensor).unwrap();

    let (reason, _) = run_to_completion(&mut tuner, &mut sensor, 40).unwrap();
    assert_eq!(reason, CompletionReason::IterationLimit);
    assert_eq!(tuner.iterations(), 10);
    assert_eq!(tuner.exposure_level(), EXPOSURE_MIN);
    // Every iteration writes, pinned at the clamp after the second
    let mut expected = vec![-1];
    expected.extend([EXPOSURE_MIN; 9]);
    assert_eq!(sensor.levels, expected);
}

#[test]
fn test_dark_scene_raises_exposure() {
    let mut sensor = ScriptedSensor::new(&[20, 20, 20, 20]);
    let mut tuner = AutoTuner::new(config(128, 10, 3));
    tuner.start_auto_tune(&mut sensor).unwrap();
    run_to_completion(&mut tuner, &mut sensor, 10).unwrap();
    assert_eq!(tuner.exposure_level(), EXPOSURE_MAX);
}

#[test]
fn test_samples_respect_interval() {
    let mut sensor = ScriptedSensor::new(&[200, 200, 200]);
    let mut tuner = AutoTuner::new(TuneConfig {
        sample_interval: Duration::from_millis(200),
        ..config(128, 8, 8)
    });
    tuner.start_auto_tune(&mut sensor).unwrap();

    let t0 = Instant::now();
    assert!(matches!(
        tuner.tick(&mut sensor, t0),
        TickOutcome::Adjusted { .. }
    ));
    assert_eq!(
        tuner.tick(&mut sensor, t0 + Duration::from_millis(50)),
        TickOutcome::Pending
    );
    assert_eq!(sensor.script.len(), 2);
    assert!(matches!(
        tuner.tick(&mut sensor, t0 + Duration::from_millis(200)),
        TickOutcome::Adjusted { .. }
    ));
}

#[test]
fn test_idle_tuner_does_nothing() {
    let mut sensor = ScriptedSensor::new(&[200]);
    let mut tuner = AutoTuner::new(TuneConfig::default());
    assert_eq!(tuner.tick(&mut sensor, Instant::now()), TickOutcome::Inactive);
    assert_eq!(sensor.script.len(), 1);
}

// ==================== Simulated Sensor ====================

#[test]
fn test_simulated_sensor_converges_with_gain() {
    let mut sensor = SimulatedSensor::new(Scene::Uniform(100));
    sensor.init(&SensorConfig::qqvga(PixelFormat::Rgb888)).unwrap();
    let stats = sensor.stats();
    let mut tuner = AutoTuner::new(config(128, 10, 8));
    tuner.start_auto_tune(&mut sensor).unwrap();

    let (reason, _) = run_to_completion(&mut tuner, &mut sensor, 20).unwrap();
    assert_eq!(reason, CompletionReason::Converged);
    // 100 * 1.25 = 125
    assert_eq!(tuner.exposure_level(), 1);
    assert_eq!(stats.exposure_level(), 1);
    assert_eq!(stats.outstanding(), 0);
}

#[test]
fn test_sampler_stride() {
    let mut data = vec![0u8; 256];
    for i in (0..256).step_by(64) {
        data[i] = 200;
    }
    assert_eq!(sample_brightness(&data, 64), Some(200));
    assert_eq!(sample_brightness(&[], 64), None);
}
