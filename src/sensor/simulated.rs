//! Host-side sensor that renders frames from a synthetic or loaded scene.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, RgbImage};

use super::driver::{SensorDriver, EXPOSURE_MAX, EXPOSURE_MIN};
use super::types::{PixelFormat, SensorConfig, SensorError, SensorFrame};
use crate::tone;

/// Brightness multiplier per exposure step.
const EXPOSURE_STEP_GAIN: f32 = 0.25;
/// Extra gain applied while the night preset is active.
const NIGHT_PRESET_GAIN: f32 = 2.0;

/// What the simulated sensor is looking at.
#[derive(Debug, Clone)]
pub enum Scene {
    /// Every pixel the same gray value
    Uniform(u8),
    /// Left-to-right ramp from black to white
    Gradient,
    /// A loaded image, resized to the configured resolution at init
    Image(RgbImage),
}

/// Counters shared with whoever created the sensor.
///
/// Cloning the `Arc` from [`SimulatedSensor::stats`] keeps them observable
/// after the sensor has been moved into a controller.
#[derive(Debug, Default)]
pub struct SensorStats {
    acquired: AtomicUsize,
    released: AtomicUsize,
    init_calls: AtomicUsize,
    exposure_writes: AtomicUsize,
    exposure_level: AtomicI64,
}

impl SensorStats {
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Frames acquired but not yet released.
    pub fn outstanding(&self) -> usize {
        self.acquired().saturating_sub(self.released())
    }

    pub fn init_calls(&self) -> usize {
        self.init_calls.load(Ordering::SeqCst)
    }

    pub fn exposure_writes(&self) -> usize {
        self.exposure_writes.load(Ordering::SeqCst)
    }

    pub fn exposure_level(&self) -> i8 {
        self.exposure_level.load(Ordering::SeqCst) as i8
    }
}

/// Simulated sensor with a single frame buffer.
pub struct SimulatedSensor {
    scene: Scene,
    config: Option<SensorConfig>,
    scene_rgb: Option<RgbImage>,
    exposure_level: i8,
    auto_exposure: bool,
    auto_gain: bool,
    night_preset: bool,
    outstanding: bool,
    sequence: u64,
    spare: Option<Vec<u8>>,
    failing_formats: HashSet<PixelFormat>,
    failing_acquires: usize,
    stats: Arc<SensorStats>,
}

impl SimulatedSensor {
    pub fn new(scene: Scene) -> Self {
        Self {
            scene,
            config: None,
            scene_rgb: None,
            exposure_level: 0,
            auto_exposure: true,
            auto_gain: true,
            night_preset: false,
            outstanding: false,
            sequence: 0,
            spare: None,
            failing_formats: HashSet::new(),
            failing_acquires: 0,
            stats: Arc::new(SensorStats::default()),
        }
    }

    /// Make `init` fail whenever `format` is requested.
    pub fn fail_init_for(mut self, format: PixelFormat) -> Self {
        self.failing_formats.insert(format);
        self
    }

    /// Make the next `count` acquisitions return `None`.
    pub fn fail_next_acquires(&mut self, count: usize) {
        self.failing_acquires = count;
    }

    pub fn stats(&self) -> Arc<SensorStats> {
        Arc::clone(&self.stats)
    }

    pub fn exposure_level(&self) -> i8 {
        self.exposure_level
    }

    pub fn auto_exposure(&self) -> bool {
        self.auto_exposure
    }

    pub fn auto_gain(&self) -> bool {
        self.auto_gain
    }

    pub fn night_preset(&self) -> bool {
        self.night_preset
    }

    pub fn set_scene(&mut self, scene: Scene) {
        self.scene = scene;
        if let Some(config) = self.config.clone() {
            self.scene_rgb = Some(self.build_scene(&config));
        }
    }

    fn gain(&self) -> f32 {
        let mut gain = 1.0 + EXPOSURE_STEP_GAIN * self.exposure_level as f32;
        if self.night_preset {
            gain *= NIGHT_PRESET_GAIN;
        }
        gain
    }

    fn build_scene(&self, config: &SensorConfig) -> RgbImage {
        let (w, h) = (config.width, config.height);
        match &self.scene {
            Scene::Uniform(v) => RgbImage::from_pixel(w, h, image::Rgb([*v, *v, *v])),
            Scene::Gradient => RgbImage::from_fn(w, h, |x, _| {
                let v = (x * 255 / w.saturating_sub(1).max(1)) as u8;
                image::Rgb([v, v, v])
            }),
            Scene::Image(img) => {
                if img.width() == w && img.height() == h {
                    img.clone()
                } else {
                    image::imageops::resize(img, w, h, FilterType::Triangle)
                }
            }
        }
    }

    fn render(&mut self, config: &SensorConfig) -> Option<Vec<u8>> {
        let scene = self.scene_rgb.as_ref()?;
        let gain = self.gain();
        let pixels = (config.width * config.height) as usize;

        let mut rgb = Vec::with_capacity(pixels * 3);
        for &c in scene.as_raw() {
            rgb.push((c as f32 * gain).round().clamp(0.0, 255.0) as u8);
        }

        let mut out = self.spare.take().unwrap_or_default();
        out.clear();
        match config.format {
            PixelFormat::Rgb888 => out.extend_from_slice(&rgb),
            PixelFormat::Rgb565 => {
                for px in rgb.chunks_exact(3) {
                    let v = ((px[0] as u16 >> 3) << 11)
                        | ((px[1] as u16 >> 2) << 5)
                        | (px[2] as u16 >> 3);
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
            PixelFormat::Grayscale => {
                out.resize(pixels, 0);
                tone::to_grayscale_into(&rgb, pixels, 1, &mut out).ok()?;
            }
            PixelFormat::Yuv422 => {
                for px in rgb.chunks_exact(3) {
                    out.push(tone::luminance(px[0], px[1], px[2]));
                    out.push(128);
                }
            }
            PixelFormat::Jpeg => {
                let mut encoder = JpegEncoder::new_with_quality(&mut out, config.jpeg_quality);
                let result =
                    encoder.encode(&rgb, config.width, config.height, ExtendedColorType::Rgb8);
                if let Err(e) = result {
                    log::warn!("Simulated sensor JPEG encode failed: {}", e);
                    return None;
                }
            }
        }
        Some(out)
    }
}

impl std::fmt::Debug for SimulatedSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedSensor")
            .field("config", &self.config)
            .field("exposure_level", &self.exposure_level)
            .field("night_preset", &self.night_preset)
            .field("outstanding", &self.outstanding)
            .finish_non_exhaustive()
    }
}

impl SensorDriver for SimulatedSensor {
    fn init(&mut self, config: &SensorConfig) -> Result<(), SensorError> {
        self.stats.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_formats.contains(&config.format) {
            self.config = None;
            return Err(SensorError::InitFailed(format!(
                "{} not supported by this module",
                config.format
            )));
        }
        if config.width == 0 || config.height == 0 {
            return Err(SensorError::InitFailed("zero-sized frame".to_string()));
        }
        self.scene_rgb = Some(self.build_scene(config));
        self.config = Some(config.clone());
        log::debug!(
            "Simulated sensor configured: {} {}x{}",
            config.format,
            config.width,
            config.height
        );
        Ok(())
    }

    fn config(&self) -> Option<&SensorConfig> {
        self.config.as_ref()
    }

    fn acquire_frame(&mut self) -> Option<SensorFrame> {
        let config = self.config.clone()?;
        if self.outstanding {
            log::warn!("Frame requested while previous frame still held");
            return None;
        }
        if self.failing_acquires > 0 {
            self.failing_acquires -= 1;
            return None;
        }

        let data = self.render(&config)?;
        self.outstanding = true;
        self.sequence += 1;
        self.stats.acquired.fetch_add(1, Ordering::SeqCst);
        Some(SensorFrame::new(
            data,
            config.width,
            config.height,
            config.format,
            self.sequence,
        ))
    }

    fn release_frame(&mut self, frame: SensorFrame) {
        self.outstanding = false;
        self.stats.released.fetch_add(1, Ordering::SeqCst);
        self.spare = Some(frame.into_data());
    }

    fn set_exposure_level(&mut self, level: i8) -> Result<(), SensorError> {
        if !(EXPOSURE_MIN..=EXPOSURE_MAX).contains(&level) {
            return Err(SensorError::ExposureOutOfRange(level));
        }
        self.exposure_level = level;
        self.stats.exposure_writes.fetch_add(1, Ordering::SeqCst);
        self.stats
            .exposure_level
            .store(level as i64, Ordering::SeqCst);
        Ok(())
    }

    fn set_auto_exposure(&mut self, enabled: bool) -> Result<(), SensorError> {
        self.auto_exposure = enabled;
        Ok(())
    }

    fn set_auto_gain(&mut self, enabled: bool) -> Result<(), SensorError> {
        self.auto_gain = enabled;
        Ok(())
    }

    fn set_night_preset(&mut self) -> Result<(), SensorError> {
        self.auto_exposure = false;
        self.auto_gain = false;
        self.night_preset = true;
        Ok(())
    }

    fn set_standard_preset(&mut self) -> Result<(), SensorError> {
        self.auto_exposure = true;
        self.auto_gain = true;
        self.night_preset = false;
        Ok(())
    }
}
