//! Blocking live-preview session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use super::double_buffer::{PreviewBuffers, PreviewConsumer, PreviewProducer, PreviewStats};
use super::PreviewError;
use crate::display::DisplayDriver;
use crate::input::{Button, ButtonEvent, ButtonTracker};
use crate::memory::{allocate_set, MemoryPool, RegionBuffer};
use crate::pipeline::{frame_to_gray, ProcessingError};
use crate::sensor::SensorDriver;
use crate::tone::{self, packed_len, DitherAlgorithm, ToneTables};

/// Preview geometry and pacing.
#[derive(Debug, Clone, PartialEq)]
pub struct PreviewSettings {
    pub width: u32,
    pub height: u32,
    pub algorithm: DitherAlgorithm,
    /// Pause between preview frames
    pub frame_interval: Duration,
    /// Cutoff if `algorithm` is the night threshold
    pub night_threshold: u8,
}

impl Default for PreviewSettings {
    fn default() -> Self {
        Self {
            width: 80,
            height: 60,
            algorithm: DitherAlgorithm::Bayer8,
            frame_interval: Duration::from_millis(66),
            night_threshold: 96,
        }
    }
}

/// Why [`PreviewSession::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewExit {
    /// The capture button was pressed
    ButtonPressed,
    /// The stop flag was raised (Ctrl+C)
    Stopped,
}

/// Owns the double buffer and the source scratch for one preview run.
pub struct PreviewSession {
    producer: PreviewProducer,
    consumer: PreviewConsumer,
    settings: PreviewSettings,
    source_width: u32,
    source_height: u32,
    rgb: RegionBuffer,
    gray: RegionBuffer,
    presented: u64,
}

impl PreviewSession {
    /// Allocate everything the preview needs.
    ///
    /// # Arguments
    /// * `pool` - Memory source for the slots and the source scratch
    /// * `source_width`, `source_height` - Largest sensor frame expected
    /// * `settings` - Preview size, algorithm and pacing
    pub fn start(
        pool: &dyn MemoryPool,
        source_width: u32,
        source_height: u32,
        settings: PreviewSettings,
    ) -> Result<Self, PreviewError> {
        let slot_len = settings.width as usize * settings.height as usize;
        let bitmap_len = packed_len(settings.width as usize, settings.height as usize);
        let (producer, consumer) = PreviewBuffers::allocate(pool, slot_len, bitmap_len)?.split();

        let source_pixels = source_width as usize * source_height as usize;
        let (_, scratch) = allocate_set(pool, &[source_pixels * 3, source_pixels])?;
        let mut scratch = scratch.into_iter();
        let (Some(rgb), Some(gray)) = (scratch.next(), scratch.next()) else {
            return Err(PreviewError::EmptySlot);
        };

        log::info!(
            "Live preview started: {}x{} {}",
            settings.width,
            settings.height,
            settings.algorithm.name()
        );
        Ok(Self {
            producer,
            consumer,
            settings,
            source_width,
            source_height,
            rgb,
            gray,
            presented: 0,
        })
    }

    pub fn settings(&self) -> &PreviewSettings {
        &self.settings
    }

    pub fn stats(&self) -> PreviewStats {
        self.consumer.stats()
    }

    /// Frames drawn so far.
    pub fn presented(&self) -> u64 {
        self.presented
    }

    /// Producer step: grab a frame, shrink it into the write slot, commit.
    ///
    /// Returns `false` when the sensor had no frame.
    pub fn produce(&mut self, sensor: &mut dyn SensorDriver) -> Result<bool, PreviewError> {
        let Some(frame) = sensor.acquire_frame() else {
            return Ok(false);
        };
        let (w, h) = (frame.width(), frame.height());
        if w > self.source_width || h > self.source_height {
            sensor.release_frame(frame);
            return Err(ProcessingError::FrameTooLarge {
                width: w,
                height: h,
                max_width: self.source_width,
                max_height: self.source_height,
            }
            .into());
        }

        let pixels = w as usize * h as usize;
        let digested = frame_to_gray(&frame, &mut self.rgb[..pixels * 3], &mut self.gray[..pixels]);
        sensor.release_frame(frame);
        digested?;

        let Some(slot) = self.producer.get_write_buffer() else {
            return Ok(false);
        };
        tone::downsample_into(
            &self.gray[..pixels],
            w as usize,
            h as usize,
            self.settings.width as usize,
            self.settings.height as usize,
            slot,
        )?;
        self.producer.commit_write();
        Ok(true)
    }

    /// Consumer step: dither the newest preview frame and draw it.
    ///
    /// Returns `false` when no new frame was waiting.
    pub fn present(
        &mut self,
        display: &mut dyn DisplayDriver,
        tables: &ToneTables,
    ) -> Result<bool, PreviewError> {
        let (pw, ph) = (self.settings.width, self.settings.height);
        let algorithm = self.settings.algorithm;
        let night_threshold = self.settings.night_threshold;

        let drawn = self.consumer.with_frame(|frame, bitmap| -> Result<(), PreviewError> {
            tone::dither(
                algorithm,
                frame,
                pw as usize,
                ph as usize,
                tables,
                night_threshold,
                bitmap,
            )?;
            display.draw_bitmap_1bpp(bitmap, pw, ph)?;
            display.flush()?;
            Ok(())
        });
        match drawn {
            Some(result) => {
                result?;
                self.presented += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run the preview until the button is pressed or `stop` is raised.
    ///
    /// Bad frames are skipped; display failures end the session.
    pub fn run(
        &mut self,
        sensor: &mut dyn SensorDriver,
        display: &mut dyn DisplayDriver,
        button: &mut dyn Button,
        tracker: &mut ButtonTracker,
        tables: &ToneTables,
        stop: &AtomicBool,
    ) -> Result<PreviewExit, PreviewError> {
        let exit = loop {
            if stop.load(Ordering::SeqCst) {
                break PreviewExit::Stopped;
            }
            if tracker.poll(button, Instant::now()) == ButtonEvent::Pressed {
                tracker.consume();
                break PreviewExit::ButtonPressed;
            }

            match self.produce(sensor) {
                Ok(_) => {}
                Err(PreviewError::Processing(e)) => log::warn!("Preview frame skipped: {}", e),
                Err(PreviewError::Tone(e)) => log::warn!("Preview frame skipped: {}", e),
                Err(e) => return Err(e),
            }
            self.present(display, tables)?;

            if !self.settings.frame_interval.is_zero() {
                std::thread::sleep(self.settings.frame_interval);
            }
        };

        let stats = self.stats();
        log::info!(
            "Live preview ended ({:?}): {} shown, {} committed, {} dropped",
            exit,
            self.presented,
            stats.committed,
            stats.overwritten
        );
        Ok(exit)
    }
}

impl std::fmt::Debug for PreviewSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewSession")
            .field("settings", &self.settings)
            .field("presented", &self.presented)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::TerminalDisplay;
    use crate::memory::HostMemory;
    use crate::sensor::{PixelFormat, Scene, SensorConfig, SimulatedSensor};

    struct PressAfter(usize);

    impl Button for PressAfter {
        fn is_pressed(&mut self) -> bool {
            if self.0 == 0 {
                true
            } else {
                self.0 -= 1;
                false
            }
        }
    }

    fn settings() -> PreviewSettings {
        PreviewSettings {
            frame_interval: Duration::ZERO,
            ..PreviewSettings::default()
        }
    }

    fn sensor() -> SimulatedSensor {
        let mut s = SimulatedSensor::new(Scene::Gradient);
        s.init(&SensorConfig::qqvga(PixelFormat::Jpeg)).unwrap();
        s
    }

    #[test]
    fn test_produce_then_present() {
        let mut s = sensor();
        let mut display = TerminalDisplay::new(Vec::new(), 80);
        display.init().unwrap();
        let mut session =
            PreviewSession::start(&HostMemory::new(None), 160, 120, settings()).unwrap();

        assert!(!session.present(&mut display, &ToneTables::default()).unwrap());
        assert!(session.produce(&mut s).unwrap());
        assert!(session.present(&mut display, &ToneTables::default()).unwrap());
        assert_eq!(session.presented(), 1);
        assert_eq!(s.stats().outstanding(), 0);
        assert!(!display.into_inner().is_empty());
    }

    #[test]
    fn test_oversized_frame_released() {
        let mut s = sensor();
        let mut session =
            PreviewSession::start(&HostMemory::new(None), 80, 60, settings()).unwrap();
        assert!(matches!(
            session.produce(&mut s),
            Err(PreviewError::Processing(ProcessingError::FrameTooLarge { .. }))
        ));
        assert_eq!(s.stats().outstanding(), 0);
    }

    #[test]
    fn test_run_exits_on_press() {
        let mut s = sensor();
        let mut display = TerminalDisplay::new(Vec::new(), 80);
        display.init().unwrap();
        let mut session =
            PreviewSession::start(&HostMemory::new(None), 160, 120, settings()).unwrap();
        let mut tracker = ButtonTracker::default();
        let stop = AtomicBool::new(false);

        let exit = session
            .run(
                &mut s,
                &mut display,
                &mut PressAfter(3),
                &mut tracker,
                &ToneTables::default(),
                &stop,
            )
            .unwrap();
        assert_eq!(exit, PreviewExit::ButtonPressed);
        assert_eq!(session.presented(), 3);
        assert_eq!(s.stats().outstanding(), 0);
        // Releasing the exit press is not a capture
        assert_eq!(tracker.update(false, Instant::now()), ButtonEvent::Released);
    }

    #[test]
    fn test_run_honours_stop_flag() {
        let mut s = sensor();
        let mut display = TerminalDisplay::new(Vec::new(), 80);
        display.init().unwrap();
        let mut session =
            PreviewSession::start(&HostMemory::new(None), 160, 120, settings()).unwrap();
        let stop = AtomicBool::new(true);
        let exit = session
            .run(
                &mut s,
                &mut display,
                &mut PressAfter(100),
                &mut ButtonTracker::default(),
                &ToneTables::default(),
                &stop,
            )
            .unwrap();
        assert_eq!(exit, PreviewExit::Stopped);
        assert_eq!(session.presented(), 0);
    }
}
