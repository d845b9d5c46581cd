//! The capture call and its result type.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use super::arena::ScratchArena;
use super::decode::{self, ProcessingError};
use super::filter::apply_block_filter;
use super::CaptureMode;
use crate::exposure::StandardExposure;
use crate::memory::{MemoryError, MemoryPool, MemoryRegion};
use crate::sensor::{PixelFormat, SensorDriver, SensorFrame};
use crate::tone::{self, DitherAlgorithm, ToneTables};

/// Why a capture produced no image.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Sensor unavailable or frame acquisition failed
    #[error("camera error: {0}")]
    Camera(String),

    /// Decode or dither stage failed; no partial output
    #[error("processing error: {0}")]
    Processing(#[from] ProcessingError),

    /// Scratch arena could not be allocated at init
    #[error("pipeline not ready: {0}")]
    Memory(#[from] MemoryError),

    #[error("capture cancelled")]
    Cancelled,
}

/// Timings recorded for one capture, in milliseconds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureTelemetry {
    pub capture_ms: u64,
    pub process_ms: u64,
    /// Filled by whoever persists the image
    pub save_ms: u64,
}

/// Pipeline parameters fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Largest frame the scratch arena accepts
    pub max_width: u32,
    pub max_height: u32,
    /// Bitmap algorithm for [`CaptureMode::Stylized`]
    pub stylized_algorithm: DitherAlgorithm,
    /// Cutoff for [`CaptureMode::Night`]
    pub night_threshold: u8,
    /// Tile size of the block filter, `None` to skip it
    pub block_filter: Option<usize>,
    /// Restored after every [`CaptureMode::Night`] capture
    pub standard_exposure: StandardExposure,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_width: 320,
            max_height: 240,
            stylized_algorithm: DitherAlgorithm::Bayer8,
            night_threshold: 96,
            block_filter: None,
            standard_exposure: StandardExposure::default(),
        }
    }
}

/// Metadata of a captured image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    /// `false` for raw sensor bytes
    pub is_processed: bool,
    /// File extension hint for the payload
    pub extension: &'static str,
    pub mode: CaptureMode,
    /// Format the sensor delivered
    pub source_format: PixelFormat,
    pub sequence: u64,
    /// The block filter ran on the sensor bytes
    pub filtered: bool,
    pub telemetry: CaptureTelemetry,
}

enum ImageData<'a> {
    Raw(SensorFrame),
    Processed(&'a [u8]),
}

/// Output of [`CapturePipeline::capture`].
///
/// Processed images borrow the pipeline's scratch arena. Raw images
/// (`Normal` mode) carry the sensor frame itself, which must go back to the
/// driver through [`ProcessedImage::release`] or [`ProcessedImage::into_parts`].
#[must_use = "raw images hold a sensor frame that must be released"]
pub struct ProcessedImage<'a> {
    info: ImageInfo,
    data: ImageData<'a>,
}

impl<'a> ProcessedImage<'a> {
    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    pub fn data(&self) -> &[u8] {
        match &self.data {
            ImageData::Raw(frame) => frame.data(),
            ImageData::Processed(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data().is_empty()
    }

    pub fn width(&self) -> u32 {
        self.info.width
    }

    pub fn height(&self) -> u32 {
        self.info.height
    }

    pub fn is_processed(&self) -> bool {
        self.info.is_processed
    }

    pub fn extension(&self) -> &'static str {
        self.info.extension
    }

    /// Whether a sensor frame is attached.
    pub fn holds_frame(&self) -> bool {
        matches!(self.data, ImageData::Raw(_))
    }

    /// Return any attached frame to `sensor`.
    pub fn release(self, sensor: &mut dyn SensorDriver) -> ImageInfo {
        let (info, frame) = self.into_parts();
        if let Some(frame) = frame {
            sensor.release_frame(frame);
        }
        info
    }

    /// Detach the metadata and the frame, if any.
    ///
    /// Processed bytes stay readable through [`CapturePipeline::last_output`]
    /// until the next capture.
    pub fn into_parts(self) -> (ImageInfo, Option<SensorFrame>) {
        match self.data {
            ImageData::Raw(frame) => (self.info, Some(frame)),
            ImageData::Processed(_) => (self.info, None),
        }
    }
}

impl std::fmt::Debug for ProcessedImage<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessedImage")
            .field("info", &self.info)
            .field("len", &self.len())
            .finish()
    }
}

fn elapsed_ms(since: Instant) -> u64 {
    since.elapsed().as_millis() as u64
}

/// Capture pipeline with its scratch arena and tone tables.
pub struct CapturePipeline {
    arena: Result<ScratchArena, MemoryError>,
    tables: ToneTables,
    settings: PipelineSettings,
    last_output_len: Option<usize>,
    last_telemetry: Option<CaptureTelemetry>,
    cancel: Option<Arc<AtomicBool>>,
    captures: u64,
}

impl CapturePipeline {
    /// Build the pipeline and allocate its arena.
    ///
    /// Allocation failure does not fail construction: the pipeline is
    /// marked not ready and every capture returns [`CaptureError::Memory`].
    pub fn new(pool: &dyn MemoryPool, settings: PipelineSettings, tables: ToneTables) -> Self {
        let arena = ScratchArena::allocate(pool, settings.max_width, settings.max_height);
        match &arena {
            Ok(arena) => log::info!(
                "Capture arena ready: {}x{} in {}",
                settings.max_width,
                settings.max_height,
                arena.region()
            ),
            Err(e) => log::error!("Capture arena allocation failed: {}", e),
        }
        Self {
            arena,
            tables,
            settings,
            last_output_len: None,
            last_telemetry: None,
            cancel: None,
            captures: 0,
        }
    }

    /// Abort captures whenever `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn is_ready(&self) -> bool {
        self.arena.is_ok()
    }

    pub fn arena_region(&self) -> Option<MemoryRegion> {
        self.arena.as_ref().ok().map(|a| a.region())
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub fn tables(&self) -> &ToneTables {
        &self.tables
    }

    /// Swap LUTs, e.g. after a palette change.
    pub fn set_tables(&mut self, tables: ToneTables) {
        self.tables = tables;
    }

    pub fn set_stylized_algorithm(&mut self, algorithm: DitherAlgorithm) {
        self.settings.stylized_algorithm = algorithm;
    }

    pub fn set_block_filter(&mut self, block: Option<usize>) {
        self.settings.block_filter = block;
    }

    /// Update what Night captures restore, e.g. after auto-tune moved the level.
    pub fn set_standard_exposure(&mut self, standard: StandardExposure) {
        self.settings.standard_exposure = standard;
    }

    pub fn last_telemetry(&self) -> Option<CaptureTelemetry> {
        self.last_telemetry
    }

    pub fn captures(&self) -> u64 {
        self.captures
    }

    /// Bytes of the most recent processed capture.
    pub fn last_output(&self) -> Option<&[u8]> {
        let len = self.last_output_len?;
        self.arena.as_ref().ok().map(|arena| arena.gray(len))
    }

    /// Capture one image in `mode`.
    ///
    /// On return the pipeline owns no sensor frame: processed modes release
    /// it once it has been converted, and `Normal` mode moves it into the
    /// returned image.
    pub fn capture(
        &mut self,
        mode: CaptureMode,
        sensor: &mut dyn SensorDriver,
    ) -> Result<ProcessedImage<'_>, CaptureError> {
        self.last_output_len = None;
        if let Err(e) = &self.arena {
            return Err(CaptureError::Memory(e.clone()));
        }
        if self
            .cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
        {
            return Err(CaptureError::Cancelled);
        }

        if mode == CaptureMode::Night {
            sensor
                .set_night_preset()
                .map_err(|e| CaptureError::Camera(e.to_string()))?;
        }
        let standard = self.settings.standard_exposure;
        let result = self.run(mode, sensor);
        if mode == CaptureMode::Night {
            if let Err(e) = standard.apply(sensor) {
                log::warn!("Failed to restore standard exposure: {}", e);
            }
        }
        if let Err(e) = &result {
            log::warn!("Capture ({}) failed: {}", mode, e);
        }
        result
    }

    fn run(
        &mut self,
        mode: CaptureMode,
        sensor: &mut dyn SensorDriver,
    ) -> Result<ProcessedImage<'_>, CaptureError> {
        let started = Instant::now();
        let mut frame = sensor
            .acquire_frame()
            .ok_or_else(|| CaptureError::Camera("sensor returned no frame".to_string()))?;
        self.captures += 1;

        let mut info = ImageInfo {
            width: frame.width(),
            height: frame.height(),
            is_processed: false,
            extension: frame.format().extension(),
            mode,
            source_format: frame.format(),
            sequence: frame.sequence(),
            filtered: false,
            telemetry: CaptureTelemetry {
                capture_ms: elapsed_ms(started),
                ..CaptureTelemetry::default()
            },
        };

        let processing = Instant::now();
        if let Some(block) = self.settings.block_filter {
            info.filtered = apply_block_filter(&mut frame, block);
        }

        if mode == CaptureMode::Normal {
            info.telemetry.process_ms = elapsed_ms(processing);
            self.last_telemetry = Some(info.telemetry);
            log::info!(
                "Captured raw {} frame #{} ({} bytes) in {} ms",
                info.source_format,
                info.sequence,
                frame.len(),
                info.telemetry.capture_ms
            );
            return Ok(ProcessedImage {
                info,
                data: ImageData::Raw(frame),
            });
        }

        let arena = match &mut self.arena {
            Ok(arena) => arena,
            Err(e) => {
                sensor.release_frame(frame);
                return Err(CaptureError::Memory(e.clone()));
            }
        };
        let processed = process_frame(arena, &self.tables, &self.settings, mode, &frame);
        sensor.release_frame(frame);
        let len = processed?;

        info.is_processed = true;
        info.extension = "gray";
        info.telemetry.process_ms = elapsed_ms(processing);
        self.last_telemetry = Some(info.telemetry);
        self.last_output_len = Some(len);
        log::info!(
            "Captured {} frame #{} {}x{}: capture {} ms, process {} ms",
            mode,
            info.sequence,
            info.width,
            info.height,
            info.telemetry.capture_ms,
            info.telemetry.process_ms
        );

        let output = self
            .arena
            .as_ref()
            .map(|arena| arena.gray(len))
            .map_err(|e| CaptureError::Memory(e.clone()))?;
        Ok(ProcessedImage {
            info,
            data: ImageData::Processed(output),
        })
    }
}

/// Grayscale, stylize and expand `frame` inside `arena`.
///
/// Returns the number of output bytes (one per pixel).
fn process_frame(
    arena: &mut ScratchArena,
    tables: &ToneTables,
    settings: &PipelineSettings,
    mode: CaptureMode,
    frame: &SensorFrame,
) -> Result<usize, ProcessingError> {
    let (width, height) = (frame.width(), frame.height());
    if !arena.fits(width, height) {
        let (max_width, max_height) = arena.max_dimensions();
        return Err(ProcessingError::FrameTooLarge {
            width,
            height,
            max_width,
            max_height,
        });
    }
    let (w, h) = (width as usize, height as usize);
    let parts = arena.parts(width, height);

    decode::frame_to_gray(frame, parts.rgb, parts.gray)?;
    match mode {
        CaptureMode::Night => {
            tone::night_vision_with(parts.gray, w, h, &tables.night)?;
            tone::threshold_dither(parts.gray, w, h, settings.night_threshold, parts.bitmap)?;
        }
        _ => tone::dither(
            settings.stylized_algorithm,
            parts.gray,
            w,
            h,
            tables,
            settings.night_threshold,
            parts.bitmap,
        )?,
    }
    tone::expand_bitmap(parts.bitmap, w, h, parts.gray)?;
    Ok(w * h)
}

impl std::fmt::Debug for CapturePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapturePipeline")
            .field("ready", &self.is_ready())
            .field("settings", &self.settings)
            .field("captures", &self.captures)
            .finish_non_exhaustive()
    }
}
