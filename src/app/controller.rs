//! The camera's top-level state machine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::bringup::{bring_up_sensor, BringUpOutcome, SENSOR_BRINGUP};
use super::state::AppState;
use crate::display::DisplayDriver;
use crate::exposure::{AutoTuner, TuneConfig};
use crate::input::{Button, ButtonEvent, ButtonTracker, DEFAULT_HOLD};
use crate::memory::MemoryPool;
use crate::pipeline::{
    CaptureError, CaptureMode, CapturePipeline, CaptureTelemetry, ImageInfo, PipelineSettings,
    ProcessedImage,
};
use crate::preview::{PreviewExit, PreviewSession, PreviewSettings};
use crate::sensor::{SensorConfig, SensorDriver, SensorFrame};
use crate::storage::settings::{
    load_palette, next_capture_index, set_next_capture_index, store_custom_palette,
};
use crate::storage::{
    capture_file_name, encode_for_storage, EncodedImage, FileStore, SettingsError, SettingsStore,
};
use crate::tone::{Palette, ToneTables};

/// Everything the controller needs to know up front.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Resolution and JPEG quality; the format comes from bring-up
    pub sensor: SensorConfig,
    /// Try uncompressed RGB before JPEG
    pub prefer_rgb: bool,
    pub pipeline: PipelineSettings,
    pub preview: PreviewSettings,
    pub tune: TuneConfig,
    /// Start exposure tuning whenever a non-night mode becomes active
    pub auto_tune: bool,
    pub tone_gamma: f32,
    pub night_gamma: f32,
    pub night_contrast: f32,
    /// Built-in palette name or `custom`
    pub palette: String,
    pub filter_enabled: bool,
    pub filter_block: usize,
    /// How long status messages stay up
    pub feedback: Duration,
    /// Press length that opens the live preview
    pub hold: Duration,
    pub file_prefix: String,
    pub initial_mode: CaptureMode,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            sensor: SensorConfig::default(),
            prefer_rgb: true,
            pipeline: PipelineSettings::default(),
            preview: PreviewSettings::default(),
            tune: TuneConfig::default(),
            auto_tune: true,
            tone_gamma: 0.9,
            night_gamma: 0.5,
            night_contrast: 1.6,
            palette: "classic".to_string(),
            filter_enabled: false,
            filter_block: 4,
            feedback: Duration::from_millis(1500),
            hold: DEFAULT_HOLD,
            file_prefix: "IMG_".to_string(),
            initial_mode: CaptureMode::Normal,
        }
    }
}

/// A capture waiting to be filtered and saved.
struct PendingCapture {
    info: ImageInfo,
    frame: Option<SensorFrame>,
}

/// Drives bring-up, capture, save and feedback from a single loop.
///
/// Call [`tick`](AppController::tick) repeatedly. Nothing blocks except the
/// live preview, which runs until the next button press.
pub struct AppController<S, D, F, B> {
    sensor: S,
    display: D,
    store: F,
    button: B,
    pool: Box<dyn MemoryPool>,
    settings: Box<dyn SettingsStore>,
    config: ControllerConfig,

    state: AppState,
    entered_at: Option<Instant>,
    tracker: ButtonTracker,
    tuner: AutoTuner,
    pipeline: Option<CapturePipeline>,
    palette: Palette,
    tables: ToneTables,
    mode: CaptureMode,
    camera: Option<BringUpOutcome>,
    storage_available: bool,
    next_index: u32,
    pending: Option<PendingCapture>,
    status: String,
    last_error: Option<String>,
    last_saved: Option<String>,
    telemetry: Option<CaptureTelemetry>,
    stop: Arc<AtomicBool>,
}

impl<S, D, F, B> AppController<S, D, F, B>
where
    S: SensorDriver,
    D: DisplayDriver,
    F: FileStore,
    B: Button,
{
    pub fn new(
        sensor: S,
        display: D,
        store: F,
        button: B,
        pool: Box<dyn MemoryPool>,
        settings: Box<dyn SettingsStore>,
        config: ControllerConfig,
    ) -> Self {
        let palette = load_palette(settings.as_ref(), &config.palette);
        let tables = ToneTables::new(
            config.tone_gamma,
            &palette,
            config.night_gamma,
            config.night_contrast,
        );
        Self {
            sensor,
            display,
            store,
            button,
            pool,
            settings,
            tracker: ButtonTracker::new(config.hold),
            tuner: AutoTuner::new(config.tune.clone()),
            mode: config.initial_mode,
            config,
            state: AppState::Boot,
            entered_at: None,
            pipeline: None,
            palette,
            tables,
            camera: None,
            storage_available: false,
            next_index: 1,
            pending: None,
            status: String::new(),
            last_error: None,
            last_saved: None,
            telemetry: None,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Share a stop flag (e.g. set by Ctrl+C) with the loop, the preview
    /// and the pipeline.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    pub fn camera(&self) -> Option<&BringUpOutcome> {
        self.camera.as_ref()
    }

    pub fn fallback_to_jpeg(&self) -> bool {
        self.camera.as_ref().is_some_and(|c| c.fallback_to_jpeg)
    }

    pub fn storage_available(&self) -> bool {
        self.storage_available
    }

    pub fn pipeline_ready(&self) -> bool {
        self.pipeline.as_ref().is_some_and(|p| p.is_ready())
    }

    /// Last status message shown to the user.
    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Path of the most recently saved capture.
    pub fn last_saved(&self) -> Option<&str> {
        self.last_saved.as_deref()
    }

    pub fn last_telemetry(&self) -> Option<CaptureTelemetry> {
        self.telemetry
    }

    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn tuner(&self) -> &AutoTuner {
        &self.tuner
    }

    pub fn sensor(&self) -> &S {
        &self.sensor
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn store(&self) -> &F {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut F {
        &mut self.store
    }

    pub fn button_mut(&mut self) -> &mut B {
        &mut self.button
    }

    /// Idle screen text.
    pub fn idle_banner(&self) -> Vec<String> {
        let camera = self.camera.as_ref().map_or("NO CAMERA", |c| c.label());
        let storage = if self.storage_available {
            "Storage ready"
        } else {
            "No storage"
        };
        let mut lines = vec![
            format!("Mode: {}", self.mode),
            format!("Camera: {}", camera),
            storage.to_string(),
        ];
        if !self.pipeline_ready() {
            lines.push("Low memory: capture disabled".to_string());
        }
        lines.push("Press: capture  Hold: preview".to_string());
        lines
    }

    fn transition_to(&mut self, next: AppState, now: Instant) {
        if !self.state.can_transition_to(next) {
            log::warn!("Unexpected transition {} -> {}", self.state, next);
        }
        log::debug!("State {} -> {}", self.state, next);
        self.state = next;
        self.entered_at = Some(now);
    }

    fn fail(&mut self, message: String, now: Instant) {
        log::error!("{}", message);
        self.status = message.clone();
        self.last_error = Some(message);
        self.transition_to(AppState::Error, now);
        let lines = [
            "ERROR".to_string(),
            self.status.clone(),
            "Press to retry".to_string(),
        ];
        if let Err(e) = self.show_lines(&lines) {
            log::warn!("Could not draw error screen: {}", e);
        }
    }

    fn show_lines(&mut self, lines: &[String]) -> Result<(), crate::display::DisplayError> {
        self.display.clear()?;
        for (i, line) in lines.iter().enumerate() {
            self.display.print_text(i as u16, line)?;
        }
        self.display.flush()
    }

    fn show_banner(&mut self) {
        let lines = self.idle_banner();
        if let Err(e) = self.show_lines(&lines) {
            log::warn!("Could not draw idle banner: {}", e);
        }
    }

    fn show_status(&mut self, status: String) {
        log::info!("{}", status);
        self.status = status;
        let lines = [self.status.clone()];
        if let Err(e) = self.show_lines(&lines) {
            log::warn!("Could not draw status: {}", e);
        }
    }

    /// Advance the state machine by one step.
    pub fn tick(&mut self, now: Instant) {
        match self.state {
            AppState::Boot => {
                log::info!("Booting");
                self.transition_to(AppState::InitDisplay, now);
            }
            AppState::InitDisplay => match self.display.init() {
                Ok(()) => self.transition_to(AppState::InitStorage, now),
                Err(e) => self.fail(format!("Display init failed: {}", e), now),
            },
            AppState::InitStorage => {
                self.init_storage();
                self.transition_to(AppState::InitCamera, now);
            }
            AppState::InitCamera => self.init_camera(now),
            AppState::Idle => self.idle(now),
            AppState::Capture => self.capture(now),
            AppState::Filter => {
                self.filter();
                self.transition_to(AppState::Save, now);
            }
            AppState::Save => {
                self.save();
                self.transition_to(AppState::Feedback, now);
            }
            AppState::Feedback => {
                let elapsed = self
                    .entered_at
                    .map_or(Duration::MAX, |t| now.saturating_duration_since(t));
                if elapsed >= self.config.feedback {
                    self.transition_to(AppState::Idle, now);
                    self.show_banner();
                }
            }
            AppState::Error => {
                if self.tracker.poll(&mut self.button, now) == ButtonEvent::ShortPress {
                    log::info!("Error acknowledged, restarting bring-up");
                    self.last_error = None;
                    self.transition_to(AppState::InitDisplay, now);
                }
            }
        }
    }

    fn init_storage(&mut self) {
        match self.store.mount() {
            Ok(()) => {
                self.storage_available = true;
                self.next_index = next_capture_index(self.settings.as_ref());
            }
            Err(e) => {
                log::warn!("Storage unavailable, captures will be discarded: {}", e);
                self.storage_available = false;
            }
        }
    }

    fn init_camera(&mut self, now: Instant) {
        let outcome = bring_up_sensor(
            &mut self.sensor,
            &SENSOR_BRINGUP,
            &self.config.sensor,
            self.pool.has_external(),
            self.config.prefer_rgb,
        );
        match outcome {
            Ok(outcome) => {
                self.camera = Some(outcome);
                if self.pipeline.is_none() {
                    let mut settings = self.config.pipeline.clone();
                    settings.block_filter =
                        self.config.filter_enabled.then_some(self.config.filter_block);
                    self.pipeline = Some(
                        CapturePipeline::new(self.pool.as_ref(), settings, self.tables.clone())
                            .with_cancel_flag(Arc::clone(&self.stop)),
                    );
                }
                self.apply_mode_presets();
                self.transition_to(AppState::Idle, now);
                self.show_banner();
            }
            Err(e) => self.fail(format!("Camera init failed: {}", e), now),
        }
    }

    fn apply_mode_presets(&mut self) {
        let result = if self.mode == CaptureMode::Night {
            self.tuner.apply_night_mode(&mut self.sensor)
        } else {
            let applied = self.tuner.apply_standard_mode(&mut self.sensor);
            if applied.is_ok() && self.config.auto_tune {
                self.tuner.start_auto_tune(&mut self.sensor)
            } else {
                applied
            }
        };
        if let Err(e) = result {
            log::warn!("Exposure preset for {} mode failed: {}", self.mode, e);
        }
    }

    /// Switch capture mode (the external mode manager's entry point).
    pub fn set_mode(&mut self, mode: CaptureMode) {
        if mode == self.mode {
            return;
        }
        log::info!("Mode {} -> {}", self.mode, mode);
        self.mode = mode;
        if self.camera.is_some() {
            self.apply_mode_presets();
        }
        if self.state == AppState::Idle {
            self.show_banner();
        }
    }

    /// Use a different palette for stylized captures and previews.
    pub fn set_palette(&mut self, palette: Palette) {
        self.tables = ToneTables::new(
            self.config.tone_gamma,
            &palette,
            self.config.night_gamma,
            self.config.night_contrast,
        );
        if let Some(pipeline) = self.pipeline.as_mut() {
            pipeline.set_tables(self.tables.clone());
        }
        log::info!("Palette set to {}", palette);
        self.palette = palette;
    }

    /// Persist `tones` into the custom slot and activate it.
    pub fn set_custom_palette(&mut self, tones: Vec<u8>) -> Result<(), SettingsError> {
        let palette = store_custom_palette(self.settings.as_mut(), tones)?;
        self.set_palette(palette);
        Ok(())
    }

    fn idle(&mut self, now: Instant) {
        if self.tuner.is_tuning() {
            self.tuner.tick(&mut self.sensor, now);
        }
        match self.tracker.poll(&mut self.button, now) {
            ButtonEvent::ShortPress => self.transition_to(AppState::Capture, now),
            ButtonEvent::Hold => self.run_preview(),
            _ => {}
        }
    }

    fn run_preview(&mut self) {
        let Some(config) = self.sensor.config().cloned() else {
            return;
        };
        let session = PreviewSession::start(
            self.pool.as_ref(),
            config.width,
            config.height,
            self.config.preview.clone(),
        );
        let mut session = match session {
            Ok(session) => session,
            Err(e) => {
                self.show_status(format!("Preview unavailable: {}", e));
                return;
            }
        };
        if let Err(e) = self.display.clear() {
            log::warn!("Could not clear display for preview: {}", e);
        }
        let result = session.run(
            &mut self.sensor,
            &mut self.display,
            &mut self.button,
            &mut self.tracker,
            &self.tables,
            &self.stop,
        );
        match result {
            Ok(PreviewExit::ButtonPressed) | Ok(PreviewExit::Stopped) => {}
            Err(e) => log::warn!("Live preview aborted: {}", e),
        }
        self.show_banner();
    }

    fn capture(&mut self, now: Instant) {
        let Some(pipeline) = self.pipeline.as_mut() else {
            self.show_status("Capture failed: camera not ready".to_string());
            self.transition_to(AppState::Feedback, now);
            return;
        };
        pipeline.set_standard_exposure(self.tuner.standard_exposure());
        let result = pipeline
            .capture(self.mode, &mut self.sensor)
            .map(ProcessedImage::into_parts);
        // The pipeline restores the standard preset after a night frame
        if self.mode == CaptureMode::Night {
            self.apply_mode_presets();
        }
        match result {
            Ok((info, frame)) => {
                self.pending = Some(PendingCapture { info, frame });
                self.transition_to(AppState::Filter, now);
            }
            Err(e) => {
                let message = match e {
                    CaptureError::Camera(_) => "Capture failed: no frame".to_string(),
                    CaptureError::Processing(_) => "Capture failed: processing error".to_string(),
                    CaptureError::Memory(_) => "Capture failed: out of memory".to_string(),
                    CaptureError::Cancelled => "Capture cancelled".to_string(),
                };
                log::warn!("{}: {}", message, e);
                self.show_status(message);
                self.transition_to(AppState::Feedback, now);
            }
        }
    }

    /// The pipeline filters packed RGB frames before stylizing them; this
    /// step reports what happened to the pending capture.
    fn filter(&self) {
        let Some(pending) = &self.pending else {
            return;
        };
        if pending.info.filtered {
            log::debug!(
                "Block filter applied ({} px, {} frame)",
                self.config.filter_block,
                pending.info.source_format
            );
        } else if self.config.filter_enabled {
            log::debug!(
                "Block filter skipped for {} frame",
                pending.info.source_format
            );
        }
    }

    fn save(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        let PendingCapture { mut info, frame } = pending;

        // A card pulled after boot shows up as an unmounted store
        let message = if !self.storage_available || !self.store.is_mounted() {
            "No storage: image discarded".to_string()
        } else {
            let started = Instant::now();
            let data = match (&frame, self.pipeline.as_ref()) {
                (Some(frame), _) => Some(frame.data()),
                (None, Some(pipeline)) => pipeline.last_output(),
                (None, None) => None,
            };
            match data.map(|data| encode_for_storage(&info, data)) {
                Some(Ok(encoded)) => self.write_capture(&mut info, encoded, started),
                Some(Err(e)) => {
                    log::warn!("Encoding capture failed: {}", e);
                    "Save failed: encode error".to_string()
                }
                None => "Save failed: image data lost".to_string(),
            }
        };

        if let Some(frame) = frame {
            self.sensor.release_frame(frame);
        }
        self.telemetry = Some(info.telemetry);
        self.show_status(message);
    }

    fn write_capture(&mut self, info: &mut ImageInfo, encoded: EncodedImage, started: Instant) -> String {
        let name = capture_file_name(&self.config.file_prefix, self.next_index, encoded.extension);
        if let Err(e) = self.store.save(&name, &encoded.bytes) {
            log::warn!("Saving {} failed: {}", name, e);
            return "Save failed: write error".to_string();
        }

        info.telemetry.save_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "Saved {} ({} bytes): capture {} ms, process {} ms, save {} ms",
            name,
            encoded.bytes.len(),
            info.telemetry.capture_ms,
            info.telemetry.process_ms,
            info.telemetry.save_ms
        );
        self.next_index = self.next_index.saturating_add(1);
        if let Err(e) = set_next_capture_index(self.settings.as_mut(), self.next_index) {
            log::warn!("Could not persist capture counter: {}", e);
        }
        self.last_saved = Some(name.clone());
        format!("Saved {}", name)
    }

    /// Tick until `stop` is raised, sleeping `interval` between ticks.
    ///
    /// `before_tick` runs ahead of every tick, for inputs the controller
    /// does not poll itself (mode keys, remote commands).
    pub fn run<H>(&mut self, interval: Duration, mut before_tick: H)
    where
        H: FnMut(&mut Self),
    {
        while !self.stop.load(Ordering::SeqCst) {
            before_tick(self);
            self.tick(Instant::now());
            std::thread::sleep(interval);
        }
        if let Some(PendingCapture {
            frame: Some(frame), ..
        }) = self.pending.take()
        {
            self.sensor.release_frame(frame);
        }
        log::info!("Control loop stopped in state {}", self.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayError;
    use crate::memory::HostMemory;
    use crate::sensor::{PixelFormat, Scene, SimulatedSensor};
    use crate::storage::{MemorySettings, StorageError};

    struct Level(bool);

    impl Button for Level {
        fn is_pressed(&mut self) -> bool {
            self.0
        }
    }

    #[derive(Default)]
    struct TextDisplay {
        fail_init: bool,
        inits: usize,
        lines: Vec<String>,
    }

    impl DisplayDriver for TextDisplay {
        fn init(&mut self) -> Result<(), DisplayError> {
            self.inits += 1;
            if self.fail_init {
                return Err(DisplayError::InitFailed("no panel".to_string()));
            }
            Ok(())
        }

        fn clear(&mut self) -> Result<(), DisplayError> {
            self.lines.clear();
            Ok(())
        }

        fn print_text(&mut self, _line: u16, text: &str) -> Result<(), DisplayError> {
            self.lines.push(text.to_string());
            Ok(())
        }

        fn draw_grayscale(&mut self, _: &[u8], _: u32, _: u32) -> Result<(), DisplayError> {
            Ok(())
        }

        fn draw_bitmap_1bpp(&mut self, _: &[u8], _: u32, _: u32) -> Result<(), DisplayError> {
            Ok(())
        }

        fn flush(&mut self) -> Result<(), DisplayError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct MemStore {
        broken: bool,
        mounted: bool,
        files: Vec<(String, Vec<u8>)>,
    }

    impl FileStore for MemStore {
        fn mount(&mut self) -> Result<(), StorageError> {
            if self.broken {
                return Err(StorageError::NotMounted);
            }
            self.mounted = true;
            Ok(())
        }

        fn is_mounted(&self) -> bool {
            self.mounted
        }

        fn save(&mut self, path: &str, bytes: &[u8]) -> Result<(), StorageError> {
            self.files.push((path.to_string(), bytes.to_vec()));
            Ok(())
        }
    }

    type TestController = AppController<SimulatedSensor, TextDisplay, MemStore, Level>;

    fn controller(sensor: SimulatedSensor, display: TextDisplay, store: MemStore) -> TestController {
        let config = ControllerConfig {
            auto_tune: false,
            ..ControllerConfig::default()
        };
        AppController::new(
            sensor,
            display,
            store,
            Level(false),
            Box::new(HostMemory::new(Some(1 << 20))),
            Box::new(MemorySettings::new()),
            config,
        )
    }

    fn boot(ctrl: &mut TestController, now: Instant) {
        for _ in 0..4 {
            ctrl.tick(now);
        }
    }

    /// Press and release, then tick through capture, filter and save.
    fn shoot(ctrl: &mut TestController, now: Instant) {
        ctrl.button_mut().0 = true;
        ctrl.tick(now);
        ctrl.button_mut().0 = false;
        ctrl.tick(now + Duration::from_millis(100));
        assert_eq!(ctrl.state(), AppState::Capture);
        for _ in 0..3 {
            ctrl.tick(now + Duration::from_millis(100));
        }
    }

    #[test]
    fn test_boot_reaches_idle_with_rgb_camera() {
        let t0 = Instant::now();
        let mut ctrl = controller(
            SimulatedSensor::new(Scene::Uniform(128)),
            TextDisplay::default(),
            MemStore::default(),
        );
        boot(&mut ctrl, t0);

        assert_eq!(ctrl.state(), AppState::Idle);
        assert_eq!(ctrl.camera().map(|c| c.format), Some(PixelFormat::Rgb565));
        assert!(!ctrl.fallback_to_jpeg());
        assert!(ctrl.storage_available());
        assert!(ctrl.pipeline_ready());
        assert!(ctrl.display().lines.iter().any(|l| l == "Camera: RGB"));
    }

    #[test]
    fn test_rgb_failure_falls_back_to_jpeg() {
        let t0 = Instant::now();
        let sensor = SimulatedSensor::new(Scene::Uniform(128)).fail_init_for(PixelFormat::Rgb565);
        let mut ctrl = controller(sensor, TextDisplay::default(), MemStore::default());
        boot(&mut ctrl, t0);

        assert_eq!(ctrl.state(), AppState::Idle);
        assert_eq!(ctrl.camera().map(|c| c.format), Some(PixelFormat::Jpeg));
        assert!(ctrl.fallback_to_jpeg());
    }

    #[test]
    fn test_short_press_saves_and_returns_to_idle() {
        let t0 = Instant::now();
        let sensor = SimulatedSensor::new(Scene::Uniform(128));
        let stats = sensor.stats();
        let mut ctrl = controller(sensor, TextDisplay::default(), MemStore::default());
        boot(&mut ctrl, t0);
        ctrl.set_mode(CaptureMode::Stylized);

        shoot(&mut ctrl, t0);
        assert_eq!(ctrl.state(), AppState::Feedback);
        assert_eq!(ctrl.last_saved(), Some("IMG_00001.bmp"));
        assert_eq!(ctrl.store().files.len(), 1);
        assert_eq!(ctrl.next_index(), 2);
        assert_eq!(stats.outstanding(), 0);
        assert!(ctrl.last_telemetry().is_some());

        // Feedback holds for 1.5 s without blocking.
        ctrl.tick(t0 + Duration::from_millis(500));
        assert_eq!(ctrl.state(), AppState::Feedback);
        ctrl.tick(t0 + Duration::from_millis(1700));
        assert_eq!(ctrl.state(), AppState::Idle);
    }

    #[test]
    fn test_normal_capture_releases_frame_after_save() {
        let t0 = Instant::now();
        let sensor = SimulatedSensor::new(Scene::Uniform(200));
        let stats = sensor.stats();
        let mut ctrl = controller(sensor, TextDisplay::default(), MemStore::default());
        boot(&mut ctrl, t0);
        assert_eq!(ctrl.mode(), CaptureMode::Normal);

        shoot(&mut ctrl, t0);
        assert_eq!(ctrl.store().files.len(), 1);
        assert!(ctrl.store().files[0].1.starts_with(b"BM"));
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn test_missing_storage_is_degraded_not_fatal() {
        let t0 = Instant::now();
        let sensor = SimulatedSensor::new(Scene::Uniform(128));
        let stats = sensor.stats();
        let store = MemStore {
            broken: true,
            ..MemStore::default()
        };
        let mut ctrl = controller(sensor, TextDisplay::default(), store);
        boot(&mut ctrl, t0);
        assert_eq!(ctrl.state(), AppState::Idle);
        assert!(!ctrl.storage_available());

        shoot(&mut ctrl, t0);
        assert_eq!(ctrl.state(), AppState::Feedback);
        assert_eq!(ctrl.status(), "No storage: image discarded");
        assert!(ctrl.store().files.is_empty());
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn test_unmounted_store_discards_capture() {
        let t0 = Instant::now();
        let sensor = SimulatedSensor::new(Scene::Uniform(128));
        let stats = sensor.stats();
        let mut ctrl = controller(sensor, TextDisplay::default(), MemStore::default());
        boot(&mut ctrl, t0);
        assert!(ctrl.storage_available());

        ctrl.store_mut().mounted = false;
        shoot(&mut ctrl, t0);
        assert_eq!(ctrl.status(), "No storage: image discarded");
        assert!(ctrl.store().files.is_empty());
        assert_eq!(ctrl.next_index(), 1);
        assert_eq!(stats.outstanding(), 0);
    }

    #[test]
    fn test_run_calls_hook_before_each_tick() {
        let stop = Arc::new(AtomicBool::new(false));
        let mut ctrl = controller(
            SimulatedSensor::new(Scene::Uniform(128)),
            TextDisplay::default(),
            MemStore::default(),
        )
        .with_stop_flag(Arc::clone(&stop));

        let mut calls = 0;
        ctrl.run(Duration::ZERO, |ctrl| {
            calls += 1;
            if calls == 2 {
                ctrl.set_mode(CaptureMode::Night);
            }
            if calls == 6 {
                stop.store(true, Ordering::SeqCst);
            }
        });

        assert_eq!(calls, 6);
        assert_eq!(ctrl.state(), AppState::Idle);
        assert_eq!(ctrl.mode(), CaptureMode::Night);
        assert!(ctrl.sensor().night_preset());
    }

    #[test]
    fn test_night_capture_keeps_night_preset_and_tuned_level() {
        let t0 = Instant::now();
        let mut ctrl = controller(
            SimulatedSensor::new(Scene::Uniform(40)),
            TextDisplay::default(),
            MemStore::default(),
        );
        boot(&mut ctrl, t0);
        ctrl.set_mode(CaptureMode::Night);

        shoot(&mut ctrl, t0);
        assert_eq!(ctrl.last_saved(), Some("IMG_00001.bmp"));
        assert!(ctrl.sensor().night_preset());
        assert_eq!(ctrl.sensor().exposure_level(), ctrl.tuner().exposure_level());
    }

    #[test]
    fn test_failed_acquire_reports_and_recovers() {
        let t0 = Instant::now();
        let mut sensor = SimulatedSensor::new(Scene::Uniform(128));
        sensor.fail_next_acquires(1);
        let mut ctrl = controller(sensor, TextDisplay::default(), MemStore::default());
        boot(&mut ctrl, t0);

        ctrl.button_mut().0 = true;
        ctrl.tick(t0);
        ctrl.button_mut().0 = false;
        ctrl.tick(t0);
        ctrl.tick(t0);
        assert_eq!(ctrl.state(), AppState::Feedback);
        assert_eq!(ctrl.status(), "Capture failed: no frame");

        ctrl.tick(t0 + Duration::from_secs(2));
        assert_eq!(ctrl.state(), AppState::Idle);
    }

    #[test]
    fn test_display_failure_waits_for_press_to_retry() {
        let t0 = Instant::now();
        let display = TextDisplay {
            fail_init: true,
            ..TextDisplay::default()
        };
        let mut ctrl = controller(
            SimulatedSensor::new(Scene::Uniform(128)),
            display,
            MemStore::default(),
        );
        ctrl.tick(t0);
        ctrl.tick(t0);
        assert_eq!(ctrl.state(), AppState::Error);
        assert!(ctrl.last_error().is_some());

        ctrl.tick(t0);
        assert_eq!(ctrl.state(), AppState::Error);

        ctrl.button_mut().0 = true;
        ctrl.tick(t0);
        ctrl.button_mut().0 = false;
        ctrl.tick(t0);
        assert_eq!(ctrl.state(), AppState::InitDisplay);
        assert_eq!(ctrl.display().inits, 1);
    }

    #[test]
    fn test_night_mode_applies_preset() {
        let t0 = Instant::now();
        let mut ctrl = controller(
            SimulatedSensor::new(Scene::Uniform(40)),
            TextDisplay::default(),
            MemStore::default(),
        );
        boot(&mut ctrl, t0);
        ctrl.set_mode(CaptureMode::Night);
        assert!(ctrl.sensor().night_preset());
        assert!(!ctrl.tuner().is_tuning());

        ctrl.set_mode(CaptureMode::Normal);
        assert!(!ctrl.sensor().night_preset());
    }

    #[test]
    fn test_custom_palette_persists() {
        let mut ctrl = controller(
            SimulatedSensor::new(Scene::Uniform(128)),
            TextDisplay::default(),
            MemStore::default(),
        );
        ctrl.set_custom_palette(vec![0, 255]).unwrap();
        assert!(ctrl.palette().is_custom());
        assert!(ctrl.set_custom_palette(vec![1]).is_err());
    }
}
