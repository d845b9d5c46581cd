//! Subcommand handlers.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::imageops::FilterType;

use super::args::{Command, ConfigAction, SceneSpec};
use super::enums::{Algorithm, Mode};
use crate::app::{bring_up_sensor, AppController, SENSOR_BRINGUP};
use crate::config::{default_path as get_config_path, Config, ConfigError};
use crate::display::{DisplayDriver, DisplayError, TerminalDisplay};
use crate::exposure::{AutoTuner, TickOutcome};
use crate::input::{ButtonHandle, ButtonTracker};
use crate::memory::MemoryPool;
use crate::pipeline::{CaptureError, CaptureMode, CapturePipeline};
use crate::preview::{PreviewError, PreviewSession};
use crate::sensor::{PixelFormat, Scene, SensorDriver, SensorError, SimulatedSensor};
use crate::storage::settings::{load_palette, next_capture_index, set_next_capture_index};
use crate::storage::{
    capture_file_name, encode_for_storage, DirStore, FileStore, MemorySettings, SettingsError,
    SettingsStore, StorageError, TomlSettings,
};
use crate::tone::{self, ToneError, ToneTables};

/// Widest braille frame drawn on the terminal.
const TERMINAL_COLS: u16 = 80;

/// Errors surfaced by subcommands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("sensor error: {0}")]
    Sensor(#[from] SensorError),

    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("preview failed: {0}")]
    Preview(#[from] PreviewError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Display(#[from] DisplayError),

    #[error(transparent)]
    Tone(#[from] ToneError),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("failed to install Ctrl+C handler: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("{0}")]
    Failed(String),
}

/// Set up the Ctrl+C handler.
///
/// This should be called once at program startup.
pub fn setup_ctrlc_handler(stop: Arc<AtomicBool>) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}

/// Dispatch a parsed subcommand.
///
/// # Arguments
/// * `command` - The subcommand to run
/// * `config_path` - `--config` override, if any
/// * `stop` - Raised by Ctrl+C; long-running commands poll it
pub fn dispatch(
    command: Command,
    config_path: Option<&Path>,
    stop: Arc<AtomicBool>,
) -> Result<(), CommandError> {
    if let Command::Config { action } = command {
        return handle_config_action(action, config_path);
    }
    if matches!(command, Command::SelfTest) {
        return self_test();
    }

    let config = Config::load(config_path)?;
    match command {
        Command::Run {
            scene,
            mode,
            output,
            tick_ms,
        } => run_camera(config, &scene, mode, output, tick_ms, stop),
        Command::Capture {
            scene,
            mode,
            algorithm,
            resolution,
            count,
            output,
        } => {
            let mut config = config;
            if let Some(algorithm) = algorithm {
                config.tone.algorithm = algorithm.into();
            }
            if let Some((w, h)) = resolution {
                config.camera.width = w;
                config.camera.height = h;
                config.camera.max_width = config.camera.max_width.max(w);
                config.camera.max_height = config.camera.max_height.max(h);
            }
            if let Some(output) = output {
                config.storage.root = output;
            }
            capture_images(&config, &scene, mode.into(), count, stop)
        }
        Command::Preview {
            scene,
            algorithm,
            seconds,
        } => {
            let mut config = config;
            if let Some(algorithm) = algorithm {
                config.preview.algorithm = algorithm.into();
            }
            if let Some(seconds) = seconds {
                stop_after(Arc::clone(&stop), Duration::from_secs(seconds));
            }
            live_preview(&config, &scene, stop)
        }
        Command::Tune {
            gray,
            target,
            tolerance,
        } => {
            let mut config = config;
            if let Some(target) = target {
                config.exposure.target = target;
            }
            if let Some(tolerance) = tolerance {
                config.exposure.tolerance = tolerance;
            }
            tune_exposure(&config, gray)
        }
        Command::Dither {
            input,
            output,
            algorithm,
            gamma,
            palette,
            equalize,
            night,
            resize,
        } => {
            let options = DitherOptions {
                algorithm,
                gamma,
                palette: palette.unwrap_or_else(|| config.tone.palette.clone()),
                equalize,
                night,
                resize,
            };
            dither_file(&config, &input, &output, &options)
        }
        Command::SelfTest | Command::Config { .. } => Ok(()),
    }
}

fn stop_after(stop: Arc<AtomicBool>, after: Duration) {
    std::thread::spawn(move || {
        std::thread::sleep(after);
        stop.store(true, Ordering::SeqCst);
    });
}

fn build_sensor(scene: &SceneSpec, config: &Config) -> Result<SimulatedSensor, CommandError> {
    let scene = match scene {
        SceneSpec::Gray(level) => Scene::Uniform(*level),
        SceneSpec::Gradient => Scene::Gradient,
        SceneSpec::Image(path) => Scene::Image(image::open(path)?.to_rgb8()),
    };
    let sensor = SimulatedSensor::new(scene);
    Ok(if config.camera.fail_rgb_init {
        sensor.fail_init_for(PixelFormat::Rgb565)
    } else {
        sensor
    })
}

fn open_settings(config: &Config) -> Box<dyn SettingsStore> {
    let path = config.storage.settings_path();
    match TomlSettings::open(&path) {
        Ok(settings) => Box::new(settings),
        Err(e) => {
            log::warn!("Settings unavailable, using defaults: {}", e);
            Box::new(MemorySettings::new())
        }
    }
}

fn tone_tables(config: &Config, settings: &dyn SettingsStore) -> ToneTables {
    let palette = load_palette(settings, &config.tone.palette);
    ToneTables::new(
        config.tone.gamma,
        &palette,
        config.tone.night_gamma,
        config.tone.night_contrast,
    )
}

/// Keys read from stdin while the controller runs.
enum Key {
    CycleMode,
}

/// Read stdin lines on a background thread.
///
/// Presses go straight to the button so they also reach the live preview,
/// which blocks the control loop.
fn spawn_keyboard(button: ButtonHandle, hold: Duration, stop: Arc<AtomicBool>) -> mpsc::Receiver<Key> {
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match line.trim() {
                "" => button.press_for(Duration::from_millis(120)),
                "h" => button.press_for(hold + Duration::from_millis(300)),
                "m" => {
                    if tx.send(Key::CycleMode).is_err() {
                        break;
                    }
                }
                "q" => {
                    stop.store(true, Ordering::SeqCst);
                    break;
                }
                other => eprintln!("Unknown key '{}': Enter, h, m or q", other),
            }
        }
    });
    rx
}

fn run_camera(
    mut config: Config,
    scene: &SceneSpec,
    mode: Option<Mode>,
    output: Option<PathBuf>,
    tick_ms: u64,
    stop: Arc<AtomicBool>,
) -> Result<(), CommandError> {
    if let Some(mode) = mode {
        config.camera.mode = mode.into();
    }
    if let Some(output) = output {
        config.storage.root = output;
    }

    let sensor = build_sensor(scene, &config)?;
    let controller_config = config.controller_config();
    let hold = controller_config.hold;
    let button = ButtonHandle::new();
    let keys = spawn_keyboard(button.clone(), hold, Arc::clone(&stop));

    let mut controller = AppController::new(
        sensor,
        TerminalDisplay::stdout(TERMINAL_COLS),
        DirStore::new(&config.storage.root),
        button,
        Box::new(config.memory()),
        open_settings(&config),
        controller_config,
    )
    .with_stop_flag(Arc::clone(&stop));

    let interval = Duration::from_millis(tick_ms.max(1));
    log::info!("Controller running, tick {} ms", interval.as_millis());
    controller.run(interval, |controller| {
        for key in keys.try_iter() {
            match key {
                Key::CycleMode => {
                    let next = controller.mode().next();
                    controller.set_mode(next);
                }
            }
        }
    });

    if let Some(telemetry) = controller.last_telemetry() {
        println!(
            "Last capture: capture {} ms, process {} ms, save {} ms",
            telemetry.capture_ms, telemetry.process_ms, telemetry.save_ms
        );
    }
    println!("Stopped in state {}", controller.state());
    Ok(())
}

fn capture_images(
    config: &Config,
    scene: &SceneSpec,
    mode: CaptureMode,
    count: u32,
    stop: Arc<AtomicBool>,
) -> Result<(), CommandError> {
    let mut sensor = build_sensor(scene, config)?;
    let pool = config.memory();
    let outcome = bring_up_sensor(
        &mut sensor,
        &SENSOR_BRINGUP,
        &config.sensor_config(),
        pool.has_external(),
        config.camera.prefer_rgb,
    )?;
    println!("Camera: {}", outcome.label());

    let mut settings = open_settings(config);
    let mut pipeline =
        CapturePipeline::new(&pool, config.pipeline_settings(), tone_tables(config, settings.as_ref()))
            .with_cancel_flag(stop);
    let mut store = DirStore::new(&config.storage.root);
    store.mount()?;

    let mut index = next_capture_index(settings.as_ref());
    for _ in 0..count {
        let image = pipeline.capture(mode, &mut sensor)?;
        let encoded = encode_for_storage(image.info(), image.data());
        let info = image.release(&mut sensor);
        let encoded = encoded?;

        let name = capture_file_name(&config.storage.prefix, index, encoded.extension);
        let started = Instant::now();
        store.save(&name, &encoded.bytes)?;
        index += 1;
        set_next_capture_index(settings.as_mut(), index)?;

        println!(
            "Saved {} ({}x{} {}, {} bytes): capture {} ms, process {} ms, save {} ms",
            store.root().join(&name).display(),
            info.width,
            info.height,
            info.mode,
            encoded.bytes.len(),
            info.telemetry.capture_ms,
            info.telemetry.process_ms,
            started.elapsed().as_millis()
        );
    }
    Ok(())
}

fn live_preview(config: &Config, scene: &SceneSpec, stop: Arc<AtomicBool>) -> Result<(), CommandError> {
    let mut sensor = build_sensor(scene, config)?;
    let pool = config.memory();
    bring_up_sensor(
        &mut sensor,
        &SENSOR_BRINGUP,
        &config.sensor_config(),
        pool.has_external(),
        config.camera.prefer_rgb,
    )?;
    let tables = tone_tables(config, open_settings(config).as_ref());

    let mut display = TerminalDisplay::stdout(TERMINAL_COLS);
    display.init()?;
    let mut session = PreviewSession::start(
        &pool,
        config.camera.width,
        config.camera.height,
        config.preview_settings(),
    )?;
    let mut button = ButtonHandle::new();
    let mut tracker = ButtonTracker::default();
    let exit = session.run(
        &mut sensor,
        &mut display,
        &mut button,
        &mut tracker,
        &tables,
        &stop,
    )?;

    let stats = session.stats();
    println!(
        "Preview ended ({:?}): {} frames shown, {} produced, {} dropped",
        exit,
        session.presented(),
        stats.committed,
        stats.overwritten
    );
    Ok(())
}

fn tune_exposure(config: &Config, gray: u8) -> Result<(), CommandError> {
    let mut sensor = SimulatedSensor::new(Scene::Uniform(gray));
    sensor.init(&config.sensor_config())?;

    let tune = config.tune_config();
    let interval = tune.sample_interval;
    let mut tuner = AutoTuner::new(tune);
    tuner.start_auto_tune(&mut sensor)?;

    // Simulated clock; the sensor responds instantly.
    let mut now = Instant::now();
    loop {
        match tuner.tick(&mut sensor, now) {
            TickOutcome::Adjusted { brightness, level } => {
                println!("brightness {:3} -> exposure {:+}", brightness, level);
            }
            TickOutcome::Complete(reason) => {
                println!(
                    "{:?} after {} iteration(s): brightness {}, exposure {:+}",
                    reason,
                    tuner.iterations(),
                    tuner
                        .last_brightness()
                        .map_or_else(|| "n/a".to_string(), |b| b.to_string()),
                    tuner.exposure_level()
                );
                return Ok(());
            }
            TickOutcome::Inactive => {
                return Err(CommandError::Failed("auto-tune did not start".to_string()))
            }
            TickOutcome::Pending => {}
        }
        now += interval;
    }
}

struct DitherOptions {
    algorithm: Algorithm,
    gamma: f32,
    palette: String,
    equalize: bool,
    night: bool,
    resize: Option<(u32, u32)>,
}

fn dither_file(
    config: &Config,
    input: &Path,
    output: &Path,
    options: &DitherOptions,
) -> Result<(), CommandError> {
    let mut rgb = image::open(input)?.to_rgb8();
    if let Some((w, h)) = options.resize {
        rgb = image::imageops::resize(&rgb, w, h, FilterType::Triangle);
    }
    let (w, h) = rgb.dimensions();
    let (width, height) = (w as usize, h as usize);

    let mut gray = tone::to_grayscale(rgb.as_raw(), width, height)?;
    if options.equalize {
        tone::histogram_equalize(&mut gray, width, height)?;
    }

    let settings = open_settings(config);
    let palette = load_palette(settings.as_ref(), &options.palette);
    let tables = ToneTables::new(
        options.gamma,
        &palette,
        config.tone.night_gamma,
        config.tone.night_contrast,
    );
    if options.night {
        tone::night_vision_with(&mut gray, width, height, &tables.night)?;
    }

    let mut bitmap = vec![0u8; tone::packed_len(width, height)];
    tone::dither(
        options.algorithm.into(),
        &gray,
        width,
        height,
        &tables,
        config.tone.night_threshold,
        &mut bitmap,
    )?;
    let mut pixels = vec![0u8; width * height];
    tone::expand_bitmap(&bitmap, width, height, &mut pixels)?;

    let out = image::GrayImage::from_raw(w, h, pixels)
        .ok_or_else(|| CommandError::Failed("dithered buffer has the wrong size".to_string()))?;
    out.save(output)?;
    println!(
        "Wrote {} ({}x{}, {})",
        output.display(),
        w,
        h,
        crate::tone::DitherAlgorithm::from(options.algorithm).name()
    );
    Ok(())
}

/// One named self-test check.
struct Check {
    name: &'static str,
    passed: bool,
    detail: String,
}

fn self_test_checks() -> Result<Vec<Check>, ToneError> {
    let mut checks = Vec::new();

    let oracle = [0, 32, 64, 96, 128, 160, 192, 224, 255, 128, 128, 128, 0, 255, 0, 255];
    let mut packed = [0u8; 2];
    tone::threshold_dither(&oracle, 4, 4, 128, &mut packed)?;
    checks.push(Check {
        name: "threshold oracle",
        passed: packed == [0x0F, 0xF5],
        detail: format!("{:#04X} {:#04X}", packed[0], packed[1]),
    });

    let tables = ToneTables::default();
    let (w, h) = (160usize, 120usize);
    let gray = vec![128u8; w * h];
    let mut bitmap = vec![0u8; tone::packed_len(w, h)];
    tone::ordered_dither_8x8(&gray, w, h, &tables, &mut bitmap)?;
    let lit: u32 = bitmap.iter().map(|b| b.count_ones()).sum();
    checks.push(Check {
        name: "mid-gray bayer 160x120",
        passed: lit == 12_600,
        detail: format!("{} lit pixels", lit),
    });

    let mut repeat = vec![0u8; bitmap.len()];
    tone::ordered_dither_8x8(&gray, w, h, &tables, &mut repeat)?;
    checks.push(Check {
        name: "determinism",
        passed: repeat == bitmap,
        detail: String::new(),
    });

    let ends = (tables.tone.level(0), tables.tone.level(255));
    checks.push(Check {
        name: "tone lut boundary",
        passed: ends == (0, 3),
        detail: format!("0 -> {}, 255 -> {}", ends.0, ends.1),
    });

    let mut ramp: Vec<u8> = (0..=255u8).flat_map(|v| [v, v / 2]).collect();
    let before = ramp.clone();
    tone::histogram_equalize(&mut ramp, 32, 16)?;
    let monotonic = before.iter().zip(&ramp).all(|(&a, &ea)| {
        before
            .iter()
            .zip(&ramp)
            .all(|(&b, &eb)| a >= b || ea <= eb)
    });
    checks.push(Check {
        name: "equalization monotonic",
        passed: monotonic,
        detail: String::new(),
    });

    Ok(checks)
}

/// Run the tone engine checks and print a report.
pub fn self_test() -> Result<(), CommandError> {
    let checks = self_test_checks()?;
    let mut failed = 0;
    for check in &checks {
        let status = if check.passed { "PASS" } else { "FAIL" };
        if check.detail.is_empty() {
            println!("[{}] {}", status, check.name);
        } else {
            println!("[{}] {} ({})", status, check.name, check.detail);
        }
        if !check.passed {
            failed += 1;
        }
    }
    if failed > 0 {
        return Err(CommandError::Failed(format!(
            "{} of {} self-test checks failed",
            failed,
            checks.len()
        )));
    }
    println!("All {} checks passed.", checks.len());
    Ok(())
}

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, path: Option<&Path>) -> Result<(), CommandError> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(get_config_path);
    match action {
        ConfigAction::Show => {
            let config = Config::load(Some(&config_path))?;
            if config_path.exists() {
                println!("# Config file: {} (exists)", config_path.display());
            } else {
                println!("# Config file: {} (not found, showing defaults)", config_path.display());
            }
            println!();
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(CommandError::Failed(format!(
                    "Config file already exists: {}. Use 'retrocam config show' to view current settings.",
                    config_path.display()
                )));
            }
            Config::default().save(&config_path)?;
            println!("Created config file: {}", config_path.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_self_test_checks_pass() {
        let checks = self_test_checks().unwrap();
        for check in &checks {
            assert!(check.passed, "{} failed: {}", check.name, check.detail);
        }
    }

    #[test]
    fn test_config_init_then_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("retrocam").join("config.toml");

        handle_config_action(ConfigAction::Init, Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(Config::load(Some(&path)).unwrap(), Config::default());

        let err = handle_config_action(ConfigAction::Init, Some(&path)).unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_capture_images_writes_numbered_files() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.root = dir.path().to_path_buf();

        capture_images(
            &config,
            &SceneSpec::Gray(128),
            CaptureMode::Stylized,
            2,
            Arc::new(AtomicBool::new(false)),
        )
        .unwrap();

        assert!(dir.path().join("IMG_00001.bmp").exists());
        assert!(dir.path().join("IMG_00002.bmp").exists());
        let settings = TomlSettings::open(dir.path().join("settings.toml")).unwrap();
        assert_eq!(next_capture_index(&settings), 3);
    }

    #[test]
    fn test_dither_file_writes_binary_png() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        image::GrayImage::from_fn(16, 8, |x, _| image::Luma([(x * 16) as u8]))
            .save(&input)
            .unwrap();

        let options = DitherOptions {
            algorithm: Algorithm::FloydSteinberg,
            gamma: 0.9,
            palette: "classic".to_string(),
            equalize: false,
            night: false,
            resize: None,
        };
        dither_file(&Config::default(), &input, &output, &options).unwrap();

        let out = image::open(&output).unwrap().to_luma8();
        assert_eq!(out.dimensions(), (16, 8));
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
    }

    #[test]
    fn test_tune_exposure_completes() {
        tune_exposure(&Config::default(), 60).unwrap();
    }
}
