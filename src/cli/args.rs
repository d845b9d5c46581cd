//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::enums::{Algorithm, Mode};
use crate::tone::{MAX_TONE_GAMMA, MIN_TONE_GAMMA};

/// Retro camera core running against a simulated sensor
#[derive(Parser, Debug)]
#[command(name = "retrocam")]
#[command(version, about = "Retro camera imaging core with a simulated sensor", long_about = None)]
#[command(after_help = "EXAMPLES:
    retrocam run --mode stylized
    retrocam capture --scene gradient --mode night --count 3
    retrocam dither photo.jpg out.png --algorithm floyd-steinberg
    retrocam self-test")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
}

/// What the simulated sensor looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneSpec {
    Gray(u8),
    Gradient,
    Image(PathBuf),
}

/// Parse a scene: `gray:<0-255>`, `gradient`, or an image path
pub fn parse_scene(s: &str) -> Result<SceneSpec, String> {
    if s.eq_ignore_ascii_case("gradient") {
        return Ok(SceneSpec::Gradient);
    }
    if let Some(level) = s.strip_prefix("gray:") {
        let level: u8 = level
            .parse()
            .map_err(|_| format!("Gray level must be 0-255, got '{}'", level))?;
        return Ok(SceneSpec::Gray(level));
    }
    if s.is_empty() {
        return Err("Scene must not be empty".to_string());
    }
    Ok(SceneSpec::Image(PathBuf::from(s)))
}

/// Parse and validate a tone gamma value
pub fn parse_gamma(s: &str) -> Result<f32, String> {
    let gamma: f32 = s.parse().map_err(|_| format!("'{}' is not a valid number", s))?;
    if !(MIN_TONE_GAMMA..=MAX_TONE_GAMMA).contains(&gamma) {
        return Err(format!(
            "Gamma must be between {} and {}, got {}",
            MIN_TONE_GAMMA, MAX_TONE_GAMMA, gamma
        ));
    }
    Ok(gamma)
}

/// Parse and validate resolution (WIDTHxHEIGHT format)
pub fn parse_resolution(s: &str) -> Result<(u32, u32), String> {
    let parts: Vec<&str> = s.split('x').collect();
    if parts.len() != 2 {
        return Err(format!(
            "Invalid resolution format '{}'. Use WIDTHxHEIGHT (e.g., 160x120)",
            s
        ));
    }
    let width: u32 = parts[0]
        .parse()
        .map_err(|_| format!("Invalid width '{}' in resolution", parts[0]))?;
    let height: u32 = parts[1]
        .parse()
        .map_err(|_| format!("Invalid height '{}' in resolution", parts[1]))?;
    if width == 0 || height == 0 {
        return Err("Resolution width and height must be greater than 0".to_string());
    }
    if width > 1600 || height > 1200 {
        return Err(format!(
            "Resolution {}x{} exceeds the sensor maximum of 1600x1200",
            width, height
        ));
    }
    Ok((width, height))
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the camera controller; Enter captures, `h` holds for preview,
    /// `m` cycles the mode, `q` quits
    Run {
        /// Scene seen by the simulated sensor
        #[arg(long, default_value = "gradient", value_parser = parse_scene)]
        scene: SceneSpec,

        /// Starting capture mode (overrides config)
        #[arg(long, short)]
        mode: Option<Mode>,

        /// Directory for captures (overrides config)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Controller tick interval in milliseconds
        #[arg(long, default_value = "20")]
        tick_ms: u64,
    },
    /// Capture images without the controller
    Capture {
        #[arg(long, default_value = "gradient", value_parser = parse_scene)]
        scene: SceneSpec,

        #[arg(long, short, default_value = "stylized")]
        mode: Mode,

        /// Stylized-mode algorithm (overrides config)
        #[arg(long, short)]
        algorithm: Option<Algorithm>,

        /// Sensor resolution
        #[arg(long, value_parser = parse_resolution)]
        resolution: Option<(u32, u32)>,

        /// Number of images
        #[arg(long, short = 'n', default_value = "1")]
        count: u32,

        /// Directory for captures (overrides config)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Show the live dithered preview until Ctrl+C or the timeout
    Preview {
        #[arg(long, default_value = "gradient", value_parser = parse_scene)]
        scene: SceneSpec,

        #[arg(long, short)]
        algorithm: Option<Algorithm>,

        /// Stop after this many seconds
        #[arg(long)]
        seconds: Option<u64>,
    },
    /// Run exposure auto-tune against a uniform scene
    Tune {
        /// Scene gray level before exposure gain
        #[arg(long, default_value = "60")]
        gray: u8,

        /// Target brightness (overrides config)
        #[arg(long)]
        target: Option<u8>,

        /// Accepted distance from the target (overrides config)
        #[arg(long)]
        tolerance: Option<u8>,
    },
    /// Convert an image file to a 1-bit dithered image
    Dither {
        /// Input image (any format the image crate reads)
        input: PathBuf,

        /// Output image (.png or .bmp)
        output: PathBuf,

        #[arg(long, short, default_value = "bayer8")]
        algorithm: Algorithm,

        /// Tone gamma for ordered dithering
        #[arg(long, default_value = "0.9", value_parser = parse_gamma)]
        gamma: f32,

        /// Palette name (classic, pocket, soft, mono, custom)
        #[arg(long)]
        palette: Option<String>,

        /// Stretch contrast before dithering
        #[arg(long)]
        equalize: bool,

        /// Apply the night-vision curve before dithering
        #[arg(long)]
        night: bool,

        /// Resize to WIDTHxHEIGHT first
        #[arg(long, value_parser = parse_resolution)]
        resize: Option<(u32, u32)>,
    },
    /// Check the tone engine against known outputs
    SelfTest,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
