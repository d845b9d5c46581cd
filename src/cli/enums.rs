//! CLI enum types for capture mode and dither algorithm options.

use clap::ValueEnum;

use crate::pipeline::CaptureMode;
use crate::tone::DitherAlgorithm;

/// Capture mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Mode {
    #[default]
    Normal,
    #[value(alias = "gameboy")]
    Stylized,
    Night,
}

impl From<Mode> for CaptureMode {
    fn from(m: Mode) -> Self {
        match m {
            Mode::Normal => CaptureMode::Normal,
            Mode::Stylized => CaptureMode::Stylized,
            Mode::Night => CaptureMode::Night,
        }
    }
}

/// Pixel-to-tone mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Algorithm {
    Threshold,
    #[default]
    Bayer8,
    Bayer4,
    FloydSteinberg,
    Atkinson,
    NightThreshold,
}

impl From<Algorithm> for DitherAlgorithm {
    fn from(a: Algorithm) -> Self {
        match a {
            Algorithm::Threshold => DitherAlgorithm::Threshold,
            Algorithm::Bayer8 => DitherAlgorithm::Bayer8,
            Algorithm::Bayer4 => DitherAlgorithm::Bayer4,
            Algorithm::FloydSteinberg => DitherAlgorithm::FloydSteinberg,
            Algorithm::Atkinson => DitherAlgorithm::Atkinson,
            Algorithm::NightThreshold => DitherAlgorithm::NightThreshold,
        }
    }
}
