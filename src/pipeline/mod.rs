//! Capture pipeline: one sensor frame in, one stylized image out.
//!
//! ```text
//! Normal:    acquire -> [block filter] -> hand raw frame to caller
//! Stylized:  acquire -> [block filter] -> decode -> grayscale -> Bayer dither -> expand 0/255
//! Night:     night preset -> acquire -> [block filter] -> decode -> grayscale -> night LUT
//!            -> low threshold -> expand 0/255 -> standard preset
//! ```
//!
//! Processed output lives in a [`ScratchArena`] owned by the pipeline and is
//! overwritten by the next capture. The optional block filter only touches
//! packed RGB frames.

mod arena;
mod capture;
mod decode;
mod filter;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use arena::ScratchArena;
pub use capture::{
    CaptureError, CapturePipeline, CaptureTelemetry, ImageInfo, PipelineSettings, ProcessedImage,
};
pub use decode::{decode_jpeg_into, ProcessingError};
pub(crate) use decode::frame_to_gray;
pub use filter::apply_block_filter;

/// Active stylization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    /// Sensor bytes, untouched
    #[default]
    Normal,
    /// Four-tone handheld-console look
    #[serde(alias = "gameboy")]
    Stylized,
    /// Low-light preset with gamma lift and a lowered threshold
    Night,
}

impl CaptureMode {
    pub const ALL: [CaptureMode; 3] = [CaptureMode::Normal, CaptureMode::Stylized, CaptureMode::Night];

    /// Next mode in the cycle used by the mode button.
    pub fn next(&self) -> Self {
        match self {
            CaptureMode::Normal => CaptureMode::Stylized,
            CaptureMode::Stylized => CaptureMode::Night,
            CaptureMode::Night => CaptureMode::Normal,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            CaptureMode::Normal => "normal",
            CaptureMode::Stylized => "stylized",
            CaptureMode::Night => "night",
        }
    }
}

impl fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CaptureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "normal" => Ok(CaptureMode::Normal),
            "stylized" | "gameboy" => Ok(CaptureMode::Stylized),
            "night" => Ok(CaptureMode::Night),
            _ => Err(format!(
                "Unknown mode '{}'. Available modes: normal, stylized, night",
                s
            )),
        }
    }
}
