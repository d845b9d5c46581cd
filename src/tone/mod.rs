//! Tone/dither engine for turning grayscale frames into retro output.
//!
//! Every function in this module is a pure transform over caller-provided
//! buffers of a known `width * height`:
//!
//! 1. **Grayscale reduction** - packed RGB to 8-bit luminance
//! 2. **Histogram equalization** - in-place contrast stretch
//! 3. **Dithering** - threshold, ordered Bayer (8x8 / 4x4), Floyd-Steinberg,
//!    Atkinson and the night-mode threshold, all emitting 1-bit bitmaps
//! 4. **Night vision** - gamma lift followed by a contrast boost
//! 5. **Bit packing** - MSB-first 1-bpp packing and 0/255 expansion
//!
//! The only state is [`ToneTables`], a bundle of lookup tables computed once
//! from configuration and shared read-only by the capture and preview paths.

mod dither;
mod downsample;
mod equalize;
mod grayscale;
mod lut;
mod night;
mod pack;
pub mod palette;

pub use dither::{
    atkinson_dither, dither, floyd_steinberg_dither, ordered_dither_4x4, ordered_dither_8x8,
    threshold_dither, DitherAlgorithm,
};
pub use downsample::{downsample, downsample_into};
pub use equalize::histogram_equalize;
pub use grayscale::{luminance, rgb565_to_rgb888, to_grayscale, to_grayscale_into};
pub use lut::{
    GammaLut, NightLut, ToneLut, ToneTables, BAYER4, BAYER8, MAX_TONE_GAMMA, MIN_TONE_GAMMA,
};
pub use night::{night_vision, night_vision_with};
pub use pack::{bit_at, expand_bitmap, pack_bits, packed_len};
pub use palette::Palette;

/// Errors raised when a buffer does not match the declared frame geometry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToneError {
    /// Input buffer is shorter than `width * height * bytes_per_pixel`.
    #[error("input buffer too small: need {expected} bytes, got {actual}")]
    InputTooSmall { expected: usize, actual: usize },
    /// Output buffer is shorter than the transform needs.
    #[error("output buffer too small: need {expected} bytes, got {actual}")]
    OutputTooSmall { expected: usize, actual: usize },
}

pub(crate) fn check_input(buf: &[u8], expected: usize) -> Result<(), ToneError> {
    if buf.len() < expected {
        return Err(ToneError::InputTooSmall {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}

pub(crate) fn check_output(buf: &[u8], expected: usize) -> Result<(), ToneError> {
    if buf.len() < expected {
        return Err(ToneError::OutputTooSmall {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}
