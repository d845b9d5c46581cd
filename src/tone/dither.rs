//! Dithering: grayscale to 1-bpp bitmaps.
//!
//! All functions take a grayscale buffer of `width * height` bytes and write
//! a packed bitmap (see [`super::pack`]) of `packed_len(width, height)` bytes.
//! The output buffer is cleared before writing, so it can be reused across
//! frames.

use serde::{Deserialize, Serialize};

use super::lut::ToneTables;
use super::pack::{packed_len, set_bit};
use super::{check_input, check_output, ToneError};

/// Quantization midpoint for the error-diffusion dithers.
const DIFFUSION_THRESHOLD: i16 = 128;

/// Pixel-to-tone mapping used when producing a bitmap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DitherAlgorithm {
    /// Fixed cutoff at 128
    Threshold,
    /// Tone LUT + 8x8 Bayer ordered dithering
    #[default]
    Bayer8,
    /// Tone LUT + 4x4 Bayer ordered dithering
    Bayer4,
    /// Floyd-Steinberg error diffusion
    FloydSteinberg,
    /// Atkinson error diffusion (6/8 of the error propagated)
    Atkinson,
    /// Lowered cutoff used after night-vision enhancement
    NightThreshold,
}

impl DitherAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            DitherAlgorithm::Threshold => "threshold",
            DitherAlgorithm::Bayer8 => "bayer8",
            DitherAlgorithm::Bayer4 => "bayer4",
            DitherAlgorithm::FloydSteinberg => "floyd-steinberg",
            DitherAlgorithm::Atkinson => "atkinson",
            DitherAlgorithm::NightThreshold => "night-threshold",
        }
    }
}

/// Run `algorithm` over `gray`.
///
/// `night_threshold` is only consulted by [`DitherAlgorithm::NightThreshold`].
pub fn dither(
    algorithm: DitherAlgorithm,
    gray: &[u8],
    width: usize,
    height: usize,
    tables: &ToneTables,
    night_threshold: u8,
    out: &mut [u8],
) -> Result<(), ToneError> {
    match algorithm {
        DitherAlgorithm::Threshold => threshold_dither(gray, width, height, 128, out),
        DitherAlgorithm::Bayer8 => ordered_dither_8x8(gray, width, height, tables, out),
        DitherAlgorithm::Bayer4 => ordered_dither_4x4(gray, width, height, tables, out),
        DitherAlgorithm::FloydSteinberg => floyd_steinberg_dither(gray, width, height, out),
        DitherAlgorithm::Atkinson => atkinson_dither(gray, width, height, out),
        DitherAlgorithm::NightThreshold => {
            threshold_dither(gray, width, height, night_threshold, out)
        }
    }
}

fn prepare(gray: &[u8], width: usize, height: usize, out: &mut [u8]) -> Result<usize, ToneError> {
    let pixels = width * height;
    let bytes = packed_len(width, height);
    check_input(gray, pixels)?;
    check_output(out, bytes)?;
    out[..bytes].fill(0);
    Ok(pixels)
}

/// Set a bit for every pixel at or above `threshold`.
///
/// # Example
/// ```
/// use retrocam::tone::threshold_dither;
///
/// let gray = [0, 32, 64, 96, 128, 160, 192, 224, 255, 128, 128, 128, 0, 255, 0, 255];
/// let mut bitmap = [0u8; 2];
/// threshold_dither(&gray, 4, 4, 128, &mut bitmap).unwrap();
/// assert_eq!(bitmap, [0x0F, 0xF5]);
/// ```
pub fn threshold_dither(
    gray: &[u8],
    width: usize,
    height: usize,
    threshold: u8,
    out: &mut [u8],
) -> Result<(), ToneError> {
    let pixels = prepare(gray, width, height, out)?;
    for (i, &v) in gray[..pixels].iter().enumerate() {
        if v >= threshold {
            set_bit(out, i);
        }
    }
    Ok(())
}

/// Tone-remap each pixel and compare it against the tiled 8x8 Bayer matrix.
pub fn ordered_dither_8x8(
    gray: &[u8],
    width: usize,
    height: usize,
    tables: &ToneTables,
    out: &mut [u8],
) -> Result<(), ToneError> {
    prepare(gray, width, height, out)?;
    for y in 0..height {
        let row = &tables.bayer8[y & 7];
        for x in 0..width {
            let i = y * width + x;
            if tables.tone.value(gray[i]) > row[x & 7] {
                set_bit(out, i);
            }
        }
    }
    Ok(())
}

/// Tone-remap each pixel and compare it against the tiled 4x4 Bayer matrix.
pub fn ordered_dither_4x4(
    gray: &[u8],
    width: usize,
    height: usize,
    tables: &ToneTables,
    out: &mut [u8],
) -> Result<(), ToneError> {
    prepare(gray, width, height, out)?;
    for y in 0..height {
        let row = &tables.bayer4[y & 3];
        for x in 0..width {
            let i = y * width + x;
            if tables.tone.value(gray[i]) > row[x & 3] {
                set_bit(out, i);
            }
        }
    }
    Ok(())
}

/// Floyd-Steinberg error diffusion.
///
/// Only two rows of `i16` error accumulators are kept, with one guard cell
/// on each side so edge pixels never diffuse out of bounds.
///
/// ```text
///          [*]  7/16
///   3/16  5/16  1/16
/// ```
pub fn floyd_steinberg_dither(
    gray: &[u8],
    width: usize,
    height: usize,
    out: &mut [u8],
) -> Result<(), ToneError> {
    prepare(gray, width, height, out)?;
    if width == 0 {
        return Ok(());
    }

    // Index x+1 holds the error for column x
    let mut cur = vec![0i16; width + 2];
    let mut next = vec![0i16; width + 2];

    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let old = gray[i] as i16 + cur[x + 1];
            let (on, new) = if old >= DIFFUSION_THRESHOLD {
                (true, 255)
            } else {
                (false, 0)
            };
            if on {
                set_bit(out, i);
            }
            let err = old - new;

            if x + 1 < width {
                cur[x + 2] += err * 7 / 16;
            }
            if x > 0 {
                next[x] += err * 3 / 16;
            }
            next[x + 1] += err * 5 / 16;
            if x + 1 < width {
                next[x + 2] += err / 16;
            }
        }
        std::mem::swap(&mut cur, &mut next);
        next.fill(0);
    }
    Ok(())
}

/// Atkinson error diffusion: 1/8 of the error to six neighbours.
///
/// ```text
///        [*]  1/8  1/8
///  1/8   1/8  1/8
///        1/8
/// ```
pub fn atkinson_dither(
    gray: &[u8],
    width: usize,
    height: usize,
    out: &mut [u8],
) -> Result<(), ToneError> {
    prepare(gray, width, height, out)?;
    if width == 0 {
        return Ok(());
    }

    // Three rolling rows, index x+1 holds column x
    let mut rows = [
        vec![0i16; width + 3],
        vec![0i16; width + 3],
        vec![0i16; width + 3],
    ];

    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let old = gray[i] as i16 + rows[0][x + 1];
            let (on, new) = if old >= DIFFUSION_THRESHOLD {
                (true, 255)
            } else {
                (false, 0)
            };
            if on {
                set_bit(out, i);
            }
            let share = (old - new) / 8;

            if x + 1 < width {
                rows[0][x + 2] += share;
            }
            if x + 2 < width {
                rows[0][x + 3] += share;
            }
            if x > 0 {
                rows[1][x] += share;
            }
            rows[1][x + 1] += share;
            if x + 1 < width {
                rows[1][x + 2] += share;
            }
            rows[2][x + 1] += share;
        }
        rows.rotate_left(1);
        rows[2].fill(0);
    }
    Ok(())
}
