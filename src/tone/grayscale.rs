//! Packed RGB to grayscale conversion.

use super::{check_input, check_output, ToneError};

/// Luminance of one RGB pixel using fixed-point Rec.601-like weights.
///
/// `Y = (77*R + 150*G + 29*B) >> 8`. The weights sum to 256 so white stays 255.
#[inline]
pub fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

/// Convert a packed RGB888 buffer to grayscale.
///
/// # Arguments
/// * `rgb` - Packed RGB pixels, 3 bytes per pixel, row-major
/// * `width` - Image width in pixels
/// * `height` - Image height in pixels
///
/// # Returns
/// One luminance byte per pixel.
pub fn to_grayscale(rgb: &[u8], width: usize, height: usize) -> Result<Vec<u8>, ToneError> {
    let mut gray = vec![0u8; width * height];
    to_grayscale_into(rgb, width, height, &mut gray)?;
    Ok(gray)
}

/// Convert a packed RGB888 buffer to grayscale into a caller-provided buffer.
///
/// This is the allocation-free version of [`to_grayscale`] used by the
/// capture pipeline, which writes into its scratch arena.
pub fn to_grayscale_into(
    rgb: &[u8],
    width: usize,
    height: usize,
    out: &mut [u8],
) -> Result<(), ToneError> {
    let pixels = width * height;
    check_input(rgb, pixels * 3)?;
    check_output(out, pixels)?;

    for (dst, px) in out[..pixels].iter_mut().zip(rgb.chunks_exact(3)) {
        *dst = luminance(px[0], px[1], px[2]);
    }
    Ok(())
}

/// Expand big-endian RGB565 pixels into packed RGB888.
///
/// Channel values are bit-replicated so that full-scale 5/6-bit values map
/// to 255.
pub fn rgb565_to_rgb888(
    src: &[u8],
    width: usize,
    height: usize,
    out: &mut [u8],
) -> Result<(), ToneError> {
    let pixels = width * height;
    check_input(src, pixels * 2)?;
    check_output(out, pixels * 3)?;

    for (dst, px) in out[..pixels * 3]
        .chunks_exact_mut(3)
        .zip(src.chunks_exact(2))
    {
        let v = u16::from_be_bytes([px[0], px[1]]);
        let r5 = ((v >> 11) & 0x1F) as u8;
        let g6 = ((v >> 5) & 0x3F) as u8;
        let b5 = (v & 0x1F) as u8;
        dst[0] = (r5 << 3) | (r5 >> 2);
        dst[1] = (g6 << 2) | (g6 >> 4);
        dst[2] = (b5 << 3) | (b5 >> 2);
    }
    Ok(())
}
