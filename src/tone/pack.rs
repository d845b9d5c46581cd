//! 1-bit packing and 8-bit expansion.
//!
//! Bitmaps are a continuous MSB-first bitstream in row-major pixel order:
//! pixel `i` lives in byte `i / 8` at bit `7 - i % 8`. There is no per-row
//! padding, so a 4x4 image packs into exactly two bytes. A set bit is a
//! light pixel.

use super::{check_input, check_output, ToneError};

/// Number of bytes needed for a `width * height` 1-bpp bitmap.
#[inline]
pub fn packed_len(width: usize, height: usize) -> usize {
    (width * height).div_ceil(8)
}

/// Read the bit for pixel `index`.
#[inline]
pub fn bit_at(bitmap: &[u8], index: usize) -> bool {
    bitmap[index / 8] & (0x80 >> (index % 8)) != 0
}

#[inline]
pub(crate) fn set_bit(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] |= 0x80 >> (index % 8);
}

/// Pack a sequence of pixel bits into a freshly allocated bitmap.
///
/// # Example
/// ```
/// use retrocam::tone::pack_bits;
///
/// let packed = pack_bits([true, true, false, false, true, false, true, false]);
/// assert_eq!(packed, vec![0xCA]);
/// ```
pub fn pack_bits<I>(bits: I) -> Vec<u8>
where
    I: IntoIterator<Item = bool>,
{
    let mut out = Vec::new();
    for (i, bit) in bits.into_iter().enumerate() {
        if i % 8 == 0 {
            out.push(0);
        }
        if bit {
            set_bit(&mut out, i);
        }
    }
    out
}

/// Expand a 1-bpp bitmap back to one byte per pixel (0x00 or 0xFF).
pub fn expand_bitmap(
    bitmap: &[u8],
    width: usize,
    height: usize,
    out: &mut [u8],
) -> Result<(), ToneError> {
    let pixels = width * height;
    check_input(bitmap, packed_len(width, height))?;
    check_output(out, pixels)?;

    for (i, dst) in out[..pixels].iter_mut().enumerate() {
        *dst = if bit_at(bitmap, i) { 0xFF } else { 0x00 };
    }
    Ok(())
}
