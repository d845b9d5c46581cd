//! Box-filter downscaling for the live preview.

use super::{check_input, check_output, ToneError};

/// Downscale a grayscale image by averaging each destination cell.
///
/// # Arguments
/// * `gray` - Source pixels (one byte per pixel, row-major)
/// * `src_width`, `src_height` - Source dimensions
/// * `dst_width`, `dst_height` - Destination dimensions
///
/// # Returns
/// `dst_width * dst_height` averaged brightness values.
pub fn downsample(
    gray: &[u8],
    src_width: usize,
    src_height: usize,
    dst_width: usize,
    dst_height: usize,
) -> Result<Vec<u8>, ToneError> {
    let mut out = vec![0u8; dst_width * dst_height];
    downsample_into(gray, src_width, src_height, dst_width, dst_height, &mut out)?;
    Ok(out)
}

/// Downscale into an existing buffer to avoid allocation in the preview loop.
///
/// When the destination is larger than the source along an axis, cells
/// sample the nearest source pixel instead of averaging an empty range.
pub fn downsample_into(
    gray: &[u8],
    src_width: usize,
    src_height: usize,
    dst_width: usize,
    dst_height: usize,
    out: &mut [u8],
) -> Result<(), ToneError> {
    check_output(out, dst_width * dst_height)?;
    if dst_width == 0 || dst_height == 0 {
        return Ok(());
    }
    if src_width == 0 || src_height == 0 {
        out[..dst_width * dst_height].fill(0);
        return Ok(());
    }
    check_input(gray, src_width * src_height)?;

    for cy in 0..dst_height {
        let start_y = cy * src_height / dst_height;
        let end_y = ((cy + 1) * src_height / dst_height).max(start_y + 1);
        for cx in 0..dst_width {
            let start_x = cx * src_width / dst_width;
            let end_x = ((cx + 1) * src_width / dst_width).max(start_x + 1);

            let mut sum = 0u32;
            let mut count = 0u32;
            for py in start_y..end_y.min(src_height) {
                let row = &gray[py * src_width..(py + 1) * src_width];
                for &v in &row[start_x..end_x.min(src_width)] {
                    sum += v as u32;
                    count += 1;
                }
            }
            out[cy * dst_width + cx] = if count > 0 { (sum / count) as u8 } else { 0 };
        }
    }
    Ok(())
}
