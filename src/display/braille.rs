//! Braille cell rendering for terminal previews.
//!
//! A braille character is a 2x4 dot matrix, so each terminal cell shows
//! eight image pixels. That is enough to show a 160x120 dithered frame in
//! an 80x30 cell area without losing a single pixel.

use crate::tone::bit_at;

/// Empty braille pattern (U+2800).
pub const BRAILLE_BASE: char = '\u{2800}';

/// Dot bit for `[x][y]` within a cell.
const DOT_BITS: [[u8; 4]; 2] = [[0x01, 0x02, 0x04, 0x40], [0x08, 0x10, 0x20, 0x80]];

/// Convert a 2x4 dot grid (`grid[x][y]`) to its braille character.
pub fn grid_to_braille(grid: [[bool; 4]; 2]) -> char {
    let mut code = 0u32;
    for (column, bits) in grid.iter().zip(DOT_BITS.iter()) {
        for (&on, &bit) in column.iter().zip(bits.iter()) {
            if on {
                code |= bit as u32;
            }
        }
    }
    char::from_u32(BRAILLE_BASE as u32 + code).unwrap_or(BRAILLE_BASE)
}

/// Cell grid needed to show a `width`x`height` image, capped at `max_cols`.
///
/// # Returns
/// `(columns, rows)` with the image aspect preserved when capped.
pub fn cell_size(width: u32, height: u32, max_cols: u16) -> (u16, u16) {
    if width == 0 || height == 0 || max_cols == 0 {
        return (0, 0);
    }
    let cols = width.div_ceil(2).min(max_cols as u32);
    // Scale rows by the same factor as columns
    let px_w = cols * 2;
    let px_h = (height as u64 * px_w as u64 / width as u64) as u32;
    let rows = px_h.div_ceil(4).max(1);
    (cols as u16, rows.min(u16::MAX as u32) as u16)
}

/// Render an image given by a per-pixel predicate into `buffer`, one
/// `char` per cell, row-major.
///
/// Returns the number of characters written.
pub fn render_into(
    width: u32,
    height: u32,
    cols: u16,
    rows: u16,
    lit: impl Fn(u32, u32) -> bool,
    buffer: &mut Vec<char>,
) -> usize {
    buffer.clear();
    if cols == 0 || rows == 0 || width == 0 || height == 0 {
        return 0;
    }
    buffer.reserve(cols as usize * rows as usize);

    let scale_x = width as f32 / (cols as u32 * 2) as f32;
    let scale_y = height as f32 / (rows as u32 * 4) as f32;

    for cy in 0..rows as u32 {
        for cx in 0..cols as u32 {
            let mut grid = [[false; 4]; 2];
            for (dx, column) in grid.iter_mut().enumerate() {
                for (dy, dot) in column.iter_mut().enumerate() {
                    let src_x = ((cx * 2 + dx as u32) as f32 * scale_x) as u32;
                    let src_y = ((cy * 4 + dy as u32) as f32 * scale_y) as u32;
                    *dot = src_x < width && src_y < height && lit(src_x, src_y);
                }
            }
            buffer.push(grid_to_braille(grid));
        }
    }
    buffer.len()
}

/// Render 8-bit grayscale, lighting dots at or above `threshold`.
pub fn render_gray_into(
    gray: &[u8],
    width: u32,
    height: u32,
    cols: u16,
    rows: u16,
    threshold: u8,
    buffer: &mut Vec<char>,
) -> usize {
    render_into(
        width,
        height,
        cols,
        rows,
        |x, y| {
            gray.get((y * width + x) as usize)
                .is_some_and(|&v| v >= threshold)
        },
        buffer,
    )
}

/// Render a packed 1-bpp bitmap (bit 1 = light).
pub fn render_bitmap_into(
    bitmap: &[u8],
    width: u32,
    height: u32,
    cols: u16,
    rows: u16,
    buffer: &mut Vec<char>,
) -> usize {
    let pixels = width as usize * height as usize;
    render_into(
        width,
        height,
        cols,
        rows,
        |x, y| {
            let index = (y * width + x) as usize;
            index < pixels && index / 8 < bitmap.len() && bit_at(bitmap, index)
        },
        buffer,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_to_braille_empty_and_full() {
        assert_eq!(grid_to_braille([[false; 4]; 2]), '\u{2800}');
        assert_eq!(grid_to_braille([[true; 4]; 2]), '\u{28FF}');
    }

    #[test]
    fn test_grid_to_braille_single_dots() {
        let mut grid = [[false; 4]; 2];
        grid[0][3] = true;
        assert_eq!(grid_to_braille(grid), '\u{2840}');
        let mut grid = [[false; 4]; 2];
        grid[1][0] = true;
        assert_eq!(grid_to_braille(grid), '\u{2808}');
    }

    #[test]
    fn test_cell_size_exact_fit() {
        assert_eq!(cell_size(160, 120, 80), (80, 30));
    }

    #[test]
    fn test_cell_size_capped() {
        assert_eq!(cell_size(160, 120, 40), (40, 15));
        assert_eq!(cell_size(0, 120, 40), (0, 0));
    }

    #[test]
    fn test_render_bitmap_one_to_one() {
        // 2x4 image, all lit: one full cell
        let mut buffer = Vec::new();
        let n = render_bitmap_into(&[0xFF], 2, 4, 1, 1, &mut buffer);
        assert_eq!(n, 1);
        assert_eq!(buffer[0], '\u{28FF}');
    }

    #[test]
    fn test_render_gray_threshold() {
        let gray = [0, 255, 0, 255, 0, 255, 0, 255];
        let mut buffer = Vec::new();
        render_gray_into(&gray, 2, 4, 1, 1, 128, &mut buffer);
        // Right column only
        assert_eq!(buffer[0], '\u{28B8}');
    }
}
