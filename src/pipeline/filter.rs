//! Legacy block-average filter for raw RGB frames.
//!
//! Replaces every `block` x `block` tile with its mean color, giving a
//! coarse pixelated look. It predates the dither engine and only runs on
//! uncompressed frames, before any decoding, so every capture mode sees it.

use crate::sensor::{PixelFormat, SensorFrame};

/// Filter a raw frame in place. Returns `false` if the format is not
/// packed RGB or `block < 2`.
pub fn apply_block_filter(frame: &mut SensorFrame, block: usize) -> bool {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    match frame.format() {
        PixelFormat::Rgb888 if block >= 2 => {
            block_average(frame.data_mut(), w, h, block, 3, read_rgb888, write_rgb888);
            true
        }
        PixelFormat::Rgb565 if block >= 2 => {
            block_average(frame.data_mut(), w, h, block, 2, read_rgb565, write_rgb565);
            true
        }
        _ => false,
    }
}

fn read_rgb888(px: &[u8]) -> [u32; 3] {
    [px[0] as u32, px[1] as u32, px[2] as u32]
}

fn write_rgb888(px: &mut [u8], c: [u32; 3]) {
    px[0] = c[0] as u8;
    px[1] = c[1] as u8;
    px[2] = c[2] as u8;
}

/// Channels stay at native 5/6/5-bit precision.
fn read_rgb565(px: &[u8]) -> [u32; 3] {
    let v = u16::from_be_bytes([px[0], px[1]]) as u32;
    [(v >> 11) & 0x1F, (v >> 5) & 0x3F, v & 0x1F]
}

fn write_rgb565(px: &mut [u8], c: [u32; 3]) {
    let v = ((c[0] as u16) << 11) | ((c[1] as u16) << 5) | c[2] as u16;
    px.copy_from_slice(&v.to_be_bytes());
}

fn block_average(
    data: &mut [u8],
    width: usize,
    height: usize,
    block: usize,
    bpp: usize,
    read: impl Fn(&[u8]) -> [u32; 3],
    write: impl Fn(&mut [u8], [u32; 3]),
) {
    if data.len() < width * height * bpp {
        return;
    }
    for by in (0..height).step_by(block) {
        for bx in (0..width).step_by(block) {
            let (y_end, x_end) = ((by + block).min(height), (bx + block).min(width));
            let mut sum = [0u32; 3];
            let mut count = 0u32;
            for y in by..y_end {
                for x in bx..x_end {
                    let i = (y * width + x) * bpp;
                    let c = read(&data[i..i + bpp]);
                    for (s, v) in sum.iter_mut().zip(c) {
                        *s += v;
                    }
                    count += 1;
                }
            }
            let mean = sum.map(|s| s / count.max(1));
            for y in by..y_end {
                for x in bx..x_end {
                    let i = (y * width + x) * bpp;
                    write(&mut data[i..i + bpp], mean);
                }
            }
        }
    }
}
