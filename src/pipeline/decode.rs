//! Sensor frame to grayscale conversion inside the scratch arena.

use std::io::Cursor;

use image::codecs::jpeg::JpegDecoder;
use image::{ColorType, ImageDecoder};

use crate::sensor::{PixelFormat, SensorFrame};
use crate::tone::{self, ToneError};

/// Failures turning a frame into working pixels.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("frame {width}x{height} exceeds working buffer {max_width}x{max_height}")]
    FrameTooLarge {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    #[error("cannot process {0} frames")]
    UnsupportedFormat(PixelFormat),

    #[error("JPEG decode failed: {0}")]
    Decode(String),

    #[error("decoded {actual_width}x{actual_height}, frame header says {width}x{height}")]
    DimensionMismatch {
        width: u32,
        height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error(transparent)]
    Tone(#[from] ToneError),
}

/// Decode a baseline JPEG into packed RGB888.
///
/// # Arguments
/// * `data` - Compressed bitstream
/// * `width`, `height` - Dimensions the sensor reported for the frame
/// * `rgb` - Destination, at least `width * height * 3` bytes
pub fn decode_jpeg_into(
    data: &[u8],
    width: u32,
    height: u32,
    rgb: &mut [u8],
) -> Result<(), ProcessingError> {
    let decoder =
        JpegDecoder::new(Cursor::new(data)).map_err(|e| ProcessingError::Decode(e.to_string()))?;

    let (actual_width, actual_height) = decoder.dimensions();
    if (actual_width, actual_height) != (width, height) {
        return Err(ProcessingError::DimensionMismatch {
            width,
            height,
            actual_width,
            actual_height,
        });
    }

    let pixels = width as usize * height as usize;
    let color = decoder.color_type();
    let needed = decoder.total_bytes() as usize;
    if rgb.len() < needed || rgb.len() < pixels * 3 {
        return Err(ToneError::OutputTooSmall {
            expected: needed.max(pixels * 3),
            actual: rgb.len(),
        }
        .into());
    }

    match color {
        ColorType::Rgb8 => decoder
            .read_image(&mut rgb[..needed])
            .map_err(|e| ProcessingError::Decode(e.to_string())),
        ColorType::L8 => {
            decoder
                .read_image(&mut rgb[..needed])
                .map_err(|e| ProcessingError::Decode(e.to_string()))?;
            // Spread luma to RGB in place, back to front
            for i in (0..pixels).rev() {
                let v = rgb[i];
                rgb[i * 3..i * 3 + 3].fill(v);
            }
            Ok(())
        }
        other => Err(ProcessingError::Decode(format!(
            "unsupported JPEG color type {:?}",
            other
        ))),
    }
}

/// Fill `gray` with the luminance of `frame`.
///
/// RGB888 frames are read in place; RGB565 and JPEG frames are first
/// expanded into `rgb`.
pub(crate) fn frame_to_gray(
    frame: &SensorFrame,
    rgb: &mut [u8],
    gray: &mut [u8],
) -> Result<(), ProcessingError> {
    let (w, h) = (frame.width() as usize, frame.height() as usize);
    match frame.format() {
        PixelFormat::Rgb888 => tone::to_grayscale_into(frame.data(), w, h, gray)?,
        PixelFormat::Rgb565 => {
            tone::rgb565_to_rgb888(frame.data(), w, h, rgb)?;
            tone::to_grayscale_into(rgb, w, h, gray)?;
        }
        PixelFormat::Jpeg => {
            decode_jpeg_into(frame.data(), frame.width(), frame.height(), rgb)?;
            tone::to_grayscale_into(rgb, w, h, gray)?;
        }
        other => return Err(ProcessingError::UnsupportedFormat(other)),
    }
    Ok(())
}
