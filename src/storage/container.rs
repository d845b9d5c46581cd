//! Container encoding for stored captures.
//!
//! JPEG frames are stored as-is. Everything else is wrapped in a BMP so the
//! files open in ordinary image viewers.

use image::codecs::bmp::BmpEncoder;
use image::{ExtendedColorType, ImageEncoder};

use super::StorageError;
use crate::pipeline::ImageInfo;
use crate::sensor::PixelFormat;
use crate::tone;

/// Bytes ready to write plus the extension to write them under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

fn bmp(data: &[u8], width: u32, height: u32, color: ExtendedColorType) -> Result<Vec<u8>, StorageError> {
    let mut out = Vec::new();
    BmpEncoder::new(&mut out)
        .write_image(data, width, height, color)
        .map_err(|e| StorageError::Encode(e.to_string()))?;
    Ok(out)
}

/// Pick a container for a captured image.
///
/// # Arguments
/// * `info` - Metadata returned with the capture
/// * `data` - Payload bytes (raw sensor bytes or one gray byte per pixel)
pub fn encode_for_storage(info: &ImageInfo, data: &[u8]) -> Result<EncodedImage, StorageError> {
    let (w, h) = (info.width, info.height);
    let pixels = w as usize * h as usize;

    if info.is_processed {
        return Ok(EncodedImage {
            bytes: bmp(data, w, h, ExtendedColorType::L8)?,
            extension: "bmp",
        });
    }

    match info.source_format {
        PixelFormat::Jpeg => Ok(EncodedImage {
            bytes: data.to_vec(),
            extension: "jpg",
        }),
        PixelFormat::Rgb888 => Ok(EncodedImage {
            bytes: bmp(data, w, h, ExtendedColorType::Rgb8)?,
            extension: "bmp",
        }),
        PixelFormat::Rgb565 => {
            let mut rgb = vec![0u8; pixels * 3];
            tone::rgb565_to_rgb888(data, w as usize, h as usize, &mut rgb)
                .map_err(|e| StorageError::Encode(e.to_string()))?;
            Ok(EncodedImage {
                bytes: bmp(&rgb, w, h, ExtendedColorType::Rgb8)?,
                extension: "bmp",
            })
        }
        PixelFormat::Grayscale => Ok(EncodedImage {
            bytes: bmp(data, w, h, ExtendedColorType::L8)?,
            extension: "bmp",
        }),
        PixelFormat::Yuv422 => Ok(EncodedImage {
            bytes: data.to_vec(),
            extension: info.extension,
        }),
    }
}
