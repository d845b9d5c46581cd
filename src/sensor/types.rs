//! Sensor types and data structures.

use std::fmt;

/// Pixel format tag carried by each frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// Baseline JPEG bitstream
    Jpeg,
    /// Big-endian RGB565, 2 bytes per pixel
    Rgb565,
    /// Packed RGB888, 3 bytes per pixel
    Rgb888,
    /// YUV 4:2:2, 2 bytes per pixel
    Yuv422,
    /// 8-bit luminance
    Grayscale,
}

impl PixelFormat {
    /// True for compressed bitstreams whose length is not `w*h*bpp`.
    pub fn is_compressed(&self) -> bool {
        matches!(self, PixelFormat::Jpeg)
    }

    /// True for the packed-RGB formats the pipeline can use without decoding.
    pub fn is_packed_rgb(&self) -> bool {
        matches!(self, PixelFormat::Rgb565 | PixelFormat::Rgb888)
    }

    /// Bytes per pixel for uncompressed formats.
    pub fn bytes_per_pixel(&self) -> Option<usize> {
        match self {
            PixelFormat::Jpeg => None,
            PixelFormat::Rgb565 | PixelFormat::Yuv422 => Some(2),
            PixelFormat::Rgb888 => Some(3),
            PixelFormat::Grayscale => Some(1),
        }
    }

    /// File extension hint for the native bytes.
    pub fn extension(&self) -> &'static str {
        match self {
            PixelFormat::Jpeg => "jpg",
            PixelFormat::Rgb565 => "rgb565",
            PixelFormat::Rgb888 => "rgb",
            PixelFormat::Yuv422 => "yuv",
            PixelFormat::Grayscale => "gray",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PixelFormat::Jpeg => "JPEG",
            PixelFormat::Rgb565 => "RGB565",
            PixelFormat::Rgb888 => "RGB888",
            PixelFormat::Yuv422 => "YUV422",
            PixelFormat::Grayscale => "GRAY",
        };
        f.write_str(name)
    }
}

/// Sensor bring-up parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorConfig {
    pub format: PixelFormat,
    pub width: u32,
    pub height: u32,
    /// JPEG quality (1-100) when `format` is [`PixelFormat::Jpeg`]
    pub jpeg_quality: u8,
}

impl SensorConfig {
    /// QQVGA (160x120), the stylized working resolution.
    pub fn qqvga(format: PixelFormat) -> Self {
        Self {
            format,
            width: 160,
            height: 120,
            jpeg_quality: 80,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self::qqvga(PixelFormat::Jpeg)
    }
}

/// One exposure handed back by the sensor driver.
///
/// A frame is owned by exactly one call site at a time and must be handed
/// back through [`super::SensorDriver::release_frame`]. It is deliberately
/// not `Clone`.
pub struct SensorFrame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    format: PixelFormat,
    sequence: u64,
}

impl SensorFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat, sequence: u64) -> Self {
        Self {
            data,
            width,
            height,
            format,
            sequence,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access for in-place post filters on raw frames.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Give the backing buffer back to the driver for reuse.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for SensorFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SensorFrame")
            .field("len", &self.data.len())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("sequence", &self.sequence)
            .finish()
    }
}

/// Errors reported by sensor drivers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SensorError {
    #[error("sensor init failed: {0}")]
    InitFailed(String),
    #[error("sensor not initialized")]
    NotInitialized,
    #[error("exposure level {0} outside -2..=2")]
    ExposureOutOfRange(i8),
    #[error("sensor register write failed: {0}")]
    RegisterWrite(String),
}
