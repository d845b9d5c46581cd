//! Bounded working memory for the capture pipeline.

use crate::memory::{allocate_set, MemoryError, MemoryPool, MemoryRegion, RegionBuffer};
use crate::tone::packed_len;

/// Scratch buffers sized once for the largest working resolution.
///
/// Every processed capture reuses the same buffers, so output borrowed from
/// the arena is only valid until the next capture.
pub struct ScratchArena {
    rgb: RegionBuffer,
    gray: RegionBuffer,
    bitmap: RegionBuffer,
    max_width: u32,
    max_height: u32,
    region: MemoryRegion,
}

/// Mutable views of the arena buffers for one frame.
pub(crate) struct ArenaParts<'a> {
    pub rgb: &'a mut [u8],
    pub gray: &'a mut [u8],
    pub bitmap: &'a mut [u8],
}

impl ScratchArena {
    /// Allocate packed RGB, grayscale and 1-bpp buffers for
    /// `max_width` x `max_height` frames from a single region.
    pub fn allocate(
        pool: &dyn MemoryPool,
        max_width: u32,
        max_height: u32,
    ) -> Result<Self, MemoryError> {
        let pixels = max_width as usize * max_height as usize;
        let sizes = [
            pixels * 3,
            pixels,
            packed_len(max_width as usize, max_height as usize),
        ];
        let (region, buffers) = allocate_set(pool, &sizes)?;
        let mut buffers = buffers.into_iter();
        match (buffers.next(), buffers.next(), buffers.next()) {
            (Some(rgb), Some(gray), Some(bitmap)) => Ok(Self {
                rgb,
                gray,
                bitmap,
                max_width,
                max_height,
                region,
            }),
            _ => Err(MemoryError::Exhausted {
                requested: sizes.iter().sum(),
            }),
        }
    }

    pub fn max_dimensions(&self) -> (u32, u32) {
        (self.max_width, self.max_height)
    }

    pub fn region(&self) -> MemoryRegion {
        self.region
    }

    /// Whether a `width` x `height` frame can be processed.
    pub fn fits(&self, width: u32, height: u32) -> bool {
        width <= self.max_width && height <= self.max_height
    }

    /// Views trimmed to a `width` x `height` frame. Callers check
    /// [`fits`](Self::fits) first.
    pub(crate) fn parts(&mut self, width: u32, height: u32) -> ArenaParts<'_> {
        let pixels = width as usize * height as usize;
        ArenaParts {
            rgb: &mut self.rgb[..pixels * 3],
            gray: &mut self.gray[..pixels],
            bitmap: &mut self.bitmap[..packed_len(width as usize, height as usize)],
        }
    }

    /// First `len` bytes of the grayscale buffer.
    pub(crate) fn gray(&self, len: usize) -> &[u8] {
        &self.gray[..len.min(self.gray.len())]
    }
}

impl std::fmt::Debug for ScratchArena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchArena")
            .field("max_width", &self.max_width)
            .field("max_height", &self.max_height)
            .field("region", &self.region)
            .finish()
    }
}
