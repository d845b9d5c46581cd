//! Display driver interface and the host terminal implementation.
//!
//! The core only needs a handful of drawing primitives: grayscale frames,
//! packed 1-bpp bitmaps and short status lines. [`TerminalDisplay`] renders
//! all of them as braille art on any `io::Write`.

pub mod braille;
mod terminal;

pub use terminal::TerminalDisplay;

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("display not initialized")]
    NotInitialized,

    #[error("display init failed: {0}")]
    InitFailed(String),

    #[error("{kind} buffer too small: need {expected} bytes, got {actual}")]
    BufferTooSmall {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("display I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Drawing surface used for status text and previews.
pub trait DisplayDriver {
    /// Bring the panel up. Called again after an error acknowledgement.
    fn init(&mut self) -> Result<(), DisplayError>;

    fn clear(&mut self) -> Result<(), DisplayError>;

    /// Write one status line; `line` 0 is the top text row.
    fn print_text(&mut self, line: u16, text: &str) -> Result<(), DisplayError>;

    /// Draw one byte per pixel.
    fn draw_grayscale(&mut self, gray: &[u8], width: u32, height: u32)
        -> Result<(), DisplayError>;

    /// Draw a packed MSB-first bitmap, bit 1 = light.
    fn draw_bitmap_1bpp(
        &mut self,
        bitmap: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(), DisplayError>;

    /// Push pending output to the panel.
    fn flush(&mut self) -> Result<(), DisplayError>;
}
