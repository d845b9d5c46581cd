//! Braille-art display on a terminal (or any writer).

use std::io::{self, Stdout, Write};

use super::braille;
use super::{DisplayDriver, DisplayError};
use crate::tone::packed_len;

/// Clear screen and home the cursor.
const CLEAR: &str = "\x1b[2J\x1b[H";
/// Clear the current line.
const CLEAR_LINE: &str = "\x1b[2K";

/// Terminal display that draws frames as braille cells.
///
/// Frames are drawn from the top-left corner; status text lines are placed
/// below the last frame drawn.
pub struct TerminalDisplay<W: Write> {
    out: W,
    max_cols: u16,
    gray_threshold: u8,
    frame_rows: u16,
    cells: Vec<char>,
    initialized: bool,
}

impl TerminalDisplay<Stdout> {
    pub fn stdout(max_cols: u16) -> Self {
        Self::new(io::stdout(), max_cols)
    }
}

impl<W: Write> TerminalDisplay<W> {
    /// # Arguments
    /// * `out` - Destination for escape sequences and braille rows
    /// * `max_cols` - Widest frame to draw, in terminal cells
    pub fn new(out: W, max_cols: u16) -> Self {
        Self {
            out,
            max_cols: max_cols.max(1),
            gray_threshold: 128,
            frame_rows: 0,
            cells: Vec::new(),
            initialized: false,
        }
    }

    /// Cutoff used to turn grayscale frames into dots.
    pub fn with_gray_threshold(mut self, threshold: u8) -> Self {
        self.gray_threshold = threshold;
        self
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn ensure_init(&self) -> Result<(), DisplayError> {
        if self.initialized {
            Ok(())
        } else {
            Err(DisplayError::NotInitialized)
        }
    }

    fn write_cells(&mut self, cols: u16) -> Result<(), DisplayError> {
        write!(self.out, "\x1b[H")?;
        for row in self.cells.chunks(cols.max(1) as usize) {
            let line: String = row.iter().collect();
            writeln!(self.out, "{}{}", CLEAR_LINE, line)?;
        }
        self.frame_rows = (self.cells.len() / cols.max(1) as usize) as u16;
        Ok(())
    }
}

impl<W: Write> DisplayDriver for TerminalDisplay<W> {
    fn init(&mut self) -> Result<(), DisplayError> {
        write!(self.out, "{}", CLEAR)?;
        self.out.flush()?;
        self.frame_rows = 0;
        self.initialized = true;
        log::debug!("Terminal display ready ({} columns)", self.max_cols);
        Ok(())
    }

    fn clear(&mut self) -> Result<(), DisplayError> {
        self.ensure_init()?;
        write!(self.out, "{}", CLEAR)?;
        self.frame_rows = 0;
        Ok(())
    }

    fn print_text(&mut self, line: u16, text: &str) -> Result<(), DisplayError> {
        self.ensure_init()?;
        // ANSI rows are 1-based
        let row = self.frame_rows as u32 + line as u32 + 1;
        write!(self.out, "\x1b[{};1H{}{}", row, CLEAR_LINE, text)?;
        Ok(())
    }

    fn draw_grayscale(
        &mut self,
        gray: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(), DisplayError> {
        self.ensure_init()?;
        let expected = width as usize * height as usize;
        if gray.len() < expected {
            return Err(DisplayError::BufferTooSmall {
                kind: "grayscale",
                expected,
                actual: gray.len(),
            });
        }
        let (cols, rows) = braille::cell_size(width, height, self.max_cols);
        let mut cells = std::mem::take(&mut self.cells);
        braille::render_gray_into(
            gray,
            width,
            height,
            cols,
            rows,
            self.gray_threshold,
            &mut cells,
        );
        self.cells = cells;
        self.write_cells(cols)
    }

    fn draw_bitmap_1bpp(
        &mut self,
        bitmap: &[u8],
        width: u32,
        height: u32,
    ) -> Result<(), DisplayError> {
        self.ensure_init()?;
        let expected = packed_len(width as usize, height as usize);
        if bitmap.len() < expected {
            return Err(DisplayError::BufferTooSmall {
                kind: "bitmap",
                expected,
                actual: bitmap.len(),
            });
        }
        let (cols, rows) = braille::cell_size(width, height, self.max_cols);
        let mut cells = std::mem::take(&mut self.cells);
        braille::render_bitmap_into(bitmap, width, height, cols, rows, &mut cells);
        self.cells = cells;
        self.write_cells(cols)
    }

    fn flush(&mut self) -> Result<(), DisplayError> {
        self.out.flush()?;
        Ok(())
    }
}
