//! Live preview: a lock-free frame exchange plus the session that feeds it.
//!
//! The producer side digests sensor frames into small grayscale previews;
//! the consumer side dithers the newest one and draws it. Both sides may run
//! interleaved on one loop or on separate threads.

mod double_buffer;
mod live;

pub use double_buffer::{
    PreviewBuffers, PreviewConsumer, PreviewProducer, PreviewStats, SlotState,
};
pub use live::{PreviewExit, PreviewSession, PreviewSettings};

use crate::display::DisplayError;
use crate::memory::MemoryError;
use crate::pipeline::ProcessingError;
use crate::tone::ToneError;

#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    #[error("preview buffers unavailable: {0}")]
    Memory(#[from] MemoryError),

    #[error("preview slot size must be non-zero")]
    EmptySlot,

    #[error("preview frame rejected: {0}")]
    Processing(#[from] ProcessingError),

    #[error(transparent)]
    Tone(#[from] ToneError),

    #[error(transparent)]
    Display(#[from] DisplayError),
}
