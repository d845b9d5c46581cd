//! Lock-free single-producer/single-consumer frame exchange.
//!
//! Two equally sized slots alternate between a producer that fills frames
//! and a consumer that draws them. Each slot carries one atomic state:
//!
//! ```text
//!          claim               commit
//!  Free ----------> Writing ----------> Ready
//!   ^                  ^                  |  claim (stale frame dropped)
//!   |                  +------------------+
//!   |   release                 acquire   |
//!   +------------- Reading <--------------+
//! ```
//!
//! The producer never claims a slot in `Reading`, so bytes the consumer is
//! looking at are never overwritten. A slow consumer misses frames: an
//! unread `Ready` slot is simply reclaimed by the producer.
//!
//! [`PreviewBuffers::split`] is the only way to obtain the two handles, and
//! neither handle is `Clone`, so exactly one producer and one consumer exist
//! per buffer pair.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;

use super::PreviewError;
use crate::memory::{allocate_set, MemoryError, MemoryPool, MemoryRegion, RegionBuffer};

const FREE: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;
const READING: u8 = 3;

/// Observable state of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    Free,
    Writing,
    Ready,
    Reading,
}

impl SlotState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            WRITING => SlotState::Writing,
            READY => SlotState::Ready,
            READING => SlotState::Reading,
            _ => SlotState::Free,
        }
    }
}

struct Slot {
    state: AtomicU8,
    sequence: AtomicU64,
    data: UnsafeCell<RegionBuffer>,
}

struct Shared {
    slots: [Slot; 2],
    write_index: AtomicUsize,
    committed: AtomicU64,
    overwritten: AtomicU64,
    consumed: AtomicU64,
}

// SAFETY: slot contents are only touched by the handle that moved the slot's
// state into Writing (producer) or Reading (consumer) via compare-exchange.
// Those states are mutually exclusive, and Release/Acquire pairs on `state`
// order the data accesses between the two handles.
unsafe impl Sync for Shared {}

/// Counters for preview diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviewStats {
    pub committed: u64,
    pub overwritten: u64,
    pub consumed: u64,
}

/// Freshly allocated slot pair, not yet split.
pub struct PreviewBuffers {
    shared: Arc<Shared>,
    bitmap: RegionBuffer,
    region: MemoryRegion,
}

impl PreviewBuffers {
    /// Allocate two `slot_len` frame slots plus a `bitmap_len` scratch
    /// bitmap, all from the same memory region.
    ///
    /// # Arguments
    /// * `pool` - Memory source; external RAM is preferred over the heap
    /// * `slot_len` - Bytes per frame slot
    /// * `bitmap_len` - Bytes of the consumer's 1-bit scratch bitmap
    pub fn allocate(
        pool: &dyn MemoryPool,
        slot_len: usize,
        bitmap_len: usize,
    ) -> Result<Self, PreviewError> {
        if slot_len == 0 {
            return Err(PreviewError::EmptySlot);
        }
        let (region, buffers) = allocate_set(pool, &[slot_len, slot_len, bitmap_len])?;
        let mut buffers = buffers.into_iter();
        let (Some(first), Some(second), Some(bitmap)) =
            (buffers.next(), buffers.next(), buffers.next())
        else {
            return Err(PreviewError::Memory(MemoryError::Exhausted {
                requested: slot_len * 2 + bitmap_len,
            }));
        };

        log::debug!(
            "Preview buffers: 2 x {} bytes + {} byte bitmap in {}",
            slot_len,
            bitmap_len,
            region
        );

        let slot = |data| Slot {
            state: AtomicU8::new(FREE),
            sequence: AtomicU64::new(0),
            data: UnsafeCell::new(data),
        };
        Ok(Self {
            shared: Arc::new(Shared {
                slots: [slot(first), slot(second)],
                write_index: AtomicUsize::new(0),
                committed: AtomicU64::new(0),
                overwritten: AtomicU64::new(0),
                consumed: AtomicU64::new(0),
            }),
            bitmap,
            region,
        })
    }

    pub fn region(&self) -> MemoryRegion {
        self.region
    }

    /// Hand out the single producer and single consumer.
    pub fn split(self) -> (PreviewProducer, PreviewConsumer) {
        let producer = PreviewProducer {
            shared: Arc::clone(&self.shared),
            current: None,
        };
        let consumer = PreviewConsumer {
            shared: self.shared,
            bitmap: self.bitmap,
            current: None,
        };
        (producer, consumer)
    }
}

impl fmt::Debug for PreviewBuffers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewBuffers")
            .field("region", &self.region)
            .field("bitmap_len", &self.bitmap.len())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn state(&self, index: usize) -> SlotState {
        SlotState::from_raw(self.slots[index].state.load(Ordering::Acquire))
    }

    fn stats(&self) -> PreviewStats {
        PreviewStats {
            committed: self.committed.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
            consumed: self.consumed.load(Ordering::Relaxed),
        }
    }

    /// Try to move slot `index` into Writing. Returns whether a stale ready
    /// frame was dropped in the process.
    fn claim_for_write(&self, index: usize) -> Option<bool> {
        let state = &self.slots[index].state;
        if state
            .compare_exchange(FREE, WRITING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return Some(false);
        }
        if state
            .compare_exchange(READY, WRITING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            return Some(true);
        }
        None
    }
}

/// Writing half of the exchange.
pub struct PreviewProducer {
    shared: Arc<Shared>,
    current: Option<usize>,
}

impl PreviewProducer {
    /// Slot to fill with the next frame.
    ///
    /// Repeated calls before [`commit_write`](Self::commit_write) return the
    /// same slot. Returns `None` only if neither slot can be claimed, which
    /// cannot happen while a single consumer holds at most one slot.
    pub fn get_write_buffer(&mut self) -> Option<&mut [u8]> {
        let index = match self.current {
            Some(index) => index,
            None => {
                let preferred = self.shared.write_index.load(Ordering::Acquire);
                let (index, dropped) = [preferred, 1 - preferred]
                    .into_iter()
                    .find_map(|i| self.shared.claim_for_write(i).map(|d| (i, d)))?;
                if dropped {
                    self.shared.overwritten.fetch_add(1, Ordering::Relaxed);
                    log::trace!("Preview slot {} overwritten before display", index);
                }
                self.current = Some(index);
                index
            }
        };
        // SAFETY: slot `index` is in Writing and owned by this handle until
        // commit_write; the consumer never touches a Writing slot.
        let data = unsafe { &mut *self.shared.slots[index].data.get() };
        Some(&mut data[..])
    }

    /// Publish the filled slot and move the write index to the other slot.
    ///
    /// Returns `false` if no slot was claimed.
    pub fn commit_write(&mut self) -> bool {
        let Some(index) = self.current.take() else {
            return false;
        };
        let sequence = self.shared.committed.fetch_add(1, Ordering::Relaxed) + 1;
        let slot = &self.shared.slots[index];
        slot.sequence.store(sequence, Ordering::Relaxed);
        slot.state.store(READY, Ordering::Release);
        self.shared.write_index.store(1 - index, Ordering::Release);
        true
    }

    pub fn slot_state(&self, index: usize) -> SlotState {
        self.shared.state(index)
    }

    pub fn stats(&self) -> PreviewStats {
        self.shared.stats()
    }
}

/// Reading half of the exchange, owning the 1-bit scratch bitmap.
pub struct PreviewConsumer {
    shared: Arc<Shared>,
    bitmap: RegionBuffer,
    current: Option<usize>,
}

impl PreviewConsumer {
    /// Latest committed frame, if one is waiting.
    ///
    /// Only the slot opposite the current write index is inspected. The
    /// returned slot stays reserved until [`release_read`](Self::release_read).
    pub fn get_read_buffer(&mut self) -> Option<&[u8]> {
        let index = match self.current {
            Some(index) => index,
            None => {
                let index = 1 - self.shared.write_index.load(Ordering::Acquire);
                self.shared.slots[index]
                    .state
                    .compare_exchange(READY, READING, Ordering::AcqRel, Ordering::Acquire)
                    .ok()?;
                self.current = Some(index);
                index
            }
        };
        // SAFETY: slot `index` is in Reading and owned by this handle until
        // release_read; the producer never claims a Reading slot.
        let data = unsafe { &*self.shared.slots[index].data.get() };
        Some(&data[..])
    }

    /// Return the slot obtained from [`get_read_buffer`](Self::get_read_buffer).
    pub fn release_read(&mut self) {
        if let Some(index) = self.current.take() {
            self.shared.slots[index].state.store(FREE, Ordering::Release);
            self.shared.consumed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Sequence number of the held frame (1-based commit order).
    pub fn current_sequence(&self) -> Option<u64> {
        self.current
            .map(|i| self.shared.slots[i].sequence.load(Ordering::Relaxed))
    }

    /// Acquire the latest frame, run `f` on it with the scratch bitmap, and
    /// release the slot again.
    pub fn with_frame<R>(&mut self, f: impl FnOnce(&[u8], &mut [u8]) -> R) -> Option<R> {
        self.get_read_buffer()?;
        let index = self.current?;
        // SAFETY: as in get_read_buffer; the slot is held in Reading.
        let frame = unsafe { &*self.shared.slots[index].data.get() };
        let result = f(frame, &mut self.bitmap);
        self.release_read();
        Some(result)
    }

    pub fn bitmap(&self) -> &[u8] {
        &self.bitmap
    }

    pub fn slot_state(&self, index: usize) -> SlotState {
        self.shared.state(index)
    }

    pub fn stats(&self) -> PreviewStats {
        self.shared.stats()
    }
}

impl Drop for PreviewConsumer {
    fn drop(&mut self) {
        self.release_read();
    }
}

impl fmt::Debug for PreviewProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewProducer")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for PreviewConsumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreviewConsumer")
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}
