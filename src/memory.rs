//! Working-memory model: fast external RAM with a general-heap fallback.
//!
//! Buffers that must exist for the lifetime of a subsystem (the capture
//! arena, the preview slots) are allocated through a [`MemoryPool`]. Each
//! subsystem requests its whole set of buffers with [`allocate_set`], which
//! walks [`ALLOCATION_ORDER`] and takes the first region that can satisfy
//! every buffer in the set.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Where a buffer lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryRegion {
    /// Fast external RAM (PSRAM on the target board)
    External,
    /// General-purpose heap
    Heap,
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryRegion::External => f.write_str("external RAM"),
            MemoryRegion::Heap => f.write_str("heap"),
        }
    }
}

/// Regions tried, in order, by [`allocate_set`].
pub const ALLOCATION_ORDER: [MemoryRegion; 2] = [MemoryRegion::External, MemoryRegion::Heap];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MemoryError {
    #[error("unable to allocate {requested} bytes in any memory region")]
    Exhausted { requested: usize },
}

/// A zero-initialized buffer whose bytes are returned to its region's
/// budget when dropped.
pub struct RegionBuffer {
    data: Box<[u8]>,
    region: MemoryRegion,
    ledger: Option<Arc<AtomicUsize>>,
}

impl RegionBuffer {
    pub fn region(&self) -> MemoryRegion {
        self.region
    }
}

impl Deref for RegionBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for RegionBuffer {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl Drop for RegionBuffer {
    fn drop(&mut self) {
        if let Some(ledger) = &self.ledger {
            ledger.fetch_add(self.data.len(), Ordering::SeqCst);
        }
    }
}

impl fmt::Debug for RegionBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionBuffer")
            .field("len", &self.data.len())
            .field("region", &self.region)
            .finish()
    }
}

/// Source of long-lived working buffers.
pub trait MemoryPool {
    /// Whether fast external RAM is fitted.
    fn has_external(&self) -> bool;

    /// Allocate `len` zeroed bytes in `region`, or `None` if it cannot.
    fn try_alloc(&self, len: usize, region: MemoryRegion) -> Option<RegionBuffer>;
}

/// Host implementation with optional byte budgets per region.
///
/// A region without a budget is unlimited (heap) or absent (external).
#[derive(Debug, Clone)]
pub struct HostMemory {
    external: Option<Arc<AtomicUsize>>,
    heap: Option<Arc<AtomicUsize>>,
}

impl HostMemory {
    /// `external_bytes = None` models a board without external RAM.
    pub fn new(external_bytes: Option<usize>) -> Self {
        Self {
            external: external_bytes.map(|b| Arc::new(AtomicUsize::new(b))),
            heap: None,
        }
    }

    /// Cap the heap at `bytes`.
    pub fn with_heap_budget(mut self, bytes: usize) -> Self {
        self.heap = Some(Arc::new(AtomicUsize::new(bytes)));
        self
    }

    /// Remaining external RAM, if fitted.
    pub fn external_free(&self) -> Option<usize> {
        self.external.as_ref().map(|l| l.load(Ordering::SeqCst))
    }

    fn reserve(ledger: &AtomicUsize, len: usize) -> bool {
        ledger
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |free| free.checked_sub(len))
            .is_ok()
    }
}

impl MemoryPool for HostMemory {
    fn has_external(&self) -> bool {
        self.external.is_some()
    }

    fn try_alloc(&self, len: usize, region: MemoryRegion) -> Option<RegionBuffer> {
        let ledger = match region {
            MemoryRegion::External => Some(self.external.as_ref()?),
            MemoryRegion::Heap => self.heap.as_ref(),
        };
        if let Some(ledger) = ledger {
            if !Self::reserve(ledger, len) {
                return None;
            }
        }

        let mut data = Vec::new();
        if data.try_reserve_exact(len).is_err() {
            if let Some(ledger) = ledger {
                ledger.fetch_add(len, Ordering::SeqCst);
            }
            return None;
        }
        data.resize(len, 0);

        Some(RegionBuffer {
            data: data.into_boxed_slice(),
            region,
            ledger: ledger.cloned(),
        })
    }
}

/// Allocate every buffer in `sizes` from a single region.
///
/// Regions are tried in [`ALLOCATION_ORDER`]; a region that cannot satisfy
/// the whole set is abandoned (partial allocations are freed) and the next
/// one is tried.
pub fn allocate_set(
    pool: &dyn MemoryPool,
    sizes: &[usize],
) -> Result<(MemoryRegion, Vec<RegionBuffer>), MemoryError> {
    let requested: usize = sizes.iter().sum();

    for region in ALLOCATION_ORDER {
        if region == MemoryRegion::External && !pool.has_external() {
            continue;
        }

        let buffers: Option<Vec<RegionBuffer>> =
            sizes.iter().map(|&len| pool.try_alloc(len, region)).collect();
        match buffers {
            Some(buffers) => {
                log::debug!("Allocated {} bytes in {}", requested, region);
                return Ok((region, buffers));
            }
            None => {
                log::warn!(
                    "Could not allocate {} bytes in {}, trying next region",
                    requested,
                    region
                );
            }
        }
    }

    Err(MemoryError::Exhausted { requested })
}
