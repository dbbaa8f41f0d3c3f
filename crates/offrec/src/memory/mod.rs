//! Record arena: append-only off-heap memory
//!
//! Records live in manually managed chunks allocated outside any Rust value's
//! lifetime. `allocate` hands out zero-filled spans and never fails softly —
//! allocation failure aborts through `handle_alloc_error`. There is no
//! per-record free: reclamation is `release_all`, which frees every chunk at
//! once and invalidates every outstanding view of this arena's records
//! (use-after-release is undefined behavior, mirroring the raw-memory
//! design).

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

use tracing::trace;

/// Default capacity of the first chunk. Growth doubles from here.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

struct Chunk {
    ptr: NonNull<u8>,
    capacity: usize,
    used: usize,
}

impl Chunk {
    fn new(capacity: usize) -> Self {
        let layout = Layout::from_size_align(capacity, 1).expect("chunk layout");
        // zero-filled so fresh records read as all-zero values
        let ptr = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(ptr) else {
            handle_alloc_error(layout);
        };
        Chunk {
            ptr,
            capacity,
            used: 0,
        }
    }

    fn has_capacity(&self, size: usize) -> bool {
        self.used + size <= self.capacity
    }

    fn take(&mut self, size: usize) -> u64 {
        debug_assert!(self.has_capacity(size));
        let address = self.ptr.as_ptr() as u64 + self.used as u64;
        self.used += size;
        address
    }
}

impl Drop for Chunk {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.capacity, 1).expect("chunk layout");
        unsafe { dealloc(self.ptr.as_ptr(), layout) };
    }
}

/// Growable, append-only memory for one schema's records.
pub struct Arena {
    chunks: Vec<Chunk>,
}

impl Arena {
    /// Create an empty arena. The first chunk is allocated on demand.
    pub fn new() -> Self {
        Arena { chunks: Vec::new() }
    }

    /// Append `size` zero-filled bytes and return their starting address.
    ///
    /// The returned address is never 0, so it can serve as a record identity
    /// (0 is the unbound sentinel). Grows by a new chunk when the current one
    /// lacks room.
    pub fn allocate(&mut self, size: usize) -> u64 {
        match self.chunks.last_mut() {
            Some(chunk) if chunk.has_capacity(size) => chunk.take(size),
            _ => {
                let capacity = self.next_capacity(size);
                trace!(capacity, requested = size, "arena grows by a new chunk");
                self.chunks.push(Chunk::new(capacity));
                self.chunks.last_mut().unwrap().take(size)
            }
        }
    }

    fn next_capacity(&self, size: usize) -> usize {
        let doubled = self
            .chunks
            .last()
            .map(|c| c.capacity * 2)
            .unwrap_or(DEFAULT_CHUNK_SIZE);
        doubled.max(size).max(DEFAULT_CHUNK_SIZE)
    }

    /// Free every chunk at once. Outstanding record addresses become dangling.
    pub fn release_all(&mut self) {
        trace!(chunks = self.chunks.len(), "arena bulk release");
        self.chunks.clear();
    }

    /// Total bytes handed out since the last bulk release.
    pub fn used_bytes(&self) -> usize {
        self.chunks.iter().map(|c| c.used).sum()
    }
}

impl Default for Arena {
    fn default() -> Self {
        Arena::new()
    }
}

/// Duplicate `len` bytes between records.
///
/// The spans may overlap: copying a record onto itself is a no-op, not
/// undefined behavior.
///
/// # Safety
///
/// Both spans must be live record storage of at least `len` bytes.
pub(crate) unsafe fn copy_bytes(src: u64, dst: u64, len: usize) {
    std::ptr::copy(src as *const u8, dst as *mut u8, len);
}
