//! Layered memory allocators: a shared free-list algorithm plus three
//! allocator shapes built on top of it (`Heap`, `Arena`, `Stack`), per
//! spec §4.

mod header;
mod free_list;

mod arena;
mod heap;
mod stack;

pub use arena::{Arena, ArenaConfig};
pub use header::AllocationHeader;
pub use heap::{Heap, HeapConfig};
pub use stack::{Stack, StackConfig};

use std::ptr::NonNull;

use crate::Result;

/// The common interface every allocator in this crate implements,
/// mirroring the four-callback `ms_allocator` value type from spec §3:
/// a cheaply-copied handle over `malloc`/`malloca`/`realloc`/`free`.
pub trait RawAllocator {
    /// Allocate at least `size` bytes at the default alignment.
    fn malloc(&self, size: u64) -> Result<NonNull<u8>>;

    /// Allocate at least `size` bytes aligned to `alignment`, which must
    /// be a power of two.
    fn malloc_aligned(&self, size: u64, alignment: u64) -> Result<NonNull<u8>>;

    /// Grow or shrink a previous allocation in place when possible,
    /// otherwise relocate. `ptr` must have come from this allocator.
    ///
    /// # Safety
    /// `ptr` must be a live allocation returned by this same allocator.
    unsafe fn realloc(&self, ptr: NonNull<u8>, new_size: u64) -> Result<NonNull<u8>>;

    /// Release a previous allocation.
    ///
    /// # Safety
    /// `ptr` must be a live allocation returned by this same allocator
    /// and must not be used again afterward.
    unsafe fn free(&self, ptr: NonNull<u8>);
}

/// Default alignment used when a caller doesn't ask for one explicitly.
/// Not specified by an available header; chosen as the smallest
/// alignment that satisfies every primitive type this crate's
/// allocators are asked to host, including the 16-byte
/// [`AllocationHeader`] itself.
pub const DEFAULT_ALIGNMENT: u64 = 16;

/// High-water decommit threshold: once an allocator's committed-but-
/// unused tail exceeds this many bytes, the excess is handed back to
/// the OS. Not specified by an available header; 4 MiB matches spec
/// §6's example budget for a worker heap and keeps the hysteresis well
/// above a single page on every supported platform.
pub const DEFAULT_DECOMMIT_THRESHOLD: u64 = 4 * 1024 * 1024;
