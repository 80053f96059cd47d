//! A page-committing heap: one reservation, lazily committed as the
//! shared free list touches new high-water memory, with excess
//! committed-but-unused tail handed back to the OS on free.

use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use super::free_list::FreeList;
use super::header::AllocationHeader;
use super::{RawAllocator, DEFAULT_ALIGNMENT, DEFAULT_DECOMMIT_THRESHOLD};
use crate::error::Error;
use crate::os;
use crate::sync::Mutex;
use crate::Result;

#[derive(Debug, Clone, Copy)]
pub struct HeapConfig {
    /// Total reserved size. Must be a multiple of `page_size`.
    pub size: u64,
    /// Page granularity used for lazy commit. Must be a power of two.
    pub page_size: u64,
    /// High-water decommit threshold; a fully-free trailing chunk
    /// larger than this is shrunk back to it on free.
    pub decommit_threshold: u64,
}

impl Default for HeapConfig {
    fn default() -> Self {
        Self {
            size: 64 * 1024 * 1024,
            page_size: os::page_size() as u64,
            decommit_threshold: DEFAULT_DECOMMIT_THRESHOLD,
        }
    }
}

struct HeapState {
    free_list: FreeList,
}

/// A single large reservation backing a segregated free list, committing
/// pages lazily as allocations reach past the current high-water mark.
pub struct Heap {
    base: NonNull<u8>,
    size: u64,
    decommit_threshold: u64,
    committed_size: AtomicU64,
    state: Mutex<HeapState>,
}

unsafe impl Send for Heap {}
unsafe impl Sync for Heap {}

impl Heap {
    pub fn new(config: HeapConfig) -> Result<Self> {
        if config.size % config.page_size != 0 {
            return Err(Error::invalid_argument("heap size must be a multiple of page_size"));
        }
        if !config.page_size.is_power_of_two() {
            return Err(Error::invalid_argument("page_size must be a power of two"));
        }

        let base = os::reserve(config.size as usize)
            .ok_or_else(|| Error::out_of_memory(config.size))?;

        if !os::commit(base, config.page_size as usize) {
            tracing::error!("failed committing initial heap page");
            return Err(Error::out_of_memory(config.page_size));
        }

        let mut free_list = FreeList::new();
        // SAFETY: `base` is freshly reserved and fully owned by this heap;
        // the first page is committed above, matching the first node's
        // commit bookkeeping done through `committed_size`.
        unsafe { free_list.init_single_node(base, config.size, |_, _| {}) };

        Ok(Self {
            base,
            size: config.size,
            decommit_threshold: config.decommit_threshold,
            committed_size: AtomicU64::new(config.page_size),
            state: Mutex::new(HeapState { free_list }),
        })
    }

    fn committed_end(&self, committed_size: u64) -> *mut u8 {
        // SAFETY: `committed_size <= self.size`, within the reservation.
        unsafe { self.base.as_ptr().add(committed_size as usize) }
    }

    fn does_ptr_belong(&self, ptr: NonNull<u8>) -> bool {
        let p = ptr.as_ptr() as usize;
        let start = self.base.as_ptr() as usize;
        p > start && p < start + self.size as usize
    }

    /// Commit `size` bytes starting at `commit_start`.
    ///
    /// Takes no reference to the locked `HeapState`: bookkeeping lives in
    /// `self.committed_size` so this can be called from inside a free-list
    /// hook closure while the caller already holds `state.free_list`
    /// mutably borrowed.
    fn commit(&self, commit_start: *mut u8, size: u64) {
        // SAFETY: `commit_start` lies within `[base, base+size)`.
        let ptr = unsafe { NonNull::new_unchecked(commit_start) };
        if os::commit(ptr, size as usize) {
            self.committed_size.fetch_add(size, Ordering::AcqRel);
        } else {
            panic!("Failed committing memory.");
        }
    }

    fn decommit(&self, decommit_start: *mut u8, size: u64) {
        debug_assert!(self.committed_size.load(Ordering::Acquire) >= size);
        // SAFETY: `decommit_start` lies within the committed range.
        let ptr = unsafe { NonNull::new_unchecked(decommit_start) };
        os::decommit(ptr, size as usize);
        self.committed_size.fetch_sub(size, Ordering::AcqRel);
    }

    /// Commit whatever lies between the current high-water mark and
    /// `chunk_end`, if `chunk_end` reaches past it.
    fn commit_chunk_memory(&self, chunk: *mut u8, size_to_commit: u64) {
        let heap_commit_end = self.committed_end(self.committed_size.load(Ordering::Acquire));
        // SAFETY: `chunk` lies within the reservation and `size_to_commit`
        // does not overflow it (the free list never hands out chunks
        // larger than the reservation).
        let chunk_commit_end = unsafe { chunk.add(size_to_commit as usize) };

        if chunk_commit_end > heap_commit_end {
            let unmallocd = chunk_commit_end as usize - heap_commit_end as usize;
            self.commit(heap_commit_end, unmallocd as u64);
        }
    }

    /// Allocate `count` bytes at the default alignment.
    pub fn malloc(&self, count: u64) -> Result<NonNull<u8>> {
        self.malloc_aligned(count, DEFAULT_ALIGNMENT)
    }

    pub fn malloc_aligned(&self, count: u64, alignment: u64) -> Result<NonNull<u8>> {
        if count == 0 {
            return Err(Error::invalid_argument("count must be nonzero"));
        }
        let alignment = alignment.max(DEFAULT_ALIGNMENT);

        let mut state = self.state.lock();
        let allocation = state
            .free_list
            .malloc(count, alignment, |node, size| {
                self.commit_chunk_memory(node.as_ptr(), size)
            })
            .ok_or_else(|| Error::out_of_memory(count))?;

        // SAFETY: `allocation.ptr` is a live, exclusively-owned chunk of
        // `allocation.total_size` bytes just returned by the free list.
        unsafe { Ok(super::header::place(allocation.ptr, allocation.total_size, alignment)) }
    }

    /// # Safety
    /// `ptr` must be a live allocation returned by this heap.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        if !self.does_ptr_belong(ptr) {
            tracing::error!("attempting to free pointer not allocated via this heap");
            return;
        }

        let header = AllocationHeader::of(ptr);
        let header_ref = header.as_ref();
        let chunk = header_ref.chunk_start(header);
        let size = header_ref.size;

        let mut state = self.state.lock();
        state.free_list.free(chunk, size, |node, node_size| {
            self.commit_chunk_memory(node.as_ptr(), node_size)
        });

        self.maybe_decommit_tail(&mut state);
    }

    fn maybe_decommit_tail(&self, state: &mut HeapState) {
        // Only the trailing node (if any) can be shrunk back to the OS;
        // a fully-free interior node has no address relationship to the
        // committed high-water mark.
        if let Some((ptr, size)) = state.free_list.iter().last() {
            if size <= self.decommit_threshold {
                return;
            }
            let committed_end = self.committed_end(self.committed_size.load(Ordering::Acquire));
            let chunk_start = ptr.as_ptr() as usize;

            if committed_end as usize > chunk_start + self.decommit_threshold as usize {
                let extra = committed_end as usize - chunk_start - self.decommit_threshold as usize;
                let dealloc_ptr = unsafe { ptr.as_ptr().add(self.decommit_threshold as usize) };
                self.decommit(dealloc_ptr, extra as u64);
            }
        }
    }

    /// # Safety
    /// `ptr` must be a live allocation returned by this heap.
    pub unsafe fn realloc(&self, ptr: NonNull<u8>, new_count: u64) -> Result<NonNull<u8>> {
        if new_count == 0 {
            self.free(ptr);
            return Err(Error::invalid_argument("new_count of zero frees the pointer"));
        }
        if !self.does_ptr_belong(ptr) {
            return Err(Error::access("pointer not allocated via this heap"));
        }

        let header = AllocationHeader::of(ptr);
        let header_ref = header.as_ref();
        let available = header_ref.available_size();

        if new_count <= available {
            return Ok(ptr);
        }

        let new_ptr = self.malloc_aligned(new_count, header_ref.alignment as u64)?;
        std::ptr::copy_nonoverlapping(ptr.as_ptr(), new_ptr.as_ptr(), available as usize);
        self.free(ptr);
        Ok(new_ptr)
    }

    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        self.does_ptr_belong(ptr)
    }
}

impl Drop for Heap {
    fn drop(&mut self) {
        let state = self.state.lock();
        if state.free_list.single_node_size() != Some(self.size) {
            tracing::warn!("memory leak detected in heap at drop");
        }
        drop(state);

        // SAFETY: `self.base` was reserved for `self.size` bytes at
        // construction and is released exactly once, here.
        unsafe { os::release(self.base, self.size as usize) };
    }
}

impl RawAllocator for Heap {
    fn malloc(&self, size: u64) -> Result<NonNull<u8>> {
        Heap::malloc(self, size)
    }

    fn malloc_aligned(&self, size: u64, alignment: u64) -> Result<NonNull<u8>> {
        Heap::malloc_aligned(self, size, alignment)
    }

    unsafe fn realloc(&self, ptr: NonNull<u8>, new_size: u64) -> Result<NonNull<u8>> {
        Heap::realloc(self, ptr, new_size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        Heap::free(self, ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_heap() -> Heap {
        let page = os::page_size() as u64;
        Heap::new(HeapConfig { size: page * 16, page_size: page, decommit_threshold: page * 4 }).unwrap()
    }

    #[test]
    fn malloc_and_free_roundtrip() {
        let heap = small_heap();
        let ptr = heap.malloc(128).unwrap();
        assert!(heap.owns(ptr));
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 0xAB, 128);
            heap.free(ptr);
        }
    }

    #[test]
    fn owns_rejects_foreign_pointer() {
        let heap = small_heap();
        let foreign = Box::leak(Box::new(0u8));
        assert!(!heap.owns(NonNull::from(foreign)));
    }

    #[test]
    fn realloc_grows_and_preserves_contents() {
        let heap = small_heap();
        let ptr = heap.malloc(16).unwrap();
        unsafe {
            std::ptr::write_bytes(ptr.as_ptr(), 7, 16);
            let grown = heap.realloc(ptr, 256).unwrap();
            let slice = std::slice::from_raw_parts(grown.as_ptr(), 16);
            assert!(slice.iter().all(|&b| b == 7));
            heap.free(grown);
        }
    }

    #[test]
    fn fully_freeing_everything_leaves_no_leak_warning() {
        let heap = small_heap();
        let a = heap.malloc(64).unwrap();
        let b = heap.malloc(64).unwrap();
        unsafe {
            heap.free(a);
            heap.free(b);
        }
        drop(heap);
    }
}
