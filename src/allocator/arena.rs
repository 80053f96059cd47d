//! A chained arena: fixed-size nodes drawn from an upstream allocator as
//! they fill up, each node a private free list over its own memory.

use std::cell::UnsafeCell;
use std::ptr::NonNull;

use super::free_list::FreeList;
use super::header::{self, AllocationHeader};
use super::{RawAllocator, DEFAULT_ALIGNMENT};
use crate::error::Error;
use crate::Result;

#[derive(Debug, Clone, Copy)]
pub struct ArenaConfig {
    /// Whether nodes that become fully empty on free are kept around
    /// (reused on the next allocation) instead of released upstream.
    pub sticky: bool,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self { sticky: false }
    }
}

struct ArenaNode {
    free_list: FreeList,
    base: NonNull<u8>,
    size: u64,
    allocated_size: u64,
    next: Option<NonNull<ArenaNode>>,
}

fn node_contains(node: &ArenaNode, ptr: NonNull<u8>) -> bool {
    let p = ptr.as_ptr() as usize;
    let start = node.base.as_ptr() as usize;
    p > start && p < start + node.size as usize
}

struct ArenaState {
    first: ArenaNode,
}

/// Chains fixed-size nodes drawn from an upstream allocator. The first
/// node's memory is supplied by the caller at construction (its storage
/// isn't upstream-owned, so it is never released, matching the
/// "first node is never removed" rule every growth node follows once
/// created); growth nodes are drawn from `upstream` as existing ones
/// run out of room.
///
/// Not internally synchronised: concurrent `&Arena` calls from more
/// than one thread race on the same node storage. Wrap an `Arena` in
/// your own mutex to share it, the same way a caller would wrap
/// `ms_arena` in the source this is ported from. This is enforced by
/// the type system here rather than left as a documentation-only
/// contract: `Arena` is `Send` (exclusively-owned raw storage can move
/// between threads) but deliberately not `Sync`.
pub struct Arena<'a> {
    base_size: u64,
    sticky: bool,
    upstream: &'a dyn RawAllocator,
    state: UnsafeCell<ArenaState>,
}

unsafe impl Send for Arena<'_> {}

impl<'a> Arena<'a> {
    /// Construct an arena whose first node spans `[base, base+size)`.
    /// `base_size` governs the quantisation of every later growth node.
    ///
    /// # Safety
    /// `base` must be valid for `size` bytes for the lifetime of this
    /// arena and not referenced elsewhere.
    pub unsafe fn new(
        base: NonNull<u8>,
        size: u64,
        base_size: u64,
        upstream: &'a dyn RawAllocator,
        config: ArenaConfig,
    ) -> Self {
        let mut free_list = FreeList::new();
        free_list.init_single_node(base, size, |_, _| {});

        Self {
            base_size,
            sticky: config.sticky,
            upstream,
            state: UnsafeCell::new(ArenaState {
                first: ArenaNode { free_list, base, size, allocated_size: 0, next: None },
            }),
        }
    }

    fn create_next_node(&self, failing_total_size: u64, last_node_size: u64) -> Result<NonNull<ArenaNode>> {
        let candidate = (8 * failing_total_size).max(last_node_size);
        let node_capacity = 2 * crate::os::align_up(candidate as usize, self.base_size as usize) as u64;
        let header_size = std::mem::size_of::<ArenaNode>() as u64;

        let raw = self.upstream.malloc(header_size + node_capacity)?;
        let node_ptr = raw.cast::<ArenaNode>();
        // SAFETY: `raw` is a fresh allocation of `header_size + node_capacity`
        // bytes; `base` is the region immediately following the node header.
        let base = unsafe { NonNull::new_unchecked(raw.as_ptr().add(header_size as usize)) };

        let mut free_list = FreeList::new();
        // SAFETY: `base` is valid for `node_capacity` bytes and not
        // referenced elsewhere yet.
        unsafe { free_list.init_single_node(base, node_capacity, |_, _| {}) };

        // SAFETY: `node_ptr` is the start of the fresh allocation, large
        // enough (by construction) to hold one `ArenaNode`.
        unsafe {
            node_ptr
                .as_ptr()
                .write(ArenaNode { free_list, base, size: node_capacity, allocated_size: 0, next: None });
        }

        Ok(node_ptr)
    }

    fn malloc_in_node(&self, node: &mut ArenaNode, count: u64, alignment: u64) -> Result<NonNull<u8>> {
        if let Some(allocation) = node.free_list.malloc(count, alignment, |_, _| {}) {
            node.allocated_size += allocation.total_size;
            // SAFETY: `allocation.ptr` is a live, exclusively-owned chunk
            // of `allocation.total_size` bytes just carved from this node.
            return unsafe { Ok(header::place(allocation.ptr, allocation.total_size, alignment)) };
        }

        if node.next.is_none() {
            let failing_total_size = FreeList::total_size_for(count, alignment);
            let next = self.create_next_node(failing_total_size, node.size)?;
            node.next = Some(next);
        }

        // SAFETY: `node.next` was just confirmed `Some` and refers to a
        // live node exclusively owned by this arena.
        let next_node = unsafe { &mut *node.next.unwrap().as_ptr() };
        self.malloc_in_node(next_node, count, alignment)
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

        // SAFETY: exclusive access to arena state is the caller's
        // responsibility (see the struct's doc comment); no other live
        // borrow of `state` can coexist with this one if that contract
        // is honoured.
        let state = unsafe { &mut *self.state.get() };
        self.malloc_in_node(&mut state.first, count, alignment)
    }

    fn free_in_node(&self, node: &mut ArenaNode, ptr: NonNull<u8>) {
        if node_contains(node, ptr) {
            // SAFETY: `ptr` was checked to fall within this node's range
            // and carries a header written by a prior `malloc` here.
            unsafe {
                let header = AllocationHeader::of(ptr);
                let header_ref = header.as_ref();
                let chunk = header_ref.chunk_start(header);
                let size = header_ref.size;
                node.free_list.free(chunk, size, |_, _| {});
                node.allocated_size -= size;
            }
            return;
        }

        match node.next {
            Some(next_ptr) => {
                // SAFETY: `next_ptr` refers to a live node exclusively
                // owned by this arena.
                let next_node = unsafe { &mut *next_ptr.as_ptr() };
                self.free_in_node(next_node, ptr);

                if !self.sticky {
                    // SAFETY: `next_ptr` is still live; this re-reads the
                    // state the recursive call above just mutated.
                    let became_empty = unsafe {
                        next_ptr.as_ref().free_list.single_node_size() == Some(next_ptr.as_ref().size)
                    };
                    if became_empty {
                        // SAFETY: `next_ptr` was returned by an earlier
                        // `upstream.malloc` call in `create_next_node` and
                        // is being released exactly once, here.
                        let following = unsafe { next_ptr.as_ref().next };
                        unsafe { self.upstream.free(next_ptr.cast::<u8>()) };
                        node.next = following;
                    }
                }
            }
            None => {
                tracing::error!("attempting to free pointer not allocated via this arena");
            }
        }
    }

    /// # Safety
    /// `ptr` must be a live allocation returned by this arena, and no
    /// other call into this arena may run concurrently with this one.
    pub unsafe fn free(&self, ptr: NonNull<u8>) {
        let state = &mut *self.state.get();
        self.free_in_node(&mut state.first, ptr);
    }

    /// # Safety
    /// `ptr` must be a live allocation returned by this arena, and no
    /// other call into this arena may run concurrently with this one.
    pub unsafe fn realloc(&self, ptr: NonNull<u8>, new_count: u64) -> Result<NonNull<u8>> {
        if new_count == 0 {
            self.free(ptr);
            return Err(Error::invalid_argument("new_count of zero frees the pointer"));
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

    fn reset_chain(&self, node: &mut ArenaNode) {
        // SAFETY: `node.base`/`node.size` describe this node's own region,
        // exclusively owned by this arena.
        unsafe { node.free_list.reset_to_single_node(node.base, node.size) };
        node.allocated_size = 0;

        if let Some(next_ptr) = node.next {
            // SAFETY: live node owned by this arena.
            let next_node = unsafe { &mut *next_ptr.as_ptr() };
            self.reset_chain(next_node);
        }
    }

    fn release_chain(&self, node_ptr: NonNull<ArenaNode>) {
        // SAFETY: `node_ptr` refers to a live node owned by this arena.
        let next = unsafe { node_ptr.as_ref().next };
        if let Some(next) = next {
            self.release_chain(next);
        }
        // SAFETY: `node_ptr` was allocated via `self.upstream.malloc` in
        // `create_next_node` and is released exactly once, here.
        unsafe { self.upstream.free(node_ptr.cast::<u8>()) };
    }

    /// Reset every node to a single full-size free chunk if sticky,
    /// otherwise release every node but the first back to upstream.
    ///
    /// # Safety
    /// No other call into this arena may run concurrently with this one.
    pub unsafe fn clear(&self) {
        let state = &mut *self.state.get();

        if self.sticky {
            self.reset_chain(&mut state.first);
            return;
        }

        if let Some(next) = state.first.next.take() {
            self.release_chain(next);
        }
        state.first.free_list.reset_to_single_node(state.first.base, state.first.size);
        state.first.allocated_size = 0;
    }

    pub fn owns(&self, ptr: NonNull<u8>) -> bool {
        // SAFETY: read-only traversal; concurrent mutation is the same
        // externally-imposed hazard documented on the struct.
        let state = unsafe { &*self.state.get() };
        let mut cursor = Some(&state.first as *const ArenaNode);
        while let Some(n) = cursor {
            // SAFETY: `n` is a live node owned by this arena.
            let node = unsafe { &*n };
            if node_contains(node, ptr) {
                return true;
            }
            cursor = node.next.map(|p| p.as_ptr() as *const ArenaNode);
        }
        false
    }
}

impl Drop for Arena<'_> {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.first.allocated_size != 0 {
            tracing::warn!("memory leak detected in arena at drop");
        }
        if let Some(next) = state.first.next.take() {
            self.release_chain(next);
        }
    }
}

impl RawAllocator for Arena<'_> {
    fn malloc(&self, size: u64) -> Result<NonNull<u8>> {
        Arena::malloc(self, size)
    }

    fn malloc_aligned(&self, size: u64, alignment: u64) -> Result<NonNull<u8>> {
        Arena::malloc_aligned(self, size, alignment)
    }

    unsafe fn realloc(&self, ptr: NonNull<u8>, new_size: u64) -> Result<NonNull<u8>> {
        Arena::realloc(self, ptr, new_size)
    }

    unsafe fn free(&self, ptr: NonNull<u8>) {
        Arena::free(self, ptr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::heap::{Heap, HeapConfig};

    fn layout_buf(size: usize) -> (NonNull<u8>, std::alloc::Layout) {
        let layout = std::alloc::Layout::from_size_align(size, 16).unwrap();
        // SAFETY: layout is non-zero sized.
        let ptr = unsafe { std::alloc::alloc(layout) };
        (NonNull::new(ptr).unwrap(), layout)
    }

    #[test]
    fn malloc_and_free_within_first_node() {
        let (buf, layout) = layout_buf(4096);
        let heap = Heap::new(HeapConfig::default()).unwrap();
        unsafe {
            let arena = Arena::new(buf, 4096, 4096, &heap, ArenaConfig::default());
            let a = arena.malloc(64).unwrap();
            assert!(arena.owns(a));
            arena.free(a);
        }
        unsafe { std::alloc::dealloc(buf.as_ptr(), layout) };
    }

    #[test]
    fn overflowing_first_node_grows_a_new_one() {
        let (buf, layout) = layout_buf(256);
        let heap = Heap::new(HeapConfig::default()).unwrap();
        unsafe {
            let arena = Arena::new(buf, 256, 256, &heap, ArenaConfig::default());
            let a = arena.malloc(64).unwrap();
            let b = arena.malloc(512).unwrap();
            assert!(arena.owns(a));
            assert!(arena.owns(b));
            arena.free(a);
            arena.free(b);
        }
        unsafe { std::alloc::dealloc(buf.as_ptr(), layout) };
    }

    #[test]
    fn non_sticky_clear_releases_growth_nodes() {
        let (buf, layout) = layout_buf(256);
        let heap = Heap::new(HeapConfig::default()).unwrap();
        unsafe {
            let arena = Arena::new(buf, 256, 256, &heap, ArenaConfig { sticky: false });
            let _b = arena.malloc(512).unwrap();
            arena.clear();
            let state = &*arena.state.get();
            assert!(state.first.next.is_none());
        }
        unsafe { std::alloc::dealloc(buf.as_ptr(), layout) };
    }
}
