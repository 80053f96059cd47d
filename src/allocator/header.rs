//! The header immediately preceding every pointer returned by an
//! allocator in this crate, per spec §3/§6.

/// Precedes every user pointer returned by `Heap`, `Arena`, or `Stack`.
/// `user_ptr - padding - size_of::<AllocationHeader>()` recovers the raw
/// chunk start usable for freeing.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct AllocationHeader {
    /// Total chunk size in bytes, including this header and any padding.
    pub size: u64,
    /// Bytes between the raw chunk start and this header, inserted to
    /// satisfy the requested alignment.
    pub padding: u32,
    /// The alignment the caller requested (always a power of two, at
    /// least the platform default).
    pub alignment: u32,
}

const _: () = assert!(std::mem::size_of::<AllocationHeader>() == 16);

impl AllocationHeader {
    /// Recover a pointer to the header immediately preceding `user_ptr`.
    ///
    /// # Safety
    /// `user_ptr` must have been returned by one of this crate's
    /// allocators and still be live.
    #[inline]
    pub unsafe fn of(user_ptr: std::ptr::NonNull<u8>) -> std::ptr::NonNull<AllocationHeader> {
        std::ptr::NonNull::new_unchecked(user_ptr.cast::<AllocationHeader>().as_ptr().sub(1))
    }

    /// The raw chunk start this header's owner must free.
    #[inline]
    pub fn chunk_start(&self, header_ptr: std::ptr::NonNull<AllocationHeader>) -> std::ptr::NonNull<u8> {
        // SAFETY: `header_ptr - padding` is within the same allocation
        // the header itself lives in.
        unsafe { std::ptr::NonNull::new_unchecked(header_ptr.cast::<u8>().as_ptr().sub(self.padding as usize)) }
    }

    /// Usable bytes available to the caller after this header and its
    /// padding.
    #[inline]
    pub fn available_size(&self) -> u64 {
        self.size - self.padding as u64 - std::mem::size_of::<AllocationHeader>() as u64
    }
}

/// Write a header immediately before the aligned pointer within
/// `chunk` and return that aligned pointer. Shared by `Heap` and `Arena`,
/// each of which hands this a raw chunk carved from its own backing
/// storage (`Stack` writes no header: it never frees individual
/// allocations, so there is nothing to recover one for).
///
/// # Safety
/// `chunk` must be a live, exclusively-owned region of `chunk_size`
/// bytes with room for a header plus worst-case alignment padding
/// (i.e. `chunk_size >= alignment - 1 + size_of::<AllocationHeader>()`).
pub(crate) unsafe fn place(
    chunk: std::ptr::NonNull<u8>,
    chunk_size: u64,
    alignment: u64,
) -> std::ptr::NonNull<u8> {
    let unaligned_min = chunk.as_ptr().add(std::mem::size_of::<AllocationHeader>());
    let aligned = crate::os::align_up(unaligned_min as usize, alignment as usize) as *mut u8;
    let padding = (aligned as usize - unaligned_min as usize) as u32;

    let header_ptr = (aligned as *mut AllocationHeader).sub(1);
    header_ptr.write(AllocationHeader { size: chunk_size, padding, alignment: alignment as u32 });

    std::ptr::NonNull::new_unchecked(aligned)
}
