//! Unix backend for the OS virtual memory primitives: `mmap`/`mprotect`/
//! `munmap`, grounded on the syscall wrapping style used throughout this
//! crate's platform layer.

use std::ptr::NonNull;

pub fn page_size() -> usize {
    // SAFETY: sysconf with _SC_PAGESIZE never fails on a sane target.
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

pub fn reserve(bytes: usize) -> Option<NonNull<u8>> {
    // SAFETY: anonymous, non-backed mapping; no aliasing concerns since
    // we are creating a brand-new range.
    let ptr = unsafe {
        libc::mmap(
            std::ptr::null_mut(),
            bytes,
            libc::PROT_NONE,
            libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
            -1,
            0,
        )
    };

    if ptr == libc::MAP_FAILED {
        return None;
    }

    NonNull::new(ptr as *mut u8)
}

pub fn commit(ptr: *mut u8, bytes: usize) -> bool {
    if bytes == 0 {
        return true;
    }

    // SAFETY: caller has already page-aligned `ptr`/`bytes`, and the
    // range was previously returned by `reserve`.
    let result = unsafe { libc::mprotect(ptr as *mut _, bytes, libc::PROT_READ | libc::PROT_WRITE) };
    result == 0
}

pub fn decommit(ptr: *mut u8, bytes: usize) {
    if bytes == 0 {
        return;
    }

    // SAFETY: same range as `commit`; dropping to PROT_NONE keeps the
    // range reserved while discarding its backing pages via MADV_DONTNEED.
    unsafe {
        let result = libc::mprotect(ptr as *mut _, bytes, libc::PROT_NONE);
        debug_assert_eq!(result, 0, "mprotect(PROT_NONE) failed during decommit");
        libc::madvise(ptr as *mut _, bytes, libc::MADV_DONTNEED);
    }
}

pub fn release(ptr: *mut u8, bytes: usize) {
    // SAFETY: `ptr`/`bytes` describe a range originally obtained from
    // `reserve`.
    unsafe {
        libc::munmap(ptr as *mut _, bytes);
    }
}
