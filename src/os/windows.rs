//! Windows backend for the OS virtual memory primitives:
//! `VirtualAlloc`/`VirtualProtect`/`VirtualFree`.

use std::ptr::NonNull;
use winapi::um::memoryapi::{VirtualAlloc, VirtualFree};
use winapi::um::sysinfoapi::GetSystemInfo;
use winapi::um::sysinfoapi::SYSTEM_INFO;
use winapi::um::winnt::{MEM_COMMIT, MEM_DECOMMIT, MEM_RELEASE, MEM_RESERVE, PAGE_NOACCESS, PAGE_READWRITE};

pub fn page_size() -> usize {
    // SAFETY: `info` is a plain-old-data struct fully initialized by the call.
    unsafe {
        let mut info: SYSTEM_INFO = std::mem::zeroed();
        GetSystemInfo(&mut info);
        info.dwPageSize as usize
    }
}

pub fn reserve(bytes: usize) -> Option<NonNull<u8>> {
    // SAFETY: requesting a fresh reservation with no backing storage.
    let ptr = unsafe { VirtualAlloc(std::ptr::null_mut(), bytes, MEM_RESERVE, PAGE_NOACCESS) };

    NonNull::new(ptr as *mut u8)
}

pub fn commit(ptr: *mut u8, bytes: usize) -> bool {
    if bytes == 0 {
        return true;
    }

    // SAFETY: `ptr`/`bytes` describe a page-aligned sub-range of a prior
    // reservation.
    let result = unsafe { VirtualAlloc(ptr as *mut _, bytes, MEM_COMMIT, PAGE_READWRITE) };
    !result.is_null()
}

pub fn decommit(ptr: *mut u8, bytes: usize) {
    if bytes == 0 {
        return;
    }

    // SAFETY: same range as `commit`.
    unsafe {
        VirtualFree(ptr as *mut _, bytes, MEM_DECOMMIT);
    }
}

pub fn release(ptr: *mut u8, _bytes: usize) {
    // SAFETY: VirtualFree with MEM_RELEASE requires the original base
    // address and a size of zero.
    unsafe {
        VirtualFree(ptr as *mut _, 0, MEM_RELEASE);
    }
}
