//! A non-reentrant mutex, the thin-wrapper flavor of lock from spec §5.
//! Backed by the platform's native mutex (`pthread_mutex_t` /
//! `CRITICAL_SECTION` on the source side; `std::sync::Mutex` gives the
//! same non-reentrant, OS-blocking semantics here without re-deriving a
//! libc/winapi FFI surface for something the standard library already
//! wraps correctly).

use std::sync::{self, MutexGuard, TryLockError};

pub struct Mutex<T>(sync::Mutex<T>);

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Self(sync::Mutex::new(value))
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        match self.0.try_lock() {
            Ok(guard) => Some(guard),
            Err(TryLockError::WouldBlock) => None,
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        }
    }
}
