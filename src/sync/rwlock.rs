//! A writer-preferred reader-writer lock, per spec §5.
//!
//! Plain `pthread_rwlock_t` / `SRWLOCK` make no starvation guarantee: a
//! steady stream of readers can starve a waiting writer indefinitely.
//! This implementation adds a writers-waiting counter that incoming
//! readers observe and back off on, so a writer that has announced
//! intent to acquire is guaranteed to get in ahead of readers that show
//! up after it.

use std::sync::atomic::{AtomicIsize, AtomicUsize, Ordering};

use super::Backoff;

const UNLOCKED: isize = 0;
const WRITE_LOCKED: isize = -1;

pub struct RwLock<T> {
    state: AtomicIsize,
    writers_waiting: AtomicUsize,
    value: std::cell::UnsafeCell<T>,
}

unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub const fn new(value: T) -> Self {
        Self {
            state: AtomicIsize::new(UNLOCKED),
            writers_waiting: AtomicUsize::new(0),
            value: std::cell::UnsafeCell::new(value),
        }
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        let mut backoff = Backoff::new();
        loop {
            // A writer has announced intent; let it through first.
            if self.writers_waiting.load(Ordering::Acquire) > 0 {
                backoff.spin();
                continue;
            }

            let current = self.state.load(Ordering::Relaxed);
            if current < 0 {
                backoff.spin();
                continue;
            }

            if self
                .state
                .compare_exchange_weak(
                    current,
                    current + 1,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                return RwLockReadGuard { lock: self };
            }

            backoff.spin();
        }
    }

    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, T>> {
        if self.writers_waiting.load(Ordering::Acquire) > 0 {
            return None;
        }

        let current = self.state.load(Ordering::Relaxed);
        if current < 0 {
            return None;
        }

        self.state
            .compare_exchange(current, current + 1, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| RwLockReadGuard { lock: self })
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.writers_waiting.fetch_add(1, Ordering::AcqRel);
        let mut backoff = Backoff::new();
        loop {
            if self
                .state
                .compare_exchange_weak(
                    UNLOCKED,
                    WRITE_LOCKED,
                    Ordering::Acquire,
                    Ordering::Relaxed,
                )
                .is_ok()
            {
                break;
            }
            backoff.spin();
        }
        self.writers_waiting.fetch_sub(1, Ordering::AcqRel);
        RwLockWriteGuard { lock: self }
    }

    pub fn try_write(&self) -> Option<RwLockWriteGuard<'_, T>> {
        self.state
            .compare_exchange(UNLOCKED, WRITE_LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| RwLockWriteGuard { lock: self })
    }
}

pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> std::ops::Deref for RwLockReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: holding a read guard guarantees no concurrent writer.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.fetch_sub(1, Ordering::Release);
    }
}

pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> std::ops::Deref for RwLockWriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: holding a write guard guarantees exclusive access.
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> std::ops::DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding a write guard guarantees exclusive access.
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.state.store(UNLOCKED, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_readers() {
        let lock = RwLock::new(42);
        let a = lock.read();
        let b = lock.read();
        assert_eq!(*a, 42);
        assert_eq!(*b, 42);
    }

    #[test]
    fn writer_excludes_readers() {
        let lock = RwLock::new(0);
        {
            let mut w = lock.write();
            *w = 7;
        }
        assert_eq!(*lock.read(), 7);
    }

    #[test]
    fn many_writers_increment_exactly_once_each() {
        let lock = Arc::new(RwLock::new(0u64));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..500 {
                    *lock.write() += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.read(), 4000);
    }
}
