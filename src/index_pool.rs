//! A lock-free bitmap of free/in-use indices, one bit per index across
//! 64-bit state blocks, with CAS-based acquire/release.
//!
//! The implementation this is ported from treats the bitmap as
//! single-writer (`this->state[i] = ms_set(...)` is a plain read-modify-
//! write, not atomic) and documents that constraint rather than
//! enforcing it. A bitmap of outstanding handles is exactly the kind of
//! structure worth making genuinely concurrent, so here every block is
//! an `AtomicU64` and both `acquire` and `release` go through a
//! compare-exchange retry loop instead of requiring external locking.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use crate::error::Error;
use crate::Result;

/// Returned by `acquire` when the pool has no free index.
pub const FULL: u32 = u32::MAX;

const STATE_FULL: u64 = u64::MAX;

pub struct IndexPool {
    state: Vec<AtomicU64>,
    item_count: u32,
    last_state: AtomicU32,
}

fn state_block_count(capacity: u32) -> u32 {
    capacity.div_ceil(64)
}

fn find_first_zero_bit(block: u64) -> Option<u32> {
    if block == STATE_FULL {
        None
    } else {
        Some((!block).trailing_zeros())
    }
}

impl IndexPool {
    /// `capacity` must be a multiple of 64.
    pub fn new(capacity: u32) -> Result<Self> {
        if capacity % 64 != 0 {
            return Err(Error::invalid_argument("capacity must be a multiple of 64"));
        }

        let state_count = state_block_count(capacity);
        let state = (0..state_count).map(|_| AtomicU64::new(0)).collect();

        Ok(Self { state, item_count: capacity, last_state: AtomicU32::new(0) })
    }

    pub fn capacity(&self) -> u32 {
        self.item_count
    }

    fn try_acquire_in_block(&self, block_index: u32) -> Option<u32> {
        let block = &self.state[block_index as usize];
        let mut current = block.load(Ordering::Relaxed);

        loop {
            let offset = find_first_zero_bit(current)?;
            let new_value = current | (1u64 << offset);

            match block.compare_exchange_weak(current, new_value, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => {
                    self.last_state.store(block_index, Ordering::Relaxed);
                    return Some(block_index * 64 + offset);
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Rotating search starting from the block a previous acquire last
    /// succeeded in. Returns [`FULL`] if every index is outstanding.
    pub fn acquire(&self) -> u32 {
        let state_count = self.state.len() as u32;
        let last = self.last_state.load(Ordering::Relaxed).min(state_count.saturating_sub(1));

        for i in last..state_count {
            if let Some(index) = self.try_acquire_in_block(i) {
                return index;
            }
        }
        for i in 0..last {
            if let Some(index) = self.try_acquire_in_block(i) {
                return index;
            }
        }

        FULL
    }

    /// Release a previously-acquired index. Returns invalid-argument if
    /// the index was already free (double-release detection).
    pub fn release(&self, item: u32) -> Result<()> {
        let block_index = (item / 64) as usize;
        let offset = item % 64;
        let mask = 1u64 << offset;

        let block = &self.state[block_index];
        let mut current = block.load(Ordering::Relaxed);

        loop {
            let was_set = current & mask != 0;
            let new_value = current & !mask;

            match block.compare_exchange_weak(current, new_value, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => {
                    return if was_set {
                        Ok(())
                    } else {
                        Err(Error::invalid_argument("index was already free"))
                    };
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Grow or shrink the pool. `new_count` must be a multiple of 64.
    /// Not safe to call concurrently with `acquire`/`release`.
    pub fn resize(&mut self, new_count: u32) -> Result<()> {
        if new_count % 64 != 0 {
            return Err(Error::invalid_argument("new_count must be a multiple of 64"));
        }

        let new_state_count = state_block_count(new_count) as usize;
        self.state.resize_with(new_state_count, || AtomicU64::new(0));
        self.item_count = new_count;
        self.last_state.store(0, Ordering::Relaxed);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn acquire_then_release_frees_the_same_index() {
        let pool = IndexPool::new(64).unwrap();
        let idx = pool.acquire();
        assert_ne!(idx, FULL);
        pool.release(idx).unwrap();
        assert_eq!(pool.acquire(), idx);
    }

    #[test]
    fn exhausting_capacity_returns_full() {
        let pool = IndexPool::new(64).unwrap();
        for _ in 0..64 {
            assert_ne!(pool.acquire(), FULL);
        }
        assert_eq!(pool.acquire(), FULL);
    }

    #[test]
    fn double_release_is_reported() {
        let pool = IndexPool::new(64).unwrap();
        let idx = pool.acquire();
        pool.release(idx).unwrap();
        assert!(pool.release(idx).is_err());
    }

    #[test]
    fn concurrent_acquire_never_hands_out_duplicates() {
        let pool = Arc::new(IndexPool::new(1024).unwrap());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(thread::spawn(move || {
                let mut acquired = Vec::new();
                for _ in 0..128 {
                    acquired.push(pool.acquire());
                }
                acquired
            }));
        }

        let mut all: Vec<u32> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        assert!(all.iter().all(|&i| i != FULL));
        all.sort_unstable();
        let before = all.len();
        all.dedup();
        assert_eq!(all.len(), before, "every acquired index must be unique");
    }

    #[test]
    fn resize_grows_capacity_and_resets_rotation_hint() {
        let mut pool = IndexPool::new(64).unwrap();
        for _ in 0..64 {
            pool.acquire();
        }
        assert_eq!(pool.acquire(), FULL);
        pool.resize(128).unwrap();
        assert_ne!(pool.acquire(), FULL);
    }
}
