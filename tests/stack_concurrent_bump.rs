//! Scenario 6: many threads bumping a shared stack concurrently produce
//! disjoint address ranges, and a `clear()` at quiescence resets `used()`
//! to zero.

use std::sync::Arc;
use std::thread;

use moonsugar::allocator::{Stack, StackConfig};

#[test]
fn concurrent_bumps_are_disjoint_and_clear_resets_at_quiescence() {
    const THREADS: usize = 64;
    const PER_THREAD: usize = 16;
    const CHUNK: u64 = 1024;

    let stack = Arc::new(
        Stack::new(StackConfig { size: 4 * 1024 * 1024, decommit_threshold: 64 * 1024 }).unwrap(),
    );

    let mut handles = Vec::with_capacity(THREADS);
    for _ in 0..THREADS {
        let stack = Arc::clone(&stack);
        handles.push(thread::spawn(move || {
            let mut ptrs = Vec::with_capacity(PER_THREAD);
            for _ in 0..PER_THREAD {
                ptrs.push(stack.allocate(CHUNK, 16).unwrap().as_ptr() as usize);
            }
            ptrs
        }));
    }

    let mut all: Vec<usize> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
    assert_eq!(all.len(), THREADS * PER_THREAD);

    all.sort_unstable();
    for window in all.windows(2) {
        assert!(
            window[1] >= window[0] + CHUNK as usize,
            "two bumped ranges overlap: {} and {}",
            window[0],
            window[1]
        );
    }

    assert_eq!(stack.used(), (THREADS * PER_THREAD) as u64 * CHUNK);

    stack.clear();
    assert_eq!(stack.used(), 0);
}
