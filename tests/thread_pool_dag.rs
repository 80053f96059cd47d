//! Scenario 5: a thread pool with several workers, each parent task
//! depending on one leaf child, must run every leaf before its parent and
//! must run each task exactly once.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use moonsugar::{Task, ThreadPool};
use moonsugar::concurrency::ThreadPoolConfig;

fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !condition() {
        assert!(Instant::now() <= deadline, "condition not met within timeout");
        std::thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn leaves_run_before_their_parents_and_every_task_runs_once() {
    let pool = ThreadPool::new(ThreadPoolConfig { thread_count: 8, task_capacity: 64, ..Default::default() }).unwrap();
    let aggregate = Arc::new(AtomicU32::new(0));
    let parents_done = Arc::new(AtomicU32::new(0));
    let leaves_done_before_any_parent = Arc::new(std::sync::atomic::AtomicBool::new(true));

    let mut children = Vec::new();
    for _ in 0..3 {
        let aggregate = Arc::clone(&aggregate);
        let parents_done = Arc::clone(&parents_done);
        let parent = Task::new(move || {
            aggregate.fetch_add(1, Ordering::SeqCst);
            parents_done.fetch_add(1, Ordering::SeqCst);
        });

        let aggregate = Arc::clone(&aggregate);
        let parents_done = Arc::clone(&parents_done);
        let leaves_done_before_any_parent = Arc::clone(&leaves_done_before_any_parent);
        let child = Task::with_parent(
            move || {
                if parents_done.load(Ordering::SeqCst) > 0 {
                    leaves_done_before_any_parent.store(false, Ordering::SeqCst);
                }
                aggregate.fetch_add(1, Ordering::SeqCst);
            },
            Arc::clone(&parent),
        );

        children.push((parent, child));
    }

    // Children must be dispatched before their parent: the parent starts
    // with a nonzero dependency counter and is not directly dispatchable.
    for (parent, child) in &children {
        assert!(!parent.is_eligible());
        pool.dispatch(Arc::clone(child));
    }

    wait_until(|| aggregate.load(Ordering::SeqCst) == 6, Duration::from_secs(2));

    assert_eq!(aggregate.load(Ordering::SeqCst), 6);
    assert_eq!(parents_done.load(Ordering::SeqCst), 3);
    assert!(
        leaves_done_before_any_parent.load(Ordering::SeqCst),
        "a parent ran before its own child completed"
    );
}
