//! A queue of ready-to-run tasks shared by a thread pool's workers.
//!
//! The source guards its ring with a reader-writer lock and takes the
//! *read* side for dequeue, reasoning that popping one slot is a cheap,
//! "mostly independent" operation -- but `ms_ring_dequeue` mutates
//! `write_index` and `count` through the same unsynchronised fields
//! `ms_ring_enqueue` does, so two concurrent dequeues (both holding only a
//! read lock) can race on the same slot. Both operations take the write
//! lock here; a handful of worker threads polling a shared queue is not
//! throughput-sensitive enough to need single-writer/many-reader access in
//! the first place.

use crate::concurrency::task::TaskHandle;
use crate::ring::Ring;
use crate::sync::RwLock;
use crate::Result;

pub struct TaskQueue {
    ring: RwLock<Ring<TaskHandle>>,
}

impl TaskQueue {
    /// `capacity` must be a nonzero power of two (see [`Ring::new`]).
    pub fn new(capacity: u32) -> Result<Self> {
        Ok(Self { ring: RwLock::new(Ring::new(capacity)?) })
    }

    /// Enqueue one task. Returns `false` if the queue is full.
    pub fn enqueue(&self, task: TaskHandle) -> bool {
        self.ring.write().enqueue(task).is_ok()
    }

    /// Enqueue every task in `tasks`, or none of them: if the queue does
    /// not have room for all of them, nothing is enqueued.
    pub fn enqueue_many(&self, tasks: Vec<TaskHandle>) -> bool {
        let mut ring = self.ring.write();
        if ring.capacity() - ring.len() < tasks.len() as u32 {
            return false;
        }
        for task in tasks {
            ring.enqueue(task).expect("capacity already checked under the same write lock");
        }
        true
    }

    pub fn dequeue(&self) -> Option<TaskHandle> {
        self.ring.write().dequeue()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::task::Task;

    #[test]
    fn fifo_ordering_holds() {
        let queue = TaskQueue::new(4).unwrap();
        let a = Task::new(|| {});
        let b = Task::new(|| {});
        queue.enqueue(std::sync::Arc::clone(&a));
        queue.enqueue(std::sync::Arc::clone(&b));
        assert!(std::sync::Arc::ptr_eq(&queue.dequeue().unwrap(), &a));
        assert!(std::sync::Arc::ptr_eq(&queue.dequeue().unwrap(), &b));
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn enqueue_many_is_all_or_nothing() {
        let queue = TaskQueue::new(2).unwrap();
        assert!(queue.enqueue(Task::new(|| {})));
        let rejected = queue.enqueue_many(vec![Task::new(|| {}), Task::new(|| {})]);
        assert!(!rejected, "only one slot free, two tasks requested");
        assert_eq!(queue.dequeue().is_some(), true);
        assert!(queue.dequeue().is_none());
    }
}
