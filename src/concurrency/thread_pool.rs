//! A fixed pool of worker threads draining a shared [`TaskQueue`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::task::TaskHandle;
use super::task_queue::TaskQueue;
use crate::error::Error;
use crate::time::Time;
use crate::Result;

#[derive(Debug, Clone, Copy)]
pub struct ThreadPoolConfig {
    pub thread_count: usize,
    /// Capacity of the backing task queue; must be a nonzero power of two.
    pub task_capacity: u32,
    /// How long an idle worker sleeps between queue polls.
    pub poll_interval: Time,
}

impl Default for ThreadPoolConfig {
    fn default() -> Self {
        Self { thread_count: 4, task_capacity: 1024, poll_interval: Time::from_nanos(100) }
    }
}

/// A pool of worker threads that run [`Task`](super::Task)s dispatched to
/// it, in whatever order their dependencies allow.
pub struct ThreadPool {
    tasks: Arc<TaskQueue>,
    must_join: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

fn worker_loop(tasks: Arc<TaskQueue>, must_join: Arc<AtomicBool>, poll_interval: Duration) {
    // The source's relaxed load here is a known race -- a worker can miss
    // a join request for one more poll cycle and dequeue a task nobody
    // will wait on the result of. Acquire/release on both ends of
    // `must_join` (set in `Drop`, read here) closes that window: once
    // `ThreadPool::drop` has stored `true`, every worker observes it no
    // later than its next loop iteration.
    while !must_join.load(Ordering::Acquire) {
        match tasks.dequeue() {
            Some(task) => {
                if task.is_eligible() {
                    if let Some(parent) = task.run() {
                        tasks.enqueue(parent);
                    }
                }
                // An ineligible task dequeued here means it was enqueued
                // before every dependency completed, which `dispatch` and
                // `Task::run`'s own re-enqueue never do; dropping it is a
                // defensive no-op, not a code path this scheduler relies on.
            }
            None => thread::sleep(poll_interval),
        }
    }
}

impl ThreadPool {
    pub fn new(config: ThreadPoolConfig) -> Result<Self> {
        if config.thread_count == 0 {
            return Err(Error::invalid_argument("thread_count must be nonzero"));
        }

        let tasks = Arc::new(TaskQueue::new(config.task_capacity)?);
        let must_join = Arc::new(AtomicBool::new(false));
        let poll_interval = Duration::from(config.poll_interval);
        let mut workers = Vec::with_capacity(config.thread_count);

        for i in 0..config.thread_count {
            let tasks = Arc::clone(&tasks);
            let must_join = Arc::clone(&must_join);
            let worker = thread::Builder::new()
                .name(format!("Worker-{i}"))
                .spawn(move || worker_loop(tasks, must_join, poll_interval))
                .map_err(|_| Error::resource_limit("failed to spawn worker thread"))?;
            workers.push(worker);
        }

        Ok(Self { tasks, must_join, workers })
    }

    /// Submit a task. Tasks with outstanding dependencies are not
    /// enqueued here -- the last completing child enqueues its parent
    /// once it becomes eligible, via [`Task::run`](super::Task).
    /// Returns `false` if the task was eligible but the queue was full.
    pub fn dispatch(&self, task: TaskHandle) -> bool {
        if task.is_eligible() {
            self.tasks.enqueue(task)
        } else {
            true
        }
    }

    pub fn thread_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.must_join.store(true, Ordering::Release);
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}
