//! A small fork-join task scheduler: a fixed pool of worker threads pulls
//! [`Task`]s off a shared [`TaskQueue`], running each only once every
//! dependency it was created with has completed.

mod task;
mod task_queue;
mod thread_pool;

pub use task::{Task, TaskHandle};
pub use task_queue::TaskQueue;
pub use thread_pool::{ThreadPool, ThreadPoolConfig};
