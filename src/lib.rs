//! Moonsugar is a systems foundation library providing memory management,
//! concurrency primitives, and supporting containers for higher-level
//! services: OS-backed virtual memory reservation, a shared free-list
//! allocator, a page-committing heap, a chained arena, an atomically-bumped
//! stack, a lock-free index pool, a ring buffer, and a task queue backed
//! thread pool with parent/child dependency tracking.

pub mod error;
pub mod time;

pub mod os;
pub mod sync;

pub mod allocator;
pub mod index_pool;
pub mod ring;
pub mod concurrency;

pub use allocator::{AllocationHeader, Arena, Heap, RawAllocator, Stack};
pub use concurrency::{Task, TaskHandle, TaskQueue, ThreadPool};
pub use error::{Error, Result};
pub use index_pool::IndexPool;
pub use ring::Ring;
pub use time::Time;
