//! The three lock primitives spec'd for this crate: a non-reentrant
//! mutex, a cache-line-aligned spinlock, and a writer-preferred
//! reader-writer lock. These are spec deliverables in their own right,
//! not infrastructure borrowed off the shelf — see spec §5.

mod backoff;
mod mutex;
mod rwlock;
mod spinlock;

pub use backoff::Backoff;
pub use mutex::Mutex;
pub use rwlock::RwLock;
pub use spinlock::SpinLock;
