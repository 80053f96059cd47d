//! A unit of work plus an optional parent it notifies on completion.
//!
//! A task created with [`Task::with_parent`] increments the parent's
//! dependency counter when it is built and decrements it when it finishes;
//! the parent becomes eligible to run only once every child created this
//! way has completed. This is the source's fork-join shape (a task waits on
//! `unsatisfied_dependencies`, each completing child counts one down)
//! turned into something the type system can hand out safely: a plain
//! `Arc<Task>` instead of a `ms_task*` with manual lifetime rules.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::sync::Mutex;

type Handler = Box<dyn FnOnce() + Send>;

pub struct Task {
    handler: Mutex<Option<Handler>>,
    parent: Option<TaskHandle>,
    unsatisfied_dependencies: AtomicU32,
}

/// A reference-counted handle to a scheduled task. Cheap to clone; the
/// queue, the parent pointer, and the caller can all hold one at once.
pub type TaskHandle = Arc<Task>;

impl Task {
    /// Build a task with no dependencies; it is eligible to run as soon as
    /// it is dispatched.
    pub fn new(handler: impl FnOnce() + Send + 'static) -> TaskHandle {
        Arc::new(Task {
            handler: Mutex::new(Some(Box::new(handler))),
            parent: None,
            unsatisfied_dependencies: AtomicU32::new(0),
        })
    }

    /// Build a task that is a dependency of `parent`. `parent`'s
    /// unsatisfied-dependency count is incremented here, so it will not
    /// become eligible until this task (and every other child built this
    /// way) has run.
    pub fn with_parent(handler: impl FnOnce() + Send + 'static, parent: TaskHandle) -> TaskHandle {
        parent.unsatisfied_dependencies.fetch_add(1, Ordering::Relaxed);
        Arc::new(Task {
            handler: Mutex::new(Some(Box::new(handler))),
            parent: Some(parent),
            unsatisfied_dependencies: AtomicU32::new(0),
        })
    }

    /// Whether every dependency of this task has completed.
    pub fn is_eligible(&self) -> bool {
        self.unsatisfied_dependencies.load(Ordering::Acquire) == 0
    }

    /// Run the handler exactly once, then notify the parent if there is
    /// one. Returns the parent, if this was the last outstanding child and
    /// the parent is now itself eligible -- the caller (the thread pool's
    /// worker loop) is responsible for re-enqueueing it.
    pub(crate) fn run(&self) -> Option<TaskHandle> {
        if let Some(handler) = self.handler.lock().take() {
            handler();
        }

        let parent = self.parent.as_ref()?;
        let remaining = parent.unsatisfied_dependencies.fetch_sub(1, Ordering::Release) - 1;
        if remaining == 0 {
            Some(Arc::clone(parent))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    #[test]
    fn task_with_no_parent_is_immediately_eligible() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        let task = Task::new(move || ran2.store(true, Ordering::SeqCst));
        assert!(task.is_eligible());
        assert!(task.run().is_none());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[test]
    fn parent_becomes_eligible_only_after_every_child_runs() {
        let parent = Task::new(|| {});
        let child_a = Task::with_parent(|| {}, Arc::clone(&parent));
        let child_b = Task::with_parent(|| {}, Arc::clone(&parent));

        assert!(!parent.is_eligible());
        assert!(child_a.run().is_none(), "one child still outstanding");
        assert!(!parent.is_eligible());
        assert!(child_b.run().is_some(), "last child makes the parent eligible");
        assert!(parent.is_eligible());
    }

    #[test]
    fn handler_runs_at_most_once() {
        let count = Arc::new(AtomicU32::new(0));
        let count2 = Arc::clone(&count);
        let task = Task::new(move || {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        task.run();
        task.run();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
