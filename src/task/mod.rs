//! The task contract and its built-in implementations.
//!
//! A [`Task`] is a unit of cancellable work. It is owned by exactly one party
//! at a time: the code that built it, a [`TaskRunner`](crate::executor::TaskRunner),
//! or the finish-queue of a [`ThreadPool`](crate::executor::ThreadPool).

pub mod lambda;
pub mod ticking;

pub use lambda::LambdaTask;
pub use ticking::{TickFn, TickHandler, TickInterval, TickingTask};

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};

/// Owned, type-erased task as it travels between runners and queues.
pub type BoxedTask = Box<dyn Task>;

/// Cooperative termination flag owned by a task.
///
/// Once requested it stays requested.
#[derive(Debug, Default)]
pub struct TerminationFlag {
    requested: AtomicBool,
}

impl TerminationFlag {
    /// Flag in the not-requested state.
    pub fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
        }
    }

    /// Request termination. Returns `true` for the call that flipped the flag.
    pub fn request(&self) -> bool {
        !self.requested.swap(true, Ordering::AcqRel)
    }

    /// Whether termination has been requested.
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// A unit of work run by a [`TaskRunner`](crate::executor::TaskRunner).
///
/// All methods take `&self`: `terminate` may be called from any thread while
/// `run` is in progress on the worker thread, so implementations keep their
/// mutable state behind atomics or locks.
///
/// `run` must poll its termination flag and return promptly once it is set.
/// A task that ignores the flag blocks pool shutdown forever.
pub trait Task: Send + Sync + 'static {
    /// Execute the work once on the calling thread.
    fn run(&self) -> Result<()>;

    /// Completion callback, delivered by [`ThreadPool::update`](crate::executor::ThreadPool::update)
    /// on the controlling thread.
    fn finishing(&self) {}

    /// Request cooperative termination. Idempotent and thread-safe.
    fn terminate(&self);

    /// Called by the runner when `run` failed or panicked.
    ///
    /// Returning the error terminates the runner; returning `Ok(())` swallows
    /// it and the task proceeds to the completion hook as if it succeeded.
    fn on_exception(&self, error: Error) -> Result<()> {
        Err(error)
    }
}

impl std::fmt::Debug for dyn Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}
