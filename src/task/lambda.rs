//! Closure-backed [`Task`].

use super::{BoxedTask, Task, TerminationFlag};
use crate::error::{Error, Result};
use parking_lot::Mutex;

type WorkFn = Box<dyn FnMut(&TerminationFlag) -> Result<()> + Send>;
type FinishFn = Box<dyn FnMut() + Send>;
type TerminateFn = Box<dyn Fn() + Send + Sync>;
type ExceptionFn = Box<dyn FnMut(Error) -> Result<()> + Send>;

/// A task assembled from closures.
///
/// Only the work closure is required. Finishing and terminate hooks default
/// to no-ops, the exception handler defaults to re-raising.
///
/// ```
/// use strand_rs::task::{LambdaTask, Task};
///
/// let task = LambdaTask::new(|terminated| {
///     if !terminated.is_requested() {
///         // do the work
///     }
///     Ok(())
/// })
/// .on_finishing(|| println!("done"));
///
/// task.run().unwrap();
/// task.finishing();
/// ```
pub struct LambdaTask {
    flag: TerminationFlag,
    work: Mutex<WorkFn>,
    finish: Mutex<Option<FinishFn>>,
    terminate: Option<TerminateFn>,
    exception: Mutex<Option<ExceptionFn>>,
}

impl LambdaTask {
    /// Task running `work` each time it is run.
    pub fn new<W>(work: W) -> Self
    where
        W: FnMut(&TerminationFlag) -> Result<()> + Send + 'static,
    {
        Self {
            flag: TerminationFlag::new(),
            work: Mutex::new(Box::new(work)),
            finish: Mutex::new(None),
            terminate: None,
            exception: Mutex::new(None),
        }
    }

    /// Hook run by [`Task::finishing`].
    pub fn on_finishing<F>(mut self, f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.finish = Mutex::new(Some(Box::new(f)));
        self
    }

    /// Hook run once, on the first termination request.
    pub fn on_terminate<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.terminate = Some(Box::new(f));
        self
    }

    /// Handler for errors and panics from `work`. Return `Ok(())` to swallow.
    pub fn on_exception<F>(mut self, f: F) -> Self
    where
        F: FnMut(Error) -> Result<()> + Send + 'static,
    {
        self.exception = Mutex::new(Some(Box::new(f)));
        self
    }

    /// Box the task for a runner or pool.
    pub fn boxed(self) -> BoxedTask {
        Box::new(self)
    }

    /// Whether termination has been requested.
    pub fn is_terminated(&self) -> bool {
        self.flag.is_requested()
    }
}

impl Task for LambdaTask {
    fn run(&self) -> Result<()> {
        let mut work = self.work.lock();
        (*work)(&self.flag)
    }

    fn finishing(&self) {
        if let Some(f) = self.finish.lock().as_mut() {
            f();
        }
    }

    fn terminate(&self) {
        if self.flag.request() {
            if let Some(f) = &self.terminate {
                f();
            }
        }
    }

    fn on_exception(&self, error: Error) -> Result<()> {
        match self.exception.lock().as_mut() {
            Some(handler) => handler(error),
            None => Err(error),
        }
    }
}

impl std::fmt::Debug for LambdaTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LambdaTask")
            .field("terminated", &self.flag.is_requested())
            .field("has_finish", &self.finish.lock().is_some())
            .field("has_terminate", &self.terminate.is_some())
            .finish()
    }
}
