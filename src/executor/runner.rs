//! Single task runner: one task at a time, one thread running the loop.

use super::panic_handler::catch_panic;
use crate::error::Result;
use crate::task::BoxedTask;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, warn};

/// Process-unique runner identifier.
pub type RunnerId = u64;

static NEXT_RUNNER_ID: AtomicU64 = AtomicU64::new(1);

// stats for each runner
#[derive(Debug, Default)]
struct RunnerState {
    tasks_executed: AtomicU64,
    tasks_failed: AtomicU64,
}

/// Counters for one runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerStats {
    /// Tasks whose `run` returned, successfully or not.
    pub tasks_executed: u64,
    /// Tasks whose `run` returned an error or panicked.
    pub tasks_failed: u64,
}

/// Runs tasks one at a time on whichever thread calls [`TaskRunner::run_loop`].
///
/// Any thread may hand the runner a task with [`assign_task`](Self::assign_task)
/// or stop it with [`terminate_task`](Self::terminate_task). The loop parks on a
/// condition variable while it has nothing to do.
///
/// Once [`is_terminated`](Self::is_terminated) reports `true` the runner is done
/// for good: later assignments are dropped without running.
pub struct TaskRunner {
    id: RunnerId,
    // assigned but not yet started
    slot: Mutex<Option<BoxedTask>>,
    ready: Condvar,
    // the task inside `Task::run`, reachable only for `terminate`
    running: Mutex<Option<Arc<BoxedTask>>>,
    terminating: AtomicBool,
    terminated: AtomicBool,
    state: RunnerState,
}

impl TaskRunner {
    /// Idle runner with a fresh id.
    pub fn new() -> Self {
        Self {
            id: NEXT_RUNNER_ID.fetch_add(1, Ordering::Relaxed),
            slot: Mutex::new(None),
            ready: Condvar::new(),
            running: Mutex::new(None),
            terminating: AtomicBool::new(false),
            terminated: AtomicBool::new(false),
            state: RunnerState::default(),
        }
    }

    /// This runner's id.
    pub fn id(&self) -> RunnerId {
        self.id
    }

    /// Hand a task to the loop. Dropped without running if the runner has
    /// already terminated.
    pub fn assign_task(&self, task: BoxedTask) {
        if self.is_terminated() {
            debug!(runner = self.id, "runner terminated, discarding assigned task");
            return;
        }

        let mut slot = self.slot.lock();
        if slot.replace(task).is_some() {
            warn!(runner = self.id, "assignment replaced a task that never started");
        }
        self.ready.notify_all();
    }

    /// Take back a task that was assigned but never started.
    pub fn take_task(&self) -> Option<BoxedTask> {
        self.slot.lock().take()
    }

    /// Ask the loop to exit and signal the current task to stop.
    ///
    /// Idempotent. Calling it before the loop starts makes the loop return
    /// straight away. A running task is signalled without holding any runner
    /// lock, so its `terminate` may block until `run` has returned. The task
    /// is not handed to the completion hook until that call is done.
    pub fn terminate_task(&self) {
        self.terminating.store(true, Ordering::SeqCst);

        {
            let slot = self.slot.lock();
            if let Some(task) = slot.as_ref() {
                task.terminate();
            }
            self.ready.notify_all();
        }

        let running = self.running.lock().clone();
        if let Some(task) = running {
            task.terminate();
        }
    }

    /// Whether [`terminate_task`](Self::terminate_task) has been called.
    pub fn is_terminating(&self) -> bool {
        self.terminating.load(Ordering::SeqCst)
    }

    /// Whether the loop has exited for good.
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Snapshot of this runner's counters.
    pub fn stats(&self) -> RunnerStats {
        RunnerStats {
            tasks_executed: self.state.tasks_executed.load(Ordering::Relaxed),
            tasks_failed: self.state.tasks_failed.load(Ordering::Relaxed),
        }
    }

    /// Serve tasks until terminated.
    ///
    /// After each task, `on_finished` receives the runner and the finished
    /// task. Returning `Ok(Some(task))` runs that task next without parking,
    /// `Ok(None)` goes back to waiting for an assignment.
    ///
    /// An error re-raised by `Task::on_exception`, or returned by
    /// `on_finished`, ends the loop. Panics in either are caught and reported
    /// as [`Error::TaskPanicked`](crate::error::Error::TaskPanicked). In every case the runner is marked
    /// terminated before this returns.
    pub fn run_loop<F>(&self, mut on_finished: F) -> Result<()>
    where
        F: FnMut(&TaskRunner, BoxedTask) -> Result<Option<BoxedTask>>,
    {
        let result = catch_panic(|| self.serve(&mut on_finished)).unwrap_or_else(|p| Err(p.into()));
        self.terminated.store(true, Ordering::Release);
        result
    }

    fn serve<F>(&self, on_finished: &mut F) -> Result<()>
    where
        F: FnMut(&TaskRunner, BoxedTask) -> Result<Option<BoxedTask>>,
    {
        let mut next: Option<BoxedTask> = None;

        loop {
            let task = match next.take() {
                Some(task) if !self.is_terminating() => task,
                Some(task) => {
                    // handed back by the hook but never started
                    *self.slot.lock() = Some(task);
                    break;
                }
                None => match self.wait_for_task() {
                    Some(task) => task,
                    None => break,
                },
            };

            let task = self.run_task(task)?;
            next = on_finished(self, task)?;
        }

        Ok(())
    }

    fn wait_for_task(&self) -> Option<BoxedTask> {
        let mut slot = self.slot.lock();
        loop {
            if self.is_terminating() {
                return None;
            }
            if let Some(task) = slot.take() {
                return Some(task);
            }
            self.ready.wait(&mut slot);
        }
    }

    fn run_task(&self, task: BoxedTask) -> Result<BoxedTask> {
        let task = Arc::new(task);
        *self.running.lock() = Some(task.clone());

        // termination may have raced with publishing the task
        if self.is_terminating() {
            task.terminate();
        }

        let outcome = catch_panic(|| task.run()).unwrap_or_else(|p| Err(p.into()));

        self.running.lock().take();
        self.state.tasks_executed.fetch_add(1, Ordering::Relaxed);

        if let Err(err) = outcome {
            self.state.tasks_failed.fetch_add(1, Ordering::Relaxed);
            debug!(runner = self.id, error = %err, "task failed");
            task.on_exception(err)?;
        }

        // terminate_task may still be inside `Task::terminate` on a clone
        let mut task = task;
        loop {
            match Arc::try_unwrap(task) {
                Ok(task) => return Ok(task),
                Err(shared) => {
                    task = shared;
                    thread::yield_now();
                }
            }
        }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        self.terminate_task();
    }
}

impl std::fmt::Debug for TaskRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRunner")
            .field("id", &self.id)
            .field("terminating", &self.is_terminating())
            .field("terminated", &self.is_terminated())
            .field("stats", &self.stats())
            .finish()
    }
}
