//! Lazily grown pool of task runners.

use super::runner::{RunnerId, TaskRunner};
use crate::config::PoolConfig;
use crate::error::{Error, Result};
use crate::task::{BoxedTask, LambdaTask, TerminationFlag};
use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::mem;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, warn};

/// A pool of [`TaskRunner`]s that grows on demand up to a fixed maximum.
///
/// Tasks go to an idle worker when there is one, to a new worker thread while
/// the pool is below its maximum, and otherwise wait in a FIFO queue. Finished
/// tasks are parked until the controlling thread calls
/// [`update`](Self::update), which is the only place `Task::finishing` runs.
///
/// A worker whose task re-raises an error is gone for good and is not
/// replaced, so the pool's effective concurrency drops by one. Watch
/// [`live_threads`](Self::live_threads) or [`stats`](Self::stats) if that
/// matters.
pub struct ThreadPool {
    shared: Arc<Shared>,
    finished_rx: Receiver<BoxedTask>,
    config: PoolConfig,
}

struct Shared {
    state: Mutex<PoolState>,
    finished_tx: Sender<BoxedTask>,
    max_threads: usize,
    threads_spawned: AtomicUsize,
    tasks_completed: AtomicU64,
    failed_workers: AtomicUsize,
}

#[derive(Default)]
struct PoolState {
    workers: Vec<WorkerHandle>,
    idle: VecDeque<RunnerId>,
    pending: VecDeque<BoxedTask>,
    terminated: bool,
}

struct WorkerHandle {
    runner: Arc<TaskRunner>,
    thread: Option<JoinHandle<()>>,
}

/// Point-in-time view of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Thread limit.
    pub max_threads: usize,
    /// Worker threads started over the pool's lifetime.
    pub spawned_threads: usize,
    /// Workers that have not died.
    pub live_threads: usize,
    /// Workers waiting for a task.
    pub idle_threads: usize,
    /// Tasks queued for a free worker.
    pub pending_tasks: usize,
    /// Finished tasks waiting for [`ThreadPool::update`].
    pub finishing_tasks: usize,
    /// Tasks that reached the finish-queue.
    pub tasks_completed: u64,
    /// Workers ended by an unhandled task error.
    pub failed_workers: usize,
}

impl ThreadPool {
    /// Pool allowing at most `max_threads` worker threads.
    pub fn new(max_threads: usize) -> Result<Self> {
        let config = PoolConfig::builder().max_threads(max_threads).build()?;
        Self::with_config(config)
    }

    /// Pool built from `config`. No thread is spawned until the first task.
    pub fn with_config(config: PoolConfig) -> Result<Self> {
        config.validate()?;
        let max_threads = config.worker_threads();

        let (finished_tx, finished_rx) = unbounded();

        let shared = Arc::new(Shared {
            state: Mutex::new(PoolState::default()),
            finished_tx,
            max_threads,
            threads_spawned: AtomicUsize::new(0),
            tasks_completed: AtomicU64::new(0),
            failed_workers: AtomicUsize::new(0),
        });

        Ok(Self {
            shared,
            finished_rx,
            config,
        })
    }

    /// Submit a task. Ownership moves into the pool.
    ///
    /// Fails with [`Error::PoolTerminated`] after [`terminate`](Self::terminate),
    /// and with [`Error::NoLiveWorkers`] when the pool is at its thread limit
    /// and every worker has died. The task is dropped in both cases.
    ///
    /// If a new worker thread cannot be spawned the task waits in the queue
    /// for a live worker. With no live worker the spawn failure is returned
    /// as [`Error::Io`] and the pool stays usable.
    pub fn add_task(&self, task: BoxedTask) -> Result<()> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;

        if state.terminated {
            return Err(Error::PoolTerminated);
        }

        while let Some(id) = state.idle.pop_front() {
            let idle = state
                .workers
                .iter()
                .find(|w| w.runner.id() == id && !w.runner.is_terminated());
            if let Some(worker) = idle {
                worker.runner.assign_task(task);
                return Ok(());
            }
        }

        let any_live = state.workers.iter().any(|w| !w.runner.is_terminated());

        if state.workers.len() < self.shared.max_threads {
            match self.spawn_worker(state.workers.len()) {
                Ok(worker) => {
                    worker.runner.assign_task(task);
                    state.workers.push(worker);
                    return Ok(());
                }
                // a running worker will pick it up from the queue
                Err(err) if any_live => {
                    warn!(error = %err, "queueing task after failed worker spawn");
                }
                Err(err) => return Err(err),
            }
        } else if !any_live {
            return Err(Error::NoLiveWorkers);
        }

        state.pending.push_back(task);
        Ok(())
    }

    /// Submit a closure as a task.
    pub fn execute<F>(&self, f: F) -> Result<()>
    where
        F: FnMut(&TerminationFlag) -> Result<()> + Send + 'static,
    {
        self.add_task(LambdaTask::new(f).boxed())
    }

    /// Deliver `finishing` for every task that completed so far, in the order
    /// they completed, on the calling thread. Returns how many were delivered.
    pub fn update(&self) -> usize {
        let mut delivered = 0;
        for task in self.finished_rx.try_iter() {
            task.finishing();
            delivered += 1;
        }
        delivered
    }

    /// Stop every worker and join its thread.
    ///
    /// Running tasks are asked to terminate and must honour the request for
    /// this to return. Tasks still waiting for a worker are dropped. Tasks
    /// that already finished stay queued for [`update`](Self::update).
    pub fn terminate(&self) {
        let (workers, pending) = {
            let mut state = self.shared.state.lock();
            state.terminated = true;
            state.idle.clear();
            (mem::take(&mut state.workers), mem::take(&mut state.pending))
        };

        if !pending.is_empty() {
            debug!(count = pending.len(), "dropping tasks that never started");
        }
        drop(pending);

        for worker in &workers {
            worker.runner.terminate_task();
        }

        for mut worker in workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    error!(runner = worker.runner.id(), "worker thread panicked");
                }
            }
            if worker.runner.take_task().is_some() {
                debug!(runner = worker.runner.id(), "dropping task that never started");
            }
        }
    }

    /// Whether [`terminate`](Self::terminate) has been called.
    pub fn is_terminated(&self) -> bool {
        self.shared.state.lock().terminated
    }

    /// The thread limit.
    pub fn max_threads(&self) -> usize {
        self.shared.max_threads
    }

    /// Worker threads currently owned by the pool, dead or alive.
    pub fn num_threads(&self) -> usize {
        self.shared.state.lock().workers.len()
    }

    /// Workers that have not died.
    pub fn live_threads(&self) -> usize {
        self.shared
            .state
            .lock()
            .workers
            .iter()
            .filter(|w| !w.runner.is_terminated())
            .count()
    }

    /// Tasks queued for a free worker.
    pub fn pending_tasks(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    /// Snapshot of the pool's counters.
    pub fn stats(&self) -> PoolStats {
        let state = self.shared.state.lock();
        PoolStats {
            max_threads: self.shared.max_threads,
            spawned_threads: self.shared.threads_spawned.load(Ordering::Relaxed),
            live_threads: state
                .workers
                .iter()
                .filter(|w| !w.runner.is_terminated())
                .count(),
            idle_threads: state.idle.len(),
            pending_tasks: state.pending.len(),
            finishing_tasks: self.finished_rx.len(),
            tasks_completed: self.shared.tasks_completed.load(Ordering::Relaxed),
            failed_workers: self.shared.failed_workers.load(Ordering::Relaxed),
        }
    }

    /// The config the pool was built from.
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn spawn_worker(&self, index: usize) -> Result<WorkerHandle> {
        let runner = Arc::new(TaskRunner::new());

        let name = format!("{}-{}", self.config.thread_name_prefix, index);
        let mut builder = thread::Builder::new().name(name);
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        let shared = self.shared.clone();
        let worker_runner = runner.clone();
        let thread = builder
            .spawn(move || {
                let result = worker_runner.run_loop(|runner, task| shared.complete(runner, task));
                if let Err(err) = result {
                    shared.worker_failed(&worker_runner, err);
                }
            })
            .map_err(|e| {
                error!(error = %e, "failed to spawn worker thread");
                Error::Io(e)
            })?;

        self.shared.threads_spawned.fetch_add(1, Ordering::Relaxed);
        debug!(runner = runner.id(), index, "spawned worker thread");

        Ok(WorkerHandle {
            runner,
            thread: Some(thread),
        })
    }
}

impl Shared {
    // completion hook, runs on the worker thread
    fn complete(&self, runner: &TaskRunner, task: BoxedTask) -> Result<Option<BoxedTask>> {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.finished_tx
            .send(task)
            .map_err(|_| Error::executor("finish queue disconnected"))?;

        let mut state = self.state.lock();
        match state.pending.pop_front() {
            Some(next) => Ok(Some(next)),
            None => {
                state.idle.push_back(runner.id());
                Ok(None)
            }
        }
    }

    fn worker_failed(&self, runner: &TaskRunner, err: Error) {
        error!(runner = runner.id(), error = %err, "worker terminated by unhandled task error");
        self.failed_workers.fetch_add(1, Ordering::Relaxed);

        let stranded = {
            let mut state = self.state.lock();
            state.idle.retain(|id| *id != runner.id());

            let saturated = !state.workers.is_empty() && state.workers.len() >= self.max_threads;
            if saturated && state.workers.iter().all(|w| w.runner.is_terminated()) {
                mem::take(&mut state.pending)
            } else {
                VecDeque::new()
            }
        };

        if !stranded.is_empty() {
            warn!(
                count = stranded.len(),
                "every worker has failed, dropping tasks that can no longer run"
            );
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}
