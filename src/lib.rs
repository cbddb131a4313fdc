//! strand - cooperative task runners on plain OS threads
//!
//! A small concurrency runtime for programs that push units of work onto
//! background threads and want completion callbacks back on their own
//! (controlling) thread.
//!
//! # Quick Start
//!
//! ```no_run
//! use strand_rs::prelude::*;
//!
//! let pool = ThreadPool::new(2).unwrap();
//!
//! let task = LambdaTask::new(|terminated| {
//!     if !terminated.is_requested() {
//!         println!("working on a pool thread");
//!     }
//!     Ok(())
//! })
//! .on_finishing(|| println!("back on the controlling thread"));
//!
//! pool.add_task(task.boxed()).unwrap();
//!
//! // somewhere in the application's main loop
//! pool.update();
//!
//! pool.terminate();
//! ```
//!
//! # Pieces
//!
//! - [`Task`]: the unit of work, with cooperative termination
//! - [`TaskRunner`]: runs one task at a time on the thread driving its loop
//! - [`ThreadPool`]: grows runners on demand up to a limit, queues the rest,
//!   and delivers `finishing` callbacks from [`ThreadPool::update`]
//! - [`TickingTask`]: a task that ticks periodically until terminated
//!
//! Cancellation is cooperative only. A task that never checks its
//! termination flag keeps its worker, and [`ThreadPool::terminate`], busy
//! forever.

// Lint configuration
#![warn(missing_docs, missing_debug_implementations)]

pub mod config;
pub mod error;
pub mod executor;
pub mod prelude;
pub mod task;

// Re-export key types at crate root
pub use config::{PoolConfig, PoolConfigBuilder};
pub use error::{BoxError, Error, Result};
pub use executor::{PoolStats, TaskRunner, ThreadPool};
pub use task::{BoxedTask, LambdaTask, Task, TerminationFlag, TickingTask};
