//! Task execution infrastructure.
//!
//! This module provides the single-task [`TaskRunner`] state machine and the
//! [`ThreadPool`] that multiplexes tasks over a bounded set of runners.

pub mod panic_handler;
pub mod pool;
pub mod runner;

pub use panic_handler::PanicInfo;
pub use pool::{PoolStats, ThreadPool};
pub use runner::{RunnerId, RunnerStats, TaskRunner};
