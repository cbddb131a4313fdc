//! Commonly used types, for glob import.

pub use crate::config::{PoolConfig, PoolConfigBuilder};
pub use crate::error::{BoxError, Error, Result};
pub use crate::executor::{PoolStats, TaskRunner, ThreadPool};
pub use crate::task::{
    BoxedTask, LambdaTask, Task, TerminationFlag, TickFn, TickHandler, TickInterval, TickingTask,
};
