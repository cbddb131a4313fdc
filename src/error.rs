//! Error types for strand.

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed error produced by a task's work function.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised by runners, pools and tasks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Internal runner or pool failure.
    #[error("executor error: {0}")]
    Executor(String),

    /// Invalid [`PoolConfig`](crate::config::PoolConfig).
    #[error("config error: {0}")]
    Config(String),

    /// Error returned by a task's own work.
    #[error("task failed: {0}")]
    TaskFailed(#[source] BoxError),

    /// A task or completion hook panicked; carries the panic message.
    #[error("task panicked: {0}")]
    TaskPanicked(String),

    /// The pool no longer accepts tasks.
    #[error("thread pool already terminated")]
    PoolTerminated,

    /// The pool is at its thread limit and every worker has died.
    #[error("no live worker left to run the task")]
    NoLiveWorkers,

    /// Spawning a worker thread failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build an [`Error::Executor`].
    pub fn executor<S: Into<String>>(msg: S) -> Self {
        Error::Executor(msg.into())
    }

    /// Build an [`Error::Config`].
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }

    /// Wrap an arbitrary error raised by a task's work.
    pub fn task<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::TaskFailed(err.into())
    }

    /// Borrow the error raised by the task as a concrete type, if it is one.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        match self {
            Error::TaskFailed(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// Whether this error came from a caught panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, Error::TaskPanicked(_))
    }
}
