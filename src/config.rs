//! Thread pool configuration.

use crate::error::{Error, Result};

/// Upper bound accepted for `max_threads`.
const MAX_THREADS_LIMIT: usize = 1024;

/// Settings for a [`ThreadPool`](crate::executor::ThreadPool).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Thread limit; `None` means one per CPU.
    pub max_threads: Option<usize>,
    /// Worker stack size in bytes; `None` keeps the platform default.
    pub stack_size: Option<usize>,
    /// Worker threads are named `{prefix}-{index}`.
    pub thread_name_prefix: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: None,
            stack_size: Some(2 * 1024 * 1024),
            thread_name_prefix: "strand-worker".to_string(),
        }
    }
}

impl PoolConfig {
    /// Start from the defaults.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::new()
    }

    /// Check the settings, returning [`Error::Config`] on the first bad one.
    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.max_threads {
            if n == 0 {
                return Err(Error::config("max_threads must be > 0"));
            }
            if n > MAX_THREADS_LIMIT {
                return Err(Error::config(format!(
                    "max_threads too large (max {})",
                    MAX_THREADS_LIMIT
                )));
            }
        }

        if let Some(0) = self.stack_size {
            return Err(Error::config("stack_size must be > 0"));
        }

        if self.thread_name_prefix.contains('\0') {
            return Err(Error::config("thread_name_prefix must not contain NUL"));
        }

        Ok(())
    }

    /// Effective thread limit.
    pub fn worker_threads(&self) -> usize {
        self.max_threads.unwrap_or_else(num_cpus::get)
    }
}

/// Builder for [`PoolConfig`].
#[derive(Debug, Default)]
pub struct PoolConfigBuilder {
    config: PoolConfig,
}

impl PoolConfigBuilder {
    /// Builder holding the default settings.
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }

    /// Set the thread limit.
    pub fn max_threads(mut self, n: usize) -> Self {
        self.config.max_threads = Some(n);
        self
    }

    /// Set the worker stack size in bytes.
    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    /// Set the worker thread name prefix.
    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Validate and return the config.
    pub fn build(self) -> Result<PoolConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
