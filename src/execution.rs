use std::num::NonZeroUsize;
use std::sync::Arc;

use log::debug;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

/// worker count used when the platform can't report its available parallelism
const FALLBACK_WORKERS: usize = 2;

/// How the batched operations of a [`Layer`](crate::layer::Layer) schedule their samples.
///
/// A concurrent mode owns its worker pool, so build it once with [`ExecutionMode::concurrent`] and pass it to every batched call.
/// Clones share the same pool.
#[derive(Debug, Clone, Default)]
pub enum ExecutionMode {
    /// process samples one after another on the calling thread
    #[default]
    Sequential,
    /// process samples on a bounded pool of worker threads
    Concurrent(Arc<ThreadPool>),
}

impl ExecutionMode {
    /// Build a concurrent mode backed by a new pool of `max_threads` workers.
    /// When `max_threads` is `None`, the pool is sized to the machine's available parallelism.
    ///
    /// # Errors
    /// Returns the [`ThreadPoolBuildError`] reported by rayon if the worker threads can't be started
    ///
    /// # Examples
    /// ```
    /// use splinenet::execution::ExecutionMode;
    /// let mode = ExecutionMode::concurrent(Some(4))?;
    /// assert_eq!(mode.worker_count(16), 4);
    /// assert_eq!(mode.worker_count(2), 2);
    /// # Ok::<(), rayon::ThreadPoolBuildError>(())
    /// ```
    pub fn concurrent(max_threads: Option<usize>) -> Result<Self, ThreadPoolBuildError> {
        let workers = max_threads
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(FALLBACK_WORKERS)
            })
            .max(1);
        debug!("building pool of {} workers", workers);
        let thread_pool = ThreadPoolBuilder::new().num_threads(workers).build()?;
        Ok(ExecutionMode::Concurrent(Arc::new(thread_pool)))
    }

    /// the number of workers a batch of `batch_size` samples would be spread across. Always at least 1
    pub fn worker_count(&self, batch_size: usize) -> usize {
        let bound = match self {
            ExecutionMode::Sequential => 1,
            ExecutionMode::Concurrent(thread_pool) => thread_pool.current_num_threads(),
        };
        bound.min(batch_size).max(1)
    }
}
