//! Submitting build tasks to worker slots.

use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::config::DispatchMode;
use crate::error::ForestError;
use crate::task::BuildTask;

/// Runs a batch of tasks and waits for all of them.
///
/// `invoke_all` returns one result per task, in task order, and only after
/// every task in the batch has finished.
pub trait BatchExecutor: Send + Sync {
    /// Run every task in `tasks`.
    fn invoke_all<T: BuildTask>(&self, tasks: &[T]) -> Vec<Result<T::Output, ForestError>>;
}

impl<E: BatchExecutor + ?Sized> BatchExecutor for &E {
    fn invoke_all<T: BuildTask>(&self, tasks: &[T]) -> Vec<Result<T::Output, ForestError>> {
        (**self).invoke_all(tasks)
    }
}

/// Executor backed by rayon, on the global pool or a dedicated one.
#[derive(Debug, Default)]
pub struct RayonExecutor {
    pool: Option<rayon::ThreadPool>,
}

impl RayonExecutor {
    /// Run batches on rayon's global pool.
    #[must_use]
    pub fn global() -> Self {
        Self { pool: None }
    }

    /// Run batches on a dedicated pool with `threads` worker slots.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::WorkerPool`] if the pool cannot be built.
    pub fn with_threads(threads: usize) -> Result<Self, ForestError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("grove-worker-{i}"))
            .build()
            .map_err(|source| ForestError::WorkerPool { threads, source })?;
        Ok(Self { pool: Some(pool) })
    }

    /// Number of worker slots batches run on.
    #[must_use]
    pub fn n_threads(&self) -> usize {
        self.pool
            .as_ref()
            .map_or_else(rayon::current_num_threads, rayon::ThreadPool::current_num_threads)
    }
}

impl BatchExecutor for RayonExecutor {
    fn invoke_all<T: BuildTask>(&self, tasks: &[T]) -> Vec<Result<T::Output, ForestError>> {
        let run = || tasks.par_iter().map(BuildTask::run).collect();
        match &self.pool {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }
}

/// Hands tasks to an executor according to a [`DispatchMode`].
#[derive(Debug)]
pub struct Dispatcher<E> {
    executor: E,
    mode: DispatchMode,
}

impl<E: BatchExecutor> Dispatcher<E> {
    /// Create a dispatcher.
    pub fn new(executor: E, mode: DispatchMode) -> Self {
        Self { executor, mode }
    }

    /// Return the dispatch mode.
    #[must_use]
    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// Run every task and collect the outputs in task order.
    ///
    /// In parallel mode all tasks form one batch; in sequential mode each task
    /// is its own batch and nothing after a failed task runs.
    ///
    /// # Errors
    ///
    /// Returns [`ForestError::TaskFailed`] for the lowest-index task that
    /// failed.
    #[instrument(skip_all, fields(n_tasks = tasks.len(), mode = ?self.mode))]
    pub fn dispatch<T: BuildTask>(&self, tasks: &[T]) -> Result<Vec<T::Output>, ForestError> {
        let outputs = match self.mode {
            DispatchMode::Parallel => {
                let mut results = self.executor.invoke_all(tasks).into_iter();
                tasks
                    .iter()
                    .map(|task| {
                        results
                            .next()
                            .unwrap_or(Err(ForestError::MissingTaskResult { tree: task.index() }))
                            .map_err(|e| failed(task, e))
                    })
                    .collect::<Result<Vec<_>, _>>()?
            }
            DispatchMode::Sequential => {
                let mut outputs = Vec::with_capacity(tasks.len());
                for task in tasks {
                    let result = self
                        .executor
                        .invoke_all(std::slice::from_ref(task))
                        .pop()
                        .unwrap_or(Err(ForestError::MissingTaskResult { tree: task.index() }));
                    outputs.push(result.map_err(|e| failed(task, e))?);
                }
                outputs
            }
        };
        info!(n_done = outputs.len(), "batch complete");
        Ok(outputs)
    }
}

fn failed<T: BuildTask>(task: &T, source: ForestError) -> ForestError {
    warn!(tree = task.index(), error = %source, "task failed");
    ForestError::TaskFailed {
        tree: task.index(),
        source: Box::new(source),
    }
}
