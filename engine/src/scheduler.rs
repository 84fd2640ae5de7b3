//! Execution-context injection for callback delivery.
//!
//! Controllers, listeners and trackers never assume a particular thread.
//! Instead they are handed a [`Scheduler`] at construction and route every
//! store-change callback and asynchronous completion through it before
//! touching their own state or invoking consumer callbacks. Embedders with
//! a dedicated UI context inject a queueing scheduler that pumps jobs on
//! that context; everything else (and every test) uses the synchronous
//! [`InlineScheduler`].

/// A deferred unit of work.
pub type Job = Box<dyn FnOnce() + Send>;

/// Schedules jobs onto the execution context that owns read-model state.
pub trait Scheduler: Send + Sync {
    /// Enqueue a job. Implementations decide where and when it runs;
    /// jobs from one source must run in the order they were scheduled.
    fn schedule(&self, job: Job);
}

/// Runs every job immediately on the calling thread.
///
/// This keeps delivery synchronous with the store commit, which is exactly
/// what deterministic tests want. Production embedders that mutate the
/// store from background threads should inject a queueing scheduler
/// instead, so consumer callbacks land on their main context.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineScheduler;

impl InlineScheduler {
    /// Create an inline scheduler.
    pub fn new() -> Self {
        Self
    }
}

impl Scheduler for InlineScheduler {
    fn schedule(&self, job: Job) {
        job();
    }
}
