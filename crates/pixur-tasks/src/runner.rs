use std::sync::Arc;

use pixur_db::{DbAdapter, DbError};
use pixur_types::{Context, Status};
use tracing::{debug, warn};

/// Attempts per task, including the first.
pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

/// A unit of work run inside one transaction.
///
/// `run` must be safe to call again from scratch: a retried attempt gets a
/// new transaction, and anything the failed attempt produced is discarded
/// through `reset`.
pub trait Task {
    fn run(&mut self, ctx: &Context) -> Result<(), Status>;

    /// Clears outputs left behind by a failed attempt.
    fn reset(&mut self) {}
}

/// Runs tasks, restarting them when the database reports a transient failure.
#[derive(Debug, Clone)]
pub struct TaskRunner {
    adapter: Arc<dyn DbAdapter>,
    max_attempts: usize,
}

impl TaskRunner {
    pub fn new(adapter: Arc<dyn DbAdapter>) -> Self {
        Self {
            adapter,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn run<T: Task + ?Sized>(&self, ctx: &Context, task: &mut T) -> Result<(), Status> {
        let mut attempt = 1;
        loop {
            if ctx.deadline_exceeded() {
                return Err(Status::aborted("deadline exceeded"));
            }
            let sts = match task.run(ctx) {
                Ok(()) => return Ok(()),
                Err(sts) => sts,
            };
            if attempt >= self.max_attempts || !self.retryable(&sts) {
                debug!(attempt, "task failed: {}", sts);
                return Err(sts);
            }
            warn!(attempt, max = self.max_attempts, "retrying task: {}", sts);
            task.reset();
            attempt += 1;
        }
    }

    fn retryable(&self, sts: &Status) -> bool {
        sts.causes()
            .filter_map(|e| e.downcast_ref::<DbError>())
            .any(|e| self.adapter.retryable_err(e))
    }
}
