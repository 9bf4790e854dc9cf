//! # Worker: a dumb execution slot.
//!
//! One worker corresponds to one unit of parallelism in the pool. A worker
//! makes no scheduling decisions: the [`JobManager`](crate::JobManager) binds
//! a job to an idle worker under its lock, and the worker merely records
//! which job it is running so a stop request can be forwarded into it.
//!
//! The job body itself runs on a dedicated OS thread provided by
//! [`tokio::task::spawn_blocking`]; a small watcher task awaits the join
//! handle and re-enters the manager's completion path. Awaiting the join
//! handle is what establishes the happens-before edge between everything the
//! body wrote and everything the manager (and every event subscriber)
//! observes afterwards.

use std::sync::Arc;

use crate::error::PANIC_ERROR_CODE;
use crate::job::{exec, JobOutcome, JobRef};
use crate::manager::Shared;

/// Execution slot owned by the job manager.
///
/// Holds at most one job index at a time. All mutation happens under the
/// manager's lock.
pub(crate) struct Worker {
    current: Option<usize>,
}

impl Worker {
    pub(crate) fn new() -> Self {
        Self { current: None }
    }

    /// True while a job is bound to this slot.
    pub(crate) fn is_running(&self) -> bool {
        self.current.is_some()
    }

    /// Index of the job this worker is running (`None` when idle).
    pub(crate) fn current_job_index(&self) -> Option<usize> {
        self.current
    }

    /// Binds a job to this slot.
    pub(crate) fn assign(&mut self, job_index: usize) {
        self.current = Some(job_index);
    }

    /// Unbinds the slot, returning the job index it was running.
    pub(crate) fn release(&mut self) -> Option<usize> {
        self.current.take()
    }
}

/// Runs one job on behalf of `worker_index` and reports back to the manager.
///
/// The slot has already been bound under the manager's lock; this only
/// launches the blocking execution and the watcher. A panicking body is
/// caught at the join point and accounted as a failing job with
/// [`PANIC_ERROR_CODE`].
pub(crate) fn run(shared: Arc<Shared>, worker_index: usize, job: JobRef) {
    tokio::spawn(async move {
        let body = job.clone();
        let outcome = match tokio::task::spawn_blocking(move || exec(body.as_ref())).await {
            Ok(outcome) => outcome,
            Err(join_err) => {
                eprintln!("[jobvisor] job '{}' panicked: {join_err}", job.name());
                job.state().report_error(PANIC_ERROR_CODE);
                JobOutcome::Errored(PANIC_ERROR_CODE)
            }
        };
        shared.on_job_done(worker_index, outcome);
    });
}
