//! # Sequential queue: ordered sub-jobs on a single worker.
//!
//! [`SequentialQueue`] is itself a [`Job`], so it can be appended to a
//! [`JobManager`](crate::JobManager) like any other work unit. Its body runs
//! the queued sub-jobs strictly in insertion order, inline on the worker
//! thread that picked the queue up — sub-jobs are never re-dispatched.
//!
//! Use it for groups of small steps that must not interleave with each other
//! but may run in parallel with other groups.
//!
//! ## Semantics
//! - A stop request against the queue is honored between sub-jobs: the
//!   current sub-job runs to its end, the remaining ones are skipped.
//! - The first sub-job that reports a positive error code short-circuits the
//!   queue; the code is propagated as the queue's own error.
//! - Progress is the weighted sum of completed sub-jobs plus the running
//!   sub-job's own progress.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::job::{Job, JobRef, JobState};

/// A job that processes an ordered list of sub-jobs sequentially.
pub struct SequentialQueue {
    state: JobState,
    jobs: Mutex<Vec<JobRef>>,
    /// Index of the sub-job currently processing (−1 before the first run,
    /// equal to the sub-job count after a full pass).
    current: AtomicI64,
}

impl SequentialQueue {
    /// Creates an empty queue.
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            state: JobState::new(name),
            jobs: Mutex::new(Vec::new()),
            current: AtomicI64::new(-1),
        })
    }

    /// Appends a sub-job to the end of the queue.
    pub fn append(&self, job: JobRef) {
        self.jobs.lock().push(job);
    }

    /// Removes all sub-jobs and resets the cursor.
    pub fn clear(&self) {
        let mut jobs = self.jobs.lock();
        self.current.store(-1, Ordering::SeqCst);
        jobs.clear();
    }

    /// Number of sub-jobs in the queue.
    pub fn job_count(&self) -> usize {
        self.jobs.lock().len()
    }
}

impl Job for SequentialQueue {
    fn state(&self) -> &JobState {
        &self.state
    }

    fn process(&self) {
        // Snapshot so progress queries never contend with the running pass.
        let jobs = self.jobs.lock().clone();
        for (i, job) in jobs.iter().enumerate() {
            self.current.store(i as i64, Ordering::SeqCst);
            if self.state.stop_requested() {
                return;
            }
            job.process();
            let code = job.state().error_code();
            if code > 0 {
                self.state.report_error(code);
                return;
            }
        }
        self.current.store(jobs.len() as i64, Ordering::SeqCst);
    }

    fn progress(&self) -> u8 {
        let jobs = self.jobs.lock();
        let current = self.current.load(Ordering::SeqCst);
        if current < 0 || jobs.is_empty() {
            return 0;
        }
        let count = jobs.len() as i64;
        if current >= count {
            return 100;
        }
        let sub = jobs[current as usize].progress() as i64;
        ((100 * current + sub) / count) as u8
    }
}
