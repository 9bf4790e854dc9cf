//! # Job abstraction: the unit of work the engine schedules.
//!
//! - **[`Job`]** — trait for implementing blocking, CPU-bound work units
//! - **[`JobRef`]** — shared handle (`Arc<dyn Job>`) used throughout the engine
//! - **[`JobState`]** — the lifecycle core every job embeds (stop/error/finished
//!   flags, dependencies)
//!
//! ## Rules
//! - `process` is the body; it runs on a worker thread and must never be
//!   called directly by the application — the [`JobManager`](crate::JobManager)
//!   drives it.
//! - A body that should be interruptible polls its stop flag with the
//!   [`check_stop!`](crate::check_stop) macro as often as feasible. Stopping
//!   is cooperative, never forced.
//! - On a domain error, call [`JobState::report_error`] with a positive code
//!   and return promptly; the engine classifies the outcome after the body
//!   returns.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use jobvisor::{check_stop, Job, JobState};
//!
//! /// Computes the sum 1 + 2 + … + max by brute force.
//! struct SumJob {
//!     state: JobState,
//!     max: u64,
//!     sum: AtomicU64,
//! }
//!
//! impl SumJob {
//!     fn new(max: u64) -> Arc<Self> {
//!         Arc::new(Self {
//!             state: JobState::new(format!("sum-{max}")),
//!             max,
//!             sum: AtomicU64::new(0),
//!         })
//!     }
//! }
//!
//! impl Job for SumJob {
//!     fn state(&self) -> &JobState {
//!         &self.state
//!     }
//!
//!     fn process(&self) {
//!         let mut sum = 0;
//!         for i in 1..=self.max {
//!             check_stop!(self);
//!             sum += i;
//!         }
//!         self.sum.store(sum, Ordering::SeqCst);
//!     }
//! }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Shared handle to a job object.
///
/// Jobs are reachable from the manager's job list, from dependents'
/// dependency lists and from any handle the application retains; the last
/// clone keeps the job alive past [`JobManager::clear`](crate::JobManager::clear).
pub type JobRef = Arc<dyn Job>;

/// Lifecycle core embedded by every job.
///
/// Holds the flags the engine reads and writes across threads (stop
/// requested, error code, finished, spawned) plus the list of prerequisite
/// jobs. All flag accesses are atomic; the dependency list is pruned lazily
/// from the front as prerequisites finish.
pub struct JobState {
    name: String,
    stop: AtomicBool,
    finished: AtomicBool,
    error: AtomicU32,
    spawned: AtomicBool,
    deps: Mutex<VecDeque<JobRef>>,
}

impl JobState {
    /// Creates the state core. The name is diagnostic only; it can be empty,
    /// but setting it helps when reading event logs.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stop: AtomicBool::new(false),
            finished: AtomicBool::new(false),
            error: AtomicU32::new(0),
            spawned: AtomicBool::new(false),
            deps: Mutex::new(VecDeque::new()),
        }
    }

    /// Returns the job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the stop flag. Idempotent; the flag is only ever observed by a
    /// body that polls it.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// True if a stop was requested for this job.
    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    /// Records a domain error. Call with a positive code from inside
    /// `process` and return promptly afterwards; the engine emits the
    /// outcome once the body has returned.
    pub fn report_error(&self, code: u32) {
        self.error.store(code, Ordering::SeqCst);
    }

    /// Returns the error code (0 = no error).
    pub fn error_code(&self) -> u32 {
        self.error.load(Ordering::SeqCst)
    }

    /// True if the job recorded an error.
    pub fn is_error(&self) -> bool {
        self.error_code() != 0
    }

    /// True if the job completed successfully (no error, no stop).
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    /// True if this job was produced by another job's spawn generator.
    pub fn is_spawned(&self) -> bool {
        self.spawned.load(Ordering::SeqCst)
    }

    /// Appends a prerequisite. The engine will not start this job until
    /// every prerequisite has finished successfully.
    ///
    /// Dependencies hold shared handles, never ownership: a prerequisite's
    /// lifetime is not shortened by its dependents, and a dependent must
    /// never be referenced back from its prerequisite.
    pub fn add_dependency(&self, job: JobRef) {
        self.deps.lock().push_back(job);
    }

    /// Number of prerequisites left to finish.
    pub fn dependency_count(&self) -> usize {
        self.deps.lock().len()
    }

    /// Prunes finished prerequisites from the front of the list and returns
    /// true if none remain. This is the default readiness check.
    pub fn dependencies_ready(&self) -> bool {
        let mut deps = self.deps.lock();
        while deps.front().is_some_and(|d| d.state().is_finished()) {
            deps.pop_front();
        }
        deps.is_empty()
    }

    /// Marks the job finished iff no error occurred and no stop was
    /// requested. This is the core of the default [`Job::cleanup`]; overrides
    /// must chain to it.
    pub fn finish(&self) {
        if self.error_code() == 0 && !self.stop_requested() {
            self.finished.store(true, Ordering::SeqCst);
        }
    }

    pub(crate) fn mark_spawned(&self) {
        self.spawned.store(true, Ordering::SeqCst);
    }

    /// Fresh-run reset, performed right before `process`.
    pub(crate) fn reset(&self) {
        self.stop.store(false, Ordering::SeqCst);
        self.error.store(0, Ordering::SeqCst);
    }
}

/// Blocking, cooperatively-stoppable unit of work.
///
/// Implementors embed a [`JobState`] and return it from [`Job::state`]; the
/// default method implementations route lifecycle behavior through it. Only
/// `process` is mandatory.
///
/// The engine invokes `can_start`, `next_spawned_job` and `cleanup` while
/// holding its internal lock; implementations of these must not call back
/// into the [`JobManager`](crate::JobManager) that owns the job.
pub trait Job: Send + Sync + 'static {
    /// Returns the embedded lifecycle core.
    fn state(&self) -> &JobState;

    /// The body. Runs on a worker thread, never on the thread that appended
    /// the job. Poll [`check_stop!`](crate::check_stop) inside long loops and
    /// report domain errors via [`JobState::report_error`].
    fn process(&self);

    /// Returns a stable, human-readable job name (diagnostic only).
    fn name(&self) -> &str {
        self.state().name()
    }

    /// Amount of processing done in percent, in `[0, 100]`.
    ///
    /// The default reports 0 until the job has finished and 100 afterwards;
    /// reimplement to report finer-grained progress.
    fn progress(&self) -> u8 {
        if self.state().is_finished() {
            100
        } else {
            0
        }
    }

    /// Readiness predicate consulted by the dispatcher.
    ///
    /// The default prunes finished prerequisites and returns true once none
    /// remain. An override may impose additional conditions but must honor
    /// the dependency check first: if `self.state().dependencies_ready()` is
    /// false, so must be the override's result.
    fn can_start(&self) -> bool {
        self.state().dependencies_ready()
    }

    /// Lazy generator of follow-up jobs.
    ///
    /// Called repeatedly after `process` returns, before `cleanup`, until it
    /// yields `None`. Each yielded job is marked spawned and appended to the
    /// tail of the manager's waiting queue.
    fn next_spawned_job(&self) -> Option<JobRef> {
        None
    }

    /// Invoked after spawn collection, once per execution. The default marks
    /// the job finished iff it carries no error and no stop request; an
    /// override must call `self.state().finish()` first, then may release
    /// auxiliary resources.
    fn cleanup(&self) {
        self.state().finish();
    }

    /// Human-readable text for a domain error code.
    fn error_text(&self, code: u32) -> String {
        let _ = code;
        "unknown error".to_string()
    }
}

/// Returns from the enclosing function if a stop was requested for `$job`.
///
/// Use inside `process` loops to make the body interruptible:
/// ```rust,ignore
/// fn process(&self) {
///     for chunk in &self.chunks {
///         check_stop!(self);
///         self.handle(chunk);
///     }
/// }
/// ```
#[macro_export]
macro_rules! check_stop {
    ($job:expr) => {
        if $crate::Job::state($job).stop_requested() {
            return;
        }
    };
}

/// Terminal classification of one job execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    /// `process` returned with no error and no stop request.
    Completed,
    /// `process` returned after observing a stop request.
    Stopped,
    /// `process` reported a positive error code.
    Errored(u32),
}

/// Runs one execution of a job on the current (worker) thread.
///
/// Resets the stop flag and error code, runs the body, then classifies the
/// result: an error code wins over a stop request, which wins over plain
/// completion. Exactly one outcome is produced per execution.
pub(crate) fn exec(job: &dyn Job) -> JobOutcome {
    job.state().reset();
    job.process();
    let code = job.state().error_code();
    if code > 0 {
        JobOutcome::Errored(code)
    } else if job.state().stop_requested() {
        JobOutcome::Stopped
    } else {
        JobOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;

    struct SumJob {
        state: JobState,
        max: u64,
        sum: AtomicU64,
    }

    impl SumJob {
        fn new(max: u64) -> Arc<Self> {
            Arc::new(Self {
                state: JobState::new(format!("sum-{max}")),
                max,
                sum: AtomicU64::new(0),
            })
        }
    }

    impl Job for SumJob {
        fn state(&self) -> &JobState {
            &self.state
        }

        fn process(&self) {
            let mut sum = 0;
            for i in 1..=self.max {
                check_stop!(self);
                sum += i;
            }
            self.sum.store(sum, Ordering::SeqCst);
        }
    }

    struct FailingJob {
        state: JobState,
    }

    impl Job for FailingJob {
        fn state(&self) -> &JobState {
            &self.state
        }

        fn process(&self) {
            self.state.report_error(7);
        }
    }

    #[test]
    fn exec_classifies_success() {
        let job = SumJob::new(100);
        assert_eq!(exec(job.as_ref()), JobOutcome::Completed);
        job.cleanup();
        assert!(job.state().is_finished());
        assert_eq!(job.sum.load(Ordering::SeqCst), 5050);
    }

    #[test]
    fn exec_classifies_error_and_cleanup_skips_finish() {
        let job = Arc::new(FailingJob {
            state: JobState::new("fail"),
        });
        assert_eq!(exec(job.as_ref()), JobOutcome::Errored(7));
        job.cleanup();
        assert!(!job.state().is_finished());
        assert!(job.state().is_error());
        assert_eq!(job.error_text(7), "unknown error");
    }

    #[test]
    fn exec_resets_previous_stop_and_error() {
        let job = SumJob::new(10);
        job.state().request_stop();
        job.state().report_error(3);
        assert_eq!(exec(job.as_ref()), JobOutcome::Completed);
    }

    #[test]
    fn stop_flag_short_circuits_process() {
        let job = SumJob::new(1_000);
        job.state().reset();
        job.state().request_stop();
        job.process();
        assert_eq!(job.sum.load(Ordering::SeqCst), 0);
        assert!(job.state().stop_requested());
    }

    #[test]
    fn dependencies_prune_from_the_front_as_they_finish() {
        let a = SumJob::new(1);
        let b = SumJob::new(2);
        let dependent = SumJob::new(3);
        dependent.state().add_dependency(a.clone());
        dependent.state().add_dependency(b.clone());

        assert!(!dependent.can_start());
        assert_eq!(dependent.state().dependency_count(), 2);

        exec(a.as_ref());
        a.cleanup();
        assert!(!dependent.can_start());
        // the finished front prerequisite has been pruned
        assert_eq!(dependent.state().dependency_count(), 1);

        exec(b.as_ref());
        b.cleanup();
        assert!(dependent.can_start());
        assert_eq!(dependent.state().dependency_count(), 0);
    }

    #[test]
    fn default_progress_follows_finished_flag() {
        let job = SumJob::new(5);
        assert_eq!(job.progress(), 0);
        exec(job.as_ref());
        job.cleanup();
        assert_eq!(job.progress(), 100);
    }
}
