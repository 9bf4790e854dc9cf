//! # jobvisor
//!
//! **Jobvisor** is an in-process parallel job engine for CPU-bound work.
//!
//! It schedules user-supplied work units across a dynamically sized pool of
//! blocking workers while honoring per-unit start preconditions (inter-job
//! dependencies and user-defined readiness), job spawning, a bounded error
//! budget, cooperative cancellation, live pool resizing and ordered progress
//! reporting. A session layer recycles the scheduler across memory-bounded
//! batches.
//!
//! ## Features
//!
//! | Area             | Description                                                       | Key types / traits                      |
//! |------------------|-------------------------------------------------------------------|-----------------------------------------|
//! | **Jobs**         | Define blocking, cooperatively-stoppable work units.              | [`Job`], [`JobRef`], [`JobState`]       |
//! | **Sequencing**   | Run ordered groups of sub-jobs on one worker.                     | [`SequentialQueue`]                     |
//! | **Dispatch**     | Dependency-aware scheduling over a resizable worker pool.         | [`JobManager`], [`Config`]              |
//! | **Sessions**     | Drive the manager through an ordered sequence of job batches.     | [`Session`], [`SessionManager`]         |
//! | **Events**       | Per-job completions, progress and terminal outcomes over a bus.   | [`Event`], [`EventKind`]                |
//! | **Subscribers**  | Hook into the event stream (logging, metrics, custom handlers).   | [`Subscribe`], [`SubscriberSet`]        |
//! | **Errors**       | Typed errors for surrendered runs.                                | [`ManagerError`]                        |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU64, Ordering};
//! use jobvisor::{check_stop, Job, JobManager, JobState};
//!
//! /// Computes the sum 1 + 2 + … + max by brute force.
//! struct SumJob {
//!     state: JobState,
//!     max: u64,
//!     sum: AtomicU64,
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
//!
//! #[tokio::main]
//! async fn main() {
//!     let manager = JobManager::new(3);
//!     for max in [100, 200, 300] {
//!         manager.append_job(Arc::new(SumJob {
//!             state: JobState::new(format!("sum-{max}")),
//!             max,
//!             sum: AtomicU64::new(0),
//!         }));
//!     }
//!
//!     let mut events = manager.subscribe();
//!     manager.start();
//!     while !events.recv().await.map(|ev| ev.is_terminal()).unwrap_or(true) {}
//!
//!     assert!(manager.is_finished());
//! }
//! ```
//!
//! ---

mod config;
mod error;
mod events;
mod job;
mod manager;
mod queue;
mod session;
mod subscribers;
mod worker;

// ---- Public re-exports ----

pub use config::Config;
pub use error::{ManagerError, PANIC_ERROR_CODE, USER_ERROR_BASE};
pub use events::{Bus, Event, EventKind};
pub use job::{Job, JobRef, JobState};
pub use manager::JobManager;
pub use queue::SequentialQueue;
pub use session::{Session, SessionManager};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logging subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
