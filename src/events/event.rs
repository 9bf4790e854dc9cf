//! # Lifecycle events emitted by the job manager and session manager.
//!
//! The [`EventKind`] enum classifies event types across two layers:
//! - **Run events**: emitted by a [`JobManager`](crate::JobManager) during
//!   one run (per-job completions, progress, one terminal outcome).
//! - **Session events**: emitted by a [`SessionManager`](crate::SessionManager)
//!   while driving an ordered sequence of sessions.
//!
//! The [`Event`] struct carries optional metadata: the completed job handle,
//! the engine error, a progress percentage and the session index.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically, so subscribers can order events even when several
//! receivers drain at different speeds. Events are published only after the
//! engine's internal lock has been released and all state mutations are
//! committed.
//!
//! ## Example
//! ```rust
//! use jobvisor::{Event, EventKind, ManagerError};
//!
//! let ev = Event::now(EventKind::Failed).with_error(ManagerError::NoJobReady);
//!
//! assert_eq!(ev.kind, EventKind::Failed);
//! assert_eq!(ev.error, Some(ManagerError::NoJobReady));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::error::ManagerError;
use crate::job::JobRef;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of engine events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Run events (JobManager) ===
    /// One job completed its execution (success, error or stop). Gated by
    /// the manager's report-job-finish flag; carries the job handle.
    JobFinished,
    /// Periodic progress report: percentage of completed jobs.
    Progress,
    /// All jobs of the run completed within the error budget.
    Finished,
    /// The run drained after a stop request.
    Stopped,
    /// The run was surrendered; carries the [`ManagerError`].
    Failed,

    // === Session events (SessionManager) ===
    /// One session completed all of its jobs; carries the session index.
    SessionFinished,
    /// Progress across the whole session sequence.
    SessionProgress,
    /// The session sequence was stopped; carries the interrupted session index.
    SessionStopped,
    /// A session surrendered; carries the session index and the error.
    SessionFailed,
    /// Every session completed.
    AllSessionsFinished,
}

/// Engine event with optional metadata.
///
/// ## Fields
/// - `seq`: unique sequence number (monotonically increasing)
/// - `at`: wall-clock timestamp (may go backwards, use for logging only)
/// - `kind`: event classification
/// - `job`, `name`, `error`, `progress`, `session`: optional metadata
#[derive(Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// The kind of event.
    pub kind: EventKind,
    /// Shared handle to the job this event is about (JobFinished only).
    pub job: Option<JobRef>,
    /// Name of the job, if applicable.
    pub name: Option<String>,
    /// Engine error, if the event represents a surrendered run.
    pub error: Option<ManagerError>,
    /// Percentage of work done, for progress kinds.
    pub progress: Option<u8>,
    /// Session index, for session kinds (−1 = no session active).
    pub session: Option<i64>,
}

impl Event {
    /// Creates a new event of the given kind with the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            job: None,
            name: None,
            error: None,
            progress: None,
            session: None,
        }
    }

    /// Attaches the job handle (and its name).
    pub fn with_job(mut self, job: JobRef) -> Self {
        self.name = Some(job.name().to_string());
        self.job = Some(job);
        self
    }

    /// Attaches an engine error.
    pub fn with_error(mut self, err: ManagerError) -> Self {
        self.error = Some(err);
        self
    }

    /// Attaches a progress percentage.
    pub fn with_progress(mut self, percent: u8) -> Self {
        self.progress = Some(percent);
        self
    }

    /// Attaches a session index.
    pub fn with_session(mut self, index: i64) -> Self {
        self.session = Some(index);
        self
    }

    /// True if this is a terminal run event (`Finished`, `Stopped`, `Failed`).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::Finished | EventKind::Stopped | EventKind::Failed
        )
    }
}
