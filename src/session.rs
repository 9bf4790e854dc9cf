//! # Session manager: recycling the job manager across memory-bounded batches.
//!
//! A *session* is a batch of jobs executed to completion before the next
//! batch is materialized. [`SessionManager`] drives an embedded
//! [`JobManager`] through the ordered sequence described by a [`Session`]
//! implementation: between sessions the job set is cleared, so only one
//! batch of jobs is alive at a time.
//!
//! ## State machine
//!
//! ```text
//! Idle ──start──► Paused ──start_next_session──► Running
//! Running ──(all jobs finished)──► Paused ──(more sessions)──► Running
//!                                       └──(no more)─────────► Finished
//! Running ──(manager error)──► Errored
//! Running ──stop── (forward) ──(manager drained)──► Stopped
//! ```
//!
//! A stop observed while the manager is paused between sessions (including
//! during the configurable session timeout) transitions directly to Stopped;
//! remaining sessions are cancelled.
//!
//! ## Example
//! ```rust,no_run
//! use jobvisor::{JobManager, Session, SessionManager};
//! # use std::sync::Arc;
//! # use jobvisor::{Job, JobState};
//! # struct TrivialJob { state: JobState }
//! # impl Job for TrivialJob {
//! #     fn state(&self) -> &JobState { &self.state }
//! #     fn process(&self) {}
//! # }
//!
//! struct Batches;
//!
//! impl Session for Batches {
//!     fn session_count(&self) -> usize {
//!         3
//!     }
//!
//!     fn init_next_session(&self, index: usize, manager: &JobManager) {
//!         for _ in 0..[50, 100, 200][index] {
//!             manager.append_job(Arc::new(TrivialJob { state: JobState::new("") }));
//!         }
//!     }
//! }
//!
//! # async fn demo() {
//! let sm = SessionManager::new(Batches, 0);
//! sm.start();
//! while sm.is_running() {
//!     tokio::time::sleep(std::time::Duration::from_millis(5)).await;
//! }
//! assert_eq!(sm.finished_jobs(), 350);
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::ManagerError;
use crate::events::{Bus, Event, EventKind};
use crate::job::JobRef;
use crate::manager::JobManager;

/// Describes an ordered sequence of job batches.
///
/// `init_next_session` is invoked once per session, right before the
/// embedded manager starts; it must append the session's jobs to the given
/// manager. Reimplement `allowed_errors` to give sessions an individual
/// error budget (the default tolerates none).
pub trait Session: Send + Sync + 'static {
    /// Number of sessions in the sequence.
    fn session_count(&self) -> usize;

    /// Populates the manager with the jobs of session `index`.
    fn init_next_session(&self, index: usize, manager: &JobManager);

    /// Maximal number of failing jobs tolerated in session `index`.
    fn allowed_errors(&self, index: usize) -> i64 {
        let _ = index;
        0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionStatus {
    /// The current session's jobs are processing.
    Running,
    /// Between sessions (initialization or session timeout).
    Paused,
    /// All sessions completed.
    Finished,
    /// Processing was stopped from outside.
    Stopped,
    /// A session was surrendered by the embedded manager.
    Errored,
}

struct SessionState {
    status: SessionStatus,
    /// −1 before start and after a stop or error; equal to the session count
    /// after every session completed.
    session_index: i64,
    session_timeout: Duration,
    finished_jobs: usize,
    run_token: CancellationToken,
}

struct SessionShared {
    driver: Arc<dyn Session>,
    manager: JobManager,
    bus: Bus,
    state: Mutex<SessionState>,
}

impl SessionShared {
    /// Listens to the embedded manager's bus and advances the state machine.
    fn spawn_listener(shared: &Arc<Self>) {
        let mut rx = shared.manager.subscribe();
        let shared = shared.clone();
        tokio::spawn(async move {
            loop {
                let ev = match rx.recv().await {
                    Ok(ev) => ev,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        eprintln!("[jobvisor] session listener lagged, skipped {skipped} events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                match ev.kind {
                    EventKind::Finished => Self::handle_finished(&shared),
                    EventKind::Failed => {
                        Self::handle_failed(&shared, ev.error.unwrap_or(ManagerError::ImplementationError))
                    }
                    EventKind::Stopped => Self::handle_stopped(&shared),
                    EventKind::Progress => {
                        if let Some(percent) = ev.progress {
                            Self::handle_progress(&shared, percent);
                        }
                    }
                    EventKind::JobFinished => {
                        shared.state.lock().finished_jobs += 1;
                    }
                    _ => {}
                }
            }
        });
    }

    /// The embedded manager finished one session: report it, then either
    /// schedule the next session (after the session timeout) or conclude.
    fn handle_finished(shared: &Arc<Self>) {
        let mut events = Vec::new();
        {
            let mut st = shared.state.lock();
            if st.status != SessionStatus::Running {
                events.push(
                    Event::now(EventKind::SessionFailed)
                        .with_error(ManagerError::ImplementationError)
                        .with_session(st.session_index),
                );
                st.status = SessionStatus::Errored;
            } else {
                st.status = SessionStatus::Paused;
                events.push(Event::now(EventKind::SessionFinished).with_session(st.session_index));
                st.session_index += 1;
                if st.session_index < shared.driver.session_count() as i64 {
                    Self::schedule_next_session(shared, st.session_timeout, st.run_token.clone());
                } else {
                    st.status = SessionStatus::Finished;
                    events.push(Event::now(EventKind::AllSessionsFinished));
                }
            }
        }
        for ev in events {
            shared.bus.publish(ev);
        }
    }

    /// Defers `start_next_session` by the session timeout. The sleep is cut
    /// short when the run token is cancelled (stop or error), in which case
    /// `start_next_session` observes the non-paused status and backs off.
    fn schedule_next_session(shared: &Arc<Self>, delay: Duration, token: CancellationToken) {
        let shared = shared.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::select! {
                    _ = time::sleep(delay) => {}
                    _ = token.cancelled() => {}
                }
            }
            let _ = Self::start_next_session(&shared);
        });
    }

    /// Clears the embedded manager, applies the session's error budget, asks
    /// the driver to populate the session and starts the manager. Returns
    /// false when the session did not actually begin (pending stop, state
    /// advanced elsewhere, or the manager refusing to start).
    fn start_next_session(shared: &Arc<Self>) -> bool {
        let index = {
            let mut st = shared.state.lock();
            // a stop issued during the pause cancels the remaining sessions
            if shared.manager.is_stopped() && st.status == SessionStatus::Paused {
                drop(st);
                Self::handle_stopped(shared);
                return false;
            }
            if st.status != SessionStatus::Paused {
                return false;
            }
            st.status = SessionStatus::Running;
            st.session_index
        };

        shared.manager.clear();
        shared
            .manager
            .set_allowed_errors(shared.driver.allowed_errors(index as usize));
        shared.driver.init_next_session(index as usize, &shared.manager);

        if !shared.manager.start() {
            eprintln!("[jobvisor] session {index}: embedded job manager could not be started");
            let mut st = shared.state.lock();
            st.status = SessionStatus::Errored;
            st.session_index = -1;
            st.run_token.cancel();
            drop(st);
            shared.bus.publish(
                Event::now(EventKind::SessionFailed)
                    .with_error(ManagerError::CouldNotStart)
                    .with_session(index),
            );
            return false;
        }
        // forward a stop that raced the transition into the fresh run
        if shared.state.lock().status != SessionStatus::Running {
            shared.manager.stop();
        }
        true
    }

    fn handle_failed(shared: &Arc<Self>, err: ManagerError) {
        let index = {
            let mut st = shared.state.lock();
            let index = st.session_index;
            st.status = SessionStatus::Errored;
            st.session_index = -1;
            st.run_token.cancel();
            index
        };
        shared
            .bus
            .publish(Event::now(EventKind::SessionFailed).with_error(err).with_session(index));
    }

    fn handle_stopped(shared: &Arc<Self>) {
        let index = {
            let mut st = shared.state.lock();
            if !matches!(st.status, SessionStatus::Running | SessionStatus::Paused) {
                return;
            }
            let index = st.session_index;
            st.status = SessionStatus::Stopped;
            st.session_index = -1;
            st.run_token.cancel();
            index
        };
        shared
            .bus
            .publish(Event::now(EventKind::SessionStopped).with_session(index));
    }

    fn handle_progress(shared: &Arc<Self>, percent: u8) {
        let total = {
            let st = shared.state.lock();
            let sessions = shared.driver.session_count() as i64;
            if st.session_index < 0 || sessions == 0 {
                return;
            }
            ((100 * st.session_index + percent as i64) / sessions) as u8
        };
        shared
            .bus
            .publish(Event::now(EventKind::SessionProgress).with_progress(total));
    }
}

/// Drives a [`JobManager`] through an ordered sequence of sessions.
///
/// Cheap to clone; clones share the same state, manager and bus. Must be
/// created and used inside a Tokio runtime.
#[derive(Clone)]
pub struct SessionManager {
    shared: Arc<SessionShared>,
}

impl SessionManager {
    /// Creates a session manager over a fresh pool of `workers` slots
    /// (0 = the system's available parallelism).
    pub fn new(driver: impl Session, workers: usize) -> Self {
        Self::with_config(
            driver,
            Config {
                workers,
                ..Config::default()
            },
        )
    }

    /// Creates a session manager from a full [`Config`]. Per-job finish
    /// reporting is always enabled on the embedded manager; the session
    /// manager needs it to account finished jobs across sessions.
    pub fn with_config(driver: impl Session, cfg: Config) -> Self {
        let bus_capacity = cfg.bus_capacity;
        let manager = JobManager::with_config(Config {
            report_job_finish: true,
            ..cfg
        });
        let shared = Arc::new(SessionShared {
            driver: Arc::new(driver),
            manager,
            bus: Bus::new(bus_capacity),
            state: Mutex::new(SessionState {
                status: SessionStatus::Finished,
                session_index: -1,
                session_timeout: Duration::ZERO,
                finished_jobs: 0,
                run_token: CancellationToken::new(),
            }),
        });
        SessionShared::spawn_listener(&shared);
        Self { shared }
    }

    /// Creates a new receiver for all future session events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Read access to the embedded job manager.
    pub fn manager(&self) -> &JobManager {
        &self.shared.manager
    }

    /// Starts executing the first session (index 0).
    ///
    /// Returns false if the sequence is already running or the first
    /// session's manager could not be started. With zero sessions the
    /// sequence concludes immediately as finished (and signals it).
    pub fn start(&self) -> bool {
        {
            let mut st = self.shared.state.lock();
            if matches!(st.status, SessionStatus::Running | SessionStatus::Paused) {
                eprintln!("[jobvisor] cannot start a session manager that is already running");
                return false;
            }
            if self.shared.driver.session_count() == 0 {
                st.status = SessionStatus::Finished;
                drop(st);
                self.shared.bus.publish(Event::now(EventKind::AllSessionsFinished));
                return true;
            }
            st.session_index = 0;
            st.finished_jobs = 0;
            st.status = SessionStatus::Paused;
            st.run_token = CancellationToken::new();
        }
        SessionShared::start_next_session(&self.shared)
    }

    /// Stops the current session's manager (cooperatively) or, when between
    /// sessions, cancels the remaining sessions right away.
    pub fn stop(&self) {
        if self.shared.manager.is_running() {
            self.shared.manager.stop();
        } else {
            SessionShared::handle_stopped(&self.shared);
        }
    }

    /// Appends a job to the currently initializing or running session.
    pub fn append_job(&self, job: JobRef) {
        self.shared.manager.append_job(job);
    }

    /// Adds workers to the embedded manager's pool; legal mid-run.
    pub fn add_workers(&self, count: usize) {
        self.shared.manager.add_workers(count);
    }

    /// Number of workers currently executing a job.
    pub fn workers_running(&self) -> usize {
        self.shared.manager.workers_running()
    }

    /// Sets the delay enforced between one session finishing and the next
    /// one starting.
    pub fn set_session_timeout(&self, timeout: Duration) {
        self.shared.state.lock().session_timeout = timeout;
    }

    /// Current session index (−1 before start and after a stop or error;
    /// equal to [`Session::session_count`] after a fully finished sequence).
    pub fn current_session(&self) -> i64 {
        self.shared.state.lock().session_index
    }

    /// Total number of jobs finished across all sessions of the sequence.
    pub fn finished_jobs(&self) -> usize {
        self.shared.state.lock().finished_jobs
    }

    /// True while the sequence is processing or paused between sessions.
    pub fn is_running(&self) -> bool {
        matches!(
            self.shared.state.lock().status,
            SessionStatus::Running | SessionStatus::Paused
        )
    }

    /// True if every session completed successfully.
    pub fn is_finished(&self) -> bool {
        self.shared.state.lock().status == SessionStatus::Finished
    }
}
