//! # Job manager: dependency-aware dispatch over a resizable worker pool.
//!
//! [`JobManager`] owns the job set and pairs *ready* jobs with *idle*
//! workers until every job has completed, the error budget is exceeded, a
//! stop request drains the pool, or no queued job can make progress.
//!
//! # High-level architecture:
//!
//! ```text
//!  append_job()          ┌─────────────┐   bind under lock   ┌──────────┐
//!  ────────────────────► │   waiting   │ ──────────────────► │  Worker  │
//!                        │ (FIFO+skip) │                     │  (slot)  │
//!                        └─────────────┘                     └────┬─────┘
//!                               ▲                          spawn_blocking
//!                      spawned jobs │                             ▼
//!                        ┌─────────┴───┐   on_job_done()   ┌────────────┐
//!                        │ JobManager  │ ◄──────────────── │ exec(job)  │
//!                        │  (mutex)    │                   └────────────┘
//!                        └──────┬──────┘
//!                          publishes (after unlock)
//!                               ▼
//!                        Bus ──► subscribers (events, progress, terminal)
//! ```
//!
//! ## Dispatch rules
//! - `waiting` is a FIFO; a job whose `can_start` returns false is rotated
//!   to the back and the scan continues. No priority beyond insertion order
//!   and readiness.
//! - Spawned jobs go to the tail of `waiting`; they are never preferred
//!   over pre-existing ready jobs.
//! - If a full scan finds no ready job while nothing is running, the run is
//!   surrendered with [`ManagerError::NoJobReady`] instead of spinning.
//! - A stop request lets in-flight jobs drain; no new dispatches occur.
//!
//! All public methods return as soon as internal state is committed; job
//! bodies always run outside the lock, and events are published after the
//! lock has been released. The manager must be used inside a Tokio runtime.
//!
//! ## Example
//! ```rust,no_run
//! use jobvisor::{Job, JobManager, JobState};
//! # use std::sync::Arc;
//! # struct SumJob { state: JobState }
//! # impl Job for SumJob {
//! #     fn state(&self) -> &JobState { &self.state }
//! #     fn process(&self) {}
//! # }
//!
//! # async fn demo() {
//! let manager = JobManager::new(3);
//! manager.append_job(Arc::new(SumJob { state: JobState::new("sum") }));
//! manager.start();
//! while manager.is_running() {
//!     tokio::time::sleep(std::time::Duration::from_millis(5)).await;
//! }
//! assert!(manager.is_finished());
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::ManagerError;
use crate::events::{Bus, Event, EventKind};
use crate::job::{JobOutcome, JobRef};
use crate::subscribers::{Subscribe, SubscriberSet};
use crate::worker::{self, Worker};

/// Status of the current (or latest) run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    /// Processing is going on.
    Running,
    /// All jobs completed within the error budget.
    Finished,
    /// Processing was stopped from outside and the pool has drained.
    Stopped,
    /// The run was surrendered; see `last_error`.
    Errored,
}

/// Work recorded under the lock, performed after it is released: blocking
/// dispatches to launch and events to publish.
#[derive(Default)]
struct Pending {
    dispatches: Vec<(usize, JobRef)>,
    events: Vec<Event>,
}

struct State {
    jobs: Vec<JobRef>,
    waiting: VecDeque<usize>,
    workers: Vec<Worker>,
    idle: VecDeque<usize>,
    started: usize,
    running: usize,
    finished: usize,
    errors: i64,
    allowed_errors: i64,
    status: Status,
    last_error: Option<ManagerError>,
    stop: bool,
    report_job_finish: bool,
    progress_interval: Duration,
    run_token: CancellationToken,
}

impl State {
    fn new(cfg: &Config) -> Self {
        let mut state = Self {
            jobs: Vec::new(),
            waiting: VecDeque::new(),
            workers: Vec::new(),
            idle: VecDeque::new(),
            started: 0,
            running: 0,
            finished: 0,
            errors: 0,
            allowed_errors: cfg.allowed_errors,
            status: Status::Finished,
            last_error: None,
            stop: false,
            report_job_finish: cfg.report_job_finish,
            progress_interval: cfg.progress_interval,
            run_token: CancellationToken::new(),
        };
        state.allocate_workers(resolve_workers(cfg.workers));
        state
    }

    fn allocate_workers(&mut self, count: usize) {
        self.workers.clear();
        self.idle.clear();
        for index in 0..count {
            self.workers.push(Worker::new());
            self.idle.push_back(index);
        }
    }

    fn append_job_unlocked(&mut self, job: JobRef) {
        self.waiting.push_back(self.jobs.len());
        self.jobs.push(job);
    }

    /// Commits a terminal transition and its event exactly once per run.
    fn transition(&mut self, to: Status, event: Event, pending: &mut Pending) {
        if self.status != Status::Running {
            return;
        }
        self.status = to;
        self.run_token.cancel();
        pending.events.push(event);
    }

    /// Takes an idle worker and binds it to the next ready job, scanning the
    /// waiting queue in FIFO order and rotating non-ready entries to the
    /// back. If the full scan yields nothing while nothing is running, the
    /// run cannot make progress and `NoJobReady` is recorded.
    fn start_next(&mut self, pending: &mut Pending) {
        let Some(worker_index) = self.idle.pop_front() else {
            return;
        };
        if self.started < self.jobs.len() {
            for _ in 0..self.waiting.len() {
                let Some(&job_index) = self.waiting.front() else {
                    break;
                };
                if self.jobs[job_index].can_start() {
                    self.waiting.pop_front();
                    self.workers[worker_index].assign(job_index);
                    self.started += 1;
                    self.running += 1;
                    pending
                        .dispatches
                        .push((worker_index, self.jobs[job_index].clone()));
                    return;
                }
                if let Some(index) = self.waiting.pop_front() {
                    self.waiting.push_back(index);
                }
            }
            if self.running == 0 {
                eprintln!(
                    "[jobvisor] no ready job to start, unfinished jobs left: {}",
                    self.waiting.len()
                );
                self.last_error = Some(ManagerError::NoJobReady);
            }
        }
        self.idle.push_back(worker_index);
    }

    /// One dispatch step: enforce the error budget, honor a stop request,
    /// try to start the next ready job, or conclude the run.
    fn check_next(&mut self, pending: &mut Pending) {
        if self.allowed_errors >= 0 && self.errors > self.allowed_errors {
            self.last_error = Some(ManagerError::TooManyErrors);
        }
        if self.handle_error(pending) {
            return;
        }
        if self.stop {
            if self.running == 0 {
                self.transition(Status::Stopped, Event::now(EventKind::Stopped), pending);
            }
            return;
        }
        if self.finished < self.jobs.len() {
            self.start_next(pending);
            self.handle_error(pending);
        } else {
            if !self.progress_interval.is_zero() {
                pending
                    .events
                    .push(Event::now(EventKind::Progress).with_progress(100));
            }
            self.transition(Status::Finished, Event::now(EventKind::Finished), pending);
        }
    }

    /// Reports a recorded run error once the pool has drained. Returns true
    /// while an error is pending so callers stop issuing new dispatches.
    fn handle_error(&mut self, pending: &mut Pending) -> bool {
        if let Some(err) = self.last_error {
            if self.running == 0 {
                self.transition(
                    Status::Errored,
                    Event::now(EventKind::Failed).with_error(err),
                    pending,
                );
            }
            return true;
        }
        false
    }
}

pub(crate) struct Shared {
    state: Mutex<State>,
    bus: Bus,
}

impl Shared {
    /// Completion path, entered by a worker's watcher task. Performs spawn
    /// collection, cleanup, error accounting and idle-requeue under the
    /// lock, then iterates dispatch and finally publishes outside of it.
    pub(crate) fn on_job_done(self: &Arc<Self>, worker_index: usize, outcome: JobOutcome) {
        let mut pending = Pending::default();
        {
            let mut st = self.state.lock();
            st.finished += 1;

            let job_index = match st.workers[worker_index].release() {
                Some(index) => index,
                None => {
                    st.running = st.running.saturating_sub(1);
                    st.idle.push_back(worker_index);
                    st.last_error = Some(ManagerError::ImplementationError);
                    st.handle_error(&mut pending);
                    drop(st);
                    self.flush(pending);
                    return;
                }
            };
            let job = st.jobs[job_index].clone();

            // Drain the spawn generator before the worker goes back to idle,
            // so the very next dispatch iteration observes job_count and
            // finished_count consistently.
            while let Some(spawned) = job.next_spawned_job() {
                spawned.state().mark_spawned();
                st.append_job_unlocked(spawned);
            }

            job.cleanup();

            st.idle.push_back(worker_index);
            st.running -= 1;

            if matches!(outcome, JobOutcome::Errored(_)) {
                st.errors += 1;
            }

            if st.report_job_finish {
                pending
                    .events
                    .push(Event::now(EventKind::JobFinished).with_job(job.clone()));
            }

            // At least one step even when a single job is waiting.
            let steps = st.waiting.len().min(st.idle.len()).max(1);
            for _ in 0..steps {
                st.check_next(&mut pending);
            }
        }
        self.flush(pending);
    }

    /// Launches recorded dispatches and publishes recorded events. Must be
    /// called without the state lock held.
    fn flush(self: &Arc<Self>, pending: Pending) {
        for (worker_index, job) in pending.dispatches {
            worker::run(self.clone(), worker_index, job);
        }
        for ev in pending.events {
            self.bus.publish(ev);
        }
    }
}

/// Dependency-aware parallel job dispatcher.
///
/// Cheap to clone; clones share the same state and bus. See the
/// [module documentation](self) for the dispatch rules.
#[derive(Clone)]
pub struct JobManager {
    shared: Arc<Shared>,
}

impl JobManager {
    /// Creates a manager with `workers` execution slots
    /// (0 = the system's available parallelism).
    pub fn new(workers: usize) -> Self {
        Self::with_config(Config {
            workers,
            ..Config::default()
        })
    }

    /// Creates a manager from a full [`Config`].
    pub fn with_config(cfg: Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::new(&cfg)),
                bus: Bus::new(cfg.bus_capacity),
            }),
        }
    }

    /// Creates a new receiver for all future engine events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.shared.bus.subscribe()
    }

    /// Attaches a group of subscribers to this manager's event stream for
    /// the manager's whole lifetime, one bounded queue and worker task per
    /// subscriber (see [`SubscriberSet`]).
    ///
    /// The returned handle completes once the manager is dropped and the
    /// subscribers have drained their backlog.
    pub fn attach(&self, subs: Vec<Arc<dyn Subscribe>>) -> tokio::task::JoinHandle<()> {
        SubscriberSet::new(subs).spawn_listener(self.subscribe())
    }

    /// Appends a job to the job set and enqueues it for dispatch. Safe to
    /// call while the manager is running; the job will be considered from
    /// the next completion on.
    pub fn append_job(&self, job: JobRef) {
        self.shared.state.lock().append_job_unlocked(job);
    }

    /// Drops all jobs and queued indices and resets the run bookkeeping.
    /// No-op while the manager is running. A job handle previously obtained
    /// from [`JobManager::job`] stays alive.
    pub fn clear(&self) {
        let mut st = self.shared.state.lock();
        if st.status == Status::Running {
            return;
        }
        st.jobs.clear();
        st.waiting.clear();
        st.started = 0;
        st.running = 0;
        st.stop = false;
        st.last_error = None;
    }

    /// Sets the number of jobs allowed to fail before the run is surrendered
    /// with `TooManyErrors`. Negative means unbounded tolerance: failures
    /// are still counted but never terminate the run.
    pub fn set_allowed_errors(&self, count: i64) {
        self.shared.state.lock().allowed_errors = count;
    }

    /// Returns the allowed-errors budget.
    pub fn allowed_errors(&self) -> i64 {
        self.shared.state.lock().allowed_errors
    }

    /// Sets the period of the progress ticker. Zero (the default) disables
    /// progress events. Takes effect at the next [`JobManager::start`].
    pub fn set_progress_interval(&self, interval: Duration) {
        self.shared.state.lock().progress_interval = interval;
    }

    /// Returns the progress ticker period.
    pub fn progress_interval(&self) -> Duration {
        self.shared.state.lock().progress_interval
    }

    /// When enabled, every completed job is reported with a
    /// [`EventKind::JobFinished`] event carrying the job handle.
    pub fn set_report_job_finish(&self, report: bool) {
        self.shared.state.lock().report_job_finish = report;
    }

    /// Returns the report-job-finish flag.
    pub fn report_job_finish(&self) -> bool {
        self.shared.state.lock().report_job_finish
    }

    /// Resets the pool to `count` fresh workers
    /// (0 = the system's available parallelism). No-op while running.
    pub fn set_workers(&self, count: usize) {
        let mut st = self.shared.state.lock();
        if st.status == Status::Running {
            return;
        }
        st.allocate_workers(resolve_workers(count));
    }

    /// Appends `count` fresh idle workers. Legal at any time; while the
    /// manager is running, every added worker immediately triggers one
    /// dispatch attempt.
    pub fn add_workers(&self, count: usize) {
        let mut pending = Pending::default();
        {
            let mut st = self.shared.state.lock();
            for _ in 0..count {
                let index = st.workers.len();
                st.workers.push(Worker::new());
                st.idle.push_back(index);
                if st.status == Status::Running {
                    st.start_next(&mut pending);
                }
            }
        }
        self.shared.flush(pending);
    }

    /// Starts processing the queued jobs.
    ///
    /// Returns false if the manager is already running. With no jobs queued
    /// the run concludes immediately as finished (and signals it). Otherwise
    /// up to `min(workers, jobs)` ready jobs are dispatched at once.
    pub fn start(&self) -> bool {
        let mut pending = Pending::default();
        {
            let mut st = self.shared.state.lock();
            if st.status == Status::Running {
                return false;
            }
            st.status = Status::Running;
            st.errors = 0;
            st.started = 0;
            st.finished = 0;
            st.running = 0;
            st.stop = false;
            st.last_error = None;
            st.run_token = CancellationToken::new();

            if st.jobs.is_empty() {
                st.transition(Status::Finished, Event::now(EventKind::Finished), &mut pending);
            } else {
                let first_wave = st.workers.len().min(st.jobs.len());
                for _ in 0..first_wave {
                    st.start_next(&mut pending);
                }
                // surrender right away when not even one job was ready
                let stuck = st.handle_error(&mut pending);
                if !stuck && !st.progress_interval.is_zero() {
                    self.spawn_progress_ticker(st.progress_interval, st.run_token.clone());
                }
            }
        }
        self.shared.flush(pending);
        true
    }

    /// Requests a cooperative stop: no new dispatches occur and the stop
    /// flag is forwarded to every job currently held by a worker. The status
    /// transitions to stopped only after all running workers have returned.
    pub fn stop(&self) {
        let mut st = self.shared.state.lock();
        st.stop = true;
        for worker in &st.workers {
            if let Some(job_index) = worker.current_job_index() {
                st.jobs[job_index].state().request_stop();
            }
        }
    }

    /// Returns a shared handle to the i-th job, or `None` when out of range.
    pub fn job(&self, index: usize) -> Option<JobRef> {
        self.shared.state.lock().jobs.get(index).cloned()
    }

    /// Total number of jobs in the job set (appended plus spawned).
    pub fn job_count(&self) -> usize {
        self.shared.state.lock().jobs.len()
    }

    /// Number of jobs whose execution has completed (successfully or not).
    pub fn finished_count(&self) -> usize {
        self.shared.state.lock().finished
    }

    /// Number of workers in the pool.
    pub fn worker_count(&self) -> usize {
        self.shared.state.lock().workers.len()
    }

    /// Number of workers currently executing a job.
    pub fn workers_running(&self) -> usize {
        self.shared
            .state
            .lock()
            .workers
            .iter()
            .filter(|w| w.is_running())
            .count()
    }

    /// True while a run is in progress.
    pub fn is_running(&self) -> bool {
        self.shared.state.lock().status == Status::Running
    }

    /// True when no run is in progress, for whatever reason.
    pub fn is_idle(&self) -> bool {
        !self.is_running()
    }

    /// True if the latest run completed all jobs within the error budget.
    pub fn is_finished(&self) -> bool {
        self.shared.state.lock().status == Status::Finished
    }

    /// True if a stop has been requested for the current (or latest) run.
    pub fn is_stopped(&self) -> bool {
        self.shared.state.lock().stop
    }

    /// The error that surrendered the latest run, if any.
    pub fn last_error(&self) -> Option<ManagerError> {
        self.shared.state.lock().last_error
    }

    fn spawn_progress_ticker(&self, period: Duration, token: CancellationToken) {
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // Publishing while holding the lock keeps progress
                        // values ordered relative to the terminal events of
                        // the completion path; a broadcast send never runs
                        // subscriber code synchronously.
                        let st = shared.state.lock();
                        if token.is_cancelled() {
                            break;
                        }
                        if st.jobs.is_empty() {
                            continue;
                        }
                        let percent = (100 * st.finished / st.jobs.len()) as u8;
                        shared
                            .bus
                            .publish(Event::now(EventKind::Progress).with_progress(percent));
                    }
                }
            }
        });
    }
}

/// Resolves a requested worker count, falling back to the system's available
/// parallelism for 0.
fn resolve_workers(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
