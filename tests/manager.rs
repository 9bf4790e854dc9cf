//! Integration tests for the job manager.
//!
//! Each test drives a [`JobManager`] end to end: append jobs, start, observe
//! events or poll the status accessors, then verify counters, job state and
//! the terminal outcome.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::{sleep, timeout, Instant};

use jobvisor::{
    check_stop, Event, EventKind, Job, JobManager, JobRef, JobState, ManagerError,
    SequentialQueue, PANIC_ERROR_CODE,
};

/// Computes the sum 1 + 2 + … + max by brute force.
struct SumJob {
    state: JobState,
    max: u64,
    sum: AtomicU64,
}

impl SumJob {
    fn new(name: impl Into<String>, max: u64) -> Arc<Self> {
        Arc::new(Self {
            state: JobState::new(name),
            max,
            sum: AtomicU64::new(0),
        })
    }

    fn sum(&self) -> u64 {
        self.sum.load(Ordering::SeqCst)
    }
}

impl Job for SumJob {
    fn state(&self) -> &JobState {
        &self.state
    }

    fn process(&self) {
        let mut sum = 0;
        for i in 1..=self.max {
            sum += i;
        }
        self.sum.store(sum, Ordering::SeqCst);
    }
}

/// Sleeps in short slices, polling the stop flag between them.
struct SleepJob {
    state: JobState,
    slices: u32,
}

impl SleepJob {
    fn new(name: impl Into<String>, slices: u32) -> Arc<Self> {
        Arc::new(Self {
            state: JobState::new(name),
            slices,
        })
    }
}

impl Job for SleepJob {
    fn state(&self) -> &JobState {
        &self.state
    }

    fn process(&self) {
        for _ in 0..self.slices {
            check_stop!(self);
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

/// Reports error 1 when its brute-force sum turns out odd.
struct ParityJob {
    state: JobState,
    max: u64,
}

impl ParityJob {
    fn new(max: u64) -> Arc<Self> {
        Arc::new(Self {
            state: JobState::new(format!("parity-{max}")),
            max,
        })
    }
}

impl Job for ParityJob {
    fn state(&self) -> &JobState {
        &self.state
    }

    fn process(&self) {
        let mut sum: u64 = 0;
        for i in 1..=self.max {
            sum += i;
        }
        if sum % 2 == 1 {
            self.state.report_error(1);
        }
    }
}

/// A job that is never ready to start.
struct NeverReadyJob {
    state: JobState,
}

impl NeverReadyJob {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: JobState::new("never-ready"),
        })
    }
}

impl Job for NeverReadyJob {
    fn state(&self) -> &JobState {
        &self.state
    }

    fn process(&self) {}

    fn can_start(&self) -> bool {
        false
    }
}

/// Spawns two follow-up sum jobs, one per generator call.
struct SpawningJob {
    state: JobState,
    spawned: AtomicU32,
}

impl SpawningJob {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: JobState::new("spawner"),
            spawned: AtomicU32::new(0),
        })
    }
}

impl Job for SpawningJob {
    fn state(&self) -> &JobState {
        &self.state
    }

    fn process(&self) {}

    fn next_spawned_job(&self) -> Option<JobRef> {
        let n = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= 2 {
            Some(SumJob::new(format!("spawned-{n}"), 1000 * n as u64))
        } else {
            None
        }
    }
}

/// Polls until the manager goes idle, panicking after 30 seconds.
async fn wait_idle(manager: &JobManager) {
    let deadline = Instant::now() + Duration::from_secs(30);
    while manager.is_running() {
        assert!(Instant::now() < deadline, "manager did not go idle in time");
        sleep(Duration::from_millis(2)).await;
    }
}

/// Receives events until the first terminal one, returning everything seen.
async fn collect_until_terminal(
    rx: &mut tokio::sync::broadcast::Receiver<Event>,
) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        let ev = timeout(Duration::from_secs(30), rx.recv())
            .await
            .expect("no terminal event in time")
            .expect("event bus closed early");
        let terminal = ev.is_terminal();
        events.push(ev);
        if terminal {
            return events;
        }
    }
}

// ---------------------------------------------------------------------------
// Basic runs
// ---------------------------------------------------------------------------

/// Three sum jobs on three workers produce the expected triangle numbers.
#[tokio::test(flavor = "multi_thread")]
async fn triangle_sums_compute_on_three_workers() {
    let manager = JobManager::new(3);
    let jobs = [
        SumJob::new("sum-100", 100),
        SumJob::new("sum-200", 200),
        SumJob::new("sum-300", 300),
    ];
    for job in &jobs {
        manager.append_job(job.clone());
    }

    assert!(manager.start());
    wait_idle(&manager).await;

    assert!(manager.is_finished());
    assert_eq!(manager.finished_count(), 3);
    assert_eq!(jobs[0].sum(), 5050);
    assert_eq!(jobs[1].sum(), 20100);
    assert_eq!(jobs[2].sum(), 45150);
    for job in &jobs {
        assert!(job.state().is_finished());
    }
}

/// An empty job set concludes immediately, with the finished signal emitted.
#[tokio::test(flavor = "multi_thread")]
async fn empty_manager_finishes_immediately() {
    let manager = JobManager::new(2);
    let mut rx = manager.subscribe();

    assert!(manager.start());

    assert_eq!(manager.job_count(), 0);
    assert_eq!(manager.finished_count(), 0);
    assert!(!manager.is_running());
    assert!(manager.is_finished());

    let events = collect_until_terminal(&mut rx).await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Finished);
}

/// A large batch drains completely and every job ends up finished.
#[tokio::test(flavor = "multi_thread")]
async fn thousand_jobs_all_finish() {
    let manager = JobManager::new(0);
    for i in 0..1000u64 {
        manager.append_job(SumJob::new(format!("sum-{i}"), i + 100));
    }
    assert_eq!(manager.job_count(), 1000);

    assert!(manager.start());
    wait_idle(&manager).await;

    assert!(manager.is_finished());
    assert_eq!(manager.finished_count(), 1000);
    for i in 0..1000 {
        let job = manager.job(i).expect("job index in range");
        assert!(job.state().is_finished(), "job {i} not finished");
    }
}

/// With a single worker, jobs complete exactly in append order.
#[tokio::test(flavor = "multi_thread")]
async fn one_worker_completes_in_append_order() {
    let manager = JobManager::new(1);
    manager.set_report_job_finish(true);
    let mut rx = manager.subscribe();
    for i in 0..10u64 {
        manager.append_job(SumJob::new(format!("job-{i}"), 50 * (10 - i)));
    }

    assert!(manager.start());
    let events = collect_until_terminal(&mut rx).await;

    let order: Vec<String> = events
        .iter()
        .filter(|ev| ev.kind == EventKind::JobFinished)
        .filter_map(|ev| ev.name.clone())
        .collect();
    let expected: Vec<String> = (0..10).map(|i| format!("job-{i}")).collect();
    assert_eq!(order, expected);
    assert_eq!(events.last().map(|ev| ev.kind), Some(EventKind::Finished));
}

/// Exactly one terminal event is emitted per run.
#[tokio::test(flavor = "multi_thread")]
async fn terminal_event_is_emitted_exactly_once() {
    let manager = JobManager::new(4);
    let mut rx = manager.subscribe();
    for i in 0..50u64 {
        manager.append_job(SumJob::new(format!("sum-{i}"), i + 10));
    }

    assert!(manager.start());
    let events = collect_until_terminal(&mut rx).await;
    wait_idle(&manager).await;

    // nothing may follow the terminal event
    sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
    assert_eq!(events.iter().filter(|ev| ev.is_terminal()).count(), 1);
}

// ---------------------------------------------------------------------------
// Dependencies and readiness
// ---------------------------------------------------------------------------

/// Dependent jobs start only after their prerequisites finished; job 5,
/// at the end of the dependency chain, completes last.
#[tokio::test(flavor = "multi_thread")]
async fn dependency_chain_orders_completions() {
    let manager = JobManager::new(5);
    manager.set_report_job_finish(true);
    let mut rx = manager.subscribe();

    let jobs: Vec<Arc<SumJob>> = (0..7)
        .map(|i| SumJob::new(format!("job-{i}"), 100 * (7 - i as u64)))
        .collect();
    for job in &jobs {
        manager.append_job(job.clone());
    }

    // 4 → {0, 1}; 6 → {2, 4}; 5 → {6, 3}
    jobs[4].state().add_dependency(manager.job(0).expect("job 0"));
    jobs[4].state().add_dependency(manager.job(1).expect("job 1"));
    jobs[6].state().add_dependency(manager.job(2).expect("job 2"));
    jobs[6].state().add_dependency(manager.job(4).expect("job 4"));
    jobs[5].state().add_dependency(manager.job(6).expect("job 6"));
    jobs[5].state().add_dependency(manager.job(3).expect("job 3"));

    assert!(manager.start());
    let events = collect_until_terminal(&mut rx).await;

    let order: Vec<String> = events
        .iter()
        .filter(|ev| ev.kind == EventKind::JobFinished)
        .filter_map(|ev| ev.name.clone())
        .collect();
    assert_eq!(order.len(), 7, "not every job reported finished");

    let position =
        |name: &str| order.iter().position(|n| n == name).expect("job reported");
    assert!(position("job-4") < position("job-6"));
    assert!(position("job-6") < position("job-5"));
    assert_eq!(order.last().map(String::as_str), Some("job-5"));
}

/// A permanently unready job strands the queue: the engine surrenders with
/// NoJobReady after every other job completed, instead of deadlocking.
#[tokio::test(flavor = "multi_thread")]
async fn unready_job_surrenders_with_no_job_ready() {
    let manager = JobManager::new(0);
    for i in 0..10u64 {
        manager.append_job(SumJob::new(format!("a-{i}"), i + 10));
    }
    manager.append_job(NeverReadyJob::new());
    for i in 0..10u64 {
        manager.append_job(SumJob::new(format!("b-{i}"), i + 30));
    }

    assert!(manager.start());
    wait_idle(&manager).await;

    assert!(!manager.is_finished());
    assert_eq!(manager.last_error(), Some(ManagerError::NoJobReady));
    assert_eq!(manager.finished_count(), 20);
}

/// When not even the first dispatch finds a ready job, the run fails right
/// at start instead of hanging.
#[tokio::test(flavor = "multi_thread")]
async fn all_unready_jobs_fail_fast_at_start() {
    let manager = JobManager::new(2);
    let mut rx = manager.subscribe();
    manager.append_job(NeverReadyJob::new());

    assert!(manager.start());
    wait_idle(&manager).await;

    assert_eq!(manager.last_error(), Some(ManagerError::NoJobReady));
    let events = collect_until_terminal(&mut rx).await;
    assert_eq!(events.last().map(|ev| ev.kind), Some(EventKind::Failed));
    assert_eq!(
        events.last().and_then(|ev| ev.error),
        Some(ManagerError::NoJobReady)
    );
}

// ---------------------------------------------------------------------------
// Error budget
// ---------------------------------------------------------------------------

/// Accumulated job failures beyond the budget surrender the run.
#[tokio::test(flavor = "multi_thread")]
async fn error_budget_surrenders_with_too_many_errors() {
    let manager = JobManager::new(0);
    let mut rx = manager.subscribe();
    for i in 0..1000u64 {
        manager.append_job(ParityJob::new(100 + i));
    }
    manager.set_allowed_errors(10);

    assert!(manager.start());
    wait_idle(&manager).await;

    assert!(!manager.is_finished());
    assert_eq!(manager.last_error(), Some(ManagerError::TooManyErrors));
    let events = collect_until_terminal(&mut rx).await;
    assert_eq!(
        events.last().and_then(|ev| ev.error),
        Some(ManagerError::TooManyErrors)
    );
}

/// A negative budget keeps counting failures but never terminates the run.
#[tokio::test(flavor = "multi_thread")]
async fn unbounded_error_tolerance_completes_the_run() {
    let manager = JobManager::new(4);
    manager.set_allowed_errors(-1);
    for i in 0..10u64 {
        // odd triangle numbers make some of these fail
        manager.append_job(ParityJob::new(i + 1));
    }

    assert!(manager.start());
    wait_idle(&manager).await;

    assert!(manager.is_finished());
    assert_eq!(manager.finished_count(), 10);
    let failed = (0..10)
        .filter(|&i| manager.job(i).expect("in range").state().is_error())
        .count();
    assert!(failed > 0, "expected at least one failing parity job");
}

/// A panicking body is caught, reported as a failing job and accounted
/// against the budget.
#[tokio::test(flavor = "multi_thread")]
async fn panicking_job_counts_as_error() {
    struct PanicJob {
        state: JobState,
    }

    impl Job for PanicJob {
        fn state(&self) -> &JobState {
            &self.state
        }

        fn process(&self) {
            panic!("boom");
        }
    }

    let manager = JobManager::new(2);
    let job: JobRef = Arc::new(PanicJob {
        state: JobState::new("panics"),
    });
    manager.append_job(job.clone());

    assert!(manager.start());
    wait_idle(&manager).await;

    assert!(!manager.is_finished());
    assert_eq!(manager.last_error(), Some(ManagerError::TooManyErrors));
    assert_eq!(job.state().error_code(), PANIC_ERROR_CODE);
}

// ---------------------------------------------------------------------------
// Stop, clear, live resize
// ---------------------------------------------------------------------------

/// A stop request drains in-flight jobs, prevents further dispatch and emits
/// the stopped signal; issuing it twice changes nothing.
#[tokio::test(flavor = "multi_thread")]
async fn stop_drains_and_emits_stopped() {
    let manager = JobManager::new(2);
    let mut rx = manager.subscribe();
    for i in 0..50 {
        manager.append_job(SleepJob::new(format!("sleep-{i}"), 10));
    }

    assert!(manager.start());
    sleep(Duration::from_millis(15)).await;
    manager.stop();
    manager.stop();
    wait_idle(&manager).await;

    assert!(manager.is_stopped());
    assert!(!manager.is_finished());
    assert!(manager.finished_count() < 50);
    let events = collect_until_terminal(&mut rx).await;
    assert_eq!(events.last().map(|ev| ev.kind), Some(EventKind::Stopped));

    sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err(), "no event may follow the stop signal");
}

/// A stop issued before start is harmless: start resets the flag and the
/// run completes normally.
#[tokio::test(flavor = "multi_thread")]
async fn stop_before_start_keeps_start_legal() {
    let manager = JobManager::new(2);
    manager.append_job(SumJob::new("sum", 100));

    manager.stop();
    assert!(manager.is_stopped());
    assert!(manager.start());
    wait_idle(&manager).await;

    assert!(manager.is_finished());
    assert!(!manager.is_stopped());
    assert_eq!(manager.finished_count(), 1);
}

/// Clearing an idle manager empties the job set; a retained handle keeps
/// its job alive.
#[tokio::test(flavor = "multi_thread")]
async fn clear_when_idle_resets_the_job_set() {
    let manager = JobManager::new(2);
    let job = SumJob::new("kept", 100);
    manager.append_job(job.clone());
    manager.append_job(SumJob::new("dropped", 10));
    assert_eq!(manager.job_count(), 2);

    let handle = manager.job(0).expect("job 0");
    manager.clear();
    assert_eq!(manager.job_count(), 0);
    assert!(manager.job(0).is_none());

    // the retained handle still reaches the job
    assert_eq!(handle.name(), "kept");
    assert_eq!(job.sum(), 0);
}

/// Clear is refused while a run is in progress.
#[tokio::test(flavor = "multi_thread")]
async fn clear_while_running_is_a_noop() {
    let manager = JobManager::new(2);
    for i in 0..20 {
        manager.append_job(SleepJob::new(format!("sleep-{i}"), 5));
    }

    assert!(manager.start());
    assert!(!manager.start(), "second start while running must be refused");
    manager.clear();
    assert_eq!(manager.job_count(), 20);
    wait_idle(&manager).await;

    assert!(manager.is_finished());
    assert_eq!(manager.finished_count(), 20);
}

/// Workers added mid-run pick up queued jobs immediately and raise the
/// observable parallelism above the original pool size.
#[tokio::test(flavor = "multi_thread")]
async fn add_workers_mid_run_increases_parallelism() {
    let manager = JobManager::new(4);
    for i in 0..100 {
        manager.append_job(SleepJob::new(format!("sleep-{i}"), 15));
    }

    assert!(manager.start());
    assert_eq!(manager.worker_count(), 4);

    let mut peak = 0;
    let mut resized = false;
    while manager.is_running() {
        if !resized && manager.finished_count() >= 5 {
            manager.add_workers(4);
            resized = true;
        }
        peak = peak.max(manager.workers_running());
        assert!(manager.workers_running() <= manager.worker_count());
        sleep(Duration::from_millis(2)).await;
    }

    assert!(resized, "resize point never reached");
    assert_eq!(manager.worker_count(), 8);
    assert!(peak > 4, "peak parallelism {peak} never exceeded the original pool");
    assert!(manager.is_finished());
    assert_eq!(manager.finished_count(), 100);
}

/// With at least as many workers as jobs, the whole batch is bound to
/// workers by the time start returns.
#[tokio::test(flavor = "multi_thread")]
async fn wide_pool_starts_every_job_at_once() {
    let manager = JobManager::new(8);
    for i in 0..4 {
        manager.append_job(SleepJob::new(format!("sleep-{i}"), 40));
    }

    assert!(manager.start());
    assert_eq!(manager.workers_running(), 4);
    wait_idle(&manager).await;
    assert!(manager.is_finished());
}

// ---------------------------------------------------------------------------
// Spawning and progress
// ---------------------------------------------------------------------------

/// A finished job's spawn generator is drained; the spawned jobs join the
/// set, run, and carry the spawned flag.
#[tokio::test(flavor = "multi_thread")]
async fn spawned_jobs_run_and_carry_the_flag() {
    let manager = JobManager::new(4);
    manager.append_job(SpawningJob::new());

    assert!(manager.start());
    wait_idle(&manager).await;

    assert!(manager.is_finished());
    assert_eq!(manager.job_count(), 3);
    assert_eq!(manager.finished_count(), 3);
    assert!(!manager.job(0).expect("job 0").state().is_spawned());
    assert!(manager.job(1).expect("job 1").state().is_spawned());
    assert!(manager.job(2).expect("job 2").state().is_spawned());
}

/// The progress ticker reports the completed percentage and lands on a
/// final 100 right before the finished signal.
#[tokio::test(flavor = "multi_thread")]
async fn progress_reaches_one_hundred() {
    let manager = JobManager::new(2);
    manager.set_progress_interval(Duration::from_millis(5));
    let mut rx = manager.subscribe();
    for i in 0..10 {
        manager.append_job(SleepJob::new(format!("sleep-{i}"), 5));
    }

    assert!(manager.start());
    let events = collect_until_terminal(&mut rx).await;

    let progress: Vec<u8> = events
        .iter()
        .filter(|ev| ev.kind == EventKind::Progress)
        .filter_map(|ev| ev.progress)
        .collect();
    assert!(!progress.is_empty());
    assert!(progress.iter().all(|&p| p <= 100));
    assert!(progress.windows(2).all(|w| w[0] <= w[1]), "progress went backwards");
    assert_eq!(progress.last(), Some(&100));
    assert_eq!(events.last().map(|ev| ev.kind), Some(EventKind::Finished));
}

// ---------------------------------------------------------------------------
// Subscribers
// ---------------------------------------------------------------------------

/// Subscribers attached through the manager receive the per-job and
/// terminal events of a run, in order.
#[tokio::test(flavor = "multi_thread")]
async fn attached_subscriber_receives_the_event_stream() {
    use async_trait::async_trait;
    use jobvisor::Subscribe;

    struct Counter {
        jobs: AtomicU32,
        terminals: AtomicU32,
    }

    #[async_trait]
    impl Subscribe for Counter {
        async fn on_event(&self, ev: &Event) {
            match ev.kind {
                EventKind::JobFinished => {
                    self.jobs.fetch_add(1, Ordering::SeqCst);
                }
                EventKind::Finished => {
                    self.terminals.fetch_add(1, Ordering::SeqCst);
                }
                _ => {}
            }
        }

        fn name(&self) -> &'static str {
            "counter"
        }
    }

    let manager = JobManager::new(2);
    manager.set_report_job_finish(true);
    let counter = Arc::new(Counter {
        jobs: AtomicU32::new(0),
        terminals: AtomicU32::new(0),
    });
    let subs: Vec<Arc<dyn Subscribe>> = vec![counter.clone()];
    manager.attach(subs);

    for i in 0..10u64 {
        manager.append_job(SumJob::new(format!("sum-{i}"), i + 100));
    }
    assert!(manager.start());
    wait_idle(&manager).await;

    // the pump and the subscriber worker drain asynchronously
    let deadline = Instant::now() + Duration::from_secs(10);
    while counter.terminals.load(Ordering::SeqCst) == 0 {
        assert!(Instant::now() < deadline, "terminal event never reached the subscriber");
        sleep(Duration::from_millis(2)).await;
    }

    // per-job events precede the terminal event in queue order
    assert_eq!(counter.jobs.load(Ordering::SeqCst), 10);
    assert_eq!(counter.terminals.load(Ordering::SeqCst), 1);
}

// ---------------------------------------------------------------------------
// Sequential queue inside a manager
// ---------------------------------------------------------------------------

/// Records the order and the worker thread its steps ran on.
struct TracedStep {
    state: JobState,
    id: usize,
    trace: Arc<Mutex<Vec<(usize, std::thread::ThreadId)>>>,
}

impl Job for TracedStep {
    fn state(&self) -> &JobState {
        &self.state
    }

    fn process(&self) {
        self.trace
            .lock()
            .push((self.id, std::thread::current().id()));
    }
}

/// Sub-jobs of a sequential queue run in order, inline on a single worker
/// thread, while the queue itself is scheduled like any other job.
#[tokio::test(flavor = "multi_thread")]
async fn sequential_queue_runs_inline_on_one_worker() {
    let manager = JobManager::new(4);
    let trace = Arc::new(Mutex::new(Vec::new()));
    let queue = SequentialQueue::new("steps");
    for id in 0..50 {
        queue.append(Arc::new(TracedStep {
            state: JobState::new(format!("step-{id}")),
            id,
            trace: trace.clone(),
        }));
    }
    manager.append_job(queue.clone());

    assert!(manager.start());
    wait_idle(&manager).await;

    assert!(manager.is_finished());
    assert!(queue.state().is_finished());

    let trace = trace.lock();
    let order: Vec<usize> = trace.iter().map(|(id, _)| *id).collect();
    assert_eq!(order, (0..50).collect::<Vec<_>>());
    let first_thread = trace[0].1;
    assert!(trace.iter().all(|(_, thread)| *thread == first_thread));
}
