//! # Example: sums
//!
//! Demonstrates the basic job manager flow.
//!
//! Shows how to:
//! - Implement a [`Job`] with a cooperative stop check
//! - Subscribe to engine events and wait for the terminal one
//! - Attach the built-in [`LogWriter`] via [`JobManager::attach`]
//!
//! ## Run
//! ```bash
//! cargo run --example sums --features logging
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jobvisor::{check_stop, Job, JobManager, JobState, LogWriter, Subscribe};

/// Computes the sum 1 + 2 + … + max by brute force.
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("=== sums example ===\n");

    // 1. Create a manager with three workers and progress reporting
    let manager = JobManager::new(3);
    manager.set_report_job_finish(true);
    manager.set_progress_interval(Duration::from_millis(100));

    // 2. Route every event through the built-in logging subscriber
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter)];
    manager.attach(subs);

    // 3. Queue the work
    let jobs = [SumJob::new(100), SumJob::new(200), SumJob::new(300)];
    for job in &jobs {
        manager.append_job(job.clone());
    }

    // 4. Start and wait for the terminal event
    let mut rx = manager.subscribe();
    manager.start();
    loop {
        let ev = rx.recv().await?;
        if ev.is_terminal() {
            break;
        }
    }

    // 5. The jobs are still reachable, results included
    for job in &jobs {
        println!("sum(1..={}) = {}", job.max, job.sum.load(Ordering::SeqCst));
    }

    println!("\n=== example completed ===");
    Ok(())
}
