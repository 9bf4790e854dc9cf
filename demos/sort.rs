//! # Example: sort
//!
//! Sorts a large array in parallel: one job per chunk, plus a merge job that
//! declares every chunk job as a dependency. The dispatcher holds the merge
//! back until all chunks finished, so no manual synchronization is needed.
//!
//! ## Flow
//! ```text
//! main()
//!   ├─► split data into chunks, one SortChunkJob each
//!   ├─► MergeJob.add_dependency(chunk job) for every chunk
//!   ├─► manager.start()
//!   │     ├─► chunk jobs run in parallel
//!   │     └─► merge job becomes ready last, k-way merges the results
//!   └─► verify the merged output is sorted
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --release --example sort
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;

use jobvisor::{Job, JobManager, JobState};

const TOTAL: usize = 4_000_000;
const CHUNKS: usize = 8;

/// Sorts its own chunk of the data.
struct SortChunkJob {
    state: JobState,
    chunk: Mutex<Vec<i64>>,
}

impl SortChunkJob {
    fn new(index: usize, chunk: Vec<i64>) -> Arc<Self> {
        Arc::new(Self {
            state: JobState::new(format!("sort-chunk-{index}")),
            chunk: Mutex::new(chunk),
        })
    }
}

impl Job for SortChunkJob {
    fn state(&self) -> &JobState {
        &self.state
    }

    fn process(&self) {
        self.chunk.lock().sort_unstable();
    }
}

/// Merges the sorted chunks once every chunk job has finished.
struct MergeJob {
    state: JobState,
    inputs: Vec<Arc<SortChunkJob>>,
    output: Mutex<Vec<i64>>,
}

impl Job for MergeJob {
    fn state(&self) -> &JobState {
        &self.state
    }

    fn process(&self) {
        let chunks: Vec<Vec<i64>> = self
            .inputs
            .iter()
            .map(|job| std::mem::take(&mut *job.chunk.lock()))
            .collect();

        let mut merged = Vec::with_capacity(TOTAL);
        let mut cursors = vec![0usize; chunks.len()];
        loop {
            let mut best: Option<usize> = None;
            for (i, chunk) in chunks.iter().enumerate() {
                if cursors[i] < chunk.len()
                    && best.map_or(true, |b| chunk[cursors[i]] < chunks[b][cursors[b]])
                {
                    best = Some(i);
                }
            }
            let Some(i) = best else { break };
            merged.push(chunks[i][cursors[i]]);
            cursors[i] += 1;
        }
        *self.output.lock() = merged;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    println!("=== sort example ===\n");

    // 1. Generate random data and cut it into chunks
    let mut rng = rand::thread_rng();
    let data: Vec<i64> = (0..TOTAL).map(|_| rng.gen_range(0..10 * TOTAL as i64)).collect();
    let chunk_jobs: Vec<Arc<SortChunkJob>> = data
        .chunks(TOTAL.div_ceil(CHUNKS))
        .enumerate()
        .map(|(i, chunk)| SortChunkJob::new(i, chunk.to_vec()))
        .collect();

    // 2. The merge job depends on every chunk job
    let merge = Arc::new(MergeJob {
        state: JobState::new("merge"),
        inputs: chunk_jobs.clone(),
        output: Mutex::new(Vec::new()),
    });
    for job in &chunk_jobs {
        merge.state().add_dependency(job.clone());
    }

    // 3. Queue everything; the dispatcher orders the merge after the chunks
    let manager = JobManager::new(CHUNKS);
    for job in &chunk_jobs {
        manager.append_job(job.clone());
    }
    manager.append_job(merge.clone());

    let started = Instant::now();
    manager.start();
    while manager.is_running() {
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    println!(
        "sorted {TOTAL} elements in {} chunks: {:?}",
        CHUNKS,
        started.elapsed()
    );

    // 4. Verify
    let output = merge.output.lock();
    assert_eq!(output.len(), TOTAL);
    assert!(output.windows(2).all(|w| w[0] <= w[1]), "output not sorted");
    println!("output verified sorted\n\n=== example completed ===");
    Ok(())
}
