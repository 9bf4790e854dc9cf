//! # Engine configuration.
//!
//! [`Config`] collects the knobs of a [`JobManager`](crate::JobManager):
//! worker pool size, error budget, progress reporting cadence, per-job
//! finish notifications and event bus capacity.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use jobvisor::Config;
//!
//! let mut cfg = Config::default();
//! cfg.workers = 4;
//! cfg.allowed_errors = 10;
//! cfg.progress_interval = Duration::from_millis(250);
//!
//! assert_eq!(cfg.workers, 4);
//! ```

use std::time::Duration;

/// Configuration for a [`JobManager`](crate::JobManager).
#[derive(Clone, Debug)]
pub struct Config {
    /// Number of workers in the pool (0 = the system's available parallelism).
    pub workers: usize,
    /// Number of jobs allowed to fail before the run is surrendered with
    /// `TooManyErrors` (negative = unbounded tolerance).
    pub allowed_errors: i64,
    /// Period of the progress ticker (zero = no progress events).
    pub progress_interval: Duration,
    /// When true, every completed job is reported with a `JobFinished` event.
    pub report_job_finish: bool,
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
}

impl Default for Config {
    /// Provides a default configuration:
    /// - `workers = 0` (available parallelism)
    /// - `allowed_errors = 0` (first failing job surrenders the run)
    /// - `progress_interval = 0` (no progress events)
    /// - `report_job_finish = false`
    /// - `bus_capacity = 1024`
    fn default() -> Self {
        Self {
            workers: 0,
            allowed_errors: 0,
            progress_interval: Duration::ZERO,
            report_job_finish: false,
            bus_capacity: 1024,
        }
    }
}
