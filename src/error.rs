//! # Error taxonomy of the job engine.
//!
//! [`ManagerError`] describes why a run (or a session) was surrendered by the
//! engine itself. "No error" is modelled as the absence of a value
//! (`Option<ManagerError>`), never as a variant.
//!
//! Per-job failures are *not* part of this enum: a job reports a positive
//! `u32` code through [`JobState::report_error`](crate::JobState::report_error)
//! and the run only terminates once the accumulated failures exceed the
//! allowed-errors budget (then surfacing here as [`ManagerError::TooManyErrors`]).

use thiserror::Error;

/// Job error code used when a job body panics on its worker thread.
///
/// The panic is caught at the join point and accounted like any other failing
/// job; codes below [`USER_ERROR_BASE`] are reserved for the engine.
pub const PANIC_ERROR_CODE: u32 = 900;

/// Job error codes greater than or equal to this value are free for
/// application-defined meanings.
pub const USER_ERROR_BASE: u32 = 1000;

/// # Errors raised by the job manager or session manager.
///
/// These represent failures of the run as a whole, not of individual jobs.
#[non_exhaustive]
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerError {
    /// The number of failed jobs exceeded the allowed-errors budget.
    #[error("number of failed jobs exceeded the allowed error budget")]
    TooManyErrors,

    /// Jobs remain queued but none is ready to start and nothing is running;
    /// the run is stuck and surrendered instead of spinning.
    #[error("queued jobs remain but none of them is ready to start")]
    NoJobReady,

    /// The session manager could not start its embedded job manager.
    #[error("embedded job manager could not be started")]
    CouldNotStart,

    /// An internal invariant was violated. If this surfaces, please file a
    /// bug report.
    #[error("internal invariant violated")]
    ImplementationError,
}

impl ManagerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ManagerError::TooManyErrors => "too_many_errors",
            ManagerError::NoJobReady => "no_job_ready",
            ManagerError::CouldNotStart => "could_not_start",
            ManagerError::ImplementationError => "implementation_error",
        }
    }
}
