//! Typed error hierarchy for the txpipe orchestrator.
//!
//! One tagged enum covers every way the pipeline can fail, so the
//! orchestrator dispatches on kind rather than on library-specific error
//! classes. Every fatal variant converges on the same teardown path.

use thiserror::Error;

/// Errors from any pipeline subsystem.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The command channel or the store could not be reached at setup.
    /// The pipeline never starts.
    #[error("{subsystem} unreachable: {message}")]
    Connectivity { subsystem: String, message: String },

    /// The remote launch command returned a nonzero exit status.
    /// Any nonzero status is fatal; there is no "already running" carve-out.
    #[error("Failed to launch {job}: remote exit status {exit_code}")]
    JobLaunch { job: String, exit_code: i32 },

    /// The completion poller exhausted its attempt budget.
    #[error("Timed out waiting for {job} after {attempts} attempts")]
    JobTimeout { job: String, attempts: u32 },

    /// A candidate or verification query failed.
    #[error("Query failed: {message}")]
    Query { message: String },

    /// An insert failed. A rollback has already been issued by the time
    /// this propagates.
    #[error("Insert failed (rolled back): {message}")]
    Insert { message: String },

    /// The scripts file is missing, misordered, or has the wrong statement count.
    #[error("Scripts file invalid: {message}")]
    Script { message: String },

    /// The operator answered "no" at the phase 2 gate. Clean abort, not an error.
    #[error("Cancelled by operator at confirmation gate")]
    OperatorCancel,

    /// The ssh invocation itself failed mid-run (session lost, binary missing).
    #[error("Command channel I/O error: {message}")]
    ChannelIo { message: String },
}

impl PipelineError {
    /// Operator cancellation is the one abort path that is not a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, PipelineError::OperatorCancel)
    }
}
