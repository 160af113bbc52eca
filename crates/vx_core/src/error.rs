//! Error taxonomy shared by the scheduler and render pipeline.
//!
//! Every boundary operation across the core returns a
//! success-or-failure [`Result`] carrying one of the kinds described in
//! the design's error-handling section. Most kinds are recoverable and
//! are logged and absorbed at their call site (see each crate's
//! module docs for exactly where); only fatal conditions are meant to
//! propagate to application shutdown.

use thiserror::Error;

/// The error type shared across `vx_tasks` and `vx_render`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Operation invoked in the wrong phase (submit before init, begin
    /// a pass while another is active, process after shutdown, ...).
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Bad handle, nonsense size, or otherwise malformed parameter.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// A bounded resource (queue, slot table, ring chunk) is full.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The backend reported a failure executing a command.
    #[error("backend failure: {0}")]
    BackendFailure(String),

    /// The requested capability/enum value is not supported by this
    /// backend.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A task panicked while resuming. Stored as the task's failure
    /// per the `completed ⇒ exactly one of {value, failure}` invariant.
    #[error("task panicked: {0}")]
    TaskPanicked(String),
}

/// Alias for `Result<T, EngineError>`.
pub type Result<T> = std::result::Result<T, EngineError>;
