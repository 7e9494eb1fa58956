//! Error types for the lorebook engine.
//!
//! The taxonomy separates content-level problems, which stopping
//! conditions recover locally, from structural problems, which surface
//! to the caller as `Err` values.

use thiserror::Error;

/// The main error type for lorebook operations.
#[derive(Debug, Error)]
pub enum LorebookError {
    /// A step's retry loop exhausted its iteration budget without
    /// reaching a terminal status.
    ///
    /// Distinct from a step deciding it failed: that path ends the
    /// pipeline gracefully through the context's flow control. This one
    /// signals the stopping condition never converged.
    #[error("Step '{step}' exceeded {iterations} iterations without completing")]
    MaxIterationsExceeded {
        /// The step name.
        step: String,
        /// The iteration budget that was exhausted.
        iterations: u32,
    },

    /// The session does not exist or is owned by a different user.
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// The requested session id.
        session_id: String,
    },

    /// An illegal session state transition was requested.
    #[error("Session '{session_id}' is {actual}, expected {expected}")]
    InvalidSessionState {
        /// The session id.
        session_id: String,
        /// The state the operation requires.
        expected: String,
        /// The state the session is actually in.
        actual: String,
    },

    /// A provider-level failure.
    #[error("{0}")]
    Provider(#[from] ProviderError),

    /// A generic internal error (joined-task panics and the like).
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors from the language-model provider seam.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    /// The request could not be completed.
    #[error("Provider request failed: {0}")]
    Request(String),

    /// The incremental stream failed mid-flight.
    #[error("Provider stream failed: {0}")]
    Stream(String),

    /// The provider's cleanup hook failed.
    #[error("Provider cleanup failed: {0}")]
    Cleanup(String),
}
