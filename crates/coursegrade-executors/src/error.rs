//! Execution client error types.

use std::time::Duration;

use thiserror::Error;

use coursegrade_core::traits::ExecutionOutcome;

/// Errors that can occur when calling an execution service.
///
/// These never reach the grader as errors: each converts into an
/// [`ExecutionOutcome`] value.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// No answer within the wait bound.
    #[error("execution timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The service could not be reached.
    #[error("network error: {0}")]
    Network(String),

    /// The service answered with an error.
    #[error("remote error: {message}")]
    Remote {
        /// HTTP status, when the error came from a non-success response.
        status: Option<u16>,
        message: String,
    },
}

impl From<ExecutionError> for ExecutionOutcome {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Timeout(after) => ExecutionOutcome::Timeout(after),
            ExecutionError::Network(message) => ExecutionOutcome::NetworkError(message),
            ExecutionError::Remote { message, .. } => ExecutionOutcome::RemoteError(message),
        }
    }
}
