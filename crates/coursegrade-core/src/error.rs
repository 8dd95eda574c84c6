//! Error types for collaborators and the submission flow.
//!
//! Case-level failures are not errors: they are recorded as
//! [`CaseFailure`](crate::results::CaseFailure) values. The enums here cover
//! the conditions that stop a submission.

use thiserror::Error;

/// Errors reported by a content or progress store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested document does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backing service failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Errors that stop a submission from producing a result.
#[derive(Debug, Error)]
pub enum GradeError {
    /// No learner is signed in.
    #[error("no learner is signed in")]
    NotSignedIn,

    /// The content id does not exist in the content store.
    #[error("content not found: {0}")]
    ContentNotFound(String),

    /// The content node is a lesson and has nothing to grade.
    #[error("content {0} is not a gradable task")]
    NotGradable(String),

    /// The task's section is not unlocked for the learner yet.
    #[error("content {0} is locked until the previous section is completed")]
    Locked(String),

    /// A task can only be completed by a passing grade.
    #[error("content {0} must be completed by a passing submission")]
    RequiresGrading(String),

    /// Reading course content failed.
    #[error("could not load course content: {0}")]
    ContentStore(#[source] StoreError),

    /// The verdict passed but the completion record could not be written.
    #[error("could not save progress, retry: {0}")]
    Persistence(#[source] StoreError),
}

impl GradeError {
    /// Returns `true` if resubmitting the same attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GradeError::Persistence(_) | GradeError::ContentStore(StoreError::Backend(_))
        )
    }
}
