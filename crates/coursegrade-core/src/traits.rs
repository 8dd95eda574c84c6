//! Collaborator trait definitions.
//!
//! The grader talks to a content store, an identity provider, a progress
//! store, a remote code executor, and a DOM evaluator. Implementations live
//! in `coursegrade-executors`, `coursegrade-sandbox`, the in-memory
//! [`memory`](crate::memory) module, or the embedding application.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::model::{FileMap, Language, ProgressRecord, Task, TestCase};
use crate::results::CaseResult;

// ---------------------------------------------------------------------------
// Backend-as-a-service collaborators
// ---------------------------------------------------------------------------

/// Read access to authored content, plus ordering metadata writes.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Fetch one content node by id.
    async fn get_task(&self, content_id: &str) -> Result<Task, StoreError>;

    /// Every content node (tasks and lessons), ascending by `step_order`.
    async fn list_tasks_ordered_by_step(&self) -> Result<Vec<Task>, StoreError>;

    /// Move a node to a new section tag and position.
    async fn update_ordering(
        &self,
        content_id: &str,
        tag: &str,
        step_order: u32,
    ) -> Result<(), StoreError>;
}

/// Who is submitting.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn current_learner_id(&self) -> Option<String>;
}

/// Per-learner completion records keyed by `(learner_id, content_id)`.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Mark a node completed at the given time. Last write wins.
    async fn write_completion(
        &self,
        learner_id: &str,
        content_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn read_completion(
        &self,
        learner_id: &str,
        content_id: &str,
    ) -> Result<Option<ProgressRecord>, StoreError>;

    /// Store a record, replacing any existing one with the same key.
    async fn initialize(&self, record: ProgressRecord) -> Result<(), StoreError>;

    async fn list_for_learner(&self, learner_id: &str) -> Result<Vec<ProgressRecord>, StoreError>;

    /// Rewrite the denormalized tag and position of an existing record.
    async fn update_ordering(
        &self,
        learner_id: &str,
        content_id: &str,
        tag: &str,
        step_order: u32,
    ) -> Result<(), StoreError>;
}

// ---------------------------------------------------------------------------
// Remote execution
// ---------------------------------------------------------------------------

/// Result of running a script on a remote interpreter.
///
/// Every failure is a value: executors never error or panic to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// The script ran; this is what it printed.
    Output(String),
    /// No answer within the wait bound. The call was cancelled.
    Timeout(#[serde(with = "duration_ms")] Duration),
    /// The service could not be reached.
    NetworkError(String),
    /// The service answered with an error.
    RemoteError(String),
}

impl ExecutionOutcome {
    pub fn output(&self) -> Option<&str> {
        match self {
            ExecutionOutcome::Output(out) => Some(out),
            _ => None,
        }
    }
}

/// Runs scripts on out-of-process interpreters.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Dispatch `source` to the service registered for `language`.
    async fn execute(&self, language: Language, source: &str) -> ExecutionOutcome;
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

// ---------------------------------------------------------------------------
// DOM evaluation
// ---------------------------------------------------------------------------

/// Evaluates markup/style test cases against a submission's files.
///
/// Implementations own the sandbox lifecycle: one sandbox per call,
/// released before returning.
pub trait DomEvaluator: Send + Sync {
    /// Evaluate `cases` (paired with their index in the task) and return one
    /// result per case, never fewer.
    fn evaluate(&self, files: &FileMap, cases: &[(usize, &TestCase)]) -> Vec<CaseResult>;
}
