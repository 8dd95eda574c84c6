//! Per-case results and the aggregate verdict.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::TestCase;

/// Why a single test case failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CaseFailure {
    /// No element matches the selector.
    ElementNotFound { selector: String },
    /// The selector could not be parsed.
    InvalidSelector { selector: String, reason: String },
    /// One or more computed style properties differ.
    StyleMismatch { properties: Vec<PropertyMismatch> },
    /// Text content or script output differs from the expectation.
    OutputMismatch { expected: String, actual: String },
    /// The execution service did not answer within the bound.
    ExecutionTimeout { timeout_ms: u64 },
    /// The execution service could not be reached.
    ExecutionNetworkError { message: String },
    /// The execution service reported an error.
    RemoteExecutionError { message: String },
    /// The case targets a file that is neither markup, style nor script.
    UnsupportedTarget { file_name: String },
    /// The case asks for an event the sandbox cannot dispatch.
    UnsupportedEvent { event_type: String },
}

impl CaseFailure {
    pub fn timeout(after: Duration) -> Self {
        CaseFailure::ExecutionTimeout {
            timeout_ms: after.as_millis() as u64,
        }
    }

    /// Short label used in tables and logs.
    pub fn label(&self) -> &'static str {
        match self {
            CaseFailure::ElementNotFound { .. } => "element not found",
            CaseFailure::InvalidSelector { .. } => "invalid selector",
            CaseFailure::StyleMismatch { .. } => "style mismatch",
            CaseFailure::OutputMismatch { .. } => "output mismatch",
            CaseFailure::ExecutionTimeout { .. } => "execution timeout",
            CaseFailure::ExecutionNetworkError { .. } => "network error",
            CaseFailure::RemoteExecutionError { .. } => "remote error",
            CaseFailure::UnsupportedTarget { .. } => "unsupported file",
            CaseFailure::UnsupportedEvent { .. } => "unsupported event",
        }
    }

    /// Human-readable explanation for the learner.
    pub fn describe(&self) -> String {
        match self {
            CaseFailure::ElementNotFound { selector } => {
                format!("no element matches `{selector}`")
            }
            CaseFailure::InvalidSelector { selector, reason } => {
                format!("`{selector}` is not a valid selector: {reason}")
            }
            CaseFailure::StyleMismatch { properties } => properties
                .iter()
                .map(|p| {
                    format!(
                        "{}: expected `{}`, got `{}`",
                        p.property, p.expected, p.actual
                    )
                })
                .collect::<Vec<_>>()
                .join("; "),
            CaseFailure::OutputMismatch { expected, actual } => {
                format!("expected `{expected}`, got `{actual}`")
            }
            CaseFailure::ExecutionTimeout { timeout_ms } => {
                format!("execution timed out after {timeout_ms}ms")
            }
            CaseFailure::ExecutionNetworkError { message } => {
                format!("could not reach the execution service: {message}")
            }
            CaseFailure::RemoteExecutionError { message } => {
                format!("execution error: {message}")
            }
            CaseFailure::UnsupportedTarget { file_name } => {
                format!("`{file_name}` cannot be graded")
            }
            CaseFailure::UnsupportedEvent { event_type } => {
                format!("`{event_type}` events cannot be dispatched in the sandbox")
            }
        }
    }
}

/// A computed style property that differs from the expectation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyMismatch {
    pub property: String,
    pub expected: String,
    pub actual: String,
}

/// Outcome of one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    /// Position of the case in the task's test case list.
    pub index: usize,
    pub file_name: String,
    pub input: String,
    /// Empty when the case passed.
    #[serde(default)]
    pub failures: Vec<CaseFailure>,
}

impl CaseResult {
    pub fn pass(index: usize, case: &TestCase) -> Self {
        Self {
            index,
            file_name: case.file_name.clone(),
            input: case.input.clone(),
            failures: Vec::new(),
        }
    }

    pub fn fail(index: usize, case: &TestCase, failure: CaseFailure) -> Self {
        Self {
            failures: vec![failure],
            ..Self::pass(index, case)
        }
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Aggregate result of grading one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub passed: bool,
    /// One entry per test case, in authoring order.
    pub diagnostics: Vec<CaseResult>,
}

impl Verdict {
    /// Fold case results into a verdict. Passing is the AND of every case.
    pub fn from_results(mut diagnostics: Vec<CaseResult>) -> Self {
        diagnostics.sort_by_key(|r| r.index);
        let passed = diagnostics.iter().all(CaseResult::passed);
        Self {
            passed,
            diagnostics,
        }
    }

    pub fn failing(&self) -> impl Iterator<Item = &CaseResult> {
        self.diagnostics.iter().filter(|r| !r.passed())
    }

    pub fn failed_count(&self) -> usize {
        self.failing().count()
    }
}
