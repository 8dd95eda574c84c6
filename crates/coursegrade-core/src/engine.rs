//! Grading orchestrator.
//!
//! Routes each test case of a task to the DOM evaluator or the remote
//! executor, folds every outcome into one [`Verdict`], and on a passing
//! verdict hands the node to the progress state machine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{GradeError, StoreError};
use crate::model::{CaseTarget, Language, Submission, Task, TestCase};
use crate::normalize;
use crate::progress::{Advance, NodeState, ProgressTracker};
use crate::results::{CaseFailure, CaseResult, Verdict};
use crate::traits::{CodeExecutor, ContentStore, DomEvaluator, ExecutionOutcome, IdentityProvider};

/// Observer for grading progress.
pub trait GradeReporter: Send + Sync {
    fn on_script_executed(&self, file_name: &str, language: Language, outcome: &ExecutionOutcome);
    fn on_verdict(&self, task_id: &str, verdict: &Verdict);
}

/// No-op reporter.
pub struct NoopReporter;

impl GradeReporter for NoopReporter {
    fn on_script_executed(&self, _: &str, _: Language, _: &ExecutionOutcome) {}
    fn on_verdict(&self, _: &str, _: &Verdict) {}
}

/// Scripted cases grouped by the file they run.
type ScriptGroups<'a> = BTreeMap<&'a str, (Language, Vec<(usize, &'a TestCase)>)>;

/// Evaluates submissions against a task's test cases.
pub struct Grader {
    dom: Arc<dyn DomEvaluator>,
    executor: Arc<dyn CodeExecutor>,
}

impl Grader {
    pub fn new(dom: Arc<dyn DomEvaluator>, executor: Arc<dyn CodeExecutor>) -> Self {
        Self { dom, executor }
    }

    /// Grade a submission. Never fails: every problem becomes a diagnostic.
    pub async fn grade(&self, task: &Task, submission: &Submission) -> Verdict {
        self.grade_with(task, submission, &NoopReporter).await
    }

    /// Grade a submission, reporting script outcomes and the verdict.
    pub async fn grade_with(
        &self,
        task: &Task,
        submission: &Submission,
        reporter: &dyn GradeReporter,
    ) -> Verdict {
        let mut results = Vec::with_capacity(task.test_cases.len());
        let mut dom_cases = Vec::new();
        let mut scripts: ScriptGroups<'_> = BTreeMap::new();

        for (index, case) in task.test_cases.iter().enumerate() {
            match case.target() {
                CaseTarget::Dom => dom_cases.push((index, case)),
                CaseTarget::Script(language) => scripts
                    .entry(case.file_name.as_str())
                    .or_insert_with(|| (language, Vec::new()))
                    .1
                    .push((index, case)),
                CaseTarget::Unsupported => {
                    tracing::warn!(file = %case.file_name, "test case targets an unsupported file");
                    results.push(CaseResult::fail(
                        index,
                        case,
                        CaseFailure::UnsupportedTarget {
                            file_name: case.file_name.clone(),
                        },
                    ));
                }
            }
        }

        if !dom_cases.is_empty() {
            tracing::debug!(cases = dom_cases.len(), "evaluating DOM cases");
            results.extend(self.dom.evaluate(&submission.files, &dom_cases));
        }

        for (file_name, (language, cases)) in scripts {
            tracing::debug!(file = file_name, %language, cases = cases.len(), "executing script");
            let outcome = self
                .executor
                .execute(language, submission.file(file_name))
                .await;
            reporter.on_script_executed(file_name, language, &outcome);
            results.extend(
                cases
                    .into_iter()
                    .map(|(index, case)| score_script_case(index, case, &outcome)),
            );
        }

        let verdict = Verdict::from_results(results);
        for failed in verdict.failing() {
            for failure in &failed.failures {
                tracing::debug!(
                    case = failed.index,
                    file = %failed.file_name,
                    failure = failure.label(),
                    "case failed"
                );
            }
        }
        tracing::info!(
            task = %task.id,
            passed = verdict.passed,
            failed = verdict.failed_count(),
            total = verdict.diagnostics.len(),
            "graded submission"
        );
        reporter.on_verdict(&task.id, &verdict);
        verdict
    }
}

/// Score one scripted case against the output of its file.
fn score_script_case(index: usize, case: &TestCase, outcome: &ExecutionOutcome) -> CaseResult {
    let failure = match outcome {
        ExecutionOutcome::Output(actual) => match &case.expected_output {
            Some(expected) if !normalize::compare(actual, expected) => {
                Some(CaseFailure::OutputMismatch {
                    expected: normalize::normalize(expected),
                    actual: normalize::normalize(actual),
                })
            }
            _ => None,
        },
        ExecutionOutcome::Timeout(after) => Some(CaseFailure::timeout(*after)),
        ExecutionOutcome::NetworkError(message) => Some(CaseFailure::ExecutionNetworkError {
            message: message.clone(),
        }),
        ExecutionOutcome::RemoteError(message) => Some(CaseFailure::RemoteExecutionError {
            message: message.clone(),
        }),
    };

    match failure {
        Some(failure) => CaseResult::fail(index, case, failure),
        None => CaseResult::pass(index, case),
    }
}

/// Result of one submission attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionReport {
    pub attempt_id: Uuid,
    pub learner_id: String,
    pub content_id: String,
    pub graded_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub verdict: Verdict,
    /// Set only when the verdict passed and completion was recorded.
    pub advance: Option<Advance>,
}

/// The "submit" action: identity, content lookup, grading, and progress.
pub struct CourseSession {
    grader: Grader,
    content: Arc<dyn ContentStore>,
    identity: Arc<dyn IdentityProvider>,
    progress: ProgressTracker,
    enforce_locks: bool,
}

impl CourseSession {
    pub fn new(
        grader: Grader,
        content: Arc<dyn ContentStore>,
        identity: Arc<dyn IdentityProvider>,
        progress: ProgressTracker,
    ) -> Self {
        Self {
            grader,
            content,
            identity,
            progress,
            enforce_locks: true,
        }
    }

    /// Grade tasks whatever their node state. Meant for authoring tools that
    /// check sample solutions out of course order.
    pub fn ignoring_locks(mut self) -> Self {
        self.enforce_locks = false;
        self
    }

    pub fn progress(&self) -> &ProgressTracker {
        &self.progress
    }

    /// Grade the current learner's submission for a task.
    ///
    /// A failing verdict is returned as `Ok` with no side effects. A passing
    /// verdict is only reported once its completion has been persisted.
    pub async fn submit(
        &self,
        content_id: &str,
        submission: &Submission,
    ) -> Result<SubmissionReport, GradeError> {
        self.submit_with(content_id, submission, &NoopReporter).await
    }

    pub async fn submit_with(
        &self,
        content_id: &str,
        submission: &Submission,
        reporter: &dyn GradeReporter,
    ) -> Result<SubmissionReport, GradeError> {
        let attempt_id = Uuid::new_v4();
        let span = tracing::info_span!("submission", content = content_id, attempt = %attempt_id);

        async move {
            let start = Instant::now();
            let learner_id = self
                .identity
                .current_learner_id()
                .await
                .ok_or(GradeError::NotSignedIn)?;

            let task = self
                .content
                .get_task(content_id)
                .await
                .map_err(|e| match e {
                    StoreError::NotFound(id) => GradeError::ContentNotFound(id),
                    other => GradeError::ContentStore(other),
                })?;
            if !task.is_gradable() {
                return Err(GradeError::NotGradable(task.id));
            }
            if self.enforce_locks {
                let state = self
                    .progress
                    .node_state(&learner_id, &task.id)
                    .await
                    .map_err(GradeError::ContentStore)?;
                if state == NodeState::Locked {
                    return Err(GradeError::Locked(task.id));
                }
            }

            let verdict = self.grader.grade_with(&task, submission, reporter).await;

            let advance = if verdict.passed {
                match self.progress.record_completion(&learner_id, &task).await {
                    Ok(advance) => Some(advance),
                    Err(e) => {
                        tracing::error!("passing verdict not saved: {e}");
                        return Err(e);
                    }
                }
            } else {
                None
            };

            Ok(SubmissionReport {
                attempt_id,
                learner_id,
                content_id: task.id,
                graded_at: Utc::now(),
                duration_ms: start.elapsed().as_millis() as u64,
                verdict,
                advance,
            })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::memory::{InMemoryContentStore, InMemoryProgressStore, StaticIdentity};
    use crate::model::{ContentKind, FileMap, ProgressRecord};
    use crate::traits::ProgressStore;

    /// Passes DOM cases whose selector is in `present`.
    struct FakeDom {
        present: Vec<&'static str>,
    }

    impl DomEvaluator for FakeDom {
        fn evaluate(&self, _: &FileMap, cases: &[(usize, &TestCase)]) -> Vec<CaseResult> {
            cases
                .iter()
                .map(|(i, case)| {
                    if self.present.contains(&case.input.as_str()) {
                        CaseResult::pass(*i, case)
                    } else {
                        CaseResult::fail(
                            *i,
                            case,
                            CaseFailure::ElementNotFound {
                                selector: case.input.clone(),
                            },
                        )
                    }
                })
                .collect()
        }
    }

    /// Returns a fixed outcome per language and records each call.
    struct ScriptedExecutor {
        outcomes: HashMap<Language, ExecutionOutcome>,
        calls: Mutex<Vec<(Language, String)>>,
    }

    impl ScriptedExecutor {
        fn new(outcomes: impl IntoIterator<Item = (Language, ExecutionOutcome)>) -> Self {
            Self {
                outcomes: outcomes.into_iter().collect(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CodeExecutor for ScriptedExecutor {
        async fn execute(&self, language: Language, source: &str) -> ExecutionOutcome {
            self.calls
                .lock()
                .unwrap()
                .push((language, source.to_string()));
            self.outcomes
                .get(&language)
                .cloned()
                .unwrap_or_else(|| ExecutionOutcome::RemoteError("unconfigured".into()))
        }
    }

    fn dom_case(selector: &str) -> TestCase {
        TestCase {
            file_name: "index.html".into(),
            input: selector.into(),
            ..Default::default()
        }
    }

    fn script_case(file: &str, expected: &str) -> TestCase {
        TestCase {
            file_name: file.into(),
            expected_output: Some(expected.into()),
            ..Default::default()
        }
    }

    fn task(id: &str, step: u32, cases: Vec<TestCase>) -> Task {
        Task {
            id: id.into(),
            title: id.into(),
            kind: ContentKind::Task,
            task_text: String::new(),
            sample_code: FileMap::new(),
            test_cases: cases,
            preview_code: None,
            step_order: step,
            tags: vec!["js".into()],
        }
    }

    fn grader(present: Vec<&'static str>, executor: Arc<ScriptedExecutor>) -> Grader {
        Grader::new(Arc::new(FakeDom { present }), executor)
    }

    #[tokio::test]
    async fn verdict_is_and_of_dom_and_script_cases() {
        let executor = Arc::new(ScriptedExecutor::new([(
            Language::JavaScript,
            ExecutionOutcome::Output("6\n".into()),
        )]));
        let grader = grader(vec!["h1", "p", "ul"], executor);
        let task = task(
            "t1",
            1,
            vec![
                dom_case("h1"),
                dom_case("p"),
                dom_case("ul"),
                script_case("script.js", "7"),
            ],
        );

        let verdict = grader.grade(&task, &Submission::default()).await;
        assert!(!verdict.passed);
        assert_eq!(verdict.diagnostics.len(), 4);
        assert_eq!(verdict.failed_count(), 1);
        let failed = verdict.failing().next().unwrap();
        assert_eq!(failed.index, 3);
        assert!(matches!(
            &failed.failures[0],
            CaseFailure::OutputMismatch { expected, actual } if expected == "7" && actual == "6"
        ));
    }

    #[tokio::test]
    async fn missing_element_does_not_stop_later_cases() {
        let executor = Arc::new(ScriptedExecutor::new([]));
        let grader = grader(vec!["p"], executor);
        let task = task("t1", 1, vec![dom_case("h1"), dom_case("p"), dom_case("nav")]);

        let verdict = grader.grade(&task, &Submission::default()).await;
        assert_eq!(verdict.diagnostics.len(), 3);
        assert!(!verdict.diagnostics[0].passed());
        assert!(verdict.diagnostics[1].passed());
        assert!(!verdict.diagnostics[2].passed());
    }

    #[tokio::test]
    async fn each_script_file_runs_once_for_all_its_cases() {
        let executor = Arc::new(ScriptedExecutor::new([
            (Language::JavaScript, ExecutionOutcome::Output("6".into())),
            (
                Language::Php,
                ExecutionOutcome::Timeout(Duration::from_secs(7)),
            ),
        ]));
        let grader = grader(vec![], executor.clone());
        let task = task(
            "t1",
            1,
            vec![
                script_case("script.js", "6"),
                script_case("index.php", "hello"),
                script_case("script.js", "6\\n"),
            ],
        );
        let submission = Submission::default()
            .with_file("script.js", "console.log(1 + 2 + 3)")
            .with_file("index.php", "<?php sleep(60);");

        let verdict = grader.grade(&task, &submission).await;
        assert!(!verdict.passed);
        assert!(verdict.diagnostics[0].passed());
        assert!(verdict.diagnostics[2].passed());
        assert_eq!(
            verdict.diagnostics[1].failures,
            vec![CaseFailure::ExecutionTimeout { timeout_ms: 7000 }]
        );

        let calls = executor.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        assert!(calls.contains(&(Language::JavaScript, "console.log(1 + 2 + 3)".into())));
    }

    #[tokio::test]
    async fn execution_failures_become_diagnostics() {
        let executor = Arc::new(ScriptedExecutor::new([(
            Language::JavaScript,
            ExecutionOutcome::NetworkError("connection refused".into()),
        )]));
        let grader = grader(vec![], executor);
        let task = task(
            "t1",
            1,
            vec![
                script_case("script.js", "6"),
                TestCase {
                    file_name: "main.py".into(),
                    ..Default::default()
                },
            ],
        );

        let verdict = grader.grade(&task, &Submission::default()).await;
        assert_eq!(verdict.failed_count(), 2);
        assert!(matches!(
            verdict.diagnostics[0].failures[0],
            CaseFailure::ExecutionNetworkError { .. }
        ));
        assert!(matches!(
            verdict.diagnostics[1].failures[0],
            CaseFailure::UnsupportedTarget { .. }
        ));
    }

    #[tokio::test]
    async fn script_case_without_expectation_passes_on_output() {
        let executor = Arc::new(ScriptedExecutor::new([(
            Language::JavaScript,
            ExecutionOutcome::Output(String::new()),
        )]));
        let grader = grader(vec![], executor);
        let task = task(
            "t1",
            1,
            vec![TestCase {
                file_name: "script.js".into(),
                ..Default::default()
            }],
        );
        assert!(grader.grade(&task, &Submission::default()).await.passed);
    }

    /// Progress store whose completion writes always fail.
    struct BrokenProgressStore(InMemoryProgressStore);

    #[async_trait]
    impl ProgressStore for BrokenProgressStore {
        async fn write_completion(
            &self,
            _: &str,
            _: &str,
            _: DateTime<Utc>,
        ) -> Result<(), StoreError> {
            Err(StoreError::Backend("write rejected".into()))
        }

        async fn read_completion(
            &self,
            learner_id: &str,
            content_id: &str,
        ) -> Result<Option<ProgressRecord>, StoreError> {
            self.0.read_completion(learner_id, content_id).await
        }

        async fn initialize(&self, record: ProgressRecord) -> Result<(), StoreError> {
            self.0.initialize(record).await
        }

        async fn list_for_learner(&self, learner_id: &str) -> Result<Vec<ProgressRecord>, StoreError> {
            self.0.list_for_learner(learner_id).await
        }

        async fn update_ordering(
            &self,
            learner_id: &str,
            content_id: &str,
            tag: &str,
            step_order: u32,
        ) -> Result<(), StoreError> {
            self.0
                .update_ordering(learner_id, content_id, tag, step_order)
                .await
        }
    }

    fn session(
        tasks: Vec<Task>,
        identity: StaticIdentity,
        store: Arc<dyn ProgressStore>,
        output: &str,
    ) -> CourseSession {
        let content: Arc<dyn ContentStore> = Arc::new(InMemoryContentStore::new(tasks));
        let executor = Arc::new(ScriptedExecutor::new([(
            Language::JavaScript,
            ExecutionOutcome::Output(output.into()),
        )]));
        CourseSession::new(
            grader(vec![], executor),
            content.clone(),
            Arc::new(identity),
            ProgressTracker::new(content, store),
        )
    }

    fn two_step_course() -> Vec<Task> {
        vec![
            task("t1", 1, vec![script_case("script.js", "6")]),
            task("t2", 2, vec![script_case("script.js", "6")]),
        ]
    }

    #[tokio::test]
    async fn passing_submission_records_completion_and_advances() {
        let store = Arc::new(InMemoryProgressStore::new());
        let session = session(
            two_step_course(),
            StaticIdentity::signed_in("u1"),
            store.clone(),
            "6",
        );

        let report = session.submit("t1", &Submission::default()).await.unwrap();
        assert!(report.verdict.passed);
        assert_eq!(
            report.advance,
            Some(Advance::Next {
                content_id: "t2".into()
            })
        );
        assert!(store.read_completion("u1", "t1").await.unwrap().unwrap().is_completed);

        let report = session.submit("t2", &Submission::default()).await.unwrap();
        assert_eq!(report.advance, Some(Advance::Finished));
    }

    #[tokio::test]
    async fn regrading_completed_node_changes_nothing() {
        let store = Arc::new(InMemoryProgressStore::new());
        let session = session(
            two_step_course(),
            StaticIdentity::signed_in("u1"),
            store.clone(),
            "6",
        );

        session.submit("t1", &Submission::default()).await.unwrap();
        let before = store.read_completion("u1", "t1").await.unwrap();
        session.submit("t1", &Submission::default()).await.unwrap();
        let after = store.read_completion("u1", "t1").await.unwrap();

        assert_eq!(before, after);
        assert_eq!(store.completion_writes(), 1);
    }

    #[tokio::test]
    async fn failing_submission_has_no_side_effects() {
        let store = Arc::new(InMemoryProgressStore::new());
        let session = session(
            two_step_course(),
            StaticIdentity::signed_in("u1"),
            store.clone(),
            "5",
        );

        for _ in 0..3 {
            let report = session.submit("t1", &Submission::default()).await.unwrap();
            assert!(!report.verdict.passed);
            assert!(report.advance.is_none());
        }
        assert!(store.read_completion("u1", "t1").await.unwrap().is_none());
        assert_eq!(store.completion_writes(), 0);
    }

    #[tokio::test]
    async fn persistence_failure_is_fatal() {
        let store = Arc::new(BrokenProgressStore(InMemoryProgressStore::new()));
        let session = session(
            two_step_course(),
            StaticIdentity::signed_in("u1"),
            store,
            "6",
        );

        let err = session.submit("t1", &Submission::default()).await.unwrap_err();
        assert!(matches!(err, GradeError::Persistence(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn locked_sections_reject_submissions() {
        let store = Arc::new(InMemoryProgressStore::new());
        let tasks = vec![
            task("t1", 1, vec![script_case("script.js", "6")]),
            Task {
                tags: vec!["dom".into()],
                ..task("t2", 2, vec![script_case("script.js", "6")])
            },
        ];
        let gated = session(tasks.clone(), StaticIdentity::signed_in("u1"), store.clone(), "6");

        let err = gated.submit("t2", &Submission::default()).await.unwrap_err();
        assert!(matches!(err, GradeError::Locked(id) if id == "t2"));
        assert_eq!(store.completion_writes(), 0);

        gated.submit("t1", &Submission::default()).await.unwrap();
        let report = gated.submit("t2", &Submission::default()).await.unwrap();
        assert!(report.verdict.passed);

        let other = Arc::new(InMemoryProgressStore::new());
        let ungated = session(tasks, StaticIdentity::signed_in("u2"), other.clone(), "6")
            .ignoring_locks();
        let report = ungated.submit("t2", &Submission::default()).await.unwrap();
        assert!(report.verdict.passed);
        assert!(other.read_completion("u2", "t2").await.unwrap().unwrap().is_completed);
    }

    #[tokio::test]
    async fn submission_requires_learner_and_gradable_task() {
        let store = Arc::new(InMemoryProgressStore::new());
        let mut tasks = two_step_course();
        tasks.push(Task {
            kind: ContentKind::Lesson,
            ..task("lesson", 3, vec![])
        });

        let anonymous = session(tasks.clone(), StaticIdentity::anonymous(), store.clone(), "6");
        assert!(matches!(
            anonymous.submit("t1", &Submission::default()).await,
            Err(GradeError::NotSignedIn)
        ));

        let signed_in = session(tasks, StaticIdentity::signed_in("u1"), store, "6");
        assert!(matches!(
            signed_in.submit("missing", &Submission::default()).await,
            Err(GradeError::ContentNotFound(_))
        ));
        assert!(matches!(
            signed_in.submit("lesson", &Submission::default()).await,
            Err(GradeError::NotGradable(_))
        ));
    }
}
