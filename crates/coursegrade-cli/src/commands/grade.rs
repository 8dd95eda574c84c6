//! The `coursegrade grade` command.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use coursegrade_core::engine::{CourseSession, GradeReporter, Grader, SubmissionReport};
use coursegrade_core::memory::StaticIdentity;
use coursegrade_core::model::{Language, Submission};
use coursegrade_core::progress::Advance;
use coursegrade_core::results::Verdict;
use coursegrade_core::traits::ExecutionOutcome;
use coursegrade_executors::{build_registry, load_config_from};
use coursegrade_sandbox::HeadlessDom;

use super::Workspace;

pub struct GradeArgs {
    pub course: PathBuf,
    pub task: String,
    pub submission: Option<PathBuf>,
    pub learner: String,
    pub progress: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub format: String,
    pub ignore_locks: bool,
}

/// Console progress reporter.
struct ConsoleReporter;

impl GradeReporter for ConsoleReporter {
    fn on_script_executed(&self, file_name: &str, language: Language, outcome: &ExecutionOutcome) {
        let status = match outcome {
            ExecutionOutcome::Output(out) => format!("OK ({} bytes of output)", out.len()),
            ExecutionOutcome::Timeout(after) => format!("TIMEOUT after {}ms", after.as_millis()),
            ExecutionOutcome::NetworkError(e) => format!("NETWORK ERROR {e}"),
            ExecutionOutcome::RemoteError(e) => format!("ERROR {e}"),
        };
        eprintln!("  Ran: {file_name} ({language}) {status}");
    }

    fn on_verdict(&self, task_id: &str, verdict: &Verdict) {
        eprintln!(
            "  Graded: {task_id} {}/{} cases passed",
            verdict.diagnostics.len() - verdict.failed_count(),
            verdict.diagnostics.len()
        );
    }
}

/// Grade one submission. Returns whether the verdict passed.
pub async fn execute(args: GradeArgs) -> Result<bool> {
    anyhow::ensure!(
        matches!(args.format.as_str(), "text" | "json"),
        "unknown format: {} (expected text or json)",
        args.format
    );

    let config = load_config_from(args.config.as_deref())?;
    let progress_path = args.progress.unwrap_or_else(|| config.progress_file.clone());
    let workspace = Workspace::open(&args.course, &progress_path)?;

    let task = workspace
        .course
        .task(&args.task)
        .with_context(|| format!("no content {} in course {}", args.task, workspace.course.id))?;

    let mut submission = Submission::from_sample(task);
    if let Some(path) = &args.submission {
        for (name, content) in read_submission(path)? {
            submission.set_file(name, content);
        }
    }

    workspace.tracker.enroll(&args.learner).await?;

    let registry = build_registry(&config);
    if registry.languages().count() == 0 {
        tracing::debug!("no execution services configured, scripted cases will fail");
    }
    let grader = Grader::new(Arc::new(HeadlessDom::new()), Arc::new(registry));
    let mut session = CourseSession::new(
        grader,
        workspace.content.clone(),
        Arc::new(StaticIdentity::signed_in(&args.learner)),
        workspace.tracker.clone(),
    );
    if args.ignore_locks {
        session = session.ignoring_locks();
    }

    let report = session
        .submit_with(&args.task, &submission, &ConsoleReporter)
        .await?;

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(report.verdict.passed)
}

/// Files of a submission, keyed by their path relative to `path`.
fn read_submission(path: &Path) -> Result<Vec<(String, String)>> {
    if path.is_file() {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("invalid submission file name: {}", path.display()))?;
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read submission: {}", path.display()))?;
        return Ok(vec![(name.to_string(), content)]);
    }

    anyhow::ensure!(path.is_dir(), "submission not found: {}", path.display());
    let mut files = Vec::new();
    collect_files(path, path, &mut files)?;
    Ok(files)
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<(String, String)>) -> Result<()> {
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
            continue;
        }
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read submission: {}", path.display()))?;
        files.push((name, content));
    }
    Ok(())
}

fn print_report(report: &SubmissionReport) {
    let mut table = Table::new();
    table.set_header(vec!["#", "File", "Input", "Result", "Details"]);

    for result in &report.verdict.diagnostics {
        let (status, details) = match result.failures.as_slice() {
            [] => ("PASS".to_string(), String::new()),
            failures => (
                failures
                    .iter()
                    .map(|f| f.label())
                    .collect::<Vec<_>>()
                    .join(", "),
                failures
                    .iter()
                    .map(|f| f.describe())
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
        };
        table.add_row(vec![
            Cell::new(result.index + 1),
            Cell::new(&result.file_name),
            Cell::new(&result.input),
            Cell::new(status),
            Cell::new(details),
        ]);
    }

    println!("\n{table}\n");

    let total = report.verdict.diagnostics.len();
    if report.verdict.passed {
        println!("PASSED: {} ({total} cases, {}ms)", report.content_id, report.duration_ms);
    } else {
        println!(
            "FAILED: {} ({} of {total} cases failed)",
            report.content_id,
            report.verdict.failed_count()
        );
    }

    match &report.advance {
        Some(Advance::Next { content_id }) => println!("Next: {content_id}"),
        Some(Advance::Finished) => println!("Course complete!"),
        None => {}
    }
}
