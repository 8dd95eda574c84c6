//! TOML course parser.
//!
//! Loads courses from TOML files and directories, and validates them.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{CaseTarget, ContentKind, Course, EventExpectation, FileMap, Task, TestCase};

/// Intermediate TOML structure for parsing course files.
#[derive(Debug, Deserialize)]
struct TomlCourseFile {
    course: TomlCourseHeader,
    #[serde(default)]
    contents: Vec<TomlContent>,
}

#[derive(Debug, Deserialize)]
struct TomlCourseHeader {
    id: String,
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlContent {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default = "default_kind")]
    kind: String,
    #[serde(default)]
    task_text: String,
    step_order: u32,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    preview_code: Option<String>,
    #[serde(default)]
    sample_code: FileMap,
    #[serde(default)]
    test_cases: Vec<TomlTestCase>,
}

fn default_kind() -> String {
    "task".to_string()
}

#[derive(Debug, Deserialize)]
struct TomlTestCase {
    file_name: String,
    #[serde(default)]
    input: String,
    #[serde(default)]
    expected_output: Option<String>,
    #[serde(default)]
    expected_style: Option<BTreeMap<String, String>>,
    #[serde(default)]
    event: Option<TomlEvent>,
}

#[derive(Debug, Deserialize)]
struct TomlEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    expected_output: String,
}

/// Parse a single TOML file into a `Course`.
pub fn parse_course(path: &Path) -> Result<Course> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read course file: {}", path.display()))?;

    parse_course_str(&content, path)
}

/// Parse a TOML string into a `Course` (useful for testing).
pub fn parse_course_str(content: &str, source_path: &Path) -> Result<Course> {
    let parsed: TomlCourseFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let contents = parsed
        .contents
        .into_iter()
        .map(|c| {
            let kind: ContentKind = c
                .kind
                .parse()
                .map_err(|e: String| anyhow::anyhow!("content {}: {}", c.id, e))?;

            let test_cases = c
                .test_cases
                .into_iter()
                .map(|t| TestCase {
                    file_name: t.file_name,
                    input: t.input,
                    expected_output: t.expected_output,
                    expected_style: t.expected_style,
                    event: t.event.map(|e| EventExpectation {
                        event_type: e.event_type,
                        expected_output: e.expected_output,
                    }),
                })
                .collect();

            Ok(Task {
                id: c.id,
                title: c.title,
                kind,
                task_text: c.task_text,
                sample_code: c.sample_code,
                test_cases,
                preview_code: c.preview_code,
                step_order: c.step_order,
                tags: dedup_tags(c.tags),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Course {
        id: parsed.course.id,
        title: parsed.course.title,
        description: parsed.course.description,
        contents,
    })
}

/// Keep the first occurrence of each tag, in authoring order.
fn dedup_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .collect()
}

/// Recursively load all `.toml` course files from a directory.
pub fn load_course_directory(dir: &Path) -> Result<Vec<Course>> {
    let mut courses = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            courses.extend(load_course_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_course(&path) {
                Ok(course) => courses.push(course),
                Err(e) => {
                    tracing::warn!("skipping {}: {}", path.display(), e);
                }
            }
        }
    }

    Ok(courses)
}

/// A warning from course validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The content ID (if applicable).
    pub content_id: Option<String>,
    /// Warning message.
    pub message: String,
}

impl ValidationWarning {
    fn for_content(content_id: &str, message: impl Into<String>) -> Self {
        Self {
            content_id: Some(content_id.to_string()),
            message: message.into(),
        }
    }
}

/// Validate a course for common authoring issues.
pub fn validate_course(course: &Course) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();

    let mut seen_ids = HashSet::new();
    let mut seen_steps = HashSet::new();
    for task in &course.contents {
        if !seen_ids.insert(&task.id) {
            warnings.push(ValidationWarning::for_content(
                &task.id,
                format!("duplicate content ID: {}", task.id),
            ));
        }
        if !seen_steps.insert(task.step_order) {
            warnings.push(ValidationWarning::for_content(
                &task.id,
                format!("duplicate step_order: {}", task.step_order),
            ));
        }
    }

    // A gap ends the course early: the successor lookup is by step_order + 1.
    let mut steps: Vec<u32> = seen_steps.into_iter().collect();
    steps.sort_unstable();
    for pair in steps.windows(2) {
        if pair[1] != pair[0] + 1 {
            warnings.push(ValidationWarning {
                content_id: None,
                message: format!(
                    "step_order gap between {} and {}: learners finish after step {}",
                    pair[0], pair[1], pair[0]
                ),
            });
        }
    }

    for task in &course.contents {
        if task.is_gradable() && task.test_cases.is_empty() {
            warnings.push(ValidationWarning::for_content(
                &task.id,
                "task has no test cases and passes any submission",
            ));
        }

        for (i, case) in task.test_cases.iter().enumerate() {
            if case.target() == CaseTarget::Unsupported {
                warnings.push(ValidationWarning::for_content(
                    &task.id,
                    format!("test case {i} targets unsupported file {}", case.file_name),
                ));
            }
            if !task.sample_code.contains_key(&case.file_name) {
                warnings.push(ValidationWarning::for_content(
                    &task.id,
                    format!("test case {i} targets {} which is not in sample_code", case.file_name),
                ));
            }
            if case
                .expected_style
                .as_ref()
                .is_some_and(|style| style.keys().any(|k| k.trim().is_empty()))
            {
                warnings.push(ValidationWarning::for_content(
                    &task.id,
                    format!("test case {i} has an empty style property, it will be ignored"),
                ));
            }
        }
    }

    warnings
}
