//! Core data model types for coursegrade.
//!
//! These mirror the documents held by the content and progress stores.
//! Field names serialize in camelCase to match those documents.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// File name → file content. Ordered so that iteration is deterministic.
pub type FileMap = BTreeMap<String, String>;

/// Whether a content node is a graded task or a plain lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Lesson,
    #[default]
    Task,
}

impl fmt::Display for ContentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContentKind::Lesson => write!(f, "lesson"),
            ContentKind::Task => write!(f, "task"),
        }
    }
}

impl FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "lesson" | "content" => Ok(ContentKind::Lesson),
            "task" => Ok(ContentKind::Task),
            other => Err(format!("unknown content kind: {other}")),
        }
    }
}

/// An authored content node. Tasks carry sample files and test cases;
/// lessons share the shape but have no test cases.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Content id in the content store.
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub kind: ContentKind,
    /// Problem statement shown to the learner.
    #[serde(default)]
    pub task_text: String,
    /// Starting files for the learner's editor.
    #[serde(default)]
    pub sample_code: FileMap,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
    /// URL of a rendered model answer.
    #[serde(default)]
    pub preview_code: Option<String>,
    /// Position in the course. Unique across all nodes.
    pub step_order: u32,
    /// Section tags in authoring order. The first one is the section tag.
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Task {
    /// The tag that places this node in an unlock group.
    ///
    /// Untagged nodes share the empty tag.
    pub fn section_tag(&self) -> &str {
        self.tags.first().map(String::as_str).unwrap_or("")
    }

    pub fn is_gradable(&self) -> bool {
        self.kind == ContentKind::Task
    }
}

/// One assertion unit of a task.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    /// File the case targets. Decides DOM vs. remote execution.
    pub file_name: String,
    /// Selector for DOM cases; opaque for scripted cases.
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub expected_output: Option<String>,
    /// CSS property → expected computed value.
    #[serde(default)]
    pub expected_style: Option<BTreeMap<String, String>>,
    #[serde(default)]
    pub event: Option<EventExpectation>,
}

impl TestCase {
    pub fn target(&self) -> CaseTarget {
        CaseTarget::for_file(&self.file_name)
    }
}

/// An event to dispatch on the matched element and the text expected after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventExpectation {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub expected_output: String,
}

/// Languages with a remote execution service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    JavaScript,
    Php,
}

impl Language {
    /// Language of a scripted file, by extension.
    pub fn for_file(file_name: &str) -> Option<Language> {
        match extension(file_name).as_deref() {
            Some("js" | "mjs" | "cjs") => Some(Language::JavaScript),
            Some("php") => Some(Language::Php),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Language::JavaScript => write!(f, "javascript"),
            Language::Php => write!(f, "php"),
        }
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "javascript" | "js" => Ok(Language::JavaScript),
            "php" => Ok(Language::Php),
            other => Err(format!("unknown language: {other}")),
        }
    }
}

/// Where a test case is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaseTarget {
    /// Markup or style file, checked inside a sandbox.
    Dom,
    /// Scripted file, run by a remote execution service.
    Script(Language),
    /// Neither; the case cannot be evaluated.
    Unsupported,
}

impl CaseTarget {
    pub fn for_file(file_name: &str) -> CaseTarget {
        if is_markup_file(file_name) || is_style_file(file_name) {
            return CaseTarget::Dom;
        }
        match Language::for_file(file_name) {
            Some(language) => CaseTarget::Script(language),
            None => CaseTarget::Unsupported,
        }
    }
}

pub fn is_markup_file(file_name: &str) -> bool {
    matches!(extension(file_name).as_deref(), Some("html" | "htm"))
}

pub fn is_style_file(file_name: &str) -> bool {
    extension(file_name).as_deref() == Some("css")
}

fn extension(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// A learner's files for one grading attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Submission {
    pub files: FileMap,
}

impl Submission {
    pub fn new(files: FileMap) -> Self {
        Self { files }
    }

    /// Start from the task's sample code, as the editor does.
    pub fn from_sample(task: &Task) -> Self {
        Self {
            files: task.sample_code.clone(),
        }
    }

    pub fn with_file(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.set_file(name, content);
        self
    }

    pub fn set_file(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.files.insert(name.into(), content.into());
    }

    /// Content of a file, or empty when the learner has no such file.
    pub fn file(&self, name: &str) -> &str {
        self.files.get(name).map(String::as_str).unwrap_or("")
    }
}

/// An authored course: a header plus its content nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub contents: Vec<Task>,
}

impl Course {
    pub fn task(&self, content_id: &str) -> Option<&Task> {
        self.contents.iter().find(|t| t.id == content_id)
    }
}

/// Per-learner completion record for one content node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub learner_id: String,
    pub content_id: String,
    #[serde(default)]
    pub kind: ContentKind,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tag: String,
    pub step_order: u32,
}

impl ProgressRecord {
    /// A fresh, incomplete record for a learner enrolled in a node.
    pub fn incomplete(learner_id: &str, task: &Task) -> Self {
        Self {
            learner_id: learner_id.to_string(),
            content_id: task.id.clone(),
            kind: task.kind,
            is_completed: false,
            completed_at: None,
            tag: task.section_tag().to_string(),
            step_order: task.step_order,
        }
    }
}
