pub mod grade;
pub mod init;
pub mod progress;
pub mod validate;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use coursegrade_core::memory::InMemoryContentStore;
use coursegrade_core::model::Course;
use coursegrade_core::parser;
use coursegrade_core::progress::ProgressTracker;

use crate::store::JsonProgressStore;

/// A parsed course wired to the learner progress file.
pub(crate) struct Workspace {
    pub course: Course,
    pub content: Arc<InMemoryContentStore>,
    pub tracker: ProgressTracker,
}

impl Workspace {
    pub fn open(course_path: &Path, progress_path: &Path) -> Result<Self> {
        let course = parser::parse_course(course_path)?;
        let content = Arc::new(InMemoryContentStore::new(course.contents.clone()));
        let store = Arc::new(
            JsonProgressStore::open(progress_path)
                .with_context(|| format!("cannot open progress for course {}", course.id))?,
        );
        let tracker = ProgressTracker::new(content.clone(), store);
        Ok(Self {
            course,
            content,
            tracker,
        })
    }
}
