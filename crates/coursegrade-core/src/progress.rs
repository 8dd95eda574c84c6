//! Course progress and section unlocking.
//!
//! Content nodes are ordered by `step_order` and grouped into sections by
//! their first tag. Sections unlock one after another: the first section is
//! always open, and each later section opens once every node of the section
//! before it is completed. Completion only moves forward.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::error::{GradeError, StoreError};
use crate::model::{ContentKind, ProgressRecord, Task};
use crate::traits::{ContentStore, ProgressStore};

/// Per-learner state of one content node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Locked,
    Unlocked,
    Completed,
}

/// Lightweight view of a content node used by the course graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentNode {
    pub id: String,
    pub title: String,
    pub kind: ContentKind,
    pub step_order: u32,
    pub tag: String,
}

impl From<&Task> for ContentNode {
    fn from(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            title: task.title.clone(),
            kind: task.kind,
            step_order: task.step_order,
            tag: task.section_tag().to_string(),
        }
    }
}

/// Where the learner goes after completing a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "to", rename_all = "snake_case")]
pub enum Advance {
    /// The node at `step_order + 1`.
    Next { content_id: String },
    /// No node follows; the course is done.
    Finished,
}

/// New position for a node after the content has been reordered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reorder {
    pub content_id: String,
    pub tag: String,
    pub step_order: u32,
}

/// Completion counts for a learner's dashboard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub lessons_completed: usize,
    pub tasks_completed: usize,
    pub total_nodes: usize,
}

/// Section tags in course order: by the lowest `step_order` among their nodes.
pub fn section_order(nodes: &[ContentNode]) -> Vec<String> {
    let mut sorted: Vec<&ContentNode> = nodes.iter().collect();
    sorted.sort_by_key(|n| n.step_order);

    let mut seen = HashSet::new();
    sorted
        .into_iter()
        .filter(|n| seen.insert(n.tag.clone()))
        .map(|n| n.tag.clone())
        .collect()
}

/// Sections the learner can enter, given the ids of completed nodes.
pub fn unlocked_sections(nodes: &[ContentNode], completed: &HashSet<String>) -> Vec<String> {
    let order = section_order(nodes);
    let mut unlocked = Vec::new();

    for (i, tag) in order.iter().enumerate() {
        let open = match i {
            0 => true,
            _ => {
                let previous = &order[i - 1];
                nodes
                    .iter()
                    .filter(|n| &n.tag == previous)
                    .all(|n| completed.contains(&n.id))
            }
        };
        if open {
            unlocked.push(tag.clone());
        }
    }

    unlocked
}

/// State of every node, in the order given.
pub fn compute_states(nodes: &[ContentNode], completed: &HashSet<String>) -> Vec<NodeState> {
    let unlocked: HashSet<String> = unlocked_sections(nodes, completed).into_iter().collect();
    nodes
        .iter()
        .map(|n| {
            if completed.contains(&n.id) {
                NodeState::Completed
            } else if unlocked.contains(&n.tag) {
                NodeState::Unlocked
            } else {
                NodeState::Locked
            }
        })
        .collect()
}

/// The node whose `step_order` is exactly one more than `current`'s.
pub fn next_node<'a>(nodes: &'a [ContentNode], current: &ContentNode) -> Option<&'a ContentNode> {
    let target = current.step_order.checked_add(1)?;
    nodes.iter().find(|n| n.step_order == target)
}

/// Drives progress records through the course state machine.
#[derive(Clone)]
pub struct ProgressTracker {
    content: Arc<dyn ContentStore>,
    store: Arc<dyn ProgressStore>,
}

impl ProgressTracker {
    pub fn new(content: Arc<dyn ContentStore>, store: Arc<dyn ProgressStore>) -> Self {
        Self { content, store }
    }

    async fn nodes(&self) -> Result<Vec<ContentNode>, StoreError> {
        let tasks = self.content.list_tasks_ordered_by_step().await?;
        Ok(tasks.iter().map(ContentNode::from).collect())
    }

    async fn completed_ids(&self, learner_id: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self
            .store
            .list_for_learner(learner_id)
            .await?
            .into_iter()
            .filter(|r| r.is_completed)
            .map(|r| r.content_id)
            .collect())
    }

    /// Create an incomplete record for every node the learner has none for.
    ///
    /// Returns the number of records created.
    pub async fn enroll(&self, learner_id: &str) -> Result<usize, StoreError> {
        let tasks = self.content.list_tasks_ordered_by_step().await?;
        let mut created = 0;
        for task in &tasks {
            if self.store.read_completion(learner_id, &task.id).await?.is_none() {
                self.store
                    .initialize(ProgressRecord::incomplete(learner_id, task))
                    .await?;
                created += 1;
            }
        }
        tracing::debug!(learner = learner_id, created, "enrolled learner");
        Ok(created)
    }

    /// Mark `task` completed for the learner and return where to go next.
    ///
    /// Completing an already-completed node writes nothing.
    pub async fn record_completion(
        &self,
        learner_id: &str,
        task: &Task,
    ) -> Result<Advance, GradeError> {
        let existing = self
            .store
            .read_completion(learner_id, &task.id)
            .await
            .map_err(GradeError::Persistence)?;

        match existing {
            Some(record) if record.is_completed => {
                tracing::debug!(
                    learner = learner_id,
                    content = %task.id,
                    "node already completed, skipping write"
                );
            }
            Some(_) => self.write_completion(learner_id, task).await?,
            None => {
                self.store
                    .initialize(ProgressRecord::incomplete(learner_id, task))
                    .await
                    .map_err(GradeError::Persistence)?;
                self.write_completion(learner_id, task).await?;
            }
        }

        self.advance_from(task).await
    }

    async fn write_completion(&self, learner_id: &str, task: &Task) -> Result<(), GradeError> {
        self.store
            .write_completion(learner_id, &task.id, Utc::now())
            .await
            .map_err(GradeError::Persistence)?;
        tracing::info!(learner = learner_id, content = %task.id, "completion recorded");
        Ok(())
    }

    /// Complete a lesson, the transition for nodes without test cases.
    pub async fn complete_lesson(
        &self,
        learner_id: &str,
        content_id: &str,
    ) -> Result<Advance, GradeError> {
        let task = self
            .content
            .get_task(content_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound(id) => GradeError::ContentNotFound(id),
                other => GradeError::ContentStore(other),
            })?;
        if task.is_gradable() {
            return Err(GradeError::RequiresGrading(task.id));
        }
        self.record_completion(learner_id, &task).await
    }

    /// Successor of `task` by `step_order + 1`.
    pub async fn advance_from(&self, task: &Task) -> Result<Advance, GradeError> {
        let nodes = self.nodes().await.map_err(GradeError::ContentStore)?;
        let current = ContentNode::from(task);
        Ok(match next_node(&nodes, &current) {
            Some(next) => Advance::Next {
                content_id: next.id.clone(),
            },
            None => Advance::Finished,
        })
    }

    /// Every node with its state for the learner, in course order.
    pub async fn course_map(
        &self,
        learner_id: &str,
    ) -> Result<Vec<(ContentNode, NodeState)>, StoreError> {
        let nodes = self.nodes().await?;
        let completed = self.completed_ids(learner_id).await?;
        let states = compute_states(&nodes, &completed);
        Ok(nodes.into_iter().zip(states).collect())
    }

    pub async fn node_state(
        &self,
        learner_id: &str,
        content_id: &str,
    ) -> Result<NodeState, StoreError> {
        self.course_map(learner_id)
            .await?
            .into_iter()
            .find(|(node, _)| node.id == content_id)
            .map(|(_, state)| state)
            .ok_or_else(|| StoreError::NotFound(content_id.to_string()))
    }

    pub async fn unlocked_sections(&self, learner_id: &str) -> Result<Vec<String>, StoreError> {
        let nodes = self.nodes().await?;
        let completed = self.completed_ids(learner_id).await?;
        Ok(unlocked_sections(&nodes, &completed))
    }

    /// Whether every record the learner has for `tag` is completed.
    pub async fn can_unlock_next_section(
        &self,
        learner_id: &str,
        tag: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .store
            .list_for_learner(learner_id)
            .await?
            .iter()
            .filter(|r| r.tag == tag)
            .all(|r| r.is_completed))
    }

    /// Propagate reordered content positions into the learner's records.
    ///
    /// Nodes the learner has no record for are skipped. Returns the number
    /// of records updated.
    pub async fn apply_reorder(
        &self,
        learner_id: &str,
        changes: &[Reorder],
    ) -> Result<usize, StoreError> {
        let mut updated = 0;
        for change in changes {
            match self
                .store
                .update_ordering(learner_id, &change.content_id, &change.tag, change.step_order)
                .await
            {
                Ok(()) => updated += 1,
                Err(StoreError::NotFound(_)) => {
                    tracing::debug!(
                        learner = learner_id,
                        content = %change.content_id,
                        "no progress record to reorder"
                    );
                }
                Err(e) => return Err(e),
            }
        }
        Ok(updated)
    }

    pub async fn summary(&self, learner_id: &str) -> Result<ProgressSummary, StoreError> {
        let total_nodes = self.content.list_tasks_ordered_by_step().await?.len();
        let mut summary = ProgressSummary {
            total_nodes,
            ..Default::default()
        };
        for record in self.store.list_for_learner(learner_id).await? {
            if !record.is_completed {
                continue;
            }
            match record.kind {
                ContentKind::Lesson => summary.lessons_completed += 1,
                ContentKind::Task => summary.tasks_completed += 1,
            }
        }
        Ok(summary)
    }
}
