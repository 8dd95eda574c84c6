//! In-memory collaborators for embedding and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::model::{ProgressRecord, Task};
use crate::traits::{ContentStore, IdentityProvider, ProgressStore};

/// Content store backed by a map of tasks keyed by id.
#[derive(Default)]
pub struct InMemoryContentStore {
    tasks: RwLock<BTreeMap<String, Task>>,
}

impl InMemoryContentStore {
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
        Self {
            tasks: RwLock::new(tasks.into_iter().map(|t| (t.id.clone(), t)).collect()),
        }
    }

    pub fn insert(&self, task: Task) {
        if let Ok(mut tasks) = self.tasks.write() {
            tasks.insert(task.id.clone(), task);
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Backend("store lock poisoned".into())
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn get_task(&self, content_id: &str) -> Result<Task, StoreError> {
        let tasks = self.tasks.read().map_err(|_| poisoned())?;
        tasks
            .get(content_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(content_id.to_string()))
    }

    async fn list_tasks_ordered_by_step(&self) -> Result<Vec<Task>, StoreError> {
        let tasks = self.tasks.read().map_err(|_| poisoned())?;
        let mut all: Vec<Task> = tasks.values().cloned().collect();
        all.sort_by_key(|t| t.step_order);
        Ok(all)
    }

    async fn update_ordering(
        &self,
        content_id: &str,
        tag: &str,
        step_order: u32,
    ) -> Result<(), StoreError> {
        let mut tasks = self.tasks.write().map_err(|_| poisoned())?;
        let task = tasks
            .get_mut(content_id)
            .ok_or_else(|| StoreError::NotFound(content_id.to_string()))?;
        task.step_order = step_order;
        task.tags.retain(|t| t != tag);
        task.tags.insert(0, tag.to_string());
        Ok(())
    }
}

/// Identity provider with a fixed answer.
pub struct StaticIdentity(Option<String>);

impl StaticIdentity {
    pub fn signed_in(learner_id: &str) -> Self {
        Self(Some(learner_id.to_string()))
    }

    pub fn anonymous() -> Self {
        Self(None)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn current_learner_id(&self) -> Option<String> {
        self.0.clone()
    }
}

type RecordKey = (String, String);

/// Progress store backed by a map keyed by `(learner_id, content_id)`.
#[derive(Default)]
pub struct InMemoryProgressStore {
    records: Mutex<HashMap<RecordKey, ProgressRecord>>,
    writes: Mutex<u32>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completion writes performed so far.
    pub fn completion_writes(&self) -> u32 {
        self.writes.lock().map(|w| *w).unwrap_or(0)
    }

    fn records(&self) -> Result<MutexGuard<'_, HashMap<RecordKey, ProgressRecord>>, StoreError> {
        self.records.lock().map_err(|_| poisoned())
    }
}

fn key(learner_id: &str, content_id: &str) -> RecordKey {
    (learner_id.to_string(), content_id.to_string())
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn write_completion(
        &self,
        learner_id: &str,
        content_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut records = self.records()?;
        let record = records
            .get_mut(&key(learner_id, content_id))
            .ok_or_else(|| StoreError::NotFound(format!("{learner_id}_{content_id}")))?;
        record.is_completed = true;
        record.completed_at = Some(completed_at);
        if let Ok(mut writes) = self.writes.lock() {
            *writes += 1;
        }
        Ok(())
    }

    async fn read_completion(
        &self,
        learner_id: &str,
        content_id: &str,
    ) -> Result<Option<ProgressRecord>, StoreError> {
        Ok(self.records()?.get(&key(learner_id, content_id)).cloned())
    }

    async fn initialize(&self, record: ProgressRecord) -> Result<(), StoreError> {
        self.records()?.insert(
            key(&record.learner_id, &record.content_id),
            record,
        );
        Ok(())
    }

    async fn list_for_learner(&self, learner_id: &str) -> Result<Vec<ProgressRecord>, StoreError> {
        let mut records: Vec<ProgressRecord> = self
            .records()?
            .values()
            .filter(|r| r.learner_id == learner_id)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.step_order);
        Ok(records)
    }

    async fn update_ordering(
        &self,
        learner_id: &str,
        content_id: &str,
        tag: &str,
        step_order: u32,
    ) -> Result<(), StoreError> {
        let mut records = self.records()?;
        let record = records
            .get_mut(&key(learner_id, content_id))
            .ok_or_else(|| StoreError::NotFound(format!("{learner_id}_{content_id}")))?;
        record.tag = tag.to_string();
        record.step_order = step_order;
        Ok(())
    }
}
