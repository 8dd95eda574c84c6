//! Progress store persisted as a JSON file next to the course.
//!
//! Records are keyed `{learner_id}_{content_id}` and the whole file is
//! rewritten after every change.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use coursegrade_core::error::StoreError;
use coursegrade_core::model::ProgressRecord;
use coursegrade_core::traits::ProgressStore;

type Records = BTreeMap<String, ProgressRecord>;

pub struct JsonProgressStore {
    path: PathBuf,
    records: Mutex<Records>,
}

impl JsonProgressStore {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        let records = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read progress file: {}", path.display()))?;
            if content.trim().is_empty() {
                Records::new()
            } else {
                serde_json::from_str(&content)
                    .with_context(|| format!("failed to parse progress file: {}", path.display()))?
            }
        } else {
            Records::new()
        };

        tracing::debug!(path = %path.display(), records = records.len(), "opened progress file");
        Ok(Self {
            path: path.to_path_buf(),
            records: Mutex::new(records),
        })
    }

    fn records(&self) -> Result<MutexGuard<'_, Records>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Backend("progress file lock poisoned".into()))
    }

    /// Apply `change` to a copy of the records and keep it only once the
    /// copy is on disk.
    fn commit(
        &self,
        change: impl FnOnce(&mut Records) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let mut records = self.records()?;
        let mut updated = records.clone();
        change(&mut updated)?;
        self.persist(&updated)?;
        *records = updated;
        Ok(())
    }

    fn persist(&self, records: &Records) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(records)
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend(e.to_string()))?;
        }
        std::fs::write(&self.path, json).map_err(|e| {
            StoreError::Backend(format!("failed to write {}: {e}", self.path.display()))
        })
    }
}

fn key(learner_id: &str, content_id: &str) -> String {
    format!("{learner_id}_{content_id}")
}

#[async_trait]
impl ProgressStore for JsonProgressStore {
    async fn write_completion(
        &self,
        learner_id: &str,
        content_id: &str,
        completed_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.commit(|records| {
            let id = key(learner_id, content_id);
            let record = records
                .get_mut(&id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            record.is_completed = true;
            record.completed_at = Some(completed_at);
            Ok(())
        })
    }

    async fn read_completion(
        &self,
        learner_id: &str,
        content_id: &str,
    ) -> Result<Option<ProgressRecord>, StoreError> {
        Ok(self.records()?.get(&key(learner_id, content_id)).cloned())
    }

    async fn initialize(&self, record: ProgressRecord) -> Result<(), StoreError> {
        self.commit(|records| {
            records.insert(key(&record.learner_id, &record.content_id), record);
            Ok(())
        })
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
        self.commit(|records| {
            let id = key(learner_id, content_id);
            let record = records
                .get_mut(&id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            record.tag = tag.to_string();
            record.step_order = step_order;
            Ok(())
        })
    }
}
