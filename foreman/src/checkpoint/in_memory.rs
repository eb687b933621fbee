//! In-memory checkpointer for tests and ephemeral embedding hosts.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple, Checkpointer, ListOptions,
    PendingWrite,
};
use crate::error::{EngineError, Result};

#[derive(Debug, Clone)]
struct StoredCheckpoint {
    checkpoint: Checkpoint,
    metadata: CheckpointMetadata,
    parent_checkpoint_id: Option<String>,
    writes: Vec<PendingWrite>,
}

/// Checkpointer that keeps everything in process memory. Data is lost on
/// drop; use [`super::SqliteCheckpointer`] for durability.
#[derive(Debug, Default)]
pub struct InMemoryCheckpointer {
    // (thread_id, checkpoint_ns) -> checkpoints in insertion order.
    threads: Mutex<HashMap<(String, String), Vec<StoredCheckpoint>>>,
}

impl InMemoryCheckpointer {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn key(config: &CheckpointConfig) -> (String, String) {
        (config.thread_id.clone(), config.checkpoint_ns.clone())
    }

    fn to_tuple(config: &CheckpointConfig, stored: &StoredCheckpoint) -> CheckpointTuple {
        CheckpointTuple {
            config: CheckpointConfig {
                thread_id: config.thread_id.clone(),
                checkpoint_ns: config.checkpoint_ns.clone(),
                checkpoint_id: Some(stored.checkpoint.id.clone()),
            },
            checkpoint: stored.checkpoint.clone(),
            metadata: stored.metadata.clone(),
            parent_config: stored.parent_checkpoint_id.as_ref().map(|parent| {
                CheckpointConfig {
                    thread_id: config.thread_id.clone(),
                    checkpoint_ns: config.checkpoint_ns.clone(),
                    checkpoint_id: Some(parent.clone()),
                }
            }),
            pending_writes: stored.writes.clone(),
        }
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<(String, String), Vec<StoredCheckpoint>>>> {
        self.threads
            .lock()
            .map_err(|e| EngineError::checkpoint(format!("lock poisoned: {e}")))
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let threads = self.lock()?;
        let Some(stored) = threads.get(&Self::key(config)) else {
            return Ok(None);
        };
        let found = match &config.checkpoint_id {
            Some(id) => stored.iter().find(|s| &s.checkpoint.id == id),
            None => stored.iter().max_by_key(|s| s.checkpoint.ts),
        };
        Ok(found.map(|s| Self::to_tuple(config, s)))
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        options: ListOptions,
    ) -> Result<Vec<CheckpointTuple>> {
        let threads = self.lock()?;
        let Some(stored) = threads.get(&Self::key(config)) else {
            return Ok(Vec::new());
        };

        let mut tuples: Vec<CheckpointTuple> = stored
            .iter()
            .filter(|s| options.before.is_none_or(|cut| s.checkpoint.ts < cut))
            .filter(|s| {
                options
                    .filter
                    .as_ref()
                    .is_none_or(|f| s.metadata.matches(f))
            })
            .map(|s| Self::to_tuple(config, s))
            .collect();
        tuples.sort_by(|a, b| b.checkpoint.ts.cmp(&a.checkpoint.ts));
        if let Some(limit) = options.limit {
            tuples.truncate(limit);
        }
        Ok(tuples)
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let mut threads = self.lock()?;
        let entry = threads.entry(Self::key(config)).or_default();
        let new_id = checkpoint.id.clone();

        let stored = StoredCheckpoint {
            checkpoint,
            metadata,
            parent_checkpoint_id: config.checkpoint_id.clone(),
            writes: Vec::new(),
        };

        if let Some(existing) = entry.iter_mut().find(|s| s.checkpoint.id == new_id) {
            *existing = stored;
        } else {
            entry.push(stored);
        }

        Ok(CheckpointConfig {
            thread_id: config.thread_id.clone(),
            checkpoint_ns: config.checkpoint_ns.clone(),
            checkpoint_id: Some(new_id),
        })
    }

    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, Value)>,
        task_id: &str,
    ) -> Result<()> {
        let checkpoint_id = config
            .checkpoint_id
            .clone()
            .ok_or_else(|| EngineError::checkpoint("put_writes requires a checkpoint_id"))?;

        let mut threads = self.lock()?;
        let entry = threads
            .entry(Self::key(config))
            .or_default()
            .iter_mut()
            .find(|s| s.checkpoint.id == checkpoint_id);
        let Some(stored) = entry else {
            return Err(EngineError::checkpoint(format!(
                "no checkpoint '{checkpoint_id}' to attach writes to"
            )));
        };

        for (idx, (channel, value)) in writes.into_iter().enumerate() {
            let idx = idx as i64;
            let write = PendingWrite {
                task_id: task_id.to_owned(),
                idx,
                channel,
                value,
            };
            if let Some(existing) = stored
                .writes
                .iter_mut()
                .find(|w| w.task_id == task_id && w.idx == idx)
            {
                *existing = write;
            } else {
                stored.writes.push(write);
            }
        }
        Ok(())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let mut threads = self.lock()?;
        threads.retain(|(t, _), _| t != thread_id);
        Ok(())
    }
}
