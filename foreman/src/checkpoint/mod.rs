//! Durable graph-state snapshots.
//!
//! Every node invocation commits a [`Checkpoint`] (the full channel values)
//! plus its pending channel writes, keyed by `(thread, namespace,
//! checkpoint id)`. A thread therefore survives process restarts and can be
//! inspected or rewound; a run paused at human approval is nothing but a
//! checkpoint with `awaiting_approval` set.
//!
//! Payloads are persisted together with a `type` tag naming the
//! serialization format, so future formats can coexist with `'json'`.

mod in_memory;
pub mod sqlite;

pub use in_memory::InMemoryCheckpointer;
pub use sqlite::SqliteCheckpointer;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{EngineError, Result};
use crate::state::GraphState;

/// The serialization format tag this build writes.
pub const SERIALIZATION_FORMAT: &str = "json";

/// Addresses a checkpoint: a thread, a namespace within it, and optionally
/// an exact checkpoint id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Externally supplied thread id.
    pub thread_id: String,
    /// Namespace, empty for the root graph.
    #[serde(default)]
    pub checkpoint_ns: String,
    /// Exact checkpoint id; absent means "most recent".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint_id: Option<String>,
}

impl CheckpointConfig {
    /// Address the most recent checkpoint of a thread's root namespace.
    #[must_use]
    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: thread_id.into(),
            checkpoint_ns: String::new(),
            checkpoint_id: None,
        }
    }

    /// Pin this config to an exact checkpoint id.
    #[must_use]
    pub fn at(mut self, checkpoint_id: impl Into<String>) -> Self {
        self.checkpoint_id = Some(checkpoint_id.into());
        self
    }
}

/// A serialized snapshot of graph state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique checkpoint id.
    pub id: String,
    /// Creation time.
    pub ts: DateTime<Utc>,
    /// The channel values at this point.
    pub state: GraphState,
}

impl Checkpoint {
    /// Snapshot the given state under a fresh id.
    #[must_use]
    pub fn snapshot(state: GraphState) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            state,
        }
    }
}

/// Metadata stored alongside a checkpoint, used for listing and filtering.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    /// What produced this checkpoint: `"input"`, `"loop"` or `"interrupt"`.
    #[serde(default)]
    pub source: String,
    /// Node step index within the run.
    #[serde(default)]
    pub step: i64,
    /// The node that produced this checkpoint.
    #[serde(default)]
    pub node: String,
    /// Free-form extras, matched by the list filter.
    #[serde(default, flatten)]
    pub extra: HashMap<String, Value>,
}

impl CheckpointMetadata {
    /// Create metadata for a node-produced checkpoint.
    #[must_use]
    pub fn new(source: impl Into<String>, step: i64, node: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            step,
            node: node.into(),
            extra: HashMap::new(),
        }
    }

    /// Check the AND-of-equalities filter against this metadata.
    #[must_use]
    pub fn matches(&self, filter: &HashMap<String, Value>) -> bool {
        let as_value = serde_json::to_value(self).unwrap_or(Value::Null);
        filter
            .iter()
            .all(|(key, expected)| as_value.get(key) == Some(expected))
    }
}

/// One pending channel write, persisted before its checkpoint commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingWrite {
    /// The node invocation that produced the write.
    pub task_id: String,
    /// Position within the invocation's write batch.
    pub idx: i64,
    /// Channel name.
    pub channel: String,
    /// Serialized channel value.
    pub value: Value,
}

/// A checkpoint together with its address, parentage and pending writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointTuple {
    /// The address of this checkpoint (with `checkpoint_id` set).
    pub config: CheckpointConfig,
    /// The snapshot itself.
    pub checkpoint: Checkpoint,
    /// Stored metadata.
    pub metadata: CheckpointMetadata,
    /// Address of the parent checkpoint, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_config: Option<CheckpointConfig>,
    /// Pending writes recorded against this checkpoint.
    #[serde(default)]
    pub pending_writes: Vec<PendingWrite>,
}

/// Options for [`Checkpointer::list`].
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Maximum number of tuples to return.
    pub limit: Option<usize>,
    /// Only tuples created strictly before this instant.
    pub before: Option<DateTime<Utc>>,
    /// AND-of-equalities over metadata fields.
    pub filter: Option<HashMap<String, Value>>,
}

impl ListOptions {
    /// Create empty options (no limit, no cut, no filter).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limit.
    #[must_use]
    pub const fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Cut by creation time.
    #[must_use]
    pub const fn with_before(mut self, before: DateTime<Utc>) -> Self {
        self.before = Some(before);
        self
    }

    /// Filter by metadata equality.
    #[must_use]
    pub fn with_filter(mut self, filter: HashMap<String, Value>) -> Self {
        self.filter = Some(filter);
        self
    }
}

/// Durable storage for checkpoints and pending writes.
///
/// Implementations must serialize concurrent `put`/`put_writes` at least at
/// `(thread, namespace, checkpoint_id)` granularity, and must propagate
/// integrity failures rather than losing state silently.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Return the most recent checkpoint for `(thread_id, namespace)`, or
    /// the exact one when `config.checkpoint_id` is set.
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>>;

    /// List checkpoints newest-first.
    async fn list(
        &self,
        config: &CheckpointConfig,
        options: ListOptions,
    ) -> Result<Vec<CheckpointTuple>>;

    /// Insert or replace a checkpoint; the incoming `config.checkpoint_id`
    /// becomes the stored parent. Returns a config addressing the stored
    /// checkpoint.
    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig>;

    /// Persist pending channel writes for one node invocation, atomically
    /// and replace-on-conflict.
    async fn put_writes(
        &self,
        config: &CheckpointConfig,
        writes: Vec<(String, Value)>,
        task_id: &str,
    ) -> Result<()>;

    /// Purge all checkpoints and writes for a thread.
    async fn delete_thread(&self, thread_id: &str) -> Result<()>;
}

/// A shared, type-erased checkpointer handle.
pub type SharedCheckpointer = Arc<dyn Checkpointer>;

/// Serialize a payload, returning it with its format tag.
pub(crate) fn dump<T: Serialize>(value: &T) -> Result<(String, &'static str)> {
    Ok((serde_json::to_string(value)?, SERIALIZATION_FORMAT))
}

/// Deserialize a payload according to its stored format tag.
pub(crate) fn load<T: for<'de> Deserialize<'de>>(data: &str, format: &str) -> Result<T> {
    if format != SERIALIZATION_FORMAT {
        return Err(EngineError::checkpoint(format!(
            "unknown serialization format '{format}'"
        )));
    }
    Ok(serde_json::from_str(data)?)
}
