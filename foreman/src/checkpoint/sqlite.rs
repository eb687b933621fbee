//! SQLite-backed checkpointer.
//!
//! [`SqliteCheckpointer`] persists checkpoints and pending writes in a
//! SQLite database, surviving process restarts. Uses [`rusqlite`] for
//! synchronous access, bridged to async via [`tokio::task::spawn_blocking`].
//!
//! # Storage model
//!
//! Two tables keyed by `(thread_id, checkpoint_ns, checkpoint_id)`:
//! `graph_checkpoints` holds the serialized snapshot and metadata,
//! `graph_writes` holds pending channel writes per node invocation. Every
//! payload column is paired with a format-tag column defaulting to `'json'`;
//! stores created before those columns existed are migrated in place with
//! `ALTER TABLE`, never by dropping data. WAL journal mode and composite
//! indexes keep latency acceptable at a few thousand checkpoints.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::SecondsFormat;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

use super::{
    Checkpoint, CheckpointConfig, CheckpointMetadata, CheckpointTuple, Checkpointer, ListOptions,
    PendingWrite, dump, load,
};
use crate::error::{EngineError, Result};

/// SQLite-backed checkpoint store.
///
/// Cloneable via `Arc<Mutex<Connection>>`; one database may serve many
/// threads, and concurrent `put`/`put_writes` serialize on the connection
/// lock. All blocking I/O runs on the tokio blocking thread pool.
#[derive(Debug, Clone)]
pub struct SqliteCheckpointer {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCheckpointer {
    /// Open (or create) a database at `path` and initialize the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path.as_ref())?;
        Self::from_connection(conn)
    }

    /// Open an ephemeral in-memory database (data lost on drop).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    /// Wrap an existing [`Connection`], applying pragmas, schema setup and
    /// the in-place format-tag migration.
    pub fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;\
             PRAGMA foreign_keys = ON;\
             PRAGMA busy_timeout = 5000;",
        )?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS graph_checkpoints (
                thread_id            TEXT NOT NULL,
                checkpoint_ns        TEXT NOT NULL DEFAULT '',
                checkpoint_id        TEXT NOT NULL,
                parent_checkpoint_id TEXT,
                checkpoint           BLOB,
                metadata             BLOB,
                checkpoint_type      TEXT DEFAULT 'json',
                metadata_type        TEXT DEFAULT 'json',
                created_at           TEXT NOT NULL,
                PRIMARY KEY (thread_id, checkpoint_ns, checkpoint_id)
            );

            CREATE TABLE IF NOT EXISTS graph_writes (
                thread_id     TEXT NOT NULL,
                checkpoint_ns TEXT NOT NULL DEFAULT '',
                checkpoint_id TEXT NOT NULL,
                task_id       TEXT NOT NULL,
                idx           INTEGER NOT NULL,
                channel       TEXT NOT NULL,
                value         BLOB,
                type          TEXT DEFAULT 'json',
                PRIMARY KEY (thread_id, checkpoint_ns, checkpoint_id, task_id, idx)
            );

            CREATE INDEX IF NOT EXISTS idx_graph_checkpoints_thread
            ON graph_checkpoints (thread_id, checkpoint_ns);

            CREATE INDEX IF NOT EXISTS idx_graph_writes_checkpoint
            ON graph_writes (thread_id, checkpoint_ns, checkpoint_id);",
        )?;

        Self::migrate_format_columns(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Add the format-tag columns to stores created before they existed.
    fn migrate_format_columns(conn: &Connection) -> Result<()> {
        const MIGRATIONS: &[(&str, &str)] = &[
            ("graph_checkpoints", "checkpoint_type"),
            ("graph_checkpoints", "metadata_type"),
            ("graph_writes", "type"),
        ];
        for (table, column) in MIGRATIONS {
            if !Self::has_column(conn, table, column)? {
                conn.execute(
                    &format!("ALTER TABLE {table} ADD COLUMN {column} TEXT DEFAULT 'json'"),
                    [],
                )?;
            }
        }
        Ok(())
    }

    fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(names.iter().any(|n| n == column))
    }

    /// Bridge a synchronous closure onto the tokio blocking thread pool.
    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| EngineError::checkpoint(format!("lock poisoned: {e}")))?;
            f(&guard)
        })
        .await
        .map_err(|e| EngineError::internal(format!("blocking task failed: {e}")))?
    }

    fn load_writes(
        conn: &Connection,
        thread_id: &str,
        checkpoint_ns: &str,
        checkpoint_id: &str,
    ) -> Result<Vec<PendingWrite>> {
        let mut stmt = conn.prepare(
            "SELECT task_id, idx, channel, value, type FROM graph_writes \
             WHERE thread_id = ?1 AND checkpoint_ns = ?2 AND checkpoint_id = ?3 \
             ORDER BY task_id, idx",
        )?;
        let rows = stmt.query_map(params![thread_id, checkpoint_ns, checkpoint_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;

        let mut writes = Vec::new();
        for row in rows {
            let (task_id, idx, channel, value, format) = row?;
            writes.push(PendingWrite {
                task_id,
                idx,
                channel,
                value: load::<Value>(&value, &format)?,
            });
        }
        Ok(writes)
    }

    #[allow(clippy::type_complexity)]
    fn row_to_tuple(
        conn: &Connection,
        thread_id: &str,
        checkpoint_ns: &str,
        row: (String, Option<String>, String, String, String, String),
    ) -> Result<CheckpointTuple> {
        let (checkpoint_id, parent_id, checkpoint_data, metadata_data, checkpoint_fmt, metadata_fmt) =
            row;

        let checkpoint: Checkpoint = load(&checkpoint_data, &checkpoint_fmt)?;
        let metadata: CheckpointMetadata = load(&metadata_data, &metadata_fmt)?;
        let pending_writes = Self::load_writes(conn, thread_id, checkpoint_ns, &checkpoint_id)?;

        Ok(CheckpointTuple {
            config: CheckpointConfig {
                thread_id: thread_id.to_owned(),
                checkpoint_ns: checkpoint_ns.to_owned(),
                checkpoint_id: Some(checkpoint_id),
            },
            checkpoint,
            metadata,
            parent_config: parent_id.map(|id| CheckpointConfig {
                thread_id: thread_id.to_owned(),
                checkpoint_ns: checkpoint_ns.to_owned(),
                checkpoint_id: Some(id),
            }),
            pending_writes,
        })
    }
}

type CheckpointRow = (String, Option<String>, String, String, String, String);

fn map_checkpoint_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CheckpointRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get::<_, Option<String>>(4)?.unwrap_or_else(|| "json".to_owned()),
        row.get::<_, Option<String>>(5)?.unwrap_or_else(|| "json".to_owned()),
    ))
}

#[async_trait]
impl Checkpointer for SqliteCheckpointer {
    async fn get_tuple(&self, config: &CheckpointConfig) -> Result<Option<CheckpointTuple>> {
        let config = config.clone();
        self.blocking(move |conn| {
            let row = if let Some(checkpoint_id) = &config.checkpoint_id {
                conn.query_row(
                    "SELECT checkpoint_id, parent_checkpoint_id, checkpoint, metadata, \
                            checkpoint_type, metadata_type \
                     FROM graph_checkpoints \
                     WHERE thread_id = ?1 AND checkpoint_ns = ?2 AND checkpoint_id = ?3",
                    params![config.thread_id, config.checkpoint_ns, checkpoint_id],
                    map_checkpoint_row,
                )
                .optional()?
            } else {
                conn.query_row(
                    "SELECT checkpoint_id, parent_checkpoint_id, checkpoint, metadata, \
                            checkpoint_type, metadata_type \
                     FROM graph_checkpoints \
                     WHERE thread_id = ?1 AND checkpoint_ns = ?2 \
                     ORDER BY created_at DESC, checkpoint_id DESC LIMIT 1",
                    params![config.thread_id, config.checkpoint_ns],
                    map_checkpoint_row,
                )
                .optional()?
            };

            row.map(|r| Self::row_to_tuple(conn, &config.thread_id, &config.checkpoint_ns, r))
                .transpose()
        })
        .await
    }

    async fn list(
        &self,
        config: &CheckpointConfig,
        options: ListOptions,
    ) -> Result<Vec<CheckpointTuple>> {
        let config = config.clone();
        self.blocking(move |conn| {
            let mut sql = String::from(
                "SELECT checkpoint_id, parent_checkpoint_id, checkpoint, metadata, \
                        checkpoint_type, metadata_type \
                 FROM graph_checkpoints \
                 WHERE thread_id = ?1 AND checkpoint_ns = ?2",
            );
            if options.before.is_some() {
                sql.push_str(" AND created_at < ?3");
            }
            sql.push_str(" ORDER BY created_at DESC, checkpoint_id DESC");

            let mut stmt = conn.prepare(&sql)?;
            let rows: Vec<CheckpointRow> = if let Some(before) = options.before {
                let cut = before.to_rfc3339_opts(SecondsFormat::Micros, true);
                stmt.query_map(
                    params![config.thread_id, config.checkpoint_ns, cut],
                    map_checkpoint_row,
                )?
                .collect::<std::result::Result<_, _>>()?
            } else {
                stmt.query_map(
                    params![config.thread_id, config.checkpoint_ns],
                    map_checkpoint_row,
                )?
                .collect::<std::result::Result<_, _>>()?
            };

            let mut tuples = Vec::new();
            for row in rows {
                let tuple =
                    Self::row_to_tuple(conn, &config.thread_id, &config.checkpoint_ns, row)?;
                if let Some(filter) = &options.filter {
                    if !tuple.metadata.matches(filter) {
                        continue;
                    }
                }
                tuples.push(tuple);
                if options.limit.is_some_and(|limit| tuples.len() >= limit) {
                    break;
                }
            }
            Ok(tuples)
        })
        .await
    }

    async fn put(
        &self,
        config: &CheckpointConfig,
        checkpoint: Checkpoint,
        metadata: CheckpointMetadata,
    ) -> Result<CheckpointConfig> {
        let config = config.clone();
        let new_id = checkpoint.id.clone();
        let created_at = checkpoint.ts.to_rfc3339_opts(SecondsFormat::Micros, true);
        let (checkpoint_data, checkpoint_fmt) = dump(&checkpoint)?;
        let (metadata_data, metadata_fmt) = dump(&metadata)?;

        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO graph_checkpoints \
                 (thread_id, checkpoint_ns, checkpoint_id, parent_checkpoint_id, \
                  checkpoint, metadata, checkpoint_type, metadata_type, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    config.thread_id,
                    config.checkpoint_ns,
                    new_id,
                    config.checkpoint_id,
                    checkpoint_data,
                    metadata_data,
                    checkpoint_fmt,
                    metadata_fmt,
                    created_at,
                ],
            )?;
            Ok(CheckpointConfig {
                thread_id: config.thread_id.clone(),
                checkpoint_ns: config.checkpoint_ns.clone(),
                checkpoint_id: Some(new_id),
            })
        })
        .await
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
        let config = config.clone();
        let task_id = task_id.to_owned();

        let mut serialized = Vec::with_capacity(writes.len());
        for (idx, (channel, value)) in writes.into_iter().enumerate() {
            let (data, format) = dump(&value)?;
            serialized.push((idx as i64, channel, data, format));
        }

        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO graph_writes \
                     (thread_id, checkpoint_ns, checkpoint_id, task_id, idx, channel, value, type) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )?;
                for (idx, channel, data, format) in &serialized {
                    stmt.execute(params![
                        config.thread_id,
                        config.checkpoint_ns,
                        checkpoint_id,
                        task_id,
                        idx,
                        channel,
                        data,
                        format,
                    ])?;
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<()> {
        let thread_id = thread_id.to_owned();
        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            tx.execute(
                "DELETE FROM graph_writes WHERE thread_id = ?1",
                params![thread_id],
            )?;
            tx.execute(
                "DELETE FROM graph_checkpoints WHERE thread_id = ?1",
                params![thread_id],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }
}
