//! SQLite-backed durable queue
//!
//! A `QueueClient` whose server endpoint is a database path (or `:memory:`).
//! Messages survive process restarts and are popped in FIFO order per queue.

use super::queue::{QueueClient, QueueServerSpec};
use super::traits::SinkError;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Endpoint that opens a private in-memory database
pub const IN_MEMORY: &str = ":memory:";

/// An open connection and the endpoint it was opened for.
struct Open {
    endpoint: String,
    conn: Connection,
}

/// Durable FIFO queues in a single SQLite database.
///
/// Thread-safe via internal mutex on the connection.
#[derive(Default)]
pub struct SqliteQueue {
    conn: Mutex<Option<Open>>,
}

impl SqliteQueue {
    /// A client that is not connected yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Open (or create) a queue database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let queue = Self::new();
        queue.open_endpoint(&path.as_ref().to_string_lossy())?;
        Ok(queue)
    }

    /// Open a private in-memory queue database.
    pub fn open_in_memory() -> Result<Self, SinkError> {
        let queue = Self::new();
        queue.open_endpoint(IN_MEMORY)?;
        Ok(queue)
    }

    fn guard(&self) -> MutexGuard<'_, Option<Open>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn init_schema(conn: &Connection) -> Result<(), SinkError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                queue TEXT NOT NULL,
                payload BLOB NOT NULL,
                enqueued_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_queue
                ON messages(queue, id);

            PRAGMA journal_mode = WAL;
            "#,
        )?;
        Ok(())
    }

    fn open_endpoint(&self, endpoint: &str) -> Result<(), SinkError> {
        let mut slot = self.guard();
        if slot.as_ref().is_some_and(|open| open.endpoint == endpoint) {
            return Ok(());
        }
        let conn = if endpoint == IN_MEMORY {
            Connection::open_in_memory()?
        } else {
            Connection::open(endpoint)?
        };
        Self::init_schema(&conn)?;
        debug!(endpoint, "queue database opened");
        *slot = Some(Open {
            endpoint: endpoint.to_string(),
            conn,
        });
        Ok(())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T, SinkError>) -> Result<T, SinkError> {
        let mut slot = self.guard();
        let open = slot.as_mut().ok_or(SinkError::NotConnected)?;
        f(&mut open.conn)
    }

    /// Append a payload to `queue`.
    pub fn push(&self, queue: &str, payload: &[u8]) -> Result<(), SinkError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (queue, payload, enqueued_at) VALUES (?1, ?2, ?3)",
                params![queue, payload, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
    }

    /// Remove and return the oldest payload in `queue`.
    pub fn pop(&self, queue: &str) -> Result<Option<Vec<u8>>, SinkError> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let head: Option<(i64, Vec<u8>)> = tx
                .query_row(
                    "SELECT id, payload FROM messages WHERE queue = ?1 ORDER BY id LIMIT 1",
                    params![queue],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if let Some((id, _)) = &head {
                tx.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(head.map(|(_, payload)| payload))
        })
    }

    /// Pop every payload currently in `queue`, oldest first.
    pub fn drain(&self, queue: &str) -> Result<Vec<Vec<u8>>, SinkError> {
        let mut out = Vec::new();
        while let Some(payload) = self.pop(queue)? {
            out.push(payload);
        }
        Ok(out)
    }

    /// Number of payloads waiting in `queue`
    pub fn len(&self, queue: &str) -> Result<usize, SinkError> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE queue = ?1",
                params![queue],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
    }

    pub fn is_empty(&self, queue: &str) -> Result<bool, SinkError> {
        Ok(self.len(queue)? == 0)
    }
}

#[async_trait]
impl QueueClient for SqliteQueue {
    async fn connect(&self, server: &QueueServerSpec) -> Result<(), SinkError> {
        self.open_endpoint(&server.endpoint)
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), SinkError> {
        self.push(queue, &payload)
    }
}
