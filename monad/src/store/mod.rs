//! Embedded SQLite persistence store.
//!
//! The store is the sole mutator of on-disk state. All public methods are
//! async and serialize access through one connection guarded by a mutex; the
//! blocking SQLite work runs via `tokio::task::block_in_place`, so callers
//! must be on a multi-thread runtime.
//!
//! Schema evolution is forward-only through named migrations `v1…v27`
//! (see [`schema`]); archive immutability is enforced by `BEFORE UPDATE` /
//! `BEFORE DELETE` triggers that raw SQL cannot bypass.

mod agents;
mod compaction;
mod events;
mod jobs;
mod memories;
mod messages;
mod raw_sql;
mod schema;
mod sessions;
mod workspaces;

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::broadcast;

pub use events::JobEvent;
pub use memories::{cosine_similarity, MemoryMatch, SimilarityPolicy};
pub use raw_sql::{SqlOutcome, SqlRow};

/// Capacity of the job event broadcast channel; slow subscribers observe
/// `Lagged` and resync from the table.
const JOB_EVENT_CAPACITY: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage: {0}")]
    Storage(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// Raised by the archive-immutability triggers.
    #[error("immutable: {0}")]
    Immutable(String),
    #[error("serialization: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Maps a rusqlite error, detecting trigger aborts from the immutability
/// triggers so callers can distinguish them from plain storage failures.
pub(crate) fn map_sql_err(e: rusqlite::Error) -> StoreError {
    let text = e.to_string();
    if text.contains("immutable") {
        StoreError::Immutable(text)
    } else {
        StoreError::Storage(text)
    }
}

/// Embedded relational store. Cheap to clone via `Arc` by callers.
pub struct Store {
    db: Arc<Mutex<Connection>>,
    job_events: broadcast::Sender<JobEvent>,
}

impl Store {
    /// Opens (or creates) the database at `path` and applies pending
    /// migrations. Foreign keys are enforced.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref()).map_err(map_sql_err)?;
        Self::init(conn)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(map_sql_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(map_sql_err)?;
        schema::apply_migrations(&conn)?;
        let (job_events, _) = broadcast::channel(JOB_EVENT_CAPACITY);
        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
            job_events,
        })
    }

    /// Subscribes to the job event stream. Events preserve per-job commit
    /// order; ordering across jobs is not guaranteed.
    pub fn subscribe_jobs(&self) -> broadcast::Receiver<JobEvent> {
        self.job_events.subscribe()
    }

    pub(crate) fn emit_job_event(&self, event: JobEvent) {
        // No subscribers is fine; send only fails then.
        let _ = self.job_events.send(event);
    }

    /// Runs `f` with the connection on the blocking pool.
    pub(crate) fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let db = self.db.clone();
        tokio::task::block_in_place(move || {
            let conn = db
                .lock()
                .map_err(|_| StoreError::Storage("connection lock poisoned".into()))?;
            f(&conn)
        })
    }

    /// Structured health check: `SELECT 1` → ok, anything else → down.
    pub async fn health_check(&self) -> bool {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .map_err(map_sql_err)
        })
        .map(|v| v == 1)
        .unwrap_or(false)
    }
}

/// Parses an RFC 3339 column value, surfacing a conversion failure the way
/// rusqlite expects inside row-mapping closures.
pub(crate) fn ts_from_sql(idx: usize, s: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

/// Serializes a value into a JSON text column.
pub(crate) fn to_json_text<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

/// Parses a JSON text column leniently; malformed rows yield the default.
pub(crate) fn from_json_text<T: serde::de::DeserializeOwned + Default>(s: &str) -> T {
    serde_json::from_str(s).unwrap_or_default()
}
