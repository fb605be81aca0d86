//! Store-collaborator interface and its SQLite implementation.
//!
//! The aggregate store holds poll records, their valid option sets, and the
//! running vote totals. The only write the aggregator performs is the
//! selector-gated increment in [`PollStoreWriter::increment_votes`].

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub enum StoreError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
    Database(String),
    Migration(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Io(e) => write!(f, "IO error: {}", e),
            StoreError::Serialization(e) => write!(f, "Serialization error: {}", e),
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Migration(e) => write!(f, "Migration error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Durable additive increments against the aggregate store.
#[async_trait]
pub trait PollStoreWriter: Send + Sync {
    /// Add `count` votes for `option` on every poll whose option set
    /// contains `option`.
    ///
    /// Returns the number of poll records matched. Zero matches means the
    /// option belongs to no known poll; that is a successful no-op, not an
    /// error. An `Err` is a transport/operation failure and leaves the
    /// caller's pending count untouched.
    async fn increment_votes(&self, option: &str, count: u64) -> Result<u64, StoreError>;
}

/// A poll as the store knows it: identifier, title, and the option set
/// that gates which votes land on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRecord {
    pub id: String,
    pub title: String,
    pub options: Vec<String>,
}

/// Run schema migrations from SQL files.
///
/// Reads all `.sql` files from `schema_dir` in name order and executes
/// them. Every file must use `IF NOT EXISTS` clauses so this can run on
/// each startup.
pub fn run_schema_migrations(conn: &mut Connection, schema_dir: &str) -> Result<(), StoreError> {
    let schema_path = Path::new(schema_dir);
    if !schema_path.exists() {
        return Err(StoreError::Migration(format!(
            "schema directory not found: {}",
            schema_dir
        )));
    }

    conn.pragma_update(None, "journal_mode", "WAL")?;

    let mut sql_files: Vec<_> = fs::read_dir(schema_path)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.path().extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();
    sql_files.sort_by_key(|entry| entry.file_name());

    for entry in sql_files {
        let path = entry.path();
        log::info!("Applying schema file {}", path.display());
        let sql = fs::read_to_string(&path)?;
        conn.execute_batch(&sql)?;
    }

    Ok(())
}

/// Load poll records from a JSON file.
pub fn load_poll_file(path: &str) -> Result<Vec<PollRecord>, StoreError> {
    let json = fs::read_to_string(path)?;
    let polls: Vec<PollRecord> = serde_json::from_str(&json)?;
    Ok(polls)
}

/// Insert poll records and their option sets. Idempotent: existing rows
/// are left alone. Returns the number of polls processed.
pub fn seed_polls(conn: &mut Connection, polls: &[PollRecord]) -> Result<usize, StoreError> {
    let tx = conn.transaction()?;
    let now = Utc::now().timestamp();

    for poll in polls {
        tx.execute(
            "INSERT OR IGNORE INTO polls (poll_id, title, created_at) VALUES (?1, ?2, ?3)",
            rusqlite::params![poll.id, poll.title, now],
        )?;
        for option in &poll.options {
            tx.execute(
                "INSERT OR IGNORE INTO poll_options (poll_id, option) VALUES (?1, ?2)",
                rusqlite::params![poll.id, option],
            )?;
        }
    }

    tx.commit()?;
    Ok(polls.len())
}

/// SQLite implementation of [`PollStoreWriter`].
pub struct SqlitePollWriter {
    conn: Arc<Mutex<Connection>>,
}

impl SqlitePollWriter {
    /// Open a writer on an existing database. Schema setup is the
    /// caller's job (see [`run_schema_migrations`]).
    pub fn new(db_path: &str) -> Result<Self, StoreError> {
        let conn = Connection::open(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl PollStoreWriter for SqlitePollWriter {
    async fn increment_votes(&self, option: &str, count: u64) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();

        // One statement both writes and validates: the SELECT only yields
        // rows for polls whose option set contains the option, so an
        // unknown option touches nothing and reports zero matches.
        let matched = conn.execute(
            r#"
            INSERT INTO poll_results (poll_id, option, votes, updated_at)
            SELECT poll_id, ?1, ?2, ?3 FROM poll_options WHERE option = ?1
            ON CONFLICT(poll_id, option) DO UPDATE SET
                votes = votes + excluded.votes,
                updated_at = excluded.updated_at
            "#,
            rusqlite::params![option, count as i64, Utc::now().timestamp()],
        )?;

        Ok(matched as u64)
    }
}
