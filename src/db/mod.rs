//! SQLite-backed durable store for canonical TODOs and the classification
//! cache.
//!
//! The database lives at `~/.commtask/commtask.db`. Communications are
//! owned by the external simulation; this store only holds pipeline output
//! (the `todos` table) and the `project_tag_cache` table keyed by
//! communication id. Writes are single-batch, last-writer-wins; WAL mode
//! keeps concurrent reads safe.

use std::path::PathBuf;

use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

pub mod tag_cache;
pub mod todos;

pub use todos::TodoFilter;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Home directory not found")]
    HomeDirNotFound,

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),

    #[error("Malformed stored value: {0}")]
    Corrupt(String),
}

pub struct PipelineDb {
    conn: Connection,
}

impl PipelineDb {
    /// Open (or create) the database at the default path and apply the
    /// schema.
    pub fn open() -> Result<Self, DbError> {
        Self::open_at(Self::db_path()?)
    }

    /// Open a database at an explicit path. Useful for testing and for
    /// applications that manage their own data directory.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;
        Self::init(conn)
    }

    /// Open an in-memory database. Test-only convenience; migrations still
    /// run so the schema matches the on-disk layout.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::init(Connection::open_in_memory()?)
    }

    /// Open the database in read-only mode for downstream consumers
    /// (reporting, UI) while the pipeline owns writes.
    pub fn open_readonly_at(path: &std::path::Path) -> Result<Self, DbError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Ok(Self { conn })
    }

    fn init(conn: Connection) -> Result<Self, DbError> {
        // WAL mode for concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self { conn })
    }

    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Execute a closure within a SQLite transaction.
    /// Commits on Ok, rolls back on Err.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce(&Self) -> Result<T, DbError>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f(self) {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    /// Resolve the default database path: `~/.commtask/commtask.db`.
    fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".commtask").join("commtask.db"))
    }
}
