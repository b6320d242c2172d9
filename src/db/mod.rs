//! SQLite-backed message and identity store.
//!
//! The database lives at `~/.archivist/archivist.db` and holds three tables:
//! `raw_msgs` (every retained message), `msgs` (the subject-authored subset),
//! and `address_book` (canonical identities). Every insert is keyed on a
//! natural unique identifier, so re-running an ingestion never duplicates
//! rows — conflicts are logged and discarded.

use std::path::PathBuf;

use rusqlite::Connection;

pub mod types;
pub use types::*;

pub mod address_book;
pub mod messages;

pub struct ArchiveDb {
    conn: Connection,
}

impl ArchiveDb {
    /// Borrow the underlying connection for ad-hoc queries.
    pub fn conn_ref(&self) -> &Connection {
        &self.conn
    }

    /// Open (or create) the database at `~/.archivist/archivist.db` and
    /// apply the schema.
    pub fn open() -> Result<Self, DbError> {
        let path = Self::db_path()?;
        Self::open_at(path)
    }

    /// Open a database at an explicit path. Also used by tests.
    pub fn open_at(path: PathBuf) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent).map_err(DbError::CreateDir)?;
            }
        }

        let conn = Connection::open(&path)?;

        // WAL mode for better concurrent read performance.
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        crate::migrations::run_migrations(&conn).map_err(DbError::Migration)?;

        Ok(Self { conn })
    }

    /// Resolve the default database path: `~/.archivist/archivist.db`.
    fn db_path() -> Result<PathBuf, DbError> {
        let home = dirs::home_dir().ok_or(DbError::HomeDirNotFound)?;
        Ok(home.join(".archivist").join("archivist.db"))
    }
}

// =============================================================================
// Shared test utilities
// =============================================================================


// =============================================================================
// Tests
// =============================================================================
