//! Shared type definitions for the database layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

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
}

/// A row from the `raw_msgs` or `msgs` table (both share this shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbMessage {
    /// Envelope "From " line; the natural unique key.
    pub from_line: String,
    /// RFC 3339 timestamp parsed from the envelope line.
    pub msg_date: String,
    /// Canonical lowercase sender email.
    pub sender: String,
    /// Canonical lowercase receiver email.
    pub receiver: String,
    pub subject: Option<String>,
    /// JSON array of `"Name: value"` header strings, in original order.
    pub headers: String,
    /// Cleaned plain-text body.
    pub payload: String,
}

/// A row from the `address_book` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DbAddressEntry {
    pub email_addr: String,
    pub display_name: String,
}
