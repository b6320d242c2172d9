//! Error types for archive ingestion.
//!
//! Errors are classified by severity:
//! - Fatal: an unparseable envelope date (the timestamp is load-bearing for
//!   ordering, so the whole run aborts), or an IO/database failure.
//! - Degraded: malformed address headers are replaced with junk sentinels
//!   inside the normalizer and never surface here.
//! - Ignorable: duplicate-key insert conflicts are logged and swallowed by
//!   the store layer.

use thiserror::Error;

use crate::db::DbError;

/// Errors that can abort an ingestion run.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The envelope "From " line carried no parseable timestamp.
    #[error("unparseable date on envelope line {0:?}")]
    EnvelopeDate(String),

    #[error("failed to read mbox: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Db(#[from] DbError),
}
