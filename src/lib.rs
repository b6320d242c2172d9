//! Email ingestion and identity resolution for a personal-archive pipeline.
//!
//! The library takes an mbox-format export, reduces each message to a clean
//! plain-text payload, resolves sender/receiver identities, and decides which
//! messages belong to the subject's own correspondence. Everything lands in
//! SQLite behind unique-keyed, idempotent inserts so re-running an ingestion
//! is always safe.
//!
//! Downstream stages (embedding, vector store, graph store) consume the
//! tables this crate produces; they are external collaborators and live
//! elsewhere.

pub mod address;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod mbox;
pub mod migrations;
