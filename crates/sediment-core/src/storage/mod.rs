//! Storage Module
//!
//! Persistent layer: single embedded SQLite file with companion lexical
//! (FTS5) and vector indexes, idempotent migrations, and the write retry
//! policy.

mod migrations;
mod retry;
mod sqlite;

pub use migrations::{apply_migrations, Migration, MIGRATIONS};
pub use sqlite::{
    MemoryFlag, Result, Store, StoreStats, StorageError, META_LAST_DECAY_RUN,
};
