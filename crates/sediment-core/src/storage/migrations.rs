//! Database Migrations
//!
//! Schema migration definitions for the storage layer. Applied idempotently
//! on open, tracked in `schema_version`.

use rusqlite::Connection;

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema: memories, audit, feedback, tuning log, context, meta, FTS5, vectors",
    up: MIGRATION_V1_UP,
}];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    memory_type TEXT NOT NULL DEFAULT 'factual',
    tier TEXT NOT NULL DEFAULT 'HOT',
    importance REAL NOT NULL DEFAULT 0.5,
    pinned INTEGER NOT NULL DEFAULT 0,
    do_not_inject INTEGER NOT NULL DEFAULT 0,
    use_count INTEGER NOT NULL DEFAULT 0,
    last_accessed_at TEXT NOT NULL,
    use_days TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    source TEXT,
    category TEXT,
    parent_id TEXT
);

CREATE INDEX IF NOT EXISTS idx_memories_tier ON memories(tier);
CREATE INDEX IF NOT EXISTS idx_memories_do_not_inject ON memories(do_not_inject);
CREATE INDEX IF NOT EXISTS idx_memories_pinned ON memories(pinned);
CREATE INDEX IF NOT EXISTS idx_memories_last_accessed ON memories(last_accessed_at);

-- Vector storage (little-endian f32 blobs); loaded into the in-process
-- backend at open
CREATE TABLE IF NOT EXISTS memory_vectors (
    memory_id TEXT PRIMARY KEY REFERENCES memories(id) ON DELETE CASCADE,
    embedding BLOB NOT NULL,
    dimensions INTEGER NOT NULL,
    model TEXT,
    created_at TEXT NOT NULL
);

-- Append-only audit trail; one row per tier or flag transition
CREATE TABLE IF NOT EXISTS memory_audit (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    action TEXT NOT NULL,
    old_value TEXT NOT NULL,
    new_value TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_memory ON memory_audit(memory_id);

-- One row per memory per injection event
CREATE TABLE IF NOT EXISTS injection_feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    session_key TEXT,
    injected_at TEXT NOT NULL,
    access_frequency INTEGER NOT NULL DEFAULT 0,
    injection_density REAL NOT NULL DEFAULT 0.0,
    session_outcome TEXT,
    proxy_score REAL,
    agent_score REAL
);

CREATE INDEX IF NOT EXISTS idx_feedback_memory ON injection_feedback(memory_id);
CREATE INDEX IF NOT EXISTS idx_feedback_injected ON injection_feedback(injected_at);

-- Append-only parameter adjustment log
CREATE TABLE IF NOT EXISTS tuning_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    parameter TEXT NOT NULL,
    old_value TEXT,
    new_value TEXT,
    reason TEXT,
    source TEXT NOT NULL DEFAULT 'auto',
    user_override_until TEXT,
    reverted INTEGER NOT NULL DEFAULT 0,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tuning_timestamp ON tuning_log(timestamp);
CREATE INDEX IF NOT EXISTS idx_tuning_parameter ON tuning_log(parameter);

-- Single-slot current task description
CREATE TABLE IF NOT EXISTS current_context (
    slot INTEGER PRIMARY KEY CHECK (slot = 0),
    text TEXT NOT NULL,
    created_at TEXT NOT NULL,
    ttl_seconds INTEGER NOT NULL
);

-- Key/value slots: last_decay_run, persisted profile selections
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- FTS5 virtual table for full-text search
CREATE VIRTUAL TABLE IF NOT EXISTS memories_fts USING fts5(
    id,
    text,
    content='memories',
    content_rowid='rowid'
);

-- Triggers to keep FTS in sync
CREATE TRIGGER IF NOT EXISTS memories_ai AFTER INSERT ON memories BEGIN
    INSERT INTO memories_fts(rowid, id, text)
    VALUES (NEW.rowid, NEW.id, NEW.text);
END;

CREATE TRIGGER IF NOT EXISTS memories_ad AFTER DELETE ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, text)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.text);
END;

CREATE TRIGGER IF NOT EXISTS memories_au AFTER UPDATE OF text ON memories BEGIN
    INSERT INTO memories_fts(memories_fts, rowid, id, text)
    VALUES ('delete', OLD.rowid, OLD.id, OLD.text);
    INSERT INTO memories_fts(rowid, id, text)
    VALUES (NEW.rowid, NEW.id, NEW.text);
END;

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// Apply all migrations newer than the recorded schema version.
pub fn apply_migrations(conn: &Connection) -> Result<(), rusqlite::Error> {
    let current: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current {
            tracing::info!(
                version = migration.version,
                description = migration.description,
                "applying migration"
            );
            conn.execute_batch(migration.up)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
                [migration.version],
            )?;
        }
    }

    Ok(())
}
