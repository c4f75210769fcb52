//! SQLite Store
//!
//! Persists memories, audit, feedback, tuning log, current context, and
//! meta. The FTS5 lexical index is kept synchronized through write-time
//! triggers; the vector index is mirrored into an in-process backend on
//! every vector write.
//!
//! Separate reader/writer connections give interior mutability: all methods
//! take `&self`, making the store `Send + Sync` so pipelines can share an
//! `Arc<Store>` across threads.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::embeddings::Embedding;
use crate::memory::{
    AuditAction, AuditRow, CurrentContext, InjectionFeedback, MemoryRecord, MemoryType, Tier,
    TuningEntry, TuningSource,
};
use crate::search::{quote_as_phrase, sanitize_fts5_query, ScanIndex, VectorBackend};

use super::retry::with_write_retry;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Write lock contention survived the retry policy
    #[error("database locked after {attempts} attempts")]
    DatabaseLocked { attempts: u32 },
    /// Memory not found
    #[error("Memory not found: {0}")]
    NotFound(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Stored data violates the schema (unknown tier/type, bad timestamp)
    #[error("Schema error: {0}")]
    Schema(String),
    /// Stored vectors do not match the active embedding dimension
    #[error("vector dimension mismatch: store holds {found}, provider produces {expected}")]
    VectorDimensionMismatch { expected: usize, found: usize },
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

impl StorageError {
    /// Whether the caller may retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::DatabaseLocked { .. })
    }

    /// Convert load-path errors so schema violations surface as such.
    fn from_load(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::FromSqlConversionFailure(_, _, ref inner) = e {
            return StorageError::Schema(inner.to_string());
        }
        StorageError::Database(e)
    }
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

/// Meta key holding the RFC 3339 timestamp of the last decay sweep.
pub const META_LAST_DECAY_RUN: &str = "last_decay_run";

/// Flags togglable through `set_flag`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryFlag {
    Pinned,
    DoNotInject,
}

/// Aggregate counts for the statistics surface.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub total: i64,
    pub hot: i64,
    pub warm: i64,
    pub cold: i64,
    pub archive: i64,
    pub pinned: i64,
    pub forgotten: i64,
    pub by_type: HashMap<String, i64>,
    pub with_vectors: i64,
    pub last_decay_run: Option<DateTime<Utc>>,
}

// ============================================================================
// STORE
// ============================================================================

/// Single-writer/many-reader persistent store.
pub struct Store {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    vectors: Mutex<Box<dyn VectorBackend>>,
    embedding_dim: usize,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("embedding_dim", &self.embedding_dim)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Apply PRAGMAs to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -64000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("dev", "sediment", "core").ok_or_else(|| {
            StorageError::Init("Could not determine project directories".to_string())
        })?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        // Restrict directory permissions to owner-only on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            let _ = std::fs::set_permissions(data_dir, perms);
        }
        Ok(data_dir.join("sediment.db"))
    }

    /// Open a store with the default in-process scan backend.
    pub fn open(db_path: Option<PathBuf>, embedding_dim: usize) -> Result<Self> {
        Self::open_with_backend(db_path, embedding_dim, Box::new(ScanIndex::new(embedding_dim)))
    }

    /// Open a store with a caller-chosen vector backend. The backend must
    /// report the same dimensionality as `embedding_dim`.
    pub fn open_with_backend(
        db_path: Option<PathBuf>,
        embedding_dim: usize,
        backend: Box<dyn VectorBackend>,
    ) -> Result<Self> {
        if backend.dimensions() != embedding_dim {
            return Err(StorageError::VectorDimensionMismatch {
                expected: embedding_dim,
                found: backend.dimensions(),
            });
        }

        let path = match db_path {
            Some(p) => p,
            None => Self::default_db_path()?,
        };

        let writer_conn = Connection::open(&path)?;

        // Restrict database file permissions to owner-only on Unix
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;

        // Apply migrations on writer only
        super::migrations::apply_migrations(&writer_conn).map_err(|e| {
            StorageError::Schema(format!("migration failed: {}", e))
        })?;

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        let store = Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
            vectors: Mutex::new(backend),
            embedding_dim,
        };

        store.verify_vector_dimensions()?;
        store.load_vectors_into_backend()?;

        Ok(store)
    }

    /// The embedding dimensionality this store was opened with.
    pub fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    /// Fatal at open: any persisted vector of a different dimension means
    /// the store was built against another embedding model.
    fn verify_vector_dimensions(&self) -> Result<()> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;

        let mut stmt = reader.prepare("SELECT DISTINCT dimensions FROM memory_vectors")?;
        let dims: Vec<i64> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<_, _>>()?;

        for d in dims {
            if d as usize != self.embedding_dim {
                return Err(StorageError::VectorDimensionMismatch {
                    expected: self.embedding_dim,
                    found: d as usize,
                });
            }
        }
        Ok(())
    }

    /// Load persisted vectors into the in-process backend.
    fn load_vectors_into_backend(&self) -> Result<()> {
        let rows: Vec<(String, Vec<u8>)> = {
            let reader = self
                .reader
                .lock()
                .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
            let mut stmt = reader.prepare("SELECT memory_id, embedding FROM memory_vectors")?;
            let collected = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
                .filter_map(|r| r.ok())
                .collect();
            collected
        };

        let mut backend = self
            .vectors
            .lock()
            .map_err(|_| StorageError::Init("Vector backend lock poisoned".into()))?;

        for (memory_id, bytes) in rows {
            match Embedding::from_bytes(&bytes) {
                Some(embedding) => {
                    if let Err(e) = backend.add(&memory_id, &embedding.vector) {
                        tracing::warn!("failed to index vector for {}: {}", memory_id, e);
                    }
                }
                None => tracing::warn!("corrupt vector blob for {}, skipping", memory_id),
            }
        }

        Ok(())
    }

    // ========================================================================
    // ROW MAPPING
    // ========================================================================

    fn schema_err(detail: String) -> rusqlite::Error {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            detail.into(),
        )
    }

    fn row_to_record(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
        let type_str: String = row.get("memory_type")?;
        let memory_type = MemoryType::parse_name(&type_str)
            .ok_or_else(|| Self::schema_err(format!("unknown memory_type '{}'", type_str)))?;

        let tier_str: String = row.get("tier")?;
        let tier = Tier::parse_name(&tier_str)
            .ok_or_else(|| Self::schema_err(format!("unknown tier '{}'", tier_str)))?;

        let use_days_json: String = row.get("use_days")?;
        let use_days = parse_use_days(&use_days_json);

        Ok(MemoryRecord {
            id: row.get("id")?,
            text: row.get("text")?,
            memory_type,
            tier,
            importance: row.get("importance")?,
            pinned: row.get::<_, i64>("pinned")? != 0,
            do_not_inject: row.get::<_, i64>("do_not_inject")? != 0,
            use_count: row.get("use_count")?,
            last_accessed_at: row.get("last_accessed_at")?,
            use_days,
            created_at: row.get("created_at")?,
            source: row.get("source")?,
            category: row.get("category")?,
            parent_id: row.get("parent_id")?,
        })
    }

    /// Snapshot used in audit rows; always carries tier and memory_type.
    fn snapshot_json(record: &MemoryRecord) -> serde_json::Value {
        serde_json::json!({
            "tier": record.tier.as_str(),
            "memory_type": record.memory_type.as_str(),
            "pinned": record.pinned,
            "do_not_inject": record.do_not_inject,
        })
    }

    // ========================================================================
    // MEMORY WRITES
    // ========================================================================

    /// Insert a memory and its vector atomically. The FTS entry is created
    /// by trigger inside the same transaction.
    pub fn insert(&self, record: &MemoryRecord, vector: &[f32]) -> Result<()> {
        if vector.len() != self.embedding_dim {
            return Err(StorageError::VectorDimensionMismatch {
                expected: self.embedding_dim,
                found: vector.len(),
            });
        }

        let embedding = Embedding::new(vector.to_vec());
        let use_days_json =
            serde_json::to_string(&record.use_days).unwrap_or_else(|_| "[]".to_string());

        {
            let mut writer = self
                .writer
                .lock()
                .map_err(|_| StorageError::Init("Writer lock poisoned".into()))?;

            with_write_retry(|| {
                let tx = writer.transaction()?;
                tx.execute(
                    "INSERT INTO memories (
                        id, text, memory_type, tier, importance, pinned, do_not_inject,
                        use_count, last_accessed_at, use_days, created_at,
                        source, category, parent_id
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                    params![
                        record.id,
                        record.text,
                        record.memory_type.as_str(),
                        record.tier.as_str(),
                        record.importance,
                        record.pinned as i64,
                        record.do_not_inject as i64,
                        record.use_count,
                        record.last_accessed_at,
                        use_days_json,
                        record.created_at,
                        record.source,
                        record.category,
                        record.parent_id,
                    ],
                )?;
                tx.execute(
                    "INSERT INTO memory_vectors (memory_id, embedding, dimensions, model, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        record.id,
                        embedding.to_bytes(),
                        self.embedding_dim as i64,
                        Option::<String>::None,
                        Utc::now(),
                    ],
                )?;
                tx.commit()
            })?;
        }

        let mut backend = self
            .vectors
            .lock()
            .map_err(|_| StorageError::Init("Vector backend lock poisoned".into()))?;
        if let Err(e) = backend.add(&record.id, vector) {
            tracing::warn!("failed to index vector for {}: {}", record.id, e);
        }

        Ok(())
    }

    /// Replace a memory's text, re-indexing lexical (trigger) and vector
    /// entries.
    pub fn update_text(&self, id: &str, text: &str, vector: &[f32]) -> Result<()> {
        if vector.len() != self.embedding_dim {
            return Err(StorageError::VectorDimensionMismatch {
                expected: self.embedding_dim,
                found: vector.len(),
            });
        }

        let embedding = Embedding::new(vector.to_vec());

        let changed = {
            let mut writer = self
                .writer
                .lock()
                .map_err(|_| StorageError::Init("Writer lock poisoned".into()))?;

            with_write_retry(|| {
                let tx = writer.transaction()?;
                let changed = tx.execute(
                    "UPDATE memories SET text = ?1 WHERE id = ?2",
                    params![text, id],
                )?;
                tx.execute(
                    "UPDATE memory_vectors SET embedding = ?1 WHERE memory_id = ?2",
                    params![embedding.to_bytes(), id],
                )?;
                tx.commit()?;
                Ok(changed)
            })?
        };

        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }

        let mut backend = self
            .vectors
            .lock()
            .map_err(|_| StorageError::Init("Vector backend lock poisoned".into()))?;
        if let Err(e) = backend.add(id, vector) {
            tracing::warn!("failed to re-index vector for {}: {}", id, e);
        }

        Ok(())
    }

    /// Record a read: bump `use_count`, set `last_accessed_at`, union
    /// today's date into `use_days`. Idempotent per calendar date.
    pub fn update_access(&self, id: &str, now: DateTime<Utc>) -> Result<()> {
        let record = self.get(id)?.ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        let today = now.format("%Y-%m-%d").to_string();
        let mut use_days = record.use_days;
        if !use_days.contains(&today) {
            use_days.push(today);
            use_days.sort();
        }
        let use_days_json = serde_json::to_string(&use_days).unwrap_or_else(|_| "[]".to_string());

        let writer = self
            .writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))?;
        with_write_retry(|| {
            writer.execute(
                "UPDATE memories SET use_count = use_count + 1, last_accessed_at = ?1, use_days = ?2
                 WHERE id = ?3",
                params![now, use_days_json, id],
            )
        })?;

        Ok(())
    }

    /// Change a memory's tier. The audit row commits with the update;
    /// the action is demote or promote depending on direction.
    pub fn set_tier(&self, id: &str, new_tier: Tier, reason: &str) -> Result<()> {
        let record = self.get(id)?.ok_or_else(|| StorageError::NotFound(id.to_string()))?;
        if record.tier == new_tier {
            return Ok(());
        }

        let action = if new_tier > record.tier {
            AuditAction::Demote
        } else {
            AuditAction::Promote
        };

        let old_value = Self::snapshot_json(&record);
        let mut after = record.clone();
        after.tier = new_tier;
        let mut new_value = Self::snapshot_json(&after);
        if let Some(obj) = new_value.as_object_mut() {
            obj.insert("reason".to_string(), serde_json::Value::String(reason.to_string()));
        }

        let mut writer = self
            .writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))?;
        with_write_retry(|| {
            let tx = writer.transaction()?;
            tx.execute(
                "UPDATE memories SET tier = ?1 WHERE id = ?2",
                params![new_tier.as_str(), id],
            )?;
            tx.execute(
                "INSERT INTO memory_audit (memory_id, action, old_value, new_value, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    action.as_str(),
                    old_value.to_string(),
                    new_value.to_string(),
                    Utc::now(),
                ],
            )?;
            tx.commit()
        })?;

        Ok(())
    }

    /// Toggle `pinned` or `do_not_inject`. The audit row commits with the
    /// update.
    pub fn set_flag(&self, id: &str, flag: MemoryFlag, value: bool, reason: &str) -> Result<()> {
        let record = self.get(id)?.ok_or_else(|| StorageError::NotFound(id.to_string()))?;

        let (column, action, already) = match (flag, value) {
            (MemoryFlag::Pinned, true) => ("pinned", AuditAction::Pin, record.pinned),
            (MemoryFlag::Pinned, false) => ("pinned", AuditAction::Unpin, !record.pinned),
            (MemoryFlag::DoNotInject, true) => {
                ("do_not_inject", AuditAction::Forget, record.do_not_inject)
            }
            (MemoryFlag::DoNotInject, false) => {
                ("do_not_inject", AuditAction::Restore, !record.do_not_inject)
            }
        };
        if already {
            return Ok(());
        }

        let old_value = Self::snapshot_json(&record);
        let mut after = record.clone();
        match flag {
            MemoryFlag::Pinned => after.pinned = value,
            MemoryFlag::DoNotInject => after.do_not_inject = value,
        }
        let mut new_value = Self::snapshot_json(&after);
        if let Some(obj) = new_value.as_object_mut() {
            obj.insert("reason".to_string(), serde_json::Value::String(reason.to_string()));
        }

        let sql = format!("UPDATE memories SET {} = ?1 WHERE id = ?2", column);
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))?;
        with_write_retry(|| {
            let tx = writer.transaction()?;
            tx.execute(&sql, params![value as i64, id])?;
            tx.execute(
                "INSERT INTO memory_audit (memory_id, action, old_value, new_value, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    action.as_str(),
                    old_value.to_string(),
                    new_value.to_string(),
                    Utc::now(),
                ],
            )?;
            tx.commit()
        })?;

        Ok(())
    }

    /// Hard delete. Vector, feedback, and audit rows cascade; the FTS entry
    /// is removed by trigger.
    pub fn delete(&self, id: &str) -> Result<()> {
        let changed = {
            let writer = self
                .writer
                .lock()
                .map_err(|_| StorageError::Init("Writer lock poisoned".into()))?;
            with_write_retry(|| {
                writer.execute("DELETE FROM memories WHERE id = ?1", params![id])
            })?
        };

        if changed == 0 {
            return Err(StorageError::NotFound(id.to_string()));
        }

        let mut backend = self
            .vectors
            .lock()
            .map_err(|_| StorageError::Init("Vector backend lock poisoned".into()))?;
        if let Err(e) = backend.remove(id) {
            tracing::warn!("failed to drop vector for {}: {}", id, e);
        }

        Ok(())
    }

    // ========================================================================
    // MEMORY READS
    // ========================================================================

    /// Load one memory.
    pub fn get(&self, id: &str) -> Result<Option<MemoryRecord>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        reader
            .query_row(
                "SELECT * FROM memories WHERE id = ?1",
                params![id],
                Self::row_to_record,
            )
            .optional()
            .map_err(StorageError::from_load)
    }

    /// Bulk load, preserving the order of `ids`. Missing ids are skipped.
    pub fn query_by_ids(&self, ids: &[String]) -> Result<Vec<MemoryRecord>> {
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.get(id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Non-pinned members of a tier, oldest access first.
    pub fn members_of_tier(&self, tier: Tier) -> Result<Vec<MemoryRecord>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        let mut stmt = reader.prepare(
            "SELECT * FROM memories WHERE tier = ?1 AND pinned = 0
             ORDER BY last_accessed_at ASC",
        )?;
        let rows = stmt
            .query_map(params![tier.as_str()], Self::row_to_record)
            .map_err(StorageError::from_load)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(StorageError::from_load)?);
        }
        Ok(records)
    }

    /// COLD, non-pinned memories with at least `min_uses` accesses. The
    /// distinct-day criterion is applied by the promotion engine.
    pub fn promotion_candidates(&self, min_uses: i64) -> Result<Vec<MemoryRecord>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        let mut stmt = reader.prepare(
            "SELECT * FROM memories WHERE tier = 'COLD' AND pinned = 0 AND use_count >= ?1",
        )?;
        let rows = stmt
            .query_map(params![min_uses], Self::row_to_record)
            .map_err(StorageError::from_load)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.map_err(StorageError::from_load)?);
        }
        Ok(records)
    }

    // ========================================================================
    // SEARCH
    // ========================================================================

    /// Lexical search over the FTS index. Returns `(id, score)` with scores
    /// already negated so higher is better.
    ///
    /// Parse failures retry with the query quoted as a literal phrase; if
    /// that also fails, lexical contributes nothing and the caller ranks on
    /// vectors alone.
    pub fn lexical_search(&self, query: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        let sanitized = sanitize_fts5_query(query);
        if sanitized.is_empty() {
            return Ok(Vec::new());
        }

        match self.lexical_match(&sanitized, limit) {
            Ok(results) => Ok(results),
            Err(StorageError::Database(first_err)) => {
                let phrase = quote_as_phrase(query);
                match self.lexical_match(&phrase, limit) {
                    Ok(results) => Ok(results),
                    Err(_) => {
                        tracing::warn!("lexical query unusable ({}), vector-only ranking", first_err);
                        Ok(Vec::new())
                    }
                }
            }
            Err(e) => Err(e),
        }
    }

    fn lexical_match(&self, match_expr: &str, limit: usize) -> Result<Vec<(String, f32)>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        let mut stmt = reader.prepare(
            "SELECT id, bm25(memories_fts) AS raw
             FROM memories_fts
             WHERE memories_fts MATCH ?1
             ORDER BY raw
             LIMIT ?2",
        )?;

        let rows = stmt.query_map(params![match_expr, limit as i64], |row| {
            let id: String = row.get(0)?;
            let raw: f64 = row.get(1)?;
            Ok((id, -raw as f32))
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Dense-vector search (cosine on unit-normalized vectors).
    pub fn vector_search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>> {
        let backend = self
            .vectors
            .lock()
            .map_err(|_| StorageError::Init("Vector backend lock poisoned".into()))?;
        backend
            .search(query, k)
            .map_err(|e| StorageError::Init(format!("vector search failed: {}", e)))
    }

    /// Nearest stored vector, for duplicate suppression.
    pub fn nearest_similarity(&self, vector: &[f32]) -> Result<Option<(String, f32)>> {
        Ok(self.vector_search(vector, 1)?.into_iter().next())
    }

    /// The stored vector for one memory, if any.
    pub fn get_vector(&self, memory_id: &str) -> Result<Option<Vec<f32>>> {
        let bytes: Option<Vec<u8>> = {
            let reader = self
                .reader
                .lock()
                .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
            reader
                .query_row(
                    "SELECT embedding FROM memory_vectors WHERE memory_id = ?1",
                    params![memory_id],
                    |row| row.get(0),
                )
                .optional()?
        };

        Ok(bytes.and_then(|b| Embedding::from_bytes(&b)).map(|e| e.vector))
    }

    // ========================================================================
    // AUDIT, FEEDBACK, TUNING
    // ========================================================================

    /// Audit rows for one memory, oldest first.
    pub fn audit_for(&self, memory_id: &str) -> Result<Vec<AuditRow>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        let mut stmt = reader.prepare(
            "SELECT id, memory_id, action, old_value, new_value, created_at
             FROM memory_audit WHERE memory_id = ?1 ORDER BY id ASC",
        )?;

        let rows = stmt.query_map(params![memory_id], |row| {
            let action_str: String = row.get("action")?;
            let action = AuditAction::parse_name(&action_str)
                .ok_or_else(|| Self::schema_err(format!("unknown audit action '{}'", action_str)))?;
            let old_str: String = row.get("old_value")?;
            let new_str: String = row.get("new_value")?;
            Ok(AuditRow {
                id: row.get("id")?,
                memory_id: row.get("memory_id")?,
                action,
                old_value: serde_json::from_str(&old_str).unwrap_or(serde_json::Value::Null),
                new_value: serde_json::from_str(&new_str).unwrap_or(serde_json::Value::Null),
                created_at: row.get("created_at")?,
            })
        })?;

        let mut audit = Vec::new();
        for row in rows {
            audit.push(row.map_err(StorageError::from_load)?);
        }
        Ok(audit)
    }

    /// Append one injection-feedback row.
    pub fn record_feedback(&self, feedback: &InjectionFeedback) -> Result<()> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))?;
        with_write_retry(|| {
            writer.execute(
                "INSERT INTO injection_feedback (
                    memory_id, session_key, injected_at, access_frequency,
                    injection_density, session_outcome, proxy_score, agent_score
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    feedback.memory_id,
                    feedback.session_key,
                    feedback.injected_at,
                    feedback.access_frequency,
                    feedback.injection_density,
                    feedback.session_outcome,
                    feedback.proxy_score,
                    feedback.agent_score,
                ],
            )
        })?;
        Ok(())
    }

    /// Feedback rows for one memory, newest first.
    pub fn feedback_for(&self, memory_id: &str) -> Result<Vec<InjectionFeedback>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        let mut stmt = reader.prepare(
            "SELECT memory_id, session_key, injected_at, access_frequency,
                    injection_density, session_outcome, proxy_score, agent_score
             FROM injection_feedback WHERE memory_id = ?1 ORDER BY injected_at DESC",
        )?;

        let rows = stmt.query_map(params![memory_id], |row| {
            Ok(InjectionFeedback {
                memory_id: row.get(0)?,
                session_key: row.get(1)?,
                injected_at: row.get(2)?,
                access_frequency: row.get(3)?,
                injection_density: row.get(4)?,
                session_outcome: row.get(5)?,
                proxy_score: row.get(6)?,
                agent_score: row.get(7)?,
            })
        })?;

        let mut feedback = Vec::new();
        for row in rows {
            feedback.push(row?);
        }
        Ok(feedback)
    }

    /// Append one tuning-log entry.
    pub fn record_tuning(
        &self,
        parameter: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
        reason: Option<&str>,
        source: TuningSource,
        user_override_until: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))?;
        with_write_retry(|| {
            writer.execute(
                "INSERT INTO tuning_log (
                    parameter, old_value, new_value, reason, source,
                    user_override_until, reverted, timestamp
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                params![
                    parameter,
                    old_value,
                    new_value,
                    reason,
                    source.as_str(),
                    user_override_until,
                    Utc::now(),
                ],
            )
        })?;
        Ok(())
    }

    /// Most recent tuning entries.
    pub fn tuning_log(&self, limit: usize) -> Result<Vec<TuningEntry>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        let mut stmt = reader.prepare(
            "SELECT id, parameter, old_value, new_value, reason, source,
                    user_override_until, reverted, timestamp
             FROM tuning_log ORDER BY id DESC LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let source_str: String = row.get("source")?;
            Ok(TuningEntry {
                id: row.get("id")?,
                parameter: row.get("parameter")?,
                old_value: row.get("old_value")?,
                new_value: row.get("new_value")?,
                reason: row.get("reason")?,
                source: TuningSource::parse_name(&source_str),
                user_override_until: row.get("user_override_until")?,
                reverted: row.get::<_, i64>("reverted")? != 0,
                timestamp: row.get("timestamp")?,
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    // ========================================================================
    // META + CURRENT CONTEXT
    // ========================================================================

    pub fn meta_get(&self, key: &str) -> Result<Option<String>> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
        reader
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()
            .map_err(StorageError::Database)
    }

    pub fn meta_set(&self, key: &str, value: &str) -> Result<()> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))?;
        with_write_retry(|| {
            writer.execute(
                "INSERT INTO meta (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                params![key, value],
            )
        })?;
        Ok(())
    }

    /// The active current-context, if one exists and has not expired.
    /// Expired slots are dropped lazily on read.
    pub fn current_context(&self, now: DateTime<Utc>) -> Result<Option<CurrentContext>> {
        let ctx: Option<CurrentContext> = {
            let reader = self
                .reader
                .lock()
                .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;
            reader
                .query_row(
                    "SELECT text, created_at, ttl_seconds FROM current_context WHERE slot = 0",
                    [],
                    |row| {
                        Ok(CurrentContext {
                            text: row.get(0)?,
                            created_at: row.get(1)?,
                            ttl_seconds: row.get(2)?,
                        })
                    },
                )
                .optional()?
        };

        match ctx {
            Some(ctx) if ctx.is_expired(now) => {
                self.clear_current_context()?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    pub fn set_current_context(
        &self,
        text: &str,
        ttl_seconds: i64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))?;
        with_write_retry(|| {
            writer.execute(
                "INSERT OR REPLACE INTO current_context (slot, text, created_at, ttl_seconds)
                 VALUES (0, ?1, ?2, ?3)",
                params![text, now, ttl_seconds],
            )
        })?;
        Ok(())
    }

    pub fn clear_current_context(&self) -> Result<()> {
        let writer = self
            .writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))?;
        with_write_retry(|| writer.execute("DELETE FROM current_context WHERE slot = 0", []))?;
        Ok(())
    }

    // ========================================================================
    // STATS
    // ========================================================================

    pub fn stats(&self) -> Result<StoreStats> {
        let reader = self
            .reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))?;

        let count = |sql: &str| -> Result<i64> {
            Ok(reader.query_row(sql, [], |row| row.get(0))?)
        };

        let total = count("SELECT COUNT(*) FROM memories")?;
        let hot = count("SELECT COUNT(*) FROM memories WHERE tier = 'HOT'")?;
        let warm = count("SELECT COUNT(*) FROM memories WHERE tier = 'WARM'")?;
        let cold = count("SELECT COUNT(*) FROM memories WHERE tier = 'COLD'")?;
        let archive = count("SELECT COUNT(*) FROM memories WHERE tier = 'ARCHIVE'")?;
        let pinned = count("SELECT COUNT(*) FROM memories WHERE pinned = 1")?;
        let forgotten = count("SELECT COUNT(*) FROM memories WHERE do_not_inject = 1")?;
        let with_vectors = count("SELECT COUNT(*) FROM memory_vectors")?;

        let mut by_type = HashMap::new();
        let mut stmt =
            reader.prepare("SELECT memory_type, COUNT(*) FROM memories GROUP BY memory_type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (t, c) = row?;
            by_type.insert(t, c);
        }
        drop(stmt);

        let last_decay_run = reader
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![META_LAST_DECAY_RUN],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(StoreStats {
            total,
            hot,
            warm,
            cold,
            archive,
            pinned,
            forgotten,
            by_type,
            with_vectors,
            last_decay_run,
        })
    }
}

/// Corrupt `use_days` JSON is treated as empty with a warning, never fatal.
fn parse_use_days(json: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(json) {
        Ok(mut days) => {
            days.sort();
            days.dedup();
            days
        }
        Err(e) => {
            tracing::warn!("corrupt use_days JSON ({}), treating as empty", e);
            Vec::new()
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
