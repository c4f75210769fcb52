//! Test Engine Manager
//!
//! One isolated engine per test, over a temporary database that is
//! deleted when the manager drops.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use sediment_core::{
    EmbeddingProvider, MemoryConfig, MemoryEngine, MemoryRecord, MemoryType, SessionContext,
    Tier,
};
use tempfile::TempDir;

use super::{HashEmbedder, EMBED_DIM};

/// Manager for an isolated test engine.
pub struct TestEngine {
    pub engine: MemoryEngine,
    /// Kept alive so the temp directory outlives the engine
    _temp_dir: TempDir,
}

impl TestEngine {
    /// Engine with the default config and the hashing embedder.
    pub fn new() -> Self {
        Self::with_config(MemoryConfig::default())
    }

    /// Engine with a custom config and the hashing embedder.
    pub fn with_config(config: MemoryConfig) -> Self {
        Self::with_provider(config, Arc::new(HashEmbedder::default()))
    }

    /// Engine with a custom config and provider.
    pub fn with_provider(config: MemoryConfig, provider: Arc<dyn EmbeddingProvider>) -> Self {
        let temp_dir = TempDir::new().expect("create temp dir");
        let db_path = temp_dir.path().join("test_sediment.db");
        let engine = MemoryEngine::open(Some(db_path), Some(provider), config)
            .expect("open test engine");

        Self {
            engine,
            _temp_dir: temp_dir,
        }
    }

    /// Default session context (main session).
    pub fn ctx(&self) -> SessionContext {
        SessionContext::default()
    }

    /// Insert a memory directly through the store, bypassing capture, with
    /// full control over placement and timestamps.
    pub fn seed(
        &self,
        text: &str,
        memory_type: MemoryType,
        tier: Tier,
        last_accessed: DateTime<Utc>,
    ) -> MemoryRecord {
        let mut record = MemoryRecord::new(text, memory_type, tier);
        record.created_at = last_accessed;
        record.last_accessed_at = last_accessed;

        let provider = HashEmbedder::new(EMBED_DIM);
        let mut vector = provider.embed(text).expect("embed seed text");
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        self.engine
            .store()
            .insert(&record, &vector)
            .expect("insert seed record");
        record
    }

    /// Insert a fully-prepared record (for pinned/forgotten pre-states).
    pub fn seed_with(&self, record: &MemoryRecord) {
        let provider = HashEmbedder::new(EMBED_DIM);
        let mut vector = provider.embed(&record.text).expect("embed seed text");
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        self.engine
            .store()
            .insert(record, &vector)
            .expect("insert seed record");
    }

    /// Seed a memory whose last access is `hours` hours in the past.
    pub fn seed_aged(
        &self,
        text: &str,
        memory_type: MemoryType,
        tier: Tier,
        hours: i64,
    ) -> MemoryRecord {
        self.seed(text, memory_type, tier, Utc::now() - Duration::hours(hours))
    }
}

impl Default for TestEngine {
    fn default() -> Self {
        Self::new()
    }
}
