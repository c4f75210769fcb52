//! Memory Engine
//!
//! The facade the host embeds: `capture` at turn end, `recall` before turn
//! start, maintenance sweeps on the host's schedule, and the tool surface
//! mirroring the per-memory state machine. All services are stateless and
//! share one store handle and one embedding provider.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::allocation::{AllocationConfig, Allocator};
use crate::capture::{CaptureFilter, CaptureGate, CaptureReport};
use crate::config::{MemoryConfig, SessionContext};
use crate::embeddings::{dot_product, normalize, EmbeddingError, EmbeddingProvider};
use crate::lifecycle::{
    decay, meta_profile_agent_key, promotion, DecayProfile, DecayReport, ProfileRegistry,
    PromotionReport, META_PROFILE_GLOBAL,
};
use crate::memory::{AuditRow, CurrentContext, MemoryRecord, StoreInput, TuningEntry, TuningSource};
use crate::recall::{extract_query, render_envelope, InjectedMemory, RecallResult};
use crate::scoring::{half_life_days, ScoreBreakdown, Scorer, ScoringWeights};
use crate::search::HybridSearcher;
use crate::storage::{MemoryFlag, Store, StoreStats, StorageError};

/// Query-embedding LRU capacity
const QUERY_CACHE_CAPACITY: usize = 100;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Tool-level and pipeline errors surfaced to the host.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("memory not found: {0}")]
    MemoryNotFound(String),
    #[error("invalid memory id: {0}")]
    InvalidMemoryId(String),
    #[error("a similar memory already exists: {existing_id} (cosine {similarity:.2})")]
    SimilarMemoryExists { existing_id: String, similarity: f32 },
    #[error("memory already forgotten: {0}")]
    AlreadyForgotten(String),
    #[error("memory is not forgotten: {0}")]
    NotForgotten(String),
    #[error("memory already pinned: {0}")]
    AlreadyPinned(String),
    #[error("memory is not pinned: {0}")]
    NotPinned(String),
    #[error("query must not be empty")]
    EmptyQuery,
    #[error("memory text must not be empty")]
    EmptyMemoryText,
    #[error("unknown decay profile: {0}")]
    UnknownProfile(String),
    #[error("no embedding provider configured")]
    NoEmbeddingProvider,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
}

/// Engine result type
pub type Result<T> = std::result::Result<T, EngineError>;

// ============================================================================
// RESULT TYPES
// ============================================================================

/// One hybrid-search hit from the `search` tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    pub memory: MemoryRecord,
    pub combined: f32,
    pub vector_score: f32,
    pub text_score: f32,
}

/// Composite-score breakdown for one memory, from the `explain` tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Explanation {
    pub memory_id: String,
    pub tier: String,
    pub memory_type: String,
    pub pinned: bool,
    pub do_not_inject: bool,
    pub age_days: f64,
    pub half_life_days: f64,
    pub use_count: i64,
    pub distinct_use_days: usize,
    /// Similarity to the supplied query, when one was given and a vector
    /// exists for this memory
    pub similarity: Option<f64>,
    pub score: ScoreBreakdown,
    pub weights: ScoringWeights,
}

// ============================================================================
// ENGINE
// ============================================================================

/// The embeddable memory engine.
pub struct MemoryEngine {
    store: Arc<Store>,
    provider: Arc<dyn EmbeddingProvider>,
    config: MemoryConfig,
    filter: CaptureFilter,
    profiles: ProfileRegistry,
    /// LRU cache so repeated recall prompts skip the provider
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl MemoryEngine {
    /// Open the engine. `provider` is mandatory; `None` is the fatal
    /// no-provider configuration error. Verifies that any persisted
    /// vectors match the provider's dimensionality.
    pub fn open(
        db_path: Option<PathBuf>,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        config: MemoryConfig,
    ) -> Result<Self> {
        let provider = provider.ok_or(EngineError::NoEmbeddingProvider)?;

        let dims = provider.dimensions();
        if config.embedding.dimensions != 0 && config.embedding.dimensions != dims {
            return Err(StorageError::VectorDimensionMismatch {
                expected: config.embedding.dimensions,
                found: dims,
            }
            .into());
        }

        let store = Arc::new(Store::open(db_path, dims)?);

        let mut profiles = ProfileRegistry::new();
        profiles.register(config.decay_profile());

        // SAFETY: the capacity constant is non-zero
        let query_cache = Mutex::new(LruCache::new(
            NonZeroUsize::new(QUERY_CACHE_CAPACITY).expect("capacity is non-zero"),
        ));

        tracing::info!(provider = provider.name(), dimensions = dims, "memory engine open");

        Ok(Self {
            store,
            provider,
            config,
            filter: CaptureFilter::default(),
            profiles,
            query_cache,
        })
    }

    /// The shared store handle, for hosts that render statistics or audit
    /// trails directly.
    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    // ========================================================================
    // EMBEDDING HELPERS
    // ========================================================================

    fn embed_unit(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        let mut vector = self.provider.embed(text)?;
        normalize(&mut vector);
        Ok(vector)
    }

    fn embed_query(&self, text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
        {
            let mut cache = match self.query_cache.lock() {
                Ok(cache) => cache,
                Err(_) => return self.embed_unit(text),
            };
            if let Some(vector) = cache.get(text) {
                return Ok(vector.clone());
            }
        }

        let vector = self.embed_unit(text)?;
        if let Ok(mut cache) = self.query_cache.lock() {
            cache.put(text.to_string(), vector.clone());
        }
        Ok(vector)
    }

    // ========================================================================
    // CAPTURE
    // ========================================================================

    /// Persist the salient parts of an agent turn's final output.
    ///
    /// `turn_successful` comes from the host's own judgement of the turn;
    /// failed turns are never captured.
    pub fn capture(
        &self,
        agent_output: &str,
        ctx: &SessionContext,
        turn_successful: bool,
    ) -> Result<CaptureReport> {
        let settings = self.config.session_settings(ctx.session_type);
        if !settings.auto_capture {
            return Ok(CaptureReport::gated(CaptureGate::Disabled));
        }
        if !turn_successful {
            return Ok(CaptureReport::gated(CaptureGate::TurnFailed));
        }
        if self.filter.is_noise(agent_output) {
            return Ok(CaptureReport::gated(CaptureGate::NoiseBody));
        }

        let (candidates, mut report) = self.filter.candidates(agent_output);
        let capture_config = self.filter.config();

        for candidate in candidates {
            if report.captured.len() >= capture_config.max_captures {
                break;
            }

            let vector = match self.embed_unit(&candidate.text) {
                Ok(vector) => vector,
                Err(
                    e @ (EmbeddingError::ProviderUnavailable { .. }
                    | EmbeddingError::Timeout { .. }
                    | EmbeddingError::NoProvider),
                ) => {
                    // abort cleanly: no partial memory is persisted
                    tracing::warn!("capture aborted, embedding unavailable: {}", e);
                    break;
                }
                Err(e) => {
                    tracing::warn!("skipping capture candidate: {}", e);
                    continue;
                }
            };

            if let Some((_, similarity)) = self.store.nearest_similarity(&vector)? {
                if similarity >= capture_config.dedup_threshold {
                    report.skipped_duplicates += 1;
                    continue;
                }
            }

            let mut record =
                MemoryRecord::new(candidate.text, candidate.memory_type, settings.default_tier);
            record.source = Some("auto-capture".to_string());
            self.store.insert(&record, &vector)?;
            report.captured.push(record.id);
        }

        tracing::debug!(
            captured = report.captured.len(),
            considered = report.considered,
            duplicates = report.skipped_duplicates,
            "capture complete"
        );

        Ok(report)
    }

    // ========================================================================
    // RECALL
    // ========================================================================

    /// Select and format the budgeted injection set for a new turn.
    ///
    /// Embedding-provider failures yield an empty result, never an error;
    /// feedback rows are written off the critical path.
    pub fn recall(&self, prompt: &str, ctx: &SessionContext) -> Result<RecallResult> {
        let settings = self.config.session_settings(ctx.session_type);
        let resolved = self.config.resolved_recall();
        if !resolved.enabled || !settings.auto_inject {
            return Ok(RecallResult::empty());
        }
        if prompt.trim().is_empty() {
            return Ok(RecallResult::empty());
        }

        let query = extract_query(prompt);

        let query_vector = match self.embed_query(&query) {
            Ok(vector) => vector,
            Err(e) => {
                tracing::warn!("recall degraded to empty, embedding unavailable: {}", e);
                return Ok(RecallResult::empty());
            }
        };

        let pool = HybridSearcher::pool_size(resolved.max_items);
        let lexical = self.store.lexical_search(&query, pool)?;
        let vector_hits = self.store.vector_search(&query_vector, pool)?;

        let searcher = HybridSearcher::new();
        let candidates = searcher.merge(&lexical, &vector_hits, pool);

        let similarity: HashMap<String, f64> = candidates
            .iter()
            .map(|c| (c.id.clone(), c.combined as f64))
            .collect();
        let ids: Vec<String> = candidates.iter().map(|c| c.id.clone()).collect();
        let records = self.store.query_by_ids(&ids)?;

        let allocator = Allocator::new(Scorer::new(self.config.scoring));
        let allocation_config = AllocationConfig {
            max_items: resolved.max_items,
            min_score: resolved.min_score,
            budgets: resolved.budgets,
        };
        let now = Utc::now();
        let outcome = allocator.allocate(records, &similarity, &allocation_config, now);

        // Access stats only after allocation succeeded; each update is
        // independent and idempotent per date.
        for item in &outcome.selected {
            if let Err(e) = self.store.update_access(&item.memory.id, now) {
                tracing::warn!("access update failed for {}: {}", item.memory.id, e);
            }
        }

        let context = self.store.current_context(now)?;
        let prepended_context = if outcome.selected.is_empty() && context.is_none() {
            None
        } else {
            Some(render_envelope(context.as_ref(), &outcome.selected))
        };

        let injected: Vec<InjectedMemory> = outcome
            .selected
            .iter()
            .map(|item| InjectedMemory {
                id: item.memory.id.clone(),
                tier: item.memory.tier.as_str().to_string(),
                memory_type: item.memory.memory_type.as_str().to_string(),
                pinned: item.memory.pinned,
                score: item.score.total,
            })
            .collect();

        self.record_feedback_detached(&outcome.selected, outcome.considered, ctx, now);

        Ok(RecallResult {
            prepended_context,
            injected,
            considered: outcome.considered,
            excluded: outcome.excluded,
            query,
        })
    }

    /// Write one feedback row per injected memory on a detached thread so
    /// recall never blocks on them.
    fn record_feedback_detached(
        &self,
        selected: &[crate::allocation::AllocatedMemory],
        considered: usize,
        ctx: &SessionContext,
        now: chrono::DateTime<Utc>,
    ) {
        if selected.is_empty() {
            return;
        }

        let density = if considered > 0 {
            selected.len() as f64 / considered as f64
        } else {
            0.0
        };

        let rows: Vec<crate::memory::InjectionFeedback> = selected
            .iter()
            .map(|item| crate::memory::InjectionFeedback {
                memory_id: item.memory.id.clone(),
                session_key: ctx.session_key.clone(),
                injected_at: now,
                access_frequency: item.memory.use_count,
                injection_density: density,
                session_outcome: None,
                proxy_score: None,
                agent_score: None,
            })
            .collect();

        let store = Arc::clone(&self.store);
        std::thread::spawn(move || {
            for row in rows {
                if let Err(e) = store.record_feedback(&row) {
                    tracing::warn!("feedback write failed for {}: {}", row.memory_id, e);
                }
            }
        });
    }

    // ========================================================================
    // MAINTENANCE
    // ========================================================================

    /// Whether enough time has passed since the last decay sweep.
    pub fn decay_due(&self) -> Result<bool> {
        Ok(decay::should_run(
            &self.store,
            self.config.decay.interval_hours,
            Utc::now(),
        )?)
    }

    /// Run one decay sweep under the resolved profile.
    pub fn run_decay(&self, ctx: Option<&SessionContext>) -> Result<DecayReport> {
        let profile = self.resolve_decay_profile(ctx)?;
        Ok(decay::run(&self.store, &profile, Utc::now())?)
    }

    /// Run one promotion pass.
    pub fn run_promotion(&self) -> Result<PromotionReport> {
        Ok(promotion::run(
            &self.store,
            &self.config.promotion_rules(),
            Utc::now(),
        )?)
    }

    /// Resolve the decay profile with precedence: session-runtime override
    /// > persisted per-agent > persisted global > config default.
    fn resolve_decay_profile(&self, ctx: Option<&SessionContext>) -> Result<DecayProfile> {
        let session = ctx.and_then(|c| c.decay_profile.as_deref());
        let agent: Option<String> = match ctx.and_then(|c| c.agent_id.as_deref()) {
            Some(agent_id) => self.store.meta_get(&meta_profile_agent_key(agent_id))?,
            None => None,
        };
        let global = self.store.meta_get(META_PROFILE_GLOBAL)?;

        let chain = [
            session,
            agent.as_deref(),
            global.as_deref(),
            self.config.decay.profile.as_deref(),
            Some("config"),
        ];
        Ok(self.profiles.resolve(&chain).clone())
    }

    /// Persist the global decay-profile selection.
    pub fn set_decay_profile_global(&self, name: &str) -> Result<()> {
        if self.profiles.get(name).is_none() {
            return Err(EngineError::UnknownProfile(name.to_string()));
        }
        self.store.meta_set(META_PROFILE_GLOBAL, name)?;
        Ok(())
    }

    /// Persist a per-agent decay-profile selection.
    pub fn set_decay_profile_for_agent(&self, agent_id: &str, name: &str) -> Result<()> {
        if self.profiles.get(name).is_none() {
            return Err(EngineError::UnknownProfile(name.to_string()));
        }
        self.store.meta_set(&meta_profile_agent_key(agent_id), name)?;
        Ok(())
    }

    // ========================================================================
    // TOOL SURFACE
    // ========================================================================

    fn validate_id(id: &str) -> Result<()> {
        uuid::Uuid::parse_str(id)
            .map_err(|_| EngineError::InvalidMemoryId(id.to_string()))?;
        Ok(())
    }

    fn require(&self, id: &str) -> Result<MemoryRecord> {
        Self::validate_id(id)?;
        self.store
            .get(id)?
            .ok_or_else(|| EngineError::MemoryNotFound(id.to_string()))
    }

    /// Explicitly store a memory. Near-duplicates (cosine at or above the
    /// dedup threshold) are rejected with the existing id.
    pub fn store_memory(&self, input: StoreInput, ctx: &SessionContext) -> Result<MemoryRecord> {
        if input.text.trim().is_empty() {
            return Err(EngineError::EmptyMemoryText);
        }

        let vector = self.embed_unit(&input.text)?;
        if let Some((existing_id, similarity)) = self.store.nearest_similarity(&vector)? {
            if similarity >= self.filter.config().dedup_threshold {
                return Err(EngineError::SimilarMemoryExists {
                    existing_id,
                    similarity,
                });
            }
        }

        let settings = self.config.session_settings(ctx.session_type);
        let mut record = MemoryRecord::new(
            input.text,
            input.memory_type,
            input.tier.unwrap_or(settings.default_tier),
        );
        record.importance = input.importance.unwrap_or(0.5).clamp(0.0, 1.0);
        record.pinned = input.pinned;
        record.source = input.source;
        record.category = input.category;
        record.parent_id = input.parent_id;

        self.store.insert(&record, &vector)?;
        Ok(record)
    }

    /// Hybrid search without allocation. Forgotten memories are still
    /// returned here; only automatic injection excludes them.
    pub fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        if query.trim().is_empty() {
            return Err(EngineError::EmptyQuery);
        }

        let query_vector = self.embed_query(query)?;
        let pool = HybridSearcher::pool_size(limit);
        let lexical = self.store.lexical_search(query, pool)?;
        let vector_hits = self.store.vector_search(&query_vector, pool)?;

        let candidates = HybridSearcher::new().merge(&lexical, &vector_hits, limit);

        let mut hits = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if let Some(memory) = self.store.get(&candidate.id)? {
                hits.push(SearchHit {
                    memory,
                    combined: candidate.combined,
                    vector_score: candidate.vector_score,
                    text_score: candidate.text_score,
                });
            }
        }
        Ok(hits)
    }

    /// Soft-forget (exclude from injection) or, with `hard`, delete
    /// outright.
    pub fn forget(&self, id: &str, hard: bool) -> Result<()> {
        let record = self.require(id)?;
        if hard {
            self.store.delete(id)?;
            return Ok(());
        }
        if record.do_not_inject {
            return Err(EngineError::AlreadyForgotten(id.to_string()));
        }
        self.store
            .set_flag(id, MemoryFlag::DoNotInject, true, "forget")?;
        Ok(())
    }

    /// Undo a soft forget.
    pub fn restore(&self, id: &str) -> Result<()> {
        let record = self.require(id)?;
        if !record.do_not_inject {
            return Err(EngineError::NotForgotten(id.to_string()));
        }
        self.store
            .set_flag(id, MemoryFlag::DoNotInject, false, "restore")?;
        Ok(())
    }

    /// Pin: exempt from decay, priority allocation slot.
    pub fn pin(&self, id: &str) -> Result<()> {
        let record = self.require(id)?;
        if record.pinned {
            return Err(EngineError::AlreadyPinned(id.to_string()));
        }
        self.store.set_flag(id, MemoryFlag::Pinned, true, "pin")?;
        Ok(())
    }

    pub fn unpin(&self, id: &str) -> Result<()> {
        let record = self.require(id)?;
        if !record.pinned {
            return Err(EngineError::NotPinned(id.to_string()));
        }
        self.store.set_flag(id, MemoryFlag::Pinned, false, "unpin")?;
        Ok(())
    }

    /// Set the single-slot current context. `ttl_seconds` defaults from
    /// config.
    pub fn set_context(&self, text: &str, ttl_seconds: Option<i64>) -> Result<()> {
        if text.trim().is_empty() {
            return Err(EngineError::EmptyMemoryText);
        }
        let ttl =
            ttl_seconds.unwrap_or((self.config.context.ttl_hours * 3600.0) as i64);
        self.store.set_current_context(text, ttl, Utc::now())?;
        Ok(())
    }

    pub fn clear_context(&self) -> Result<()> {
        self.store.clear_current_context()?;
        Ok(())
    }

    pub fn current_context(&self) -> Result<Option<CurrentContext>> {
        Ok(self.store.current_context(Utc::now())?)
    }

    /// Break down one memory's composite score, optionally against a query.
    pub fn explain(&self, id: &str, query: Option<&str>) -> Result<Explanation> {
        let record = self.require(id)?;

        let similarity = match query {
            Some(q) if !q.trim().is_empty() => {
                let query_vector = self.embed_query(q)?;
                self.store
                    .get_vector(id)?
                    .map(|v| dot_product(&query_vector, &v) as f64)
            }
            _ => None,
        };

        let now = Utc::now();
        let scorer = Scorer::new(self.config.scoring);
        let archive_enabled = self.config.resolved_recall().budgets.archive_enabled();
        let score = scorer.score(&record, similarity.unwrap_or(0.0), now, archive_enabled);

        Ok(Explanation {
            memory_id: record.id.clone(),
            tier: record.tier.as_str().to_string(),
            memory_type: record.memory_type.as_str().to_string(),
            pinned: record.pinned,
            do_not_inject: record.do_not_inject,
            age_days: Scorer::age_days(&record, now),
            half_life_days: half_life_days(record.memory_type),
            use_count: record.use_count,
            distinct_use_days: record.distinct_use_days(),
            similarity,
            score,
            weights: self.config.scoring,
        })
    }

    /// Aggregate store statistics.
    pub fn stats(&self) -> Result<StoreStats> {
        Ok(self.store.stats()?)
    }

    /// Audit trail for one memory.
    pub fn audit(&self, id: &str) -> Result<Vec<AuditRow>> {
        Self::validate_id(id)?;
        Ok(self.store.audit_for(id)?)
    }

    /// Append to the tuning log.
    pub fn record_tuning(
        &self,
        parameter: &str,
        old_value: Option<&str>,
        new_value: Option<&str>,
        reason: Option<&str>,
        source: TuningSource,
    ) -> Result<()> {
        self.store
            .record_tuning(parameter, old_value, new_value, reason, source, None)?;
        Ok(())
    }

    /// Most recent tuning entries.
    pub fn tuning_log(&self, limit: usize) -> Result<Vec<TuningEntry>> {
        Ok(self.store.tuning_log(limit)?)
    }
}
