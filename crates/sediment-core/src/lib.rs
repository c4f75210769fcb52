//! # Sediment Core
//!
//! A local, embeddable tiered memory store for conversational agents.
//! Memories live under a lifecycle of promotions and demotions keyed to
//! recency and usage; on each agent turn a budgeted, ranked slice of the
//! store is selected for context injection. Nothing leaves the host.
//!
//! - **Tiered lifecycle**: HOT -> WARM -> COLD -> ARCHIVE demotion with
//!   per-type TTLs; re-used COLD memories promote back to WARM
//! - **Hybrid retrieval**: FTS5 lexical scoring blended with dense-vector
//!   cosine similarity
//! - **Composite scoring**: similarity, recency, and frequency with
//!   type-dependent half-lives
//! - **Budgeted allocation**: per-tier fractions of the injection slots,
//!   with pinned memories in their own bucket
//! - **Auto-capture**: salience-filtered persistence of agent outputs with
//!   duplicate suppression
//! - **Auto-recall**: query extraction, search, allocation, and an XML
//!   injection envelope, with feedback recorded off the critical path
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sediment_core::{MemoryEngine, MemoryConfig, SessionContext};
//!
//! let engine = MemoryEngine::open(None, Some(provider), MemoryConfig::default())?;
//!
//! // before a turn
//! let recall = engine.recall("how do I configure the deploy?", &SessionContext::default())?;
//! if let Some(context) = recall.prepended_context {
//!     // prepend to the agent's context
//! }
//!
//! // after a turn
//! engine.capture(&agent_output, &SessionContext::default(), true)?;
//!
//! // on the host's schedule
//! if engine.decay_due()? {
//!     engine.run_decay(None)?;
//!     engine.run_promotion()?;
//! }
//! ```
//!
//! The embedding model is an external collaborator: implement
//! [`EmbeddingProvider`] over whatever local or remote model the host uses.

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod allocation;
pub mod capture;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod lifecycle;
pub mod memory;
pub mod recall;
pub mod scoring;
pub mod search;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Data model
pub use memory::{
    AuditAction, AuditRow, CurrentContext, InjectionFeedback, MemoryRecord, MemoryType,
    StoreInput, Tier, TuningEntry, TuningSource,
};

// Storage layer
pub use storage::{MemoryFlag, Store, StoreStats, StorageError};

// Embedding seam
pub use embeddings::{cosine_similarity, Embedding, EmbeddingError, EmbeddingProvider};

// Search
pub use search::{
    HybridCandidate, HybridSearchConfig, HybridSearcher, ScanIndex, VectorBackend,
    VectorSearchError,
};

#[cfg(feature = "hnsw")]
pub use search::HnswIndex;

// Scoring and allocation
pub use allocation::{
    AllocatedMemory, AllocationConfig, AllocationOutcome, Allocator, Bucket, BucketCounts,
    InjectionBudgets,
};
pub use scoring::{half_life_days, ScoreBreakdown, Scorer, ScoringWeights};

// Lifecycle engines
pub use lifecycle::{
    builtin_thorough, DecayProfile, DecayReport, ProfileRegistry, PromotionReport,
    PromotionRules, Ttl, TtlOverrides,
};

// Capture and recall pipelines
pub use capture::{CaptureConfig, CaptureFilter, CaptureGate, CaptureReport};
pub use recall::{extract_query, render_envelope, xml_escape, InjectedMemory, RecallResult};

// Configuration
pub use config::{
    AutoRecallSetting, MemoryConfig, ResolvedRecall, SessionContext, SessionSettings,
    SessionType,
};

// Engine facade
pub use engine::{EngineError, Explanation, MemoryEngine, SearchHit};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        CaptureReport, DecayReport, EmbeddingProvider, EngineError, MemoryConfig, MemoryEngine,
        MemoryRecord, MemoryType, PromotionReport, RecallResult, SessionContext, SessionType,
        Store, StoreInput, StorageError, Tier,
    };
}
