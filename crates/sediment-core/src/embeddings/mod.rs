//! Embedding Provider Seam
//!
//! The embedding model is an external collaborator: the engine only sees
//! `embed(text) -> vector`, `dimensions`, and `name`. Hosts plug in a local
//! model or a cloud client; nothing in this crate performs inference.
//!
//! Also provides the vector math shared by the store and the searcher.

mod vector_math;

pub use vector_math::{cosine_similarity, dot_product, normalize, Embedding};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// The configured provider could not be reached or failed to respond.
    /// Capture and recall treat this as an empty result, never as data
    /// corruption.
    #[error("embedding provider '{provider}' unavailable: {detail}. Check the provider configuration and credentials for '{provider}'")]
    ProviderUnavailable { provider: String, detail: String },
    /// No provider was configured. Fatal at open.
    #[error("no embedding provider configured")]
    NoProvider,
    /// The provider did not answer within the host-supplied timeout
    #[error("embedding provider '{provider}' timed out after {elapsed_ms}ms")]
    Timeout { provider: String, elapsed_ms: u64 },
    /// Invalid input (empty, wrong dimension, etc.)
    #[error("invalid embedding input: {0}")]
    InvalidInput(String),
}

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// Pluggable embedding model.
///
/// Implementations must be cheap to share (`Send + Sync`); the engine holds
/// one behind an `Arc` and calls it from capture and recall. A provider that
/// applies a host-supplied timeout should surface `EmbeddingError::Timeout`.
pub trait EmbeddingProvider: Send + Sync {
    /// Human-readable provider name, used in error guidance
    fn name(&self) -> &str;

    /// Output dimensionality. Must stay constant for the life of a store.
    fn dimensions(&self) -> usize;

    /// Embed one text. Returned vectors need not be unit-normalized; the
    /// engine normalizes before indexing.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
