//! Search Module
//!
//! Retrieval machinery over the store:
//! - Keyword search sanitizing for FTS5 MATCH
//! - Vector backends (in-process cosine scan; optional HNSW)
//! - Hybrid blending of lexical and vector scores

mod hybrid;
mod keyword;
mod vector;

pub use keyword::{quote_as_phrase, sanitize_fts5_query};

pub use vector::{ScanIndex, VectorBackend, VectorSearchError};

#[cfg(feature = "hnsw")]
pub use vector::HnswIndex;

pub use hybrid::{HybridCandidate, HybridSearchConfig, HybridSearcher};
