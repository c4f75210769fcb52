//! Vector Search Backends
//!
//! Two interchangeable backends behind one contract:
//! - `ScanIndex`: in-process cosine scan over all vectors. Always available.
//! - `HnswIndex` (feature `hnsw`): USearch HNSW index for large stores.
//!
//! Vectors are unit-normalized before indexing, so the scan backend can use
//! a plain dot product.

use std::collections::HashMap;

use crate::embeddings::dot_product;

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Vector search error types
#[derive(Debug, Clone)]
pub enum VectorSearchError {
    /// Failed to create the index
    IndexCreation(String),
    /// Failed to add a vector
    IndexAdd(String),
    /// Failed to search
    IndexSearch(String),
    /// Dimension mismatch (expected, got)
    InvalidDimensions(usize, usize),
}

impl std::fmt::Display for VectorSearchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VectorSearchError::IndexCreation(e) => write!(f, "Index creation failed: {}", e),
            VectorSearchError::IndexAdd(e) => write!(f, "Failed to add vector: {}", e),
            VectorSearchError::IndexSearch(e) => write!(f, "Search failed: {}", e),
            VectorSearchError::InvalidDimensions(expected, got) => {
                write!(f, "Invalid dimensions: expected {}, got {}", expected, got)
            }
        }
    }
}

impl std::error::Error for VectorSearchError {}

// ============================================================================
// BACKEND CONTRACT
// ============================================================================

/// The contract both backends expose. The store keeps one behind a mutex
/// and mirrors every vector write into it.
pub trait VectorBackend: Send {
    /// Insert or replace the vector for `key`.
    fn add(&mut self, key: &str, vector: &[f32]) -> Result<(), VectorSearchError>;

    /// Remove the vector for `key`. Unknown keys are a no-op.
    fn remove(&mut self, key: &str) -> Result<(), VectorSearchError>;

    /// Top-k nearest neighbours by cosine similarity, best first.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, VectorSearchError>;

    /// Number of vectors held.
    fn len(&self) -> usize;

    /// Dimensionality enforced on every add and search.
    fn dimensions(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// SCAN BACKEND (always available)
// ============================================================================

/// Brute-force cosine scan over all stored vectors. The fallback backend
/// when no native index is compiled in; exact, and fast enough for the
/// store sizes a single agent accumulates.
pub struct ScanIndex {
    dimensions: usize,
    vectors: HashMap<String, Vec<f32>>,
}

impl ScanIndex {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            vectors: HashMap::new(),
        }
    }
}

impl VectorBackend for ScanIndex {
    fn add(&mut self, key: &str, vector: &[f32]) -> Result<(), VectorSearchError> {
        if vector.len() != self.dimensions {
            return Err(VectorSearchError::InvalidDimensions(
                self.dimensions,
                vector.len(),
            ));
        }
        self.vectors.insert(key.to_string(), vector.to_vec());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), VectorSearchError> {
        self.vectors.remove(key);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, VectorSearchError> {
        if query.len() != self.dimensions {
            return Err(VectorSearchError::InvalidDimensions(
                self.dimensions,
                query.len(),
            ));
        }

        let mut scored: Vec<(String, f32)> = self
            .vectors
            .iter()
            .map(|(key, v)| (key.clone(), dot_product(query, v)))
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ============================================================================
// HNSW BACKEND (feature "hnsw")
// ============================================================================

/// USearch-backed HNSW index. String keys are mapped to u64 slots because
/// USearch keys are numeric.
#[cfg(feature = "hnsw")]
pub struct HnswIndex {
    index: usearch::Index,
    dimensions: usize,
    key_to_id: HashMap<String, u64>,
    id_to_key: HashMap<u64, String>,
    next_id: u64,
}

#[cfg(feature = "hnsw")]
impl HnswIndex {
    /// HNSW connectivity parameter (higher = better recall, more memory)
    pub const CONNECTIVITY: usize = 16;
    /// Expansion factor for index building
    pub const EXPANSION_ADD: usize = 128;
    /// Expansion factor for search
    pub const EXPANSION_SEARCH: usize = 64;

    pub fn new(dimensions: usize) -> Result<Self, VectorSearchError> {
        let options = usearch::IndexOptions {
            dimensions,
            metric: usearch::MetricKind::Cos,
            quantization: usearch::ScalarKind::F32,
            connectivity: Self::CONNECTIVITY,
            expansion_add: Self::EXPANSION_ADD,
            expansion_search: Self::EXPANSION_SEARCH,
            multi: false,
        };

        let index = usearch::Index::new(&options)
            .map_err(|e| VectorSearchError::IndexCreation(e.to_string()))?;

        Ok(Self {
            index,
            dimensions,
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            next_id: 0,
        })
    }
}

#[cfg(feature = "hnsw")]
impl VectorBackend for HnswIndex {
    fn add(&mut self, key: &str, vector: &[f32]) -> Result<(), VectorSearchError> {
        if vector.len() != self.dimensions {
            return Err(VectorSearchError::InvalidDimensions(
                self.dimensions,
                vector.len(),
            ));
        }

        if let Some(&existing) = self.key_to_id.get(key) {
            self.index
                .remove(existing)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            self.index
                .reserve(self.index.size() + 1)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
            return self
                .index
                .add(existing, vector)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()));
        }

        let id = self.next_id;
        self.index
            .reserve(self.index.size() + 1)
            .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
        self.index
            .add(id, vector)
            .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
        self.key_to_id.insert(key.to_string(), id);
        self.id_to_key.insert(id, key.to_string());
        self.next_id += 1;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), VectorSearchError> {
        if let Some(id) = self.key_to_id.remove(key) {
            self.id_to_key.remove(&id);
            self.index
                .remove(id)
                .map_err(|e| VectorSearchError::IndexAdd(e.to_string()))?;
        }
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(String, f32)>, VectorSearchError> {
        if query.len() != self.dimensions {
            return Err(VectorSearchError::InvalidDimensions(
                self.dimensions,
                query.len(),
            ));
        }

        let matches = self
            .index
            .search(query, k)
            .map_err(|e| VectorSearchError::IndexSearch(e.to_string()))?;

        let mut results = Vec::with_capacity(matches.keys.len());
        for (id, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            if let Some(key) = self.id_to_key.get(id) {
                // usearch reports cosine distance; convert to similarity
                results.push((key.clone(), 1.0 - distance));
            }
        }
        Ok(results)
    }

    fn len(&self) -> usize {
        self.index.size()
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

// ============================================================================
// TESTS
// ============================================================================
