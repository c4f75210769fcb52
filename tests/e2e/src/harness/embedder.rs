//! Deterministic embedding providers for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use sediment_core::{EmbeddingError, EmbeddingProvider};

/// Dimensionality used across the suite. Wide enough that unrelated texts
/// land far apart under token hashing.
pub const EMBED_DIM: usize = 64;

/// Bag-of-words hashing embedder: identical texts embed identically, texts
/// sharing most tokens land close in cosine space. Deterministic and
/// dependency-free.
pub struct HashEmbedder {
    dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(EMBED_DIM)
    }
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    fn fnv1a(token: &str) -> u64 {
        let mut hash: u64 = 0xcbf29ce484222325;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x100000001b3);
        }
        hash
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "test-hash"
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty text".to_string()));
        }

        let mut vector = vec![0.0f32; self.dimensions];
        for token in text.to_lowercase().split(|c: char| !c.is_alphanumeric()) {
            if token.is_empty() {
                continue;
            }
            let slot = (Self::fnv1a(token) % self.dimensions as u64) as usize;
            vector[slot] += 1.0;
        }
        Ok(vector)
    }
}

/// Embedder with programmable per-text vectors, falling back to hashing.
/// Lets tests pin exact cosine relationships (e.g. the 0.97 dedup case).
pub struct FixedEmbedder {
    fallback: HashEmbedder,
    vectors: Mutex<HashMap<String, Vec<f32>>>,
}

impl Default for FixedEmbedder {
    fn default() -> Self {
        Self::new(EMBED_DIM)
    }
}

impl FixedEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            fallback: HashEmbedder::new(dimensions),
            vectors: Mutex::new(HashMap::new()),
        }
    }

    /// Pin the vector returned for one exact text.
    pub fn set(&self, text: &str, vector: Vec<f32>) {
        self.vectors
            .lock()
            .expect("test embedder lock")
            .insert(text.to_string(), vector);
    }
}

impl EmbeddingProvider for FixedEmbedder {
    fn name(&self) -> &str {
        "test-fixed"
    }

    fn dimensions(&self) -> usize {
        self.fallback.dimensions()
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(vector) = self.vectors.lock().expect("test embedder lock").get(text) {
            return Ok(vector.clone());
        }
        self.fallback.embed(text)
    }
}

/// Provider that always fails, for degraded-path tests.
pub struct UnavailableEmbedder;

impl EmbeddingProvider for UnavailableEmbedder {
    fn name(&self) -> &str {
        "test-unavailable"
    }

    fn dimensions(&self) -> usize {
        EMBED_DIM
    }

    fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Err(EmbeddingError::ProviderUnavailable {
            provider: "test-unavailable".to_string(),
            detail: "always down".to_string(),
        })
    }
}
