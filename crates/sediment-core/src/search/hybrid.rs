//! Hybrid Search (Lexical + Vector)
//!
//! Blends FTS5 lexical scores and dense-vector cosine scores into one
//! ranking. Lexical scores are normalized by the best score in the result
//! set; the two pools are union-merged by id with an absent score counting
//! as zero.

use std::collections::HashMap;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for hybrid search
#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    /// Weight for vector (cosine) scores
    pub vector_weight: f32,
    /// Weight for lexical (BM25) scores
    pub text_weight: f32,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            vector_weight: 0.7,
            text_weight: 0.3,
        }
    }
}

/// A blended candidate with its component scores retained.
#[derive(Debug, Clone)]
pub struct HybridCandidate {
    pub id: String,
    pub combined: f32,
    pub vector_score: f32,
    pub text_score: f32,
}

// ============================================================================
// HYBRID SEARCHER
// ============================================================================

/// Merges lexical and vector result pools into a blended ranking.
pub struct HybridSearcher {
    config: HybridSearchConfig,
}

impl Default for HybridSearcher {
    fn default() -> Self {
        Self::new()
    }
}

impl HybridSearcher {
    pub fn new() -> Self {
        Self {
            config: HybridSearchConfig::default(),
        }
    }

    pub fn with_config(config: HybridSearchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HybridSearchConfig {
        &self.config
    }

    /// Candidate pool size fetched from each source: `3 * max_items`, with
    /// a floor of 30.
    pub fn pool_size(max_items: usize) -> usize {
        (3 * max_items).max(30)
    }

    /// Merge the two pools and return the top `limit` candidates.
    ///
    /// `lexical` carries already-negated raw scores (higher is better);
    /// they are normalized here by the maximum in the set. `vector` carries
    /// cosine similarities in [0, 1].
    pub fn merge(
        &self,
        lexical: &[(String, f32)],
        vector: &[(String, f32)],
        limit: usize,
    ) -> Vec<HybridCandidate> {
        let max_lexical = lexical
            .iter()
            .map(|(_, s)| *s)
            .fold(0.0_f32, f32::max);

        let mut merged: HashMap<String, (f32, f32)> = HashMap::new();

        for (id, score) in lexical {
            let normalized = if max_lexical > 0.0 {
                (score / max_lexical).clamp(0.0, 1.0)
            } else {
                0.0
            };
            merged.entry(id.clone()).or_insert((0.0, 0.0)).1 = normalized;
        }

        for (id, cos) in vector {
            merged.entry(id.clone()).or_insert((0.0, 0.0)).0 = *cos;
        }

        let mut candidates: Vec<HybridCandidate> = merged
            .into_iter()
            .map(|(id, (vector_score, text_score))| HybridCandidate {
                combined: self.config.vector_weight * vector_score
                    + self.config.text_weight * text_score,
                id,
                vector_score,
                text_score,
            })
            .collect();

        candidates.sort_by(|a, b| {
            b.combined
                .partial_cmp(&a.combined)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        candidates.truncate(limit);
        candidates
    }
}

// ============================================================================
// TESTS
// ============================================================================
