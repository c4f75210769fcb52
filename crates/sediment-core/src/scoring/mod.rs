//! Composite Scorer
//!
//! Blends similarity, recency, and frequency into one scalar. Recency
//! decays exponentially with a type-dependent half-life; pinned memories
//! never lose recency; COLD placement halves it; ARCHIVE memories score
//! zero unless the allocator has enabled archive scoring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{MemoryRecord, MemoryType, Tier};

// ============================================================================
// WEIGHTS AND HALF-LIVES
// ============================================================================

/// Component weights. Defaults sum to 1; reconfigured weights need not.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringWeights {
    pub similarity: f64,
    pub recency: f64,
    pub frequency: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            similarity: 0.5,
            recency: 0.3,
            frequency: 0.2,
        }
    }
}

/// Recency half-life in days, by memory type.
pub fn half_life_days(memory_type: MemoryType) -> f64 {
    match memory_type {
        MemoryType::Procedural => 180.0,
        MemoryType::Factual => 90.0,
        MemoryType::Project => 45.0,
        MemoryType::Episodic => 10.0,
    }
}

/// Frequency saturates at this use count.
const FREQUENCY_SATURATION: f64 = 100.0;

// ============================================================================
// SCORE BREAKDOWN
// ============================================================================

/// Weighted component values plus their sum. Exposed through `explain`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    pub similarity: f64,
    pub recency: f64,
    pub frequency: f64,
    pub total: f64,
}

impl ScoreBreakdown {
    pub const ZERO: ScoreBreakdown = ScoreBreakdown {
        similarity: 0.0,
        recency: 0.0,
        frequency: 0.0,
        total: 0.0,
    };
}

// ============================================================================
// SCORER
// ============================================================================

/// Stateless composite scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scorer {
    weights: ScoringWeights,
}

impl Scorer {
    pub fn new(weights: ScoringWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> ScoringWeights {
        self.weights
    }

    /// Age in days since the memory was created or last read, whichever is
    /// more recent. Clock skew never produces a negative age.
    pub fn age_days(record: &MemoryRecord, now: DateTime<Utc>) -> f64 {
        let reference = record.created_at.max(record.last_accessed_at);
        ((now - reference).num_milliseconds() as f64 / 86_400_000.0).max(0.0)
    }

    /// Recency base before weighting: `exp(-age / half_life)`, overridden
    /// to 1 for pinned memories, then halved for COLD placement.
    pub fn recency_base(record: &MemoryRecord, now: DateTime<Utc>) -> f64 {
        let mut r = if record.pinned {
            1.0
        } else {
            (-Self::age_days(record, now) / half_life_days(record.memory_type)).exp()
        };
        if record.tier == Tier::Cold {
            r *= 0.5;
        }
        r
    }

    /// Frequency base before weighting: `log(1 + use_count) / log(101)`,
    /// clamped to [0, 1].
    pub fn frequency_base(use_count: i64) -> f64 {
        let n = use_count.max(0) as f64;
        ((1.0 + n).ln() / (1.0 + FREQUENCY_SATURATION).ln()).clamp(0.0, 1.0)
    }

    /// Composite score for one memory given its similarity to the query.
    ///
    /// `archive_enabled` is set by the allocator when the archive budget is
    /// positive; otherwise ARCHIVE memories score zero regardless of the
    /// other inputs.
    pub fn score(
        &self,
        record: &MemoryRecord,
        similarity: f64,
        now: DateTime<Utc>,
        archive_enabled: bool,
    ) -> ScoreBreakdown {
        if record.tier == Tier::Archive && !archive_enabled {
            return ScoreBreakdown::ZERO;
        }

        let similarity_component = self.weights.similarity * similarity.clamp(0.0, 1.0);
        let recency_component = self.weights.recency * Self::recency_base(record, now);
        let frequency_component = self.weights.frequency * Self::frequency_base(record.use_count);

        ScoreBreakdown {
            similarity: similarity_component,
            recency: recency_component,
            frequency: frequency_component,
            total: similarity_component + recency_component + frequency_component,
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
