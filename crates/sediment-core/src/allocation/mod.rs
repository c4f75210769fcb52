//! Tier-Budgeted Allocator
//!
//! Turns a scored candidate pool into the final injection set. Each bucket
//! (pinned, then per tier) receives `floor(max_items * budget)` slots; the
//! combined selection is re-sorted and truncated to `max_items` to absorb
//! rounding slack.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{MemoryRecord, Tier};
use crate::scoring::{ScoreBreakdown, Scorer};

// ============================================================================
// BUDGETS
// ============================================================================

/// Fractions of the injection slot count per bucket. Should sum to <= 1.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InjectionBudgets {
    pub pinned: f64,
    pub hot: f64,
    pub warm: f64,
    pub cold: f64,
    /// ARCHIVE memories are only considered when this is positive.
    pub archive: f64,
}

impl Default for InjectionBudgets {
    fn default() -> Self {
        Self {
            pinned: 0.25,
            hot: 0.45,
            warm: 0.25,
            cold: 0.05,
            archive: 0.0,
        }
    }
}

impl InjectionBudgets {
    pub fn archive_enabled(&self) -> bool {
        self.archive > 0.0
    }
}

/// Allocator knobs.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllocationConfig {
    pub max_items: usize,
    /// Inclusive pre-filter: candidates scoring below this are dropped
    /// before bucket assignment.
    pub min_score: Option<f64>,
    pub budgets: InjectionBudgets,
}

// ============================================================================
// OUTCOME TYPES
// ============================================================================

/// Which bucket a selected memory was drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    Pinned,
    Hot,
    Warm,
    Cold,
    Archive,
}

impl Bucket {
    fn for_record(record: &MemoryRecord) -> Bucket {
        if record.pinned {
            return Bucket::Pinned;
        }
        match record.tier {
            Tier::Hot => Bucket::Hot,
            Tier::Warm => Bucket::Warm,
            Tier::Cold => Bucket::Cold,
            Tier::Archive => Bucket::Archive,
        }
    }
}

/// A selected memory with its score and bucket.
#[derive(Debug, Clone)]
pub struct AllocatedMemory {
    pub memory: MemoryRecord,
    pub score: ScoreBreakdown,
    pub bucket: Bucket,
}

/// Per-bucket selection counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketCounts {
    pub pinned: usize,
    pub hot: usize,
    pub warm: usize,
    pub cold: usize,
    pub archive: usize,
}

impl BucketCounts {
    fn bump(&mut self, bucket: Bucket) {
        match bucket {
            Bucket::Pinned => self.pinned += 1,
            Bucket::Hot => self.hot += 1,
            Bucket::Warm => self.warm += 1,
            Bucket::Cold => self.cold += 1,
            Bucket::Archive => self.archive += 1,
        }
    }
}

/// Result of one allocation pass.
#[derive(Debug)]
pub struct AllocationOutcome {
    /// Final injection set, best first.
    pub selected: Vec<AllocatedMemory>,
    pub breakdown: BucketCounts,
    /// Candidates inspected (before any filter).
    pub considered: usize,
    /// Candidates dropped by the do-not-inject, archive, or min-score
    /// filters.
    pub excluded: usize,
}

// ============================================================================
// ALLOCATOR
// ============================================================================

/// Stateless tier-budgeted selector.
pub struct Allocator {
    scorer: Scorer,
}

impl Allocator {
    pub fn new(scorer: Scorer) -> Self {
        Self { scorer }
    }

    /// Select the injection set from `candidates`.
    ///
    /// `similarity` maps memory id to the query similarity used for the
    /// scorer's similarity component; absent ids score zero similarity.
    pub fn allocate(
        &self,
        candidates: Vec<MemoryRecord>,
        similarity: &HashMap<String, f64>,
        config: &AllocationConfig,
        now: DateTime<Utc>,
    ) -> AllocationOutcome {
        let considered = candidates.len();
        let archive_enabled = config.budgets.archive_enabled();
        let mut excluded = 0usize;

        // Filter, then score survivors.
        let mut scored: Vec<AllocatedMemory> = Vec::with_capacity(candidates.len());
        for record in candidates {
            if record.do_not_inject {
                excluded += 1;
                continue;
            }
            if record.tier == Tier::Archive && !archive_enabled {
                excluded += 1;
                continue;
            }

            let sim = similarity.get(&record.id).copied().unwrap_or(0.0);
            let score = self.scorer.score(&record, sim, now, archive_enabled);

            if let Some(min) = config.min_score {
                if score.total < min {
                    excluded += 1;
                    continue;
                }
            }

            scored.push(AllocatedMemory {
                bucket: Bucket::for_record(&record),
                memory: record,
                score,
            });
        }

        // Partition into buckets and take floor(max_items * budget) each.
        let mut buckets: HashMap<Bucket, Vec<AllocatedMemory>> = HashMap::new();
        for item in scored {
            buckets.entry(item.bucket).or_default().push(item);
        }

        let caps = [
            (Bucket::Pinned, config.budgets.pinned),
            (Bucket::Hot, config.budgets.hot),
            (Bucket::Warm, config.budgets.warm),
            (Bucket::Cold, config.budgets.cold),
            (Bucket::Archive, config.budgets.archive),
        ];

        let mut combined: Vec<AllocatedMemory> = Vec::new();
        for (bucket, budget) in caps {
            let Some(mut members) = buckets.remove(&bucket) else {
                continue;
            };
            let cap = (config.max_items as f64 * budget).floor() as usize;
            sort_by_rank(&mut members);
            members.truncate(cap);
            combined.extend(members);
        }

        // Re-sort across buckets and absorb rounding slack.
        sort_by_rank(&mut combined);
        combined.truncate(config.max_items);

        let mut breakdown = BucketCounts::default();
        for item in &combined {
            breakdown.bump(item.bucket);
        }

        AllocationOutcome {
            selected: combined,
            breakdown,
            considered,
            excluded,
        }
    }
}

/// Descending score; ties broken by most recent access, then id.
fn sort_by_rank(items: &mut [AllocatedMemory]) {
    items.sort_by(|a, b| {
        b.score
            .total
            .partial_cmp(&a.score.total)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.memory.last_accessed_at.cmp(&a.memory.last_accessed_at))
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
}

// ============================================================================
// TESTS
// ============================================================================
