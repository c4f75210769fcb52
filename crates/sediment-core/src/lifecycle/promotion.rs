//! Promotion Engine
//!
//! Promotes COLD memories that show re-use back to WARM. Promotion never
//! targets HOT; that tier is reserved for explicit placement. Pinned
//! memories are skipped (already privileged).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::Tier;
use crate::storage::{Result, Store};

/// Re-use thresholds for COLD -> WARM promotion. Both must hold.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PromotionRules {
    /// Minimum lifetime use count
    pub promotion_uses: i64,
    /// Minimum number of distinct calendar dates with reads
    pub promotion_days: usize,
}

impl Default for PromotionRules {
    fn default() -> Self {
        Self {
            promotion_uses: 5,
            promotion_days: 3,
        }
    }
}

/// Summary of one promotion pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromotionReport {
    pub promoted: usize,
    pub considered: usize,
    pub ran_at: DateTime<Utc>,
}

/// Run one promotion pass.
pub fn run(store: &Store, rules: &PromotionRules, now: DateTime<Utc>) -> Result<PromotionReport> {
    let candidates = store.promotion_candidates(rules.promotion_uses)?;
    let considered = candidates.len();
    let mut promoted = 0;

    for record in candidates {
        if record.distinct_use_days() < rules.promotion_days {
            continue;
        }
        store.set_tier(&record.id, Tier::Warm, "promotion")?;
        promoted += 1;
    }

    tracing::info!(promoted, considered, "promotion pass complete");

    Ok(PromotionReport {
        promoted,
        considered,
        ran_at: now,
    })
}
