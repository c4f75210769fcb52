//! Decay Engine
//!
//! Demotes memories whose freshness window has expired:
//! HOT -> WARM -> COLD -> ARCHIVE, with per-type TTL overrides. Pinned
//! memories are never touched. A sweep cascades: a memory demoted in this
//! run is re-inspected at its new tier within the same run.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::{MemoryType, Tier};
use crate::storage::{Result, Store, META_LAST_DECAY_RUN};

// ============================================================================
// TTLS AND PROFILES
// ============================================================================

/// A demotion TTL: either a window in hours, or never.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Ttl {
    /// This (type, tier) edge never demotes.
    Never,
    /// Demote once `now - last_accessed_at` exceeds this many hours.
    Hours(f64),
}

impl Ttl {
    pub fn exceeded(&self, last_accessed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            Ttl::Never => false,
            Ttl::Hours(h) => {
                now - last_accessed_at > Duration::milliseconds((h * 3_600_000.0) as i64)
            }
        }
    }
}

/// Per-type TTL overrides. `None` inherits the profile default for that
/// edge; `Some(Ttl::Never)` disables it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TtlOverrides {
    pub hot: Option<Ttl>,
    pub warm: Option<Ttl>,
    pub cold: Option<Ttl>,
}

/// A named bundle of decay TTLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayProfile {
    pub name: String,
    /// Default HOT -> WARM window
    pub hot: Ttl,
    /// Default WARM -> COLD window
    pub warm: Ttl,
    /// Default COLD -> ARCHIVE window
    pub cold: Ttl,
    pub overrides: HashMap<MemoryType, TtlOverrides>,
}

impl DecayProfile {
    /// The effective TTL for demoting `memory_type` out of `from_tier`.
    /// Overrides shadow defaults; missing entries fall back.
    pub fn ttl_for(&self, memory_type: MemoryType, from_tier: Tier) -> Ttl {
        let overrides = self.overrides.get(&memory_type).copied().unwrap_or_default();
        match from_tier {
            Tier::Hot => overrides.hot.unwrap_or(self.hot),
            Tier::Warm => overrides.warm.unwrap_or(self.warm),
            Tier::Cold => overrides.cold.unwrap_or(self.cold),
            // nothing demotes out of ARCHIVE
            Tier::Archive => Ttl::Never,
        }
    }
}

// ============================================================================
// REPORT
// ============================================================================

/// Summary of one decay sweep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayReport {
    pub hot_demoted: usize,
    pub warm_demoted: usize,
    pub cold_archived: usize,
    /// Memories inspected across all stages; cascading memories count once
    /// per stage they were inspected in.
    pub processed: usize,
    pub ran_at: DateTime<Utc>,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Whether enough time has passed since the last sweep. Hosts call this
/// before `run`; there is no in-process timer.
pub fn should_run(store: &Store, interval_hours: f64, now: DateTime<Utc>) -> Result<bool> {
    let last = store
        .meta_get(META_LAST_DECAY_RUN)?
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc));

    Ok(match last {
        None => true,
        Some(last) => {
            now - last >= Duration::milliseconds((interval_hours * 3_600_000.0) as i64)
        }
    })
}

/// Run one decay sweep.
///
/// Stages run in tier order, each over a fresh listing, so a memory whose
/// TTLs are all exceeded cascades HOT -> WARM -> COLD within one run. Each
/// demotion commits with its audit row; the sweep as a whole is not one
/// transaction and partial progress is resumable.
pub fn run(store: &Store, profile: &DecayProfile, now: DateTime<Utc>) -> Result<DecayReport> {
    let mut report = DecayReport {
        hot_demoted: 0,
        warm_demoted: 0,
        cold_archived: 0,
        processed: 0,
        ran_at: now,
    };

    let stages = [Tier::Hot, Tier::Warm, Tier::Cold];
    for from_tier in stages {
        let Some(target) = from_tier.demoted() else {
            continue;
        };

        for record in store.members_of_tier(from_tier)? {
            report.processed += 1;

            let ttl = profile.ttl_for(record.memory_type, from_tier);
            if !ttl.exceeded(record.last_accessed_at, now) {
                continue;
            }

            store.set_tier(&record.id, target, "decay")?;
            match from_tier {
                Tier::Hot => report.hot_demoted += 1,
                Tier::Warm => report.warm_demoted += 1,
                Tier::Cold => report.cold_archived += 1,
                Tier::Archive => {}
            }
        }
    }

    store.meta_set(META_LAST_DECAY_RUN, &now.to_rfc3339())?;

    tracing::info!(
        profile = %profile.name,
        hot_demoted = report.hot_demoted,
        warm_demoted = report.warm_demoted,
        cold_archived = report.cold_archived,
        processed = report.processed,
        "decay sweep complete"
    );

    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================
