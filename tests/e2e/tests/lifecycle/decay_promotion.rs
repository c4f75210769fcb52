//! Decay and promotion journeys: TTL overrides, null edges, the cascade
//! ordering guarantee, pinned immunity, and COLD -> WARM promotion.

use chrono::{Duration, Utc};
use sediment_core::{
    AuditAction, MemoryConfig, MemoryRecord, MemoryType, Tier,
};
use sediment_e2e_tests::harness::TestEngine;

/// decay config with per-type overrides: episodic fast, procedural frozen
fn override_config() -> MemoryConfig {
    serde_json::from_str(
        r#"{
            "decay": {
                "default": {"hotTTL": 72},
                "overrides": {
                    "episodic": {"hotTTL": 24, "warmTTL": 10},
                    "procedural": {"hotTTL": null, "warmTTL": null}
                }
            }
        }"#,
    )
    .expect("parse config")
}

#[test]
fn decay_sweep_with_type_overrides() {
    let harness = TestEngine::with_config(override_config());

    let episodic = harness.seed_aged("stand-up notes from the session", MemoryType::Episodic, Tier::Hot, 30);
    let factual = harness.seed_aged("the API rate limit equals one hundred", MemoryType::Factual, Tier::Hot, 50);
    let procedural = harness.seed_aged("first build, then run the installer", MemoryType::Procedural, Tier::Hot, 1000);

    let report = harness.engine.run_decay(None).expect("decay");

    // episodic exceeded its 24h override; with the 10h warm TTL also long
    // exceeded, the sweep cascades it through WARM into COLD
    assert_eq!(report.hot_demoted, 1);
    assert_eq!(report.warm_demoted, 1);
    assert_eq!(report.cold_archived, 0);

    let store = harness.engine.store();
    assert_eq!(store.get(&episodic.id).unwrap().unwrap().tier, Tier::Cold);
    // factual is inside the default 72h window
    assert_eq!(store.get(&factual.id).unwrap().unwrap().tier, Tier::Hot);
    // a null TTL means procedural never leaves HOT, no matter its age
    assert_eq!(store.get(&procedural.id).unwrap().unwrap().tier, Tier::Hot);

    // one audit row per hop, none for untouched memories
    let hops = harness.engine.audit(&episodic.id).unwrap();
    assert_eq!(hops.len(), 2);
    assert!(hops.iter().all(|a| a.action == AuditAction::Demote));
    assert_eq!(hops[0].old_value["tier"], "HOT");
    assert_eq!(hops[0].new_value["tier"], "WARM");
    assert_eq!(hops[1].old_value["tier"], "WARM");
    assert_eq!(hops[1].new_value["tier"], "COLD");
    assert!(harness.engine.audit(&factual.id).unwrap().is_empty());
    assert!(harness.engine.audit(&procedural.id).unwrap().is_empty());
}

#[test]
fn decay_audit_rows_carry_type_snapshots() {
    let harness = TestEngine::with_config(override_config());
    let episodic = harness.seed_aged("we discussed the rollout", MemoryType::Episodic, Tier::Hot, 25);

    harness.engine.run_decay(None).expect("decay");

    let audit = harness.engine.audit(&episodic.id).unwrap();
    assert!(!audit.is_empty());
    for row in &audit {
        assert_eq!(row.old_value["memory_type"], "episodic");
        assert_eq!(row.new_value["memory_type"], "episodic");
    }
}

#[test]
fn pinned_memories_never_decay() {
    let harness = TestEngine::with_config(override_config());

    let mut record = MemoryRecord::new(
        "pinned episodic that would otherwise be ancient",
        MemoryType::Episodic,
        Tier::Hot,
    );
    let then = Utc::now() - Duration::hours(10_000);
    record.created_at = then;
    record.last_accessed_at = then;
    record.pinned = true;
    harness.seed_with(&record);

    let report = harness.engine.run_decay(None).expect("decay");
    assert_eq!(report.hot_demoted, 0);
    assert_eq!(
        harness.engine.store().get(&record.id).unwrap().unwrap().tier,
        Tier::Hot
    );
    assert!(harness.engine.audit(&record.id).unwrap().is_empty());
}

#[test]
fn decay_records_last_run_and_should_run_interval() {
    let harness = TestEngine::with_config(override_config());

    // never ran: due immediately
    assert!(harness.engine.decay_due().unwrap());

    harness.engine.run_decay(None).expect("decay");

    // just ran: not due within the 24h default interval
    assert!(!harness.engine.decay_due().unwrap());

    let stats = harness.engine.stats().unwrap();
    assert!(stats.last_decay_run.is_some());
}

#[test]
fn promotion_requires_both_thresholds() {
    let harness = TestEngine::new();
    let store = harness.engine.store();
    let now = Utc::now();

    // 6 uses across 3 distinct days: promoted
    let promotable = harness.seed_aged("promoted cold memory", MemoryType::Factual, Tier::Cold, 80);
    for day in 0..3 {
        store.update_access(&promotable.id, now - Duration::days(day)).unwrap();
        store.update_access(&promotable.id, now - Duration::days(day)).unwrap();
    }

    // 6 uses all on one day: not promoted
    let single_day = harness.seed_aged("single day cold memory", MemoryType::Factual, Tier::Cold, 80);
    for _ in 0..6 {
        store.update_access(&single_day.id, now).unwrap();
    }

    // 2 uses across 2 days: not promoted
    let rare = harness.seed_aged("rarely used cold memory", MemoryType::Factual, Tier::Cold, 80);
    store.update_access(&rare.id, now - Duration::days(1)).unwrap();
    store.update_access(&rare.id, now).unwrap();

    let report = harness.engine.run_promotion().expect("promotion");
    assert_eq!(report.promoted, 1);

    assert_eq!(store.get(&promotable.id).unwrap().unwrap().tier, Tier::Warm);
    assert_eq!(store.get(&single_day.id).unwrap().unwrap().tier, Tier::Cold);
    assert_eq!(store.get(&rare.id).unwrap().unwrap().tier, Tier::Cold);

    // promotion never targets HOT
    let audit = harness.engine.audit(&promotable.id).unwrap();
    let promote = audit.iter().find(|a| a.action == AuditAction::Promote).unwrap();
    assert_eq!(promote.new_value["tier"], "WARM");
}

#[test]
fn promotion_skips_pinned() {
    let harness = TestEngine::new();
    let store = harness.engine.store();
    let now = Utc::now();

    let mut record = MemoryRecord::new("pinned cold, heavily used", MemoryType::Factual, Tier::Cold);
    record.pinned = true;
    harness.seed_with(&record);
    for day in 0..4 {
        store.update_access(&record.id, now - Duration::days(day)).unwrap();
        store.update_access(&record.id, now - Duration::days(day)).unwrap();
    }

    let report = harness.engine.run_promotion().expect("promotion");
    assert_eq!(report.promoted, 0);
    assert_eq!(store.get(&record.id).unwrap().unwrap().tier, Tier::Cold);
}

#[test]
fn access_stats_idempotent_per_date() {
    let harness = TestEngine::new();
    let store = harness.engine.store();
    let record = harness.seed_aged("counted memory", MemoryType::Factual, Tier::Hot, 1);

    let now = Utc::now();
    for _ in 0..5 {
        store.update_access(&record.id, now).unwrap();
    }
    store.update_access(&record.id, now - Duration::days(1)).unwrap();

    let loaded = store.get(&record.id).unwrap().unwrap();
    assert_eq!(loaded.use_count, 6);
    assert_eq!(loaded.use_days.len(), 2);
    // sorted and deduplicated
    let mut sorted = loaded.use_days.clone();
    sorted.sort();
    sorted.dedup();
    assert_eq!(sorted, loaded.use_days);
}
