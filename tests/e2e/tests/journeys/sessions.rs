//! Session-type overrides and decay-profile selection precedence.

use sediment_core::{MemoryConfig, SessionType, StoreInput, Tier};
use sediment_e2e_tests::harness::TestEngine;

fn session_config() -> MemoryConfig {
    serde_json::from_str(
        r#"{
            "sessions": {
                "cron": {"autoCapture": false, "defaultTier": "WARM"},
                "spawned": {"autoInject": false}
            }
        }"#,
    )
    .expect("parse config")
}

#[test]
fn cron_sessions_do_not_capture() {
    let harness = TestEngine::with_config(session_config());
    let mut ctx = harness.ctx();
    ctx.session_type = SessionType::Cron;

    let report = harness
        .engine
        .capture("Important: remember this cron outcome for later.", &ctx, true)
        .expect("capture");
    assert!(report.gate.is_some());
    assert_eq!(harness.engine.stats().unwrap().total, 0);

    // main sessions still capture
    let report = harness
        .engine
        .capture("Important: remember this main-session outcome.", &harness.ctx(), true)
        .expect("capture");
    assert_eq!(report.gate, None);
    assert!(!report.captured.is_empty());
}

#[test]
fn spawned_sessions_do_not_inject() {
    let harness = TestEngine::with_config(session_config());
    harness.seed_aged(
        "the spawned worker polls every minute",
        sediment_core::MemoryType::Factual,
        Tier::Hot,
        1,
    );

    let mut ctx = harness.ctx();
    ctx.session_type = SessionType::Spawned;
    let result = harness
        .engine
        .recall("how often does the spawned worker poll?", &ctx)
        .expect("recall");
    assert!(result.prepended_context.is_none());

    // main sessions still recall
    let result = harness
        .engine
        .recall("how often does the spawned worker poll?", &harness.ctx())
        .expect("recall");
    assert!(result.prepended_context.is_some());
}

#[test]
fn session_default_tier_applies_to_stored_memories() {
    let harness = TestEngine::with_config(session_config());

    // cron has autoCapture off but explicit stores still work, at the
    // session's default tier
    let mut ctx = harness.ctx();
    ctx.session_type = SessionType::Cron;
    let record = harness
        .engine
        .store_memory(
            StoreInput {
                text: "cron sessions place memories in warm".to_string(),
                ..StoreInput::default()
            },
            &ctx,
        )
        .expect("store");
    assert_eq!(record.tier, Tier::Warm);

    // explicit tier wins over the session default
    let record = harness
        .engine
        .store_memory(
            StoreInput {
                text: "explicit placement overrides the session default".to_string(),
                tier: Some(Tier::Cold),
                ..StoreInput::default()
            },
            &ctx,
        )
        .expect("store");
    assert_eq!(record.tier, Tier::Cold);
}

#[test]
fn global_auto_recall_kill_switch() {
    let config: MemoryConfig = serde_json::from_str(r#"{"autoRecall": false}"#).unwrap();
    let harness = TestEngine::with_config(config);
    harness.seed_aged(
        "this would be injected if recall were on",
        sediment_core::MemoryType::Factual,
        Tier::Hot,
        1,
    );

    let result = harness
        .engine
        .recall("would this be injected?", &harness.ctx())
        .expect("recall");
    assert!(result.prepended_context.is_none());
    assert!(result.injected.is_empty());
}

#[test]
fn auto_recall_object_form_caps_items() {
    let config: MemoryConfig = serde_json::from_str(
        r#"{"autoRecall": {"maxItems": 5}, "injection": {"maxItems": 10}}"#,
    )
    .unwrap();
    let harness = TestEngine::with_config(config);

    for i in 0..8 {
        harness.seed_aged(
            &format!("deploy checklist entry number {} for the release", i),
            sediment_core::MemoryType::Factual,
            Tier::Hot,
            1,
        );
    }

    // hot bucket cap is floor(5 * 0.45) = 2 of the 8 candidates
    let result = harness
        .engine
        .recall("deploy checklist release entries", &harness.ctx())
        .expect("recall");
    assert_eq!(result.injected.len(), 2);
    assert_eq!(result.considered, 8);
}

#[test]
fn decay_profile_precedence_runtime_over_persisted() {
    let config: MemoryConfig = serde_json::from_str(
        r#"{"decay": {"default": {"hotTTL": 1000}}}"#,
    )
    .unwrap();
    let harness = TestEngine::with_config(config);

    // 30h-old episodic: survives under the config profile (1000h TTL)
    let record = harness.seed_aged(
        "session scratch notes",
        sediment_core::MemoryType::Episodic,
        Tier::Hot,
        30,
    );
    harness.engine.run_decay(None).expect("decay");
    assert_eq!(
        harness.engine.store().get(&record.id).unwrap().unwrap().tier,
        Tier::Hot
    );

    // the built-in thorough profile demotes 30h-old episodic (24h TTL);
    // a session-runtime override selects it past the config default
    let mut ctx = harness.ctx();
    ctx.decay_profile = Some("thorough".to_string());
    harness.engine.run_decay(Some(&ctx)).expect("decay");
    assert_eq!(
        harness.engine.store().get(&record.id).unwrap().unwrap().tier,
        Tier::Warm
    );
}
