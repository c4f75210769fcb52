//! Full capture -> recall journeys: noise gating, duplicate suppression,
//! the injection envelope, access stats, and feedback rows.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use sediment_core::{
    CaptureGate, EngineError, MemoryConfig, MemoryType, StoreInput, Tier,
};
use sediment_e2e_tests::harness::{FixedEmbedder, TestEngine, UnavailableEmbedder, EMBED_DIM};

#[test]
fn noise_body_is_rejected_whole() {
    let harness = TestEngine::new();
    let report = harness
        .engine
        .capture("[Telegram message id: 42] hello", &harness.ctx(), true)
        .expect("capture");

    assert_eq!(report.gate, Some(CaptureGate::NoiseBody));
    assert!(report.captured.is_empty());
    assert_eq!(harness.engine.stats().unwrap().total, 0);
}

#[test]
fn failed_turns_are_never_captured() {
    let harness = TestEngine::new();
    let report = harness
        .engine
        .capture(
            "Remember: the deploy pipeline needs the staging flag.",
            &harness.ctx(),
            false,
        )
        .expect("capture");

    assert_eq!(report.gate, Some(CaptureGate::TurnFailed));
    assert_eq!(harness.engine.stats().unwrap().total, 0);
}

#[test]
fn capture_persists_salient_segments_as_hot() {
    let harness = TestEngine::new();
    let output = "Important: the database migration must run before the rollout.\n\n\
                  We use `cargo xtask release` to cut a release build.";
    let report = harness.engine.capture(output, &harness.ctx(), true).expect("capture");

    assert_eq!(report.gate, None);
    assert_eq!(report.captured.len(), 2);

    let store = harness.engine.store();
    for id in &report.captured {
        let record = store.get(id).unwrap().unwrap();
        assert_eq!(record.tier, Tier::Hot);
        assert_eq!(record.source.as_deref(), Some("auto-capture"));
    }
}

#[test]
fn capture_stops_at_max_captures() {
    let harness = TestEngine::new();
    let output: String = (0..10)
        .map(|i| format!("Observation number {} concerns subsystem number {}.\n\n", i, i))
        .collect();
    let report = harness.engine.capture(&output, &harness.ctx(), true).expect("capture");

    assert!(report.captured.len() <= 3);
    assert_eq!(harness.engine.stats().unwrap().total as usize, report.captured.len());
}

#[test]
fn capture_suppresses_duplicates() {
    let harness = TestEngine::new();
    let output = "The ingestion worker retries failed batches five times.";

    let first = harness.engine.capture(output, &harness.ctx(), true).expect("capture");
    assert_eq!(first.captured.len(), 1);

    // identical content embeds identically: cosine 1.0 >= 0.95
    let second = harness.engine.capture(output, &harness.ctx(), true).expect("capture");
    assert!(second.captured.is_empty());
    assert!(second.skipped_duplicates >= 1);
    assert_eq!(harness.engine.stats().unwrap().total, 1);
}

#[test]
fn store_tool_rejects_near_duplicate_with_existing_id() {
    let provider = Arc::new(FixedEmbedder::default());
    let original = "the cache eviction policy is least-recently-used";
    let near_copy = "the cache eviction policy is least recently used!";

    let mut v1 = vec![0.0f32; EMBED_DIM];
    v1[0] = 1.0;
    let mut v2 = vec![0.0f32; EMBED_DIM];
    v2[0] = 0.97;
    v2[1] = (1.0f32 - 0.97 * 0.97).sqrt();
    provider.set(original, v1);
    provider.set(near_copy, v2);

    let harness = TestEngine::with_provider(MemoryConfig::default(), provider);

    let stored = harness
        .engine
        .store_memory(
            StoreInput {
                text: original.to_string(),
                ..StoreInput::default()
            },
            &harness.ctx(),
        )
        .expect("store original");

    let err = harness
        .engine
        .store_memory(
            StoreInput {
                text: near_copy.to_string(),
                ..StoreInput::default()
            },
            &harness.ctx(),
        )
        .unwrap_err();

    match err {
        EngineError::SimilarMemoryExists {
            existing_id,
            similarity,
        } => {
            assert_eq!(existing_id, stored.id);
            assert!((similarity - 0.97).abs() < 1e-3);
        }
        other => panic!("expected SimilarMemoryExists, got {:?}", other),
    }
    assert_eq!(harness.engine.stats().unwrap().total, 1);
}

#[test]
fn recall_builds_exact_envelope() {
    let harness = TestEngine::new();
    let record = harness.seed_aged(
        "the gateway timeout is ninety seconds",
        MemoryType::Factual,
        Tier::Hot,
        1,
    );

    let result = harness
        .engine
        .recall("what is the gateway timeout?", &harness.ctx())
        .expect("recall");

    assert_eq!(result.injected.len(), 1);
    assert_eq!(result.injected[0].id, record.id);

    let envelope = result.prepended_context.expect("envelope");
    let expected = format!(
        "<relevant-memories>\n  <memory id=\"{}\" tier=\"HOT\" type=\"factual\">\n    \
         the gateway timeout is ninety seconds\n  </memory>\n</relevant-memories>",
        record.id
    );
    assert_eq!(envelope, expected);
}

#[test]
fn recall_includes_current_context_block() {
    let harness = TestEngine::new();
    harness.engine.set_context("migrating the billing service", None).unwrap();

    let result = harness.engine.recall("anything at all", &harness.ctx()).expect("recall");
    let envelope = result.prepended_context.expect("envelope");
    assert!(envelope.contains(
        "  <current-context>\n    migrating the billing service\n  </current-context>\n"
    ));
}

#[test]
fn recall_escapes_memory_text() {
    let harness = TestEngine::new();
    harness.seed_aged(
        "generics use <T> & lifetimes use 'a in rust syntax",
        MemoryType::Factual,
        Tier::Hot,
        1,
    );

    let result = harness
        .engine
        .recall("rust generics lifetimes syntax", &harness.ctx())
        .expect("recall");

    let envelope = result.prepended_context.expect("envelope");
    assert!(envelope.contains("&lt;T&gt; &amp; lifetimes use &apos;a"));
    assert!(!envelope.contains("<T>"));
}

#[test]
fn recall_excludes_forgotten_memories() {
    let harness = TestEngine::new();
    let kept = harness.seed_aged(
        "the scheduler runs hourly sweeps",
        MemoryType::Factual,
        Tier::Hot,
        1,
    );
    let forgotten = harness.seed_aged(
        "the scheduler previously ran daily sweeps",
        MemoryType::Factual,
        Tier::Hot,
        1,
    );
    harness.engine.forget(&forgotten.id, false).unwrap();

    let result = harness
        .engine
        .recall("how often does the scheduler run sweeps?", &harness.ctx())
        .expect("recall");

    let ids: Vec<&str> = result.injected.iter().map(|m| m.id.as_str()).collect();
    assert!(ids.contains(&kept.id.as_str()));
    assert!(!ids.contains(&forgotten.id.as_str()));
}

#[test]
fn recall_updates_access_stats_once_per_pass() {
    let harness = TestEngine::new();
    let record = harness.seed_aged(
        "connection pooling uses twelve slots",
        MemoryType::Factual,
        Tier::Hot,
        1,
    );

    harness
        .engine
        .recall("how many connection pooling slots?", &harness.ctx())
        .expect("recall");
    harness
        .engine
        .recall("how many connection pooling slots?", &harness.ctx())
        .expect("recall");

    let loaded = harness.engine.store().get(&record.id).unwrap().unwrap();
    assert_eq!(loaded.use_count, 2);
    assert_eq!(loaded.use_days.len(), 1);
}

#[test]
fn recall_records_feedback_off_the_critical_path() {
    let harness = TestEngine::new();
    let record = harness.seed_aged(
        "the indexer shards by tenant id",
        MemoryType::Factual,
        Tier::Hot,
        1,
    );

    let mut ctx = harness.ctx();
    ctx.session_key = Some("sess-42".to_string());
    let result = harness
        .engine
        .recall("how does the indexer shard?", &ctx)
        .expect("recall");
    assert_eq!(result.injected.len(), 1);

    // feedback lands asynchronously; poll briefly
    let store = harness.engine.store();
    let deadline = Instant::now() + StdDuration::from_secs(2);
    let rows = loop {
        let rows = store.feedback_for(&record.id).unwrap();
        if !rows.is_empty() || Instant::now() > deadline {
            break rows;
        }
        std::thread::sleep(StdDuration::from_millis(10));
    };

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].session_key.as_deref(), Some("sess-42"));
    assert!(rows[0].injection_density > 0.0 && rows[0].injection_density <= 1.0);
}

#[test]
fn recall_degrades_to_empty_when_provider_is_down() {
    let harness = TestEngine::with_provider(
        MemoryConfig::default(),
        Arc::new(UnavailableEmbedder),
    );

    let result = harness
        .engine
        .recall("anything", &harness.ctx())
        .expect("recall must not error");
    assert!(result.prepended_context.is_none());
    assert!(result.injected.is_empty());
}

#[test]
fn capture_aborts_cleanly_when_provider_is_down() {
    let harness = TestEngine::with_provider(
        MemoryConfig::default(),
        Arc::new(UnavailableEmbedder),
    );

    let report = harness
        .engine
        .capture(
            "Important: remember this even though embedding is down.",
            &harness.ctx(),
            true,
        )
        .expect("capture must not error");
    assert!(report.captured.is_empty());
    assert_eq!(harness.engine.stats().unwrap().total, 0);
}

#[test]
fn search_tool_returns_forgotten_memories() {
    let harness = TestEngine::new();
    let forgotten = harness.seed_aged(
        "the legacy importer used csv batches",
        MemoryType::Factual,
        Tier::Warm,
        1,
    );
    harness.engine.forget(&forgotten.id, false).unwrap();

    // forgotten memories are still queryable explicitly
    let hits = harness.engine.search("legacy importer csv", 5).expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].memory.id, forgotten.id);
    assert!(hits[0].combined > 0.0);
    assert!(hits[0].text_score > 0.0);
}

#[test]
fn empty_query_is_a_typed_error_for_search() {
    let harness = TestEngine::new();
    assert!(matches!(
        harness.engine.search("   ", 5),
        Err(EngineError::EmptyQuery)
    ));
}
