//! Per-memory state machine via the tool surface: forget/restore,
//! pin/unpin, hard deletion, typed errors, and audit completeness.

use sediment_core::{AuditAction, EngineError, MemoryType, StorageError, Tier};
use sediment_e2e_tests::harness::TestEngine;

#[test]
fn forget_restore_round_trip_with_audit() {
    let harness = TestEngine::new();
    let record = harness.seed_aged("forgettable fact", MemoryType::Factual, Tier::Hot, 1);

    harness.engine.forget(&record.id, false).unwrap();
    let loaded = harness.engine.store().get(&record.id).unwrap().unwrap();
    assert!(loaded.do_not_inject);

    harness.engine.restore(&record.id).unwrap();
    let loaded = harness.engine.store().get(&record.id).unwrap().unwrap();
    assert!(!loaded.do_not_inject);

    let audit = harness.engine.audit(&record.id).unwrap();
    let actions: Vec<AuditAction> = audit.iter().map(|a| a.action).collect();
    assert_eq!(actions, vec![AuditAction::Forget, AuditAction::Restore]);
    // every audit row snapshots tier and memory_type
    for row in &audit {
        assert_eq!(row.old_value["tier"], "HOT");
        assert_eq!(row.old_value["memory_type"], "factual");
        assert_eq!(row.new_value["tier"], "HOT");
    }
}

#[test]
fn double_forget_and_double_restore_are_typed_errors() {
    let harness = TestEngine::new();
    let record = harness.seed_aged("double trouble", MemoryType::Factual, Tier::Hot, 1);

    harness.engine.forget(&record.id, false).unwrap();
    assert!(matches!(
        harness.engine.forget(&record.id, false),
        Err(EngineError::AlreadyForgotten(_))
    ));

    harness.engine.restore(&record.id).unwrap();
    assert!(matches!(
        harness.engine.restore(&record.id),
        Err(EngineError::NotForgotten(_))
    ));
}

#[test]
fn pin_unpin_round_trip_with_typed_errors() {
    let harness = TestEngine::new();
    let record = harness.seed_aged("pinnable fact", MemoryType::Factual, Tier::Warm, 1);

    harness.engine.pin(&record.id).unwrap();
    assert!(harness.engine.store().get(&record.id).unwrap().unwrap().pinned);
    assert!(matches!(
        harness.engine.pin(&record.id),
        Err(EngineError::AlreadyPinned(_))
    ));

    harness.engine.unpin(&record.id).unwrap();
    assert!(!harness.engine.store().get(&record.id).unwrap().unwrap().pinned);
    assert!(matches!(
        harness.engine.unpin(&record.id),
        Err(EngineError::NotPinned(_))
    ));

    let audit = harness.engine.audit(&record.id).unwrap();
    let actions: Vec<AuditAction> = audit.iter().map(|a| a.action).collect();
    assert_eq!(actions, vec![AuditAction::Pin, AuditAction::Unpin]);
}

#[test]
fn hard_forget_deletes_and_cascades() {
    let harness = TestEngine::new();
    let record = harness.seed_aged("short-lived fact", MemoryType::Factual, Tier::Hot, 1);
    harness.engine.pin(&record.id).unwrap();

    harness.engine.forget(&record.id, true).unwrap();

    let store = harness.engine.store();
    assert!(store.get(&record.id).unwrap().is_none());
    // vector, feedback, and audit rows cascade with the memory
    assert!(store.get_vector(&record.id).unwrap().is_none());
    assert!(store.feedback_for(&record.id).unwrap().is_empty());
    assert!(harness.engine.audit(&record.id).unwrap().is_empty());
    assert_eq!(harness.engine.stats().unwrap().total, 0);
}

#[test]
fn unknown_and_malformed_ids_are_typed_errors() {
    let harness = TestEngine::new();

    assert!(matches!(
        harness.engine.pin("not-a-uuid"),
        Err(EngineError::InvalidMemoryId(_))
    ));

    let missing = uuid::Uuid::new_v4().to_string();
    assert!(matches!(
        harness.engine.pin(&missing),
        Err(EngineError::MemoryNotFound(_))
    ));
}

#[test]
fn empty_memory_text_is_rejected() {
    let harness = TestEngine::new();
    let err = harness
        .engine
        .store_memory(
            sediment_core::StoreInput {
                text: "   ".to_string(),
                ..sediment_core::StoreInput::default()
            },
            &harness.ctx(),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::EmptyMemoryText));
}

#[test]
fn explain_breaks_down_the_score() {
    let harness = TestEngine::new();
    let record = harness.seed_aged("the parser caches token streams", MemoryType::Factual, Tier::Hot, 0);

    let explanation = harness
        .engine
        .explain(&record.id, Some("parser token caching"))
        .unwrap();

    assert_eq!(explanation.memory_id, record.id);
    assert_eq!(explanation.tier, "HOT");
    assert_eq!(explanation.half_life_days, 90.0);
    assert!(explanation.similarity.is_some());
    // fresh memory: recency component near its weight
    assert!((explanation.score.recency - 0.3).abs() < 1e-2);
    assert!(explanation.score.total >= explanation.score.recency);
}

#[test]
fn context_set_and_clear() {
    let harness = TestEngine::new();
    harness.engine.set_context("debugging the retry path", None).unwrap();
    assert!(harness.engine.current_context().unwrap().is_some());

    harness.engine.clear_context().unwrap();
    assert!(harness.engine.current_context().unwrap().is_none());
}

#[test]
fn storage_not_found_for_unknown_id() {
    let harness = TestEngine::new();
    let store = harness.engine.store();
    assert!(matches!(
        store.delete("00000000-0000-0000-0000-00000000dead"),
        Err(StorageError::NotFound(_))
    ));
}
