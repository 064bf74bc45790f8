//! Memory and confidence journeys: Bayesian updates, consolidation,
//! forgetting, and snapshot persistence across runtime generations.

use chrono::Utc;

use anima_core::{
    Capability, CapabilityKind, HormoneType, MemoryPayload, MemoryQuery, MemoryType,
    RetrievalCue,
};
use anima_e2e_tests::harness::RuntimeManager;
use anima_e2e_tests::mocks::TestDataFactory;

#[tokio::test]
async fn ten_successes_yield_eleven_twelfths_confidence() {
    let manager = RuntimeManager::new_ephemeral();
    let runtime = &manager.runtime;

    runtime
        .register_capability(Capability::new("x", CapabilityKind::SystemTool, "test"))
        .unwrap();
    for _ in 0..10 {
        runtime.record_capability_use("x", true, 5).unwrap();
    }

    let confidence = runtime.confidence();
    let store = confidence.lock().unwrap();
    assert!((store.confidence("x") - 11.0 / 12.0).abs() < 1e-9);
    assert!(store.should_use("x", 0.8, 5));
    // Uncertainty is tight after ten agreeing observations.
    assert!(store.uncertainty("x") < 0.01);
}

#[tokio::test]
async fn aged_episode_consolidates_into_semantic_fact() {
    let manager = RuntimeManager::new_ephemeral();
    let memory = manager.runtime.memory();

    let record = {
        let mut store = memory.lock().unwrap();
        store.record_episodic(
            "the nightly build breaks when the cache is cold",
            None,
            None,
            Default::default(),
        )
    };
    // Created 48 hours ago, accessed 6 times, last access now.
    TestDataFactory::age_for_consolidation(&memory, &record.id, 48, 6);

    let now = Utc::now();
    let mut store = memory.lock().unwrap();
    assert!(store.should_consolidate(&record.id, now));

    let promoted = store.consolidate(&record.id, now).expect("promotion");
    assert_eq!(promoted.memory_type, MemoryType::Semantic);
    assert!(promoted.importance >= 0.6);
    match &promoted.payload {
        MemoryPayload::Semantic { fact, verified, .. } => {
            assert!(fact.contains("nightly build"));
            assert!(!verified);
        }
        other => panic!("expected semantic payload, got {other:?}"),
    }

    // The episodic original is gone from queries; a second consolidation
    // converges on the same fact.
    assert!(store.peek(&record.id).is_none());
    let again = store.consolidate(&record.id, now).expect("idempotent");
    assert_eq!(again.id, promoted.id);
    assert_eq!(
        store
            .query(&MemoryQuery {
                memory_type: Some(MemoryType::Semantic),
                ..Default::default()
            })
            .len(),
        1
    );
}

#[tokio::test]
async fn retrieval_ranks_seeded_memories_without_bumping_access() {
    let manager = RuntimeManager::new_ephemeral();
    let memory = manager.runtime.memory();
    let seeded = TestDataFactory::seed_episodes(&memory, 10);

    let mut store = memory.lock().unwrap();
    let hits = store.retrieve_relevant(&RetrievalCue {
        text: "observed event during the test run".to_string(),
        embedding: None,
        k: 5,
    });
    assert_eq!(hits.len(), 5);
    for pair in hits.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
    // Indirect hits are not deliberate accesses.
    assert_eq!(store.peek(&seeded[0].id).unwrap().access_count, 0);
}

#[tokio::test]
async fn state_survives_a_runtime_generation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("anima-e2e.db");
    {
        let runtime = RuntimeManager::reopen(path.clone());
        runtime
            .hormones()
            .lock()
            .unwrap()
            .set(HormoneType::Curiosity, 0.77, "journey");
        runtime
            .register_capability(Capability::new("echo", CapabilityKind::SystemTool, "io"))
            .unwrap();
        for success in [true, true, false] {
            runtime.record_capability_use("echo", success, 3).unwrap();
        }
        {
            let memory = runtime.memory();
            let mut memory = memory.lock().unwrap();
            memory.record_semantic(
                "snapshots survive restarts",
                "persistence",
                0.9,
                true,
                Default::default(),
            );
        }
        runtime.persist().unwrap();
    }

    let reopened = RuntimeManager::reopen(path);
    assert!(
        (reopened
            .hormones()
            .lock()
            .unwrap()
            .level(HormoneType::Curiosity)
            - 0.77)
            .abs()
            < 1e-9
    );
    {
        let confidence = reopened.confidence();
        let store = confidence.lock().unwrap();
        assert_eq!(store.total_count("echo"), 3);
        // Beta parameters round-trip exactly: Beta(3, 2).
        assert!((store.confidence("echo") - 3.0 / 5.0).abs() < 1e-9);
    }
    let memory = reopened.memory();
    let memory = memory.lock().unwrap();
    let facts = memory.query(&MemoryQuery {
        memory_type: Some(MemoryType::Semantic),
        ..Default::default()
    });
    assert_eq!(facts.len(), 1);
}
