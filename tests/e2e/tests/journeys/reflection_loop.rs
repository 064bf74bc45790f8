//! Reflection journeys: degraded performance turns into an executed
//! proposal that actually rewires live configuration.

use std::time::Duration;

use anima_core::{
    ApprovalMode, Capability, CapabilityKind, ChangeStatus, ProposalState, Topic,
};
use anima_e2e_tests::harness::RuntimeManager;

#[tokio::test]
async fn error_storm_drives_an_executed_conservative_switch() {
    let mut manager = RuntimeManager::new_ephemeral();
    {
        let config = manager.runtime.config();
        let mut config = config.lock().unwrap();
        // Reflection checks nearly continuously for the journey.
        config.reflection.check_interval_ms = 40;
    }
    manager.runtime.start();
    let runtime = &mut manager.runtime;

    runtime
        .register_capability(Capability::new(
            "flaky-tool",
            CapabilityKind::ExternalTool,
            "io",
        ))
        .unwrap();

    // An error storm: 25% failures over 20 recent samples crosses the
    // analyzer's elevated-error threshold.
    for i in 0..20 {
        runtime
            .record_capability_use("flaky-tool", i % 4 != 0, 50)
            .unwrap();
    }

    tokio::time::sleep(Duration::from_millis(400)).await;
    runtime.stop().await;

    // A proposal fired, was auto-approved (medium risk under auto mode),
    // and executed against the live config.
    assert!(!runtime.bus().history_for(Topic::ReflectionFired).is_empty());
    assert!(!runtime
        .bus()
        .history_for(Topic::ReflectionProposed)
        .is_empty());
    assert!(!runtime
        .bus()
        .history_for(Topic::ReflectionExecuted)
        .is_empty());

    let reflection = runtime.reflection();
    let engine = reflection.lock().unwrap();
    assert!(engine
        .proposals()
        .iter()
        .any(|p| p.state == ProposalState::Executed));
    let change = engine
        .history()
        .iter()
        .find(|r| r.target == "reflection.approval_mode")
        .expect("conservative-mode change record");
    assert_eq!(change.status, ChangeStatus::Applied);
    assert_eq!(change.after, serde_json::json!("conservative"));
    drop(engine);

    // The hot update landed in live configuration.
    let config = runtime.config();
    let config = config.lock().unwrap();
    assert_eq!(config.reflection.approval_mode, ApprovalMode::Conservative);
}

#[tokio::test]
async fn manual_reflection_on_memory_backlog_tunes_maintenance() {
    let manager = RuntimeManager::new_ephemeral();
    let runtime = &manager.runtime;

    // Build a backlog of forgettable records: unimportant and stale.
    {
        let memory = runtime.memory();
        let mut memory = memory.lock().unwrap();
        for i in 0..120 {
            memory.record_episodic(
                format!("disposable note {i}"),
                None,
                None,
                anima_core::RecordOptions {
                    importance: 0.0,
                    ..Default::default()
                },
            );
        }
        let mut records = memory.export();
        let stale = chrono::Utc::now() - chrono::Duration::days(45);
        for record in &mut records {
            record.created_at = stale;
            record.last_access = stale;
        }
        memory.restore(records);
    }

    let proposal_id = runtime
        .reflect_now("operator requested tune-up")
        .expect("backlog produces a proposal");

    let reflection = runtime.reflection();
    let engine = reflection.lock().unwrap();
    let proposal = engine
        .proposals()
        .iter()
        .find(|p| p.id == proposal_id)
        .unwrap();
    // Low-risk cleanup is auto-approved and waits for the stepper to apply.
    assert_eq!(proposal.state, ProposalState::Approved);
    assert!(proposal
        .actions
        .iter()
        .any(|a| a.target == "memory.maintenance_interval_ms"));
    assert!(proposal.insights.iter().any(|i| i.category == "memory"));
}
