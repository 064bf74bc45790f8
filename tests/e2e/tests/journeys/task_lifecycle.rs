//! Task lifecycle journeys: submission through terminal events, with
//! hormone feedback and stress-gated admission.

use std::time::Duration;

use anima_core::{EventPayload, HormoneType, TaskPriority, Topic};
use anima_e2e_tests::harness::RuntimeManager;
use anima_e2e_tests::mocks::TestDataFactory;

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn submit_reactive_task_completes_and_rewards() {
    let mut manager = RuntimeManager::new_running();
    let runtime = &mut manager.runtime;

    let reward_before = runtime
        .hormones()
        .lock()
        .unwrap()
        .level(HormoneType::Reward);

    let id = runtime.submit_reactive(TestDataFactory::answer_task(42), TaskPriority::Normal);
    settle().await;

    // submitted -> started -> completed, in order, exactly once each.
    assert_eq!(runtime.bus().history_for(Topic::TaskSubmitted).len(), 1);
    assert_eq!(runtime.bus().history_for(Topic::TaskStarted).len(), 1);
    let completed = runtime.bus().history_for(Topic::TaskCompleted);
    assert_eq!(completed.len(), 1);
    match &completed[0].payload {
        EventPayload::Task {
            id: event_id,
            result,
            ..
        } => {
            assert_eq!(event_id, &id);
            assert_eq!(result, &Some(serde_json::json!(42)));
        }
        other => panic!("unexpected payload {other:?}"),
    }

    // Reward rose by the success increment (decay over 150 ms is below
    // measurement noise for the assertion band).
    let reward_after = runtime
        .hormones()
        .lock()
        .unwrap()
        .level(HormoneType::Reward);
    assert!(
        (reward_after - reward_before - 0.05).abs() < 0.01,
        "reward moved {reward_before} -> {reward_after}"
    );

    runtime.stop().await;
}

#[tokio::test]
async fn stress_gates_low_priority_until_recovery() {
    let mut manager = RuntimeManager::new_running();
    let runtime = &mut manager.runtime;

    runtime
        .hormones()
        .lock()
        .unwrap()
        .set(HormoneType::Stress, 0.9, "journey setup");

    runtime.submit_reactive(TestDataFactory::answer_task(1), TaskPriority::Low);
    runtime.submit_reactive(TestDataFactory::answer_task(2), TaskPriority::Critical);
    settle().await;

    // Only the critical task got through the admission gate.
    assert_eq!(runtime.bus().history_for(Topic::TaskCompleted).len(), 1);
    assert_eq!(runtime.scheduler().lock().unwrap().queued_count(), 1);

    // Stress subsides below the gate; the low task now runs.
    runtime
        .hormones()
        .lock()
        .unwrap()
        .set(HormoneType::Stress, 0.4, "journey recovery");
    settle().await;

    assert_eq!(runtime.bus().history_for(Topic::TaskCompleted).len(), 2);
    assert_eq!(runtime.scheduler().lock().unwrap().queued_count(), 0);

    runtime.stop().await;
}

#[tokio::test]
async fn failing_task_emits_failed_and_spikes_alert() {
    let mut manager = RuntimeManager::new_running();
    let runtime = &mut manager.runtime;

    runtime.submit_reactive(
        TestDataFactory::failing_task("synthetic failure"),
        TaskPriority::Normal,
    );
    settle().await;

    let failed = runtime.bus().history_for(Topic::TaskFailed);
    assert_eq!(failed.len(), 1);
    match &failed[0].payload {
        EventPayload::Task { error, .. } => {
            assert!(error.as_ref().unwrap().contains("synthetic failure"));
        }
        other => panic!("unexpected payload {other:?}"),
    }

    let hormones = runtime.hormones();
    let field = hormones.lock().unwrap();
    assert!(field.level(HormoneType::Alert) > HormoneType::Alert.baseline());
    assert!(field.level(HormoneType::Stress) > HormoneType::Stress.baseline());
    drop(field);

    runtime.stop().await;
}

#[tokio::test]
async fn deadline_expiry_emits_timeout_not_completed() {
    let mut manager = RuntimeManager::new_running();
    let runtime = &mut manager.runtime;

    {
        let scheduler = runtime.scheduler();
        let mut scheduler = scheduler.lock().unwrap();
        scheduler.submit_reactive(
            TestDataFactory::slow_task(Duration::from_secs(30)),
            TaskPriority::Normal,
            Some(Duration::from_millis(40)),
            Default::default(),
        );
    }
    tokio::time::sleep(Duration::from_millis(250)).await;

    assert_eq!(runtime.bus().history_for(Topic::TaskTimeout).len(), 1);
    assert!(runtime.bus().history_for(Topic::TaskCompleted).is_empty());
    assert_eq!(runtime.scheduler().lock().unwrap().running_count(), 0);

    runtime.stop().await;
}

#[tokio::test]
async fn cancelled_task_emits_cancelled_only() {
    let mut manager = RuntimeManager::new_running();
    let runtime = &mut manager.runtime;

    let id = runtime.submit_reactive(
        TestDataFactory::slow_task(Duration::from_secs(30)),
        TaskPriority::Normal,
    );
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(runtime.cancel(&id));
    settle().await;

    assert_eq!(runtime.bus().history_for(Topic::TaskCancelled).len(), 1);
    assert!(runtime.bus().history_for(Topic::TaskCompleted).is_empty());
    assert!(runtime.bus().history_for(Topic::TaskFailed).is_empty());

    runtime.stop().await;
}
