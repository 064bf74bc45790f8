//! Test Data Factory
//!
//! Generates realistic task closures and memory populations for journey
//! tests.

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Mutex;
use std::time::Duration;

use anima_core::{
    CoreError, MemoryRecord, MemoryStore, RecordOptions, TaskClosure,
};

/// Factory for creating test data.
pub struct TestDataFactory;

impl TestDataFactory {
    /// A closure that resolves to a JSON number immediately.
    pub fn answer_task(value: i64) -> TaskClosure {
        Box::new(move || Box::pin(async move { Ok(serde_json::json!(value)) }))
    }

    /// A closure that fails with an execution error.
    pub fn failing_task(message: &str) -> TaskClosure {
        let message = message.to_string();
        Box::new(move || Box::pin(async move { Err(CoreError::Execution(message)) }))
    }

    /// A closure that sleeps before resolving (timeout and cancel tests).
    pub fn slow_task(sleep: Duration) -> TaskClosure {
        Box::new(move || {
            Box::pin(async move {
                tokio::time::sleep(sleep).await;
                Ok(serde_json::json!("slow-done"))
            })
        })
    }

    /// Seed a batch of episodic memories.
    pub fn seed_episodes(store: &Mutex<MemoryStore>, count: usize) -> Vec<MemoryRecord> {
        let mut store = store.lock().expect("memory lock");
        (0..count)
            .map(|i| {
                store.record_episodic(
                    format!("observed event number {i} during the test run"),
                    Some("journey test".to_string()),
                    None,
                    RecordOptions {
                        importance: 0.4 + (i % 5) as f64 * 0.1,
                        tags: vec!["seeded".to_string()],
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    /// Age a record so it qualifies for consolidation: created `age_hours`
    /// ago with `access_count` direct accesses, last touched just now.
    ///
    /// Works through the public surface: repeated `get` calls bump access,
    /// and the export/restore round trip rewrites timestamps.
    pub fn age_for_consolidation(
        store: &Mutex<MemoryStore>,
        id: &str,
        age_hours: i64,
        access_count: u32,
    ) {
        let mut store = store.lock().expect("memory lock");
        for _ in 0..access_count {
            store.get(id);
        }
        let mut records = store.export();
        let created = Utc::now() - ChronoDuration::hours(age_hours);
        for record in &mut records {
            if record.id == id {
                record.created_at = created;
            }
        }
        store.restore(records);
    }
}
