//! Hormone-Gated Scheduler
//!
//! Dual-queue priority execution. The reactive queue is the fast path for
//! interactive work; the regulatory queue carries background and
//! maintenance work. A single cooperative stepper drains the queues through
//! three gates:
//!
//! 1. capacity (outstanding closures < `max_concurrent`)
//! 2. homeostasis (CPU / memory back-pressure from the metrics probe)
//! 3. admission (per task, computed from the hormone snapshot)
//!
//! Task outcomes feed back into the hormone field: success releases reward,
//! failure spikes alert and stress, and every execution accrues fatigue.

mod queue;
mod task;

pub use queue::TaskQueue;
pub use task::{
    next_task_id, CancelHandle, QueueClass, Task, TaskClosure, TaskFuture, TaskOutput,
    TaskPriority,
};

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::ResourceSample;
use crate::events::{EventBus, EventPayload, Topic};
use crate::hormones::{HormoneField, HormoneSnapshot, HormoneType};

// ============================================================================
// CONFIG
// ============================================================================

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Stepper cadence
    pub loop_interval_ms: u64,
    /// Default task deadline
    pub default_timeout_ms: u64,
    /// Concurrency cap on outstanding closures
    pub max_concurrent: usize,
    /// Whether metrics-based back-pressure is applied
    pub homeostasis_enable: bool,
    /// CPU back-pressure threshold (percent)
    pub cpu_threshold_pct: f64,
    /// Memory back-pressure threshold (percent)
    pub memory_threshold_pct: f64,
    /// Fatigue level above which weak-priority tasks are probabilistically bounced
    pub fatigue_threshold: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            loop_interval_ms: 100,
            default_timeout_ms: 30_000,
            max_concurrent: 5,
            homeostasis_enable: true,
            cpu_threshold_pct: 80.0,
            memory_threshold_pct: 85.0,
            fatigue_threshold: 0.7,
        }
    }
}

// ============================================================================
// ADMISSION
// ============================================================================

/// Pure admission rule, applied per task against a hormone snapshot.
///
/// - stress > 0.8 rejects priorities weaker than high
/// - fatigue above threshold bounces weak priorities 50% of the time
///   (`roll` is the pre-drawn uniform sample)
/// - alert > 0.6 always admits priorities at or above high
/// - otherwise admit
pub fn admit(
    priority: TaskPriority,
    snapshot: &HormoneSnapshot,
    fatigue_threshold: f64,
    roll: f64,
) -> bool {
    let weak = priority > TaskPriority::High;

    if snapshot.stress > 0.8 && weak {
        return false;
    }
    if snapshot.fatigue > fatigue_threshold && weak && roll < 0.5 {
        return false;
    }
    if snapshot.alert > 0.6 && !weak {
        return true;
    }
    true
}

// ============================================================================
// SCHEDULER
// ============================================================================

struct RunningEntry {
    cancel: CancelHandle,
}

/// Dual-queue, hormone-gated task scheduler.
pub struct Scheduler {
    config: SchedulerConfig,
    reactive: TaskQueue,
    regulatory: TaskQueue,
    running: Arc<Mutex<HashMap<String, RunningEntry>>>,
    hormones: Arc<Mutex<HormoneField>>,
    bus: EventBus,
    latest_metrics: Option<ResourceSample>,
    stopped: bool,
}

impl Scheduler {
    /// Create a scheduler sharing the hormone field and bus.
    pub fn new(config: SchedulerConfig, hormones: Arc<Mutex<HormoneField>>, bus: EventBus) -> Self {
        Self {
            config,
            reactive: TaskQueue::new(),
            regulatory: TaskQueue::new(),
            running: Arc::new(Mutex::new(HashMap::new())),
            hormones,
            bus,
            latest_metrics: None,
            stopped: false,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Hot-reloadable: concurrency cap.
    pub fn set_max_concurrent(&mut self, max: usize) {
        self.config.max_concurrent = max.max(1);
    }

    /// Hot-reloadable: fatigue bounce threshold.
    pub fn set_fatigue_threshold(&mut self, threshold: f64) {
        self.config.fatigue_threshold = threshold.clamp(0.0, 1.0);
    }

    /// Hot-reloadable: default deadline.
    pub fn set_default_timeout_ms(&mut self, timeout_ms: u64) {
        self.config.default_timeout_ms = timeout_ms.max(1);
    }

    /// Feed the latest resource sample (homeostasis gate input).
    pub fn set_metrics(&mut self, sample: ResourceSample) {
        self.latest_metrics = Some(sample);
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Submit onto the reactive (fast) queue.
    pub fn submit_reactive(
        &mut self,
        closure: TaskClosure,
        priority: TaskPriority,
        timeout: Option<Duration>,
        metadata: HashMap<String, String>,
    ) -> String {
        self.submit(QueueClass::Reactive, priority, closure, timeout, metadata)
    }

    /// Submit onto the regulatory (slow) queue.
    pub fn submit_regulatory(
        &mut self,
        closure: TaskClosure,
        priority: TaskPriority,
        timeout: Option<Duration>,
        metadata: HashMap<String, String>,
    ) -> String {
        self.submit(QueueClass::Regulatory, priority, closure, timeout, metadata)
    }

    /// Shorthand: reactive, high priority, tagged as human-sourced.
    pub fn submit_human_interaction(&mut self, closure: TaskClosure) -> String {
        let mut metadata = HashMap::new();
        metadata.insert("source".to_string(), "human".to_string());
        self.submit(
            QueueClass::Reactive,
            TaskPriority::High,
            closure,
            None,
            metadata,
        )
    }

    /// Shorthand: regulatory, background priority.
    pub fn submit_background(&mut self, closure: TaskClosure) -> String {
        self.submit(
            QueueClass::Regulatory,
            TaskPriority::Background,
            closure,
            None,
            HashMap::new(),
        )
    }

    fn submit(
        &mut self,
        queue: QueueClass,
        priority: TaskPriority,
        closure: TaskClosure,
        timeout: Option<Duration>,
        metadata: HashMap<String, String>,
    ) -> String {
        let timeout =
            timeout.unwrap_or_else(|| Duration::from_millis(self.config.default_timeout_ms));
        let task = Task::new(queue, priority, closure, timeout, metadata);
        let id = task.id.clone();

        self.bus.publish(
            Topic::TaskSubmitted,
            task_payload(&id, queue, priority, None, None, None),
        );

        match queue {
            QueueClass::Reactive => self.reactive.push(task),
            QueueClass::Regulatory => self.regulatory.push(task),
        }
        id
    }

    // ------------------------------------------------------------------
    // Stepper
    // ------------------------------------------------------------------

    /// One cooperative step: drain admissible work up to the capacity cap.
    ///
    /// Must run inside a tokio runtime; closures are spawned onto it.
    pub fn step(&mut self) {
        if self.stopped {
            return;
        }

        // Homeostasis gate: metrics are constant within one step.
        if self.config.homeostasis_enable {
            if let Some(sample) = &self.latest_metrics {
                if sample.cpu_pct > self.config.cpu_threshold_pct
                    || sample.memory_pct > self.config.memory_threshold_pct
                {
                    self.bus.publish(
                        Topic::HomeostasisAlert,
                        EventPayload::Homeostasis {
                            cpu_pct: sample.cpu_pct,
                            memory_pct: sample.memory_pct,
                        },
                    );
                    return;
                }
            }
        }

        loop {
            // Capacity gate.
            if self.running_count() >= self.config.max_concurrent {
                return;
            }

            // Dequeue: reactive head first, then regulatory.
            let task = match self.reactive.pop() {
                Some(task) => task,
                None => match self.regulatory.pop() {
                    Some(task) => task,
                    None => return,
                },
            };

            // Admission gate. A bounced task goes back to the front of its
            // queue: back-pressure without starvation-by-reordering.
            let snapshot = match self.hormones.lock() {
                Ok(field) => field.snapshot(),
                Err(_) => return,
            };
            if !admit(
                task.priority,
                &snapshot,
                self.config.fatigue_threshold,
                rand::random::<f64>(),
            ) {
                tracing::debug!(task = %task.id, priority = %task.priority, "admission bounced task");
                match task.queue {
                    QueueClass::Reactive => self.reactive.push_front(task),
                    QueueClass::Regulatory => self.regulatory.push_front(task),
                }
                return;
            }

            self.execute(task);
        }
    }

    fn execute(&mut self, task: Task) {
        let Task {
            id,
            queue,
            priority,
            closure,
            timeout,
            ..
        } = task;

        let cancel = CancelHandle::new();
        if let Ok(mut running) = self.running.lock() {
            running.insert(
                id.clone(),
                RunningEntry {
                    cancel: cancel.clone(),
                },
            );
        }
        self.bus
            .publish(Topic::TaskStarted, task_payload(&id, queue, priority, None, None, None));

        let bus = self.bus.clone();
        let hormones = self.hormones.clone();
        let running = self.running.clone();
        let future = closure();

        tokio::spawn(async move {
            enum Outcome {
                Completed(serde_json::Value),
                Failed(String),
                Timeout,
                Cancelled,
            }

            let started = std::time::Instant::now();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => Outcome::Cancelled,
                _ = tokio::time::sleep(timeout) => Outcome::Timeout,
                result = future => match result {
                    Ok(value) => Outcome::Completed(value),
                    Err(e) => Outcome::Failed(e.to_string()),
                },
            };
            if matches!(outcome, Outcome::Timeout) {
                // Deadline expiry implies cancellation of the closure.
                cancel.cancel();
            }
            let duration_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Outcome::Completed(value) => {
                    bus.publish(
                        Topic::TaskCompleted,
                        task_payload(&id, queue, priority, Some(value), None, Some(duration_ms)),
                    );
                    if let Ok(mut field) = hormones.lock() {
                        field.adjust(HormoneType::Reward, 0.05, "task success");
                    }
                }
                Outcome::Failed(error) => {
                    tracing::warn!(task = %id, error = %error, "task failed");
                    bus.publish(
                        Topic::TaskFailed,
                        task_payload(&id, queue, priority, None, Some(error), Some(duration_ms)),
                    );
                    if let Ok(mut field) = hormones.lock() {
                        field.adjust(HormoneType::Alert, 0.1, "task failure");
                        field.adjust(HormoneType::Stress, 0.08, "task failure");
                    }
                }
                Outcome::Timeout => {
                    tracing::warn!(task = %id, ?timeout, "task deadline expired");
                    bus.publish(
                        Topic::TaskTimeout,
                        task_payload(&id, queue, priority, None, None, Some(duration_ms)),
                    );
                }
                Outcome::Cancelled => {
                    bus.publish(
                        Topic::TaskCancelled,
                        task_payload(&id, queue, priority, None, None, Some(duration_ms)),
                    );
                }
            }

            if let Ok(mut field) = hormones.lock() {
                field.adjust(HormoneType::Fatigue, 0.01, "task executed");
            }
            if let Ok(mut running) = running.lock() {
                running.remove(&id);
            }
        });
    }

    // ------------------------------------------------------------------
    // Cancellation / shutdown
    // ------------------------------------------------------------------

    /// Cancel a running or queued task. Returns whether anything happened.
    /// A running task observes cancellation at its next suspension point and
    /// emits `task:cancelled` itself.
    pub fn cancel(&mut self, id: &str) -> bool {
        if let Ok(running) = self.running.lock() {
            if let Some(entry) = running.get(id) {
                entry.cancel.cancel();
                return true;
            }
        }

        if let Some(task) = self
            .reactive
            .remove(id)
            .or_else(|| self.regulatory.remove(id))
        {
            self.bus.publish(
                Topic::TaskCancelled,
                task_payload(&task.id, task.queue, task.priority, None, None, None),
            );
            return true;
        }
        false
    }

    /// Stop the scheduler: cancel all running tasks and clear both queues,
    /// emitting `task:cancelled` for each queued task.
    pub fn stop(&mut self) {
        self.stopped = true;

        if let Ok(running) = self.running.lock() {
            for entry in running.values() {
                entry.cancel.cancel();
            }
        }
        for task in self
            .reactive
            .drain()
            .into_iter()
            .chain(self.regulatory.drain())
        {
            self.bus.publish(
                Topic::TaskCancelled,
                task_payload(&task.id, task.queue, task.priority, None, None, None),
            );
        }
        tracing::info!("scheduler stopped");
    }

    /// Whether `stop` has been called.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Outstanding executing closures.
    pub fn running_count(&self) -> usize {
        self.running.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Queued tasks across both queues.
    pub fn queued_count(&self) -> usize {
        self.reactive.len() + self.regulatory.len()
    }
}

fn task_payload(
    id: &str,
    queue: QueueClass,
    priority: TaskPriority,
    result: Option<serde_json::Value>,
    error: Option<String>,
    duration_ms: Option<u64>,
) -> EventPayload {
    EventPayload::Task {
        id: id.to_string(),
        queue: queue.as_str().to_string(),
        priority: priority.as_str().to_string(),
        result,
        error,
        duration_ms,
    }
}
