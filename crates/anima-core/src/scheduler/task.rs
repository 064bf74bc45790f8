//! Tasks and Cancellation
//!
//! A task is a boxed async closure plus scheduling metadata. Every running
//! task holds exactly one [`CancelHandle`]; cancellation is observed at the
//! task's next suspension point, it is never a control-flow exception.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::Result;

// ============================================================================
// QUEUE CLASS AND PRIORITY
// ============================================================================

/// Which queue a task travels through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueClass {
    /// Fast path: user-facing, interactive work
    Reactive,
    /// Slow path: background, maintenance, exploratory work
    Regulatory,
}

impl QueueClass {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueClass::Reactive => "reactive",
            QueueClass::Regulatory => "regulatory",
        }
    }
}

impl std::fmt::Display for QueueClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task priority. Lower discriminant runs first; FIFO within a priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Must run as soon as possible
    Critical = 0,
    /// Important interactive work
    High = 1,
    /// Default
    Normal = 2,
    /// Deferred work
    Low = 3,
    /// Opportunistic work
    Background = 4,
}

impl TaskPriority {
    /// All priorities, strongest first.
    pub const ALL: [TaskPriority; 5] = [
        TaskPriority::Critical,
        TaskPriority::High,
        TaskPriority::Normal,
        TaskPriority::Low,
        TaskPriority::Background,
    ];

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Critical => "critical",
            TaskPriority::High => "high",
            TaskPriority::Normal => "normal",
            TaskPriority::Low => "low",
            TaskPriority::Background => "background",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CANCELLATION
// ============================================================================

/// Cooperative cancellation handle.
///
/// Clones share the same state. Designed for one primary waiter (the
/// scheduler's execution select); [`CancelHandle::cancel`] leaves a stored
/// permit so a waiter that has not yet registered still observes it.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelHandle {
    /// Fresh, uncancelled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
        self.inner.notify.notify_one();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once cancellation is requested.
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            self.inner.notify.notified().await;
        }
    }
}

// ============================================================================
// TASK
// ============================================================================

/// Output of a task closure.
pub type TaskOutput = Result<serde_json::Value>;

/// The boxed future a task closure produces.
pub type TaskFuture = Pin<Box<dyn Future<Output = TaskOutput> + Send>>;

/// A task closure: invoked once when the task starts executing.
pub type TaskClosure = Box<dyn FnOnce() -> TaskFuture + Send>;

static TASK_SEQ: AtomicU64 = AtomicU64::new(0);

/// Generate a task id: monotonic sequence plus a random suffix.
pub fn next_task_id() -> String {
    let seq = TASK_SEQ.fetch_add(1, Ordering::Relaxed);
    let suffix: u16 = rand::random();
    format!("task-{seq:06}-{suffix:04x}")
}

/// A schedulable unit of work.
pub struct Task {
    /// Unique identifier
    pub id: String,
    /// Queue class
    pub queue: QueueClass,
    /// Priority within the queue
    pub priority: TaskPriority,
    /// The work itself
    pub closure: TaskClosure,
    /// Deadline measured from execution start
    pub timeout: Duration,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Caller-supplied metadata
    pub metadata: HashMap<String, String>,
}

impl Task {
    /// Build a task with a fresh id.
    pub fn new(
        queue: QueueClass,
        priority: TaskPriority,
        closure: TaskClosure,
        timeout: Duration,
        metadata: HashMap<String, String>,
    ) -> Self {
        Self {
            id: next_task_id(),
            queue,
            priority,
            closure,
            timeout,
            created_at: Utc::now(),
            metadata,
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("queue", &self.queue)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}
