//! Typed Event Bus
//!
//! Named topics carried over a bounded `tokio::sync::broadcast` channel.
//! Ordering is guaranteed within a topic because every publisher runs on the
//! cooperative stepper; across topics there is no guarantee beyond causality
//! through direct calls.
//!
//! The bus keeps a bounded in-memory history ring so callers (and tests) can
//! inspect recent traffic without holding a live subscription.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Default broadcast buffer size
pub const DEFAULT_BUS_CAPACITY: usize = 256;

/// Default history ring size
pub const DEFAULT_HISTORY_SIZE: usize = 1024;

// ============================================================================
// TOPICS
// ============================================================================

/// Event topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Topic {
    /// A task was enqueued
    TaskSubmitted,
    /// A task began executing
    TaskStarted,
    /// A task finished successfully
    TaskCompleted,
    /// A task closure failed
    TaskFailed,
    /// A task hit its deadline
    TaskTimeout,
    /// A task was cancelled (queued or running)
    TaskCancelled,
    /// Back-pressure: metrics exceeded homeostasis thresholds
    HomeostasisAlert,
    /// A hormone level changed
    HormoneChanged,
    /// A memory record was stored
    MemoryRecorded,
    /// An episodic record was promoted to semantic
    MemoryConsolidated,
    /// A record fell below the salience threshold
    MemoryForgotten,
    /// A capability was invoked
    CapabilityUsed,
    /// A reflection trigger fired
    ReflectionFired,
    /// Reflection produced a proposal
    ReflectionProposed,
    /// An approved proposal was executed
    ReflectionExecuted,
    /// The safety envelope found a violation
    SafetyViolation,
    /// The safety envelope entered lockdown
    Lockdown,
    /// A prompt variant became active
    VariantActivated,
    /// A prompt variant was retired
    VariantRetired,
}

impl Topic {
    /// Wire name of the topic.
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::TaskSubmitted => "task:submitted",
            Topic::TaskStarted => "task:started",
            Topic::TaskCompleted => "task:completed",
            Topic::TaskFailed => "task:failed",
            Topic::TaskTimeout => "task:timeout",
            Topic::TaskCancelled => "task:cancelled",
            Topic::HomeostasisAlert => "scheduler:homeostasis-alert",
            Topic::HormoneChanged => "hormone:changed",
            Topic::MemoryRecorded => "memory:recorded",
            Topic::MemoryConsolidated => "memory:consolidated",
            Topic::MemoryForgotten => "memory:forgotten",
            Topic::CapabilityUsed => "capability:used",
            Topic::ReflectionFired => "reflection:fired",
            Topic::ReflectionProposed => "reflection:proposed",
            Topic::ReflectionExecuted => "reflection:executed",
            Topic::SafetyViolation => "safety:violation",
            Topic::Lockdown => "safety:lockdown",
            Topic::VariantActivated => "variant:activated",
            Topic::VariantRetired => "variant:retired",
        }
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// EVENT PAYLOADS
// ============================================================================

/// Event payload, one variant per topic family.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum EventPayload {
    /// Task lifecycle events
    Task {
        /// Task identifier
        id: String,
        /// Queue class ("reactive" / "regulatory")
        queue: String,
        /// Priority name
        priority: String,
        /// Closure result (completed only)
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        /// Error string (failed only)
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        /// Wall time spent executing, if the task ran
        #[serde(skip_serializing_if = "Option::is_none")]
        duration_ms: Option<u64>,
    },
    /// Homeostasis back-pressure
    Homeostasis {
        /// Sampled CPU percent
        cpu_pct: f64,
        /// Sampled memory percent
        memory_pct: f64,
    },
    /// Hormone level change
    Hormone {
        /// Hormone name
        hormone: String,
        /// Applied delta after clamping
        delta: f64,
        /// Resulting level
        level: f64,
        /// Reason string supplied by the caller
        reason: String,
    },
    /// Memory store events
    Memory {
        /// Record identifier
        id: String,
        /// Record type tag
        memory_type: String,
        /// Extra detail (e.g. promoted-to id, salience at forgetting)
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },
    /// Capability invocation
    Capability {
        /// Capability name
        name: String,
        /// Whether the call succeeded
        success: bool,
        /// Observed latency
        latency_ms: u64,
    },
    /// Reflection lifecycle
    Reflection {
        /// Trigger or proposal identifier
        id: String,
        /// Trigger kind or proposal state
        detail: String,
    },
    /// Safety violation or lockdown
    Safety {
        /// Layer that reported ("identity", "vitals", "adversarial", "sacred-core")
        layer: String,
        /// Severity in [0,1]
        severity: f64,
        /// Human-readable message
        message: String,
    },
    /// Variant state changes
    Variant {
        /// Variant namespace
        namespace: String,
        /// Variant name
        name: String,
    },
}

/// A published event: topic + timestamp + payload.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    /// Topic the event was published on
    pub topic: Topic,
    /// Publication time
    pub timestamp: DateTime<Utc>,
    /// Typed payload
    pub payload: EventPayload,
}

impl Event {
    /// Build an event stamped now.
    pub fn new(topic: Topic, payload: EventPayload) -> Self {
        Self {
            topic,
            timestamp: Utc::now(),
            payload,
        }
    }
}

// ============================================================================
// EVENT BUS
// ============================================================================

/// Bounded broadcast bus with a history ring.
///
/// Cloning is cheap; clones publish into the same channel and share the same
/// history. Publishing never blocks and never fails: with no subscribers the
/// event is still recorded in history.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Arc<Event>>,
    history: Arc<Mutex<VecDeque<Arc<Event>>>>,
    history_size: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY, DEFAULT_HISTORY_SIZE)
    }
}

impl EventBus {
    /// Create a bus with the given broadcast buffer and history sizes.
    pub fn new(capacity: usize, history_size: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            history: Arc::new(Mutex::new(VecDeque::with_capacity(history_size.min(64)))),
            history_size: history_size.max(1),
        }
    }

    /// Publish an event on a topic. Returns the published event.
    pub fn publish(&self, topic: Topic, payload: EventPayload) -> Arc<Event> {
        let event = Arc::new(Event::new(topic, payload));
        tracing::debug!(topic = %topic, "event published");

        if let Ok(mut history) = self.history.lock() {
            history.push_back(event.clone());
            while history.len() > self.history_size {
                history.pop_front();
            }
        }

        // No subscribers is fine; history still records the event.
        let _ = self.tx.send(event.clone());
        event
    }

    /// Subscribe to the full stream. Callers filter by topic.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Event>> {
        self.tx.subscribe()
    }

    /// Recent events, oldest first.
    pub fn history(&self) -> Vec<Arc<Event>> {
        self.history
            .lock()
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Recent events on one topic, oldest first.
    pub fn history_for(&self, topic: Topic) -> Vec<Arc<Event>> {
        self.history
            .lock()
            .map(|h| h.iter().filter(|e| e.topic == topic).cloned().collect())
            .unwrap_or_default()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
