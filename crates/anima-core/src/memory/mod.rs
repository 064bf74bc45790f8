//! Memory Store and Forgetting
//!
//! Stratified memory with four record kinds:
//!
//! - **Episodic**: events with optional context and outcome
//! - **Semantic**: deduplicated facts (content-hash identity)
//! - **Procedural**: skills as ordered steps with a success rate
//! - **Reflective**: insights produced by the reflection engine
//!
//! Records decay by a composite salience score; stale low-salience records
//! are tombstoned (invisible to queries, retained until compaction).
//! Frequently-accessed episodic records are consolidated into semantic
//! facts.

pub mod salience;
mod store;

pub use salience::{
    next_review_interval_hours, retention, review_count, salience, should_forget,
    DEFAULT_FORGET_THRESHOLD,
};
pub use store::{MemoryConfig, MemoryStore, RetrievalWeights};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ============================================================================
// MEMORY TYPES
// ============================================================================

/// Memory stratum tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryType {
    /// An event with optional context and outcome
    Episodic,
    /// A deduplicated fact
    Semantic,
    /// A skill with ordered steps
    Procedural,
    /// An insight from reflection
    Reflective,
}

impl MemoryType {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Episodic => "episodic",
            MemoryType::Semantic => "semantic",
            MemoryType::Procedural => "procedural",
            MemoryType::Reflective => "reflective",
        }
    }

    /// Parse from string name.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "episodic" => Some(MemoryType::Episodic),
            "semantic" => Some(MemoryType::Semantic),
            "procedural" => Some(MemoryType::Procedural),
            "reflective" => Some(MemoryType::Reflective),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// PAYLOADS
// ============================================================================

/// Typed memory content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum MemoryPayload {
    /// An event that happened
    Episodic {
        /// What happened
        event: String,
        /// Surrounding context, if captured
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<String>,
        /// How it turned out, if known
        #[serde(skip_serializing_if = "Option::is_none")]
        outcome: Option<String>,
    },
    /// A fact believed about the world
    Semantic {
        /// The fact itself
        fact: String,
        /// Category path
        category: String,
        /// Belief strength in [0, 1]
        confidence: f64,
        /// Whether the fact has been externally verified
        verified: bool,
    },
    /// A skill and how to perform it
    Procedural {
        /// Skill name
        skill: String,
        /// Ordered steps
        steps: Vec<String>,
        /// Observed success rate in [0, 1]
        success_rate: f64,
    },
    /// An insight produced by reflection
    Reflective {
        /// The insight text
        insight: String,
        /// Where it came from (trigger, analysis pass)
        source: String,
        /// Confidence in [0, 1]
        confidence: f64,
    },
}

impl MemoryPayload {
    /// The stratum this payload belongs to.
    pub fn memory_type(&self) -> MemoryType {
        match self {
            MemoryPayload::Episodic { .. } => MemoryType::Episodic,
            MemoryPayload::Semantic { .. } => MemoryType::Semantic,
            MemoryPayload::Procedural { .. } => MemoryType::Procedural,
            MemoryPayload::Reflective { .. } => MemoryType::Reflective,
        }
    }

    /// Searchable text of the payload.
    pub fn text(&self) -> String {
        match self {
            MemoryPayload::Episodic {
                event,
                context,
                outcome,
            } => {
                let mut text = event.clone();
                if let Some(c) = context {
                    text.push(' ');
                    text.push_str(c);
                }
                if let Some(o) = outcome {
                    text.push(' ');
                    text.push_str(o);
                }
                text
            }
            MemoryPayload::Semantic { fact, category, .. } => format!("{fact} {category}"),
            MemoryPayload::Procedural { skill, steps, .. } => {
                format!("{skill} {}", steps.join(" "))
            }
            MemoryPayload::Reflective {
                insight, source, ..
            } => format!("{insight} {source}"),
        }
    }
}

/// Content hash identifying a semantic fact: SHA-256 over the normalized
/// fact text (lowercased, whitespace-collapsed).
pub fn semantic_content_hash(fact: &str) -> String {
    let normalized = fact.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    let digest = Sha256::digest(normalized.as_bytes());
    hex::encode(digest)
}

// ============================================================================
// RECORD
// ============================================================================

/// A stored memory record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryRecord {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Stratum tag, derived from the payload
    pub memory_type: MemoryType,
    /// Typed content
    pub payload: MemoryPayload,
    /// Importance in [0, 1]
    pub importance: f64,
    /// Emotional weight in [0, 2]; 1.0 is neutral
    pub emotional_weight: f64,
    /// When the record was created
    pub created_at: DateTime<Utc>,
    /// When the record was last directly accessed
    pub last_access: DateTime<Utc>,
    /// Direct access count
    pub access_count: u32,
    /// Optional caller-supplied embedding vector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Tags for categorization
    pub tags: Vec<String>,
    /// Tombstoned records are invisible to queries, kept until compaction
    pub tombstoned: bool,
}

impl MemoryRecord {
    /// Hours since the record was last accessed.
    pub fn hours_since_access(&self, now: DateTime<Utc>) -> f64 {
        (now - self.last_access).num_seconds().max(0) as f64 / 3600.0
    }

    /// Hours since the record was created.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_seconds().max(0) as f64 / 3600.0
    }

    /// Current salience score.
    pub fn salience(&self, now: DateTime<Utc>) -> f64 {
        salience::salience(
            self.importance,
            self.hours_since_access(now),
            self.access_count,
        )
    }

    /// Hours until the next spaced-repetition review.
    pub fn next_review_hours(&self) -> f64 {
        salience::next_review_interval_hours(salience::review_count(self.access_count))
    }
}

// ============================================================================
// OPTIONS / QUERIES / REPORTS
// ============================================================================

/// Common optional fields for all write operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOptions {
    /// Importance in [0, 1]
    pub importance: f64,
    /// Emotional weight in [0, 2]
    pub emotional_weight: f64,
    /// Tags
    pub tags: Vec<String>,
    /// Optional embedding
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Default for RecordOptions {
    fn default() -> Self {
        Self {
            importance: 0.5,
            emotional_weight: 1.0,
            tags: vec![],
            embedding: None,
        }
    }
}

/// Structured query over stored records.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    /// Restrict to one stratum
    pub memory_type: Option<MemoryType>,
    /// Records must carry all of these tags
    pub tags: Vec<String>,
    /// Restrict to records created inside this range
    pub time_range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// Minimum importance
    pub min_importance: Option<f64>,
}

/// A retrieval cue for relevance-ranked recall.
#[derive(Debug, Clone)]
pub struct RetrievalCue {
    /// Query text (keyword fallback when embeddings are absent)
    pub text: String,
    /// Optional query embedding
    pub embedding: Option<Vec<f32>>,
    /// Number of results to return
    pub k: usize,
}

/// A record with its retrieval score.
#[derive(Debug, Clone)]
pub struct ScoredMemory {
    /// The matched record (immutable view)
    pub record: MemoryRecord,
    /// Composite relevance score
    pub score: f64,
}

/// Store-wide statistics, consumed by the reflection analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    /// All records including tombstones
    pub total: usize,
    /// Visible records
    pub live: usize,
    /// Tombstoned records awaiting compaction
    pub tombstoned: usize,
    /// Visible episodic records
    pub episodic: usize,
    /// Visible semantic records
    pub semantic: usize,
    /// Visible procedural records
    pub procedural: usize,
    /// Visible reflective records
    pub reflective: usize,
    /// Mean importance of visible records
    pub average_importance: f64,
    /// Mean salience of visible records
    pub average_salience: f64,
    /// Visible records currently below the forget threshold
    pub forgettable: usize,
}

/// Result of one maintenance pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaintenanceReport {
    /// Records whose salience was evaluated
    pub scanned: usize,
    /// Records tombstoned for low salience
    pub forgotten: Vec<String>,
    /// (episodic id, semantic id) promotions
    pub consolidated: Vec<(String, String)>,
    /// Records tombstoned to enforce the soft capacity cap
    pub evicted_for_capacity: Vec<String>,
}
