//! Memory Store Implementation
//!
//! In-memory record storage with exclusive ownership: queries hand out
//! cloned, immutable views. Direct `get` bumps access counts; ranked
//! retrieval does not (indirect hits are not deliberate accesses).

use chrono::{DateTime, Utc};
use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use uuid::Uuid;

use super::{
    salience, semantic_content_hash, MaintenanceReport, MemoryPayload, MemoryQuery, MemoryRecord,
    MemoryStats, MemoryType, RecordOptions, RetrievalCue, ScoredMemory,
};
use crate::events::{EventBus, EventPayload, Topic};

/// Retrieval-query cache capacity.
const RETRIEVAL_CACHE_SIZE: usize = 100;

// ============================================================================
// CONFIG
// ============================================================================

/// Weights for relevance-ranked retrieval. Must sum to 1 for a normalized
/// score, but the store does not enforce that.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalWeights {
    /// Semantic similarity weight
    pub semantic: f64,
    /// Temporal proximity weight (24h exponential scale)
    pub temporal: f64,
    /// Importance weight
    pub importance: f64,
}

impl Default for RetrievalWeights {
    fn default() -> Self {
        Self {
            semantic: 0.4,
            temporal: 0.3,
            importance: 0.3,
        }
    }
}

/// Configuration for the memory store.
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Soft cap on live records; exceeding it evicts lowest-salience records
    pub max_count: usize,
    /// Salience threshold below which idle records are tombstoned
    pub prune_threshold: f64,
    /// Retrieval ranking weights
    pub retrieval: RetrievalWeights,
    /// Maintenance cadence driven by the stepper
    pub maintenance_interval_ms: u64,
    /// Records idle for less than this many hours are not salience-checked
    pub min_idle_hours: f64,
    /// Consolidation: minimum record age
    pub consolidation_min_age_hours: f64,
    /// Consolidation: minimum direct accesses
    pub consolidation_min_access: u32,
    /// Consolidation: record must have been accessed within this window
    pub consolidation_recency_hours: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_count: 10_000,
            prune_threshold: salience::DEFAULT_FORGET_THRESHOLD,
            retrieval: RetrievalWeights::default(),
            maintenance_interval_ms: 60_000,
            min_idle_hours: 1.0,
            consolidation_min_age_hours: 24.0,
            consolidation_min_access: 3,
            consolidation_recency_hours: 24.0,
        }
    }
}

// ============================================================================
// STORE
// ============================================================================

/// The memory store. Sole owner of record storage.
pub struct MemoryStore {
    records: HashMap<String, MemoryRecord>,
    /// content hash -> semantic record id
    semantic_index: HashMap<String, String>,
    config: MemoryConfig,
    bus: EventBus,
    /// (cue text | k) -> (store version, scored ids); invalidated by version
    retrieval_cache: LruCache<String, (u64, Vec<(String, f64)>)>,
    version: u64,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new(config: MemoryConfig, bus: EventBus) -> Self {
        Self {
            records: HashMap::new(),
            semantic_index: HashMap::new(),
            config,
            bus,
            retrieval_cache: LruCache::new(
                NonZeroUsize::new(RETRIEVAL_CACHE_SIZE).expect("cache size is non-zero"),
            ),
            version: 0,
        }
    }

    /// Current configuration.
    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }

    /// Update the prune threshold (hot-reloadable via reflection).
    pub fn set_prune_threshold(&mut self, threshold: f64) {
        self.config.prune_threshold = threshold.clamp(0.0, 1.0);
    }

    /// Update the maintenance cadence (hot-reloadable via reflection).
    pub fn set_maintenance_interval_ms(&mut self, interval_ms: u64) {
        self.config.maintenance_interval_ms = interval_ms.max(1);
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Record an episodic memory.
    pub fn record_episodic(
        &mut self,
        event: impl Into<String>,
        context: Option<String>,
        outcome: Option<String>,
        opts: RecordOptions,
    ) -> MemoryRecord {
        self.insert(
            MemoryPayload::Episodic {
                event: event.into(),
                context,
                outcome,
            },
            opts,
        )
    }

    /// Record a semantic fact. Facts are deduplicated by content hash: an
    /// existing live fact is returned (with importance raised to the max of
    /// the two) instead of a duplicate.
    pub fn record_semantic(
        &mut self,
        fact: impl Into<String>,
        category: impl Into<String>,
        confidence: f64,
        verified: bool,
        opts: RecordOptions,
    ) -> MemoryRecord {
        let fact = fact.into();
        let hash = semantic_content_hash(&fact);

        if let Some(existing_id) = self.semantic_index.get(&hash).cloned() {
            if let Some(existing) = self.records.get_mut(&existing_id) {
                if !existing.tombstoned {
                    existing.importance = existing.importance.max(opts.importance);
                    return existing.clone();
                }
            }
        }

        let record = self.insert(
            MemoryPayload::Semantic {
                fact,
                category: category.into(),
                confidence: confidence.clamp(0.0, 1.0),
                verified,
            },
            opts,
        );
        self.semantic_index.insert(hash, record.id.clone());
        record
    }

    /// Record a procedural skill.
    pub fn record_procedural(
        &mut self,
        skill: impl Into<String>,
        steps: Vec<String>,
        success_rate: f64,
        opts: RecordOptions,
    ) -> MemoryRecord {
        self.insert(
            MemoryPayload::Procedural {
                skill: skill.into(),
                steps,
                success_rate: success_rate.clamp(0.0, 1.0),
            },
            opts,
        )
    }

    /// Record a reflective insight.
    pub fn record_reflective(
        &mut self,
        insight: impl Into<String>,
        source: impl Into<String>,
        confidence: f64,
        opts: RecordOptions,
    ) -> MemoryRecord {
        self.insert(
            MemoryPayload::Reflective {
                insight: insight.into(),
                source: source.into(),
                confidence: confidence.clamp(0.0, 1.0),
            },
            opts,
        )
    }

    fn insert(&mut self, payload: MemoryPayload, opts: RecordOptions) -> MemoryRecord {
        let now = Utc::now();
        let record = MemoryRecord {
            id: Uuid::new_v4().to_string(),
            memory_type: payload.memory_type(),
            payload,
            importance: opts.importance.clamp(0.0, 1.0),
            emotional_weight: opts.emotional_weight.clamp(0.0, 2.0),
            created_at: now,
            last_access: now,
            access_count: 0,
            embedding: opts.embedding,
            tags: opts.tags,
            tombstoned: false,
        };

        self.records.insert(record.id.clone(), record.clone());
        self.version += 1;
        self.bus.publish(
            Topic::MemoryRecorded,
            EventPayload::Memory {
                id: record.id.clone(),
                memory_type: record.memory_type.as_str().to_string(),
                detail: None,
            },
        );
        record
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Fetch one record by id, bumping its access count and last-access time.
    /// Tombstoned records are invisible.
    pub fn get(&mut self, id: &str) -> Option<MemoryRecord> {
        let record = self.records.get_mut(id)?;
        if record.tombstoned {
            return None;
        }
        record.access_count += 1;
        record.last_access = Utc::now();
        Some(record.clone())
    }

    /// Non-bumping read (internal observers and tests).
    pub fn peek(&self, id: &str) -> Option<&MemoryRecord> {
        self.records.get(id).filter(|r| !r.tombstoned)
    }

    /// Structured query. Returns immutable views, newest first.
    pub fn query(&self, query: &MemoryQuery) -> Vec<MemoryRecord> {
        let mut matches: Vec<MemoryRecord> = self
            .records
            .values()
            .filter(|r| !r.tombstoned)
            .filter(|r| query.memory_type.is_none_or(|t| r.memory_type == t))
            .filter(|r| query.tags.iter().all(|t| r.tags.contains(t)))
            .filter(|r| {
                query
                    .time_range
                    .is_none_or(|(from, to)| r.created_at >= from && r.created_at <= to)
            })
            .filter(|r| query.min_importance.is_none_or(|min| r.importance >= min))
            .cloned()
            .collect();
        matches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matches
    }

    /// Full-text keyword search over payload text. Ranked by match count,
    /// then importance.
    pub fn search_by_keywords(&self, terms: &[&str]) -> Vec<MemoryRecord> {
        let terms: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
        if terms.is_empty() {
            return vec![];
        }

        let mut scored: Vec<(usize, MemoryRecord)> = self
            .records
            .values()
            .filter(|r| !r.tombstoned)
            .filter_map(|r| {
                let text = r.payload.text().to_lowercase();
                let hits = terms.iter().filter(|t| text.contains(t.as_str())).count();
                (hits > 0).then(|| (hits, r.clone()))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.0.cmp(&a.0).then_with(|| {
                b.1.importance
                    .partial_cmp(&a.1.importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
        });
        scored.into_iter().map(|(_, r)| r).collect()
    }

    /// Relevance-ranked retrieval: weighted sum of semantic similarity,
    /// temporal proximity (24h exponential scale on last access) and
    /// importance. Ties break by importance, then recency. Does not bump
    /// access counts.
    pub fn retrieve_relevant(&mut self, cue: &RetrievalCue) -> Vec<ScoredMemory> {
        let cache_key = (cue.embedding.is_none()).then(|| format!("{}|{}", cue.text, cue.k));
        if let Some(key) = &cache_key {
            if let Some((version, hits)) = self.retrieval_cache.get(key) {
                if *version == self.version {
                    return hits
                        .iter()
                        .filter_map(|(id, score)| {
                            self.records.get(id).map(|r| ScoredMemory {
                                record: r.clone(),
                                score: *score,
                            })
                        })
                        .collect();
                }
            }
        }

        let now = Utc::now();
        let weights = self.config.retrieval;
        let mut scored: Vec<ScoredMemory> = self
            .records
            .values()
            .filter(|r| !r.tombstoned)
            .map(|r| {
                let similarity = match (&cue.embedding, &r.embedding) {
                    (Some(q), Some(e)) => cosine_similarity(q, e),
                    _ => keyword_overlap(&cue.text, &r.payload.text()),
                };
                let temporal = (-r.hours_since_access(now) / 24.0).exp();
                let score = weights.semantic * similarity
                    + weights.temporal * temporal
                    + weights.importance * r.importance;
                ScoredMemory {
                    record: r.clone(),
                    score,
                }
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.record
                        .importance
                        .partial_cmp(&a.record.importance)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| b.record.last_access.cmp(&a.record.last_access))
        });
        scored.truncate(cue.k);

        if let Some(key) = cache_key {
            let hits = scored
                .iter()
                .map(|s| (s.record.id.clone(), s.score))
                .collect();
            self.retrieval_cache.put(key, (self.version, hits));
        }
        scored
    }

    // ------------------------------------------------------------------
    // Consolidation
    // ------------------------------------------------------------------

    /// Whether an episodic record is eligible for promotion: old enough,
    /// accessed often enough, and accessed recently.
    pub fn should_consolidate(&self, id: &str, now: DateTime<Utc>) -> bool {
        match self.records.get(id) {
            Some(r) => {
                !r.tombstoned
                    && r.memory_type == MemoryType::Episodic
                    && r.age_hours(now) >= self.config.consolidation_min_age_hours
                    && r.access_count >= self.config.consolidation_min_access
                    && r.hours_since_access(now) <= self.config.consolidation_recency_hours
            }
            None => false,
        }
    }

    /// Ids of all currently-eligible episodic records.
    pub fn consolidation_candidates(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut candidates: Vec<String> = self
            .records
            .keys()
            .filter(|id| self.should_consolidate(id, now))
            .cloned()
            .collect();
        candidates.sort();
        candidates
    }

    /// Promote an episodic record to a semantic fact.
    ///
    /// The fact carries the event text, the original tags, and the greater
    /// of the original importance and 0.6; it starts unverified. The
    /// episodic original is tombstoned. Consolidating the same record twice
    /// yields the same semantic record (content-hash dedup).
    pub fn consolidate(&mut self, id: &str, now: DateTime<Utc>) -> Option<MemoryRecord> {
        let source = self.records.get(id)?.clone();
        let event_text = match &source.payload {
            MemoryPayload::Episodic { event, .. } => event.clone(),
            _ => return None,
        };

        // Dedup path: a matching fact already exists (e.g. second call).
        let hash = semantic_content_hash(&event_text);
        if let Some(existing_id) = self.semantic_index.get(&hash).cloned() {
            if let Some(existing) = self.records.get(&existing_id) {
                if !existing.tombstoned {
                    let existing = existing.clone();
                    self.tombstone_for_consolidation(id, &existing.id);
                    return Some(existing);
                }
            }
        }

        if !self.should_consolidate(id, now) {
            return None;
        }

        let promoted = self.record_semantic(
            event_text,
            "consolidated",
            0.6,
            false,
            RecordOptions {
                importance: source.importance.max(0.6),
                emotional_weight: source.emotional_weight,
                tags: source.tags.clone(),
                embedding: source.embedding.clone(),
            },
        );
        self.tombstone_for_consolidation(id, &promoted.id);
        Some(promoted)
    }

    fn tombstone_for_consolidation(&mut self, episodic_id: &str, semantic_id: &str) {
        if let Some(record) = self.records.get_mut(episodic_id) {
            if !record.tombstoned {
                record.tombstoned = true;
                self.version += 1;
                self.bus.publish(
                    Topic::MemoryConsolidated,
                    EventPayload::Memory {
                        id: episodic_id.to_string(),
                        memory_type: MemoryType::Episodic.as_str().to_string(),
                        detail: Some(semantic_id.to_string()),
                    },
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Periodic maintenance: salience-check idle records, tombstone the
    /// forgettable, promote eligible episodic records, and enforce the soft
    /// capacity cap.
    pub fn maintenance_tick(&mut self, now: DateTime<Utc>) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        // Salience pass over idle records.
        let idle: Vec<String> = self
            .records
            .values()
            .filter(|r| !r.tombstoned && r.hours_since_access(now) > self.config.min_idle_hours)
            .map(|r| r.id.clone())
            .collect();
        report.scanned = idle.len();

        for id in idle {
            let Some(record) = self.records.get(&id) else {
                continue;
            };
            let salience = record.salience(now);
            if salience::should_forget(salience, self.config.prune_threshold) {
                if let Some(record) = self.records.get_mut(&id) {
                    record.tombstoned = true;
                }
                self.version += 1;
                self.bus.publish(
                    Topic::MemoryForgotten,
                    EventPayload::Memory {
                        id: id.clone(),
                        memory_type: self.records[&id].memory_type.as_str().to_string(),
                        detail: Some(format!("salience {salience:.4}")),
                    },
                );
                report.forgotten.push(id);
            }
        }

        // Consolidation pass.
        for id in self.consolidation_candidates(now) {
            if let Some(promoted) = self.consolidate(&id, now) {
                report.consolidated.push((id, promoted.id));
            }
        }

        // Capacity pass: evict lowest-salience live records over the cap.
        let live: usize = self.records.values().filter(|r| !r.tombstoned).count();
        if live > self.config.max_count {
            let mut by_salience: Vec<(f64, String)> = self
                .records
                .values()
                .filter(|r| !r.tombstoned)
                .map(|r| (r.salience(now), r.id.clone()))
                .collect();
            by_salience
                .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

            for (salience, id) in by_salience.into_iter().take(live - self.config.max_count) {
                if let Some(record) = self.records.get_mut(&id) {
                    record.tombstoned = true;
                }
                self.version += 1;
                self.bus.publish(
                    Topic::MemoryForgotten,
                    EventPayload::Memory {
                        id: id.clone(),
                        memory_type: self.records[&id].memory_type.as_str().to_string(),
                        detail: Some(format!("capacity eviction, salience {salience:.4}")),
                    },
                );
                report.evicted_for_capacity.push(id);
            }
        }

        if !report.forgotten.is_empty() || !report.consolidated.is_empty() {
            tracing::debug!(
                scanned = report.scanned,
                forgotten = report.forgotten.len(),
                consolidated = report.consolidated.len(),
                "memory maintenance pass"
            );
        }
        report
    }

    /// Store-wide statistics.
    pub fn stats(&self, now: DateTime<Utc>) -> MemoryStats {
        let mut stats = MemoryStats {
            total: self.records.len(),
            live: 0,
            tombstoned: 0,
            episodic: 0,
            semantic: 0,
            procedural: 0,
            reflective: 0,
            average_importance: 0.0,
            average_salience: 0.0,
            forgettable: 0,
        };

        let mut importance_sum = 0.0;
        let mut salience_sum = 0.0;
        for record in self.records.values() {
            if record.tombstoned {
                stats.tombstoned += 1;
                continue;
            }
            stats.live += 1;
            match record.memory_type {
                MemoryType::Episodic => stats.episodic += 1,
                MemoryType::Semantic => stats.semantic += 1,
                MemoryType::Procedural => stats.procedural += 1,
                MemoryType::Reflective => stats.reflective += 1,
            }
            importance_sum += record.importance;
            let salience = record.salience(now);
            salience_sum += salience;
            if salience::should_forget(salience, self.config.prune_threshold) {
                stats.forgettable += 1;
            }
        }

        if stats.live > 0 {
            stats.average_importance = importance_sum / stats.live as f64;
            stats.average_salience = salience_sum / stats.live as f64;
        }
        stats
    }

    /// Number of live records.
    pub fn live_count(&self) -> usize {
        self.records.values().filter(|r| !r.tombstoned).count()
    }

    // ------------------------------------------------------------------
    // Snapshot support
    // ------------------------------------------------------------------

    /// Export all records (including tombstones) for the snapshot store.
    pub fn export(&self) -> Vec<MemoryRecord> {
        let mut records: Vec<MemoryRecord> = self.records.values().cloned().collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    /// Restore from exported records, rebuilding the semantic index.
    pub fn restore(&mut self, records: Vec<MemoryRecord>) {
        self.records.clear();
        self.semantic_index.clear();
        for record in records {
            if let MemoryPayload::Semantic { fact, .. } = &record.payload {
                if !record.tombstoned {
                    self.semantic_index
                        .insert(semantic_content_hash(fact), record.id.clone());
                }
            }
            self.records.insert(record.id.clone(), record);
        }
        self.version += 1;
    }

    #[cfg(test)]
    pub(crate) fn backdate(
        &mut self,
        id: &str,
        created_at: DateTime<Utc>,
        last_access: DateTime<Utc>,
        access_count: u32,
    ) {
        if let Some(record) = self.records.get_mut(id) {
            record.created_at = created_at;
            record.last_access = last_access;
            record.access_count = access_count;
            self.version += 1;
        }
    }
}

// ============================================================================
// SIMILARITY
// ============================================================================

/// Cosine similarity between two vectors; 0.0 on dimension mismatch.
pub(crate) fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x as f64 * y as f64;
        norm_a += x as f64 * x as f64;
        norm_b += y as f64 * y as f64;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0)
}

/// Jaccard overlap between the lowercase token sets of two texts.
pub(crate) fn keyword_overlap(a: &str, b: &str) -> f64 {
    let tokens_a: std::collections::HashSet<String> = tokenize(a);
    let tokens_b: std::collections::HashSet<String> = tokenize(b);
    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }
    let intersection = tokens_a.intersection(&tokens_b).count();
    let union = tokens_a.union(&tokens_b).count();
    intersection as f64 / union as f64
}

fn tokenize(text: &str) -> std::collections::HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}
