// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Semantic Response Cache
//!
//! Maps a normalized request fingerprint to a previously produced response.
//! A lookup returns the stored response only when the best similarity score
//! against any stored fingerprint reaches the configured threshold.
//!
//! The cache is bounded. With FIFO eviction, lookups do not touch recency so
//! the oldest insert goes first; with LRU, a hit refreshes the entry.
//! A miss never blocks the pipeline, it only skips reuse.

use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use metrics::counter;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::agent::AgentId;
use crate::domain::decision::Decision;
use crate::domain::execution::ConversationMessage;
use crate::domain::orchestrator_config::{CacheConfig, EvictionPolicy, SimilarityKind};

/// Pluggable similarity between two fingerprints, in `[0, 1]`.
pub trait SimilarityStrategy: Send + Sync {
    fn similarity(&self, a: &str, b: &str) -> f64;

    fn name(&self) -> &'static str;
}

/// Jaccard overlap of whitespace token sets.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokenSetSimilarity;

impl SimilarityStrategy for TokenSetSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        let left: HashSet<&str> = a.split_whitespace().collect();
        let right: HashSet<&str> = b.split_whitespace().collect();
        if left.is_empty() && right.is_empty() {
            return 1.0;
        }
        let intersection = left.intersection(&right).count() as f64;
        let union = left.union(&right).count() as f64;
        intersection / union
    }

    fn name(&self) -> &'static str {
        "token_set"
    }
}

/// Cosine similarity of character trigram counts. More forgiving of small
/// spelling differences than token overlap.
#[derive(Debug, Default, Clone, Copy)]
pub struct TrigramCosineSimilarity;

impl TrigramCosineSimilarity {
    fn trigrams(text: &str) -> HashMap<[char; 3], f64> {
        let padded: Vec<char> = format!("  {} ", text).chars().collect();
        let mut counts = HashMap::new();
        for w in padded.windows(3) {
            *counts.entry([w[0], w[1], w[2]]).or_insert(0.0) += 1.0;
        }
        counts
    }
}

impl SimilarityStrategy for TrigramCosineSimilarity {
    fn similarity(&self, a: &str, b: &str) -> f64 {
        if a == b {
            return 1.0;
        }
        let left = Self::trigrams(a);
        let right = Self::trigrams(b);
        let dot: f64 = left
            .iter()
            .filter_map(|(k, v)| right.get(k).map(|w| v * w))
            .sum();
        let norm = |m: &HashMap<[char; 3], f64>| m.values().map(|v| v * v).sum::<f64>().sqrt();
        let denom = norm(&left) * norm(&right);
        if denom == 0.0 {
            0.0
        } else {
            (dot / denom).clamp(0.0, 1.0)
        }
    }

    fn name(&self) -> &'static str {
        "trigram_cosine"
    }
}

/// Lowercase, punctuation stripped, whitespace collapsed.
pub fn fingerprint(text: &str) -> String {
    text.chars()
        .flat_map(|c| {
            let mapped = if c.is_alphanumeric() { c } else { ' ' };
            mapped.to_lowercase()
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// What the cache hands back on a hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedResponse {
    pub decision: Decision,
    pub messages: Vec<ConversationMessage>,
    pub contributing_agents: Vec<AgentId>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    response: CachedResponse,
    inserted_at: Instant,
}

#[derive(Debug, Clone)]
pub struct CacheHit {
    pub fingerprint: String,
    pub similarity: f64,
    pub response: CachedResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

pub struct SemanticCache {
    entries: Mutex<LruCache<String, CacheEntry>>,
    strategy: Arc<dyn SimilarityStrategy>,
    threshold: f64,
    eviction: EvictionPolicy,
    ttl: Option<Duration>,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl SemanticCache {
    pub fn new(
        capacity: NonZeroUsize,
        threshold: f64,
        eviction: EvictionPolicy,
        strategy: Arc<dyn SimilarityStrategy>,
    ) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            strategy,
            threshold: threshold.clamp(0.0, 1.0),
            eviction,
            ttl: None,
            enabled: true,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let strategy: Arc<dyn SimilarityStrategy> = match config.similarity {
            SimilarityKind::TokenSet => Arc::new(TokenSetSimilarity),
            SimilarityKind::TrigramCosine => Arc::new(TrigramCosineSimilarity),
        };
        let capacity = NonZeroUsize::new(config.capacity).unwrap_or(NonZeroUsize::MIN);
        let mut cache = Self::new(capacity, config.similarity_threshold, config.eviction, strategy);
        cache.ttl = config.ttl;
        cache.enabled = config.enabled;
        cache
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn similarity(&self, a: &str, b: &str) -> f64 {
        self.strategy.similarity(&fingerprint(a), &fingerprint(b))
    }

    pub fn lookup(&self, request_text: &str) -> Option<CacheHit> {
        if !self.enabled {
            return None;
        }
        let query = fingerprint(request_text);
        let mut entries = self.entries.lock();

        if let Some(ttl) = self.ttl {
            let expired: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.inserted_at.elapsed() > ttl)
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                entries.pop(&key);
            }
        }

        let mut best: Option<(String, f64)> = None;
        for (key, _) in entries.iter() {
            let score = if *key == query {
                1.0
            } else {
                self.strategy.similarity(&query, key)
            };
            if score >= self.threshold && best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((key.clone(), score));
            }
        }

        let hit = best.and_then(|(key, similarity)| {
            let entry = match self.eviction {
                EvictionPolicy::Lru => entries.get(&key),
                EvictionPolicy::Fifo => entries.peek(&key),
            };
            entry.map(|e| CacheHit {
                fingerprint: key.clone(),
                similarity,
                response: e.response.clone(),
            })
        });
        drop(entries);

        match &hit {
            Some(h) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                counter!("switchyard_cache_lookups_total", "result" => "hit").increment(1);
                debug!(similarity = h.similarity, strategy = self.strategy.name(), "Cache hit");
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                counter!("switchyard_cache_lookups_total", "result" => "miss").increment(1);
            }
        }
        hit
    }

    pub fn insert(&self, request_text: &str, response: CachedResponse) {
        if !self.enabled {
            return;
        }
        let key = fingerprint(request_text);
        let mut entries = self.entries.lock();
        let replacing = entries.contains(&key);
        let evicted = entries.push(
            key.clone(),
            CacheEntry {
                response,
                inserted_at: Instant::now(),
            },
        );
        if let Some((old_key, _)) = evicted {
            if !replacing {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(evicted = %old_key, "Cache at capacity, evicted entry");
            }
        }
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: entries.len(),
            capacity: entries.cap().get(),
        }
    }
}
