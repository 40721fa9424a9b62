//! Time- and capacity-bounded memoization of generated candidates.
//!
//! Entries are keyed by a SHA-256 hash of the prompt text. An entry
//! expires a fixed TTL after it was written; when the cache is full the
//! least recently used entry is evicted.
//!
//! # Usage
//!
//! ```ignore
//! use reason_forge::llm::CandidateCache;
//!
//! let cache = CandidateCache::new(128).with_ttl(Duration::from_secs(300));
//! cache.set("prompt", vec!["def f():\n    return 1".to_string()]);
//! assert!(cache.get("prompt").is_some());
//! ```

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

/// SHA-256 digest of a prompt, used as the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PromptKey([u8; 32]);

impl PromptKey {
    pub fn of(prompt: &str) -> Self {
        let mut key = [0u8; 32];
        key.copy_from_slice(&Sha256::digest(prompt.as_bytes()));
        Self(key)
    }
}

impl std::fmt::Display for PromptKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

/// Cache entry with metadata for expiry and LRU eviction.
#[derive(Debug, Clone)]
struct CacheEntry {
    candidates: Vec<String>,
    created_at: Instant,
    last_accessed: Instant,
}

/// Lookup and eviction counters since the cache was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    /// Entries dropped for capacity or expiry.
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups answered from the cache; 0.0 before any lookup.
    pub fn hit_rate(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }
}

/// Prompt-keyed cache of generated candidates.
///
/// Thread-safe via interior mutability; share it behind an `Arc`.
pub struct CandidateCache {
    entries: RwLock<HashMap<PromptKey, CacheEntry>>,
    max_entries: usize,
    ttl: Duration,
    stats: RwLock<CacheStats>,
}

impl CandidateCache {
    /// Default time-to-live for entries.
    pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

    /// A cache of at most `max_entries` prompts (minimum one).
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            max_entries: max_entries.max(1),
            ttl: Self::DEFAULT_TTL,
            stats: RwLock::new(CacheStats::default()),
        }
    }

    /// Overrides [`Self::DEFAULT_TTL`].
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Returns the cached candidates for `prompt`, if present and not expired.
    pub fn get(&self, prompt: &str) -> Option<Vec<String>> {
        let key = PromptKey::of(prompt);
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let (hit, expired) = match entries.get_mut(&key) {
            Some(entry) if entry.created_at.elapsed() < self.ttl => {
                entry.last_accessed = Instant::now();
                (Some(entry.candidates.clone()), false)
            }
            Some(_) => (None, true),
            None => (None, false),
        };

        if expired {
            entries.remove(&key);
        }
        drop(entries);

        self.update_stats(|stats| {
            if hit.is_some() {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
            if expired {
                stats.evictions += 1;
            }
        });
        hit
    }

    /// Stores `candidates` for `prompt`, replacing any previous entry.
    pub fn set(&self, prompt: &str, candidates: Vec<String>) {
        let key = PromptKey::of(prompt);
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let mut evicted = self.evict_expired(&mut entries);
        if !entries.contains_key(&key) && entries.len() >= self.max_entries {
            evicted += self.evict_least_recent(&mut entries);
        }

        let now = Instant::now();
        entries.insert(
            key,
            CacheEntry {
                candidates,
                created_at: now,
                last_accessed: now,
            },
        );
        drop(entries);

        self.update_stats(|stats| {
            stats.inserts += 1;
            stats.evictions += evicted;
        });
    }

    fn evict_least_recent(&self, entries: &mut HashMap<PromptKey, CacheEntry>) -> u64 {
        let Some(lru) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_accessed)
            .map(|(key, _)| *key)
        else {
            return 0;
        };
        entries.remove(&lru);
        1
    }

    fn evict_expired(&self, entries: &mut HashMap<PromptKey, CacheEntry>) -> u64 {
        let before = entries.len();
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.created_at.elapsed() < ttl);
        (before - entries.len()) as u64
    }

    fn update_stats(&self, f: impl FnOnce(&mut CacheStats)) {
        let mut stats = self.stats.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut stats);
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of stored entries, expired ones included until evicted.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.max_entries
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
