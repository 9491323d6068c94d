//! Decision cache keyed by situation fingerprint
//!
//! Entries are valid for `ttl` after insertion and are replaced, never updated
//! in place. Capacity is enforced lazily: an insert that pushes the map past
//! `max_entries` prunes expired entries. If nothing has expired yet the map may
//! stay above `max_entries` until entries age out, unless strict capacity is on,
//! in which case the oldest live entries are evicted as well.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::fingerprint::Fingerprint;
use crate::config::CacheConfig;
use crate::domain::Decision;

/// A cached decision with its insertion time
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: Fingerprint,
    pub value: Decision,
    pub created_at: Instant,
}

impl CacheEntry {
    fn is_live(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) < ttl
    }
}

/// Thread-safe TTL cache of decisions (sharded, no global lock)
#[derive(Debug)]
pub struct DecisionCache {
    entries: DashMap<Fingerprint, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    strict_capacity: bool,
}

impl DecisionCache {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries,
            strict_capacity: false,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.ttl(), config.max_entries).with_strict_capacity(config.strict_capacity)
    }

    /// Evict oldest live entries when pruning alone cannot restore capacity
    pub fn with_strict_capacity(mut self, strict: bool) -> Self {
        self.strict_capacity = strict;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Get a live decision; an expired entry is a miss and is evicted
    pub fn get(&self, key: &Fingerprint) -> Option<Decision> {
        let now = Instant::now();
        let expired = match self.entries.get(key) {
            Some(entry) if entry.is_live(now, self.ttl) => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            // A concurrent put may have replaced the entry since the read.
            self.entries
                .remove_if(key, |_, entry| !entry.is_live(Instant::now(), self.ttl));
        }
        None
    }

    /// Insert or replace the decision for `key`
    pub fn put(&self, key: Fingerprint, decision: Decision) {
        let entry = CacheEntry {
            key: key.clone(),
            value: decision,
            created_at: Instant::now(),
        };
        self.entries.insert(key, entry);
        self.enforce_capacity();
    }

    /// Insert unless a live entry already exists for `key`.
    ///
    /// Returns the decision that remains cached when one was kept; an expired
    /// entry is replaced.
    pub fn put_if_absent(&self, key: Fingerprint, decision: Decision) -> Option<Decision> {
        let now = Instant::now();
        let kept = match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now, self.ttl) {
                    Some(occupied.get().value.clone())
                } else {
                    let key = occupied.key().clone();
                    occupied.insert(CacheEntry {
                        key,
                        value: decision,
                        created_at: now,
                    });
                    None
                }
            }
            Entry::Vacant(vacant) => {
                let key = vacant.key().clone();
                vacant.insert(CacheEntry {
                    key,
                    value: decision,
                    created_at: now,
                });
                None
            }
        };

        if kept.is_none() {
            self.enforce_capacity();
        }
        kept
    }

    fn enforce_capacity(&self) {
        if self.entries.len() > self.max_entries {
            let pruned = self.prune();
            let mut evicted = 0;
            if self.strict_capacity && self.entries.len() > self.max_entries {
                evicted = self.evict_oldest();
            }
            debug!(
                pruned,
                evicted,
                size = self.entries.len(),
                max_entries = self.max_entries,
                "decision cache over capacity"
            );
        }
    }

    /// Remove every expired entry, returning how many were removed
    pub fn prune(&self) -> usize {
        let now = Instant::now();
        let ttl = self.ttl;
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let live = entry.is_live(now, ttl);
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }

    fn evict_oldest(&self) -> usize {
        let excess = self.entries.len().saturating_sub(self.max_entries);
        if excess == 0 {
            return 0;
        }

        let mut by_age: Vec<(Instant, Fingerprint)> = self
            .entries
            .iter()
            .map(|e| (e.value().created_at, e.key().clone()))
            .collect();
        by_age.sort_unstable_by_key(|(created_at, _)| *created_at);

        by_age
            .into_iter()
            .take(excess)
            .filter(|(created_at, key)| {
                self.entries
                    .remove_if(key, |_, entry| entry.created_at == *created_at)
                    .is_some()
            })
            .count()
    }

    /// Current number of physically stored entries (live or expired)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
