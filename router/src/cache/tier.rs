//! One cache tier: TTL-first expiry, then least-recently-used eviction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub invalidations: u64,
    pub len: usize,
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    inserted_at: Instant,
    last_access: u64,
}

#[derive(Debug)]
pub struct TierStore<V> {
    ttl: Duration,
    capacity: usize,
    entries: HashMap<String, Entry<V>>,
    /// Monotonic access counter for LRU ordering.
    tick: u64,
    stats: TierStats,
}

impl<V: Clone> TierStore<V> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: HashMap::new(),
            tick: 0,
            stats: TierStats::default(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn is_expired(&self, entry: &Entry<V>, now: Instant) -> bool {
        now.saturating_duration_since(entry.inserted_at) >= self.ttl
    }

    pub fn get(&mut self, key: &str, now: Instant) -> Option<V> {
        let expired = match self.entries.get(key) {
            None => {
                self.stats.misses += 1;
                return None;
            }
            Some(entry) => self.is_expired(entry, now),
        };

        if expired {
            self.entries.remove(key);
            self.stats.expirations += 1;
            self.stats.misses += 1;
            return None;
        }

        let tick = self.next_tick();
        let entry = self.entries.get_mut(key)?;
        entry.last_access = tick;
        self.stats.hits += 1;
        Some(entry.value.clone())
    }

    /// Insert or replace. Expired entries go first, then LRU beyond capacity.
    pub fn put(&mut self, key: String, value: V, now: Instant) {
        let tick = self.next_tick();
        self.entries.insert(
            key,
            Entry {
                value,
                inserted_at: now,
                last_access: tick,
            },
        );

        if self.entries.len() > self.capacity {
            self.purge_expired(now);
        }
        while self.entries.len() > self.capacity {
            let lru = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            match lru {
                Some(k) => {
                    self.entries.remove(&k);
                    self.stats.evictions += 1;
                }
                None => break,
            }
        }
    }

    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let ttl = self.ttl;
        let before = self.entries.len();
        self.entries
            .retain(|_, e| now.saturating_duration_since(e.inserted_at) < ttl);
        let removed = before - self.entries.len();
        self.stats.expirations += removed as u64;
        removed
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        self.stats.invalidations += removed as u64;
        removed
    }

    /// Apply new limits; shrinking capacity evicts LRU entries immediately.
    pub fn reconfigure(&mut self, ttl: Duration, capacity: usize, now: Instant) {
        self.ttl = ttl;
        self.capacity = capacity.max(1);
        self.purge_expired(now);
        while self.entries.len() > self.capacity {
            let lru = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_access)
                .map(|(k, _)| k.clone());
            if let Some(k) = lru {
                self.entries.remove(&k);
                self.stats.evictions += 1;
            }
        }
    }

    pub fn stats(&self) -> TierStats {
        TierStats {
            len: self.entries.len(),
            ..self.stats
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_after_put() {
        let now = Instant::now();
        let mut tier = TierStore::new(Duration::from_secs(10), 4);
        tier.put("a".into(), 1, now);
        assert_eq!(tier.get("a", now), Some(1));
        assert_eq!(tier.get("b", now), None);
        let stats = tier.stats();
        assert_eq!((stats.hits, stats.misses, stats.len), (1, 1, 1));
    }

    #[test]
    fn test_entry_expires_at_ttl() {
        let now = Instant::now();
        let mut tier = TierStore::new(Duration::from_secs(10), 4);
        tier.put("a".into(), 1, now);
        assert_eq!(tier.get("a", now + Duration::from_secs(9)), Some(1));
        assert_eq!(tier.get("a", now + Duration::from_secs(10)), None);
        assert_eq!(tier.stats().expirations, 1);
        assert!(tier.is_empty());
    }

    #[test]
    fn test_lru_evicted_beyond_capacity() {
        let now = Instant::now();
        let mut tier = TierStore::new(Duration::from_secs(60), 2);
        tier.put("a".into(), 1, now);
        tier.put("b".into(), 2, now);
        // touch "a" so "b" is least recently used
        assert_eq!(tier.get("a", now), Some(1));
        tier.put("c".into(), 3, now);
        assert_eq!(tier.len(), 2);
        assert_eq!(tier.get("b", now), None);
        assert_eq!(tier.get("a", now), Some(1));
        assert_eq!(tier.stats().evictions, 1);
    }

    #[test]
    fn test_expired_evicted_before_lru() {
        let start = Instant::now();
        let mut tier = TierStore::new(Duration::from_secs(5), 2);
        tier.put("old".into(), 1, start);
        tier.put("fresh".into(), 2, start + Duration::from_secs(4));
        // "old" is recently used but expired by the time "new" arrives
        assert_eq!(tier.get("old", start + Duration::from_secs(4)), Some(1));
        tier.put("new".into(), 3, start + Duration::from_secs(6));
        let later = start + Duration::from_secs(6);
        assert_eq!(tier.get("fresh", later), Some(2));
        assert_eq!(tier.get("new", later), Some(3));
        assert_eq!(tier.stats().evictions, 0);
        assert_eq!(tier.stats().expirations, 1);
    }

    #[test]
    fn test_replace_keeps_single_entry() {
        let now = Instant::now();
        let mut tier = TierStore::new(Duration::from_secs(60), 2);
        tier.put("a".into(), 1, now);
        tier.put("a".into(), 2, now);
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.get("a", now), Some(2));
    }

    #[test]
    fn test_reconfigure_shrinks() {
        let now = Instant::now();
        let mut tier = TierStore::new(Duration::from_secs(60), 3);
        for (i, k) in ["a", "b", "c"].iter().enumerate() {
            tier.put(k.to_string(), i, now);
        }
        tier.reconfigure(Duration::from_secs(60), 1, now);
        assert_eq!(tier.len(), 1);
        assert_eq!(tier.get("c", now), Some(2));
    }
}
