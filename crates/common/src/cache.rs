//! Time-bounded memoization keyed by symbol.
//!
//! One instance per purpose (judge research, social confirmation, ...), each
//! with its own TTL. Time is always passed in so expiry is deterministic.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub value: V,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlCache<V> {
    ttl_secs: i64,
    entries: HashMap<String, CacheEntry<V>>,
}

impl<V> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl_secs: ttl.num_seconds(),
            entries: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::seconds(self.ttl_secs)
    }

    /// Adopt a new TTL (e.g. after a config change) without dropping entries.
    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl_secs = ttl.num_seconds();
    }

    fn is_live(&self, entry: &CacheEntry<V>, now: DateTime<Utc>) -> bool {
        now - entry.stored_at < self.ttl()
    }

    pub fn get(&self, key: &str, now: DateTime<Utc>) -> Option<&V> {
        self.entries
            .get(key)
            .filter(|entry| self.is_live(entry, now))
            .map(|entry| &entry.value)
    }

    pub fn contains(&self, key: &str, now: DateTime<Utc>) -> bool {
        self.get(key, now).is_some()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: V, now: DateTime<Utc>) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                value,
                stored_at: now,
            },
        );
    }

    pub fn remove(&mut self, key: &str) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Drop expired entries, returning how many were removed.
    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl();
        let before = self.entries.len();
        self.entries.retain(|_, entry| now - entry.stored_at < ttl);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Live entries only.
    pub fn iter_live(&self, now: DateTime<Utc>) -> impl Iterator<Item = (&String, &V)> {
        let ttl = self.ttl();
        self.entries
            .iter()
            .filter(move |(_, entry)| now - entry.stored_at < ttl)
            .map(|(key, entry)| (key, &entry.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expires_after_ttl() {
        let now = Utc::now();
        let mut cache = TtlCache::new(Duration::minutes(10));
        cache.insert("AAPL", 1u32, now);

        assert_eq!(cache.get("AAPL", now + Duration::minutes(9)), Some(&1));
        assert_eq!(cache.get("AAPL", now + Duration::minutes(10)), None);
    }

    #[test]
    fn test_purge_removes_only_expired() {
        let now = Utc::now();
        let mut cache = TtlCache::new(Duration::minutes(5));
        cache.insert("OLD", 1u32, now - Duration::minutes(6));
        cache.insert("NEW", 2u32, now);

        assert_eq!(cache.purge_expired(now), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("NEW", now));
    }

    #[test]
    fn test_clear_drops_live_entries() {
        let now = Utc::now();
        let mut cache = TtlCache::new(Duration::minutes(5));
        cache.insert("AAPL", 1u32, now);
        cache.clear();

        assert!(cache.is_empty());
        assert!(!cache.contains("AAPL", now));
    }

    #[test]
    fn test_survives_json_round_trip_with_ttl() {
        let now = Utc::now();
        let mut cache = TtlCache::new(Duration::hours(1));
        cache.insert("TSLA", "buy".to_string(), now);

        let raw = serde_json::to_string(&cache).unwrap();
        let restored: TtlCache<String> = serde_json::from_str(&raw).unwrap();
        assert_eq!(restored.ttl(), Duration::hours(1));
        assert_eq!(restored.get("TSLA", now).map(String::as_str), Some("buy"));
    }
}
