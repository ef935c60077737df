//! Per-vault reload bookkeeping.
//!
//! The tracker never reloads anything itself; it only answers whether the
//! host environment should be asked to refresh. Entries live for the lifetime
//! of the tracker. Access is serialized per key through the map's shard locks,
//! so different vaults do not contend on one lock. Callers that perform the
//! reload hold the vault's [`CacheTracker::reload_gate`] for its duration.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub vault_key: String,
    pub last_loaded: DateTime<Utc>,
    pub ttl_seconds: u64,
}

impl CacheEntry {
    fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
        let ttl_millis = i64::try_from(self.ttl_seconds.saturating_mul(1_000)).unwrap_or(i64::MAX);
        now.signed_duration_since(self.last_loaded).num_milliseconds() > ttl_millis
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub vault_key: String,
    pub last_loaded: Option<DateTime<Utc>>,
    pub cache_age_seconds: Option<i64>,
}

#[derive(Debug)]
pub struct CacheTracker {
    ttl_seconds: u64,
    entries: DashMap<String, CacheEntry>,
    gates: DashMap<String, Arc<Mutex<()>>>,
}

impl CacheTracker {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl_seconds,
            entries: DashMap::new(),
            gates: DashMap::new(),
        }
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn should_reload(&self, vault_key: &str) -> bool {
        self.should_reload_at(vault_key, Utc::now())
    }

    pub fn should_reload_at(&self, vault_key: &str, now: DateTime<Utc>) -> bool {
        self.entries
            .get(vault_key)
            .map_or(true, |entry| entry.is_stale_at(now))
    }

    pub fn update_cache(&self, vault_key: &str) {
        self.update_cache_at(vault_key, Utc::now());
    }

    pub fn update_cache_at(&self, vault_key: &str, now: DateTime<Utc>) {
        match self.entries.entry(vault_key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.last_loaded = now;
                entry.ttl_seconds = self.ttl_seconds;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.fresh_entry(vault_key, now));
            }
        }
    }

    /// Checks staleness and marks the vault as loaded in one step.
    ///
    /// Returns `true` for exactly one of several concurrent callers that
    /// observe a stale vault; that caller owns the reload.
    pub fn claim_reload(&self, vault_key: &str) -> bool {
        self.claim_reload_at(vault_key, Utc::now())
    }

    pub fn claim_reload_at(&self, vault_key: &str, now: DateTime<Utc>) -> bool {
        match self.entries.entry(vault_key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if !occupied.get().is_stale_at(now) {
                    return false;
                }
                occupied.get_mut().last_loaded = now;
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(self.fresh_entry(vault_key, now));
                true
            }
        }
    }

    /// Forgets a claim whose reload failed so the next request retries.
    pub fn release_claim(&self, vault_key: &str, previous: Option<DateTime<Utc>>) {
        match previous {
            Some(last_loaded) => {
                if let Some(mut entry) = self.entries.get_mut(vault_key) {
                    entry.last_loaded = last_loaded;
                }
            }
            None => {
                self.entries.remove(vault_key);
            }
        }
    }

    /// Async lock shared by everyone reloading `vault_key`.
    ///
    /// Requests that find the vault stale wait here while another request's
    /// reload is in flight, then re-check staleness.
    pub fn reload_gate(&self, vault_key: &str) -> Arc<Mutex<()>> {
        self.gates
            .entry(vault_key.to_string())
            .or_default()
            .clone()
    }

    pub fn last_loaded(&self, vault_key: &str) -> Option<DateTime<Utc>> {
        self.entries.get(vault_key).map(|entry| entry.last_loaded)
    }

    pub fn cache_stats(&self, vault_key: &str) -> CacheStats {
        self.cache_stats_at(vault_key, Utc::now())
    }

    pub fn cache_stats_at(&self, vault_key: &str, now: DateTime<Utc>) -> CacheStats {
        let last_loaded = self.last_loaded(vault_key);
        CacheStats {
            vault_key: vault_key.to_string(),
            last_loaded,
            cache_age_seconds: last_loaded.map(|at| now.signed_duration_since(at).num_seconds()),
        }
    }

    fn fresh_entry(&self, vault_key: &str, now: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            vault_key: vault_key.to_string(),
            last_loaded: now,
            ttl_seconds: self.ttl_seconds,
        }
    }
}

impl Default for CacheTracker {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_CACHE_TTL_SECONDS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn unknown_vault_needs_reload() {
        let tracker = CacheTracker::new(60);
        assert!(tracker.should_reload("vault-a"));
        let stats = tracker.cache_stats("vault-a");
        assert_eq!(stats.last_loaded, None);
        assert_eq!(stats.cache_age_seconds, None);
    }

    #[test]
    fn reload_is_due_only_after_ttl() {
        let tracker = CacheTracker::new(60);
        let loaded_at = Utc::now();
        tracker.update_cache_at("vault-a", loaded_at);

        assert!(!tracker.should_reload_at("vault-a", loaded_at + Duration::seconds(60)));
        assert!(tracker.should_reload_at("vault-a", loaded_at + Duration::seconds(61)));
        assert!(tracker.should_reload_at("vault-b", loaded_at));
    }

    #[test]
    fn stats_report_age() {
        let tracker = CacheTracker::new(60);
        let loaded_at = Utc::now();
        tracker.update_cache_at("vault-a", loaded_at);
        let stats = tracker.cache_stats_at("vault-a", loaded_at + Duration::seconds(42));
        assert_eq!(stats.vault_key, "vault-a");
        assert_eq!(stats.last_loaded, Some(loaded_at));
        assert_eq!(stats.cache_age_seconds, Some(42));
    }

    #[test]
    fn claim_is_granted_once_while_fresh() {
        let tracker = CacheTracker::new(60);
        let now = Utc::now();
        assert!(tracker.claim_reload_at("vault-a", now));
        assert!(!tracker.claim_reload_at("vault-a", now + Duration::seconds(1)));
        assert!(tracker.claim_reload_at("vault-a", now + Duration::seconds(120)));
    }

    #[test]
    fn released_claim_restores_previous_state() {
        let tracker = CacheTracker::new(60);
        assert!(tracker.claim_reload("vault-a"));
        tracker.release_claim("vault-a", None);
        assert!(tracker.should_reload("vault-a"));

        let earlier = Utc::now() - Duration::seconds(600);
        tracker.update_cache_at("vault-b", earlier);
        assert!(tracker.claim_reload("vault-b"));
        tracker.release_claim("vault-b", Some(earlier));
        assert_eq!(tracker.last_loaded("vault-b"), Some(earlier));
    }

    #[test]
    fn concurrent_claims_yield_a_single_winner() {
        let tracker = Arc::new(CacheTracker::new(60));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tracker = Arc::clone(&tracker);
                std::thread::spawn(move || tracker.claim_reload("shared"))
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn reload_gate_is_shared_per_vault() {
        let tracker = CacheTracker::new(60);
        let first = tracker.reload_gate("vault-a");
        let again = tracker.reload_gate("vault-a");
        let other = tracker.reload_gate("vault-b");
        assert!(Arc::ptr_eq(&first, &again));
        assert!(!Arc::ptr_eq(&first, &other));

        let _held = first.try_lock().unwrap();
        assert!(again.try_lock().is_err());
        assert!(other.try_lock().is_ok());
    }
}
