//! Size-bounded RAM tier keyed by content hash

use crate::eviction::{AgeSizePolicy, EvictionPolicy};
use crate::hash::ContentHash;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// A resident payload and when it was last touched
#[derive(Debug, Clone)]
pub struct ContentEntry {
    pub payload: Arc<[u8]>,
    pub last_access: Instant,
}

impl ContentEntry {
    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// Payloads held in RAM, bounded by a per-item and a total byte budget
///
/// Entries are kept in hash order, which is also the tie-break order when
/// two entries score the same during eviction: the smaller hash goes first.
pub struct HashStore {
    entries: BTreeMap<ContentHash, ContentEntry>,
    resident_size: u64,
    per_item_limit: u64,
    total_limit: u64,
    policy: Arc<dyn EvictionPolicy>,
    evictions: u64,
}

impl HashStore {
    pub fn new(per_item_limit: u64, total_limit: u64) -> Self {
        Self {
            entries: BTreeMap::new(),
            resident_size: 0,
            per_item_limit,
            total_limit,
            policy: Arc::new(AgeSizePolicy),
            evictions: 0,
        }
    }

    /// Try to make `payload` resident under `hash`.
    ///
    /// Returns `true` if the payload is resident afterwards. An already
    /// resident hash only has its access time refreshed. A payload larger
    /// than either budget is refused without disturbing other entries.
    pub fn admit(&mut self, hash: &ContentHash, payload: &Arc<[u8]>, now: Instant) -> bool {
        if let Some(entry) = self.entries.get_mut(hash) {
            entry.last_access = now;
            return true;
        }

        let size = payload.len() as u64;
        if size > self.per_item_limit || size > self.total_limit {
            debug!(hash = %hash, size, per_item_limit = self.per_item_limit, "Payload not admitted to RAM");
            return false;
        }

        self.evict_until_fits(size, now);

        self.entries.insert(
            hash.clone(),
            ContentEntry {
                payload: Arc::clone(payload),
                last_access: now,
            },
        );
        self.resident_size += size;
        debug!(hash = %hash, size, resident_size = self.resident_size, "Admitted payload");
        true
    }

    /// Look up a resident payload and refresh its access time
    pub fn get(&mut self, hash: &ContentHash, now: Instant) -> Option<Arc<[u8]>> {
        let entry = self.entries.get_mut(hash)?;
        entry.last_access = now;
        Some(Arc::clone(&entry.payload))
    }

    /// Look up a resident payload without counting it as an access
    pub fn peek(&self, hash: &ContentHash) -> Option<&Arc<[u8]>> {
        self.entries.get(hash).map(|e| &e.payload)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Lower or raise the total budget, evicting immediately to honor it
    pub fn set_total_limit(&mut self, limit: u64, now: Instant) {
        self.total_limit = limit;
        self.evict_until_fits(0, now);
    }

    /// Change the per-item budget; resident entries are left alone
    pub fn set_per_item_limit(&mut self, limit: u64) {
        self.per_item_limit = limit;
    }

    /// Swap the scoring function used by future eviction passes
    pub fn set_policy(&mut self, policy: Arc<dyn EvictionPolicy>) {
        self.policy = policy;
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.resident_size = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resident_size(&self) -> u64 {
        self.resident_size
    }

    pub fn per_item_limit(&self) -> u64 {
        self.per_item_limit
    }

    pub fn total_limit(&self) -> u64 {
        self.total_limit
    }

    /// Number of entries evicted over the store's lifetime
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    fn evict_until_fits(&mut self, incoming: u64, now: Instant) {
        while self.resident_size + incoming > self.total_limit {
            let Some(victim) = self.select_victim(now) else {
                break;
            };
            if let Some(entry) = self.entries.remove(&victim) {
                self.resident_size -= entry.size();
                self.evictions += 1;
                debug!(hash = %victim, size = entry.size(), resident_size = self.resident_size, "Evicted payload");
            }
        }
    }

    fn select_victim(&self, now: Instant) -> Option<ContentHash> {
        let mut best: Option<(&ContentHash, u128)> = None;
        for (hash, entry) in &self.entries {
            let age_ms = u64::try_from(now.saturating_duration_since(entry.last_access).as_millis())
                .unwrap_or(u64::MAX);
            let score = self.policy.score(age_ms, entry.size());
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((hash, score));
            }
        }
        best.map(|(hash, _)| hash.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn payload(byte: u8, len: usize) -> (ContentHash, Arc<[u8]>) {
        let data: Arc<[u8]> = vec![byte; len].into();
        (ContentHash::of(&data), data)
    }

    #[test]
    fn test_admit_and_get() {
        let mut store = HashStore::new(1000, 5000);
        let now = Instant::now();
        let (hash, data) = payload(1, 500);

        assert!(store.admit(&hash, &data, now));
        assert_eq!(store.resident_size(), 500);
        assert_eq!(store.get(&hash, now).as_deref(), Some(&data[..]));
    }

    #[test]
    fn test_readmit_has_no_size_delta() {
        let mut store = HashStore::new(1000, 5000);
        let now = Instant::now();
        let (hash, data) = payload(1, 500);

        assert!(store.admit(&hash, &data, now));
        assert!(store.admit(&hash, &data, now + Duration::from_secs(1)));
        assert_eq!(store.resident_size(), 500);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_oversized_is_refused() {
        let mut store = HashStore::new(1000, 5000);
        let (hash, data) = payload(1, 1001);

        assert!(!store.admit(&hash, &data, Instant::now()));
        assert!(store.is_empty());
        assert_eq!(store.resident_size(), 0);
    }

    #[test]
    fn test_larger_than_total_is_refused_without_evicting() {
        let mut store = HashStore::new(10_000, 1000);
        let now = Instant::now();
        let (small, small_data) = payload(1, 400);
        let (big, big_data) = payload(2, 1500);

        assert!(store.admit(&small, &small_data, now));
        assert!(!store.admit(&big, &big_data, now));
        assert!(store.contains(&small));
        assert_eq!(store.resident_size(), 400);
    }

    #[test]
    fn test_evicts_stalest_first() {
        let mut store = HashStore::new(1000, 1000);
        let start = Instant::now();
        let (a, a_data) = payload(1, 400);
        let (b, b_data) = payload(2, 400);
        let (c, c_data) = payload(3, 400);

        store.admit(&a, &a_data, start);
        store.admit(&b, &b_data, start + Duration::from_millis(10));
        store.get(&a, start + Duration::from_millis(20));

        assert!(store.admit(&c, &c_data, start + Duration::from_millis(30)));
        assert!(store.contains(&a));
        assert!(!store.contains(&b));
        assert!(store.contains(&c));
        assert_eq!(store.resident_size(), 800);
        assert_eq!(store.evictions(), 1);
    }

    #[test]
    fn test_evicts_larger_entry_at_equal_age() {
        let mut store = HashStore::new(30_000, 40_000);
        let start = Instant::now();
        let (small, small_data) = payload(1, 5_000);
        let (large, large_data) = payload(2, 25_000);
        let (incoming, incoming_data) = payload(3, 15_000);

        store.admit(&small, &small_data, start);
        store.admit(&large, &large_data, start);

        assert!(store.admit(&incoming, &incoming_data, start + Duration::from_millis(50)));
        assert!(store.contains(&small));
        assert!(!store.contains(&large));
    }

    #[test]
    fn test_ties_break_on_hash_order() {
        let mut store = HashStore::new(1000, 1000);
        let now = Instant::now();
        let (a, a_data) = payload(1, 500);
        let (b, b_data) = payload(2, 500);
        let (c, c_data) = payload(3, 500);

        store.admit(&a, &a_data, now);
        store.admit(&b, &b_data, now);
        store.admit(&c, &c_data, now);

        let expected_victim = std::cmp::min(a.clone(), b.clone());
        assert!(!store.contains(&expected_victim));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_lowering_total_limit_evicts_immediately() {
        let mut store = HashStore::new(1000, 5000);
        let now = Instant::now();
        for byte in 0..5u8 {
            let (hash, data) = payload(byte, 1000);
            assert!(store.admit(&hash, &data, now));
        }
        assert_eq!(store.resident_size(), 5000);

        store.set_total_limit(2500, now + Duration::from_millis(5));
        assert!(store.resident_size() <= 2500);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_lowering_per_item_limit_keeps_residents() {
        let mut store = HashStore::new(1000, 5000);
        let now = Instant::now();
        let (hash, data) = payload(1, 900);
        store.admit(&hash, &data, now);

        store.set_per_item_limit(100);
        assert!(store.contains(&hash));
        assert_eq!(store.resident_size(), 900);

        let (other, other_data) = payload(2, 200);
        assert!(!store.admit(&other, &other_data, now));
    }

    #[test]
    fn test_policy_swap_affects_next_pass() {
        let mut store = HashStore::new(1000, 1000);
        let start = Instant::now();
        let (old, old_data) = payload(1, 300);
        let (young, young_data) = payload(2, 600);

        store.admit(&old, &old_data, start);
        store.admit(&young, &young_data, start + Duration::from_millis(100));

        // Evict the smallest entry regardless of age
        store.set_policy(Arc::new(|_age: u64, size: u64| u128::from(u64::MAX - size)));

        let (incoming, incoming_data) = payload(3, 300);
        assert!(store.admit(&incoming, &incoming_data, start + Duration::from_millis(200)));
        assert!(!store.contains(&old));
        assert!(store.contains(&young));
    }

    #[test]
    fn test_clear_resets_size() {
        let mut store = HashStore::new(1000, 5000);
        let (hash, data) = payload(1, 700);
        store.admit(&hash, &data, Instant::now());

        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.resident_size(), 0);
        assert!(store.peek(&hash).is_none());
    }
}
