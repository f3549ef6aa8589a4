use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

/// Caches never shrink below this bound regardless of the memory budget.
const MIN_MAX_BYTES: u64 = 4 * 1024 * 1024;

/// Sizing and removal policy for an [`EvictingCache`].
///
/// The cache itself only tracks recency and a running byte total; what a
/// value weighs, which values count as the same logical entry, and what
/// happens when one leaves the map are the business of the policy.
pub trait EvictionPolicy<K, V> {
    /// The current byte weight of a value.
    fn size_of(&self, key: &K, value: &V) -> u64;

    /// The byte weight the value had before its most recent load.
    ///
    /// Consulted when the same logical entry is re-inserted after an
    /// in-place size change, where [`size_of`](Self::size_of) already
    /// reports the new weight and subtracting it would cancel the delta.
    fn previous_size_of(&self, key: &K, value: &V) -> u64 {
        self.size_of(key, value)
    }

    /// Whether `old` and `new` are the same logical entry.
    fn same_value(&self, old: &V, new: &V) -> bool;

    /// Called for every value leaving the map.
    ///
    /// `evicted` is true when the removal was forced by the size bound,
    /// false for same-key replacements and explicit clears. `new` is the
    /// replacement value if this was a same-key `put`. Implementations
    /// must not tear down `old` when it is the same logical entry as
    /// `new`.
    fn entry_removed(&self, evicted: bool, key: &K, old: V, new: Option<&V>) {
        let _ = (evicted, key, old, new);
    }
}

/// A bounded key→value store with size-aware LRU eviction.
///
/// Recency is updated on both `get` and `put`; whenever the running byte
/// total exceeds the bound, least-recently-used entries are evicted until
/// it holds again. The just-inserted entry is never evicted, so a single
/// entry larger than the whole bound is kept rather than thrashed.
#[derive(Debug)]
pub struct EvictingCache<K, V, P> {
    map: HashMap<K, V>,
    /// Keys ordered least- to most-recently used.
    recency: VecDeque<K>,
    total_bytes: u64,
    max_bytes: u64,
    policy: P,
}

impl<K, V, P> EvictingCache<K, V, P>
where
    K: Eq + Hash + Clone,
    V: Clone,
    P: EvictionPolicy<K, V>,
{
    /// Creates a cache bounded by `max(4 MiB, memory_budget / 4)`.
    pub fn with_budget(memory_budget: u64, policy: P) -> Self {
        Self::new(MIN_MAX_BYTES.max(memory_budget / 4), policy)
    }

    pub fn new(max_bytes: u64, policy: P) -> Self {
        Self {
            map: HashMap::new(),
            recency: VecDeque::new(),
            total_bytes: 0,
            max_bytes,
            policy,
        }
    }

    /// Looks up a value and marks it most-recently-used.
    ///
    /// Has no effect on size accounting.
    pub fn get(&mut self, key: &K) -> Option<V> {
        let value = self.map.get(key)?.clone();
        self.touch(key);
        Some(value)
    }

    /// Inserts or replaces a value, then evicts until the size bound holds.
    ///
    /// Returns the entries that were evicted to make room. Replacing the
    /// same logical entry (per [`EvictionPolicy::same_value`]) accounts
    /// the delta between its current and previous weight instead of
    /// double-counting the whole entry.
    pub fn put(&mut self, key: K, value: V) -> Vec<(K, V)> {
        self.total_bytes = self
            .total_bytes
            .saturating_add(self.policy.size_of(&key, &value));
        if let Some(old) = self.map.insert(key.clone(), value.clone()) {
            let reclaimed = if self.policy.same_value(&old, &value) {
                self.policy.previous_size_of(&key, &value)
            } else {
                self.policy.size_of(&key, &old)
            };
            self.total_bytes = self.total_bytes.saturating_sub(reclaimed);
            self.policy.entry_removed(false, &key, old, Some(&value));
        }
        self.touch(&key);
        self.evict_over_budget(&key)
    }

    /// Removes every entry, invoking the removal hook for each.
    pub fn evict_all(&mut self) {
        let keys: Vec<K> = self.recency.drain(..).collect();
        for key in keys {
            if let Some(old) = self.map.remove(&key) {
                self.policy.entry_removed(false, &key, old, None);
            }
        }
        debug_assert!(self.map.is_empty());
        self.total_bytes = 0;
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// The current running byte total.
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// The eviction bound in bytes.
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    fn touch(&mut self, key: &K) {
        self.recency.retain(|k| k != key);
        self.recency.push_back(key.clone());
    }

    fn evict_over_budget(&mut self, just_inserted: &K) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        while self.total_bytes > self.max_bytes {
            let victim = self.recency.iter().find(|k| *k != just_inserted).cloned();
            let Some(victim) = victim else { break };
            self.recency.retain(|k| *k != victim);
            if let Some(old) = self.map.remove(&victim) {
                self.total_bytes = self
                    .total_bytes
                    .saturating_sub(self.policy.size_of(&victim, &old));
                self.policy.entry_removed(true, &victim, old.clone(), None);
                evicted.push((victim, old));
            }
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

    use super::*;

    const MIB: u64 = 1024 * 1024;

    /// A cacheable stub whose sizes can change in place, like a real entry
    /// does when a load completes.
    #[derive(Debug)]
    struct Blob {
        id: u32,
        size: AtomicU64,
        previous: AtomicU64,
    }

    impl Blob {
        fn new(id: u32, size: u64) -> Arc<Self> {
            Arc::new(Self {
                id,
                size: AtomicU64::new(size),
                previous: AtomicU64::new(0),
            })
        }

        fn loaded(&self, size: u64) {
            self.previous
                .store(self.size.load(Ordering::SeqCst), Ordering::SeqCst);
            self.size.store(size, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct BlobPolicy {
        recycled: AtomicUsize,
    }

    impl EvictionPolicy<String, Arc<Blob>> for &BlobPolicy {
        fn size_of(&self, _key: &String, value: &Arc<Blob>) -> u64 {
            value.size.load(Ordering::SeqCst)
        }

        fn previous_size_of(&self, _key: &String, value: &Arc<Blob>) -> u64 {
            value.previous.load(Ordering::SeqCst)
        }

        fn same_value(&self, old: &Arc<Blob>, new: &Arc<Blob>) -> bool {
            old.id == new.id
        }

        fn entry_removed(
            &self,
            _evicted: bool,
            _key: &String,
            old: Arc<Blob>,
            new: Option<&Arc<Blob>>,
        ) {
            if new.is_none_or(|new| new.id != old.id) {
                self.recycled.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    fn cache(max_bytes: u64, policy: &BlobPolicy) -> EvictingCache<String, Arc<Blob>, &BlobPolicy> {
        EvictingCache::new(max_bytes, policy)
    }

    #[test]
    fn test_budget_floor() {
        let policy = BlobPolicy::default();
        let cache = EvictingCache::<String, Arc<Blob>, _>::with_budget(0, &policy);
        assert_eq!(cache.max_bytes(), 4 * MIB);

        let cache = EvictingCache::<String, Arc<Blob>, _>::with_budget(64 * MIB, &policy);
        assert_eq!(cache.max_bytes(), 16 * MIB);
    }

    #[test]
    fn test_evicts_least_recently_used_first() {
        let policy = BlobPolicy::default();
        let mut cache = cache(4 * MIB, &policy);
        for id in 1..=4 {
            cache.put(format!("res-{id}"), Blob::new(id, MIB));
        }
        assert_eq!(cache.total_bytes(), 4 * MIB);

        let evicted = cache.put("res-5".into(), Blob::new(5, MIB));
        assert_eq!(evicted.len(), 1);
        assert_eq!(evicted[0].0, "res-1");
        assert_eq!(cache.len(), 4);
        assert_eq!(cache.total_bytes(), 4 * MIB);
    }

    #[test]
    fn test_get_refreshes_recency() {
        let policy = BlobPolicy::default();
        let mut cache = cache(4 * MIB, &policy);
        for id in 1..=4 {
            cache.put(format!("res-{id}"), Blob::new(id, MIB));
        }
        cache.get(&"res-1".into());

        let evicted = cache.put("res-5".into(), Blob::new(5, MIB));
        assert_eq!(evicted[0].0, "res-2");
        assert!(cache.get(&"res-1".into()).is_some());
    }

    #[test]
    fn test_same_entry_reinsert_accounts_delta() {
        let policy = BlobPolicy::default();
        let mut cache = cache(4 * MIB, &policy);
        let blob = Blob::new(1, 0);
        cache.put("res-1".into(), blob.clone());
        assert_eq!(cache.total_bytes(), 0);

        // the entry grows in place and is re-inserted, like the sticky
        // observer does after a load
        blob.loaded(MIB);
        cache.put("res-1".into(), blob.clone());
        assert_eq!(cache.total_bytes(), MIB);

        blob.loaded(3 * MIB);
        cache.put("res-1".into(), blob.clone());
        assert_eq!(cache.total_bytes(), 3 * MIB);

        assert_eq!(policy.recycled.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reinsert_does_not_recycle_equal_entry() {
        let policy = BlobPolicy::default();
        let mut cache = cache(4 * MIB, &policy);
        let blob = Blob::new(1, MIB);
        cache.put("res-1".into(), blob.clone());
        cache.put("res-1".into(), blob);
        assert_eq!(policy.recycled.load(Ordering::SeqCst), 0);

        // a different logical entry for the same key does recycle
        cache.put("res-1".into(), Blob::new(2, MIB));
        assert_eq!(policy.recycled.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_oversized_entry_is_kept() {
        let policy = BlobPolicy::default();
        let mut cache = cache(4 * MIB, &policy);
        let evicted = cache.put("huge".into(), Blob::new(1, 16 * MIB));
        assert!(evicted.is_empty());
        assert_eq!(cache.len(), 1);

        // but it goes first once something newer arrives
        let evicted = cache.put("small".into(), Blob::new(2, MIB));
        assert_eq!(evicted[0].0, "huge");
        assert_eq!(cache.total_bytes(), MIB);
    }

    #[test]
    fn test_evict_all_recycles_everything() {
        let policy = BlobPolicy::default();
        let mut cache = cache(4 * MIB, &policy);
        for id in 1..=3 {
            cache.put(format!("res-{id}"), Blob::new(id, MIB));
        }
        cache.evict_all();
        assert!(cache.is_empty());
        assert_eq!(cache.total_bytes(), 0);
        assert_eq!(policy.recycled.load(Ordering::SeqCst), 3);
    }
}
