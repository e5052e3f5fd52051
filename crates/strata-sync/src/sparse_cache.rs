use hashbrown::HashMap;
use hashbrown::hash_map::DefaultHashBuilder;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::hash::{BuildHasher, Hash};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const SHARDS: usize = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

struct Slot<V> {
    value: V,
    tick: u64,
}

/// Keyed map bounded by an element count, evicting in least-recently-used order.
///
/// Entries are spread over hash shards, each behind its own lock. Recency is a
/// tick-ordered map behind a separate lock that is only ever taken while a shard
/// lock is held or with no lock held, never the other way round.
pub struct SparseCache<K, V> {
    shards: Box<[Mutex<HashMap<K, Slot<V>>>]>,
    lru: Mutex<BTreeMap<u64, K>>,
    hasher: DefaultHashBuilder,
    clock: AtomicU64,
    len: AtomicUsize,
    count_limit: AtomicUsize,
    suspended: AtomicUsize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl<K, V> SparseCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(count_limit: usize) -> Self {
        Self {
            shards: (0..SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            lru: Mutex::new(BTreeMap::new()),
            hasher: DefaultHashBuilder::default(),
            clock: AtomicU64::new(0),
            len: AtomicUsize::new(0),
            count_limit: AtomicUsize::new(count_limit),
            suspended: AtomicUsize::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    #[inline]
    fn shard(&self, key: &K) -> &Mutex<HashMap<K, Slot<V>>> {
        &self.shards[(self.hasher.hash_one(key) as usize) % SHARDS]
    }

    #[inline]
    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed)
    }

    // Caller holds the shard lock for `key`.
    fn touch(&self, key: &K, slot: &mut Slot<V>) {
        let old = slot.tick;
        slot.tick = self.tick();
        let mut lru = self.lru.lock();
        lru.remove(&old);
        lru.insert(slot.tick, key.clone());
    }

    // Caller holds the shard lock for `key`.
    fn admit(&self, map: &mut HashMap<K, Slot<V>>, key: K, value: V) {
        let tick = self.tick();
        self.lru.lock().insert(tick, key.clone());
        map.insert(key, Slot { value, tick });
        self.len.fetch_add(1, Ordering::Relaxed);
    }

    /// Lookup without materializing. Counts as a use.
    pub fn get(&self, key: &K) -> Option<V> {
        let mut map = self.shard(key).lock();
        match map.get_mut(key) {
            Some(slot) => {
                self.touch(key, slot);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(slot.value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Returns the cached value or stores the one built by `factory`.
    ///
    /// The factory runs under the key's shard lock, so a key is built at most once
    /// even under contention. It must not call back into this cache.
    pub fn get_or_create(&self, key: K, factory: impl FnOnce() -> V) -> V {
        match self.try_get_or_create(key, || Ok::<V, std::convert::Infallible>(factory())) {
            Ok(v) => v,
            Err(never) => match never {},
        }
    }

    /// Fallible [`get_or_create`](Self::get_or_create); on error nothing is stored.
    pub fn try_get_or_create<E>(&self, key: K, factory: impl FnOnce() -> Result<V, E>) -> Result<V, E> {
        let value = {
            let mut map = self.shard(&key).lock();
            if let Some(slot) = map.get_mut(&key) {
                self.touch(&key, slot);
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(slot.value.clone());
            }
            self.misses.fetch_add(1, Ordering::Relaxed);
            let value = factory()?;
            self.admit(&mut map, key, value.clone());
            value
        };
        self.enforce_limits();
        Ok(value)
    }

    /// Inserts or replaces, returning the previous value.
    pub fn set(&self, key: K, value: V) -> Option<V> {
        let old = {
            let mut map = self.shard(&key).lock();
            match map.get_mut(&key) {
                Some(slot) => {
                    let old = std::mem::replace(&mut slot.value, value);
                    self.touch(&key, slot);
                    Some(old)
                }
                None => {
                    self.admit(&mut map, key, value);
                    None
                }
            }
        };
        self.enforce_limits();
        old
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let mut map = self.shard(key).lock();
        let slot = map.remove(key)?;
        self.lru.lock().remove(&slot.tick);
        self.len.fetch_sub(1, Ordering::Relaxed);
        Some(slot.value)
    }

    /// Presence check that does not affect recency.
    pub fn contains(&self, key: &K) -> bool {
        self.shard(key).lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resident keys, least recently used first.
    pub fn keys(&self) -> Vec<K> {
        self.lru.lock().values().cloned().collect()
    }

    pub fn values(&self) -> Vec<V> {
        let mut out = Vec::with_capacity(self.len());
        for shard in self.shards.iter() {
            out.extend(shard.lock().values().map(|s| s.value.clone()));
        }
        out
    }

    pub fn count_limit(&self) -> usize {
        self.count_limit.load(Ordering::Relaxed)
    }

    pub fn set_count_limit(&self, limit: usize) {
        self.count_limit.store(limit, Ordering::Relaxed);
        self.enforce_limits();
    }

    /// Evicts least recently used entries until the count is within the limit.
    /// Does nothing while enforcement is suspended. Returns the number evicted.
    pub fn enforce_limits(&self) -> usize {
        let mut evicted = 0;
        while self.suspended.load(Ordering::Acquire) == 0 && self.len() > self.count_limit() {
            let Some((tick, key)) = self.lru.lock().first_key_value().map(|(t, k)| (*t, k.clone()))
            else {
                break;
            };
            let mut map = self.shard(&key).lock();
            // The entry may have been touched or removed since the peek.
            if map.get(&key).is_some_and(|s| s.tick == tick) {
                map.remove(&key);
                self.lru.lock().remove(&tick);
                self.len.fetch_sub(1, Ordering::Relaxed);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                evicted += 1;
            }
        }
        if evicted > 0 {
            log::debug!(target: "cache", "evicted {evicted} entries (limit {})", self.count_limit());
        }
        evicted
    }

    /// Pauses eviction; calls nest. Pair with [`resume_limit_enforcement`](Self::resume_limit_enforcement).
    pub fn suspend_limit_enforcement(&self) {
        self.suspended.fetch_add(1, Ordering::AcqRel);
    }

    /// Ends one suspension; the last one to end enforces the limit.
    pub fn resume_limit_enforcement(&self) {
        let prev = self.suspended.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "resume without matching suspend");
        if prev == 1 {
            self.enforce_limits();
        }
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended.load(Ordering::Acquire) > 0
    }

    /// Suspends eviction until the returned guard drops.
    pub fn suspended(&self) -> SuspendGuard<'_, K, V> {
        self.suspend_limit_enforcement();
        SuspendGuard { cache: self }
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.len(),
        }
    }
}

pub struct SuspendGuard<'a, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    cache: &'a SparseCache<K, V>,
}

impl<K, V> Drop for SuspendGuard<'_, K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn drop(&mut self) {
        self.cache.resume_limit_enforcement();
    }
}
