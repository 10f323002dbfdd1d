//! Sharded concurrent key/value store. 256 shards, each behind its own
//! `parking_lot::RwLock`, so reads across different shards never block
//! each other. Keys are stored only as their 64-bit fingerprint pair
//! (`key_hash`, `conflict_hash`) — the original key is never retained,
//! matching `behrouz-rfa-memory-cache-rust`'s `Store<T>` trait naming
//! (`store.rs`) combined with `mambisi-beardb/rcache/src/sharded_map.rs`'s
//! actually-working `ShardedMap`/`LockedMap` split, which the former
//! never implemented beyond `todo!()` stubs.

use std::collections::HashMap;
use std::time::SystemTime;

use parking_lot::RwLock;

use crate::ttl::ExpirationMap;

const NUM_SHARDS: usize = 256;

#[derive(Clone)]
pub struct StoredItem<V> {
    pub conflict: u64,
    pub value: V,
    pub cost: i64,
    pub expires_at: Option<SystemTime>,
}

/// Value returned to the processor when a write displaces an existing
/// entry, so `OnEvict`/cost bookkeeping can see what was there before.
pub struct Removed<V> {
    pub conflict: u64,
    pub value: V,
}

struct Shard<V> {
    data: RwLock<HashMap<u64, StoredItem<V>>>,
}

impl<V: Clone> Shard<V> {
    fn new() -> Self {
        Shard {
            data: RwLock::new(HashMap::new()),
        }
    }

    fn get(&self, key: u64, conflict: u64) -> Option<V> {
        let data = self.data.read();
        let item = data.get(&key)?;
        if conflict != 0 && conflict != item.conflict {
            return None;
        }
        if let Some(expires_at) = item.expires_at {
            if SystemTime::now() > expires_at {
                return None;
            }
        }
        Some(item.value.clone())
    }

    fn expiration(&self, key: u64) -> Option<SystemTime> {
        self.data.read().get(&key).and_then(|i| i.expires_at)
    }

    fn set(&self, key: u64, item: StoredItem<V>, em: &ExpirationMap) -> Option<Removed<V>> {
        let mut data = self.data.write();
        if let Some(existing) = data.get(&key) {
            if item.conflict != 0 && item.conflict != existing.conflict {
                return None;
            }
        }
        if let Some(expires_at) = item.expires_at {
            em.add(key, item.conflict, expires_at);
        }
        data.insert(key, item).map(|prev| Removed {
            conflict: prev.conflict,
            value: prev.value,
        })
    }

    fn update(&self, key: u64, item: StoredItem<V>, em: &ExpirationMap) -> Option<V> {
        let mut data = self.data.write();
        let existing = data.get(&key)?;
        if item.conflict != 0 && item.conflict != existing.conflict {
            return None;
        }
        match (existing.expires_at, item.expires_at) {
            (Some(old), Some(new)) => em.update(key, item.conflict, old, new),
            (None, Some(new)) => em.add(key, item.conflict, new),
            (Some(old), None) => em.remove(key, old),
            (None, None) => {}
        }
        data.insert(key, item).map(|prev| prev.value)
    }

    fn remove(&self, key: u64, conflict: u64, em: &ExpirationMap) -> Option<(u64, V)> {
        let mut data = self.data.write();
        let item = data.get(&key)?;
        if conflict != 0 && conflict != item.conflict {
            return None;
        }
        if let Some(expires_at) = item.expires_at {
            em.remove(key, expires_at);
        }
        let item = data.remove(&key)?;
        Some((item.conflict, item.value))
    }

    fn clear(&self, mut on_evict: impl FnMut(u64, &StoredItem<V>)) {
        let mut data = self.data.write();
        for (key, item) in data.iter() {
            on_evict(*key, item);
        }
        data.clear();
    }

    fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Calls `f(key, &value)` for every live (non-expired) entry in this
    /// shard, stopping early if `f` returns `false`. Returns `false` itself
    /// if the caller should stop visiting further shards.
    fn for_each(&self, f: &mut impl FnMut(u64, u64, &V) -> bool) -> bool {
        let data = self.data.read();
        let now = SystemTime::now();
        for (key, item) in data.iter() {
            if let Some(expires_at) = item.expires_at {
                if now > expires_at {
                    continue;
                }
            }
            if !f(*key, item.conflict, &item.value) {
                return false;
            }
        }
        true
    }
}

/// 256-shard map keyed by `key % NUM_SHARDS`. Shares one [`ExpirationMap`]
/// across all shards since TTL sweeping is bucketed by time, not by shard.
pub struct Store<V> {
    shards: Vec<Shard<V>>,
    expirations: ExpirationMap,
}

impl<V: Clone> Store<V> {
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(NUM_SHARDS);
        shards.resize_with(NUM_SHARDS, Shard::new);
        Store {
            shards,
            expirations: ExpirationMap::new(),
        }
    }

    fn shard_for(&self, key: u64) -> &Shard<V> {
        &self.shards[(key % NUM_SHARDS as u64) as usize]
    }

    pub fn get(&self, key: u64, conflict: u64) -> Option<V> {
        self.shard_for(key).get(key, conflict)
    }

    pub fn expiration(&self, key: u64) -> Option<SystemTime> {
        self.shard_for(key).expiration(key)
    }

    pub fn set(&self, key: u64, item: StoredItem<V>) -> Option<Removed<V>> {
        self.shard_for(key).set(key, item, &self.expirations)
    }

    pub fn update(&self, key: u64, item: StoredItem<V>) -> Option<V> {
        self.shard_for(key).update(key, item, &self.expirations)
    }

    pub fn remove(&self, key: u64, conflict: u64) -> Option<(u64, V)> {
        self.shard_for(key).remove(key, conflict, &self.expirations)
    }

    pub fn clear(&self, mut on_evict: impl FnMut(u64, &StoredItem<V>)) {
        for shard in &self.shards {
            shard.clear(&mut on_evict);
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(Shard::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Best-effort traversal across all shards; not a consistent snapshot,
    /// matching `spec.md`'s `for_each` contract.
    pub fn for_each(&self, mut f: impl FnMut(u64, u64, &V) -> bool) {
        for shard in &self.shards {
            if !shard.for_each(&mut f) {
                break;
            }
        }
    }

    /// Sweeps one fully-elapsed expiration bucket, removing entries whose
    /// expiration is still in the past (an update may have moved a key to
    /// a later bucket since the sweep bucket was formed, in which case it
    /// is left alone).
    pub fn sweep_expired(&self, mut on_expire: impl FnMut(u64, u64, V)) {
        let now = SystemTime::now();
        let Some(bucket) = self.expirations.sweep(now) else {
            return;
        };
        for (key, conflict) in bucket {
            if let Some(expires_at) = self.shard_for(key).expiration(key) {
                if expires_at > now {
                    continue;
                }
            } else {
                continue;
            }
            if let Some((conflict, value)) = self.shard_for(key).remove(key, conflict, &self.expirations) {
                on_expire(key, conflict, value);
            }
        }
    }
}

impl<V: Clone> Default for Store<V> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn item(value: &str, cost: i64) -> StoredItem<String> {
        StoredItem {
            conflict: 0,
            value: value.to_string(),
            cost,
            expires_at: None,
        }
    }

    #[test]
    fn set_then_get_round_trips() {
        let s = Store::new();
        s.set(1, item("a", 1));
        assert_eq!(s.get(1, 0), Some("a".to_string()));
    }

    #[test]
    fn get_respects_conflict_hash() {
        let s = Store::new();
        s.set(1, StoredItem { conflict: 7, value: "a".to_string(), cost: 1, expires_at: None });
        assert_eq!(s.get(1, 7), Some("a".to_string()));
        assert_eq!(s.get(1, 8), None);
    }

    #[test]
    fn expired_item_reads_as_miss_but_is_not_removed() {
        let s = Store::new();
        let past = SystemTime::now() - Duration::from_secs(10);
        s.set(1, StoredItem { conflict: 0, value: "a".to_string(), cost: 1, expires_at: Some(past) });
        assert_eq!(s.get(1, 0), None);
        assert_eq!(s.len(), 1);
    }

    #[test]
    fn remove_returns_conflict_and_value() {
        let s = Store::new();
        s.set(1, StoredItem { conflict: 9, value: "a".to_string(), cost: 1, expires_at: None });
        assert_eq!(s.remove(1, 9), Some((9, "a".to_string())));
        assert_eq!(s.get(1, 9), None);
    }

    #[test]
    fn clear_invokes_callback_for_every_item() {
        let s = Store::new();
        s.set(1, item("a", 1));
        s.set(2, item("b", 1));
        let mut seen = Vec::new();
        s.clear(|k, i| seen.push((k, i.value.clone())));
        seen.sort();
        assert_eq!(seen, vec![(1, "a".to_string()), (2, "b".to_string())]);
        assert_eq!(s.len(), 0);
    }

    #[test]
    fn for_each_visits_every_live_entry() {
        let s = Store::new();
        s.set(1, item("a", 1));
        s.set(2, item("b", 1));
        let mut seen = Vec::new();
        s.for_each(|k, _conflict, v| {
            seen.push((k, v.clone()));
            true
        });
        seen.sort();
        assert_eq!(seen, vec![(1, "a".to_string()), (2, "b".to_string())]);
    }

    #[test]
    fn for_each_skips_expired_entries() {
        let s = Store::new();
        let past = SystemTime::now() - Duration::from_secs(10);
        s.set(1, StoredItem { conflict: 0, value: "a".to_string(), cost: 1, expires_at: Some(past) });
        s.set(2, item("b", 1));
        let mut seen = Vec::new();
        s.for_each(|k, _conflict, v| {
            seen.push((k, v.clone()));
            true
        });
        assert_eq!(seen, vec![(2, "b".to_string())]);
    }

    #[test]
    fn for_each_stops_early_when_fn_returns_false() {
        let s = Store::new();
        s.set(1, item("a", 1));
        s.set(2, item("b", 1));
        let mut visits = 0;
        s.for_each(|_k, _conflict, _v| {
            visits += 1;
            false
        });
        assert_eq!(visits, 1);
    }
}
