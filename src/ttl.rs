//! Bucketed expiration index. Items carrying a TTL are indexed by which
//! `BUCKET_DURATION`-wide window their expiration falls into, so the
//! processor's ticker can sweep one fully-elapsed bucket at a time instead
//! of scanning every stored item. Grounded in
//! `mambisi-beardb/rcache/src/ttl.rs`'s `ExpirationMap<V>`.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::RwLock;

pub const BUCKET_DURATION: Duration = Duration::from_secs(5);

type Bucket = HashMap<u64, u64>;

fn duration_bucket(t: SystemTime) -> i64 {
    let secs = t
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs() as i64;
    secs / BUCKET_DURATION.as_secs() as i64 + 1
}

/// The bucket swept by a cleanup tick firing at `t` — always one bucket
/// behind the storage bucket, so a sweep only ever touches windows that
/// have fully elapsed.
fn clean_bucket(t: SystemTime) -> i64 {
    duration_bucket(t) - 1
}

#[derive(Default)]
pub struct ExpirationMap {
    buckets: RwLock<HashMap<i64, Bucket>>,
}

impl ExpirationMap {
    pub fn new() -> Self {
        ExpirationMap::default()
    }

    pub fn add(&self, key: u64, conflict: u64, expires_at: SystemTime) {
        let mut buckets = self.buckets.write();
        insert(&mut buckets, key, conflict, expires_at);
    }

    pub fn update(&self, key: u64, conflict: u64, old_expires_at: SystemTime, new_expires_at: SystemTime) {
        let mut buckets = self.buckets.write();
        remove(&mut buckets, key, old_expires_at);
        insert(&mut buckets, key, conflict, new_expires_at);
    }

    pub fn remove(&self, key: u64, expires_at: SystemTime) {
        let mut buckets = self.buckets.write();
        remove(&mut buckets, key, expires_at);
    }

    /// Pops and returns the bucket whose window has fully elapsed as of
    /// `now`, if any. Entries it contains are candidates for removal —
    /// callers must still re-check each entry's live expiration, since an
    /// update may have moved it to a later bucket after this one was
    /// formed.
    pub fn sweep(&self, now: SystemTime) -> Option<Vec<(u64, u64)>> {
        let mut buckets = self.buckets.write();
        let id = clean_bucket(now);
        buckets.remove(&id).map(|b| b.into_iter().collect())
    }
}

fn insert(buckets: &mut HashMap<i64, Bucket>, key: u64, conflict: u64, expires_at: SystemTime) {
    buckets
        .entry(duration_bucket(expires_at))
        .or_insert_with(HashMap::new)
        .insert(key, conflict);
}

fn remove(buckets: &mut HashMap<i64, Bucket>, key: u64, expires_at: SystemTime) {
    if let Some(bucket) = buckets.get_mut(&duration_bucket(expires_at)) {
        bucket.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A sweep only pops the single bucket immediately behind `now` (the
    // processor's ticker is expected to walk forward one bucket at a time
    // as real time passes); an expiration further in the past than one
    // bucket width sits in a bucket a sweep at `now` never visits.
    #[test]
    fn add_then_sweep_finds_expired_bucket() {
        let em = ExpirationMap::new();
        let past = SystemTime::now() - BUCKET_DURATION;
        em.add(1, 2, past);
        let swept = em.sweep(SystemTime::now());
        assert_eq!(swept, Some(vec![(1, 2)]));
    }

    #[test]
    fn update_moves_entry_between_buckets() {
        let em = ExpirationMap::new();
        let past = SystemTime::now() - BUCKET_DURATION;
        let future = SystemTime::now() + Duration::from_secs(3600);
        em.add(1, 2, past);
        em.update(1, 2, past, future);
        assert_eq!(em.sweep(SystemTime::now()), None);
    }

    #[test]
    fn remove_drops_entry_before_sweep() {
        let em = ExpirationMap::new();
        let past = SystemTime::now() - BUCKET_DURATION;
        em.add(1, 2, past);
        em.remove(1, past);
        assert_eq!(em.sweep(SystemTime::now()), None);
    }
}
