//! Maps user keys to a 128-bit fingerprint split into a `keyHash` and a
//! `conflictHash`. `keyHash` indexes store shards, ring stripes and ledger
//! entries; `conflictHash` disambiguates a shard collision at read time
//! without storing the original key.

use std::hash::{BuildHasher, Hash, Hasher};

use ahash::RandomState as AHashState;
use xxhash_rust::xxh3::Xxh3;

/// Overridable key-hashing contract. The default implementation is
/// deterministic across calls for a given key (required — admission
/// fairness depends on stable frequency counting) but is **not** required
/// to be deterministic across process restarts, matching `ahash`'s
/// per-process random seed.
pub trait KeyHasher<K: ?Sized>: Send + Sync {
    fn hash_key(&self, key: &K) -> (u64, u64);
}

/// Two independent hashers over the key's `Hash` impl: `ahash` for the
/// primary fingerprint, `xxh3` for the conflict fingerprint. Using two
/// different hash families (rather than one hasher seeded twice) keeps the
/// pair close to independent, which is what the sampled-LFU conflict check
/// relies on.
pub struct DefaultKeyHasher {
    primary: AHashState,
}

impl Default for DefaultKeyHasher {
    fn default() -> Self {
        Self {
            primary: AHashState::new(),
        }
    }
}

impl<K: Hash + ?Sized> KeyHasher<K> for DefaultKeyHasher {
    fn hash_key(&self, key: &K) -> (u64, u64) {
        let mut h1 = self.primary.build_hasher();
        key.hash(&mut h1);
        let key_hash = h1.finish();

        let mut h2 = Xxh3::new();
        key.hash(&mut h2);
        let conflict_hash = h2.finish();

        (key_hash, conflict_hash)
    }
}
