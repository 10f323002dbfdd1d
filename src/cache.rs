//! Public cache contract: `Config`/`CacheBuilder` and the `Cache` type
//! itself. Structure (fast-path Get bypassing the processor entirely, Set
//! going through the buffered channel, `Arc`-shared internals cloned into
//! the Store/Ring/Processor trio) is grounded in
//! `mambisi-beardb/rcache/src/lib.rs`'s `Cache<K, V>`; option names
//! (`NumCounters`, `MaxCost`, `BufferItems`, `Metrics`, `KeyToHash`,
//! `OnEvict`, `OnReject`, `Cost`) match `behrouz-rfa-memory-cache-rust`'s
//! own `cache.rs` `Config`, which never got past declaring the fields.

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::warn;

use crate::buffer::{set_buffer, NewItem, SetEvent};
use crate::error::ConfigError;
use crate::hash::{DefaultKeyHasher, KeyHasher};
use crate::metrics::{MetricType, Metrics};
use crate::policy::Policy;
use crate::processor::{Callbacks, Processor};
use crate::ring::{RingBuffer, RingConsumer};
use crate::store::{Store, StoredItem};

const DEFAULT_NUM_COUNTERS: i64 = 1_000_000;
const DEFAULT_MAX_COST: i64 = 1 << 30;
const DEFAULT_BUFFER_ITEMS: usize = 64;
const DEFAULT_CLEANUP_TICK: Duration = Duration::from_secs(2);

type OnEvictFn<V> = Arc<dyn Fn(u64, u64, Option<V>, i64) + Send + Sync>;
type OnRejectFn<V> = Arc<dyn Fn(u64, u64, Option<V>, i64) + Send + Sync>;
type OnExitFn<V> = Arc<dyn Fn(V) + Send + Sync>;
type CostFn<V> = Arc<dyn Fn(&V) -> i64 + Send + Sync>;

/// Tunables accepted by [`CacheBuilder`]. Constructed indirectly — use the
/// builder rather than this struct's fields directly.
pub struct Config<K, V, S = DefaultKeyHasher> {
    num_counters: i64,
    max_cost: i64,
    buffer_items: usize,
    metrics: bool,
    ignore_internal_cost: bool,
    default_ttl: Option<Duration>,
    cleanup_tick: Duration,
    key_hasher: S,
    cost_fn: Option<CostFn<V>>,
    on_evict: Option<OnEvictFn<V>>,
    on_reject: Option<OnRejectFn<V>>,
    on_exit: Option<OnExitFn<V>>,
    _marker: std::marker::PhantomData<K>,
}

impl<K, V> Default for Config<K, V, DefaultKeyHasher> {
    fn default() -> Self {
        Config {
            num_counters: DEFAULT_NUM_COUNTERS,
            max_cost: DEFAULT_MAX_COST,
            buffer_items: DEFAULT_BUFFER_ITEMS,
            metrics: false,
            ignore_internal_cost: false,
            default_ttl: None,
            cleanup_tick: DEFAULT_CLEANUP_TICK,
            key_hasher: DefaultKeyHasher::default(),
            cost_fn: None,
            on_evict: None,
            on_reject: None,
            on_exit: None,
            _marker: std::marker::PhantomData,
        }
    }
}

/// Builds a [`Cache`], validating required options at `build()`/`try_build()`
/// time rather than panicking deep inside cache operations.
pub struct CacheBuilder<K, V, S = DefaultKeyHasher> {
    config: Config<K, V, S>,
}

impl<K, V> CacheBuilder<K, V, DefaultKeyHasher> {
    pub fn new() -> Self {
        CacheBuilder {
            config: Config::default(),
        }
    }
}

impl<K, V> Default for CacheBuilder<K, V, DefaultKeyHasher> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> CacheBuilder<K, V, S> {
    pub fn num_counters(mut self, n: i64) -> Self {
        self.config.num_counters = n;
        self
    }

    pub fn max_cost(mut self, n: i64) -> Self {
        self.config.max_cost = n;
        self
    }

    pub fn buffer_items(mut self, n: usize) -> Self {
        self.config.buffer_items = n;
        self
    }

    pub fn metrics(mut self, enabled: bool) -> Self {
        self.config.metrics = enabled;
        self
    }

    pub fn ignore_internal_cost(mut self, ignore: bool) -> Self {
        self.config.ignore_internal_cost = ignore;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.config.default_ttl = Some(ttl);
        self
    }

    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.config.cleanup_tick = interval;
        self
    }

    pub fn key_hasher<S2>(self, hasher: S2) -> CacheBuilder<K, V, S2> {
        CacheBuilder {
            config: Config {
                num_counters: self.config.num_counters,
                max_cost: self.config.max_cost,
                buffer_items: self.config.buffer_items,
                metrics: self.config.metrics,
                ignore_internal_cost: self.config.ignore_internal_cost,
                default_ttl: self.config.default_ttl,
                cleanup_tick: self.config.cleanup_tick,
                key_hasher: hasher,
                cost_fn: self.config.cost_fn,
                on_evict: self.config.on_evict,
                on_reject: self.config.on_reject,
                on_exit: self.config.on_exit,
                _marker: std::marker::PhantomData,
            },
        }
    }

    pub fn cost_fn(mut self, f: impl Fn(&V) -> i64 + Send + Sync + 'static) -> Self {
        self.config.cost_fn = Some(Arc::new(f));
        self
    }

    pub fn on_evict(mut self, f: impl Fn(u64, u64, Option<V>, i64) + Send + Sync + 'static) -> Self {
        self.config.on_evict = Some(Arc::new(f));
        self
    }

    pub fn on_reject(mut self, f: impl Fn(u64, u64, Option<V>, i64) + Send + Sync + 'static) -> Self {
        self.config.on_reject = Some(Arc::new(f));
        self
    }

    pub fn on_exit(mut self, f: impl Fn(V) + Send + Sync + 'static) -> Self {
        self.config.on_exit = Some(Arc::new(f));
        self
    }
}

impl<K, V, S> CacheBuilder<K, V, S>
where
    K: Hash,
    S: KeyHasher<K> + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn try_build(self) -> Result<Cache<K, V, S>, ConfigError> {
        let c = &self.config;
        if c.num_counters <= 0 {
            return Err(ConfigError::ZeroCounters);
        }
        if c.max_cost <= 0 {
            return Err(ConfigError::ZeroMaxCost);
        }
        if c.buffer_items == 0 {
            return Err(ConfigError::ZeroBufferItems);
        }
        Ok(Cache::from_config(self.config))
    }

    pub fn build(self) -> Cache<K, V, S> {
        self.try_build().expect("invalid cache configuration")
    }
}

struct PolicyRingAdapter {
    policy: Arc<Policy>,
}

impl RingConsumer for PolicyRingAdapter {
    fn push(&self, keys: Vec<u64>) -> bool {
        self.policy.push(&keys);
        true
    }
}

/// A bounded, concurrent cache combining TinyLFU admission with
/// sampled-LFU eviction. Reads never block on the background processor;
/// writes are buffered and applied asynchronously, so `set` returning
/// does not mean the key is visible to a subsequent `get` yet (see
/// [`Cache::wait`]).
pub struct Cache<K, V, S = DefaultKeyHasher> {
    store: Arc<Store<V>>,
    policy: Arc<Policy>,
    ring: RingBuffer<PolicyRingAdapter>,
    set_tx: crossbeam_channel::Sender<SetEvent<V>>,
    processor: std::sync::Mutex<Option<Processor<V>>>,
    callbacks: Arc<Callbacks<V>>,
    cleanup_tick: Duration,
    metrics: Option<Metrics>,
    closed: AtomicBool,
    key_hasher: S,
    cost_fn: Option<CostFn<V>>,
    default_ttl: Option<Duration>,
    ignore_internal_cost: bool,
    _marker: std::marker::PhantomData<K>,
}

impl<K, V> Cache<K, V, DefaultKeyHasher>
where
    K: Hash,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        CacheBuilder::new().build()
    }
}

impl<K, V> Default for Cache<K, V, DefaultKeyHasher>
where
    K: Hash,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S> Cache<K, V, S>
where
    K: Hash,
    S: KeyHasher<K> + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn from_config(config: Config<K, V, S>) -> Self {
        let metrics = if config.metrics { Some(Metrics::new()) } else { None };
        let store = Arc::new(Store::new());
        let policy = Arc::new(Policy::new(config.num_counters, config.max_cost, metrics.clone()));
        let ring = RingBuffer::new(
            Arc::new(PolicyRingAdapter { policy: policy.clone() }),
            config.buffer_items,
        );
        let (set_tx, set_rx) = set_buffer();

        let callbacks = Arc::new(Callbacks {
            on_evict: config.on_evict.clone(),
            on_reject: config.on_reject.clone(),
            on_exit: config.on_exit.clone(),
        });

        let processor = Processor::spawn(
            set_rx,
            store.clone(),
            policy.clone(),
            metrics.clone(),
            callbacks.clone(),
            config.cleanup_tick,
        );

        Cache {
            store,
            policy,
            ring,
            set_tx,
            processor: std::sync::Mutex::new(Some(processor)),
            callbacks,
            cleanup_tick: config.cleanup_tick,
            metrics,
            closed: AtomicBool::new(false),
            key_hasher: config.key_hasher,
            cost_fn: config.cost_fn,
            default_ttl: config.default_ttl,
            ignore_internal_cost: config.ignore_internal_cost,
            _marker: std::marker::PhantomData,
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Looks up `key`. Never blocks: a contended ring-buffer stripe just
    /// means this Get's frequency sample is dropped, not that the read
    /// waits.
    pub fn get(&self, key: &K) -> Option<V> {
        if self.is_closed() {
            return None;
        }
        let (key_hash, conflict_hash) = self.key_hasher.hash_key(key);
        let kept = self.ring.push(key_hash);
        let value = self.store.get(key_hash, conflict_hash);
        if let Some(m) = &self.metrics {
            if value.is_some() {
                m.add(MetricType::Hit, key_hash, 1);
            } else {
                m.add(MetricType::Miss, key_hash, 1);
            }
            if kept {
                m.add(MetricType::KeepGets, key_hash, 1);
            } else {
                m.add(MetricType::DropGets, key_hash, 1);
            }
        }
        value
    }

    pub fn set(&self, key: K, value: V) -> bool {
        self.set_with_cost_and_ttl(key, value, 0, self.default_ttl)
    }

    pub fn set_with_cost(&self, key: K, value: V, cost: i64) -> bool {
        self.set_with_cost_and_ttl(key, value, cost, self.default_ttl)
    }

    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) -> bool {
        self.set_with_cost_and_ttl(key, value, 0, Some(ttl))
    }

    pub fn set_with_cost_and_ttl(&self, key: K, value: V, cost: i64, ttl: Option<Duration>) -> bool {
        if self.is_closed() {
            return false;
        }
        let (key_hash, conflict_hash) = self.key_hasher.hash_key(&key);

        let mut cost = if cost > 0 {
            cost
        } else if let Some(cost_fn) = &self.cost_fn {
            cost_fn(&value)
        } else {
            0
        };
        if !self.ignore_internal_cost {
            cost += std::mem::size_of::<StoredItem<V>>() as i64;
        }

        let expires_at = ttl.map(|d| SystemTime::now() + d);

        let prev = self.store.update(
            key_hash,
            StoredItem {
                conflict: conflict_hash,
                value: value.clone(),
                cost,
                expires_at,
            },
        );

        let updated_in_place = prev.is_some();
        if let Some(prev) = prev {
            self.callbacks.exit(prev);
        }
        let event = if updated_in_place {
            SetEvent::Update(NewItem {
                key: key_hash,
                conflict: conflict_hash,
                value,
                cost,
                expires_at,
            })
        } else {
            SetEvent::New(NewItem {
                key: key_hash,
                conflict: conflict_hash,
                value,
                cost,
                expires_at,
            })
        };

        match self.set_tx.try_send(event) {
            Ok(()) => true,
            Err(_) => {
                if let Some(m) = &self.metrics {
                    m.add(MetricType::DropSets, key_hash, 1);
                }
                // The store was already mutated synchronously for an update
                // to an existing entry, so the caller sees `true` even
                // though the policy-side event was dropped — the policy's
                // cost bookkeeping just lags until the next admission.
                updated_in_place
            }
        }
    }

    /// Removes `key` from the store synchronously, then enqueues a Delete
    /// event so the policy ledger catches up. Runs the exit callback here
    /// rather than in the processor, since the store was already mutated
    /// on this thread and the processor's own `store.remove` would just
    /// find nothing left to remove.
    pub fn delete(&self, key: &K) {
        if self.is_closed() {
            return;
        }
        let (key_hash, conflict_hash) = self.key_hasher.hash_key(key);
        if let Some((_, value)) = self.store.remove(key_hash, conflict_hash) {
            self.callbacks.exit(value);
        }
        let _ = self.set_tx.try_send(SetEvent::Delete {
            key: key_hash,
            conflict: conflict_hash,
        });
    }

    /// Blocks until every Set/Delete queued before this call has been
    /// applied by the processor.
    pub fn wait(&self) {
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        if self.set_tx.send(SetEvent::Sync { ack: ack_tx }).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Returns `0` on a closed cache, per spec.md §7's "Closed" contract.
    pub fn len(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        self.store.len()
    }

    /// Returns `true` on a closed cache, per spec.md §7's "Closed" contract.
    pub fn is_empty(&self) -> bool {
        if self.is_closed() {
            return true;
        }
        self.store.is_empty()
    }

    /// Returns `0` on a closed cache, per spec.md §7's "Closed" contract.
    pub fn max_cost(&self) -> i64 {
        if self.is_closed() {
            return 0;
        }
        self.policy.max_cost()
    }

    /// Alias for [`Cache::max_cost`].
    pub fn max_capacity(&self) -> i64 {
        self.max_cost()
    }

    /// Sum of the costs of every currently admitted item, per the policy
    /// ledger. May transiently differ from the sum a full store scan would
    /// report while events are still in flight through the set buffer.
    /// Returns `0` on a closed cache, per spec.md §7's "Closed" contract.
    pub fn used_capacity(&self) -> i64 {
        if self.is_closed() {
            return 0;
        }
        self.policy.used()
    }

    /// No-op on a closed cache, per spec.md §7's "Closed" contract.
    pub fn set_capacity(&self, max_cost: i64) {
        if self.is_closed() {
            return;
        }
        self.policy.update_max_cost(max_cost);
    }

    /// Returns `None` on a closed cache, per spec.md §7's "Closed" contract.
    pub fn metrics(&self) -> Option<&Metrics> {
        if self.is_closed() {
            return None;
        }
        self.metrics.as_ref()
    }

    /// Best-effort traversal of every currently present item. `f` receives
    /// each key's fingerprint pair and a reference to its value; returning
    /// `false` stops the traversal early. Concurrent writes may mean an
    /// item inserted mid-traversal is missed, and the snapshot is not
    /// consistent across shards. A closed cache visits nothing, per
    /// spec.md §7's "Closed" contract.
    pub fn for_each(&self, f: impl FnMut(u64, u64, &V) -> bool) {
        if self.is_closed() {
            return;
        }
        self.store.for_each(f);
    }

    /// Clears every entry: stops the processor, drains whatever it still
    /// had queued (firing the evict callback for undelivered New events —
    /// they never reached the store, so "evicted before admission" is the
    /// closest honest description), wipes the policy and store, resets
    /// metrics if enabled, then restarts the processor on the same
    /// channel. Concurrent `set` calls racing a `clear` may still land
    /// afterward — a `set` enqueued after `clear` starts draining but
    /// before the new processor takes over is not rolled back.
    pub fn clear(&self) {
        let mut guard = self.processor.lock().unwrap_or_else(|e| e.into_inner());
        let Some(processor) = guard.take() else {
            warn!("cache clear() called on a closed cache");
            return;
        };
        let receiver = processor.stop();

        while let Ok(event) = receiver.try_recv() {
            match event {
                SetEvent::New(item) => {
                    self.callbacks
                        .evict(item.key, item.conflict, Some(item.value.clone()), item.cost);
                    self.callbacks.exit(item.value);
                }
                SetEvent::Update(_) | SetEvent::Delete { .. } => {
                    // The store was already mutated (or already matched) on
                    // the caller's thread; the store-wide clear below fires
                    // the exit callback for whatever is still present.
                }
                SetEvent::Sync { ack } => {
                    let _ = ack.send(());
                }
            }
        }

        self.policy.clear();
        let callbacks = &self.callbacks;
        self.store.clear(|_key, item| callbacks.exit(item.value.clone()));

        if let Some(m) = &self.metrics {
            m.clear();
        }

        let processor = Processor::spawn(
            receiver,
            self.store.clone(),
            self.policy.clone(),
            self.metrics.clone(),
            self.callbacks.clone(),
            self.cleanup_tick,
        );
        *guard = Some(processor);
    }

    /// Stops the background processor. Further `get`/`set` calls become
    /// no-ops; in-flight buffered writes are dropped.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        if let Some(processor) = self.processor.lock().unwrap_or_else(|e| e.into_inner()).take() {
            drop(processor.stop());
        } else {
            warn!("cache close() called more than once");
        }
    }
}

impl<K, V, S> Drop for Cache<K, V, S> {
    fn drop(&mut self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_wait_then_get_round_trips() {
        let c: Cache<&str, i32> = Cache::new();
        c.set("a", 1);
        c.wait();
        assert_eq!(c.get(&"a"), Some(1));
    }

    #[test]
    fn delete_removes_visible_value() {
        let c: Cache<&str, i32> = Cache::new();
        c.set("a", 1);
        c.wait();
        c.delete(&"a");
        assert_eq!(c.get(&"a"), None);
    }

    #[test]
    fn closed_cache_ignores_reads_and_writes() {
        let c: Cache<&str, i32> = Cache::new();
        c.close();
        assert!(!c.set("a", 1));
        assert_eq!(c.get(&"a"), None);
    }

    #[test]
    fn try_build_rejects_zero_counters() {
        let err = CacheBuilder::<&str, i32>::new().num_counters(0).try_build();
        assert_eq!(err.err(), Some(ConfigError::ZeroCounters));
    }

    #[test]
    fn try_build_rejects_zero_max_cost() {
        let err = CacheBuilder::<&str, i32>::new().max_cost(0).try_build();
        assert_eq!(err.err(), Some(ConfigError::ZeroMaxCost));
    }

    #[test]
    fn set_with_ttl_expires_after_sweep() {
        let c: Cache<&str, i32> = CacheBuilder::new()
            .with_cleanup_interval(Duration::from_millis(20))
            .build();
        c.set_with_ttl("a", 1, Duration::from_millis(1));
        c.wait();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(c.get(&"a"), None);
    }

    #[test]
    fn metrics_track_hits_and_misses() {
        let c: Cache<&str, i32> = CacheBuilder::new().metrics(true).build();
        c.set("a", 1);
        c.wait();
        c.get(&"a");
        c.get(&"missing");
        let m = c.metrics().unwrap();
        assert_eq!(m.get(MetricType::Hit), 1);
        assert_eq!(m.get(MetricType::Miss), 1);
    }
}
