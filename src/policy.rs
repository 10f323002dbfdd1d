//! Admission/eviction facade. A single lock guards both the frequency
//! estimator and the cost ledger, matching `mambisi-beardb/rcache/src/policy.rs`'s
//! `Inner { admit, evict }` under one `parking_lot::Mutex` — the two halves
//! are always consulted together when deciding whether to admit an
//! incoming set, so splitting the lock would only add contention without
//! adding concurrency.

use parking_lot::Mutex;

use crate::doorkeeper::Doorkeeper;
use crate::ledger::{Candidate, SampledLfu};
use crate::metrics::{MetricType, Metrics};
use crate::sketch::CountMinSketch;

/// A key evicted to make room for an admitted one.
#[derive(Copy, Clone, Debug)]
pub struct Victim {
    pub key: u64,
    pub cost: i64,
}

struct TinyLfu {
    freq: CountMinSketch,
    door: Doorkeeper,
    incrs: u64,
    reset_at: u64,
}

impl TinyLfu {
    fn new(num_counters: i64) -> Self {
        TinyLfu {
            freq: CountMinSketch::new(num_counters),
            door: Doorkeeper::new(num_counters.max(1) as usize, 0.01),
            incrs: 0,
            reset_at: num_counters.max(1) as u64,
        }
    }

    fn estimate(&self, key: u64) -> i64 {
        let mut hits = self.freq.estimate(key);
        if self.door.has(key) {
            hits += 1;
        }
        hits
    }

    fn increment(&mut self, key: u64) {
        if self.door.add_if_not_has(key) {
            return;
        }
        self.freq.increment(key);
        self.incrs += 1;
        if self.incrs >= self.reset_at {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.incrs = 0;
        self.freq.halve();
        self.door.clear();
    }

    fn clear(&mut self) {
        self.incrs = 0;
        self.freq.clear();
        self.door.clear();
    }
}

struct Inner {
    admit: TinyLfu,
    evict: SampledLfu,
}

/// Facade driving admission decisions and cost-based eviction. Cheap reads
/// (`has`, `cost`) and the processor's batched writes (`push`, `add`,
/// `update`, `del`) all serialize on one internal lock; this is acceptable
/// because the processor is the sole writer and reads are infrequent
/// relative to the store's own lock-striped fast path.
pub struct Policy {
    inner: Mutex<Inner>,
    metrics: Option<Metrics>,
}

impl Policy {
    pub fn new(num_counters: i64, max_cost: i64, metrics: Option<Metrics>) -> Self {
        Policy {
            inner: Mutex::new(Inner {
                admit: TinyLfu::new(num_counters),
                evict: SampledLfu::new(max_cost),
            }),
            metrics,
        }
    }

    /// Folds a batch of Get-hits (from the ring buffer) into the frequency
    /// estimator.
    pub fn push(&self, keys: &[u64]) {
        if keys.is_empty() {
            return;
        }
        let mut inner = self.inner.lock();
        for &key in keys {
            inner.admit.increment(key);
        }
    }

    /// Decides whether `key` with `cost` should be admitted, evicting
    /// victims by lowest estimated frequency until room is found or the
    /// incoming item loses to every sampled candidate.
    pub fn add(&self, key: u64, cost: i64) -> (Vec<Victim>, bool) {
        let mut inner = self.inner.lock();

        if cost > inner.evict.max_cost() {
            return (Vec::new(), false);
        }

        if inner.evict.update_if_has(key, cost) {
            return (Vec::new(), false);
        }

        let room = inner.evict.room_left(cost);
        if room >= 0 {
            inner.evict.add(key, cost);
            if let Some(m) = &self.metrics {
                m.add(MetricType::CostAdd, key, cost as u64);
            }
            return (Vec::new(), true);
        }

        let incoming_hits = inner.admit.estimate(key);
        let mut victims = Vec::new();
        let mut excluded = Vec::new();
        let mut room = room;

        while room < 0 {
            let sample = inner.evict.sample(&excluded);
            if sample.is_empty() {
                break;
            }

            let (candidate, candidate_hits) = min_by_estimate(&sample, &inner.admit);

            if incoming_hits < candidate_hits {
                return (victims, false);
            }

            inner.evict.remove(&candidate.key);
            if let Some(m) = &self.metrics {
                m.add(MetricType::CostEvict, candidate.key, candidate.cost as u64);
                m.add(MetricType::KeyEvict, candidate.key, 1);
            }
            victims.push(Victim {
                key: candidate.key,
                cost: candidate.cost,
            });
            excluded.push(candidate.key);

            room = inner.evict.room_left(cost);
        }

        inner.evict.add(key, cost);
        if let Some(m) = &self.metrics {
            m.add(MetricType::CostAdd, key, cost as u64);
        }
        (victims, true)
    }

    pub fn has(&self, key: &u64) -> bool {
        self.inner.lock().evict.contains(key)
    }

    pub fn del(&self, key: &u64) {
        self.inner.lock().evict.remove(key);
    }

    pub fn update(&self, key: u64, cost: i64) {
        self.inner.lock().evict.update_if_has(key, cost);
    }

    pub fn cost(&self, key: &u64) -> i64 {
        self.inner.lock().evict.cost(key)
    }

    pub fn cap(&self) -> i64 {
        let inner = self.inner.lock();
        inner.evict.max_cost() - inner.evict.used()
    }

    pub fn max_cost(&self) -> i64 {
        self.inner.lock().evict.max_cost()
    }

    pub fn used(&self) -> i64 {
        self.inner.lock().evict.used()
    }

    pub fn update_max_cost(&self, cost: i64) {
        self.inner.lock().evict.update_max_cost(cost);
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.evict.clear();
        inner.admit.clear();
    }
}

/// Picks the weakest sampled candidate: lowest estimated frequency first,
/// tie-broken by lowest cost, then by lowest key, so the choice is
/// deterministic rather than depending on the ledger's hash-map iteration
/// order.
fn min_by_estimate(sample: &[Candidate], admit: &TinyLfu) -> (Candidate, i64) {
    sample
        .iter()
        .map(|c| (*c, admit.estimate(c.key)))
        .min_by_key(|(c, hits)| (*hits, c.cost, c.key))
        .expect("sample checked non-empty by caller")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_item_bigger_than_cache() {
        let p = Policy::new(1000, 100, None);
        let (victims, added) = p.add(1, 101);
        assert!(victims.is_empty());
        assert!(!added);
    }

    #[test]
    fn admits_without_eviction_when_room_available() {
        let p = Policy::new(1000, 100, None);
        let (victims, added) = p.add(1, 1);
        assert!(victims.is_empty());
        assert!(added);
        assert!(p.has(&1));
    }

    #[test]
    fn updates_existing_key_in_place() {
        let p = Policy::new(1000, 100, None);
        p.add(1, 1);
        let (victims, added) = p.add(1, 2);
        assert!(victims.is_empty());
        assert!(!added);
        assert_eq!(p.cost(&1), 2);
    }

    #[test]
    fn evicts_to_make_room() {
        let p = Policy::new(1000, 10, None);
        p.add(1, 10);
        for _ in 0..50 {
            p.push(&[2]);
        }
        let (victims, added) = p.add(2, 10);
        assert!(!victims.is_empty());
        assert!(added);
        assert!(!p.has(&1));
    }

    #[test]
    fn clear_wipes_admission_and_eviction_state() {
        let p = Policy::new(1000, 100, None);
        p.add(1, 1);
        p.clear();
        assert!(!p.has(&1));
        assert_eq!(p.cap(), 100);
    }

    #[test]
    fn min_by_estimate_ties_break_by_cost_then_key() {
        let admit = TinyLfu::new(1000);
        // All three candidates share the same (zero) estimated frequency,
        // so the tie must resolve deterministically by lowest cost, then
        // by lowest key — never by the order candidates happen to arrive in.
        let sample = [
            Candidate { key: 9, cost: 5 },
            Candidate { key: 3, cost: 2 },
            Candidate { key: 7, cost: 2 },
        ];
        let (winner, _) = min_by_estimate(&sample, &admit);
        assert_eq!(winner.key, 3);
        assert_eq!(winner.cost, 2);

        // Order-independence: shuffling the input must not change the pick.
        let reordered = [sample[2], sample[0], sample[1]];
        let (winner2, _) = min_by_estimate(&reordered, &admit);
        assert_eq!(winner2.key, 3);
    }
}
