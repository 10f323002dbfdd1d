//! Sampled-LFU eviction bookkeeping: tracks every admitted key's cost and
//! picks eviction candidates by uniform random sampling, rather than by
//! LRU order or a full cost-sorted scan. Grounded in
//! `mambisi-beardb/rcache/src/policy.rs`'s `SampledLFU`, with one fix: that
//! implementation (and `behrouz-rfa-memory-cache-rust`'s own `policy.rs`)
//! fills the sample with the first `K` entries a `HashMap` iterator
//! happens to yield, which is not a uniform
//! sample — entries near the start of the map's internal layout are always
//! candidates, so keys can be evicted unfairly depending on hash bucket
//! order. This version draws `K` candidates uniformly via
//! `rand::seq::IteratorRandom::choose_multiple`.

use std::collections::HashMap;

use rand::seq::IteratorRandom;
use rand::thread_rng;

pub const SAMPLE_SIZE: usize = 5;

#[derive(Copy, Clone, Debug)]
pub struct Candidate {
    pub key: u64,
    pub cost: i64,
}

pub struct SampledLfu {
    max_cost: i64,
    used: i64,
    key_costs: HashMap<u64, i64>,
}

impl SampledLfu {
    pub fn new(max_cost: i64) -> Self {
        SampledLfu {
            max_cost,
            used: 0,
            key_costs: HashMap::new(),
        }
    }

    pub fn max_cost(&self) -> i64 {
        self.max_cost
    }

    pub fn used(&self) -> i64 {
        self.used
    }

    pub fn update_max_cost(&mut self, cost: i64) {
        self.max_cost = cost;
    }

    pub fn room_left(&self, cost: i64) -> i64 {
        self.max_cost - (self.used + cost)
    }

    pub fn contains(&self, key: &u64) -> bool {
        self.key_costs.contains_key(key)
    }

    pub fn cost(&self, key: &u64) -> i64 {
        self.key_costs.get(key).copied().unwrap_or(-1)
    }

    pub fn add(&mut self, key: u64, cost: i64) {
        self.key_costs.insert(key, cost);
        self.used += cost;
    }

    pub fn update_if_has(&mut self, key: u64, cost: i64) -> bool {
        if let Some(prev) = self.key_costs.get_mut(&key) {
            self.used += cost - *prev;
            *prev = cost;
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, key: &u64) -> Option<i64> {
        let cost = self.key_costs.remove(key)?;
        self.used -= cost;
        Some(cost)
    }

    /// Draws up to `SAMPLE_SIZE` keys uniformly at random, excluding any
    /// already present in `exclude` (candidates already picked as victims
    /// this round).
    pub fn sample(&self, exclude: &[u64]) -> Vec<Candidate> {
        self.key_costs
            .iter()
            .filter(|(k, _)| !exclude.contains(k))
            .map(|(&key, &cost)| Candidate { key, cost })
            .choose_multiple(&mut thread_rng(), SAMPLE_SIZE)
    }

    pub fn clear(&mut self) {
        self.used = 0;
        self.key_costs.clear();
    }

    pub fn len(&self) -> usize {
        self.key_costs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.key_costs.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_left_tracks_used_cost() {
        let mut l = SampledLfu::new(10);
        l.add(1, 4);
        assert_eq!(l.room_left(3), 3);
        assert_eq!(l.used(), 4);
    }

    #[test]
    fn update_if_has_adjusts_used_delta() {
        let mut l = SampledLfu::new(10);
        l.add(1, 4);
        assert!(l.update_if_has(1, 6));
        assert_eq!(l.used(), 6);
        assert!(!l.update_if_has(2, 1));
    }

    #[test]
    fn remove_frees_room() {
        let mut l = SampledLfu::new(10);
        l.add(1, 4);
        assert_eq!(l.remove(&1), Some(4));
        assert_eq!(l.used(), 0);
        assert_eq!(l.remove(&1), None);
    }

    #[test]
    fn sample_respects_exclusion_and_cap() {
        let mut l = SampledLfu::new(1000);
        for k in 0..20u64 {
            l.add(k, 1);
        }
        let sample = l.sample(&[0, 1, 2]);
        assert!(sample.len() <= SAMPLE_SIZE);
        assert!(sample.iter().all(|c| c.key > 2));
    }

    #[test]
    fn clear_resets_accounting() {
        let mut l = SampledLfu::new(10);
        l.add(1, 4);
        l.clear();
        assert_eq!(l.used(), 0);
        assert!(l.is_empty());
    }
}
