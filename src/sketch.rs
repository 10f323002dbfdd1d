//! Count-min sketch giving saturating 4-bit frequency estimates. Depth is
//! fixed at 4 independent rows; width is the next power of two at or above
//! `NumCounters`. Two 4-bit counters are packed per byte, the standard
//! Caffeine/Ristretto layout — kept from `behrouz-rfa-memory-cache-rust`'s
//! own `cmsketch.rs`, which already gets this part right.

use rand::Rng;

const CM_DEPTH: usize = 4;

struct CmRow(Vec<u8>);

impl CmRow {
    fn new(width: u64) -> Self {
        CmRow(vec![0u8; (width / 2) as usize])
    }

    fn increment(&mut self, n: u64) {
        let i = (n / 2) as usize;
        let shift = (n & 1) * 4;
        let v = (self.0[i] >> shift) & 0x0f;
        if v < 15 {
            self.0[i] += 1 << shift;
        }
    }

    fn get(&self, n: u64) -> u8 {
        (self.0[(n / 2) as usize] >> ((n & 1) * 4)) & 0x0f
    }

    /// Halves every counter in place. `0x77 = 0b0111_0111` strips the
    /// overflow bit each nibble's right-shift would otherwise borrow from
    /// its neighbour.
    fn halve(&mut self) {
        for b in self.0.iter_mut() {
            *b = (*b >> 1) & 0x77;
        }
    }

    fn clear(&mut self) {
        for b in self.0.iter_mut() {
            *b = 0;
        }
    }
}

pub struct CountMinSketch {
    rows: [CmRow; CM_DEPTH],
    seeds: [u64; CM_DEPTH],
    mask: u64,
}

impl CountMinSketch {
    pub fn new(num_counters: i64) -> Self {
        assert!(num_counters > 0, "sketch: num_counters must be positive");
        let width = next_power_of_two(num_counters as u64);
        let mut rng = rand::thread_rng();
        let seeds = [rng.gen(), rng.gen(), rng.gen(), rng.gen()];

        CountMinSketch {
            rows: [
                CmRow::new(width),
                CmRow::new(width),
                CmRow::new(width),
                CmRow::new(width),
            ],
            seeds,
            mask: width - 1,
        }
    }

    pub fn increment(&mut self, hashed: u64) {
        for i in 0..CM_DEPTH {
            let slot = (hashed ^ self.seeds[i]) & self.mask;
            self.rows[i].increment(slot);
        }
    }

    pub fn estimate(&self, hashed: u64) -> i64 {
        let mut min = u8::MAX;
        for i in 0..CM_DEPTH {
            let slot = (hashed ^ self.seeds[i]) & self.mask;
            min = min.min(self.rows[i].get(slot));
        }
        min as i64
    }

    /// Halves all counters (aging), keeping relative frequency ordering
    /// while bounding memory to 4 bits/counter indefinitely.
    pub fn halve(&mut self) {
        for row in self.rows.iter_mut() {
            row.halve();
        }
    }

    pub fn clear(&mut self) {
        for row in self.rows.iter_mut() {
            row.clear();
        }
    }
}

fn next_power_of_two(mut x: u64) -> u64 {
    if x < 1 {
        return 1;
    }
    x -= 1;
    x |= x >> 1;
    x |= x >> 2;
    x |= x >> 4;
    x |= x >> 8;
    x |= x >> 16;
    x |= x >> 32;
    x + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn increment_and_estimate() {
        let mut s = CountMinSketch::new(16);
        s.increment(1);
        s.increment(1);
        s.increment(9);
        assert_eq!(s.estimate(1), 2);
        assert_eq!(s.estimate(0), 0);
    }

    #[test]
    fn halve_keeps_proportional_counts() {
        let mut s = CountMinSketch::new(16);
        for _ in 0..4 {
            s.increment(1);
        }
        s.halve();
        assert_eq!(s.estimate(1), 2);
    }

    #[test]
    fn saturates_at_fifteen() {
        let mut s = CountMinSketch::new(16);
        for _ in 0..100 {
            s.increment(7);
        }
        assert_eq!(s.estimate(7), 15);
    }

    #[test]
    fn width_is_next_power_of_two() {
        let s = CountMinSketch::new(5);
        assert_eq!(s.mask, 7);
    }

    #[test]
    fn distinct_rows_are_seeded_independently() {
        let s = CountMinSketch::new(1024);
        let seeds: std::collections::HashSet<_> = s.seeds.iter().collect();
        assert!(seeds.len() > 1, "sketch rows must not share a seed");
    }
}
