//! The "doorkeeper": a bloom filter guarding the count-min sketch from
//! being polluted by keys seen only once. Bitset storage is grounded in
//! `mambisi-beardb/rcache/src/bloom.rs`'s `bit_vec::BitVec`-backed `Bloom`.
//! Two bugs in that corpus are fixed here: `bloom/bbloom.rs` indexes
//! 64-bit words with `idx >> 6` but then masks with an 8-entry byte
//! table, so only the low byte of every word is ever touched; and
//! reusing a single `hash % bits` offset across all `k` rounds (as
//! `mambisi-beardb` does) is also wrong — every round would test the same
//! bit — so this version derives `k` independent offsets via double
//! hashing (`h1 + i*h2`), the standard Kirsch-Mitzenmacher construction.

use bit_vec::BitVec;

pub struct Doorkeeper {
    bits: BitVec,
    num_bits: u64,
    k_num: u32,
}

impl Doorkeeper {
    /// Sized for `items_count` entries at false-positive rate `fp_rate`.
    pub fn new(items_count: usize, fp_rate: f64) -> Self {
        let items_count = items_count.max(1);
        let num_bits = optimal_num_bits(items_count, fp_rate);
        let k_num = optimal_k_num(num_bits, items_count);
        Doorkeeper {
            bits: BitVec::from_elem(num_bits as usize, false),
            num_bits,
            k_num,
        }
    }

    fn offsets(&self, hashed: u64) -> impl Iterator<Item = usize> + '_ {
        let h1 = hashed;
        let h2 = hashed.rotate_left(32) | 1;
        (0..self.k_num).map(move |i| {
            (h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.num_bits) as usize
        })
    }

    pub fn has(&self, hashed: u64) -> bool {
        self.offsets(hashed).all(|b| self.bits.get(b).unwrap())
    }

    pub fn add(&mut self, hashed: u64) {
        for b in self.offsets(hashed).collect::<Vec<_>>() {
            self.bits.set(b, true);
        }
    }

    /// Sets every bit for `hashed` and reports whether it was already
    /// present beforehand, avoiding a second pass over the offsets.
    pub fn add_if_not_has(&mut self, hashed: u64) -> bool {
        let mut already_present = true;
        for b in self.offsets(hashed).collect::<Vec<_>>() {
            if !self.bits.get(b).unwrap() {
                already_present = false;
                self.bits.set(b, true);
            }
        }
        !already_present
    }

    pub fn clear(&mut self) {
        self.bits.clear();
    }
}

fn optimal_num_bits(items_count: usize, fp_rate: f64) -> u64 {
    let n = items_count as f64;
    let ln2_sq = std::f64::consts::LN_2 * std::f64::consts::LN_2;
    (-(n * fp_rate.ln()) / ln2_sq).ceil().max(64.0) as u64
}

fn optimal_k_num(num_bits: u64, items_count: usize) -> u32 {
    let m = num_bits as f64;
    let n = items_count as f64;
    ((m / n) * std::f64::consts::LN_2).ceil().max(1.0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_false_negative() {
        let mut d = Doorkeeper::new(1000, 0.01);
        for i in 0..1000u64 {
            d.add(i);
        }
        for i in 0..1000u64 {
            assert!(d.has(i));
        }
    }

    #[test]
    fn add_if_not_has_reports_first_insert_only() {
        let mut d = Doorkeeper::new(100, 0.01);
        assert!(d.add_if_not_has(42));
        assert!(!d.add_if_not_has(42));
    }

    #[test]
    fn clear_forgets_everything() {
        let mut d = Doorkeeper::new(100, 0.01);
        d.add(7);
        assert!(d.has(7));
        d.clear();
        assert!(!d.has(7));
    }

    #[test]
    fn false_positive_rate_is_reasonable() {
        let mut d = Doorkeeper::new(2000, 0.01);
        for i in 0..2000u64 {
            d.add(i);
        }
        let false_positives = (2000..12000u64).filter(|k| d.has(*k)).count();
        assert!(
            (false_positives as f64) < 2000.0,
            "expected roughly 1% false positives, got {false_positives}/10000"
        );
    }
}
