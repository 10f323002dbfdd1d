//! Striped ring buffer pool batching Get-hit keys before they reach the
//! policy, implementing the BP-Wrapper batching scheme
//! `behrouz-rfa-memory-cache-rust`'s own `ring.rs` names
//! (`RingStripe`/`RingBuffer`) but never got past `seize`/`syncpool`-based
//! raw-pointer stubs. This version replaces that
//! machinery with a fixed pool of `parking_lot::Mutex`-guarded `Vec<u64>`
//! stripes and `try_lock`, preserving the "never block the read path"
//! contract: a stripe that's momentarily contended just drops the sample
//! instead of waiting.

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

/// Anything that can accept a drained batch of keys. Implemented by
/// [`crate::policy::Policy`] through a thin adapter in `cache.rs`.
pub trait RingConsumer: Send + Sync {
    fn push(&self, keys: Vec<u64>) -> bool;
}

struct RingStripe<C: RingConsumer> {
    data: Mutex<Vec<u64>>,
    capacity: usize,
    consumer: Arc<C>,
}

impl<C: RingConsumer> RingStripe<C> {
    fn new(capacity: usize, consumer: Arc<C>) -> Self {
        RingStripe {
            data: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
            consumer,
        }
    }

    /// Tries to append `item`, reporting `false` (dropped) if the stripe is
    /// contended rather than blocking. Drains and hands the batch to the
    /// consumer once the stripe fills.
    fn push(&self, item: u64) -> bool {
        let Some(mut data) = self.data.try_lock() else {
            return false;
        };
        data.push(item);
        if data.len() >= self.capacity {
            let batch = std::mem::replace(&mut *data, Vec::with_capacity(self.capacity));
            drop(data);
            self.consumer.push(batch);
        }
        true
    }
}

thread_local! {
    static STRIPE_SLOT: Cell<Option<usize>> = Cell::new(None);
}

/// Default per-stripe capacity when a [`crate::cache::CacheBuilder`]
/// doesn't override it via `buffer_items`.
pub const DEFAULT_STRIPE_CAPACITY: usize = 64;

/// Distributes pushes across `num_cpus::get()` stripes (floor 1) so
/// concurrent readers on different cores rarely contend for the same
/// stripe's lock. Each thread claims one stripe index the first time it
/// pushes and keeps it for the thread's lifetime.
pub struct RingBuffer<C: RingConsumer> {
    stripes: Vec<RingStripe<C>>,
    next_slot: AtomicUsize,
}

impl<C: RingConsumer> RingBuffer<C> {
    pub fn new(consumer: Arc<C>, stripe_capacity: usize) -> Self {
        let num_stripes = num_cpus::get().max(1);
        let stripe_capacity = stripe_capacity.max(1);
        let mut stripes = Vec::with_capacity(num_stripes);
        for _ in 0..num_stripes {
            stripes.push(RingStripe::new(stripe_capacity, consumer.clone()));
        }
        RingBuffer {
            stripes,
            next_slot: AtomicUsize::new(0),
        }
    }

    /// Returns `true` if `item` was accepted into its stripe, `false` if
    /// the stripe was contended and the sample was dropped. Never blocks
    /// either way.
    pub fn push(&self, item: u64) -> bool {
        let slot = STRIPE_SLOT.with(|cell| {
            if let Some(slot) = cell.get() {
                slot
            } else {
                let slot = self.next_slot.fetch_add(1, Ordering::Relaxed) % self.stripes.len();
                cell.set(Some(slot));
                slot
            }
        });
        self.stripes[slot].push(item)
    }
}
