//! The single background thread that is the sole mutator of policy state.
//! Grounded in `mambisi-beardb/rcache/src/lib.rs`'s `process_items` function:
//! a `std::thread::spawn`'d loop alternating between draining the set
//! buffer and checking a `crossbeam_channel::tick` heartbeat, rather than
//! an async task, matching this corpus's synchronous cache ports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tracing::{debug, warn};

use crate::buffer::{SetEvent, SET_BUFFER_CAPACITY};
use crate::metrics::{MetricType, Metrics};
use crate::policy::Policy;
use crate::store::{Store, StoredItem};

/// User-supplied lifecycle hooks, wired straight through from
/// [`crate::cache::Config`]. All three are optional — a cache that never
/// sets them just drops the callback call.
pub struct Callbacks<V> {
    pub on_evict: Option<Arc<dyn Fn(u64, u64, Option<V>, i64) + Send + Sync>>,
    pub on_reject: Option<Arc<dyn Fn(u64, u64, Option<V>, i64) + Send + Sync>>,
    pub on_exit: Option<Arc<dyn Fn(V) + Send + Sync>>,
}

impl<V> Default for Callbacks<V> {
    fn default() -> Self {
        Callbacks {
            on_evict: None,
            on_reject: None,
            on_exit: None,
        }
    }
}

impl<V> Callbacks<V> {
    pub(crate) fn evict(&self, key: u64, conflict: u64, value: Option<V>, cost: i64) {
        if let Some(f) = &self.on_evict {
            f(key, conflict, value, cost);
        }
    }

    pub(crate) fn reject(&self, key: u64, conflict: u64, value: Option<V>, cost: i64) {
        if let Some(f) = &self.on_reject {
            f(key, conflict, value, cost);
        }
    }

    pub(crate) fn exit(&self, value: V) {
        if let Some(f) = &self.on_exit {
            f(value);
        }
    }
}

/// A running background processor. [`Processor::stop`] hands back the
/// channel receiver so [`crate::cache::Cache::clear`] can spawn a fresh
/// processor on the same channel without losing any event still queued
/// behind the one that triggered the stop.
pub struct Processor<V> {
    thread: JoinHandle<Receiver<SetEvent<V>>>,
    closed: Arc<AtomicBool>,
}

impl<V: Clone + Send + Sync + 'static> Processor<V> {
    pub fn spawn(
        receiver: Receiver<SetEvent<V>>,
        store: Arc<Store<V>>,
        policy: Arc<Policy>,
        metrics: Option<Metrics>,
        callbacks: Arc<Callbacks<V>>,
        cleanup_tick: Duration,
    ) -> Self {
        let closed = Arc::new(AtomicBool::new(false));
        let thread_closed = closed.clone();

        let thread = std::thread::spawn(move || {
            run(thread_closed, receiver, store, policy, metrics, callbacks, cleanup_tick)
        });

        Processor { thread, closed }
    }

    /// Signals the loop to stop and joins the thread, returning the
    /// channel receiver so the caller can either drop it (full `close`)
    /// or hand it to a new [`Processor::spawn`] call (`clear`'s restart).
    pub fn stop(self) -> Receiver<SetEvent<V>> {
        self.closed.store(true, Ordering::Release);
        match self.thread.join() {
            Ok(receiver) => receiver,
            Err(_) => {
                warn!("cache processor thread panicked while shutting down");
                crossbeam_channel::never()
            }
        }
    }
}

fn run<V: Clone + Send + Sync + 'static>(
    closed: Arc<AtomicBool>,
    receiver: Receiver<SetEvent<V>>,
    store: Arc<Store<V>>,
    policy: Arc<Policy>,
    metrics: Option<Metrics>,
    callbacks: Arc<Callbacks<V>>,
    cleanup_tick: Duration,
) -> Receiver<SetEvent<V>> {
    debug!(capacity = SET_BUFFER_CAPACITY, "cache processor started");
    let ticker = crossbeam_channel::tick(cleanup_tick);

    loop {
        if closed.load(Ordering::Acquire) {
            break;
        }

        crossbeam_channel::select! {
            recv(receiver) -> event => {
                match event {
                    Ok(event) => handle_event(event, &store, &policy, &metrics, &callbacks),
                    Err(_) => break,
                }
            }
            recv(ticker) -> _ => {
                sweep_expired(&store, &policy, &callbacks);
            }
            default(Duration::from_millis(50)) => {}
        }
    }
    debug!("cache processor stopped");
    receiver
}

fn handle_event<V: Clone>(
    event: SetEvent<V>,
    store: &Store<V>,
    policy: &Policy,
    metrics: &Option<Metrics>,
    callbacks: &Callbacks<V>,
) {
    match event {
        SetEvent::New(item) => {
            let (victims, added) = policy.add(item.key, item.cost);
            if added {
                let key = item.key;
                store.set(
                    key,
                    StoredItem {
                        conflict: item.conflict,
                        value: item.value,
                        cost: item.cost,
                        expires_at: item.expires_at,
                    },
                );
                if let Some(m) = metrics {
                    m.add(MetricType::KeyAdd, key, 1);
                }
            } else {
                if let Some(m) = metrics {
                    m.add(MetricType::RejectSets, item.key, 1);
                }
                callbacks.reject(item.key, item.conflict, Some(item.value.clone()), item.cost);
                callbacks.exit(item.value);
            }
            for victim in victims {
                let removed = store.remove(victim.key, 0);
                let value = removed.map(|(_, v)| v);
                callbacks.evict(victim.key, 0, value.clone(), victim.cost);
                if let Some(v) = value {
                    callbacks.exit(v);
                }
            }
        }
        SetEvent::Update(item) => {
            // The store was already mutated synchronously on the caller's
            // thread (see `Cache::set_with_cost_and_ttl`), which also fired
            // `on_exit` for the value this update replaced. Only the policy's
            // cost ledger still needs to catch up here.
            policy.update(item.key, item.cost);
            if let Some(m) = metrics {
                m.add(MetricType::KeyUpdate, item.key, 1);
            }
        }
        SetEvent::Delete { key, conflict } => {
            policy.del(&key);
            if let Some((_, value)) = store.remove(key, conflict) {
                callbacks.exit(value);
            }
        }
        SetEvent::Sync { ack } => {
            let _ = ack.send(());
        }
    }
}

fn sweep_expired<V: Clone>(store: &Store<V>, policy: &Policy, callbacks: &Callbacks<V>) {
    store.sweep_expired(|key, _conflict, value| {
        policy.del(&key);
        callbacks.exit(value);
    });
}
