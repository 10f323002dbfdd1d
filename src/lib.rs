//! `ferrolfu` is a concurrent, bounded in-memory cache combining a TinyLFU
//! admission filter with sampled-LFU eviction. Reads are lock-light and
//! never wait on the background processor; writes are buffered through a
//! bounded channel and applied by a single background thread, which is the
//! sole mutator of eviction/admission state.
//!
//! The moving parts, roughly in the order a write passes through them:
//!
//! - [`hash`] — key fingerprinting, so the store never retains the
//!   original key.
//! - [`store`] — the sharded key/value table.
//! - [`ring`] — batches Get-hit keys before they reach the admission
//!   policy, so a hot read path never contends on the policy lock directly.
//! - [`buffer`] and [`processor`] — the buffered channel and background
//!   thread that apply Set/Delete events.
//! - [`policy`], built from [`sketch`] (frequency estimation), [`doorkeeper`]
//!   (admission filter) and [`ledger`] (eviction candidates).
//! - [`metrics`] — optional striped atomic counters.
//! - [`error`] — construction-time validation failures.
//!
//! Start with [`Cache`] and [`CacheBuilder`].

mod buffer;
pub mod cache;
mod doorkeeper;
pub mod error;
pub mod hash;
mod ledger;
pub mod metrics;
mod policy;
mod processor;
mod ring;
mod sketch;
mod store;
mod ttl;

pub use cache::{Cache, CacheBuilder, Config};
pub use error::ConfigError;
pub use hash::{DefaultKeyHasher, KeyHasher};
pub use metrics::{MetricType, Metrics};
