//! The bounded channel carrying writes from `Cache::set`/`delete` to the
//! background processor. A tagged enum rather than a struct with an
//! "is this a delete" flag, per the Design Notes' guidance on keeping
//! event intent explicit at the type level.

use std::time::SystemTime;

use crossbeam_channel::{Receiver, Sender};

pub const SET_BUFFER_CAPACITY: usize = 32_768;

pub struct NewItem<V> {
    pub key: u64,
    pub conflict: u64,
    pub value: V,
    pub cost: i64,
    pub expires_at: Option<SystemTime>,
}

pub enum SetEvent<V> {
    New(NewItem<V>),
    Update(NewItem<V>),
    Delete { key: u64, conflict: u64 },
    /// A one-shot barrier: the processor replies on `ack` once every event
    /// queued before this one has been applied, backing `Cache::wait`.
    Sync { ack: Sender<()> },
}

pub fn set_buffer<V>() -> (Sender<SetEvent<V>>, Receiver<SetEvent<V>>) {
    crossbeam_channel::bounded(SET_BUFFER_CAPACITY)
}
