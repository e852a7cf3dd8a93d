//! shardlock: scoped mutex cells, a lock-sharded integer-keyed map, and the
//! producer/consumer and map-reduce patterns built on them.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: share mutable state between worker threads without one coarse
//!   lock, with every lock released by scope and never by hand.
//! - Layers:
//!   - Synchronized<T>: one value, one `parking_lot::Mutex`. The only way to
//!     the value is an `Access` guard; dropping the guard unlocks.
//!   - ConcurrentMap<K, V>: a fixed array of shards, each a
//!     `Synchronized<BTreeMap<K, V>>`. `key mod bucket_count` picks the
//!     shard, so operations on different shards never wait on each other.
//!   - WorkQueue<T> + consume: a `Synchronized<VecDeque<T>>` fed by any
//!     number of producers and drained in batches by one consumer until a
//!     sentinel item arrives.
//!   - map_reduce / explore_key_words: pages of input lines processed on
//!     scoped threads with no shared mutable state, folded at the join.
//!     A bounded window of pages runs at once; the oldest is joined before
//!     the next is read.
//!
//! Constraints
//! - At most one lock is held at a time by any operation in this crate, so
//!   no lock ordering is needed and no operation here can deadlock on its own.
//! - Map keys are the primitive integers (sealed `ShardKey`); shard count is
//!   fixed at construction and must be non-zero.
//! - Lookups through `at` auto-vivify; entries are never removed, so a map
//!   only grows.
//! - No cancellation or timeouts: a lock wait or a page join runs to completion.
//!
//! Reentrancy policy
//! - Taking a lock that the current thread already holds is a contract
//!   violation. `Synchronized` records the holding thread in debug builds
//!   and panics on recursive acquisition instead of deadlocking; release
//!   builds carry no tracking and deadlock.
//!
//! Snapshot semantics
//! - `ConcurrentMap::snapshot` locks shards one after another. Each key's
//!   value is one that was valid under its shard lock, but two shards may
//!   be captured at different moments. A whole-map atomic view would need a
//!   global lock and is not offered.
//!
//! Failure policy
//! - Contract violations (zero shards through `new`, recursive locking in
//!   debug) panic. Construction through `try_new` and aggregation runs
//!   return `Result`s with `thiserror` types.
//! - A failing or panicking page is reported by `map_reduce` after every
//!   page has been joined; the first failure in dispatch order wins. Read
//!   errors (including non-UTF-8 input) and refused thread spawns stop
//!   dispatch and surface as `AggregateError::Io`.
//!
//! Notes and non-goals
//! - No persistence, no lock-free paths, no fairness between waiters.
//! - The work queue trusts its protocol: one consumer, sentinel-terminated.
//! - The library only emits through the `log` facade; installing a logger
//!   is left to the application.

pub mod aggregate;
pub mod concurrent_map;
mod error;
pub mod profile;
mod reentrancy;
pub mod scan;
pub mod synchronized;
pub mod work_queue;

// Public surface
pub use aggregate::{
    default_max_in_flight, explore_key_words, explore_key_words_with, map_reduce, AggregateConfig,
};
pub use concurrent_map::{default_bucket_count, ConcurrentMap, ShardKey};
pub use error::{AggregateError, BoxError, ConfigError};
pub use profile::LogDuration;
pub use scan::{Stats, Vocabulary};
pub use synchronized::{Access, MappedAccess, Synchronized};
pub use work_queue::{consume, WorkQueue};
