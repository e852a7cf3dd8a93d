//! ConcurrentMap: integer-keyed ordered map split into independently locked shards.
//!
//! Routing is `key mod bucket_count` (Euclidean for signed keys), so a key
//! always lands in the same shard. `at` locks exactly one shard; `snapshot`
//! and `len` visit shards in index order holding one shard lock at a time and
//! never anything resembling a whole-map lock. Consequently a snapshot taken
//! while writers are active is consistent per key, not across the map.

use crate::error::ConfigError;
use crate::synchronized::{Access, MappedAccess, Synchronized};
use core::fmt;
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Bounds for [`default_bucket_count`].
const MIN_DEFAULT_BUCKETS: usize = 8;
const MAX_DEFAULT_BUCKETS: usize = 512;
/// Shards per CPU when sizing from the host.
const BUCKETS_PER_CPU: usize = 4;
const FALLBACK_CPUS: usize = 8;

mod sealed {
    pub trait Sealed {}
}

/// Keys a [`ConcurrentMap`] can route: the primitive integer types.
///
/// Sealed: routing relies on cheap total ordering and modular arithmetic,
/// which only the built-in integers guarantee.
pub trait ShardKey: sealed::Sealed + Ord + Copy + fmt::Debug {
    /// Index of the owning shard, always in `0..bucket_count`.
    ///
    /// `bucket_count` must be non-zero.
    fn shard_index(self, bucket_count: usize) -> usize;
}

// Widening to `$wide` is lossless for the key, and `bucket_count` never
// exceeds `isize::MAX` since it sizes a live allocation.
macro_rules! unsigned_shard_keys {
    ($($t:ty => $wide:ty),* $(,)?) => {$(
        impl sealed::Sealed for $t {}
        impl ShardKey for $t {
            #[inline]
            fn shard_index(self, bucket_count: usize) -> usize {
                ((self as $wide) % (bucket_count as $wide)) as usize
            }
        }
    )*};
}

macro_rules! signed_shard_keys {
    ($($t:ty => $wide:ty),* $(,)?) => {$(
        impl sealed::Sealed for $t {}
        impl ShardKey for $t {
            #[inline]
            fn shard_index(self, bucket_count: usize) -> usize {
                (self as $wide).rem_euclid(bucket_count as $wide) as usize
            }
        }
    )*};
}

unsigned_shard_keys!(u8 => u64, u16 => u64, u32 => u64, u64 => u64, usize => u64, u128 => u128);
signed_shard_keys!(i8 => i64, i16 => i64, i32 => i64, i64 => i64, isize => i64, i128 => i128);

/// Shard count sized from host parallelism: four shards per CPU, rounded up
/// to a power of two and clamped to `8..=512`. Computed once per process.
pub fn default_bucket_count() -> usize {
    static BUCKETS: OnceLock<usize> = OnceLock::new();
    *BUCKETS.get_or_init(|| {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or_else(|_| {
                log::warn!(
                    "failed to detect CPU count, assuming {}",
                    FALLBACK_CPUS
                );
                FALLBACK_CPUS
            });
        let buckets = (cpus * BUCKETS_PER_CPU)
            .next_power_of_two()
            .clamp(MIN_DEFAULT_BUCKETS, MAX_DEFAULT_BUCKETS);
        log::debug!("default bucket count: {} ({} CPUs)", buckets, cpus);
        buckets
    })
}

/// One partition: an ordinary ordered map behind its own lock.
///
/// Aligned to 128 bytes so neighbouring shard locks do not share a cache line.
#[repr(align(128))]
struct Shard<K, V> {
    map: Synchronized<BTreeMap<K, V>>,
}

impl<K, V> Shard<K, V> {
    fn new() -> Self {
        Self {
            map: Synchronized::new(BTreeMap::new()),
        }
    }
}

pub struct ConcurrentMap<K, V> {
    shards: Box<[Shard<K, V>]>,
}

impl<K: ShardKey, V> ConcurrentMap<K, V> {
    /// Create a map with `bucket_count` shards.
    ///
    /// # Panics
    /// If `bucket_count` is zero. Use [`ConcurrentMap::try_new`] to get an
    /// error instead.
    #[track_caller]
    pub fn new(bucket_count: usize) -> Self {
        match Self::try_new(bucket_count) {
            Ok(map) => map,
            Err(err) => panic!("ConcurrentMap::new: {}", err),
        }
    }

    pub fn try_new(bucket_count: usize) -> Result<Self, ConfigError> {
        if bucket_count == 0 {
            return Err(ConfigError::ZeroBuckets);
        }
        let shards = (0..bucket_count).map(|_| Shard::new()).collect();
        log::trace!("ConcurrentMap created with {} shards", bucket_count);
        Ok(Self { shards })
    }

    /// Create a map sized by [`default_bucket_count`].
    pub fn with_default_buckets() -> Self {
        Self::new(default_bucket_count())
    }

    pub fn bucket_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard that owns `key`. Pure function of the key and the bucket count.
    #[inline]
    pub fn shard_index(&self, key: K) -> usize {
        key.shard_index(self.shards.len())
    }

    #[inline]
    fn shard(&self, key: K) -> &Synchronized<BTreeMap<K, V>> {
        &self.shards[self.shard_index(key)].map
    }

    /// Lock the shard owning `key` and return mutable access to its value,
    /// inserting `V::default()` first if the key is absent.
    ///
    /// Blocks only while another guard into the same shard is live.
    #[track_caller]
    pub fn at(&self, key: K) -> MappedAccess<'_, V>
    where
        V: Default,
    {
        Access::map(self.shard(key).access(), |map| map.entry(key).or_default())
    }

    /// Like [`ConcurrentMap::at`], but returns `None` instead of blocking when
    /// the owning shard is locked.
    pub fn try_at(&self, key: K) -> Option<MappedAccess<'_, V>>
    where
        V: Default,
    {
        let shard = self.shard(key).try_access()?;
        Some(Access::map(shard, |map| map.entry(key).or_default()))
    }

    /// Copy of the value at `key`, without inserting anything.
    pub fn get(&self, key: K) -> Option<V>
    where
        V: Clone,
    {
        self.shard(key).access().get(&key).cloned()
    }

    pub fn contains_key(&self, key: K) -> bool {
        self.shard(key).access().contains_key(&key)
    }

    /// Number of entries, counted shard by shard.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.map.access().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.map.access().is_empty())
    }

    /// Merge every shard into one ordinary map.
    ///
    /// Each shard is copied under its own lock, which is released before the
    /// next shard is visited.
    pub fn snapshot(&self) -> BTreeMap<K, V>
    where
        V: Clone,
    {
        let mut result = BTreeMap::new();
        for shard in self.shards.iter() {
            let part = shard.map.access();
            result.extend(part.iter().map(|(k, v)| (*k, v.clone())));
        }
        result
    }

    /// Consume the map and merge all shards without locking.
    pub fn into_inner(self) -> BTreeMap<K, V> {
        let mut result = BTreeMap::new();
        for shard in self.shards.into_vec() {
            let mut part = shard.map.into_inner();
            result.append(&mut part);
        }
        result
    }
}

impl<K: ShardKey, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        Self::with_default_buckets()
    }
}

impl<K, V> fmt::Debug for ConcurrentMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMap")
            .field("bucket_count", &self.shards.len())
            .finish_non_exhaustive()
    }
}
