//! Lock-striped in-memory key-value store.
//!
//! The keyspace is split across a fixed array of shards, each a hash map
//! behind its own mutex. A key always lives in shard
//! `crc32c(key) % shard_count`, so operations on keys in different shards
//! never contend and operations on the same shard serialize.
//!
//! # Memory Layout
//!
//! ```text
//! ┌──────────────────────┬──────────────────────┬─────┬──────────────────────┐
//! │ Shard 0              │ Shard 1              │ ... │ Shard N-1            │
//! │ Mutex<HashMap>       │ Mutex<HashMap>       │     │ Mutex<HashMap>       │
//! │ (cache-line padded)  │ (cache-line padded)  │     │ (cache-line padded)  │
//! └──────────────────────┴──────────────────────┴─────┴──────────────────────┘
//! ```
//!
//! The shard count is fixed at construction; there is no resize and no
//! rehashing. A shard lock is only held for one map lookup or insert.

use crossbeam_utils::CachePadded;
use hostcore_common::config::{StoreConfig, DEFAULT_SHARD_COUNT};
use hostcore_common::error::{CoreError, CoreResult};
use static_assertions::const_assert;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

const_assert!(DEFAULT_SHARD_COUNT > 0);

/// One independently locked partition of the keyspace.
#[derive(Debug, Default)]
struct Shard {
    map: Mutex<HashMap<String, String>>,
}

impl Shard {
    /// Lock the shard's map.
    ///
    /// A poisoned lock is taken over: a panic cannot leave a single map
    /// insert half done.
    #[inline]
    fn lock(&self) -> MutexGuard<'_, HashMap<String, String>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Concurrent string-to-string map partitioned into independently locked shards.
#[derive(Debug)]
pub struct ShardedStore {
    shards: Box<[CachePadded<Shard>]>,
}

impl Default for ShardedStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardedStore {
    /// Create a store with [`DEFAULT_SHARD_COUNT`] shards.
    #[must_use]
    pub fn new() -> Self {
        Self::build(DEFAULT_SHARD_COUNT)
    }

    /// Create a store with `shard_count` shards.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidShardCount`] if `shard_count` is zero.
    pub fn with_shards(shard_count: usize) -> CoreResult<Self> {
        if shard_count == 0 {
            return Err(CoreError::InvalidShardCount { count: shard_count });
        }
        Ok(Self::build(shard_count))
    }

    /// Create a store as configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration does not validate.
    pub fn from_config(config: &StoreConfig) -> CoreResult<Self> {
        config.validate()?;
        Self::with_shards(config.shard_count)
    }

    fn build(shard_count: usize) -> Self {
        debug!(shard_count, "creating sharded store");
        let shards = (0..shard_count)
            .map(|_| CachePadded::new(Shard::default()))
            .collect();
        Self { shards }
    }

    /// Number of shards, fixed for the store's lifetime.
    #[inline]
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Index of the shard holding `key`.
    #[inline]
    #[must_use]
    pub fn shard_index(&self, key: &str) -> usize {
        shard_for(key, self.shards.len())
    }

    #[inline]
    fn shard(&self, key: &str) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// Always succeeds; there is no capacity limit.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        let value = value.into();
        self.shard(&key).lock().insert(key, value);
        true
    }

    /// A copy of the value stored under `key`, or `None` if there is none.
    ///
    /// The shard lock is released before returning.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.shard(key).lock().get(key).cloned()
    }

    /// Number of entries in each shard, in shard order.
    ///
    /// Shards are locked one at a time, so under concurrent writes the
    /// counts are not a single consistent snapshot.
    #[must_use]
    pub fn shard_lens(&self) -> Vec<usize> {
        self.shards.iter().map(|shard| shard.lock().len()).collect()
    }

    /// Total number of entries (see [`ShardedStore::shard_lens`] for consistency).
    #[must_use]
    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Whether the store has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|shard| shard.lock().is_empty())
    }
}

/// Shard index of `key` among `shard_count` shards: CRC32C of the key bytes
/// modulo the shard count.
///
/// # Panics
///
/// Panics if `shard_count` is zero.
#[inline]
#[must_use]
pub fn shard_for(key: &str, shard_count: usize) -> usize {
    crc32c::crc32c(key.as_bytes()) as usize % shard_count
}
