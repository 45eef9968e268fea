//! Sharded store acceptance tests.
//!
//! # Acceptance Criteria
//!
//! - A write is visible to the next read on the same thread
//! - Keys never written read as absent
//! - Writers to different shards proceed concurrently and all writes land
//! - A key's shard is fixed by CRC32C for the store's lifetime

use super::common::{keys_in_different_shards, one_key_per_shard};
use hostcore_common::config::{CoreConfig, StoreConfig};
use hostcore_kv::{shard_for, ShardedStore};
use std::sync::Barrier;
use std::thread;

#[test]
fn test_read_your_write() {
    let store = ShardedStore::new();
    for i in 0..1_000 {
        let key = format!("user:{i}");
        let value = format!("value-{i}");
        store.set(key.as_str(), value.as_str());
        assert_eq!(store.get(&key), Some(value));
    }
}

#[test]
fn test_never_written_key_is_absent() {
    let store = ShardedStore::new();
    store.set("present", "yes");
    assert_eq!(store.get("absent"), None);
    assert_eq!(store.get(""), None);
}

#[test]
fn test_different_shards_write_concurrently() {
    let store = ShardedStore::new();
    let (k1, k2) = keys_in_different_shards(&store);
    assert_ne!(store.shard_index(&k1), store.shard_index(&k2));

    let barrier = Barrier::new(2);
    thread::scope(|scope| {
        for (key, value) in [(&k1, "v1"), (&k2, "v2")] {
            let store = &store;
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                for _ in 0..10_000 {
                    store.set(key.as_str(), value);
                }
            });
        }
    });

    assert_eq!(store.get(&k1).as_deref(), Some("v1"));
    assert_eq!(store.get(&k2).as_deref(), Some("v2"));
}

#[test]
fn test_one_writer_per_shard() {
    let store = ShardedStore::new();
    let keys = one_key_per_shard(&store);
    assert_eq!(keys.len(), store.shard_count());

    thread::scope(|scope| {
        for key in &keys {
            let store = &store;
            scope.spawn(move || {
                for i in 0..1_000 {
                    store.set(key.as_str(), i.to_string());
                }
            });
        }
    });

    assert!(store.shard_lens().iter().all(|&n| n == 1));
    for key in &keys {
        assert_eq!(store.get(key).as_deref(), Some("999"));
    }
}

#[test]
fn test_same_key_last_writer_wins() {
    let store = ShardedStore::new();
    thread::scope(|scope| {
        for t in 0..4 {
            let store = &store;
            scope.spawn(move || {
                for _ in 0..1_000 {
                    store.set("shared", format!("t{t}"));
                }
            });
        }
    });

    let value = store.get("shared").unwrap();
    assert!(["t0", "t1", "t2", "t3"].contains(&value.as_str()));
    assert_eq!(store.len(), 1);
}

#[test]
fn test_shard_mapping_is_crc32c_mod_n() {
    let store = ShardedStore::with_shards(16).unwrap();
    for i in 0..256 {
        let key = format!("session:{i}");
        let expected = crc32c::crc32c(key.as_bytes()) as usize % 16;
        assert_eq!(store.shard_index(&key), expected);
        assert_eq!(shard_for(&key, 16), expected);
        store.set(key.as_str(), "x");
        assert_eq!(store.shard_index(&key), expected);
    }
}

#[test]
fn test_store_from_config() {
    let config = CoreConfig::from_toml("[store]\nshard_count = 8\n").unwrap();
    let store = ShardedStore::from_config(&config.store).unwrap();
    assert_eq!(store.shard_count(), 8);

    assert!(CoreConfig::from_toml("[store]\nshard_count = 0\n").is_err());
    assert!(ShardedStore::from_config(&StoreConfig { shard_count: 0 }).is_err());
}
