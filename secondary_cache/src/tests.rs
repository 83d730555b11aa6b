use hashing::{Digest, Fingerprint};
use tempfile::TempDir;

use crate::{PayloadLocation, SecondaryCache};

fn fp(seed: u8) -> Fingerprint {
  Fingerprint::combine([&[seed][..]])
}

fn open(capacity_bytes: u64) -> (TempDir, SecondaryCache) {
  let dir = TempDir::new().unwrap();
  let cache = SecondaryCache::open(dir.path(), capacity_bytes).unwrap();
  (dir, cache)
}

#[test]
fn miss_returns_none() {
  let (_dir, cache) = open(1024 * 1024);
  assert!(cache.get(fp(1)).unwrap().is_none());
}

#[test]
fn small_payload_roundtrips_inline() {
  let (_dir, cache) = open(1024 * 1024);
  let bytes = b"hello secondary cache";
  let digest = Digest::of_bytes(bytes);
  cache.put(fp(1), digest, bytes).unwrap();

  let (got_digest, location) = cache.get(fp(1)).unwrap().unwrap();
  assert_eq!(got_digest, digest);
  match location {
    PayloadLocation::Inline(value) => assert_eq!(value, bytes),
    PayloadLocation::File(_) => panic!("expected an inline payload"),
  }
}

#[test]
fn large_payload_roundtrips_via_file() {
  let (_dir, cache) = open(16 * 1024 * 1024);
  let bytes = vec![7u8; 8192];
  let digest = Digest::of_bytes(&bytes);
  cache.put(fp(2), digest, &bytes).unwrap();

  let (_got_digest, location) = cache.get(fp(2)).unwrap().unwrap();
  match location {
    PayloadLocation::File(path) => {
      let on_disk = std::fs::read(path).unwrap();
      assert_eq!(on_disk, bytes);
    }
    PayloadLocation::Inline(_) => panic!("expected a file-backed payload"),
  }
}

#[test]
fn two_keys_with_equal_values_share_one_cas_row() {
  let (dir, cache) = open(1024 * 1024);
  let bytes = b"shared value";
  let digest = Digest::of_bytes(bytes);
  cache.put(fp(3), digest, bytes).unwrap();
  cache.put(fp(4), digest, bytes).unwrap();

  let conn = rusqlite::Connection::open(dir.path().join("index.db")).unwrap();
  let cas_rows: i64 = conn
    .query_row("SELECT COUNT(*) FROM cas", [], |row| row.get(0))
    .unwrap();
  assert_eq!(cas_rows, 1);
  let action_rows: i64 = conn
    .query_row("SELECT COUNT(*) FROM actions", [], |row| row.get(0))
    .unwrap();
  assert_eq!(action_rows, 2);
}

#[test]
fn writing_the_same_key_twice_is_idempotent() {
  let (_dir, cache) = open(1024 * 1024);
  let first = b"first writer wins";
  let second = b"a later writer";
  let digest = Digest::of_bytes(first);
  cache.put(fp(5), digest, first).unwrap();
  cache
    .put(fp(5), Digest::of_bytes(second), second)
    .unwrap();

  let (got_digest, location) = cache.get(fp(5)).unwrap().unwrap();
  assert_eq!(got_digest, digest);
  assert!(matches!(location, PayloadLocation::Inline(value) if value == first));
}

#[test]
fn reopening_survives_a_restart() {
  let dir = TempDir::new().unwrap();
  let bytes = b"persisted across restarts";
  let digest = Digest::of_bytes(bytes);
  {
    let cache = SecondaryCache::open(dir.path(), 1024 * 1024).unwrap();
    cache.put(fp(6), digest, bytes).unwrap();
  }
  let cache = SecondaryCache::open(dir.path(), 1024 * 1024).unwrap();
  let (got_digest, _location) = cache.get(fp(6)).unwrap().unwrap();
  assert_eq!(got_digest, digest);
}

#[test]
fn opening_over_a_corrupt_index_recreates_it() {
  let dir = TempDir::new().unwrap();
  std::fs::write(dir.path().join("index.db"), b"not a sqlite database").unwrap();
  let cache = SecondaryCache::open(dir.path(), 1024 * 1024).unwrap();
  assert!(cache.get(fp(7)).unwrap().is_none());
}

#[test]
fn eviction_drops_the_least_recently_accessed_entry_first() {
  // A tiny capacity forces eviction on the very first insert past the threshold.
  let (_dir, cache) = open(1);
  let a = vec![1u8; 64];
  let b = vec![2u8; 64];
  cache.put(fp(8), Digest::of_bytes(&a), &a).unwrap();
  cache.put(fp(9), Digest::of_bytes(&b), &b).unwrap();

  // The oldest entry (fp(8)) should have been evicted by the second insert's sweep.
  assert!(cache.get(fp(8)).unwrap().is_none());
  assert!(cache.get(fp(9)).unwrap().is_some());
}
