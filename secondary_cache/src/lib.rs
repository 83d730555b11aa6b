#![deny(warnings)]
#![deny(
  clippy::all,
  clippy::default_trait_access,
  clippy::expl_impl_clone_on_copy,
  clippy::if_not_else,
  clippy::needless_continue,
  clippy::unseparated_literal_suffix,
  clippy::used_underscore_binding
)]
#![allow(clippy::match_ref_pats)]
#![allow(
  clippy::len_without_is_empty,
  clippy::redundant_field_names,
  clippy::too_many_arguments
)]
#![allow(clippy::new_without_default, clippy::new_ret_no_self)]
#![allow(clippy::mutex_atomic)]

//! The on-disk accelerator cache (§4.6): a directory holding `index.db` (SQLite) plus
//! optional payload files named by digest. Every entry is reconstructable by re-running the
//! request that produced it, so the index runs with `synchronous=OFF`/`journal_mode=MEMORY` —
//! fast, but not power-loss-safe — and a corrupt or unopenable index is simply wiped and
//! recreated on startup rather than repaired.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use cradle_errors::CradleError;
use hashing::{Digest, Fingerprint};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

/// Payloads at or under this size are stored inline in the `cas` row; larger ones are
/// streamed to a sibling file named by digest.
const INLINE_PAYLOAD_LIMIT_BYTES: usize = 4096;

/// Access-time updates are buffered and flushed in a batch once this many accumulate, to
/// avoid a write on every hot-path read (§4.6 "Access tracking").
const ACCESS_FLUSH_THRESHOLD: usize = 10;

/// Eviction runs once bytes inserted since the last sweep exceed this fraction of the
/// configured capacity (§4.6 "Eviction").
const EVICTION_FRACTION: u64 = 128;

const SCHEMA_VERSION: i64 = 1;

/// Where a read's bytes actually are: inline in the index, or in a sibling payload file.
#[derive(Debug, Clone)]
pub enum PayloadLocation {
  Inline(Vec<u8>),
  File(PathBuf),
}

struct Inner {
  conn: Connection,
  pending_access_times: HashMap<i64, i64>,
  bytes_since_sweep: u64,
}

/// A SQLite-backed disk cache rooted at one directory. Safe to share across tasks: the
/// connection is guarded by a single mutex, matching the teacher's preference for an
/// explicit lock over juggling SQLite's own threading modes.
pub struct SecondaryCache {
  dir: PathBuf,
  capacity_bytes: u64,
  inner: Mutex<Inner>,
}

fn now_unix_ms() -> i64 {
  std::time::SystemTime::now()
    .duration_since(std::time::UNIX_EPOCH)
    .map(|d| d.as_millis() as i64)
    .unwrap_or(0)
}

fn sqlite_error(context: &str, err: rusqlite::Error) -> CradleError {
  CradleError::logic_error(format!("secondary cache {context}: {err}"))
}

impl SecondaryCache {
  /// Opens (creating if necessary) the index at `dir/index.db`. An index that exists but
  /// fails to open (or carries an unexpected schema version) is wiped and recreated, per
  /// §4.6's "On startup, an unopenable index is wiped and recreated".
  pub fn open(dir: impl Into<PathBuf>, capacity_bytes: u64) -> Result<SecondaryCache, CradleError> {
    let dir = dir.into();
    fs::create_dir_all(&dir)
      .map_err(|e| CradleError::logic_error(format!("creating secondary cache dir: {e}")))?;
    let index_path = dir.join("index.db");

    let conn = match Self::open_and_migrate(&index_path) {
      Ok(conn) => conn,
      Err(err) => {
        log::warn!("secondary cache index at {index_path:?} unusable ({err}); recreating");
        let _ = fs::remove_file(&index_path);
        Self::open_and_migrate(&index_path)?
      }
    };

    let cache = SecondaryCache {
      dir,
      capacity_bytes,
      inner: Mutex::new(Inner {
        conn,
        pending_access_times: HashMap::new(),
        bytes_since_sweep: 0,
      }),
    };
    cache.purge_crashed_rows()?;
    Ok(cache)
  }

  fn open_and_migrate(path: &Path) -> Result<Connection, CradleError> {
    let conn = Connection::open(path).map_err(|e| sqlite_error("opening index", e))?;
    conn
      .pragma_update(None, "synchronous", "OFF")
      .map_err(|e| sqlite_error("setting synchronous", e))?;
    conn
      .pragma_update(None, "journal_mode", "MEMORY")
      .map_err(|e| sqlite_error("setting journal_mode", e))?;

    let user_version: i64 = conn
      .query_row("PRAGMA user_version", [], |row| row.get(0))
      .map_err(|e| sqlite_error("reading user_version", e))?;
    if user_version != 0 && user_version != SCHEMA_VERSION {
      return Err(CradleError::logic_error(format!(
        "unexpected secondary cache schema version {user_version}"
      )));
    }

    conn
      .execute_batch(
        "
        CREATE TABLE IF NOT EXISTS cas (
          cas_id        INTEGER PRIMARY KEY,
          digest        TEXT NOT NULL UNIQUE,
          valid         BOOLEAN NOT NULL,
          in_db         BOOLEAN NOT NULL,
          value         BLOB,
          size          INTEGER NOT NULL,
          original_size INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS actions (
          ac_id         INTEGER PRIMARY KEY,
          key           TEXT NOT NULL UNIQUE,
          cas_id        INTEGER NOT NULL REFERENCES cas(cas_id),
          last_accessed INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS actions_cas_id ON actions(cas_id);
        CREATE INDEX IF NOT EXISTS actions_last_accessed ON actions(last_accessed);
        ",
      )
      .map_err(|e| sqlite_error("creating schema", e))?;
    conn
      .pragma_update(None, "user_version", SCHEMA_VERSION)
      .map_err(|e| sqlite_error("setting user_version", e))?;
    Ok(conn)
  }

  /// Removes any `cas` row left `valid=0` by a crash mid-write, together with any `actions`
  /// row that referenced it (§4.6 "A partially-written CAS row... is purged").
  fn purge_crashed_rows(&self) -> Result<(), CradleError> {
    let inner = self.inner.lock();
    inner
      .conn
      .execute(
        "DELETE FROM actions WHERE cas_id IN (SELECT cas_id FROM cas WHERE valid = 0)",
        [],
      )
      .map_err(|e| sqlite_error("purging dangling actions", e))?;
    inner
      .conn
      .execute("DELETE FROM cas WHERE valid = 0", [])
      .map_err(|e| sqlite_error("purging crashed cas rows", e))?;
    Ok(())
  }

  fn payload_path(&self, digest: Digest) -> PathBuf {
    self.dir.join(digest.hash.to_hex())
  }

  /// Looks up `key`; returns `None` on a miss. A hit's access time is buffered, not written
  /// immediately (§4.6 "Access tracking").
  pub fn get(&self, key: Fingerprint) -> Result<Option<(Digest, PayloadLocation)>, CradleError> {
    let key_hex = key.to_hex();
    let row = {
      let inner = self.inner.lock();
      inner
        .conn
        .query_row(
          "SELECT actions.ac_id, cas.digest, cas.size, cas.in_db, cas.value
             FROM actions JOIN cas ON actions.cas_id = cas.cas_id
            WHERE actions.key = ?1 AND cas.valid = 1",
          params![key_hex],
          |row| {
            let ac_id: i64 = row.get(0)?;
            let digest_hex: String = row.get(1)?;
            let size: i64 = row.get(2)?;
            let in_db: bool = row.get(3)?;
            let value: Option<Vec<u8>> = row.get(4)?;
            Ok((ac_id, digest_hex, size, in_db, value))
          },
        )
        .optional()
        .map_err(|e| sqlite_error("reading action", e))?
    };

    let Some((ac_id, digest_hex, size, in_db, value)) = row else {
      return Ok(None);
    };
    let fingerprint = Fingerprint::from_hex_string(&digest_hex)
      .map_err(|e| CradleError::logic_error(format!("corrupt digest in secondary cache: {e}")))?;
    let digest = Digest::new(fingerprint, size as usize);

    self.note_access(ac_id)?;

    let location = if in_db {
      PayloadLocation::Inline(value.unwrap_or_default())
    } else {
      PayloadLocation::File(self.payload_path(digest))
    };
    Ok(Some((digest, location)))
  }

  fn note_access(&self, ac_id: i64) -> Result<(), CradleError> {
    let mut to_flush = None;
    {
      let mut inner = self.inner.lock();
      inner.pending_access_times.insert(ac_id, now_unix_ms());
      if inner.pending_access_times.len() >= ACCESS_FLUSH_THRESHOLD {
        to_flush = Some(std::mem::take(&mut inner.pending_access_times));
      }
    }
    if let Some(batch) = to_flush {
      self.flush_access_times(&batch)?;
    }
    Ok(())
  }

  fn flush_access_times(&self, batch: &HashMap<i64, i64>) -> Result<(), CradleError> {
    let inner = self.inner.lock();
    for (&ac_id, &accessed_at) in batch {
      inner
        .conn
        .execute(
          "UPDATE actions SET last_accessed = ?1 WHERE ac_id = ?2",
          params![accessed_at, ac_id],
        )
        .map_err(|e| sqlite_error("flushing access time", e))?;
    }
    Ok(())
  }

  /// Forces any buffered access-time updates out to the index now, e.g. when the cache
  /// becomes idle (§4.6).
  pub fn flush_pending_access_times(&self) -> Result<(), CradleError> {
    let batch = std::mem::take(&mut self.inner.lock().pending_access_times);
    if batch.is_empty() {
      return Ok(());
    }
    self.flush_access_times(&batch)
  }

  /// Writes `bytes` (whose digest is `digest`) under `key`, then triggers eviction if the
  /// insertion budget has been exceeded. Idempotent: a second writer for the same key is a
  /// no-op (§4.6 write path step 1), and a value whose digest is already cached just grows a
  /// second `actions` pointer onto the existing `cas` row (step 2).
  pub fn put(&self, key: Fingerprint, digest: Digest, bytes: &[u8]) -> Result<(), CradleError> {
    let key_hex = key.to_hex();
    let digest_hex = digest.hash.to_hex();

    let should_evict = {
      let mut inner = self.inner.lock();

      let already_present: Option<i64> = inner
        .conn
        .query_row(
          "SELECT ac_id FROM actions WHERE key = ?1",
          params![key_hex],
          |row| row.get(0),
        )
        .optional()
        .map_err(|e| sqlite_error("checking existing action", e))?;
      if already_present.is_some() {
        return Ok(());
      }

      let existing_cas: Option<i64> = inner
        .conn
        .query_row(
          "SELECT cas_id FROM cas WHERE digest = ?1 AND valid = 1",
          params![digest_hex],
          |row| row.get(0),
        )
        .optional()
        .map_err(|e| sqlite_error("checking existing cas row", e))?;

      let cas_id = match existing_cas {
        Some(cas_id) => cas_id,
        None => self.insert_cas_row(&inner.conn, &digest_hex, digest, bytes)?,
      };

      inner
        .conn
        .execute(
          "INSERT INTO actions (key, cas_id, last_accessed) VALUES (?1, ?2, ?3)",
          params![key_hex, cas_id, now_unix_ms()],
        )
        .map_err(|e| sqlite_error("inserting action", e))?;

      inner.bytes_since_sweep += bytes.len() as u64;
      inner.bytes_since_sweep * EVICTION_FRACTION > self.capacity_bytes
    };

    if should_evict {
      self.evict()?;
    }
    Ok(())
  }

  /// Inserts a complete `cas` row: in-line for small payloads, or `initiate_insert` /
  /// stream-to-file / `finish_insert` for large ones (§4.6 write path step 3).
  fn insert_cas_row(
    &self,
    conn: &Connection,
    digest_hex: &str,
    digest: Digest,
    bytes: &[u8],
  ) -> Result<i64, CradleError> {
    if bytes.len() <= INLINE_PAYLOAD_LIMIT_BYTES {
      conn
        .execute(
          "INSERT INTO cas (digest, valid, in_db, value, size, original_size)
           VALUES (?1, 1, 1, ?2, ?3, ?3)",
          params![digest_hex, bytes, bytes.len() as i64],
        )
        .map_err(|e| sqlite_error("inserting inline cas row", e))?;
      return Ok(conn.last_insert_rowid());
    }

    conn
      .execute(
        "INSERT INTO cas (digest, valid, in_db, value, size, original_size)
         VALUES (?1, 0, 0, NULL, 0, ?2)",
        params![digest_hex, bytes.len() as i64],
      )
      .map_err(|e| sqlite_error("initiating cas row", e))?;
    let cas_id = conn.last_insert_rowid();

    let path = self.payload_path(digest);
    if let Err(e) = fs::write(&path, bytes) {
      let _ = conn.execute("DELETE FROM cas WHERE cas_id = ?1", params![cas_id]);
      return Err(CradleError::logic_error(format!(
        "writing secondary cache payload file {path:?}: {e}"
      )));
    }

    conn
      .execute(
        "UPDATE cas SET valid = 1, in_db = 0, size = ?2 WHERE cas_id = ?1",
        params![cas_id, bytes.len() as i64],
      )
      .map_err(|e| sqlite_error("finishing cas row", e))?;
    Ok(cas_id)
  }

  /// Deletes `actions` rows in LRU order, and any `cas` row (plus payload file) that no
  /// longer has a referrer, until the insertion budget is back under control (§4.6
  /// "Eviction").
  fn evict(&self) -> Result<(), CradleError> {
    let mut inner = self.inner.lock();
    let target_deletions = (inner.bytes_since_sweep / EVICTION_FRACTION).max(1) as i64;
    inner.bytes_since_sweep = 0;

    let victims: Vec<(i64, i64)> = {
      let mut stmt = inner
        .conn
        .prepare(
          "SELECT ac_id, cas_id FROM actions ORDER BY last_accessed ASC LIMIT ?1",
        )
        .map_err(|e| sqlite_error("preparing eviction scan", e))?;
      let rows = stmt
        .query_map(params![target_deletions], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(|e| sqlite_error("scanning eviction candidates", e))?;
      rows
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| sqlite_error("collecting eviction candidates", e))?
    };

    for (ac_id, cas_id) in victims {
      inner
        .conn
        .execute("DELETE FROM actions WHERE ac_id = ?1", params![ac_id])
        .map_err(|e| sqlite_error("evicting action", e))?;
      inner.pending_access_times.remove(&ac_id);

      let remaining_refs: i64 = inner
        .conn
        .query_row(
          "SELECT COUNT(*) FROM actions WHERE cas_id = ?1",
          params![cas_id],
          |row| row.get(0),
        )
        .map_err(|e| sqlite_error("counting cas referrers", e))?;
      if remaining_refs > 0 {
        continue;
      }

      let digest_hex: Option<String> = inner
        .conn
        .query_row(
          "SELECT digest FROM cas WHERE cas_id = ?1",
          params![cas_id],
          |row| row.get(0),
        )
        .optional()
        .map_err(|e| sqlite_error("reading evicted digest", e))?;
      inner
        .conn
        .execute("DELETE FROM cas WHERE cas_id = ?1", params![cas_id])
        .map_err(|e| sqlite_error("evicting cas row", e))?;
      if let Some(digest_hex) = digest_hex {
        if let Ok(fingerprint) = Fingerprint::from_hex_string(&digest_hex) {
          let path = self.dir.join(fingerprint.to_hex());
          let _ = fs::remove_file(path);
        }
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests;
