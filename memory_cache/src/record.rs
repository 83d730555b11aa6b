use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use hashing::{Digest, Fingerprint};
use parking_lot::Mutex;
use values::Value;

/// Where a CAS record's bytes actually live. `Secondary` means the value was evicted from
/// (or never materialized in) this process's memory and must be fetched from the disk cache
/// by digest before it can be returned to a caller.
#[derive(Clone)]
pub enum CasPayload {
  Resident(Value),
  Secondary,
}

/// Keyed by value digest (§3 "CAS record"). `refcount` counts both AC records that point to
/// this entry and explicit [`CasLock`]s; the record is evictable only while it is zero.
pub struct CasRecord {
  digest: Digest,
  payload: Mutex<CasPayload>,
  refcount: AtomicUsize,
}

impl CasRecord {
  pub fn new(digest: Digest, payload: CasPayload) -> Arc<CasRecord> {
    Arc::new(CasRecord {
      digest,
      payload: Mutex::new(payload),
      refcount: AtomicUsize::new(0),
    })
  }

  pub fn digest(&self) -> Digest {
    self.digest
  }

  pub fn payload(&self) -> CasPayload {
    self.payload.lock().clone()
  }

  pub fn set_payload(&self, payload: CasPayload) {
    *self.payload.lock() = payload;
  }

  pub fn refcount(&self) -> usize {
    self.refcount.load(Ordering::Acquire)
  }

  pub fn is_evictable(&self) -> bool {
    self.refcount() == 0
  }

  fn incref(&self) {
    self.refcount.fetch_add(1, Ordering::AcqRel);
  }

  fn decref(&self) {
    let previous = self.refcount.fetch_sub(1, Ordering::AcqRel);
    debug_assert!(previous > 0, "CAS refcount underflow");
  }
}

/// A pin on a [`CasRecord`], held either by a pinned AC record or by an explicit caller
/// lock; dropping it releases the pin. Matches §3's "refcount = number of AC records
/// pointing to it, plus explicit locks".
pub struct CasLock {
  record: Arc<CasRecord>,
}

impl CasLock {
  pub fn acquire(record: Arc<CasRecord>) -> CasLock {
    record.incref();
    CasLock { record }
  }

  pub fn record(&self) -> &Arc<CasRecord> {
    &self.record
  }
}

impl Clone for CasLock {
  fn clone(&self) -> Self {
    CasLock::acquire(Arc::clone(&self.record))
  }
}

impl Drop for CasLock {
  fn drop(&mut self) {
    self.record.decref();
  }
}

/// An AC record's state (§3 "AC record"). `Ready` holds the [`CasLock`] pinning its CAS
/// record for exactly as long as this AC record exists: the CAS refcount invariant in §3
/// ("refcount = number of AC records pointing to it, plus explicit locks") then falls out
/// for free from `CasLock`'s own `Drop`, rather than needing separate bookkeeping.
#[derive(Clone)]
pub enum AcState {
  Loading,
  Ready { cas_lock: CasLock },
  Failed { message: String },
}

impl AcState {
  pub fn cas_digest(&self) -> Option<Digest> {
    match self {
      AcState::Ready { cas_lock } => Some(cas_lock.record().digest()),
      AcState::Loading | AcState::Failed { .. } => None,
    }
  }
}

/// Keyed by request fingerprint. While `refcount > 0` the record is pinned in memory; at
/// zero it becomes eligible for the LRU eviction list (tracked by the owning cache, not
/// here, since eviction order spans all AC records).
pub struct AcRecord {
  fingerprint: Fingerprint,
  state: Mutex<AcState>,
  refcount: AtomicUsize,
  last_access: Mutex<Instant>,
}

impl AcRecord {
  pub fn new_loading(fingerprint: Fingerprint) -> Arc<AcRecord> {
    Arc::new(AcRecord {
      fingerprint,
      state: Mutex::new(AcState::Loading),
      refcount: AtomicUsize::new(0),
      last_access: Mutex::new(Instant::now()),
    })
  }

  pub fn fingerprint(&self) -> Fingerprint {
    self.fingerprint
  }

  pub fn state(&self) -> AcState {
    self.state.lock().clone()
  }

  pub fn mark_ready(&self, cas_lock: CasLock) {
    *self.state.lock() = AcState::Ready { cas_lock };
  }

  pub fn mark_failed(&self, message: impl Into<String>) {
    *self.state.lock() = AcState::Failed {
      message: message.into(),
    };
  }

  pub fn refcount(&self) -> usize {
    self.refcount.load(Ordering::Acquire)
  }

  pub fn touch(&self) {
    *self.last_access.lock() = Instant::now();
  }

  pub fn last_access(&self) -> Instant {
    *self.last_access.lock()
  }

  fn incref(&self) {
    self.refcount.fetch_add(1, Ordering::AcqRel);
    self.touch();
  }

  fn decref(&self) {
    let previous = self.refcount.fetch_sub(1, Ordering::AcqRel);
    debug_assert!(previous > 0, "AC refcount underflow");
  }
}

/// A pin on an [`AcRecord`] (§3 "a resolution holds a cache ptr"); dropping it releases the
/// pin, at which point the record becomes eligible for LRU eviction if its refcount is zero.
pub struct CachePtr {
  record: Arc<AcRecord>,
}

impl CachePtr {
  pub fn acquire(record: Arc<AcRecord>) -> CachePtr {
    record.incref();
    CachePtr { record }
  }

  pub fn record(&self) -> &Arc<AcRecord> {
    &self.record
  }
}

impl Clone for CachePtr {
  fn clone(&self) -> Self {
    CachePtr::acquire(Arc::clone(&self.record))
  }
}

impl Drop for CachePtr {
  fn drop(&mut self) {
    self.record.decref();
  }
}
