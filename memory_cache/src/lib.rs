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

//! The in-process, two-tier memory cache (§3 "AC record"/"CAS record", §4.5): an action
//! cache keyed by request fingerprint, backed by a content-addressed store keyed by value
//! digest so that requests producing equal values share one CAS record. In-flight
//! computations are deduplicated by an `async_value`-style producer/receiver pair, adapted
//! in `producer.rs`.

mod producer;
mod record;

pub use producer::{Producer, ProducerReceiver, ProducerSender};
pub use record::{AcRecord, AcState, CachePtr, CasLock, CasPayload, CasRecord};

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cradle_errors::CradleError;
use futures::future::BoxFuture;
use hashing::{Digest, Fingerprint};
use parking_lot::Mutex;
use values::Value;

/// The default in-memory budget (bytes of CAS payload) before eviction kicks in.
pub const DEFAULT_CAPACITY_BYTES: usize = 256 * 1024 * 1024;

struct Tables {
  ac: HashMap<Fingerprint, Arc<AcRecord>>,
  cas: HashMap<Digest, Arc<CasRecord>>,
  /// Keeps the `Producer`'s shared `ProducerReceiver` strongly alive for as long as this
  /// fingerprint is loading: `Producer` itself only holds a `Weak` handle to it, so without
  /// this every concurrent waiter's `Producer::receiver()` call would upgrade to `None`.
  producers: HashMap<Fingerprint, (Producer, ProducerReceiver)>,
  /// Least-recently-touched digest at the front; walked by eviction.
  lru: VecDeque<Digest>,
  /// Least-recently-ready fingerprint at the front; walked by eviction before `lru`, since
  /// dropping an AC record's `CasLock` is what makes its CAS record evictable in turn.
  ac_lru: VecDeque<Fingerprint>,
}

pub struct MemoryCache {
  tables: Mutex<Tables>,
  capacity_bytes: usize,
  used_bytes: AtomicUsize,
}

impl MemoryCache {
  pub fn new(capacity_bytes: usize) -> MemoryCache {
    MemoryCache {
      tables: Mutex::new(Tables {
        ac: HashMap::new(),
        cas: HashMap::new(),
        producers: HashMap::new(),
        lru: VecDeque::new(),
        ac_lru: VecDeque::new(),
      }),
      capacity_bytes,
      used_bytes: AtomicUsize::new(0),
    }
  }

  /// Resolves `fingerprint` against the cache: returns the cached value with a fresh
  /// [`CachePtr`] pin if present or already in flight, otherwise runs `compute` as the
  /// sole producer for every concurrent caller asking for the same fingerprint.
  pub async fn resolve(
    &self,
    fingerprint: Fingerprint,
    compute: impl FnOnce() -> BoxFuture<'static, Result<Value, CradleError>>,
  ) -> Result<(Value, CachePtr), CradleError> {
    enum Role {
      AlreadyReady(Value, Arc<AcRecord>),
      AlreadyFailed(String),
      WaitOnProducer(ProducerReceiver, Arc<AcRecord>),
      BecomeProducer(Arc<AcRecord>, ProducerSender),
    }

    let role = {
      let mut tables = self.tables.lock();
      if let Some(existing) = tables.ac.get(&fingerprint).cloned() {
        match existing.state() {
          AcState::Ready { cas_lock } => {
            let value = match cas_lock.record().payload() {
              CasPayload::Resident(value) => Some(value),
              CasPayload::Secondary => None,
            };
            match value {
              Some(value) => Role::AlreadyReady(value, existing),
              None => Role::AlreadyFailed(
                "value evicted to secondary storage; re-fetch via the secondary cache"
                  .to_string(),
              ),
            }
          }
          AcState::Failed { message } => Role::AlreadyFailed(message),
          AcState::Loading => {
            let receiver = tables
              .producers
              .get(&fingerprint)
              .map(|(_producer, receiver)| receiver.clone())
              .expect("a Loading AC record always has a live producer");
            Role::WaitOnProducer(receiver, existing)
          }
        }
      } else {
        let record = AcRecord::new_loading(fingerprint);
        tables.ac.insert(fingerprint, Arc::clone(&record));
        let (producer, sender, receiver) = Producer::new();
        tables.producers.insert(fingerprint, (producer, receiver));
        Role::BecomeProducer(record, sender)
      }
    };

    match role {
      Role::AlreadyReady(value, record) => Ok((value, CachePtr::acquire(record))),
      Role::AlreadyFailed(message) => Err(CradleError::LogicError { message }),
      Role::WaitOnProducer(receiver, record) => {
        let value = receiver.wait().await?;
        Ok((value, CachePtr::acquire(record)))
      }
      Role::BecomeProducer(record, sender) => {
        let result = compute().await;
        match &result {
          Ok(value) => {
            let cas_record = self.insert_value(value.clone());
            record.mark_ready(CasLock::acquire(cas_record));
            self.tables.lock().ac_lru.push_back(fingerprint);
            self.evict_if_over_capacity();
          }
          Err(e) => {
            record.mark_failed(e.to_string());
            // Failed AC records are not retained: the next caller should get a fresh
            // producer rather than a permanently cached failure.
            self.tables.lock().ac.remove(&fingerprint);
          }
        }
        self.tables.lock().producers.remove(&fingerprint);
        sender.send(result.clone());
        result.map(|value| (value, CachePtr::acquire(record)))
      }
    }
  }

  /// Inserts `value` into the CAS, returning its record. Two equal values always resolve to
  /// the same digest and share one record (§3: "Two requests that produce equal values
  /// share one CAS record").
  fn insert_value(&self, value: Value) -> Arc<CasRecord> {
    let bytes = value
      .canonical_bytes()
      .unwrap_or_else(|_| format!("{value:?}").into_bytes());
    let digest = Digest::of_bytes(&bytes);
    let mut tables = self.tables.lock();
    let record = tables
      .cas
      .entry(digest)
      .or_insert_with(|| {
        self.used_bytes.fetch_add(bytes.len(), Ordering::AcqRel);
        CasRecord::new(digest, CasPayload::Resident(value))
      })
      .clone();
    tables.lru.push_back(digest);
    record
  }

  pub fn cas_lock(&self, digest: Digest) -> Option<CasLock> {
    self
      .tables
      .lock()
      .cas
      .get(&digest)
      .cloned()
      .map(CasLock::acquire)
  }

  pub fn used_bytes(&self) -> usize {
    self.used_bytes.load(Ordering::Acquire)
  }

  pub fn capacity_bytes(&self) -> usize {
    self.capacity_bytes
  }

  /// Evicts zero-refcount records in LRU order until usage is back under budget, or until
  /// nothing left in either LRU list is evictable. AC records are walked first: dropping an
  /// unpinned AC record releases the `CasLock` it holds on its CAS record, which is what
  /// lets that CAS record become evictable in turn (§3's refcount invariant).
  fn evict_if_over_capacity(&self) {
    if self.used_bytes() <= self.capacity_bytes {
      return;
    }
    let mut tables = self.tables.lock();

    let mut ac_requeue = VecDeque::new();
    while self.used_bytes.load(Ordering::Acquire) > self.capacity_bytes {
      let Some(fingerprint) = tables.ac_lru.pop_front() else {
        break;
      };
      match tables.ac.get(&fingerprint) {
        Some(record) if record.refcount() == 0 => {
          tables.ac.remove(&fingerprint);
        }
        Some(_) => ac_requeue.push_back(fingerprint),
        None => {}
      }
    }
    tables.ac_lru.extend(ac_requeue);

    let mut cas_requeue = VecDeque::new();
    while self.used_bytes.load(Ordering::Acquire) > self.capacity_bytes {
      let Some(digest) = tables.lru.pop_front() else {
        break;
      };
      let Some(record) = tables.cas.get(&digest).cloned() else {
        continue;
      };
      if !record.is_evictable() {
        cas_requeue.push_back(digest);
        continue;
      }
      if let CasPayload::Resident(value) = record.payload() {
        if let Ok(bytes) = value.canonical_bytes() {
          self.used_bytes.fetch_sub(bytes.len(), Ordering::AcqRel);
        }
      }
      tables.cas.remove(&digest);
    }
    tables.lru.extend(cas_requeue);
  }
}
