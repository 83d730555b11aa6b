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

//! The blob and data-owner model: a uniform view over in-memory, file-backed, and
//! remote-origin byte ranges, grounded in the `ByteStoreProvider`/mmap pattern of
//! `fs/store/src/remote/mod.rs` (owned buffers vs. memory-mapped files, with a
//! receipt-style lease for remote-origin pins).

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use cradle_errors::CradleError;
use hashing::Digest;
use parking_lot::Mutex;

/// Released on `Drop` to acknowledge an RPC peer that it may free the backing it sent us.
/// Modeled on the `resolve_sync` `response_id` ack contract: holding one of these keeps a
/// remote-origin buffer alive; dropping it is the acknowledgement.
pub trait RemoteLease: fmt::Debug + Send + Sync {}

#[derive(Debug)]
struct NoopLease;
impl RemoteLease for NoopLease {}

/// The backing store for a [`Blob`]'s bytes.
enum DataOwner {
  /// An owned heap buffer.
  Owned(Bytes),
  /// A memory-mapped file, with an externally-visible path so that peers on the same host
  /// can map it directly rather than receiving an inline copy.
  MappedFile {
    path: PathBuf,
    mmap: Arc<memmap2::Mmap>,
  },
  /// A buffer whose origin is a remote peer, pinned by an RPC acknowledgement.
  Remote {
    bytes: Bytes,
    #[allow(dead_code)]
    lease: Arc<dyn RemoteLease>,
  },
}

impl fmt::Debug for DataOwner {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DataOwner::Owned(bytes) => f.debug_tuple("Owned").field(&bytes.len()).finish(),
      DataOwner::MappedFile { path, .. } => f.debug_tuple("MappedFile").field(path).finish(),
      DataOwner::Remote { bytes, .. } => f.debug_tuple("Remote").field(&bytes.len()).finish(),
    }
  }
}

impl DataOwner {
  fn as_slice(&self) -> &[u8] {
    match self {
      DataOwner::Owned(bytes) => bytes.as_ref(),
      DataOwner::MappedFile { mmap, .. } => mmap.as_ref(),
      DataOwner::Remote { bytes, .. } => bytes.as_ref(),
    }
  }

  fn path(&self) -> Option<&Path> {
    match self {
      DataOwner::MappedFile { path, .. } => Some(path),
      DataOwner::Owned(_) | DataOwner::Remote { .. } => None,
    }
  }
}

/// A contiguous, immutable byte range exposed as `(data_owner, start, length)`.
///
/// Equality compares byte content, never the backing identity: two blobs with different
/// data owners (one in memory, one file-backed) but equal bytes are equal. Hashing and
/// fingerprinting follow the same rule (§4.1: "for a blob it covers its raw bytes, never
/// the data-owner identity").
#[derive(Clone)]
pub struct Blob {
  owner: Arc<DataOwner>,
  start: usize,
  length: usize,
}

impl Blob {
  pub fn from_bytes(bytes: impl Into<Bytes>) -> Blob {
    let bytes = bytes.into();
    let length = bytes.len();
    Blob {
      owner: Arc::new(DataOwner::Owned(bytes)),
      start: 0,
      length,
    }
  }

  pub fn empty() -> Blob {
    Blob::from_bytes(Bytes::new())
  }

  /// Maps `path` into memory and wraps the whole file as a blob.
  pub fn from_mapped_file(path: impl Into<PathBuf>) -> Result<Blob, CradleError> {
    let path = path.into();
    let file = std::fs::File::open(&path)
      .map_err(|e| CradleError::invalid_argument(format!("opening {path:?}: {e}")))?;
    let mmap = unsafe { memmap2::Mmap::map(&file) }
      .map_err(|e| CradleError::invalid_argument(format!("mapping {path:?}: {e}")))?;
    let length = mmap.len();
    Ok(Blob {
      owner: Arc::new(DataOwner::MappedFile {
        path,
        mmap: Arc::new(mmap),
      }),
      start: 0,
      length,
    })
  }

  /// Wraps bytes that arrived from a remote peer, pinned by `lease` until it is dropped.
  pub fn from_remote(bytes: impl Into<Bytes>, lease: Arc<dyn RemoteLease>) -> Blob {
    let bytes = bytes.into();
    let length = bytes.len();
    Blob {
      owner: Arc::new(DataOwner::Remote { bytes, lease }),
      start: 0,
      length,
    }
  }

  pub fn as_bytes(&self) -> &[u8] {
    &self.owner.as_slice()[self.start..self.start + self.length]
  }

  pub fn len(&self) -> usize {
    self.length
  }

  pub fn is_empty(&self) -> bool {
    self.length == 0
  }

  pub fn digest(&self) -> Digest {
    Digest::of_bytes(self.as_bytes())
  }

  /// If this blob is backed by a named file, the path peers on the same host could map
  /// directly (used by the wire format to transmit file-backed blobs by path instead of
  /// inlining them).
  pub fn file_path(&self) -> Option<&Path> {
    self.owner.path()
  }

  /// A zero-copy sub-range of this blob; panics if `range` is out of bounds, matching
  /// the teacher's `Bytes::slice` convention.
  pub fn slice(&self, range: std::ops::Range<usize>) -> Blob {
    assert!(
      range.end <= self.length,
      "slice {:?} out of bounds for blob of length {}",
      range,
      self.length
    );
    Blob {
      owner: self.owner.clone(),
      start: self.start + range.start,
      length: range.end - range.start,
    }
  }
}

impl PartialEq for Blob {
  fn eq(&self, other: &Self) -> bool {
    self.as_bytes() == other.as_bytes()
  }
}
impl Eq for Blob {}

impl std::hash::Hash for Blob {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.as_bytes().hash(state);
  }
}

impl fmt::Debug for Blob {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Blob")
      .field("len", &self.length)
      .field("digest", &self.digest())
      .finish()
  }
}

/// Above this size, blobs are preferentially file-backed, so that inter-process transfer
/// (e.g. to a contained child or a loopback worker) is zero-copy via mmap rather than a
/// serialized inline copy.
pub const DEFAULT_FILE_BACKING_THRESHOLD_BYTES: usize = 64 * 1024;

/// Allocates a file-backed buffer of `size` bytes, exposes it for writing, and is sealed
/// by [`BlobFileWriter::on_write_completed`] into a read-only [`Blob`].
pub struct BlobFileWriter {
  path: PathBuf,
  file: Mutex<std::fs::File>,
  size: usize,
}

impl BlobFileWriter {
  pub fn allocate(dir: &Path, size: usize) -> Result<BlobFileWriter, CradleError> {
    let file = tempfile::NamedTempFile::new_in(dir)
      .map_err(|e| CradleError::invalid_argument(format!("allocating blob file: {e}")))?;
    let (file, path) = file.keep().map_err(|e| {
      CradleError::invalid_argument(format!("persisting blob file: {}", e.error))
    })?;
    file
      .set_len(size as u64)
      .map_err(|e| CradleError::invalid_argument(format!("sizing blob file: {e}")))?;
    Ok(BlobFileWriter {
      path,
      file: Mutex::new(file),
      size,
    })
  }

  pub fn size(&self) -> usize {
    self.size
  }

  /// Writes `bytes` at `offset`. Callers may call this repeatedly to fill different
  /// ranges of the buffer before sealing it.
  pub fn write_at(&self, offset: usize, bytes: &[u8]) -> Result<(), CradleError> {
    use std::io::{Seek, SeekFrom, Write};
    if offset + bytes.len() > self.size {
      return Err(CradleError::invalid_argument(format!(
        "write of {} bytes at offset {offset} overflows {}-byte buffer",
        bytes.len(),
        self.size
      )));
    }
    let mut file = self.file.lock();
    file
      .seek(SeekFrom::Start(offset as u64))
      .map_err(|e| CradleError::invalid_argument(format!("seeking blob file: {e}")))?;
    file
      .write_all(bytes)
      .map_err(|e| CradleError::invalid_argument(format!("writing blob file: {e}")))?;
    Ok(())
  }

  /// Seals the buffer and yields a read-only blob mapped over the completed file.
  pub fn on_write_completed(self) -> Result<Blob, CradleError> {
    {
      let file = self.file.lock();
      file
        .sync_all()
        .map_err(|e| CradleError::invalid_argument(format!("syncing blob file: {e}")))?;
    }
    Blob::from_mapped_file(self.path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn equality_is_by_content_not_backing() {
    let a = Blob::from_bytes(Bytes::from_static(b"hello"));
    let dir = tempfile::tempdir().unwrap();
    let writer = BlobFileWriter::allocate(dir.path(), 5).unwrap();
    writer.write_at(0, b"hello").unwrap();
    let b = writer.on_write_completed().unwrap();
    assert_eq!(a, b);
    assert!(b.file_path().is_some());
    assert!(a.file_path().is_none());
  }

  #[test]
  fn slicing_is_zero_copy_over_the_same_owner() {
    let blob = Blob::from_bytes(Bytes::from_static(b"hello world"));
    let world = blob.slice(6..11);
    assert_eq!(world.as_bytes(), b"world");
    assert!(Arc::ptr_eq(&blob.owner, &world.owner));
  }

  #[test]
  fn digest_matches_hashing_of_bytes() {
    let blob = Blob::from_bytes(Bytes::from_static(b"abc"));
    assert_eq!(blob.digest(), Digest::of_bytes(b"abc"));
  }
}
