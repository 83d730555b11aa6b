use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use cradle_errors::CradleError;
use hashing::Digest;
use parking_lot::Mutex;

/// Identifies one loaded plug-in by the directory it was loaded from and its name, matching
/// `containment_data`'s `(dll_directory, dll_name)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PluginKey {
  pub dll_directory: PathBuf,
  pub dll_name: String,
}

/// Tracks, per loaded plug-in, the CAS digests produced by requests contained under it, so
/// that `unload` can refuse to proceed while any of them is still referenced elsewhere. The
/// registry never inspects the memory cache directly — it asks the caller whether a digest
/// is still live via a callback, keeping this crate decoupled from `memory_cache` the same
/// way `request::ResolveContext` stays decoupled from the richer context crates.
pub struct PluginRegistry {
  loaded: Mutex<HashMap<PluginKey, HashSet<Digest>>>,
}

impl PluginRegistry {
  pub fn new() -> PluginRegistry {
    PluginRegistry {
      loaded: Mutex::new(HashMap::new()),
    }
  }

  /// Marks `key` as loaded; idempotent if it is already loaded.
  pub fn load(&self, key: PluginKey) {
    self.loaded.lock().entry(key).or_default();
  }

  pub fn is_loaded(&self, key: &PluginKey) -> bool {
    self.loaded.lock().contains_key(key)
  }

  /// Records that a value produced while `key` was loaded ended up at `digest` in the CAS.
  pub fn note_produced(&self, key: &PluginKey, digest: Digest) {
    if let Some(digests) = self.loaded.lock().get_mut(key) {
      digests.insert(digest);
    }
  }

  /// Unloads `key`, refusing with `CradleError::ContainmentFailure` if `is_live` reports any
  /// digest produced under it as still referenced (§9 Open Question: unload ownership).
  pub fn unload(
    &self,
    key: &PluginKey,
    mut is_live: impl FnMut(Digest) -> bool,
  ) -> Result<(), CradleError> {
    let mut loaded = self.loaded.lock();
    let Some(digests) = loaded.get(key) else {
      return Ok(());
    };
    if let Some(live_digest) = digests.iter().find(|&&d| is_live(d)) {
      return Err(CradleError::ContainmentFailure {
        message: format!(
          "refusing to unload {} from {:?}: digest {} is still referenced",
          key.dll_name, key.dll_directory, live_digest
        ),
      });
    }
    loaded.remove(key);
    Ok(())
  }
}
