use std::collections::HashMap;
use std::sync::Arc;

use async_tree::{AsyncId, AsyncRegistry, CancellationSource, Node};
use containment::{ContainedDispatcher, LoopbackContainedDispatcher, PluginRegistry};
use context::TaskletRegistry;
use memory_cache::MemoryCache;
use parking_lot::Mutex;
use remote_proxy::RemoteProxy;
use secondary_cache::SecondaryCache;

/// The resources a resolver needs to carry out the four dispatch axes of §4.7: the two-tier
/// cache, the async context tree table, an optional remote peer, and the containment
/// machinery for plug-in-backed requests. One `Resources` is shared (via `Arc`) across every
/// `Context` built over it, matching `graph::Context`'s single-scheduler-per-session shape.
pub struct Resources {
  pub memory_cache: MemoryCache,
  pub secondary_cache: Option<SecondaryCache>,
  pub remote_proxy: Option<Arc<dyn RemoteProxy>>,
  pub async_registry: AsyncRegistry,
  pub plugin_registry: PluginRegistry,
  pub contained_dispatcher: Arc<dyn ContainedDispatcher>,
  pub tasklet_registry: TaskletRegistry,
  /// `Node` only exposes a `CancellationToken` (observer-only); the source each root was
  /// built with (the trigger) is kept here, keyed by async id, so `request_cancellation` can
  /// find it (§4.8 "async_db keyed by async_id so remote callers can query status/cancel").
  async_sources: Mutex<HashMap<AsyncId, CancellationSource>>,
}

impl Resources {
  pub fn new(memory_cache: MemoryCache) -> Resources {
    Resources {
      memory_cache,
      secondary_cache: None,
      remote_proxy: None,
      async_registry: AsyncRegistry::new(),
      plugin_registry: PluginRegistry::new(),
      contained_dispatcher: Arc::new(LoopbackContainedDispatcher),
      tasklet_registry: TaskletRegistry::new(),
      async_sources: Mutex::new(HashMap::new()),
    }
  }

  pub fn with_secondary_cache(mut self, secondary_cache: SecondaryCache) -> Resources {
    self.secondary_cache = Some(secondary_cache);
    self
  }

  pub fn with_remote_proxy(mut self, proxy: Arc<dyn RemoteProxy>) -> Resources {
    self.remote_proxy = Some(proxy);
    self
  }

  pub fn with_contained_dispatcher(mut self, dispatcher: Arc<dyn ContainedDispatcher>) -> Resources {
    self.contained_dispatcher = dispatcher;
    self
  }

  /// Creates a new async context-tree root and records its cancellation source, so that a
  /// later `request_cancellation(async_id)` can reach it.
  pub fn new_async_root(&self) -> Arc<Node> {
    let (root, source) = self.async_registry.new_root();
    self.async_sources.lock().insert(root.async_id(), source);
    root
  }

  /// Signals cancellation for the tree rooted at `id`; a no-op if `id` is unknown or already
  /// finished and swept (§4.8 "cancellation is cooperative").
  pub fn request_cancellation(&self, id: AsyncId) {
    if let Some(source) = self.async_sources.lock().get(&id) {
      source.cancel();
    }
  }

  /// Drops bookkeeping for a finished root, mirroring the remote proxy's `finish_async`
  /// (§4.8 "the destructor of a root proxy async-context calls `finish_async`").
  pub fn finish_async(&self, id: AsyncId) {
    self.async_sources.lock().remove(&id);
    self.async_registry.sweep();
  }
}
