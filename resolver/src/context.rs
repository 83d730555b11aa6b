use std::any::Any;
use std::sync::Arc;

use async_tree::{CancellationToken, Node};
use context::{AsyncCapability, CachingCapability, IntrospectiveCapability, LocalCapability, RemoteCapability,
  SyncCapability, TaskletId, TaskletRegistry};
use request::ResolveContext;

use crate::Resources;

/// The concrete context every resolution runs under. `remote`/`node`/`cancellation` track
/// which of the four dispatch axes (§4.7) are in play for this particular resolution; local
/// functions that want a richer capability than [`ResolveContext`] reach it by downcasting
/// through [`context::downcast_context`] to this exact type.
#[derive(Clone)]
pub struct Context {
  resources: Arc<Resources>,
  remote: bool,
  peer_name: String,
  node: Option<Arc<Node>>,
  cancellation: Option<CancellationToken>,
  current_tasklet: Option<TaskletId>,
}

impl Context {
  pub fn new(resources: Arc<Resources>) -> Context {
    Context {
      resources,
      remote: false,
      peer_name: String::new(),
      node: None,
      cancellation: None,
      current_tasklet: None,
    }
  }

  pub fn resources(&self) -> &Arc<Resources> {
    &self.resources
  }

  pub fn node(&self) -> Option<&Arc<Node>> {
    self.node.as_ref()
  }

  pub fn with_remote(mut self, peer_name: impl Into<String>) -> Context {
    self.remote = true;
    self.peer_name = peer_name.into();
    self
  }

  /// Derives a child context bound to `node`, inheriting `self`'s remote/tasklet settings but
  /// tracking `node`'s own cancellation token rather than the parent's.
  pub fn for_node(&self, node: Arc<Node>) -> Context {
    let cancellation = node.cancellation_token().clone();
    Context {
      resources: Arc::clone(&self.resources),
      remote: self.remote,
      peer_name: self.peer_name.clone(),
      node: Some(node),
      cancellation: Some(cancellation),
      current_tasklet: self.current_tasklet,
    }
  }

  pub fn with_current_tasklet(mut self, id: TaskletId) -> Context {
    self.current_tasklet = Some(id);
    self
  }
}

impl ResolveContext for Context {
  fn remotely(&self) -> bool {
    self.remote
  }

  fn is_async(&self) -> bool {
    self.node.is_some()
  }

  fn is_cancelled(&self) -> bool {
    self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
  }

  fn as_any(&self) -> &dyn Any {
    self
  }
}

impl LocalCapability for Context {}
impl SyncCapability for Context {}

impl RemoteCapability for Context {
  fn peer_name(&self) -> &str {
    &self.peer_name
  }
}

impl AsyncCapability for Context {
  fn async_id(&self) -> u64 {
    self.node.as_ref().map(|n| n.async_id()).unwrap_or(0)
  }
}

impl CachingCapability for Context {
  fn caching_enabled(&self) -> bool {
    true
  }
}

impl IntrospectiveCapability for Context {
  fn tasklet_registry(&self) -> &TaskletRegistry {
    &self.resources.tasklet_registry
  }

  fn current_tasklet(&self) -> Option<TaskletId> {
    self.current_tasklet
  }
}
