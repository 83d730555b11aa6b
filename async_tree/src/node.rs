use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use values::Value;

use crate::cancellation::{CancellationSource, CancellationToken};
use crate::status::NodeStatus;

pub type AsyncId = u64;

/// Generates process-global async ids starting at 1; 0 is reserved (the RPC wire format
/// uses it to mean "no remote-side id yet", per the external interfaces section).
static NEXT_ASYNC_ID: AtomicU64 = AtomicU64::new(1);

fn next_async_id() -> AsyncId {
  NEXT_ASYNC_ID.fetch_add(1, Ordering::Relaxed)
}

/// One node of a resolution's context tree (§3). Holds its own status, an optional result,
/// and a pointer to its parent; the root additionally owns the tree's cancellation source.
pub struct Node {
  async_id: AsyncId,
  parent: Option<Weak<Node>>,
  children: Mutex<Vec<Arc<Node>>>,
  status: Mutex<NodeStatus>,
  error_message: Mutex<Option<String>>,
  result: Mutex<Option<Value>>,
  /// Set once this node's work has been dispatched to a remote peer.
  remote_async_id: Mutex<Option<AsyncId>>,
  cancellation: CancellationToken,
}

impl Node {
  fn new(parent: Option<Weak<Node>>, cancellation: CancellationToken) -> Arc<Node> {
    Arc::new(Node {
      async_id: next_async_id(),
      parent,
      children: Mutex::new(Vec::new()),
      status: Mutex::new(NodeStatus::Created),
      error_message: Mutex::new(None),
      result: Mutex::new(None),
      remote_async_id: Mutex::new(None),
      cancellation,
    })
  }

  pub fn async_id(&self) -> AsyncId {
    self.async_id
  }

  pub fn parent(&self) -> Option<Arc<Node>> {
    self.parent.as_ref().and_then(Weak::upgrade)
  }

  pub fn status(&self) -> NodeStatus {
    *self.status.lock()
  }

  pub fn error_message(&self) -> Option<String> {
    self.error_message.lock().clone()
  }

  pub fn result(&self) -> Option<Value> {
    self.result.lock().clone()
  }

  pub fn remote_async_id(&self) -> Option<AsyncId> {
    *self.remote_async_id.lock()
  }

  pub fn set_remote_async_id(&self, id: AsyncId) {
    *self.remote_async_id.lock() = Some(id);
  }

  pub fn cancellation_token(&self) -> &CancellationToken {
    &self.cancellation
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancellation.is_cancelled()
  }

  pub fn children(&self) -> Vec<Arc<Node>> {
    self.children.lock().clone()
  }

  /// Spawns a child node sharing this tree's cancellation source.
  pub fn new_child(self: &Arc<Node>, registry: &AsyncRegistry) -> Arc<Node> {
    let child = Node::new(Some(Arc::downgrade(self)), self.cancellation.clone());
    self.children.lock().push(Arc::clone(&child));
    registry.insert(&child);
    child
  }

  /// Attempts `self.status -> next`, per the monotonicity invariant in [`NodeStatus`].
  /// Transitioning to `Finished` or `Cancelled` additionally forces every non-terminal
  /// descendant to the same status (§3: "once a node's status is FINISHED, all its
  /// descendants' statuses are FINISHED"; §8 property 8 extends the same rule to a
  /// cancelled tree, so a cancelled root never leaves stragglers behind in `Created`).
  pub fn transition_to(&self, next: NodeStatus) -> Result<(), cradle_errors::CradleError> {
    let mut status = self.status.lock();
    if !status.can_transition_to(next) {
      return Err(cradle_errors::CradleError::logic_error(format!(
        "illegal context-tree transition {:?} -> {:?}",
        *status, next
      )));
    }
    *status = next;
    drop(status);
    if matches!(next, NodeStatus::Finished | NodeStatus::Cancelled) {
      for child in self.children.lock().iter() {
        // A child already in a terminal state keeps its own status; only non-terminal
        // descendants are forced to match the parent.
        if !child.status().is_terminal() {
          let _ = child.transition_to(next);
        }
      }
    }
    Ok(())
  }

  pub fn set_error(&self, message: impl Into<String>) {
    *self.error_message.lock() = Some(message.into());
  }

  pub fn set_result(&self, value: Value) {
    *self.result.lock() = Some(value);
  }
}

/// The process-wide `async_id -> node` lookup table (§4.8), guarded the same way
/// `workunit_store`'s running-workunit table is: a plain mutex-guarded `HashMap`, since
/// contention is bounded by the number of concurrently in-flight resolutions.
#[derive(Default)]
pub struct AsyncRegistry {
  nodes: Mutex<HashMap<AsyncId, Weak<Node>>>,
}

impl AsyncRegistry {
  pub fn new() -> AsyncRegistry {
    AsyncRegistry::default()
  }

  fn insert(&self, node: &Arc<Node>) {
    self.nodes.lock().insert(node.async_id(), Arc::downgrade(node));
  }

  pub fn get(&self, id: AsyncId) -> Option<Arc<Node>> {
    self.nodes.lock().get(&id).and_then(Weak::upgrade)
  }

  /// Drops lookup entries whose node has no remaining strong references.
  pub fn sweep(&self) {
    self.nodes.lock().retain(|_, weak| weak.strong_count() > 0);
  }

  pub fn len(&self) -> usize {
    self.nodes.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Creates a new root node and its tree-wide cancellation source, registering the root.
  pub fn new_root(&self) -> (Arc<Node>, CancellationSource) {
    let (source, token) = CancellationSource::new();
    let root = Node::new(None, token);
    self.insert(&root);
    (root, source)
  }
}
