use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_tree::{AsyncId, AsyncRegistry, CancellationSource, NodeStatus};
use cradle_errors::CradleError;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use values::Value;

use crate::wire::PROTOCOL_VERSION;
use crate::{RemoteProxy, SerializedResult};

type ResolveFn = dyn Fn(&Value) -> BoxFuture<'static, Result<Value, CradleError>> + Send + Sync;

/// Runs the worker logic in-process, against a caller-supplied resolver callback, so the
/// code path exercised is identical to the out-of-process `TcpProxy` (§4.9 "The loopback
/// implementation runs the worker logic in-process against a second resources instance").
/// The callback indirection is deliberate: wiring this crate directly to `resolver`'s actual
/// dispatch would create a dependency cycle (`resolver` itself depends on `remote_proxy` to
/// reach *its* remote peer), so the caller (the top-level `cradle` crate) closes the loop by
/// constructing a second `Resources` and handing its resolve entry point in here.
pub struct LoopbackProxy {
  resolve_fn: Arc<ResolveFn>,
  registry: AsyncRegistry,
  sources: Mutex<HashMap<AsyncId, CancellationSource>>,
  loaded_libraries: Mutex<HashSet<String>>,
}

impl LoopbackProxy {
  pub fn new(resolve_fn: Arc<ResolveFn>) -> LoopbackProxy {
    LoopbackProxy {
      resolve_fn,
      registry: AsyncRegistry::new(),
      sources: Mutex::new(HashMap::new()),
      loaded_libraries: Mutex::new(HashSet::new()),
    }
  }

  fn node_or_not_found(&self, id: AsyncId) -> Result<Arc<async_tree::Node>, CradleError> {
    self
      .registry
      .get(id)
      .ok_or_else(|| CradleError::not_found(format!("async id {id}")))
  }
}

impl RemoteProxy for LoopbackProxy {
  fn ping(&self) -> BoxFuture<'_, Result<String, CradleError>> {
    Box::pin(async move { Ok(PROTOCOL_VERSION.to_string()) })
  }

  fn resolve_sync(&self, seri_req: &Value) -> BoxFuture<'_, Result<SerializedResult, CradleError>> {
    let seri_req = seri_req.clone();
    Box::pin(async move {
      let value = (self.resolve_fn)(&seri_req).await?;
      Ok(SerializedResult {
        response_id: 0,
        cache_lock_id: 0,
        value,
      })
    })
  }

  fn submit_async(&self, seri_req: &Value) -> BoxFuture<'_, Result<AsyncId, CradleError>> {
    let seri_req = seri_req.clone();
    Box::pin(async move {
      let (root, source) = self.registry.new_root();
      self.sources.lock().insert(root.async_id(), source);
      root
        .transition_to(NodeStatus::SelfRunning)
        .map_err(|e| CradleError::logic_error(e.to_string()))?;

      let resolve_fn = Arc::clone(&self.resolve_fn);
      let node = Arc::clone(&root);
      tokio::spawn(async move {
        match resolve_fn(&seri_req).await {
          Ok(value) => {
            node.set_result(value);
            let _ = node.transition_to(NodeStatus::Finished);
          }
          Err(e) => {
            node.set_error(e.to_string());
            let _ = node.transition_to(if e.is_cancellation() {
              NodeStatus::Cancelled
            } else {
              NodeStatus::Error
            });
          }
        }
      });
      Ok(root.async_id())
    })
  }

  fn submit_stored(&self, _storage: &str, _key: &str) -> BoxFuture<'_, Result<AsyncId, CradleError>> {
    Box::pin(async move {
      Err(CradleError::NotImplemented {
        what: "loopback proxy does not have a blob-store-backed worker".to_string(),
      })
    })
  }

  fn get_async_status(&self, id: AsyncId) -> BoxFuture<'_, Result<NodeStatus, CradleError>> {
    Box::pin(async move { Ok(self.node_or_not_found(id)?.status()) })
  }

  fn get_async_error_message(&self, id: AsyncId) -> BoxFuture<'_, Result<Option<String>, CradleError>> {
    Box::pin(async move { Ok(self.node_or_not_found(id)?.error_message()) })
  }

  fn get_sub_contexts(&self, id: AsyncId) -> BoxFuture<'_, Result<Vec<(AsyncId, bool)>, CradleError>> {
    Box::pin(async move {
      let node = self.node_or_not_found(id)?;
      // The loopback proxy treats a submitted request as one opaque unit of work rather
      // than building a full sub-request tree, so it never has children to report; a real
      // worker populates this once its node reaches `SubsRunning` (§4.9).
      Ok(node.children().iter().map(|c| (c.async_id(), true)).collect())
    })
  }

  fn get_async_response(&self, root_id: AsyncId) -> BoxFuture<'_, Result<SerializedResult, CradleError>> {
    Box::pin(async move {
      loop {
        let node = self.node_or_not_found(root_id)?;
        match node.status() {
          NodeStatus::Finished => {
            let value = node.result().unwrap_or(Value::Nil);
            return Ok(SerializedResult {
              response_id: 0,
              cache_lock_id: 0,
              value,
            });
          }
          NodeStatus::Cancelled => return Err(CradleError::AsyncCancelled),
          NodeStatus::Error => {
            return Err(CradleError::AsyncError {
              sub_message: node.error_message().unwrap_or_default(),
            })
          }
          _ => tokio::time::sleep(Duration::from_millis(1)).await,
        }
      }
    })
  }

  fn request_cancellation(&self, id: AsyncId) -> BoxFuture<'_, Result<(), CradleError>> {
    Box::pin(async move {
      if let Some(source) = self.sources.lock().get(&id) {
        source.cancel();
      }
      Ok(())
    })
  }

  fn finish_async(&self, root_id: AsyncId) -> BoxFuture<'_, Result<(), CradleError>> {
    Box::pin(async move {
      self.sources.lock().remove(&root_id);
      self.registry.sweep();
      Ok(())
    })
  }

  fn release_cache_record_lock(&self, _remote_id: u64) -> BoxFuture<'_, Result<(), CradleError>> {
    Box::pin(async move { Ok(()) })
  }

  fn load_shared_library(&self, _dir: &str, name: &str) -> BoxFuture<'_, Result<(), CradleError>> {
    let name = name.to_string();
    Box::pin(async move {
      self.loaded_libraries.lock().insert(name);
      Ok(())
    })
  }

  fn unload_shared_library(&self, name: &str) -> BoxFuture<'_, Result<(), CradleError>> {
    let name = name.to_string();
    Box::pin(async move {
      self.loaded_libraries.lock().remove(&name);
      Ok(())
    })
  }

  fn mock_http(&self, body: &str) -> BoxFuture<'_, Result<String, CradleError>> {
    let body = body.to_string();
    Box::pin(async move { Ok(body) })
  }
}
