use std::collections::BTreeMap;
use std::sync::Arc;

use async_tree::{AsyncId, NodeStatus};
use containment::ContainmentData;
use cradle_errors::CradleError;
use futures::future::BoxFuture;
use hashing::{Digest, Fingerprint};
use request::{Argument, CachingLevel, ContextCapability, Request};
use secondary_cache::PayloadLocation;
use values::Value;

use crate::{Context, Resources};

/// The compile-time-specialised dispatcher of §4.7: for a given `(Context, Request)` it
/// picks remote-vs-local, sync-vs-async, cached-vs-direct, and wraps the result in a retry
/// loop, in that order. One `Resolver` is cheap to clone (an `Arc<Resources>` underneath)
/// so recursive sub-request resolution can hand an owned copy to a spawned task.
#[derive(Clone)]
pub struct Resolver {
  resources: Arc<Resources>,
}

impl Resolver {
  pub fn new(resources: Arc<Resources>) -> Resolver {
    Resolver { resources }
  }

  pub fn resources(&self) -> &Arc<Resources> {
    &self.resources
  }

  pub fn root_context(&self) -> Context {
    Context::new(Arc::clone(&self.resources))
  }

  /// Resolves `request` synchronously against a fresh root context.
  pub fn resolve_sync<'a>(&'a self, request: &'a Arc<Request>) -> BoxFuture<'a, Result<Value, CradleError>> {
    Box::pin(async move {
      let ctx = self.root_context();
      self.resolve(&ctx, request).await
    })
  }

  /// Resolves `request` as a new root of the async context tree (§4.8): registers a node,
  /// runs resolution on a spawned task, and returns the root's id immediately so callers can
  /// poll status or request cancellation while it runs.
  pub fn resolve_async(&self, request: Arc<Request>) -> BoxFuture<'static, Result<AsyncId, CradleError>> {
    let resolver = self.clone();
    Box::pin(async move {
      let root = resolver.resources.new_async_root();
      root.transition_to(NodeStatus::SelfRunning)?;
      let id = root.async_id();
      let ctx = resolver.root_context().for_node(Arc::clone(&root));

      let node = Arc::clone(&root);
      let resolver_task = resolver.clone();
      tokio::spawn(async move {
        match resolver_task.resolve(&ctx, &request).await {
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
      Ok(id)
    })
  }

  /// Steps 1-4 of §4.7's dispatch, in order: remote-vs-local first (arguments haven't been
  /// resolved yet, since a remote peer resolves them itself), then value flattening for the
  /// cache key, then the retry-wrapped cached-vs-direct call.
  pub fn resolve<'a>(&'a self, ctx: &'a Context, request: &'a Arc<Request>) -> BoxFuture<'a, Result<Value, CradleError>> {
    Box::pin(async move {
      let forced_remote = request
        .properties()
        .required_capabilities
        .contains(&ContextCapability::Remote);
      if request.is_proxy() || ctx.remotely() || forced_remote {
        return self.resolve_remote(ctx, request).await;
      }

      let resolved_args = self.resolve_arguments(ctx, request).await?;
      // Value-based caching flattens arguments into the cache key once, here, before the
      // retry loop even starts: a retried attempt reuses the same key rather than
      // re-deriving it from a possibly different set of resolved values (§9 Open Question).
      let cache_key = if request.properties().value_based_caching {
        value_based_key(request.uuid(), &resolved_args)
      } else {
        request.fingerprint()
      };
      self.resolve_with_retry(ctx, request, resolved_args, cache_key).await
    })
  }

  async fn resolve_remote(&self, ctx: &Context, request: &Arc<Request>) -> Result<Value, CradleError> {
    let proxy = self.resources.remote_proxy.clone().ok_or_else(|| {
      CradleError::invalid_argument(format!(
        "request {} requires a remote proxy but none is configured",
        request.uuid()
      ))
    })?;
    let resolved_args = self.resolve_arguments(ctx, request).await?;
    let encoded = encode_for_remote(request.uuid(), &resolved_args);
    let result = proxy.resolve_sync(&encoded).await?;
    Ok(result.value)
  }

  /// Resolves every argument, spawning sub-requests as independent tasks so they run in
  /// parallel (§4.7 "each resolve(ctx, sub_req) is an independent task"); a literal argument
  /// resolves instantly and, under an async context, produces a pre-finished child node
  /// (§4.8 "each literal argument produces a child whose status is pre-set to FINISHED").
  fn resolve_arguments<'a>(
    &'a self,
    ctx: &'a Context,
    request: &'a Request,
  ) -> BoxFuture<'a, Result<Vec<Value>, CradleError>> {
    Box::pin(async move {
      enum Pending {
        Ready(Value),
        Spawned(tokio::task::JoinHandle<Result<Value, CradleError>>),
      }

      let mut pending = Vec::with_capacity(request.arguments().len());
      for arg in request.arguments().iter() {
        match arg {
          Argument::Literal(value) => {
            if let Some(node) = ctx.node() {
              let child = node.new_child(&self.resources.async_registry);
              let _ = child.transition_to(NodeStatus::Finished);
            }
            pending.push(Pending::Ready(value.clone()));
          }
          Argument::SubRequest(sub) => {
            let child_ctx = match ctx.node() {
              Some(node) => ctx.for_node(node.new_child(&self.resources.async_registry)),
              None => ctx.clone(),
            };
            let resolver = self.clone();
            let sub = Arc::clone(sub);
            pending.push(Pending::Spawned(tokio::spawn(async move {
              resolver.resolve(&child_ctx, &sub).await
            })));
          }
        }
      }

      let mut resolved = Vec::with_capacity(pending.len());
      for item in pending {
        match item {
          Pending::Ready(value) => resolved.push(value),
          Pending::Spawned(handle) => {
            let value = handle
              .await
              .map_err(|e| CradleError::logic_error(format!("sub-request task panicked: {e}")))??;
            resolved.push(value);
          }
        }
      }
      Ok(resolved)
    })
  }

  async fn resolve_with_retry(
    &self,
    ctx: &Context,
    request: &Arc<Request>,
    resolved_args: Vec<Value>,
    cache_key: Fingerprint,
  ) -> Result<Value, CradleError> {
    let Some(policy) = request.retry_policy().copied() else {
      return self.resolve_cached(ctx, request, resolved_args, cache_key).await;
    };

    let mut attempt = 0;
    loop {
      if ctx.is_cancelled() {
        return Err(CradleError::AsyncCancelled);
      }
      match self
        .resolve_cached(ctx, request, resolved_args.clone(), cache_key)
        .await
      {
        Ok(value) => return Ok(value),
        Err(e) if e.is_retryable() && attempt + 1 < policy.max_attempts => {
          let delay = policy.backoff_for_attempt(attempt);
          if !delay.is_zero() {
            tokio::time::sleep(delay).await;
          }
          attempt += 1;
        }
        Err(e) => return Err(e),
      }
    }
  }

  fn resolve_cached<'a>(
    &'a self,
    ctx: &'a Context,
    request: &'a Arc<Request>,
    resolved_args: Vec<Value>,
    cache_key: Fingerprint,
  ) -> BoxFuture<'a, Result<Value, CradleError>> {
    Box::pin(async move {
      match request.properties().caching_level {
        CachingLevel::None => self.resolve_direct(ctx, request, &resolved_args).await,
        CachingLevel::Memory => {
          let (value, _ptr) = self
            .resources
            .memory_cache
            .resolve(cache_key, self.direct_producer(ctx, request, resolved_args))
            .await?;
          Ok(value)
        }
        CachingLevel::Full => {
          let (value, _ptr) = self
            .resources
            .memory_cache
            .resolve(
              cache_key,
              self.secondary_producer(ctx, request, resolved_args, cache_key),
            )
            .await?;
          Ok(value)
        }
      }
    })
  }

  /// Builds the `compute` closure `MemoryCache::resolve` runs on a cache miss: everything it
  /// captures is owned (an `Arc`-cloned `Resolver`/`Request`, a cloned `Context`), satisfying
  /// the `'static` bound without the memory cache needing to know anything about contexts.
  fn direct_producer(
    &self,
    ctx: &Context,
    request: &Arc<Request>,
    resolved_args: Vec<Value>,
  ) -> impl FnOnce() -> BoxFuture<'static, Result<Value, CradleError>> {
    let resolver = self.clone();
    let ctx = ctx.clone();
    let request = Arc::clone(request);
    move || Box::pin(async move { resolver.resolve_direct(&ctx, &request, &resolved_args).await })
  }

  fn secondary_producer(
    &self,
    ctx: &Context,
    request: &Arc<Request>,
    resolved_args: Vec<Value>,
    cache_key: Fingerprint,
  ) -> impl FnOnce() -> BoxFuture<'static, Result<Value, CradleError>> {
    let resolver = self.clone();
    let ctx = ctx.clone();
    let request = Arc::clone(request);
    move || Box::pin(async move { resolver.resolve_via_secondary(&ctx, &request, &resolved_args, cache_key).await })
  }

  /// The `full` caching level's producer: a secondary-cache lookup wrapping the direct call,
  /// itself wrapped by the memory cache at the call site (§4.7 step 3).
  fn resolve_via_secondary<'a>(
    &'a self,
    ctx: &'a Context,
    request: &'a Request,
    resolved_args: &'a [Value],
    cache_key: Fingerprint,
  ) -> BoxFuture<'a, Result<Value, CradleError>> {
    Box::pin(async move {
      let Some(secondary) = self.resources.secondary_cache.as_ref() else {
        return self.resolve_direct(ctx, request, resolved_args).await;
      };

      if let Some((_digest, location)) = secondary.get(cache_key)? {
        let bytes = match location {
          PayloadLocation::Inline(bytes) => bytes,
          PayloadLocation::File(path) => tokio::fs::read(&path).await.map_err(|e| {
            CradleError::logic_error(format!("reading secondary cache payload {path:?}: {e}"))
          })?,
        };
        return values::from_msgpack(&bytes);
      }

      let value = self.resolve_direct(ctx, request, resolved_args).await?;
      if let Ok(bytes) = value.canonical_bytes() {
        let digest = Digest::of_bytes(&bytes);
        if let Err(e) = secondary.put(cache_key, digest, &bytes) {
          log::warn!("failed to write {} to the secondary cache: {e}", request.uuid());
        }
      }
      Ok(value)
    })
  }

  /// Runs the request's own body once: through containment if it carries `containment_data`,
  /// otherwise the plain local function; then, for a meta request, decodes the resulting
  /// value as a serialized sub-request and resolves that in turn (§4.3 "meta request").
  fn resolve_direct<'a>(
    &'a self,
    ctx: &'a Context,
    request: &'a Request,
    resolved_args: &'a [Value],
  ) -> BoxFuture<'a, Result<Value, CradleError>> {
    Box::pin(async move {
      let value = match request.containment() {
        Some(containment_value) => {
          let containment_data = ContainmentData::from_value(containment_value)?;
          let key = containment_data.plugin_key();
          self.resources.plugin_registry.load(key.clone());
          let value = self
            .resources
            .contained_dispatcher
            .resolve_contained(ctx, request, &containment_data, resolved_args)
            .await?;
          if let Ok(bytes) = value.canonical_bytes() {
            self.resources.plugin_registry.note_produced(&key, Digest::of_bytes(&bytes));
          }
          value
        }
        None => request.resolve_locally(ctx, resolved_args).await?,
      };

      if request.properties().is_meta {
        let decoded = seri_registry::deserialize(&value)?;
        return self.resolve(ctx, &decoded).await;
      }
      Ok(value)
    })
  }
}

/// Recomputes a fingerprint over resolved argument *values* rather than argument structure,
/// for the "value-based caching" request variant (§4.5): two structurally different
/// sub-request trees that happen to resolve to the same values share one cache entry.
fn value_based_key(uuid: &str, resolved_args: &[Value]) -> Fingerprint {
  let parts: Vec<Vec<u8>> = std::iter::once(uuid.as_bytes().to_vec())
    .chain(
      resolved_args
        .iter()
        .map(|value| value.canonical_bytes().unwrap_or_else(|_| format!("{value:?}").into_bytes())),
    )
    .collect();
  Fingerprint::combine(parts.iter().map(Vec::as_slice))
}

/// The wire shape a remote peer expects: a uuid discriminator plus fully-resolved positional
/// arguments, matching `seri_registry::extract_uuid`'s `{"uuid": ..., ...}` mapping shape.
fn encode_for_remote(uuid: &str, resolved_args: &[Value]) -> Value {
  let mut fields = BTreeMap::new();
  fields.insert(Value::String("uuid".to_string()), Value::String(uuid.to_string()));
  fields.insert(Value::String("args".to_string()), Value::Sequence(resolved_args.to_vec()));
  Value::Mapping(fields)
}
