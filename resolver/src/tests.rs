use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_tree::NodeStatus;
use containment::{ContainedDispatcher, ContainmentData, LoopbackContainedDispatcher, PluginKey};
use cradle_errors::CradleError;
use futures::future::BoxFuture;
use memory_cache::MemoryCache;
use request::{Arguments, Body, FnFunction, Properties, Request, ResolveContext, RetryPolicy};
use secondary_cache::SecondaryCache;
use seri_registry::{RequestDeserializer, RequestResolver, SeriCatalog};
use values::Value;

use crate::{Resolver, Resources};

fn counting_body(counter: Arc<AtomicUsize>) -> Body {
  Body::Local(Arc::new(FnFunction(
    move |_ctx: &dyn ResolveContext, args: &[Value]| {
      counter.fetch_add(1, Ordering::SeqCst);
      let value = args[0].clone();
      Box::pin(async move { Ok(value) }) as BoxFuture<'_, Result<Value, CradleError>>
    },
  )))
}

fn identity_request(uuid: &str, arg: i64, caching_level: request::CachingLevel) -> Arc<Request> {
  Arc::new(Request::new(
    uuid.to_string(),
    Arguments::literals(vec![Value::Integer(arg)]),
    Properties::plain().with_caching_level(caching_level),
    counting_body(Arc::new(AtomicUsize::new(0))),
  ))
}

fn resolver_over(resources: Resources) -> Resolver {
  Resolver::new(Arc::new(resources))
}

#[tokio::test]
async fn resolves_a_plain_uncached_request_directly() {
  let resolver = resolver_over(Resources::new(MemoryCache::new(1024)));
  let req = identity_request("resolver.tests.plain", 7, request::CachingLevel::None);
  let value = resolver.resolve_sync(&req).await.unwrap();
  assert_eq!(value, Value::Integer(7));
}

#[tokio::test]
async fn memory_caching_runs_the_body_only_once_across_repeated_resolutions() {
  let calls = Arc::new(AtomicUsize::new(0));
  let req = Arc::new(Request::new(
    "resolver.tests.memoized",
    Arguments::literals(vec![Value::Integer(3)]),
    Properties::plain().with_caching_level(request::CachingLevel::Memory),
    counting_body(Arc::clone(&calls)),
  ));
  let resolver = resolver_over(Resources::new(MemoryCache::new(1024)));

  let a = resolver.resolve_sync(&req).await.unwrap();
  let b = resolver.resolve_sync(&req).await.unwrap();

  assert_eq!(a, Value::Integer(3));
  assert_eq!(b, Value::Integer(3));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn full_caching_survives_a_memory_cache_restart_via_the_secondary_cache() {
  let dir = tempfile::tempdir().unwrap();
  let calls = Arc::new(AtomicUsize::new(0));
  let req = Arc::new(Request::new(
    "resolver.tests.full_cached",
    Arguments::literals(vec![Value::Integer(99)]),
    Properties::plain().with_caching_level(request::CachingLevel::Full),
    counting_body(Arc::clone(&calls)),
  ));

  let secondary = SecondaryCache::open(dir.path(), 1024 * 1024).unwrap();
  let resolver_a = resolver_over(Resources::new(MemoryCache::new(1024 * 1024)).with_secondary_cache(secondary));
  let first = resolver_a.resolve_sync(&req).await.unwrap();
  assert_eq!(first, Value::Integer(99));
  assert_eq!(calls.load(Ordering::SeqCst), 1);

  // A fresh memory cache (as if the process restarted) still hits the populated secondary
  // cache rather than re-running the body.
  let secondary_b = SecondaryCache::open(dir.path(), 1024 * 1024).unwrap();
  let resolver_b = resolver_over(Resources::new(MemoryCache::new(1024 * 1024)).with_secondary_cache(secondary_b));
  let second = resolver_b.resolve_sync(&req).await.unwrap();
  assert_eq!(second, Value::Integer(99));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

fn flaky_body(failures_left: Arc<AtomicUsize>) -> Body {
  Body::Local(Arc::new(FnFunction(move |_ctx: &dyn ResolveContext, args: &[Value]| {
    let still_failing = failures_left.fetch_sub(1, Ordering::SeqCst) > 0;
    let value = args[0].clone();
    Box::pin(async move {
      if still_failing {
        Err(CradleError::http_request_failure("transient"))
      } else {
        Ok(value)
      }
    }) as BoxFuture<'_, Result<Value, CradleError>>
  })))
}

#[tokio::test]
async fn retries_a_retryable_failure_until_it_succeeds() {
  let req = Arc::new(Request::new(
    "resolver.tests.retried",
    Arguments::literals(vec![Value::Integer(1)]),
    Properties::plain().with_retry_policy(RetryPolicy {
      max_attempts: 5,
      initial_backoff: Duration::from_millis(0),
      backoff_multiplier: 1.0,
    }),
    flaky_body(Arc::new(AtomicUsize::new(2))),
  ));
  let resolver = resolver_over(Resources::new(MemoryCache::new(1024)));
  let value = resolver.resolve_sync(&req).await.unwrap();
  assert_eq!(value, Value::Integer(1));
}

#[tokio::test]
async fn exhausts_retries_and_surfaces_the_final_error() {
  let req = Arc::new(Request::new(
    "resolver.tests.always_fails",
    Arguments::literals(vec![Value::Integer(1)]),
    Properties::plain().with_retry_policy(RetryPolicy {
      max_attempts: 3,
      initial_backoff: Duration::from_millis(0),
      backoff_multiplier: 1.0,
    }),
    flaky_body(Arc::new(AtomicUsize::new(100))),
  ));
  let resolver = resolver_over(Resources::new(MemoryCache::new(1024)));
  let err = resolver.resolve_sync(&req).await.unwrap_err();
  assert!(matches!(err, CradleError::HttpRequestFailure { .. }));
}

fn doubling_remote_proxy() -> Arc<dyn remote_proxy::RemoteProxy> {
  fn double(value: &Value) -> BoxFuture<'static, Result<Value, CradleError>> {
    let value = value.clone();
    Box::pin(async move {
      let Value::Mapping(fields) = &value else {
        return Err(CradleError::logic_error("expected a mapping"));
      };
      let args = fields
        .get(&Value::String("args".to_string()))
        .and_then(|v| v.as_sequence().ok())
        .ok_or_else(|| CradleError::logic_error("missing args"))?;
      let n = args[0].as_integer()?;
      Ok(Value::Integer(n * 2))
    })
  }
  Arc::new(remote_proxy::LoopbackProxy::new(Arc::new(double)))
}

#[tokio::test]
async fn proxy_requests_dispatch_through_the_remote_proxy() {
  let req = Arc::new(Request::new_proxy(
    "resolver.tests.remote_double",
    Arguments::literals(vec![Value::Integer(21)]),
    Properties::plain(),
  ));
  let resolver = resolver_over(Resources::new(MemoryCache::new(1024)).with_remote_proxy(doubling_remote_proxy()));
  let value = resolver.resolve_sync(&req).await.unwrap();
  assert_eq!(value, Value::Integer(42));
}

#[tokio::test]
async fn remote_dispatch_without_a_configured_proxy_is_an_invalid_argument() {
  let req = Arc::new(Request::new_proxy(
    "resolver.tests.remote_only",
    Arguments::none(),
    Properties::plain(),
  ));
  let resolver = resolver_over(Resources::new(MemoryCache::new(1024)));
  let err = resolver.resolve_sync(&req).await.unwrap_err();
  assert!(matches!(err, CradleError::InvalidArgument { .. }));
}

#[tokio::test]
async fn value_based_caching_shares_a_cache_entry_across_structurally_different_sub_requests() {
  let calls = Arc::new(AtomicUsize::new(0));
  let outer_body = counting_body(Arc::clone(&calls));

  let sub_a = Arc::new(Request::new(
    "resolver.tests.literal_a",
    Arguments::literals(vec![Value::Integer(5)]),
    Properties::plain(),
    counting_body(Arc::new(AtomicUsize::new(0))),
  ));
  let sub_b = Arc::new(Request::new(
    "resolver.tests.literal_b",
    Arguments::literals(vec![Value::Integer(5)]),
    Properties::plain(),
    counting_body(Arc::new(AtomicUsize::new(0))),
  ));

  let outer_a = Arc::new(Request::new(
    "resolver.tests.value_based",
    Arguments::sub_requests(vec![sub_a]),
    Properties::plain()
      .with_caching_level(request::CachingLevel::Memory)
      .value_based_caching(),
    outer_body,
  ));
  let outer_b = Arc::new(Request::new(
    "resolver.tests.value_based",
    Arguments::sub_requests(vec![sub_b]),
    Properties::plain()
      .with_caching_level(request::CachingLevel::Memory)
      .value_based_caching(),
    counting_body(Arc::clone(&calls)),
  ));

  let resolver = resolver_over(Resources::new(MemoryCache::new(1024)));
  let a = resolver.resolve_sync(&outer_a).await.unwrap();
  let b = resolver.resolve_sync(&outer_b).await.unwrap();

  assert_eq!(a, Value::Integer(5));
  assert_eq!(b, Value::Integer(5));
  // Both sub-requests resolve to the same value, so value-based caching treats the two
  // structurally distinct outer requests as the same cache entry.
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

struct RecordingDispatcher {
  calls: Arc<AtomicUsize>,
  inner: LoopbackContainedDispatcher,
}

impl ContainedDispatcher for RecordingDispatcher {
  fn resolve_contained<'a>(
    &'a self,
    ctx: &'a dyn ResolveContext,
    request: &'a Request,
    containment: &'a ContainmentData,
    resolved_args: &'a [Value],
  ) -> BoxFuture<'a, Result<Value, CradleError>> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    self.inner.resolve_contained(ctx, request, containment, resolved_args)
  }
}

#[tokio::test]
async fn a_request_carrying_containment_data_dispatches_through_the_contained_dispatcher() {
  let mut req = Request::new(
    "resolver.tests.contained",
    Arguments::literals(vec![Value::Integer(11)]),
    Properties::plain(),
    counting_body(Arc::new(AtomicUsize::new(0))),
  );
  let mut fields = BTreeMap::new();
  fields.insert(Value::String("uuid".to_string()), Value::String("resolver.tests.contained".to_string()));
  fields.insert(
    Value::String("dll_directory".to_string()),
    Value::String("/plugins".to_string()),
  );
  fields.insert(Value::String("dll_name".to_string()), Value::String("sample.so".to_string()));
  req.set_containment(Value::Mapping(fields));

  let calls = Arc::new(AtomicUsize::new(0));
  let dispatcher = Arc::new(RecordingDispatcher {
    calls: Arc::clone(&calls),
    inner: LoopbackContainedDispatcher,
  });
  let resolver =
    resolver_over(Resources::new(MemoryCache::new(1024)).with_contained_dispatcher(dispatcher));
  let value = resolver.resolve_sync(&Arc::new(req)).await.unwrap();

  assert_eq!(value, Value::Integer(11));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
  let key = PluginKey {
    dll_directory: PathBuf::from("/plugins"),
    dll_name: "sample.so".to_string(),
  };
  assert!(resolver.resources().plugin_registry.is_loaded(&key));
}

struct FixedDeserializer(Arc<Request>);
impl RequestDeserializer for FixedDeserializer {
  fn deserialize(&self, _encoded: &Value) -> Result<Arc<Request>, CradleError> {
    Ok(Arc::clone(&self.0))
  }
}
struct UnusedResolver;
impl RequestResolver for UnusedResolver {
  fn resolve<'a>(
    &'a self,
    _ctx: &'a dyn ResolveContext,
    _encoded: &'a Value,
  ) -> BoxFuture<'a, Result<Value, CradleError>> {
    Box::pin(async { Err(CradleError::logic_error("not exercised by this test")) })
  }
}

#[tokio::test]
async fn a_meta_request_decodes_and_resolves_its_value_as_a_sub_request() {
  let inner = Arc::new(Request::new(
    "resolver.tests.meta_target",
    Arguments::literals(vec![Value::Integer(77)]),
    Properties::plain(),
    counting_body(Arc::new(AtomicUsize::new(0))),
  ));

  let catalog = SeriCatalog::new();
  catalog.register(
    "resolver.tests.meta_target",
    Arc::new(FixedDeserializer(Arc::clone(&inner))),
    Arc::new(UnusedResolver),
  );

  let mut encoded_fields = BTreeMap::new();
  encoded_fields.insert(Value::String("uuid".to_string()), Value::String("resolver.tests.meta_target".to_string()));
  let encoded = Value::Mapping(encoded_fields);

  let meta_req = Arc::new(Request::new(
    "resolver.tests.meta_wrapper",
    Arguments::none(),
    Properties::plain().meta(),
    Body::Local(Arc::new(FnFunction(move |_ctx: &dyn ResolveContext, _args: &[Value]| {
      let encoded = encoded.clone();
      Box::pin(async move { Ok(encoded) }) as BoxFuture<'_, Result<Value, CradleError>>
    }))),
  ));

  let resolver = resolver_over(Resources::new(MemoryCache::new(1024)));
  let value = resolver.resolve_sync(&meta_req).await.unwrap();
  assert_eq!(value, Value::Integer(77));
}

#[tokio::test]
async fn async_resolution_reaches_a_finished_terminal_status() {
  let req = identity_request("resolver.tests.async_identity", 4, request::CachingLevel::None);
  let resolver = resolver_over(Resources::new(MemoryCache::new(1024)));
  let id = resolver.resolve_async(req).await.unwrap();

  let node = loop {
    let node = resolver.resources().async_registry.get(id).expect("root is registered");
    if node.status().is_terminal() {
      break node;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
  };
  assert_eq!(node.status(), NodeStatus::Finished);
  assert_eq!(node.result(), Some(Value::Integer(4)));
}
