use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::{Arguments, Body, Config, FnFunction, Properties, Request, ResolveContext, Resolver, Value};

#[test]
fn default_config_has_no_secondary_cache() {
  let config = Config::from_map(&HashMap::new()).unwrap();
  let resources = config.build_resources().unwrap();
  assert!(resources.secondary_cache.is_none());
}

#[tokio::test]
async fn the_public_api_resolves_a_plain_request() {
  let calls = Arc::new(AtomicUsize::new(0));
  let counter = Arc::clone(&calls);
  let req = Arc::new(Request::new(
    "cradle.tests.identity",
    Arguments::literals(vec![Value::Integer(1)]),
    Properties::plain(),
    Body::Local(Arc::new(FnFunction(move |_ctx: &dyn ResolveContext, args: &[Value]| {
      counter.fetch_add(1, Ordering::SeqCst);
      let value = args[0].clone();
      Box::pin(async move { Ok(value) }) as BoxFuture<'_, Result<Value, cradle_errors::CradleError>>
    }))),
  ));

  let config = Config::from_map(&HashMap::new()).unwrap();
  let resolver = Resolver::new(Arc::new(config.build_resources().unwrap()));
  let value = resolver.resolve_sync(&req).await.unwrap();

  assert_eq!(value, Value::Integer(1));
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}
