use std::sync::Arc;

use futures::future::BoxFuture;
use values::Value;

use cradle_errors::CradleError;

use crate::{Arguments, Body, FnFunction, Properties, Request, ResolveContext};

struct NullContext;
impl ResolveContext for NullContext {
  fn remotely(&self) -> bool {
    false
  }
  fn is_async(&self) -> bool {
    false
  }
  fn is_cancelled(&self) -> bool {
    false
  }
  fn as_any(&self) -> &dyn std::any::Any {
    self
  }
}

fn identity_body() -> Body {
  Body::Local(Arc::new(FnFunction(
    |_ctx: &dyn ResolveContext, args: &[Value]| -> BoxFuture<'_, Result<Value, CradleError>> {
      let value = args[0].clone();
      Box::pin(async move { Ok(value) })
    },
  )))
}

#[tokio::test]
async fn resolves_a_plain_local_request() {
  let req = Request::new(
    "test.identity/v1",
    Arguments::literals(vec![Value::Integer(42)]),
    Properties::plain(),
    identity_body(),
  );
  let result = req.resolve_locally(&NullContext, &[Value::Integer(42)]).await.unwrap();
  assert_eq!(result, Value::Integer(42));
}

#[test]
fn equal_uuid_and_args_fingerprint_identically() {
  let a = Request::new(
    "test.identity/v1",
    Arguments::literals(vec![Value::Integer(1)]),
    Properties::plain(),
    identity_body(),
  );
  let b = Request::new(
    "test.identity/v1",
    Arguments::literals(vec![Value::Integer(1)]),
    Properties::plain(),
    identity_body(),
  );
  assert_eq!(a.fingerprint(), b.fingerprint());
  assert_eq!(a, b);
}

#[test]
fn different_arguments_fingerprint_differently() {
  let a = Request::new(
    "test.identity/v1",
    Arguments::literals(vec![Value::Integer(1)]),
    Properties::plain(),
    identity_body(),
  );
  let b = Request::new(
    "test.identity/v1",
    Arguments::literals(vec![Value::Integer(2)]),
    Properties::plain(),
    identity_body(),
  );
  assert_ne!(a.fingerprint(), b.fingerprint());
}

#[test]
fn different_uuid_fingerprints_differently_even_with_same_args() {
  let a = Request::new(
    "test.identity/v1",
    Arguments::literals(vec![Value::Integer(1)]),
    Properties::plain(),
    identity_body(),
  );
  let b = Request::new(
    "test.identity/v2",
    Arguments::literals(vec![Value::Integer(1)]),
    Properties::plain(),
    identity_body(),
  );
  assert_ne!(a.fingerprint(), b.fingerprint());
}

#[test]
fn normalized_args_are_sub_requests_sharing_the_wrapper_uuid() {
  let req = Request::new_normalized(
    "test.sum/v1",
    "test.literal/v1",
    vec![Value::Integer(1), Value::Integer(2)],
    Properties::plain(),
    identity_body(),
  );
  for arg in req.arguments().iter() {
    let sub = arg.as_sub_request().expect("normalized args are sub-requests");
    assert_eq!(sub.uuid(), "test.literal/v1");
  }
}

#[test]
fn sub_request_fingerprint_changes_propagate_to_parent() {
  let inner_a = Arc::new(Request::new(
    "test.identity/v1",
    Arguments::literals(vec![Value::Integer(1)]),
    Properties::plain(),
    identity_body(),
  ));
  let inner_b = Arc::new(Request::new(
    "test.identity/v1",
    Arguments::literals(vec![Value::Integer(2)]),
    Properties::plain(),
    identity_body(),
  ));
  let outer_a = Request::new(
    "test.wrap/v1",
    Arguments::sub_requests(vec![inner_a]),
    Properties::plain(),
    identity_body(),
  );
  let outer_b = Request::new(
    "test.wrap/v1",
    Arguments::sub_requests(vec![inner_b]),
    Properties::plain(),
    identity_body(),
  );
  assert_ne!(outer_a.fingerprint(), outer_b.fingerprint());
}

#[test]
fn proxy_request_has_no_local_body() {
  let req = Request::new_proxy("test.remote_only/v1", Arguments::none(), Properties::plain());
  assert!(req.is_proxy());
}
