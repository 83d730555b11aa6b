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

//! The request model: an immutable, content-addressed description of a unit of work,
//! grounded in the `graph::Node` trait's shape (a `run`/`format`/digest trio) but recast as
//! data rather than a trait a caller implements, since a request must also be
//! serializable and hashable independent of any particular executor.

mod argument;
mod fingerprint;
mod properties;

pub use argument::{Argument, Arguments};
pub use properties::{CachingLevel, ContextCapability, FunctionFlavour, Properties, RetryPolicy};

use std::fmt;
use std::sync::Arc;

use cradle_errors::CradleError;
use futures::future::BoxFuture;
use hashing::Fingerprint;
use values::Value;

/// The minimal capability surface a request's local function needs from its caller.
/// Richer capability mix-ins (local/remote/sync/async/caching/introspective) live in the
/// context tree crate and are reached through `downcast`, matching the teacher's
/// `NodeContext` pattern of a thin required trait plus optional richer traits.
pub trait ResolveContext: Send + Sync {
  fn remotely(&self) -> bool;
  fn is_async(&self) -> bool;
  fn is_cancelled(&self) -> bool;

  /// Lets a local function recover a richer capability (e.g. the async tree node it is
  /// running under) without `ResolveContext` itself depending on those crates.
  fn as_any(&self) -> &dyn std::any::Any;
}

/// A request body that runs locally. Returns a boxed future rather than using `async_trait`
/// so the trait stays object-safe without an extra macro dependency.
pub trait LocalFunction: Send + Sync {
  fn call<'a>(
    &'a self,
    ctx: &'a dyn ResolveContext,
    args: &'a [Value],
  ) -> BoxFuture<'a, Result<Value, CradleError>>;
}

/// A [`LocalFunction`] built from a plain closure, for request classes simple enough not
/// to warrant a dedicated type.
pub struct FnFunction<F>(pub F);

impl<F> LocalFunction for FnFunction<F>
where
  F: for<'a> Fn(&'a dyn ResolveContext, &'a [Value]) -> BoxFuture<'a, Result<Value, CradleError>>
    + Send
    + Sync,
{
  fn call<'a>(
    &'a self,
    ctx: &'a dyn ResolveContext,
    args: &'a [Value],
  ) -> BoxFuture<'a, Result<Value, CradleError>> {
    (self.0)(ctx, args)
  }
}

/// What a request does when resolved: run a local function, or defer entirely to a remote
/// peer. A *meta* request is represented as an ordinary `Local` body whose function returns
/// a serialized sub-request (§4.3); the resolver recognises this via `Properties::is_meta`
/// and re-enters resolution on the decoded request rather than returning the encoding as-is.
pub enum Body {
  Local(Arc<dyn LocalFunction>),
  /// No local implementation: only resolvable by dispatching to a `RemoteProxy`.
  Proxy,
}

impl fmt::Debug for Body {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Body::Local(_) => write!(f, "Body::Local(..)"),
      Body::Proxy => write!(f, "Body::Proxy"),
    }
  }
}

/// An immutable, content-addressed unit of work: a uuid identifying its class, a tuple of
/// arguments, and the properties governing how it is cached, dispatched, and retried.
///
/// Equality and ordering are entirely in terms of [`Request::fingerprint`], never identity,
/// so two independently constructed requests over equal arguments are interchangeable.
pub struct Request {
  uuid: String,
  arguments: Arguments,
  properties: Properties,
  title: Option<String>,
  containment: Option<Value>,
  body: Body,
  fingerprint: Fingerprint,
}

impl fmt::Debug for Request {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Request")
      .field("uuid", &self.uuid)
      .field("title", &self.title)
      .field("fingerprint", &self.fingerprint.to_hex())
      .finish()
  }
}

impl Request {
  /// Builds a request over literal or sub-request arguments, run by `body` when resolved.
  pub fn new(
    uuid: impl Into<String>,
    arguments: Arguments,
    properties: Properties,
    body: Body,
  ) -> Request {
    let uuid = uuid.into();
    let fingerprint = fingerprint::compute(&uuid, &arguments);
    Request {
      uuid,
      arguments,
      properties,
      title: None,
      containment: None,
      body,
      fingerprint,
    }
  }

  /// Builds a request over *normalized* arguments: every literal is first wrapped in a
  /// uuid'd sub-request (§4.3 "normalized-arg") so that argument values participate in
  /// hashing and serialization the same way actual sub-requests do.
  pub fn new_normalized(
    uuid: impl Into<String>,
    literal_arg_uuid: impl Into<String>,
    literals: Vec<Value>,
    properties: Properties,
    body: Body,
  ) -> Request {
    let literal_arg_uuid = literal_arg_uuid.into();
    let normalized = literals
      .into_iter()
      .map(|value| {
        Argument::SubRequest(Arc::new(Request::new(
          literal_arg_uuid.clone(),
          Arguments(vec![Argument::Literal(value)]),
          Properties::literal_passthrough(),
          Body::Local(Arc::new(FnFunction(move |_ctx: &dyn ResolveContext, args: &[Value]| {
            let value = args[0].clone();
            Box::pin(async move { Ok(value) }) as BoxFuture<'_, Result<Value, CradleError>>
          }))),
        )))
      })
      .collect();
    Request::new(uuid, Arguments(normalized), properties, body)
  }

  /// Builds a request with no local body, destined for remote resolution only.
  pub fn new_proxy(uuid: impl Into<String>, arguments: Arguments, properties: Properties) -> Request {
    Request::new(uuid, arguments, properties, Body::Proxy)
  }

  pub fn uuid(&self) -> &str {
    &self.uuid
  }

  pub fn arguments(&self) -> &Arguments {
    &self.arguments
  }

  pub fn properties(&self) -> &Properties {
    &self.properties
  }

  pub fn title(&self) -> Option<&str> {
    self.title.as_deref()
  }

  pub fn with_title(mut self, title: impl Into<String>) -> Request {
    self.title = Some(title.into());
    self
  }

  pub fn containment(&self) -> Option<&Value> {
    self.containment.as_ref()
  }

  pub fn set_containment(&mut self, containment_data: Value) {
    self.containment = Some(containment_data);
  }

  pub fn retry_policy(&self) -> Option<&RetryPolicy> {
    self.properties.retry_policy.as_ref()
  }

  pub fn is_proxy(&self) -> bool {
    matches!(self.body, Body::Proxy)
  }

  pub fn body(&self) -> &Body {
    &self.body
  }

  /// The deterministic 256-bit digest over `(uuid, argument fingerprints)` (§4.1).
  /// Requests are equal iff their fingerprints are equal.
  pub fn fingerprint(&self) -> Fingerprint {
    self.fingerprint
  }

  /// Runs this request's local function, or fails if it is proxy-only (callers that may be
  /// remote should check [`Request::is_proxy`] and dispatch via a `RemoteProxy` first).
  pub async fn resolve_locally(
    &self,
    ctx: &dyn ResolveContext,
    resolved_args: &[Value],
  ) -> Result<Value, CradleError> {
    match &self.body {
      Body::Local(f) => f.call(ctx, resolved_args).await,
      Body::Proxy => Err(CradleError::NotImplemented {
        what: format!("local resolution of proxy request {}", self.uuid),
      }),
    }
  }

  /// Walks this request's immediate argument tree, invoking `visitor` for each argument.
  /// Used by the context-tree builder and by serialization (§4.3 `visit(arg_visitor)`).
  pub fn visit(&self, mut visitor: impl FnMut(&Argument)) {
    for arg in &self.arguments.0 {
      visitor(arg);
    }
  }
}

impl PartialEq for Request {
  fn eq(&self, other: &Self) -> bool {
    self.fingerprint == other.fingerprint
  }
}
impl Eq for Request {}

impl PartialOrd for Request {
  fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Request {
  fn cmp(&self, other: &Self) -> std::cmp::Ordering {
    self.fingerprint.as_bytes().cmp(other.fingerprint.as_bytes())
  }
}

impl std::hash::Hash for Request {
  fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
    self.fingerprint.as_bytes().hash(state);
  }
}

#[cfg(test)]
mod tests;
