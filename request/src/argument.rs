use std::sync::Arc;

use values::Value;

use crate::Request;

/// One argument slot of a request: either an inline literal, or a sub-request that must be
/// resolved first to produce the value. A "normalized-arg" (§4.3) is simply a `SubRequest`
/// built by [`crate::Request::new_normalized`] wrapping the literal behind a stable uuid —
/// there is no separate wire representation to keep in sync with this one.
#[derive(Clone)]
pub enum Argument {
  Literal(Value),
  SubRequest(Arc<Request>),
}

impl Argument {
  pub fn as_sub_request(&self) -> Option<&Arc<Request>> {
    match self {
      Argument::SubRequest(r) => Some(r),
      Argument::Literal(_) => None,
    }
  }

  pub fn as_literal(&self) -> Option<&Value> {
    match self {
      Argument::Literal(v) => Some(v),
      Argument::SubRequest(_) => None,
    }
  }
}

/// An ordered tuple of [`Argument`]s.
#[derive(Clone, Default)]
pub struct Arguments(pub Vec<Argument>);

impl Arguments {
  pub fn none() -> Arguments {
    Arguments(Vec::new())
  }

  pub fn literals(values: Vec<Value>) -> Arguments {
    Arguments(values.into_iter().map(Argument::Literal).collect())
  }

  pub fn sub_requests(requests: Vec<Arc<Request>>) -> Arguments {
    Arguments(requests.into_iter().map(Argument::SubRequest).collect())
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Argument> {
    self.0.iter()
  }
}
