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

//! The seri-registry (§4.10): a process-global map from request-class uuid to a
//! `(deserializer, resolver)` pair, so a worker can reconstruct and resolve any request it
//! receives over the wire. Registrations are owned by a [`SeriCatalog`], a scoped,
//! `Arc`-counted handle whose `Drop` removes exactly its own entries — the spec's
//! "global mutable state" design note is addressed by keeping catalogs explicit resources
//! rather than letting registration live forever, matching `workunit_store`'s reference-
//! counted scoped span bookkeeping.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use cradle_errors::CradleError;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use request::{Request, ResolveContext};
use values::Value;

/// Turns a serialized request back into a live [`Request`]. Implemented per request class;
/// registered alongside the matching [`RequestResolver`].
pub trait RequestDeserializer: Send + Sync {
  fn deserialize(&self, encoded: &Value) -> Result<Arc<Request>, CradleError>;
}

/// Resolves a serialized request directly, without requiring the caller to hold a
/// deserialized [`Request`] first; used by the worker side of the remote proxy. Returns a
/// boxed future (rather than using `async_trait`) for the same object-safety reason as
/// `request::LocalFunction`.
pub trait RequestResolver: Send + Sync {
  fn resolve<'a>(
    &'a self,
    ctx: &'a dyn ResolveContext,
    encoded: &'a Value,
  ) -> BoxFuture<'a, Result<Value, CradleError>>;
}

#[derive(Clone)]
struct Registration {
  deserializer: Arc<dyn RequestDeserializer>,
  resolver: Arc<dyn RequestResolver>,
}

static REGISTRY: OnceLock<Mutex<HashMap<String, Registration>>> = OnceLock::new();

fn registry() -> &'static Mutex<HashMap<String, Registration>> {
  REGISTRY.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Reads the mandatory `uuid` discriminator field out of a serialized request. Absence and
/// a non-string value are distinct error kinds from "unknown uuid" (§4.10).
pub fn extract_uuid(encoded: &Value) -> Result<String, CradleError> {
  let Value::Mapping(fields) = encoded else {
    return Err(CradleError::ParsingError {
      expected_format: "a request object".to_string(),
      excerpt: format!("{:?}", encoded.type_name()),
    });
  };
  let uuid_value = fields
    .get(&Value::String("uuid".to_string()))
    .ok_or_else(|| CradleError::MissingField {
      field: "uuid".to_string(),
    })?;
  uuid_value.as_string().map(str::to_string)
}

/// Deserializes `encoded` by dispatching on its `uuid` field; fails with
/// `CradleError::UnregisteredUuid` if no catalog has registered that class.
pub fn deserialize(encoded: &Value) -> Result<Arc<Request>, CradleError> {
  let uuid = extract_uuid(encoded)?;
  let registration = registry()
    .lock()
    .get(&uuid)
    .cloned()
    .ok_or_else(|| CradleError::unregistered_uuid(&uuid))?;
  registration.deserializer.deserialize(encoded)
}

/// Resolves `encoded` directly by dispatching on its `uuid` field, without requiring the
/// caller to already hold a deserialized request (the worker side of the remote proxy, §4.9).
pub async fn resolve_serialized(
  ctx: &dyn ResolveContext,
  encoded: &Value,
) -> Result<Value, CradleError> {
  let uuid = extract_uuid(encoded)?;
  let registration = registry()
    .lock()
    .get(&uuid)
    .cloned()
    .ok_or_else(|| CradleError::unregistered_uuid(&uuid))?;
  registration.resolver.resolve(ctx, encoded).await
}

/// A scoped bundle of registrations, owned by a DLL or a test fixture (§4.10). Dropping the
/// catalog removes exactly the uuids it registered, never another catalog's entries.
pub struct SeriCatalog {
  owned_uuids: Mutex<Vec<String>>,
}

impl SeriCatalog {
  pub fn new() -> Arc<SeriCatalog> {
    Arc::new(SeriCatalog {
      owned_uuids: Mutex::new(Vec::new()),
    })
  }

  /// Registers the deserializer and resolver for request class `uuid`. Re-registering a
  /// uuid already owned by this catalog (or another live one) simply replaces the entry.
  pub fn register(
    &self,
    uuid: impl Into<String>,
    deserializer: Arc<dyn RequestDeserializer>,
    resolver: Arc<dyn RequestResolver>,
  ) {
    let uuid = uuid.into();
    registry()
      .lock()
      .insert(uuid.clone(), Registration { deserializer, resolver });
    self.owned_uuids.lock().push(uuid);
  }

  pub fn is_registered(uuid: &str) -> bool {
    registry().lock().contains_key(uuid)
  }
}

impl Drop for SeriCatalog {
  fn drop(&mut self) {
    let mut table = registry().lock();
    for uuid in self.owned_uuids.lock().drain(..) {
      table.remove(&uuid);
    }
  }
}

#[cfg(test)]
mod tests;
