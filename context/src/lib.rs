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

//! The capability-trait mix-ins a resolution context may implement, plus the tasklet
//! introspection registry (§3 "Tasklet"). Grounded in `graph::Context`'s pattern of a thin
//! required trait (here, `request::ResolveContext`) with richer optional capabilities
//! reached through a downcast, rather than one monolithic context type.

mod tasklet;

pub use tasklet::{Tasklet, TaskletEvent, TaskletId, TaskletRegistry};

use request::ResolveContext;

/// A context that may run a request's local function directly, as opposed to only being
/// able to dispatch it to a remote peer.
pub trait LocalCapability: ResolveContext {}

/// A context with a remote peer it can dispatch proxy requests to. `peer_name` is used only
/// for logging/diagnostics; actual dispatch goes through `remote_proxy::RemoteProxy`, which
/// callers reach via [`ResolveContext::as_any`] to avoid this crate depending on it.
pub trait RemoteCapability: ResolveContext {
  fn peer_name(&self) -> &str;
}

/// A context that resolves synchronously: `resolve` returns once the result is available,
/// with no tree of in-flight async nodes to track.
pub trait SyncCapability: ResolveContext {}

/// A context that resolves asynchronously, as one node of a tree sharing a cancellation
/// source. `async_id` is stable for the lifetime of this node (§3 "Context tree").
pub trait AsyncCapability: ResolveContext {
  fn async_id(&self) -> u64;
}

/// A context backed by the two-tier cache, so `caching_level != None` requests are
/// deduplicated against in-flight and previously computed results.
pub trait CachingCapability: ResolveContext {
  fn caching_enabled(&self) -> bool;
}

/// A context that records tasklet events for diagnostic queries.
pub trait IntrospectiveCapability: ResolveContext {
  fn tasklet_registry(&self) -> &TaskletRegistry;
  fn current_tasklet(&self) -> Option<TaskletId>;
}

/// Attempts to reach a capability beyond the minimal [`ResolveContext`] surface, by
/// downcasting through [`ResolveContext::as_any`] to a concrete context type `T` that is
/// known (by the caller) to implement the richer capability. Returns `None` rather than
/// erroring so callers can fall back to a less capable code path; a resolver that requires
/// the capability should turn a `None` here into `cradle_errors::CradleError::InvalidArgument`.
pub fn downcast_context<T: 'static>(ctx: &dyn ResolveContext) -> Option<&T> {
  ctx.as_any().downcast_ref::<T>()
}
