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

//! The CRADLE request-resolution engine: a distributed, cached, cancellable dispatcher for
//! content-addressed units of work. This root crate wires the lower-level crates
//! (`hashing`, `blob`, `values`, `request`, `context`, `memory_cache`, `secondary_cache`,
//! `async_tree`, `remote_proxy`, `seri_registry`, `containment`, `resolver`) into the public
//! entry points a caller actually uses: build a [`Config`], turn it into a
//! [`resolver::Resources`] via [`Config::build_resources`], and resolve requests through a
//! [`resolver::Resolver`].

mod config;
mod http;

pub use config::Config;
pub use http::{ConcurrencyLimiter, HttpExecutor, HttpResponse};

pub use async_tree::AsyncId;
pub use containment::{ContainedDispatcher, ProcessContainedDispatcher};
pub use context::{TaskletEvent, TaskletId, TaskletRegistry};
pub use cradle_errors::CradleError;
pub use memory_cache::MemoryCache;
pub use remote_proxy::{LoopbackProxy, RemoteProxy, TcpProxy};
pub use request::{Arguments, Body, FnFunction, Properties, Request, ResolveContext};
pub use resolver::{Context, Resolver, Resources};
pub use secondary_cache::SecondaryCache;
pub use values::Value;

#[cfg(test)]
mod tests;
