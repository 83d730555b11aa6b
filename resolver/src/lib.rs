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

//! The resolution pipeline (§4.7): one `Resolver` over a shared [`Resources`] bundle picks,
//! for each request, remote-vs-local, sync-vs-async, cached-vs-direct, and retry, composing
//! the lower-level `memory_cache`/`secondary_cache`/`async_tree`/`containment`/`remote_proxy`
//! crates the way `graph::Scheduler` composes `NodeContext` and the two-tier CAS/AC split,
//! but over CRADLE's data-shaped `Request` rather than a trait a caller implements.

mod context;
mod dispatch;
mod resources;

pub use context::Context;
pub use dispatch::Resolver;
pub use resources::Resources;

#[cfg(test)]
mod tests;
