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

//! The async context tree (§3, §4.8): a tree of nodes mirroring a request's sub-request
//! structure, each with its own status and a shared, cooperative cancellation source at the
//! root. Grounded in `graph::Context`'s `entry_id`/parent-pointer shape and in
//! `workunit_store`'s mutex-guarded running-workunit table for the `async_id -> node` lookup.

mod cancellation;
mod node;
mod status;

pub use cancellation::{CancellationSource, CancellationToken};
pub use node::{AsyncId, AsyncRegistry, Node};
pub use status::NodeStatus;
