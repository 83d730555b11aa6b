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

//! The remote-proxy boundary (§4.9): the operation set a resolver dispatches to when a
//! request is remote, whether the peer is in-process (`LoopbackProxy`) or a real worker
//! reached over a socket (`TcpProxy`). Grounded in `fs/store/src/remote/mod.rs`'s
//! `ByteStoreProvider` shape — one trait, several backends the caller picks at construction —
//! and the connect-then-verify idiom of `client/src/pantsd.rs`.

mod loopback;
mod tcp;
mod wire;

pub use loopback::LoopbackProxy;
pub use tcp::TcpProxy;
pub use wire::{RpcRequest, RpcResponse, PROTOCOL_VERSION};

use async_tree::{AsyncId, NodeStatus};
use cradle_errors::CradleError;
use futures::future::BoxFuture;
use values::Value;

/// The deserialized-on-arrival shape of `resolve_sync`/`get_async_response`'s wire result
/// (§4.9): `response_id != 0` obligates the caller to ack after deserializing, to release the
/// worker's pin on any transferred file-backed blob.
#[derive(Clone, Debug, PartialEq)]
pub struct SerializedResult {
  pub response_id: u64,
  pub cache_lock_id: u64,
  pub value: Value,
}

/// The operations a resolver dispatches to a remote peer (§4.9). Every method is async and
/// object-safe via a boxed future, matching `request::LocalFunction`'s shape.
pub trait RemoteProxy: Send + Sync {
  fn ping(&self) -> BoxFuture<'_, Result<String, CradleError>>;

  fn resolve_sync(&self, seri_req: &Value) -> BoxFuture<'_, Result<SerializedResult, CradleError>>;

  fn submit_async(&self, seri_req: &Value) -> BoxFuture<'_, Result<AsyncId, CradleError>>;

  fn submit_stored(&self, storage: &str, key: &str) -> BoxFuture<'_, Result<AsyncId, CradleError>>;

  fn get_async_status(&self, id: AsyncId) -> BoxFuture<'_, Result<NodeStatus, CradleError>>;

  fn get_async_error_message(&self, id: AsyncId) -> BoxFuture<'_, Result<Option<String>, CradleError>>;

  /// Only meaningful once the worker's node has reached `SubsRunning`; a proxy may return an
  /// empty list before then rather than erroring.
  fn get_sub_contexts(&self, id: AsyncId) -> BoxFuture<'_, Result<Vec<(AsyncId, bool)>, CradleError>>;

  /// Blocks until `root_id` reaches `Finished`, or fails on `Error`/`Cancelled`.
  fn get_async_response(&self, root_id: AsyncId) -> BoxFuture<'_, Result<SerializedResult, CradleError>>;

  /// Best-effort and idempotent.
  fn request_cancellation(&self, id: AsyncId) -> BoxFuture<'_, Result<(), CradleError>>;

  fn finish_async(&self, root_id: AsyncId) -> BoxFuture<'_, Result<(), CradleError>>;

  fn release_cache_record_lock(&self, remote_id: u64) -> BoxFuture<'_, Result<(), CradleError>>;

  fn load_shared_library(&self, dir: &str, name: &str) -> BoxFuture<'_, Result<(), CradleError>>;

  fn unload_shared_library(&self, name: &str) -> BoxFuture<'_, Result<(), CradleError>>;

  fn mock_http(&self, body: &str) -> BoxFuture<'_, Result<String, CradleError>>;
}
