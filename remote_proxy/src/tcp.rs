use async_tree::{AsyncId, NodeStatus};
use cradle_errors::CradleError;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::json;
use tokio::io::{BufReader, BufWriter, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

use crate::wire::{read_frame, write_frame, RpcRequest, RpcResponse, PROTOCOL_VERSION};
use crate::{RemoteProxy, SerializedResult};

/// A remote peer reached over a length-prefixed JSON-RPC socket (§4.9, §6). The connection
/// is verified once at construction time, mirroring `client/src/pantsd.rs`'s
/// connect-then-verify idiom: a peer reporting a different protocol version is refused
/// before any real request crosses the wire.
pub struct TcpProxy {
  reader: Mutex<BufReader<ReadHalf<TcpStream>>>,
  writer: Mutex<BufWriter<WriteHalf<TcpStream>>>,
}

impl TcpProxy {
  pub async fn connect(addr: &str) -> Result<TcpProxy, CradleError> {
    let stream = TcpStream::connect(addr)
      .await
      .map_err(|e| CradleError::http_request_failure(&format!("connecting to {addr}: {e}")))?;
    let (read_half, write_half) = tokio::io::split(stream);
    let proxy = TcpProxy {
      reader: Mutex::new(BufReader::new(read_half)),
      writer: Mutex::new(BufWriter::new(write_half)),
    };
    let version = proxy.ping().await?;
    if version != PROTOCOL_VERSION {
      return Err(CradleError::RemoteError {
        peer_message: format!(
          "peer at {addr} speaks protocol {version:?}, expected {PROTOCOL_VERSION:?}"
        ),
      });
    }
    Ok(proxy)
  }

  async fn call(&self, method: &str, args: Vec<serde_json::Value>) -> Result<serde_json::Value, CradleError> {
    let request = RpcRequest {
      method: method.to_string(),
      args,
    };
    {
      let mut writer = self.writer.lock();
      write_frame(&mut *writer, &request).await?;
    }
    let response: RpcResponse = {
      let mut reader = self.reader.lock();
      read_frame(&mut *reader).await?
    };
    if !response.ok {
      let message = response
        .payload
        .as_str()
        .map(ToString::to_string)
        .unwrap_or_else(|| response.payload.to_string());
      return Err(CradleError::RemoteError { peer_message: message });
    }
    Ok(response.payload)
  }

  fn decode<T: for<'de> serde::Deserialize<'de>>(payload: serde_json::Value) -> Result<T, CradleError> {
    serde_json::from_value(payload).map_err(|e| CradleError::ParsingError {
      expected_format: "RPC response payload matching the requested shape".to_string(),
      excerpt: e.to_string(),
    })
  }

  fn decode_serialized_result(payload: serde_json::Value) -> Result<SerializedResult, CradleError> {
    let wire: WireSerializedResult = TcpProxy::decode(payload)?;
    Ok(SerializedResult {
      response_id: wire.response_id,
      cache_lock_id: wire.cache_lock_id,
      value: values::Value::from_json(&wire.value)?,
    })
  }
}

/// `SerializedResult` is not itself `Serialize`/`Deserialize` (`values::Value` has its own
/// canonical JSON codec instead of deriving serde), so the wire shape keeps `value` as raw
/// JSON and converts through `Value::to_json`/`Value::from_json` at the boundary.
#[derive(serde::Deserialize)]
struct WireSerializedResult {
  response_id: u64,
  cache_lock_id: u64,
  value: serde_json::Value,
}

fn to_json(value: &values::Value) -> serde_json::Value {
  value.to_json()
}

impl RemoteProxy for TcpProxy {
  fn ping(&self) -> BoxFuture<'_, Result<String, CradleError>> {
    Box::pin(async move {
      let payload = self.call("ping", vec![]).await?;
      TcpProxy::decode(payload)
    })
  }

  fn resolve_sync(&self, seri_req: &values::Value) -> BoxFuture<'_, Result<SerializedResult, CradleError>> {
    let args = vec![to_json(seri_req)];
    Box::pin(async move {
      let payload = self.call("resolve_sync", args).await?;
      TcpProxy::decode_serialized_result(payload)
    })
  }

  fn submit_async(&self, seri_req: &values::Value) -> BoxFuture<'_, Result<AsyncId, CradleError>> {
    let args = vec![to_json(seri_req)];
    Box::pin(async move {
      let payload = self.call("submit_async", args).await?;
      TcpProxy::decode(payload)
    })
  }

  fn submit_stored(&self, storage: &str, key: &str) -> BoxFuture<'_, Result<AsyncId, CradleError>> {
    let args = vec![json!(storage), json!(key)];
    Box::pin(async move {
      let payload = self.call("submit_stored", args).await?;
      TcpProxy::decode(payload)
    })
  }

  fn get_async_status(&self, id: AsyncId) -> BoxFuture<'_, Result<NodeStatus, CradleError>> {
    let args = vec![json!(id)];
    Box::pin(async move {
      let payload = self.call("get_async_status", args).await?;
      TcpProxy::decode(payload)
    })
  }

  fn get_async_error_message(&self, id: AsyncId) -> BoxFuture<'_, Result<Option<String>, CradleError>> {
    let args = vec![json!(id)];
    Box::pin(async move {
      let payload = self.call("get_async_error_message", args).await?;
      TcpProxy::decode(payload)
    })
  }

  fn get_sub_contexts(&self, id: AsyncId) -> BoxFuture<'_, Result<Vec<(AsyncId, bool)>, CradleError>> {
    let args = vec![json!(id)];
    Box::pin(async move {
      let payload = self.call("get_sub_contexts", args).await?;
      TcpProxy::decode(payload)
    })
  }

  fn get_async_response(&self, root_id: AsyncId) -> BoxFuture<'_, Result<SerializedResult, CradleError>> {
    let args = vec![json!(root_id)];
    Box::pin(async move {
      let payload = self.call("get_async_response", args).await?;
      TcpProxy::decode_serialized_result(payload)
    })
  }

  fn request_cancellation(&self, id: AsyncId) -> BoxFuture<'_, Result<(), CradleError>> {
    let args = vec![json!(id)];
    Box::pin(async move {
      self.call("request_cancellation", args).await?;
      Ok(())
    })
  }

  fn finish_async(&self, root_id: AsyncId) -> BoxFuture<'_, Result<(), CradleError>> {
    let args = vec![json!(root_id)];
    Box::pin(async move {
      self.call("finish_async", args).await?;
      Ok(())
    })
  }

  fn release_cache_record_lock(&self, remote_id: u64) -> BoxFuture<'_, Result<(), CradleError>> {
    let args = vec![json!(remote_id)];
    Box::pin(async move {
      self.call("release_cache_record_lock", args).await?;
      Ok(())
    })
  }

  fn load_shared_library(&self, dir: &str, name: &str) -> BoxFuture<'_, Result<(), CradleError>> {
    let args = vec![json!(dir), json!(name)];
    Box::pin(async move {
      self.call("load_shared_library", args).await?;
      Ok(())
    })
  }

  fn unload_shared_library(&self, name: &str) -> BoxFuture<'_, Result<(), CradleError>> {
    let args = vec![json!(name)];
    Box::pin(async move {
      self.call("unload_shared_library", args).await?;
      Ok(())
    })
  }

  fn mock_http(&self, body: &str) -> BoxFuture<'_, Result<String, CradleError>> {
    let args = vec![json!(body)];
    Box::pin(async move {
      let payload = self.call("mock_http", args).await?;
      TcpProxy::decode(payload)
    })
  }
}
