use cradle_errors::CradleError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Bumped whenever the RPC contract changes incompatibly; a peer reporting a different
/// string at `ping` time is refused rather than risking a silent wire-format mismatch
/// (§6 "a mismatch closes the connection with a fatal error").
pub const PROTOCOL_VERSION: &str = "cradle-rpc/1";

/// One peer-to-peer RPC message: a method name plus positional, JSON-encoded arguments
/// (§6 "Peer-to-peer RPC messages carry (method name, positional args)").
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcRequest {
  pub method: String,
  pub args: Vec<serde_json::Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RpcResponse {
  pub ok: bool,
  pub payload: serde_json::Value,
}

const MAX_FRAME_BYTES: u32 = 256 * 1024 * 1024;

/// Writes `message` as a 4-byte big-endian length prefix followed by its JSON encoding.
pub async fn write_frame<W: AsyncWriteExt + Unpin, T: Serialize>(
  writer: &mut W,
  message: &T,
) -> Result<(), CradleError> {
  let bytes = serde_json::to_vec(message)
    .map_err(|e| CradleError::logic_error(format!("encoding RPC frame: {e}")))?;
  if bytes.len() as u64 > u64::from(MAX_FRAME_BYTES) {
    return Err(CradleError::logic_error("RPC frame exceeds the maximum size"));
  }
  writer
    .write_all(&(bytes.len() as u32).to_be_bytes())
    .await
    .map_err(|e| CradleError::http_request_failure(&format!("writing RPC frame length: {e}")))?;
  writer
    .write_all(&bytes)
    .await
    .map_err(|e| CradleError::http_request_failure(&format!("writing RPC frame body: {e}")))?;
  writer
    .flush()
    .await
    .map_err(|e| CradleError::http_request_failure(&format!("flushing RPC frame: {e}")))?;
  Ok(())
}

/// Reads one length-prefixed JSON frame, failing with `parsing_error` on truncated input.
pub async fn read_frame<R: AsyncReadExt + Unpin, T: for<'de> Deserialize<'de>>(
  reader: &mut R,
) -> Result<T, CradleError> {
  let mut len_bytes = [0u8; 4];
  reader
    .read_exact(&mut len_bytes)
    .await
    .map_err(|e| CradleError::ParsingError {
      expected_format: "4-byte RPC frame length prefix".to_string(),
      excerpt: e.to_string(),
    })?;
  let len = u32::from_be_bytes(len_bytes);
  if len > MAX_FRAME_BYTES {
    return Err(CradleError::ParsingError {
      expected_format: "RPC frame within the maximum size".to_string(),
      excerpt: format!("{len} bytes"),
    });
  }
  let mut body = vec![0u8; len as usize];
  reader
    .read_exact(&mut body)
    .await
    .map_err(|e| CradleError::ParsingError {
      expected_format: "complete RPC frame body".to_string(),
      excerpt: e.to_string(),
    })?;
  serde_json::from_slice(&body).map_err(|e| CradleError::ParsingError {
    expected_format: "JSON-encoded RPC frame".to_string(),
    excerpt: e.to_string(),
  })
}
