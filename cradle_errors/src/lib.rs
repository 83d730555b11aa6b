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

//! The error taxonomy shared across every CRADLE crate. Grounded in the shape of
//! `sharded_lmdb::StoreError` (a small enum with `From` conversions and a manual
//! `Display`/`Error` impl) rather than a derive-macro-based error crate, matching the rest
//! of the workspace's convention of plain `Result<T, String>`-adjacent error handling.

use std::fmt;

use hashing::Fingerprint;

/// One of the error kinds named in the resolution-pipeline design. Each variant carries
/// enough structured context to format a useful message without needing to downcast.
#[derive(Clone, Debug)]
pub enum CradleError {
  /// An explicit lookup (not a cache miss, which is not an error) found nothing.
  NotFound { what: String },
  InvalidArgument { message: String },
  TypeMismatch { expected: String, found: String },
  MissingField { field: String },
  ParsingError {
    expected_format: String,
    excerpt: String,
  },
  HttpRequestFailure { message: String },
  BadHttpStatusCode { status: u16, message: String },
  /// An RPC peer reported an error; the peer's message is carried verbatim.
  RemoteError { peer_message: String },
  /// The async tree (or one of its ancestors) was cancelled.
  AsyncCancelled,
  /// A sub-computation reported an error; carries the sub's message.
  AsyncError { sub_message: String },
  UnregisteredUuid { uuid: String },
  ContainmentFailure { message: String },
  NotImplemented { what: String },
  LogicError { message: String },
}

impl CradleError {
  pub fn not_found(what: impl Into<String>) -> Self {
    CradleError::NotFound { what: what.into() }
  }

  pub fn invalid_argument(message: impl Into<String>) -> Self {
    CradleError::InvalidArgument {
      message: message.into(),
    }
  }

  pub fn unregistered_uuid(uuid: impl Into<String>) -> Self {
    CradleError::UnregisteredUuid { uuid: uuid.into() }
  }

  pub fn logic_error(message: impl Into<String>) -> Self {
    CradleError::LogicError {
      message: message.into(),
    }
  }

  /// Redacts an `Authorization: ...` header from a raw HTTP error body or request dump
  /// before it is logged or wrapped, per the `http_request_failure` / `bad_http_status_code`
  /// handling contract.
  pub fn http_request_failure(raw_message: &str) -> Self {
    CradleError::HttpRequestFailure {
      message: redact_authorization(raw_message),
    }
  }

  pub fn bad_http_status_code(status: u16, raw_message: &str) -> Self {
    CradleError::BadHttpStatusCode {
      status,
      message: redact_authorization(raw_message),
    }
  }

  /// True for the kinds a retry policy should treat as worth re-attempting: remote hiccups
  /// and HTTP failures, never cancellation, programmer errors, or permanent shape mismatches.
  pub fn is_retryable(&self) -> bool {
    matches!(
      self,
      CradleError::HttpRequestFailure { .. }
        | CradleError::BadHttpStatusCode { .. }
        | CradleError::RemoteError { .. }
        | CradleError::ContainmentFailure { .. }
    )
  }

  pub fn is_cancellation(&self) -> bool {
    matches!(self, CradleError::AsyncCancelled)
  }
}

fn redact_authorization(message: &str) -> String {
  let mut out = String::with_capacity(message.len());
  for line in message.split_inclusive('\n') {
    let lower = line.to_ascii_lowercase();
    if let Some(idx) = lower.find("authorization:") {
      out.push_str(&line[..idx]);
      out.push_str("authorization: <redacted>\n");
    } else {
      out.push_str(line);
    }
  }
  out
}

impl fmt::Display for CradleError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CradleError::NotFound { what } => write!(f, "not found: {what}"),
      CradleError::InvalidArgument { message } => write!(f, "invalid argument: {message}"),
      CradleError::TypeMismatch { expected, found } => {
        write!(f, "type mismatch: expected {expected}, found {found}")
      }
      CradleError::MissingField { field } => write!(f, "missing field: {field}"),
      CradleError::ParsingError {
        expected_format,
        excerpt,
      } => write!(
        f,
        "parsing error: expected {expected_format}, got: {excerpt}"
      ),
      CradleError::HttpRequestFailure { message } => write!(f, "HTTP request failed: {message}"),
      CradleError::BadHttpStatusCode { status, message } => {
        write!(f, "bad HTTP status {status}: {message}")
      }
      CradleError::RemoteError { peer_message } => write!(f, "remote error: {peer_message}"),
      CradleError::AsyncCancelled => write!(f, "resolution was cancelled"),
      CradleError::AsyncError { sub_message } => {
        write!(f, "sub-computation failed: {sub_message}")
      }
      CradleError::UnregisteredUuid { uuid } => write!(f, "unregistered uuid: {uuid}"),
      CradleError::ContainmentFailure { message } => write!(f, "containment failure: {message}"),
      CradleError::NotImplemented { what } => write!(f, "not implemented: {what}"),
      CradleError::LogicError { message } => write!(f, "logic error: {message}"),
    }
  }
}

impl std::error::Error for CradleError {}

impl From<String> for CradleError {
  fn from(message: String) -> Self {
    CradleError::LogicError { message }
  }
}

impl From<&str> for CradleError {
  fn from(message: &str) -> Self {
    CradleError::LogicError {
      message: message.to_string(),
    }
  }
}

/// Formats a fingerprint the way log lines and error messages throughout the workspace do:
/// a short, greppable prefix rather than the full 64 hex characters.
pub fn short_fingerprint(fp: &Fingerprint) -> String {
  fp.to_hex().chars().take(12).collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn redacts_authorization_header() {
    let raw = "GET /v1 HTTP/1.1\nAuthorization: Bearer sekret\nHost: example.com\n";
    let err = CradleError::http_request_failure(raw);
    match err {
      CradleError::HttpRequestFailure { message } => {
        assert!(!message.contains("sekret"));
        assert!(message.contains("<redacted>"));
      }
      _ => panic!("wrong variant"),
    }
  }

  #[test]
  fn retryable_kinds() {
    assert!(CradleError::http_request_failure("boom").is_retryable());
    assert!(!CradleError::AsyncCancelled.is_retryable());
    assert!(!CradleError::logic_error("bug").is_retryable());
  }
}
