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

//! The dynamic value model (§3 "Value"): a closed set of variants comparable for equality
//! and total ordering, hashable, and convertible to/from a canonical binary
//! (MessagePack-compatible, via `rmp-serde`) and human (JSON/YAML) encoding.

mod msgpack;
mod ord;

use std::collections::BTreeMap;

use blob::Blob;
use chrono::{DateTime, Utc};
use cradle_errors::CradleError;

pub use msgpack::{from_msgpack, to_msgpack};

/// Above this size a blob is forbidden from round-tripping through the MessagePack
/// encoder (§6: "The encoder forbids blobs > 4 GiB").
pub const MAX_ENCODABLE_BLOB_BYTES: u64 = 4 * 1024 * 1024 * 1024;

/// A dynamically typed value: nil, bool, 64-bit integer, 64-bit float, UTF-8 string,
/// blob, UTC datetime at millisecond precision, an ordered sequence, or a mapping keyed
/// by values themselves (hence `Value: Ord`).
#[derive(Clone, Debug)]
pub enum Value {
  Nil,
  Bool(bool),
  Integer(i64),
  Float(f64),
  String(String),
  Blob(Blob),
  /// Millisecond precision; sub-millisecond components are truncated on construction.
  Datetime(DateTime<Utc>),
  Sequence(Vec<Value>),
  Mapping(BTreeMap<Value, Value>),
}

impl Value {
  pub fn datetime(dt: DateTime<Utc>) -> Value {
    let millis = dt.timestamp_millis();
    Value::Datetime(
      DateTime::from_timestamp_millis(millis).expect("timestamp_millis round-trips"),
    )
  }

  pub fn type_name(&self) -> &'static str {
    match self {
      Value::Nil => "nil",
      Value::Bool(_) => "bool",
      Value::Integer(_) => "integer",
      Value::Float(_) => "float",
      Value::String(_) => "string",
      Value::Blob(_) => "blob",
      Value::Datetime(_) => "datetime",
      Value::Sequence(_) => "sequence",
      Value::Mapping(_) => "mapping",
    }
  }

  pub fn as_bool(&self) -> Result<bool, CradleError> {
    match self {
      Value::Bool(b) => Ok(*b),
      other => Err(type_mismatch("bool", other)),
    }
  }

  pub fn as_integer(&self) -> Result<i64, CradleError> {
    match self {
      Value::Integer(i) => Ok(*i),
      other => Err(type_mismatch("integer", other)),
    }
  }

  pub fn as_string(&self) -> Result<&str, CradleError> {
    match self {
      Value::String(s) => Ok(s.as_str()),
      other => Err(type_mismatch("string", other)),
    }
  }

  pub fn as_blob(&self) -> Result<&Blob, CradleError> {
    match self {
      Value::Blob(b) => Ok(b),
      other => Err(type_mismatch("blob", other)),
    }
  }

  pub fn as_sequence(&self) -> Result<&[Value], CradleError> {
    match self {
      Value::Sequence(s) => Ok(s.as_slice()),
      other => Err(type_mismatch("sequence", other)),
    }
  }

  /// The canonical binary encoding of this value's bytes, used by `hashing` to compute a
  /// value's unique hash. Per §4.1, this is the underlying msgpack bytes, not a digest of
  /// any human-readable form.
  pub fn canonical_bytes(&self) -> Result<Vec<u8>, CradleError> {
    to_msgpack(self)
  }

  pub fn to_json(&self) -> serde_json::Value {
    human::to_json(self)
  }

  pub fn from_json(json: &serde_json::Value) -> Result<Value, CradleError> {
    human::from_json(json)
  }

  pub fn to_yaml(&self) -> serde_yaml::Value {
    serde_yaml::to_value(self.to_json()).expect("json value always converts to yaml")
  }

  pub fn from_yaml(yaml: &serde_yaml::Value) -> Result<Value, CradleError> {
    let json: serde_json::Value = serde_json::to_value(yaml)
      .map_err(|e| CradleError::ParsingError {
        expected_format: "yaml".to_string(),
        excerpt: e.to_string(),
      })?;
    Value::from_json(&json)
  }
}

fn type_mismatch(expected: &str, found: &Value) -> CradleError {
  CradleError::TypeMismatch {
    expected: expected.to_string(),
    found: found.type_name().to_string(),
  }
}

mod human {
  use super::*;
  use base64::Engine as _;

  const BLOB_TAG_KEY: &str = "__cradle_blob__";
  const PATH_KEY: &str = "path";
  const DATA_KEY: &str = "data";
  const DATETIME_TAG_KEY: &str = "__cradle_datetime__";

  pub(super) fn to_json(value: &Value) -> serde_json::Value {
    use serde_json::{Map, Number, Value as J};
    match value {
      Value::Nil => J::Null,
      Value::Bool(b) => J::Bool(*b),
      Value::Integer(i) => J::Number(Number::from(*i)),
      Value::Float(f) => Number::from_f64(*f).map(J::Number).unwrap_or(J::Null),
      Value::String(s) => J::String(s.clone()),
      Value::Blob(b) => {
        let mut map = Map::new();
        if let Some(path) = b.file_path() {
          map.insert(
            PATH_KEY.to_string(),
            J::String(path.to_string_lossy().into_owned()),
          );
        } else {
          map.insert(
            DATA_KEY.to_string(),
            J::String(base64::engine::general_purpose::STANDARD.encode(b.as_bytes())),
          );
        }
        let mut outer = Map::new();
        outer.insert(BLOB_TAG_KEY.to_string(), J::Object(map));
        J::Object(outer)
      }
      Value::Datetime(dt) => {
        let mut outer = Map::new();
        outer.insert(
          DATETIME_TAG_KEY.to_string(),
          J::String(dt.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
        );
        J::Object(outer)
      }
      Value::Sequence(items) => J::Array(items.iter().map(to_json).collect()),
      Value::Mapping(entries) => {
        // JSON/YAML object keys are strings; non-string Value keys are encoded as a
        // `{"key": ..., "value": ...}` pair list to stay lossless.
        if entries.keys().all(|k| matches!(k, Value::String(_))) {
          let mut map = Map::new();
          for (k, v) in entries {
            let Value::String(s) = k else { unreachable!() };
            map.insert(s.clone(), to_json(v));
          }
          J::Object(map)
        } else {
          J::Array(
            entries
              .iter()
              .map(|(k, v)| {
                let mut pair = Map::new();
                pair.insert("key".to_string(), to_json(k));
                pair.insert("value".to_string(), to_json(v));
                J::Object(pair)
              })
              .collect(),
          )
        }
      }
    }
  }

  pub(super) fn from_json(json: &serde_json::Value) -> Result<Value, CradleError> {
    use serde_json::Value as J;
    match json {
      J::Null => Ok(Value::Nil),
      J::Bool(b) => Ok(Value::Bool(*b)),
      J::Number(n) => {
        if let Some(i) = n.as_i64() {
          Ok(Value::Integer(i))
        } else if let Some(f) = n.as_f64() {
          Ok(Value::Float(f))
        } else {
          Err(CradleError::invalid_argument("number out of i64/f64 range"))
        }
      }
      J::String(s) => Ok(Value::String(s.clone())),
      J::Array(items) => items.iter().map(from_json).collect::<Result<_, _>>().map(Value::Sequence),
      J::Object(map) => {
        if let Some(J::Object(blob_fields)) = map.get(BLOB_TAG_KEY) {
          return decode_blob_object(blob_fields);
        }
        if let Some(J::String(rfc3339)) = map.get(DATETIME_TAG_KEY) {
          let dt = DateTime::parse_from_rfc3339(rfc3339)
            .map_err(|e| CradleError::ParsingError {
              expected_format: "rfc3339 datetime".to_string(),
              excerpt: format!("{rfc3339}: {e}"),
            })?
            .with_timezone(&Utc);
          return Ok(Value::datetime(dt));
        }
        let mut out = BTreeMap::new();
        for (k, v) in map {
          out.insert(Value::String(k.clone()), from_json(v)?);
        }
        Ok(Value::Mapping(out))
      }
    }
  }

  fn decode_blob_object(
    fields: &serde_json::Map<String, serde_json::Value>,
  ) -> Result<Value, CradleError> {
    if let Some(serde_json::Value::String(path)) = fields.get(PATH_KEY) {
      return Ok(Value::Blob(blob::Blob::from_mapped_file(path)?));
    }
    if let Some(serde_json::Value::String(data)) = fields.get(DATA_KEY) {
      let bytes = base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| CradleError::ParsingError {
          expected_format: "base64 blob".to_string(),
          excerpt: e.to_string(),
        })?;
      return Ok(Value::Blob(blob::Blob::from_bytes(bytes)));
    }
    Err(CradleError::MissingField {
      field: format!("{PATH_KEY} or {DATA_KEY}"),
    })
  }
}

#[cfg(test)]
mod tests;
