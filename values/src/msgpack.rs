//! Canonical binary encoding of [`Value`], via `rmp-serde`. The wire shape is a private
//! `MsgpackWire` enum rather than a hand-rolled reader/writer: `rmp-serde` already knows how
//! to serialize arbitrary serde data through the msgpack data model, so the only bespoke
//! piece is `RawBytes`, which forces blob payloads onto msgpack's `bin` family instead of
//! being serialized as a sequence of integers.

use std::fmt;

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use cradle_errors::CradleError;

use crate::{Value, MAX_ENCODABLE_BLOB_BYTES};

/// Wraps a `Vec<u8>` so it serializes as msgpack `bin` rather than as an array of
/// integers, mirroring what `serde_bytes` would do without adding the dependency.
struct RawBytes(Vec<u8>);

impl Serialize for RawBytes {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_bytes(&self.0)
  }
}

impl<'de> Deserialize<'de> for RawBytes {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct BytesVisitor;
    impl<'de> Visitor<'de> for BytesVisitor {
      type Value = RawBytes;

      fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a byte buffer")
      }

      fn visit_bytes<E: serde::de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
        Ok(RawBytes(v.to_vec()))
      }

      fn visit_byte_buf<E: serde::de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
        Ok(RawBytes(v))
      }
    }
    deserializer.deserialize_byte_buf(BytesVisitor)
  }
}

#[derive(Serialize, Deserialize)]
enum MsgpackWire {
  Nil,
  Bool(bool),
  Integer(i64),
  Float(f64),
  String(String),
  Blob(RawBytes),
  /// Milliseconds since the Unix epoch, UTC.
  Datetime(i64),
  Sequence(WireSequence),
  /// Flattened `(key, value, key, value, ...)` pairs rather than a map type, so that
  /// non-string keys (themselves arbitrary `Value`s) round-trip without constraints on
  /// what serde/msgpack accept as a map key.
  Mapping(WireSequence),
}

/// A newtype so `Vec<MsgpackWire>` can implement `Serialize`/`Deserialize` recursively
/// without running into serde's blanket impl ambiguity for nested enums.
struct WireSequence(Vec<MsgpackWire>);

impl Serialize for WireSequence {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
    for item in &self.0 {
      seq.serialize_element(item)?;
    }
    seq.end()
  }
}

impl<'de> Deserialize<'de> for WireSequence {
  fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
    struct SeqVisitor;
    impl<'de> Visitor<'de> for SeqVisitor {
      type Value = WireSequence;

      fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "a sequence of wire values")
      }

      fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut out = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
          out.push(item);
        }
        Ok(WireSequence(out))
      }
    }
    deserializer.deserialize_seq(SeqVisitor)
  }
}

fn to_wire(value: &Value) -> Result<MsgpackWire, CradleError> {
  Ok(match value {
    Value::Nil => MsgpackWire::Nil,
    Value::Bool(b) => MsgpackWire::Bool(*b),
    Value::Integer(i) => MsgpackWire::Integer(*i),
    Value::Float(f) => MsgpackWire::Float(*f),
    Value::String(s) => MsgpackWire::String(s.clone()),
    Value::Blob(b) => {
      if b.len() as u64 > MAX_ENCODABLE_BLOB_BYTES {
        return Err(CradleError::invalid_argument(format!(
          "blob of {} bytes exceeds the {}-byte msgpack encoding limit",
          b.len(),
          MAX_ENCODABLE_BLOB_BYTES
        )));
      }
      MsgpackWire::Blob(RawBytes(b.as_bytes().to_vec()))
    }
    Value::Datetime(dt) => MsgpackWire::Datetime(dt.timestamp_millis()),
    Value::Sequence(items) => {
      let wired = items.iter().map(to_wire).collect::<Result<Vec<_>, _>>()?;
      MsgpackWire::Sequence(WireSequence(wired))
    }
    Value::Mapping(entries) => {
      let mut flattened = Vec::with_capacity(entries.len() * 2);
      for (k, v) in entries {
        flattened.push(to_wire(k)?);
        flattened.push(to_wire(v)?);
      }
      MsgpackWire::Mapping(WireSequence(flattened))
    }
  })
}

fn from_wire(wire: MsgpackWire) -> Result<Value, CradleError> {
  Ok(match wire {
    MsgpackWire::Nil => Value::Nil,
    MsgpackWire::Bool(b) => Value::Bool(b),
    MsgpackWire::Integer(i) => Value::Integer(i),
    MsgpackWire::Float(f) => Value::Float(f),
    MsgpackWire::String(s) => Value::String(s),
    MsgpackWire::Blob(raw) => Value::Blob(blob::Blob::from_bytes(raw.0)),
    MsgpackWire::Datetime(millis) => {
      let dt = chrono::DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        CradleError::ParsingError {
          expected_format: "millisecond unix timestamp".to_string(),
          excerpt: millis.to_string(),
        }
      })?;
      Value::datetime(dt)
    }
    MsgpackWire::Sequence(WireSequence(items)) => {
      let values = items.into_iter().map(from_wire).collect::<Result<_, _>>()?;
      Value::Sequence(values)
    }
    MsgpackWire::Mapping(WireSequence(flattened)) => {
      if flattened.len() % 2 != 0 {
        return Err(CradleError::ParsingError {
          expected_format: "even-length key/value mapping wire".to_string(),
          excerpt: flattened.len().to_string(),
        });
      }
      let mut out = std::collections::BTreeMap::new();
      let mut iter = flattened.into_iter();
      while let (Some(k), Some(v)) = (iter.next(), iter.next()) {
        out.insert(from_wire(k)?, from_wire(v)?);
      }
      Value::Mapping(out)
    }
  })
}

pub fn to_msgpack(value: &Value) -> Result<Vec<u8>, CradleError> {
  let wire = to_wire(value)?;
  rmp_serde::to_vec(&wire)
    .map_err(|e| CradleError::invalid_argument(format!("encoding msgpack: {e}")))
}

pub fn from_msgpack(bytes: &[u8]) -> Result<Value, CradleError> {
  let wire: MsgpackWire = rmp_serde::from_slice(bytes).map_err(|e| CradleError::ParsingError {
    expected_format: "msgpack value".to_string(),
    excerpt: e.to_string(),
  })?;
  from_wire(wire)
}
