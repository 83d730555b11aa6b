use hashing::Fingerprint;
use values::Value;

use crate::argument::{Argument, Arguments};

/// Type tags mixed into every fingerprinted value so that e.g. the integer `0` and the
/// string `"\0"` never collide.
mod tag {
  pub const NIL: u8 = 0;
  pub const BOOL: u8 = 1;
  pub const INTEGER: u8 = 2;
  pub const FLOAT: u8 = 3;
  pub const STRING: u8 = 4;
  pub const BLOB: u8 = 5;
  pub const DATETIME: u8 = 6;
  pub const SEQUENCE: u8 = 7;
  pub const MAPPING: u8 = 8;
}

/// The unique hash of a primitive value (§4.1): for a blob this covers its raw bytes
/// directly (never the data-owner identity, and without the msgpack encoder's size cap);
/// for every other variant it covers a tagged, deterministic encoding of its content.
pub fn fingerprint_value(value: &Value) -> Fingerprint {
  match value {
    Value::Nil => Fingerprint::combine([&[tag::NIL][..]]),
    Value::Bool(b) => Fingerprint::combine([&[tag::BOOL][..], &[*b as u8][..]]),
    Value::Integer(i) => Fingerprint::combine([&[tag::INTEGER][..], &i.to_be_bytes()[..]]),
    Value::Float(f) => {
      Fingerprint::combine([&[tag::FLOAT][..], &f.to_bits().to_be_bytes()[..]])
    }
    Value::String(s) => Fingerprint::combine([&[tag::STRING][..], s.as_bytes()]),
    Value::Blob(b) => Fingerprint::combine([&[tag::BLOB][..], b.as_bytes()]),
    Value::Datetime(dt) => Fingerprint::combine([
      &[tag::DATETIME][..],
      &dt.timestamp_millis().to_be_bytes()[..],
    ]),
    Value::Sequence(items) => {
      let child_fingerprints: Vec<Fingerprint> = items.iter().map(fingerprint_value).collect();
      let mut parts: Vec<&[u8]> = vec![&[tag::SEQUENCE][..]];
      parts.extend(child_fingerprints.iter().map(Fingerprint::as_ref));
      Fingerprint::combine(parts)
    }
    Value::Mapping(entries) => {
      // `BTreeMap` iteration is already key-ordered, so this is stable regardless of how
      // the mapping was built.
      let child_fingerprints: Vec<Fingerprint> = entries
        .iter()
        .flat_map(|(k, v)| [fingerprint_value(k), fingerprint_value(v)])
        .collect();
      let mut parts: Vec<&[u8]> = vec![&[tag::MAPPING][..]];
      parts.extend(child_fingerprints.iter().map(Fingerprint::as_ref));
      Fingerprint::combine(parts)
    }
  }
}

/// The unique hash of a request (§4.1): `(uuid, unique_hash(arg₁), …, unique_hash(argₙ))`.
pub fn compute(uuid: &str, arguments: &Arguments) -> Fingerprint {
  let arg_fingerprints: Vec<Fingerprint> = arguments
    .iter()
    .map(|arg| match arg {
      Argument::Literal(value) => fingerprint_value(value),
      Argument::SubRequest(request) => request.fingerprint(),
    })
    .collect();
  let mut parts: Vec<&[u8]> = vec![uuid.as_bytes()];
  parts.extend(arg_fingerprints.iter().map(Fingerprint::as_ref));
  Fingerprint::combine(parts)
}
