//! Manual `Eq`/`Hash`/`Ord` for [`Value`], needed because `f64` implements neither and
//! because a `Value` can appear as a key of its own `Mapping` variant.

use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

use crate::Value;

/// The relative ordering of variants, used both to break ties between different-typed
/// values and to pick a stable iteration order for `Mapping` keys.
fn discriminant_rank(value: &Value) -> u8 {
  match value {
    Value::Nil => 0,
    Value::Bool(_) => 1,
    Value::Integer(_) => 2,
    Value::Float(_) => 3,
    Value::String(_) => 4,
    Value::Blob(_) => 5,
    Value::Datetime(_) => 6,
    Value::Sequence(_) => 7,
    Value::Mapping(_) => 8,
  }
}

impl PartialEq for Value {
  fn eq(&self, other: &Self) -> bool {
    self.cmp(other) == Ordering::Equal
  }
}

impl Eq for Value {}

impl PartialOrd for Value {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for Value {
  fn cmp(&self, other: &Self) -> Ordering {
    match (self, other) {
      (Value::Nil, Value::Nil) => Ordering::Equal,
      (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
      (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
      (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
      (Value::String(a), Value::String(b)) => a.cmp(b),
      (Value::Blob(a), Value::Blob(b)) => a.as_bytes().cmp(b.as_bytes()),
      (Value::Datetime(a), Value::Datetime(b)) => a.cmp(b),
      (Value::Sequence(a), Value::Sequence(b)) => a.cmp(b),
      (Value::Mapping(a), Value::Mapping(b)) => a.cmp(b),
      (a, b) => discriminant_rank(a).cmp(&discriminant_rank(b)),
    }
  }
}

impl Hash for Value {
  fn hash<H: Hasher>(&self, state: &mut H) {
    discriminant_rank(self).hash(state);
    match self {
      Value::Nil => {}
      Value::Bool(b) => b.hash(state),
      Value::Integer(i) => i.hash(state),
      Value::Float(f) => f.to_bits().hash(state),
      Value::String(s) => s.hash(state),
      Value::Blob(b) => b.hash(state),
      Value::Datetime(dt) => dt.timestamp_millis().hash(state),
      Value::Sequence(items) => items.hash(state),
      Value::Mapping(entries) => {
        // `BTreeMap` iterates in key order, so this is stable regardless of insertion order.
        for (k, v) in entries {
          k.hash(state);
          v.hash(state);
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::hash_map::DefaultHasher;

  fn hash_of(value: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
  }

  #[test]
  fn equal_values_hash_equal() {
    let a = Value::Mapping(
      [(Value::String("x".into()), Value::Integer(1))]
        .into_iter()
        .collect(),
    );
    let b = Value::Mapping(
      [(Value::String("x".into()), Value::Integer(1))]
        .into_iter()
        .collect(),
    );
    assert_eq!(a, b);
    assert_eq!(hash_of(&a), hash_of(&b));
  }

  #[test]
  fn variants_order_by_discriminant_when_incomparable() {
    assert!(Value::Nil < Value::Bool(false));
    assert!(Value::Bool(true) < Value::Integer(0));
    assert!(Value::Sequence(vec![]) < Value::Mapping(Default::default()));
  }

  #[test]
  fn floats_use_total_order_not_partial_cmp() {
    assert!(Value::Float(f64::NAN).partial_cmp(&Value::Float(0.0)).is_some());
  }
}
