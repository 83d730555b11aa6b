use crate::{Digest, Fingerprint};

#[test]
fn serialize_and_deserialize() {
  let digest = Digest::new(
    Fingerprint::from_hex_string(
      "0123456789abcdeffedcba98765432100000000000000000ffffffffffffffff",
    )
    .unwrap(),
    1,
  );
  let json = serde_json::to_string(&digest).unwrap();
  let round_tripped: Digest = serde_json::from_str(&json).unwrap();
  assert_eq!(round_tripped, digest);
}

#[test]
fn of_bytes_is_deterministic_and_sized() {
  let digest = Digest::of_bytes(b"hello cradle");
  assert_eq!(digest.size_bytes, b"hello cradle".len());
  assert_eq!(digest, Digest::of_bytes(b"hello cradle"));
  assert_ne!(digest, Digest::of_bytes(b"hello cradle!"));
}
