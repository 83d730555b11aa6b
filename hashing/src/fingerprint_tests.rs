use crate::Fingerprint;

#[test]
fn from_bytes_unsafe() {
  assert_eq!(
    Fingerprint::from_bytes_unsafe(&[
      0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab,
      0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab, 0xab,
      0xab, 0xab,
    ]),
    Fingerprint([0xab; 32])
  );
}

#[test]
fn from_hex_string() {
  assert_eq!(
    Fingerprint::from_hex_string(
      "0123456789abcdefFEDCBA98765432100000000000000000ffFFfFfFFfFfFFff",
    )
    .unwrap(),
    Fingerprint([
      0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0xfe, 0xdc, 0xba, 0x98, 0x76, 0x54, 0x32,
      0x10, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
      0xff, 0xff,
    ])
  )
}

#[test]
fn from_hex_string_not_long_enough() {
  Fingerprint::from_hex_string("abcd").expect_err("Want err");
}

#[test]
fn from_hex_string_invalid_chars() {
  Fingerprint::from_hex_string(
    "Q123456789ABCDEF0123456789ABCDEF0123456789ABCDEF0123456789ABCDEF",
  )
  .expect_err("Want err");
}

#[test]
fn to_hex_roundtrips_display() {
  let hex = "0123456789ABCDEF0123456789ABCDEF0123456789ABCDEF0123456789ABCDEF";
  let fp = Fingerprint::from_hex_string(hex).unwrap();
  assert_eq!(fp.to_string(), hex.to_lowercase());
  let roundtripped: Fingerprint = fp.to_hex().parse().unwrap();
  assert_eq!(roundtripped, fp);
}

#[test]
fn serialize_to_str() {
  let fingerprint = Fingerprint([
    0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0xfe, 0xdc, 0xba, 0x98, 0x76, 0x54, 0x32, 0x10,
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
  ]);
  let json = serde_json::to_string(&fingerprint).unwrap();
  assert_eq!(
    json,
    "\"0123456789abcdeffedcba98765432100000000000000000ffffffffffffffff\""
  );
}

#[test]
fn combine_is_order_sensitive_and_length_prefixed() {
  let a = Fingerprint::of_bytes(b"a");
  let b = Fingerprint::of_bytes(b"b");
  let combined_ab = Fingerprint::combine([a.as_bytes().as_slice(), b.as_bytes().as_slice()]);
  let combined_ba = Fingerprint::combine([b.as_bytes().as_slice(), a.as_bytes().as_slice()]);
  assert_ne!(combined_ab, combined_ba);

  // "ab" split as ["a", "b"] must not collide with the same bytes split as ["ab"].
  let split = Fingerprint::combine([b"a".as_slice(), b"b".as_slice()]);
  let whole = Fingerprint::combine([b"ab".as_slice()]);
  assert_ne!(split, whole);
}
