use bytes::Bytes;

/// Deterministic key for tests and benches.
pub fn get_test_key(i: usize) -> Bytes {
  Bytes::from(format!("ember-kv-key-{:09}", i))
}

/// Deterministic value for tests and benches, padded so that a handful of
/// records is enough to exercise file rotation.
pub fn get_test_value(i: usize) -> Bytes {
  Bytes::from(format!(
    "ember-kv-value-value-value-value-value-value-value-value-{:09}",
    i
  ))
}
