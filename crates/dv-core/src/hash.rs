//! Deterministic identity hashing for hubs, links and satellite hash diffs.
//!
//! Digests are SHA-256 over a canonical framing of the input, hex encoded in
//! lower case. Every component is written as a tagged, length-prefixed frame
//! (`s<len>:<bytes>` for strings, `j<len>:<json>` for numbers and booleans,
//! `n` for null), preceded by a domain tag. Arrays are `a<count>:` followed
//! by their elements; objects are `o<count>:` followed by key and value
//! frames in byte order of the key, whatever order the map iterates in. The
//! same logical input therefore produces the same digest in any process or
//! language, and no two distinct component lists share a serialisation.
//!
//! Collisions are not mitigated. At 256 bits they are negligible for vault
//! sizes this engine targets; loaders and the validator report one if it
//! ever shows up.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// Descriptive attributes of a satellite row, ordered by attribute name.
pub type Attributes = BTreeMap<String, Value>;

macro_rules! digest_newtype {
  ($(#[$meta:meta])* $name:ident) => {
    $(#[$meta])*
    #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct $name(String);

    impl $name {
      /// Parse a stored digest, rejecting anything that is not 64 lowercase
      /// hex characters.
      pub fn parse(s: &str) -> Result<Self> {
        let valid = s.len() == 64
          && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'));
        if valid {
          Ok(Self(s.to_owned()))
        } else {
          Err(Error::InvalidDigest(s.to_owned()))
        }
      }

      pub fn as_str(&self) -> &str { &self.0 }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
      }
    }

    impl AsRef<str> for $name {
      fn as_ref(&self) -> &str { &self.0 }
    }
  };
}

digest_newtype! {
  /// Identity of a hub or link row.
  HashKey
}

digest_newtype! {
  /// Digest over all descriptive attributes of a satellite row.
  HashDiff
}

// ─── Canonical framing ───────────────────────────────────────────────────────

struct Canonical {
  hasher: Sha256,
}

impl Canonical {
  fn new(domain: &str) -> Self {
    let mut canonical = Self {
      hasher: Sha256::new(),
    };
    canonical.text(domain);
    canonical
  }

  fn frame(&mut self, tag: u8, bytes: &[u8]) {
    self.hasher.update([tag]);
    self.hasher.update(bytes.len().to_string().as_bytes());
    self.hasher.update(b":");
    self.hasher.update(bytes);
  }

  fn text(&mut self, s: &str) { self.frame(b's', s.as_bytes()); }

  fn count(&mut self, tag: u8, n: usize) {
    self.hasher.update([tag]);
    self.hasher.update(n.to_string().as_bytes());
    self.hasher.update(b":");
  }

  fn value(&mut self, value: &Value) {
    match value {
      Value::Null => self.hasher.update(b"n"),
      Value::String(s) => self.text(s),
      Value::Array(items) => {
        self.count(b'a', items.len());
        for item in items {
          self.value(item);
        }
      }
      Value::Object(fields) => {
        self.count(b'o', fields.len());
        let mut entries: Vec<_> = fields.iter().collect();
        entries.sort_unstable_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));
        for (name, field) in entries {
          self.text(name);
          self.value(field);
        }
      }
      scalar => self.frame(b'j', scalar.to_string().as_bytes()),
    }
  }

  fn finish(self) -> String { hex::encode(self.hasher.finalize()) }
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Hash key of a hub row: the entity type plus its normalised business key.
pub fn hub_hash_key(entity_type: &str, business_key: &str) -> HashKey {
  let mut c = Canonical::new("hub");
  c.text(entity_type);
  c.text(business_key);
  HashKey(c.finish())
}

/// Hash key of a link row: the link type plus the participating hub hash
/// keys, in the order the link declares its participants.
pub fn link_hash_key<'a>(
  link_type: &str,
  participants: impl IntoIterator<Item = &'a HashKey>,
) -> HashKey {
  let mut c = Canonical::new("link");
  c.text(link_type);
  for key in participants {
    c.text(key.as_str());
  }
  HashKey(c.finish())
}

/// Hash diff over a satellite's descriptive attributes.
pub fn hash_diff(attributes: &Attributes) -> HashDiff {
  let mut c = Canonical::new("diff");
  for (name, value) in attributes {
    c.text(name);
    c.value(value);
  }
  HashDiff(c.finish())
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn attrs(pairs: &[(&str, Value)]) -> Attributes {
    pairs
      .iter()
      .map(|(k, v)| ((*k).to_owned(), v.clone()))
      .collect()
  }

  #[test]
  fn hub_hash_is_stable_and_hex() {
    let a = hub_hash_key("customer", "CUST001");
    let b = hub_hash_key("customer", "CUST001");
    assert_eq!(a, b);
    assert_eq!(a.as_str().len(), 64);
    assert!(HashKey::parse(a.as_str()).is_ok());
  }

  #[test]
  fn entity_type_separates_identical_keys() {
    assert_ne!(hub_hash_key("customer", "1"), hub_hash_key("product", "1"));
  }

  #[test]
  fn framing_prevents_concatenation_ambiguity() {
    assert_ne!(hub_hash_key("ab", "c"), hub_hash_key("a", "bc"));
  }

  #[test]
  fn link_hash_depends_on_participant_order() {
    let order = hub_hash_key("order", "ORD1");
    let customer = hub_hash_key("customer", "CUST1");
    let forward = link_hash_key("order_customer", [&order, &customer]);
    let again = link_hash_key("order_customer", [&order, &customer]);
    let reversed = link_hash_key("order_customer", [&customer, &order]);
    assert_eq!(forward, again);
    assert_ne!(forward, reversed);
  }

  #[test]
  fn hash_diff_ignores_insertion_order() {
    let mut first = Attributes::new();
    first.insert("name".into(), json!("Alice"));
    first.insert("country".into(), json!("US"));
    let mut second = Attributes::new();
    second.insert("country".into(), json!("US"));
    second.insert("name".into(), json!("Alice"));
    assert_eq!(hash_diff(&first), hash_diff(&second));
  }

  #[test]
  fn nested_objects_hash_by_content_not_key_order() {
    let mut forward = serde_json::Map::new();
    forward.insert("street".into(), json!("Main St"));
    forward.insert("city".into(), json!("Springfield"));
    let mut backward = serde_json::Map::new();
    backward.insert("city".into(), json!("Springfield"));
    backward.insert("street".into(), json!("Main St"));

    let a = attrs(&[("address", Value::Object(forward))]);
    let b = attrs(&[("address", Value::Object(backward))]);
    assert_eq!(hash_diff(&a), hash_diff(&b));
  }

  #[test]
  fn compound_values_keep_their_shape() {
    let array = attrs(&[("tags", json!(["a", "b"]))]);
    let reordered = attrs(&[("tags", json!(["b", "a"]))]);
    let object = attrs(&[("tags", json!({ "a": "b" }))]);
    let text = attrs(&[("tags", json!("[\"a\",\"b\"]"))]);
    assert_ne!(hash_diff(&array), hash_diff(&reordered));
    assert_ne!(hash_diff(&array), hash_diff(&object));
    assert_ne!(hash_diff(&array), hash_diff(&text));
  }

  #[test]
  fn hash_diff_distinguishes_null_empty_and_numbers() {
    let null = attrs(&[("amount", Value::Null)]);
    let empty = attrs(&[("amount", json!(""))]);
    let number = attrs(&[("amount", json!(5))]);
    let text = attrs(&[("amount", json!("5"))]);
    assert_ne!(hash_diff(&null), hash_diff(&empty));
    assert_ne!(hash_diff(&number), hash_diff(&text));
  }

  #[test]
  fn hash_diff_changes_with_values() {
    let us = attrs(&[("name", json!("Alice")), ("country", json!("US"))]);
    let ca = attrs(&[("name", json!("Alice")), ("country", json!("CA"))]);
    assert_ne!(hash_diff(&us), hash_diff(&ca));
  }

  #[test]
  fn parse_rejects_malformed_digests() {
    assert!(HashKey::parse("abc").is_err());
    assert!(HashKey::parse(&"G".repeat(64)).is_err());
    assert!(HashDiff::parse(&"A".repeat(64)).is_err());
  }
}
