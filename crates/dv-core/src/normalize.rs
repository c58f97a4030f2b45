//! Business-key normalisation.
//!
//! Source systems disagree on how they spell the same natural key
//! (`CUST12345`, `CUST-12345`, `cust12345`). Every key is canonicalised by a
//! per-field [`KeyRules`] before it is hashed, so identical entities resolve
//! to identical hash keys regardless of which system supplied them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::{MALFORMED_FIELD, Record};

/// The sentinel a null or empty business key maps to when a field does not
/// configure its own. Mirrors the conventional data vault "unknown" ghost key.
pub const DEFAULT_NULL_SENTINEL: &str = "-1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationError {
  #[error("expected {expected}, found {found}")]
  TypeMismatch {
    expected: &'static str,
    found:    &'static str,
  },

  #[error("source row could not be parsed")]
  MalformedRecord,
}

/// Per-field canonicalisation rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyRules {
  /// Strip leading and trailing whitespace.
  pub trim:                   bool,
  /// Fold to upper case.
  pub case_fold:              bool,
  /// Drop every character that is not alphanumeric (dashes, spaces, dots).
  pub strip_non_alphanumeric: bool,
  /// What a null, missing or empty value becomes.
  pub null_sentinel:          String,
  /// Stringify numeric keys instead of rejecting them.
  pub accept_numbers:         bool,
}

impl Default for KeyRules {
  fn default() -> Self {
    Self {
      trim:                   true,
      case_fold:              false,
      strip_non_alphanumeric: false,
      null_sentinel:          DEFAULT_NULL_SENTINEL.to_owned(),
      accept_numbers:         false,
    }
  }
}

impl KeyRules {
  /// Trim, case-fold and strip punctuation; the usual setting for
  /// identifiers typed by hand in more than one system.
  pub fn canonical() -> Self {
    Self {
      case_fold: true,
      strip_non_alphanumeric: true,
      ..Self::default()
    }
  }
}

/// Canonicalise a raw field value into a business key.
///
/// Pure and deterministic. A missing field, JSON `null`, or a string that is
/// empty after the configured rules yields `rules.null_sentinel`. Only a type
/// mismatch fails.
pub fn normalize(
  value: Option<&Value>,
  rules: &KeyRules,
) -> Result<String, NormalizationError> {
  let text = match value {
    None | Some(Value::Null) => return Ok(rules.null_sentinel.clone()),
    Some(Value::String(s)) => s.clone(),
    Some(Value::Number(n)) if rules.accept_numbers => n.to_string(),
    Some(other) => {
      return Err(NormalizationError::TypeMismatch {
        expected: if rules.accept_numbers {
          "string or number"
        } else {
          "string"
        },
        found:    json_type_name(other),
      });
    }
  };

  let mut key = if rules.trim { text.trim().to_owned() } else { text };
  if rules.strip_non_alphanumeric {
    key.retain(char::is_alphanumeric);
  }
  if rules.case_fold {
    key = key.to_uppercase();
  }

  if key.trim().is_empty() {
    return Ok(rules.null_sentinel.clone());
  }
  Ok(key)
}

/// Normalise `field` of `record`. A record the source reader flagged as
/// malformed fails here rather than degrading to the null sentinel.
pub fn normalize_field(
  record: &Record,
  field: &str,
  rules: &KeyRules,
) -> Result<String, NormalizationError> {
  if record.contains_key(MALFORMED_FIELD) {
    return Err(NormalizationError::MalformedRecord);
  }
  normalize(record.get(field), rules)
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "boolean",
    Value::Number(_) => "number",
    Value::String(_) => "string",
    Value::Array(_) => "array",
    Value::Object(_) => "object",
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn case_fold_unifies_spellings() {
    let rules = KeyRules {
      case_fold: true,
      ..KeyRules::default()
    };
    let upper = normalize(Some(&json!("CUST-001")), &rules).unwrap();
    let lower = normalize(Some(&json!("cust-001")), &rules).unwrap();
    assert_eq!(upper, "CUST-001");
    assert_eq!(upper, lower);
  }

  #[test]
  fn canonical_rules_strip_punctuation_and_whitespace() {
    let rules = KeyRules::canonical();
    assert_eq!(
      normalize(Some(&json!("  cust-12345 ")), &rules).unwrap(),
      "CUST12345"
    );
    assert_eq!(
      normalize(Some(&json!("Credit Card")), &rules).unwrap(),
      normalize(Some(&json!("CreditCard")), &rules).unwrap()
    );
  }

  #[test]
  fn null_missing_and_blank_map_to_sentinel() {
    let rules = KeyRules::default();
    assert_eq!(normalize(None, &rules).unwrap(), DEFAULT_NULL_SENTINEL);
    assert_eq!(
      normalize(Some(&Value::Null), &rules).unwrap(),
      DEFAULT_NULL_SENTINEL
    );
    assert_eq!(
      normalize(Some(&json!("   ")), &rules).unwrap(),
      DEFAULT_NULL_SENTINEL
    );
  }

  #[test]
  fn punctuation_only_key_becomes_sentinel() {
    let rules = KeyRules {
      null_sentinel: "<null>".into(),
      ..KeyRules::canonical()
    };
    assert_eq!(normalize(Some(&json!("--")), &rules).unwrap(), "<null>");
  }

  #[test]
  fn numbers_rejected_unless_accepted() {
    let strict = KeyRules::default();
    let err = normalize(Some(&json!(42)), &strict).unwrap_err();
    assert_eq!(
      err,
      NormalizationError::TypeMismatch {
        expected: "string",
        found:    "number",
      }
    );

    let lenient = KeyRules {
      accept_numbers: true,
      ..KeyRules::default()
    };
    assert_eq!(normalize(Some(&json!(42)), &lenient).unwrap(), "42");
  }

  #[test]
  fn structured_values_are_type_mismatches() {
    let rules = KeyRules::default();
    assert!(normalize(Some(&json!(true)), &rules).is_err());
    assert!(normalize(Some(&json!(["a"])), &rules).is_err());
    assert!(normalize(Some(&json!({ "id": "a" })), &rules).is_err());
  }

  #[test]
  fn untrimmed_key_is_kept_verbatim() {
    let rules = KeyRules {
      trim: false,
      ..KeyRules::default()
    };
    assert_eq!(normalize(Some(&json!(" A ")), &rules).unwrap(), " A ");
  }

  #[test]
  fn malformed_record_fails_every_field() {
    let rules = KeyRules::canonical();
    let malformed = Record::from([(MALFORMED_FIELD.to_owned(), json!("not json"))]);
    assert_eq!(
      normalize_field(&malformed, "customer_id", &rules),
      Err(NormalizationError::MalformedRecord)
    );

    let ok = Record::from([("customer_id".to_owned(), json!("cust-7"))]);
    assert_eq!(normalize_field(&ok, "customer_id", &rules).unwrap(), "CUST7");
    assert_eq!(
      normalize_field(&ok, "order_id", &rules).unwrap(),
      DEFAULT_NULL_SENTINEL
    );
  }
}
