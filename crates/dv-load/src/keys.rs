//! Resolving hash keys from source records.

use dv_core::{
  hash::{HashKey, hub_hash_key, link_hash_key},
  mapping::{HubMapping, LinkMapping, Parent},
  model::{LinkParticipant, Record},
  normalize::{KeyRules, NormalizationError, normalize_field},
};

use crate::report::RecordIssue;

/// Why a record's key could not be resolved.
pub(crate) enum KeyProblem {
  Missing { field: String },
  Invalid { field: String, error: NormalizationError },
}

impl KeyProblem {
  /// File the problem under the outcome list it belongs to.
  pub(crate) fn file(
    self,
    index: usize,
    unresolved: &mut Vec<RecordIssue>,
    failed: &mut Vec<RecordIssue>,
  ) {
    match self {
      Self::Missing { field } => {
        tracing::debug!(index, %field, "unresolved key");
        unresolved.push(RecordIssue::unresolved(index, &field));
      }
      Self::Invalid { field, error } => {
        tracing::warn!(index, %field, %error, "key normalization failed");
        failed.push(RecordIssue::normalization(index, &field, &error));
      }
    }
  }
}

/// Hash key of a hub reference that must be present. A key that normalises
/// to the null sentinel (null, blank, or punctuation only) is missing: a
/// reference cannot point at the ghost hub.
fn required_hub_key(
  entity_type: &str,
  key_field: &str,
  rules: &KeyRules,
  record: &Record,
) -> Result<HashKey, KeyProblem> {
  let key = normalize_field(record, key_field, rules).map_err(|error| KeyProblem::Invalid {
    field: key_field.to_owned(),
    error,
  })?;
  if key == rules.null_sentinel {
    return Err(KeyProblem::Missing {
      field: key_field.to_owned(),
    });
  }
  Ok(hub_hash_key(entity_type, &key))
}

/// Link hash key and participants; every participant key must be present.
pub(crate) fn link_key(
  mapping: &LinkMapping,
  record: &Record,
) -> Result<(HashKey, Vec<LinkParticipant>), KeyProblem> {
  let participants = mapping
    .participants
    .iter()
    .map(|p| {
      required_hub_key(&p.entity_type, &p.key_field, &p.rules, record).map(|hash_key| {
        LinkParticipant {
          role: p.role.clone(),
          entity_type: p.entity_type.clone(),
          hash_key,
        }
      })
    })
    .collect::<Result<Vec<_>, _>>()?;

  let hash_key = link_hash_key(&mapping.link_type, participants.iter().map(|p| &p.hash_key));
  Ok((hash_key, participants))
}

/// Hash key of a satellite's parent; a missing parent key is unresolved.
pub(crate) fn parent_key(parent: Parent<'_>, record: &Record) -> Result<HashKey, KeyProblem> {
  match parent {
    Parent::Hub(HubMapping {
      entity_type,
      key_field,
      rules,
    }) => required_hub_key(entity_type, key_field, rules, record),
    Parent::Link(link) => link_key(link, record).map(|(hash_key, _)| hash_key),
  }
}
