//! Resolving hash keys from business keys typed on the command line.

use anyhow::{Context as _, bail};
use dv_core::{
  hash::{HashKey, hub_hash_key, link_hash_key},
  mapping::{MappingCatalog, Parent},
  normalize::{KeyRules, normalize},
};
use serde_json::Value;

fn normalize_str(raw: &str, rules: &KeyRules) -> anyhow::Result<String> {
  Ok(normalize(Some(&Value::String(raw.to_owned())), rules)?)
}

/// Normalise `raw` with the rules the catalog applies to `entity_type`.
pub fn business_key(catalog: &MappingCatalog, entity_type: &str, raw: &str) -> anyhow::Result<String> {
  let default_rules = KeyRules::default();
  let rules = catalog.key_rules_for(entity_type).unwrap_or(&default_rules);
  normalize_str(raw, rules)
}

/// Parent hash key of `satellite` for the given business keys: one key for
/// a hub parent, one per participant (in declaration order) for a link.
pub fn satellite_parent_key(
  catalog: &MappingCatalog,
  satellite: &str,
  keys: &[String],
) -> anyhow::Result<HashKey> {
  let (source, sat) = catalog
    .satellite(satellite)
    .with_context(|| format!("unknown satellite {satellite:?}"))?;

  match source.parent_of(sat)? {
    Parent::Hub(hub) => {
      let [key] = keys else {
        bail!("{satellite} hangs off hub {}; pass exactly one --key", hub.entity_type);
      };
      Ok(hub_hash_key(&hub.entity_type, &normalize_str(key, &hub.rules)?))
    }
    Parent::Link(link) => {
      if keys.len() != link.participants.len() {
        let roles: Vec<_> = link.participants.iter().map(|p| p.role.as_str()).collect();
        bail!(
          "{satellite} hangs off link {}; pass one --key per participant ({})",
          link.link_type,
          roles.join(", ")
        );
      }
      let participants = link
        .participants
        .iter()
        .zip(keys)
        .map(|(p, key)| Ok(hub_hash_key(&p.entity_type, &normalize_str(key, &p.rules)?)))
        .collect::<anyhow::Result<Vec<_>>>()?;
      Ok(link_hash_key(&link.link_type, &participants))
    }
  }
}

#[cfg(test)]
mod tests {
  use dv_core::mapping::default_mappings;

  use super::*;

  fn catalog() -> MappingCatalog { MappingCatalog::new(default_mappings()).unwrap() }

  fn keys(raw: &[&str]) -> Vec<String> { raw.iter().map(|k| (*k).to_owned()).collect() }

  #[test]
  fn hub_satellite_uses_canonical_key() {
    let parent = satellite_parent_key(&catalog(), "sat_customer_erp", &keys(&["cust-001"])).unwrap();
    assert_eq!(parent, hub_hash_key("customer", "CUST001"));
  }

  #[test]
  fn link_satellite_hashes_participants_in_order() {
    let parent =
      satellite_parent_key(&catalog(), "sat_order_item_saas", &keys(&["ord-1", "PROD-1"])).unwrap();
    let expected = link_hash_key("order_item", [
      &hub_hash_key("order", "ORD1"),
      &hub_hash_key("product", "PROD1"),
    ]);
    assert_eq!(parent, expected);
  }

  #[test]
  fn key_count_must_match_parent() {
    let catalog = catalog();
    assert!(satellite_parent_key(&catalog, "sat_order_item_saas", &keys(&["ORD1"])).is_err());
    assert!(satellite_parent_key(&catalog, "sat_customer_erp", &keys(&["A", "B"])).is_err());
    assert!(satellite_parent_key(&catalog, "sat_nope", &keys(&["A"])).is_err());
  }

  #[test]
  fn business_key_falls_back_to_default_rules() {
    let catalog = catalog();
    assert_eq!(business_key(&catalog, "payment_method", "Credit Card").unwrap(), "CREDITCARD");
    assert_eq!(business_key(&catalog, "unmapped", " x-1 ").unwrap(), "x-1");
  }
}
