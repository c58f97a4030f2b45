//! Post-load data quality checks over a vault snapshot.
//!
//! Validation is read-only. Findings are reported, never fixed: the raw vault
//! keeps bad references and null keys exactly as the sources delivered them.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use dv_core::{
  hash::HashKey,
  model::{HubRow, LinkRow, ParentKind, SatelliteRow},
  normalize::DEFAULT_NULL_SENTINEL,
  store::VaultSnapshot,
};
use serde::{Deserialize, Serialize};

// ─── Rules configuration ─────────────────────────────────────────────────────

/// Business-key expectations for one hub entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubValidationRule {
  pub entity_type:   String,
  /// Overrides [`ValidationRules::null_sentinel`] for this entity type.
  #[serde(default)]
  pub null_sentinel: Option<String>,
  /// Every business key must start with this prefix.
  #[serde(default)]
  pub key_prefix:    Option<String>,
  #[serde(default)]
  pub min_len:       Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRules {
  /// The business key that marks a null source key.
  pub null_sentinel: String,
  pub hubs:          Vec<HubValidationRule>,
}

impl Default for ValidationRules {
  fn default() -> Self {
    Self {
      null_sentinel: DEFAULT_NULL_SENTINEL.to_owned(),
      hubs:          Vec::new(),
    }
  }
}

impl ValidationRules {
  /// Key formats of the built-in ERP, SaaS and Payments feeds, as they look
  /// after canonical normalisation (`CUST12345`, `ORD12345`, ...).
  pub fn for_default_mappings() -> Self {
    let prefixed = |entity_type: &str, prefix: &str| HubValidationRule {
      entity_type:   entity_type.into(),
      null_sentinel: None,
      key_prefix:    Some(prefix.into()),
      min_len:       Some(prefix.len() + 1),
    };
    Self {
      hubs: vec![
        prefixed("customer", "CUST"),
        prefixed("product", "PROD"),
        prefixed("order", "ORD"),
        prefixed("user", "USER"),
        prefixed("payment", "PAY"),
      ],
      ..Self::default()
    }
  }

  fn hub_rule(&self, entity_type: &str) -> Option<&HubValidationRule> {
    self.hubs.iter().find(|r| r.entity_type == entity_type)
  }
}

// ─── Report types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
  HubHashKeyUnique,
  LinkHashKeyUnique,
  ReferentialIntegrity,
  RequiredBusinessKey,
  SatelliteMonotonic,
}

/// One offending row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offender {
  /// `hub_<entity>`, `link_<type>`, or the satellite name.
  pub table:    String,
  pub hash_key: HashKey,
  pub detail:   String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleResult {
  pub rule:      Rule,
  pub passed:    bool,
  pub offenders: Vec<Offender>,
}

impl RuleResult {
  fn from_offenders(rule: Rule, offenders: Vec<Offender>) -> Self {
    Self {
      rule,
      passed: offenders.is_empty(),
      offenders,
    }
  }
}

/// Share of links and satellite rows whose parents are not in the vault.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrphanMetrics {
  pub links_total:           usize,
  pub links_orphaned:        usize,
  pub link_orphan_rate:      f64,
  pub satellites_total:      usize,
  pub satellites_orphaned:   usize,
  pub satellite_orphan_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
  /// When the validated snapshot was taken.
  pub checked_at: DateTime<Utc>,
  pub rules:      Vec<RuleResult>,
  /// Rows that share a hash key with a different business identity.
  pub collisions: Vec<Offender>,
  pub orphans:    OrphanMetrics,
}

impl ValidationReport {
  pub fn passed(&self) -> bool { self.rules.iter().all(|r| r.passed) }

  pub fn rule(&self, rule: Rule) -> Option<&RuleResult> {
    self.rules.iter().find(|r| r.rule == rule)
  }

  pub fn violations(&self, rule: Rule) -> usize {
    self.rule(rule).map_or(0, |r| r.offenders.len())
  }
}

// ─── Checks ──────────────────────────────────────────────────────────────────

fn hub_table(entity_type: &str) -> String { format!("hub_{entity_type}") }

fn link_table(link_type: &str) -> String { format!("link_{link_type}") }

/// Run every rule against `snapshot`.
pub fn validate(snapshot: &VaultSnapshot, rules: &ValidationRules) -> ValidationReport {
  let mut collisions = Vec::new();
  let hub_unique = check_hub_uniqueness(&snapshot.hubs, &mut collisions);
  let link_unique = check_link_uniqueness(&snapshot.links, &mut collisions);
  let (integrity, orphans) = check_referential_integrity(snapshot);
  let business_keys = check_business_keys(&snapshot.hubs, rules);
  let monotonic = check_satellite_monotonicity(&snapshot.satellites);

  let report = ValidationReport {
    checked_at: snapshot.taken_at,
    rules: vec![hub_unique, link_unique, integrity, business_keys, monotonic],
    collisions,
    orphans,
  };

  tracing::info!(
    passed = report.passed(),
    link_orphan_rate = report.orphans.link_orphan_rate,
    satellite_orphan_rate = report.orphans.satellite_orphan_rate,
    "validation finished"
  );
  report
}

fn check_hub_uniqueness(hubs: &[HubRow], collisions: &mut Vec<Offender>) -> RuleResult {
  let mut groups: HashMap<&HashKey, Vec<&HubRow>> = HashMap::new();
  for hub in hubs {
    groups.entry(&hub.hash_key).or_default().push(hub);
  }

  let mut offenders = Vec::new();
  for rows in groups.values().filter(|rows| rows.len() > 1) {
    let first = rows[0];
    for dup in &rows[1..] {
      offenders.push(Offender {
        table:    hub_table(&dup.entity_type),
        hash_key: dup.hash_key.clone(),
        detail:   format!("hash key appears {} times", rows.len()),
      });
      if dup.business_key != first.business_key || dup.entity_type != first.entity_type {
        collisions.push(Offender {
          table:    hub_table(&dup.entity_type),
          hash_key: dup.hash_key.clone(),
          detail:   format!(
            "{}/{} and {}/{} share a hash key",
            first.entity_type, first.business_key, dup.entity_type, dup.business_key
          ),
        });
      }
    }
  }
  RuleResult::from_offenders(Rule::HubHashKeyUnique, offenders)
}

fn check_link_uniqueness(links: &[LinkRow], collisions: &mut Vec<Offender>) -> RuleResult {
  let mut groups: HashMap<&HashKey, Vec<&LinkRow>> = HashMap::new();
  for link in links {
    groups.entry(&link.hash_key).or_default().push(link);
  }

  let mut offenders = Vec::new();
  for rows in groups.values().filter(|rows| rows.len() > 1) {
    let first = rows[0];
    for dup in &rows[1..] {
      offenders.push(Offender {
        table:    link_table(&dup.link_type),
        hash_key: dup.hash_key.clone(),
        detail:   format!("hash key appears {} times", rows.len()),
      });
      if dup.participants != first.participants || dup.link_type != first.link_type {
        collisions.push(Offender {
          table:    link_table(&dup.link_type),
          hash_key: dup.hash_key.clone(),
          detail:   "rows with distinct participants share a hash key".into(),
        });
      }
    }
  }
  RuleResult::from_offenders(Rule::LinkHashKeyUnique, offenders)
}

fn rate(part: usize, total: usize) -> f64 {
  if total == 0 { 0.0 } else { part as f64 / total as f64 }
}

fn check_referential_integrity(snapshot: &VaultSnapshot) -> (RuleResult, OrphanMetrics) {
  let hubs: HashSet<&HashKey> = snapshot.hubs.iter().map(|h| &h.hash_key).collect();
  let links: HashSet<&HashKey> = snapshot.links.iter().map(|l| &l.hash_key).collect();

  let mut offenders = Vec::new();
  let mut links_orphaned = 0;
  for link in &snapshot.links {
    let mut orphaned = false;
    for p in link.participants.iter().filter(|p| !hubs.contains(&p.hash_key)) {
      orphaned = true;
      offenders.push(Offender {
        table:    link_table(&link.link_type),
        hash_key: link.hash_key.clone(),
        detail:   format!(
          "participant {} references unknown {} hub {}",
          p.role, p.entity_type, p.hash_key
        ),
      });
    }
    if orphaned {
      links_orphaned += 1;
    }
  }

  let mut satellites_orphaned = 0;
  for sat in &snapshot.satellites {
    let known = match sat.parent_kind {
      ParentKind::Hub => hubs.contains(&sat.parent_hash_key),
      ParentKind::Link => links.contains(&sat.parent_hash_key),
    };
    if !known {
      satellites_orphaned += 1;
      offenders.push(Offender {
        table:    sat.satellite.clone(),
        hash_key: sat.parent_hash_key.clone(),
        detail:   format!(
          "row {} references unknown {} {}",
          sat.seq, sat.parent_kind, sat.parent_type
        ),
      });
    }
  }

  let metrics = OrphanMetrics {
    links_total: snapshot.links.len(),
    links_orphaned,
    link_orphan_rate: rate(links_orphaned, snapshot.links.len()),
    satellites_total: snapshot.satellites.len(),
    satellites_orphaned,
    satellite_orphan_rate: rate(satellites_orphaned, snapshot.satellites.len()),
  };
  (
    RuleResult::from_offenders(Rule::ReferentialIntegrity, offenders),
    metrics,
  )
}

fn check_business_keys(hubs: &[HubRow], rules: &ValidationRules) -> RuleResult {
  let mut offenders = Vec::new();
  for hub in hubs {
    let rule = rules.hub_rule(&hub.entity_type);
    let sentinel = rule
      .and_then(|r| r.null_sentinel.as_deref())
      .unwrap_or(&rules.null_sentinel);

    let problem = if hub.business_key == sentinel {
      Some("business key is null in the source".to_owned())
    } else if let Some(prefix) = rule.and_then(|r| r.key_prefix.as_deref())
      && !hub.business_key.starts_with(prefix)
    {
      Some(format!("business key {:?} lacks prefix {prefix:?}", hub.business_key))
    } else if let Some(min_len) = rule.and_then(|r| r.min_len)
      && hub.business_key.chars().count() < min_len
    {
      Some(format!("business key {:?} is shorter than {min_len}", hub.business_key))
    } else {
      None
    };

    if let Some(detail) = problem {
      offenders.push(Offender {
        table: hub_table(&hub.entity_type),
        hash_key: hub.hash_key.clone(),
        detail,
      });
    }
  }
  RuleResult::from_offenders(Rule::RequiredBusinessKey, offenders)
}

fn check_satellite_monotonicity(satellites: &[SatelliteRow]) -> RuleResult {
  let mut ordered: Vec<&SatelliteRow> = satellites.iter().collect();
  ordered.sort_by(|a, b| {
    (&a.satellite, &a.parent_hash_key, a.load_ts, a.seq)
      .cmp(&(&b.satellite, &b.parent_hash_key, b.load_ts, b.seq))
  });

  let mut offenders = Vec::new();
  for pair in ordered.windows(2) {
    let (prev, next) = (pair[0], pair[1]);
    if prev.satellite != next.satellite || prev.parent_hash_key != next.parent_hash_key {
      continue;
    }
    let detail = if next.load_ts <= prev.load_ts {
      Some(format!("rows {} and {} share load timestamp {}", prev.seq, next.seq, next.load_ts))
    } else if next.hash_diff == prev.hash_diff {
      Some(format!("rows {} and {} repeat the same hash diff", prev.seq, next.seq))
    } else {
      None
    };
    if let Some(detail) = detail {
      offenders.push(Offender {
        table: next.satellite.clone(),
        hash_key: next.parent_hash_key.clone(),
        detail,
      });
    }
  }
  RuleResult::from_offenders(Rule::SatelliteMonotonic, offenders)
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use dv_core::{
    hash::{Attributes, hash_diff, hub_hash_key, link_hash_key},
    model::LinkParticipant,
  };
  use serde_json::json;
  use uuid::Uuid;

  use super::*;

  fn ts(secs: i64) -> DateTime<Utc> { Utc.timestamp_opt(secs, 0).unwrap() }

  fn hub(entity_type: &str, key: &str) -> HubRow {
    HubRow {
      hash_key:      hub_hash_key(entity_type, key),
      entity_type:   entity_type.into(),
      business_key:  key.into(),
      source_system: "ERP".into(),
      load_ts:       ts(100),
      record_source: "ERP.customers".into(),
      batch_id:      Uuid::nil(),
    }
  }

  fn payment_order(payment: &str, order: &str) -> LinkRow {
    let participants = vec![
      LinkParticipant {
        role:        "payment".into(),
        entity_type: "payment".into(),
        hash_key:    hub_hash_key("payment", payment),
      },
      LinkParticipant {
        role:        "order".into(),
        entity_type: "order".into(),
        hash_key:    hub_hash_key("order", order),
      },
    ];
    LinkRow {
      hash_key: link_hash_key("payment_order", participants.iter().map(|p| &p.hash_key)),
      link_type: "payment_order".into(),
      participants,
      load_ts: ts(100),
      record_source: "PAYMENTS.payments".into(),
      batch_id: Uuid::nil(),
    }
  }

  fn sat(seq: i64, key: &str, secs: i64, country: &str) -> SatelliteRow {
    let mut attributes = Attributes::new();
    attributes.insert("country".into(), json!(country));
    SatelliteRow {
      seq,
      satellite: "sat_customer".into(),
      parent_kind: ParentKind::Hub,
      parent_type: "customer".into(),
      parent_hash_key: hub_hash_key("customer", key),
      load_ts: ts(secs),
      hash_diff: hash_diff(&attributes),
      attributes,
      record_source: "ERP.customers".into(),
      batch_id: Uuid::nil(),
    }
  }

  fn snapshot(hubs: Vec<HubRow>, links: Vec<LinkRow>, satellites: Vec<SatelliteRow>) -> VaultSnapshot {
    VaultSnapshot {
      taken_at: ts(1000),
      hubs,
      links,
      satellites,
    }
  }

  #[test]
  fn clean_vault_passes_every_rule() {
    let snap = snapshot(
      vec![hub("payment", "PAY1"), hub("order", "ORD1"), hub("customer", "CUST1")],
      vec![payment_order("PAY1", "ORD1")],
      vec![sat(1, "CUST1", 100, "US"), sat(2, "CUST1", 200, "CA")],
    );
    let report = validate(&snap, &ValidationRules::for_default_mappings());
    assert!(report.passed(), "{report:#?}");
    assert_eq!(report.orphans.link_orphan_rate, 0.0);
    assert!(report.collisions.is_empty());
  }

  #[test]
  fn dangling_order_reference_is_one_violation() {
    let snap = snapshot(
      vec![hub("payment", "PAY1")],
      vec![payment_order("PAY1", "ORD9999")],
      vec![],
    );
    let report = validate(&snap, &ValidationRules::default());
    assert_eq!(report.violations(Rule::ReferentialIntegrity), 1);
    assert_eq!(report.orphans.links_orphaned, 1);
    assert_eq!(report.orphans.link_orphan_rate, 1.0);
    let offender = &report.rule(Rule::ReferentialIntegrity).unwrap().offenders[0];
    assert_eq!(offender.table, "link_payment_order");
  }

  #[test]
  fn orphaned_satellites_counted() {
    let snap = snapshot(
      vec![hub("customer", "CUST1")],
      vec![],
      vec![sat(1, "CUST1", 100, "US"), sat(2, "CUST2", 100, "US")],
    );
    let report = validate(&snap, &ValidationRules::default());
    assert_eq!(report.violations(Rule::ReferentialIntegrity), 1);
    assert_eq!(report.orphans.satellites_orphaned, 1);
    assert_eq!(report.orphans.satellite_orphan_rate, 0.5);
  }

  #[test]
  fn duplicate_hub_rows_and_collisions_reported() {
    let original = hub("customer", "CUST1");
    let mut twin = original.clone();
    twin.business_key = "CUST2".into();
    let snap = snapshot(vec![original.clone(), original, twin], vec![], vec![]);

    let report = validate(&snap, &ValidationRules::default());
    assert_eq!(report.violations(Rule::HubHashKeyUnique), 2);
    assert_eq!(report.collisions.len(), 1);
  }

  #[test]
  fn sentinel_and_format_checks() {
    let snap = snapshot(
      vec![hub("customer", "-1"), hub("customer", "ACME1"), hub("customer", "CUST"), hub("customer", "CUST1")],
      vec![],
      vec![],
    );
    let report = validate(&snap, &ValidationRules::for_default_mappings());
    let details: Vec<_> = report
      .rule(Rule::RequiredBusinessKey)
      .unwrap()
      .offenders
      .iter()
      .map(|o| o.detail.clone())
      .collect();
    assert_eq!(details.len(), 3, "{details:?}");
    assert!(details[0].contains("null"));
    assert!(details[1].contains("prefix"));
    assert!(details[2].contains("shorter"));
  }

  #[test]
  fn per_entity_sentinel_override() {
    let rules = ValidationRules {
      hubs: vec![HubValidationRule {
        entity_type:   "user".into(),
        null_sentinel: Some("<none>".into()),
        key_prefix:    None,
        min_len:       None,
      }],
      ..ValidationRules::default()
    };
    let snap = snapshot(vec![hub("user", "<none>"), hub("user", "-1")], vec![], vec![]);
    let report = validate(&snap, &rules);
    assert_eq!(report.violations(Rule::RequiredBusinessKey), 1);
  }

  #[test]
  fn monotonicity_flags_repeats_and_ties() {
    let snap = snapshot(
      vec![hub("customer", "CUST1")],
      vec![],
      vec![
        sat(1, "CUST1", 100, "US"),
        sat(2, "CUST1", 200, "US"),
        sat(3, "CUST1", 200, "CA"),
      ],
    );
    let report = validate(&snap, &ValidationRules::default());
    assert_eq!(report.violations(Rule::SatelliteMonotonic), 2);
  }

  #[test]
  fn change_back_is_not_a_repeat() {
    let snap = snapshot(
      vec![hub("customer", "CUST1")],
      vec![],
      vec![
        sat(1, "CUST1", 100, "US"),
        sat(2, "CUST1", 200, "CA"),
        sat(3, "CUST1", 300, "US"),
      ],
    );
    let report = validate(&snap, &ValidationRules::default());
    assert!(report.rule(Rule::SatelliteMonotonic).unwrap().passed);
  }
}
