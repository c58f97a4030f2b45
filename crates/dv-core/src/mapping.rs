//! Source mappings: which hubs, links and satellites a source table feeds.
//!
//! A [`SourceMapping`] is keyed by `(source_system, table)`. Mappings are
//! plain data, deserialised from configuration or built in code; the
//! [`default_mappings`] describe the ERP, SaaS and Payments feeds the engine
//! was built around.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, normalize::KeyRules};

// ─── Mapping types ───────────────────────────────────────────────────────────

/// A hub fed from one business-key field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HubMapping {
  pub entity_type: String,
  pub key_field:   String,
  #[serde(default)]
  pub rules:       KeyRules,
}

/// One participant of a link; its hash key is the hub hash key of
/// `entity_type` computed from `key_field`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantMapping {
  pub role:        String,
  pub entity_type: String,
  pub key_field:   String,
  #[serde(default)]
  pub rules:       KeyRules,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkMapping {
  pub link_type:    String,
  /// Ordered; the order is part of the link hash key.
  pub participants: Vec<ParticipantMapping>,
}

/// Where a satellite's parent key comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SatelliteParent {
  Hub(HubMapping),
  /// A link declared in the same [`SourceMapping`].
  Link { link_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SatelliteMapping {
  pub name:       String,
  pub parent:     SatelliteParent,
  pub attributes: Vec<String>,
}

/// Everything loaded from one source table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMapping {
  pub source_system: String,
  pub table:         String,
  #[serde(default)]
  pub hubs:          Vec<HubMapping>,
  #[serde(default)]
  pub links:         Vec<LinkMapping>,
  #[serde(default)]
  pub satellites:    Vec<SatelliteMapping>,
}

/// A satellite parent with link references resolved.
#[derive(Debug, Clone, Copy)]
pub enum Parent<'a> {
  Hub(&'a HubMapping),
  Link(&'a LinkMapping),
}

impl SourceMapping {
  pub fn link(&self, link_type: &str) -> Option<&LinkMapping> {
    self.links.iter().find(|l| l.link_type == link_type)
  }

  /// Resolve a satellite's parent against this mapping.
  pub fn parent_of<'a>(&'a self, sat: &'a SatelliteMapping) -> Result<Parent<'a>> {
    match &sat.parent {
      SatelliteParent::Hub(hub) => Ok(Parent::Hub(hub)),
      SatelliteParent::Link { link_type } => self
        .link(link_type)
        .map(Parent::Link)
        .ok_or_else(|| {
          self.invalid(format!(
            "satellite {:?} references undeclared link {link_type:?}",
            sat.name
          ))
        }),
    }
  }

  /// Structural checks run once when a catalog is built.
  pub fn check(&self) -> Result<()> {
    if self.hubs.is_empty() && self.links.is_empty() && self.satellites.is_empty()
    {
      return Err(self.invalid("mapping loads nothing".into()));
    }
    for link in &self.links {
      if link.participants.len() < 2 {
        return Err(self.invalid(format!(
          "link {:?} needs at least two participants",
          link.link_type
        )));
      }
    }
    for sat in &self.satellites {
      if sat.attributes.is_empty() {
        return Err(
          self.invalid(format!("satellite {:?} has no attributes", sat.name)),
        );
      }
      self.parent_of(sat)?;
    }
    Ok(())
  }

  fn invalid(&self, reason: String) -> Error {
    Error::InvalidMapping {
      source_system: self.source_system.clone(),
      table: self.table.clone(),
      reason,
    }
  }
}

// ─── Catalog ─────────────────────────────────────────────────────────────────

/// The set of mappings an engine instance knows about.
#[derive(Debug, Clone, Default)]
pub struct MappingCatalog {
  mappings: Vec<SourceMapping>,
}

impl MappingCatalog {
  /// Build a catalog, checking every mapping and rejecting duplicates.
  pub fn new(mappings: Vec<SourceMapping>) -> Result<Self> {
    for (i, mapping) in mappings.iter().enumerate() {
      mapping.check()?;
      let duplicate = mappings[..i].iter().any(|m| {
        m.source_system == mapping.source_system && m.table == mapping.table
      });
      if duplicate {
        return Err(mapping.invalid("declared more than once".into()));
      }
    }
    Ok(Self { mappings })
  }

  pub fn find(&self, source_system: &str, table: &str) -> Option<&SourceMapping> {
    self
      .mappings
      .iter()
      .find(|m| m.source_system == source_system && m.table == table)
  }

  pub fn mappings(&self) -> &[SourceMapping] { &self.mappings }

  /// The first satellite named `name`, with the mapping that declares it.
  pub fn satellite(&self, name: &str) -> Option<(&SourceMapping, &SatelliteMapping)> {
    self.mappings.iter().find_map(|m| {
      m.satellites
        .iter()
        .find(|s| s.name == name)
        .map(|sat| (m, sat))
    })
  }

  /// The key rules the catalog applies to `entity_type`, taken from the first
  /// hub (or link participant) that loads it.
  pub fn key_rules_for(&self, entity_type: &str) -> Option<&KeyRules> {
    let hubs = self
      .mappings
      .iter()
      .flat_map(|m| &m.hubs)
      .find(|h| h.entity_type == entity_type)
      .map(|h| &h.rules);
    hubs.or_else(|| {
      self
        .mappings
        .iter()
        .flat_map(|m| &m.links)
        .flat_map(|l| &l.participants)
        .find(|p| p.entity_type == entity_type)
        .map(|p| &p.rules)
    })
  }
}

// ─── Built-in mappings ───────────────────────────────────────────────────────

fn hub(entity_type: &str, key_field: &str) -> HubMapping {
  HubMapping {
    entity_type: entity_type.into(),
    key_field:   key_field.into(),
    rules:       KeyRules::canonical(),
  }
}

fn participant(role: &str, entity_type: &str, key_field: &str) -> ParticipantMapping {
  ParticipantMapping {
    role:        role.into(),
    entity_type: entity_type.into(),
    key_field:   key_field.into(),
    rules:       KeyRules::canonical(),
  }
}

fn link(link_type: &str, participants: Vec<ParticipantMapping>) -> LinkMapping {
  LinkMapping {
    link_type: link_type.into(),
    participants,
  }
}

fn satellite(name: &str, parent: SatelliteParent, attributes: &[&str]) -> SatelliteMapping {
  SatelliteMapping {
    name: name.into(),
    parent,
    attributes: attributes.iter().map(|a| (*a).to_owned()).collect(),
  }
}

fn source(
  source_system: &str,
  table: &str,
  hubs: Vec<HubMapping>,
  links: Vec<LinkMapping>,
  satellites: Vec<SatelliteMapping>,
) -> SourceMapping {
  SourceMapping {
    source_system: source_system.into(),
    table: table.into(),
    hubs,
    links,
    satellites,
  }
}

/// Mappings for the ERP, SaaS and Payments feeds.
///
/// All business keys use [`KeyRules::canonical`], so the ERP's
/// `CUST-12345` / `cust12345` spellings and the payments feed's
/// `Credit Card` / `CreditCard` methods collapse onto one hub each. Orders
/// and payments reference customers and orders by natural key only; their
/// links never create the referenced hub, so dangling references surface in
/// validation.
pub fn default_mappings() -> Vec<SourceMapping> {
  use SatelliteParent::{Hub, Link};

  vec![
    source(
      "ERP",
      "customers",
      vec![hub("customer", "customer_id")],
      vec![],
      vec![satellite(
        "sat_customer_erp",
        Hub(hub("customer", "customer_id")),
        &["customer_name", "country", "created_at"],
      )],
    ),
    source(
      "ERP",
      "customer_addresses",
      vec![],
      vec![],
      vec![satellite(
        "sat_customer_address_erp",
        Hub(hub("customer", "customer_id")),
        &["address", "city", "state", "postal_code"],
      )],
    ),
    source(
      "ERP",
      "products",
      vec![hub("product", "product_id")],
      vec![],
      vec![satellite(
        "sat_product_erp",
        Hub(hub("product", "product_id")),
        &["product_name", "category", "price"],
      )],
    ),
    source(
      "SAAS",
      "users",
      vec![hub("user", "user_id")],
      vec![],
      vec![satellite(
        "sat_user_saas",
        Hub(hub("user", "user_id")),
        &["name", "email"],
      )],
    ),
    source(
      "SAAS",
      "orders",
      vec![hub("order", "order_id")],
      vec![link("order_customer", vec![
        participant("order", "order", "order_id"),
        participant("customer", "customer", "customer_ref"),
      ])],
      vec![satellite(
        "sat_order_saas",
        Hub(hub("order", "order_id")),
        &["order_date", "amount", "currency", "status"],
      )],
    ),
    source(
      "SAAS",
      "order_items",
      vec![],
      vec![link("order_item", vec![
        participant("order", "order", "order_id"),
        participant("product", "product", "product_id"),
      ])],
      vec![satellite(
        "sat_order_item_saas",
        Link {
          link_type: "order_item".into(),
        },
        &["quantity", "discount_pct"],
      )],
    ),
    source(
      "PAYMENTS",
      "payments",
      vec![hub("payment", "payment_id")],
      vec![
        link("payment_order", vec![
          participant("payment", "payment", "payment_id"),
          participant("order", "order", "order_ref"),
        ]),
        link("payment_payment_method", vec![
          participant("payment", "payment", "payment_id"),
          participant("payment_method", "payment_method", "payment_method"),
        ]),
      ],
      vec![satellite(
        "sat_payment",
        Hub(hub("payment", "payment_id")),
        &["payment_date", "payment_amount", "payment_method"],
      )],
    ),
    source(
      "PAYMENTS",
      "payment_methods",
      vec![hub("payment_method", "payment_method")],
      vec![],
      vec![],
    ),
  ]
}
