//! Engine configuration, deserialised from `dv.toml` and `DV_*` variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use dv_core::mapping::{MappingCatalog, SourceMapping, default_mappings};
use dv_load::ValidationRules;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
  /// SQLite database file; `~` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path:           PathBuf,
  #[serde(default = "default_true")]
  pub validate_after_batch: bool,
  /// Source mappings. Empty means the built-in ERP/SaaS/Payments set.
  #[serde(default)]
  pub sources:              Vec<SourceMapping>,
  /// Validation rules. Absent means the rules for the built-in mappings.
  #[serde(default)]
  pub validation:           Option<ValidationRules>,
}

fn default_store_path() -> PathBuf { PathBuf::from("vault.db") }

fn default_true() -> bool { true }

impl EngineConfig {
  /// Read `path` (optional) and overlay `DV_*` environment variables.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("DV"))
      .build()
      .context("failed to read config file")?;

    settings
      .try_deserialize()
      .context("failed to deserialise EngineConfig")
  }

  pub fn catalog(&self) -> anyhow::Result<MappingCatalog> {
    let mappings = if self.sources.is_empty() {
      default_mappings()
    } else {
      self.sources.clone()
    };
    MappingCatalog::new(mappings).context("invalid source mapping")
  }

  pub fn validation_rules(&self) -> ValidationRules {
    match (&self.validation, self.sources.is_empty()) {
      (Some(rules), _) => rules.clone(),
      (None, true) => ValidationRules::for_default_mappings(),
      (None, false) => ValidationRules::default(),
    }
  }
}
