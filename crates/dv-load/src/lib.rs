//! Vault loaders, batch orchestration and post-load validation.
//!
//! Every loader is generic over [`dv_core::store::VaultStore`]. Batch
//! metadata travels explicitly in a [`BatchContext`]; loaders hold no state
//! between calls, which is what makes re-running a batch safe.
//!
//! Dependency order within a batch is hubs, then links, then satellites.
//! Per-record problems (bad keys, unresolved references, change-detection
//! conflicts) are collected into the [`BatchReport`]; only storage failures
//! and cancellation abort a batch.

mod keys;

pub mod context;
pub mod error;
pub mod hub;
pub mod link;
pub mod locks;
pub mod orchestrator;
pub mod report;
pub mod satellite;
pub mod validate;

pub use context::BatchContext;
pub use error::{BatchAbortedError, LoadError, Result};
pub use locks::KeyLocks;
pub use orchestrator::Orchestrator;
pub use report::BatchReport;
pub use validate::{ValidationReport, ValidationRules, validate};
