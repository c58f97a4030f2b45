//! Core types and trait definitions for the data vault engine.
//!
//! This crate has no database or runtime dependencies.
//! It holds the vault row types, business-key normalisation, identity
//! hashing, source mappings and the [`store::VaultStore`] abstraction that
//! storage backends implement.

pub mod error;
pub mod hash;
pub mod mapping;
pub mod model;
pub mod normalize;
pub mod store;

pub use error::{Error, Result};
