//! fodmap-core - Core library for My FODMAP
//!
//! This crate contains the food tolerance document model, the offline-first
//! local store, the OAuth token lifecycle, and the reconciliation engine that
//! keeps the local document in step with a single JSON file on Google Drive.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod models;
pub mod remote;
pub mod storage;
pub mod sync;
pub mod util;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result, ValidationError};
pub use models::{Category, Credential, Document, Food, Outcome};
