//! # Caseview Common Library
//!
//! Shared code for the caseview services including:
//! - Canonical identifiers and the identifier normalizer
//! - Upstream resource types (incidents, reports, evidence, AI results, users)
//! - Event types (CaseEvent enum) and the broadcast event bus
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod ids;
pub mod resources;

pub use error::{Error, Result};
pub use ids::{normalize_str, normalize_value, IdError, IdNormalizer, IdScanMode, ObjectId, RawId};
