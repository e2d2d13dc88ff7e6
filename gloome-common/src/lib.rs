//! # GLOOME Common Library
//!
//! Shared code for the GLOOME client:
//! - Wire types for the remote analysis service (job submission, polling, result payloads)
//! - Form field values echoed back by the service
//! - Configuration loading (TOML bootstrap + resolution order)
//! - Common error type

pub mod config;
pub mod error;
pub mod form_values;
pub mod protocol;

pub use error::{Error, Result};
pub use form_values::{FieldValue, FormValues};
