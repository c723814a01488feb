//! Stumps: rule sets with canned responses, and their per-server registry.
//!
//! Module structure:
//! - `types` - `Stump` and its response template
//! - `manager` - `StumpsManager` registry with first-match lookup

mod manager;
mod types;

pub use manager::StumpsManager;
pub use types::{Stump, StumpResponse};

/// Errors raised by the stump registry.
#[derive(Debug, thiserror::Error)]
pub enum StumpError {
    #[error("A stump with id '{0}' already exists")]
    DuplicateId(String),
    #[error("Stump id must not be empty")]
    EmptyId,
}
