//! Multi-tenant host: many independent server instances keyed by id.
//!
//! Module structure:
//! - `core` - `StumpsHost` registry and bulk lifecycle operations
//! - `instance` - `StumpsServerInstance`: a server plus its recordings and stored stumps
//! - `data_access` - Storage collaborator trait and persisted entities
//! - `json_store` - JSON file implementation of the storage collaborator
//! - `memory_store` - In-memory implementation of the storage collaborator
//! - `identifier` - Random short identifiers for servers and stumps

mod core;
mod data_access;
mod identifier;
mod instance;
mod json_store;
mod memory_store;

pub use self::core::{HostSettings, StumpsHost};
pub use data_access::{
    DataAccess, DataAccessError, HeaderEntity, RequestEntity, ResponseEntity, RuleEntity,
    ServerEntity, StumpBodies, StumpEntity,
};
pub use identifier::{generate_identifier, IDENTIFIER_LENGTH};
pub use instance::StumpsServerInstance;
pub use json_store::JsonFileDataAccess;
pub use memory_store::InMemoryDataAccess;

use crate::predicate::RuleError;
use crate::server::ServerError;
use crate::stump::StumpError;

/// Errors raised by host administration calls.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Remote host name must not be empty")]
    EmptyRemoteHost,
    #[error("Invalid port: {0}")]
    InvalidPort(u16),
    #[error("Port {0} is already in use")]
    PortInUse(u16),
    #[error("A server with id '{0}' already exists")]
    DuplicateId(String),
    #[error(transparent)]
    Server(#[from] ServerError),
    #[error(transparent)]
    Storage(#[from] DataAccessError),
    #[error(transparent)]
    Rule(#[from] RuleError),
    #[error(transparent)]
    Stump(#[from] StumpError),
}
