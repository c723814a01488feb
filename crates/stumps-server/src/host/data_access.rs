//! Storage collaborator for server instances and their stumps.
//!
//! Calls are synchronous and made only from administrative operations.

use crate::predicate::RuleSetting;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum DataAccessError {
    #[error("Storage I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid storage name: '{0}'")]
    InvalidName(String),
}

/// Persisted server instance descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEntity {
    pub server_id: String,
    pub remote_server_host_name: String,
    pub port: u16,
    pub use_ssl: bool,
    pub auto_start: bool,
    #[serde(default)]
    pub use_https_for_incoming_connections: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeaderEntity {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleEntity {
    pub rule_name: String,
    #[serde(default)]
    pub settings: Vec<RuleSetting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestEntity {
    pub http_method: String,
    pub raw_url: String,
    #[serde(default)]
    pub headers: Vec<HeaderEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_resource_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEntity {
    pub status_code: u16,
    pub status_description: String,
    #[serde(default)]
    pub headers: Vec<HeaderEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_resource_name: Option<String>,
    #[serde(default)]
    pub body_is_text: bool,
    #[serde(default)]
    pub body_is_image: bool,
}

/// Persisted stump descriptor. Bodies are stored as separate resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StumpEntity {
    pub stump_id: String,
    /// Creation order within the server. Assigned by the storage; stumps are
    /// listed in this order so first-match-wins survives a reload.
    #[serde(default)]
    pub sequence: u64,
    #[serde(default)]
    pub stump_name: String,
    #[serde(default)]
    pub rules: Vec<RuleEntity>,
    pub response: ResponseEntity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_request: Option<RequestEntity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_response: Option<ResponseEntity>,
}

/// Body blobs stored alongside a stump descriptor.
#[derive(Debug, Clone, Copy, Default)]
pub struct StumpBodies<'a> {
    pub original_request: &'a [u8],
    pub original_response: &'a [u8],
    pub response: &'a [u8],
}

/// Resource names used for a stump's bodies.
pub(crate) fn original_request_resource(stump_id: &str) -> String {
    format!("{stump_id}.orequest.body")
}

pub(crate) fn original_response_resource(stump_id: &str) -> String {
    format!("{stump_id}.oresponse.body")
}

pub(crate) fn response_resource(stump_id: &str) -> String {
    format!("{stump_id}.response.body")
}

/// Set the body resource names of `stump` for the non-empty bodies.
pub(crate) fn assign_resource_names(stump: &mut StumpEntity, bodies: &StumpBodies<'_>) {
    let id = stump.stump_id.clone();
    stump.response.body_resource_name =
        (!bodies.response.is_empty()).then(|| response_resource(&id));
    if let Some(ref mut request) = stump.original_request {
        request.body_resource_name =
            (!bodies.original_request.is_empty()).then(|| original_request_resource(&id));
    }
    if let Some(ref mut response) = stump.original_response {
        response.body_resource_name =
            (!bodies.original_response.is_empty()).then(|| original_response_resource(&id));
    }
}

/// Sequence for a stump being stored next to `existing`. Re-storing an id
/// keeps its place.
pub(crate) fn next_sequence(existing: &[StumpEntity], stump_id: &str) -> u64 {
    existing
        .iter()
        .find(|stump| stump.stump_id == stump_id)
        .map(|stump| stump.sequence)
        .unwrap_or_else(|| {
            existing
                .iter()
                .map(|stump| stump.sequence + 1)
                .max()
                .unwrap_or(0)
        })
}

/// Order stumps by creation. Descriptors written without a sequence tie at 0
/// and fall back to id order.
pub(crate) fn sort_by_sequence(stumps: &mut [StumpEntity]) {
    stumps.sort_by(|a, b| {
        a.sequence
            .cmp(&b.sequence)
            .then_with(|| a.stump_id.cmp(&b.stump_id))
    });
}

/// Names must be usable as a single path component.
pub(crate) fn validate_name(name: &str) -> Result<&str, DataAccessError> {
    if name.trim().is_empty()
        || name.contains(['/', '\\'])
        || name.contains("..")
        || name.starts_with('.')
    {
        return Err(DataAccessError::InvalidName(name.to_string()));
    }
    Ok(name)
}

pub trait DataAccess: Send + Sync {
    fn server_create(&self, server: &ServerEntity) -> Result<(), DataAccessError>;

    /// Remove the descriptor and everything stored for the server.
    fn server_delete(&self, server_id: &str) -> Result<(), DataAccessError>;

    fn server_find(&self, server_id: &str) -> Result<Option<ServerEntity>, DataAccessError>;

    fn server_find_all(&self) -> Result<Vec<ServerEntity>, DataAccessError>;

    /// Named byte resource of a server, `None` if it does not exist.
    fn server_read_resource(
        &self,
        server_id: &str,
        resource_name: &str,
    ) -> Result<Option<Vec<u8>>, DataAccessError>;

    /// Store a stump and its bodies. Returns the stored descriptor with its
    /// body resource names filled in.
    fn stump_create(
        &self,
        server_id: &str,
        stump: StumpEntity,
        bodies: StumpBodies<'_>,
    ) -> Result<StumpEntity, DataAccessError>;

    fn stump_delete(&self, server_id: &str, stump_id: &str) -> Result<(), DataAccessError>;

    fn stump_find_all(&self, server_id: &str) -> Result<Vec<StumpEntity>, DataAccessError>;
}
