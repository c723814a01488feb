//! A single Stumps server instance.
//!
//! Module structure:
//! - `core` - `StumpsServer`: configuration, lifecycle and counters
//! - `handler` - Accept loop and per-request processing
//! - `remote` - Remote server URI validation
//!
//! Lifecycle: `Stopped -> Starting -> Running -> Stopping -> Stopped`.
//! Start and shutdown are serialized by a per-instance lock and are both
//! idempotent. Counters are lock-free.

mod core;
mod handler;
mod remote;

pub use self::core::{RequestCounters, StumpsServer};
pub use remote::parse_remote_server;

use crate::http::StumpsHttpContext;
use std::sync::Arc;

/// Lifecycle state of a server instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Point in a request's life at which listeners are notified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    /// Before any handler runs.
    Received,
    /// After the pipeline finished, before counters are updated.
    Processed,
    /// After counters are updated.
    Finished,
}

/// Callback invoked at each [`RequestStage`].
pub type RequestListener = Arc<dyn Fn(RequestStage, &StumpsHttpContext) + Send + Sync>;

/// Errors raised by server configuration and lifecycle calls.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("The server is running; shut it down before changing its configuration")]
    Running,
    #[error("Invalid port: {0}")]
    InvalidPort(u16),
    #[error("Invalid remote server URI: {0}")]
    InvalidRemoteUri(String),
    #[error("Port {0} is already in use")]
    PortInUse(u16),
    #[error("Failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS setup failed: {0}")]
    Tls(String),
}
