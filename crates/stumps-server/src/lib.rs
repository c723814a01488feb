//! Stumps - HTTP mock server and recording proxy for service virtualization.
//!
//! Module structure:
//! - `host` - Registry of server instances with persistent storage
//! - `server` - A single listening instance and its request pipeline
//! - `pipeline` - Ordered request handlers: stumps, proxy, fallback
//! - `stump` - Stumps (rules plus canned response) and their manager
//! - `predicate` - Rules and text matching
//! - `recording` - Recorded exchanges and body decoding
//! - `http` - Protocol-neutral request, response and header types
//! - `proxy` - Outbound client, TLS and listener plumbing
//! - `config` - YAML configuration

pub mod config;
pub mod host;
pub mod http;
pub mod pipeline;
pub mod predicate;
pub mod proxy;
pub mod recording;
pub mod server;
pub mod stump;

#[cfg(test)]
mod test_support;
