//! Request/response context passed through the handler pipeline.
//!
//! All per-request state lives here; handlers are shared across in-flight
//! requests and hold none of it.

use super::headers::HttpHeaders;
use super::status::HttpStatus;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use uuid::Uuid;

/// Which component produced the final response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseOrigin {
    #[default]
    Unprocessed,
    Stump,
    RemoteServer,
    NotFoundResponse,
    ServiceUnavailable,
}

/// Inbound request with its body fully buffered.
#[derive(Debug, Clone)]
pub struct StumpsHttpRequest {
    pub method: String,
    /// Path and query exactly as received.
    pub raw_url: String,
    pub headers: HttpHeaders,
    pub body: Bytes,
    pub remote_addr: Option<SocketAddr>,
}

impl StumpsHttpRequest {
    pub fn new(method: impl Into<String>, raw_url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            raw_url: raw_url.into(),
            headers: HttpHeaders::new(),
            body: Bytes::new(),
            remote_addr: None,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.set(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Path component of the raw URL.
    pub fn path(&self) -> &str {
        self.raw_url
            .split_once('?')
            .map(|(path, _)| path)
            .unwrap_or(&self.raw_url)
    }

    /// Query string without the leading `?`.
    pub fn query(&self) -> Option<&str> {
        self.raw_url.split_once('?').map(|(_, query)| query)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }
}

/// Outbound response being assembled by the handlers.
#[derive(Debug, Clone)]
pub struct StumpsHttpResponse {
    pub status_code: u16,
    pub status_description: String,
    pub headers: HttpHeaders,
    pub body: Bytes,
    pub origin: ResponseOrigin,
    /// Identifier of the stump that served the request, if any.
    pub stump_id: Option<String>,
    /// Write the body with chunked transfer encoding.
    pub send_chunked: bool,
}

impl Default for StumpsHttpResponse {
    fn default() -> Self {
        Self {
            status_code: HttpStatus::Ok.code(),
            status_description: HttpStatus::Ok.description().to_string(),
            headers: HttpHeaders::new(),
            body: Bytes::new(),
            origin: ResponseOrigin::Unprocessed,
            stump_id: None,
            send_chunked: false,
        }
    }
}

impl StumpsHttpResponse {
    /// Drop headers and body. Status and origin are left to the caller.
    pub fn clear(&mut self) {
        self.headers.clear();
        self.body = Bytes::new();
        self.send_chunked = false;
    }

    pub fn set_status(&mut self, status: HttpStatus) {
        self.status_code = status.code();
        self.status_description = status.description().to_string();
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get("content-type")
    }
}

/// One request/response exchange.
#[derive(Debug, Clone)]
pub struct StumpsHttpContext {
    pub unique_id: Uuid,
    pub received_at: DateTime<Utc>,
    pub request: StumpsHttpRequest,
    pub response: StumpsHttpResponse,
}

impl StumpsHttpContext {
    pub fn new(request: StumpsHttpRequest) -> Self {
        Self {
            unique_id: Uuid::new_v4(),
            received_at: Utc::now(),
            request,
            response: StumpsHttpResponse::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_and_query_split() {
        let request = StumpsHttpRequest::new("GET", "/api/items?id=4&x=y");
        assert_eq!(request.path(), "/api/items");
        assert_eq!(request.query(), Some("id=4&x=y"));

        let request = StumpsHttpRequest::new("GET", "/plain");
        assert_eq!(request.path(), "/plain");
        assert_eq!(request.query(), None);
    }

    #[test]
    fn test_new_context_is_unprocessed() {
        let context = StumpsHttpContext::new(StumpsHttpRequest::new("GET", "/"));
        assert_eq!(context.response.origin, ResponseOrigin::Unprocessed);
        assert_eq!(context.response.status_code, 200);
        assert!(context.response.stump_id.is_none());
    }

    #[test]
    fn test_clear_keeps_status() {
        let mut response = StumpsHttpResponse::default();
        response.set_status(HttpStatus::NotFound);
        response.headers.set("X-A", "1");
        response.body = Bytes::from_static(b"abc");
        response.send_chunked = true;
        response.clear();
        assert!(response.headers.is_empty());
        assert!(response.body.is_empty());
        assert!(!response.send_chunked);
        assert_eq!(response.status_code, 404);
    }
}
