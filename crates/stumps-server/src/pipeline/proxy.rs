//! Forwards requests to the remote server.
//!
//! The remote call is a single bounded attempt. A remote response of any
//! status is relayed unchanged; only a failure without a response becomes a
//! 503. The handler always returns `Continue` so the exchange is still
//! observed downstream.

use super::{HttpHandler, ProcessHandlerResult};
use crate::http::{
    status_description, HttpStatus, ResponseOrigin, StumpsHttpContext, StumpsHttpRequest,
    StumpsHttpResponse,
};
use crate::proxy::HttpClient;
use async_trait::async_trait;
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use hyper::http::response::Parts;
use hyper::{Method, Request, Uri};
use std::convert::Infallible;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Request headers that are never copied verbatim.
pub const REQUEST_HEADER_DENY_LIST: [&str; 12] = [
    "accept",
    "connection",
    "content-length",
    "content-type",
    "expect",
    "date",
    "host",
    "if-modified-since",
    "range",
    "referer",
    "transfer-encoding",
    "user-agent",
];

/// Denied headers that are still forwarded individually.
const CURATED_REQUEST_HEADERS: [&str; 5] = [
    "accept",
    "content-type",
    "referer",
    "transfer-encoding",
    "user-agent",
];

/// Remote response headers dropped before the response is written back.
pub const RESPONSE_HEADER_STRIP_LIST: [&str; 4] = [
    "content-length",
    "content-type",
    "transfer-encoding",
    "keep-alive",
];

pub struct ProxyHandler {
    client: HttpClient,
    /// `scheme://authority` without a trailing slash.
    remote_base: String,
    timeout: Duration,
}

impl ProxyHandler {
    pub fn new(client: HttpClient, remote_base: &str, timeout: Duration) -> Self {
        Self {
            client,
            remote_base: remote_base.trim_end_matches('/').to_string(),
            timeout,
        }
    }

    /// Remote URL for an incoming raw URL, joined by exactly one slash.
    pub fn remote_url(&self, raw_url: &str) -> String {
        format!("{}/{}", self.remote_base, raw_url.trim_start_matches('/'))
    }

    fn build_request(
        &self,
        request: &StumpsHttpRequest,
    ) -> Result<Request<BoxBody<Bytes, hyper::Error>>, anyhow::Error> {
        let method = Method::from_bytes(request.method.as_bytes())?;
        let uri: Uri = self.remote_url(&request.raw_url).parse()?;

        let body = BoxBody::new(
            Full::new(request.body.clone()).map_err(|never: Infallible| match never {}),
        );
        let mut outbound = Request::builder().method(method).uri(uri).body(body)?;

        let headers = outbound.headers_mut();
        for (name, value) in request.headers.iter() {
            let lower = name.to_ascii_lowercase();
            let curated = CURATED_REQUEST_HEADERS.contains(&lower.as_str());
            if !curated && REQUEST_HEADER_DENY_LIST.contains(&lower.as_str()) {
                continue;
            }
            if lower == "transfer-encoding" && request.body.is_empty() {
                continue;
            }
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => warn!("Skipping request header '{}' that cannot be forwarded", name),
            }
        }

        Ok(outbound)
    }

    /// One remote call. `Err` means no response was obtained.
    async fn execute(&self, request: &StumpsHttpRequest) -> Result<(Parts, Bytes), String> {
        let outbound = self
            .build_request(request)
            .map_err(|e| format!("failed to build remote request: {e}"))?;

        let deadline = Instant::now() + self.timeout;
        let response = match tokio::time::timeout_at(deadline, self.client.request(outbound)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => return Err(e.to_string()),
            Err(_) => return Err(format!("timed out after {:?}", self.timeout)),
        };

        let (parts, body) = response.into_parts();
        match tokio::time::timeout_at(deadline, body.collect()).await {
            Ok(Ok(collected)) => Ok((parts, collected.to_bytes())),
            Ok(Err(e)) => Err(format!("failed to read remote response body: {e}")),
            Err(_) => Err(format!(
                "timed out reading remote response body after {:?}",
                self.timeout
            )),
        }
    }
}

fn apply_remote_response(response: &mut StumpsHttpResponse, parts: Parts, body: Bytes) {
    response.clear();

    for (name, value) in parts.headers.iter() {
        if RESPONSE_HEADER_STRIP_LIST.contains(&name.as_str()) {
            continue;
        }
        match value.to_str() {
            Ok(value) => response.headers.add(name.as_str(), value),
            Err(_) => warn!("Skipping remote header '{}' with a non-text value", name),
        }
    }

    if let Some(content_type) = parts.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        response.headers.set("Content-Type", content_type);
    }

    response.send_chunked = parts
        .headers
        .get_all(TRANSFER_ENCODING)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("chunked"));

    let declared_empty = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim() == "0")
        .unwrap_or(false);
    if !declared_empty {
        response.body = body;
    }

    response.status_code = parts.status.as_u16();
    response.status_description = parts
        .extensions
        .get::<hyper::ext::ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .unwrap_or_else(|| status_description(parts.status.as_u16()).to_string());
    response.origin = ResponseOrigin::RemoteServer;
    response.stump_id = None;
}

fn apply_failure(response: &mut StumpsHttpResponse) {
    response.clear();
    response.set_status(HttpStatus::ServiceUnavailable);
    response.origin = ResponseOrigin::ServiceUnavailable;
    response.stump_id = None;
}

#[async_trait]
impl HttpHandler for ProxyHandler {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn process_request(&self, context: &mut StumpsHttpContext) -> ProcessHandlerResult {
        match self.execute(&context.request).await {
            Ok((parts, body)) => {
                debug!(
                    "Proxied {} {} -> {}",
                    context.request.method,
                    context.request.raw_url,
                    parts.status.as_u16()
                );
                apply_remote_response(&mut context.response, parts, body);
            }
            Err(e) => {
                error!(
                    "Remote call for {} {} failed: {}",
                    context.request.method,
                    self.remote_url(&context.request.raw_url),
                    e
                );
                apply_failure(&mut context.response);
            }
        }
        ProcessHandlerResult::Continue
    }
}
