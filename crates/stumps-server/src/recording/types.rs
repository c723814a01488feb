//! Immutable snapshots of one exchange.

use super::body::RecordedBody;
use crate::http::{
    HttpHeaders, ResponseOrigin, StumpsHttpContext, StumpsHttpRequest, StumpsHttpResponse,
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Recorded copy of a request.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub raw_url: String,
    pub headers: HttpHeaders,
    pub body: RecordedBody,
}

impl RecordedRequest {
    pub fn new(
        method: impl Into<String>,
        raw_url: impl Into<String>,
        headers: HttpHeaders,
        body: &Bytes,
        decode: bool,
    ) -> Self {
        let body = RecordedBody::new(&headers, body, decode);
        Self {
            method: method.into(),
            raw_url: raw_url.into(),
            headers,
            body,
        }
    }

    pub fn from_request(request: &StumpsHttpRequest) -> Self {
        Self::new(
            request.method.clone(),
            request.raw_url.clone(),
            request.headers.clone(),
            &request.body,
            true,
        )
    }
}

/// Recorded copy of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedResponse {
    pub status_code: u16,
    pub status_description: String,
    pub origin: ResponseOrigin,
    pub stump_id: Option<String>,
    pub headers: HttpHeaders,
    pub body: RecordedBody,
}

impl RecordedResponse {
    pub fn new(
        status_code: u16,
        status_description: impl Into<String>,
        headers: HttpHeaders,
        body: &Bytes,
        decode: bool,
    ) -> Self {
        let body = RecordedBody::new(&headers, body, decode);
        Self {
            status_code,
            status_description: status_description.into(),
            origin: ResponseOrigin::Unprocessed,
            stump_id: None,
            headers,
            body,
        }
    }

    pub fn from_response(response: &StumpsHttpResponse) -> Self {
        let mut recorded = Self::new(
            response.status_code,
            response.status_description.clone(),
            response.headers.clone(),
            &response.body,
            true,
        );
        recorded.origin = response.origin;
        recorded.stump_id = response.stump_id.clone();
        recorded
    }
}

/// Deep copy of one request/response exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedContext {
    pub unique_id: Uuid,
    pub received_at: DateTime<Utc>,
    pub request: RecordedRequest,
    pub response: RecordedResponse,
}

impl RecordedContext {
    pub fn from_context(context: &StumpsHttpContext) -> Self {
        Self {
            unique_id: context.unique_id,
            received_at: context.received_at,
            request: RecordedRequest::from_request(&context.request),
            response: RecordedResponse::from_response(&context.response),
        }
    }
}
