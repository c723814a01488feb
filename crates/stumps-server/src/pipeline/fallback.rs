use super::{HttpHandler, ProcessHandlerResult};
use crate::http::{HttpStatus, ResponseOrigin, StumpsHttpContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Response returned by instances without a remote server.
///
/// Unrecognized names deserialize to `Undefined`, which behaves like 503.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FallbackResponse {
    Http404NotFound,
    #[default]
    Http503ServiceUnavailable,
    Undefined,
}

impl FallbackResponse {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackResponse::Http404NotFound => "http404-not-found",
            FallbackResponse::Http503ServiceUnavailable => "http503-service-unavailable",
            FallbackResponse::Undefined => "undefined",
        }
    }

    pub fn status(self) -> HttpStatus {
        match self {
            FallbackResponse::Http404NotFound => HttpStatus::NotFound,
            _ => HttpStatus::ServiceUnavailable,
        }
    }

    pub fn origin(self) -> ResponseOrigin {
        match self {
            FallbackResponse::Http404NotFound => ResponseOrigin::NotFoundResponse,
            _ => ResponseOrigin::ServiceUnavailable,
        }
    }
}

impl From<String> for FallbackResponse {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "http404-not-found" | "404" => FallbackResponse::Http404NotFound,
            "http503-service-unavailable" | "503" => FallbackResponse::Http503ServiceUnavailable,
            _ => FallbackResponse::Undefined,
        }
    }
}

impl From<FallbackResponse> for String {
    fn from(value: FallbackResponse) -> Self {
        value.as_str().to_string()
    }
}

/// Terminal handler used when no remote server is configured.
pub struct FallbackHandler {
    response: FallbackResponse,
}

impl FallbackHandler {
    pub fn new(response: FallbackResponse) -> Self {
        Self { response }
    }
}

#[async_trait]
impl HttpHandler for FallbackHandler {
    fn name(&self) -> &'static str {
        "fallback"
    }

    async fn process_request(&self, context: &mut StumpsHttpContext) -> ProcessHandlerResult {
        let response = &mut context.response;
        response.clear();
        response.set_status(self.response.status());
        response.origin = self.response.origin();
        response.stump_id = None;
        ProcessHandlerResult::Terminate
    }
}
