use crate::http::{HttpHeaders, HttpStatus, StumpsHttpRequest, StumpsHttpResponse};
use crate::predicate::Rule;
use crate::recording::{RecordedRequest, RecordedResponse};
use bytes::Bytes;

/// Response template copied onto every request a stump serves.
#[derive(Debug, Clone, PartialEq)]
pub struct StumpResponse {
    pub status_code: u16,
    pub status_description: String,
    pub headers: HttpHeaders,
    pub body: Bytes,
    pub body_is_text: bool,
    pub body_is_image: bool,
}

impl Default for StumpResponse {
    fn default() -> Self {
        Self {
            status_code: HttpStatus::Ok.code(),
            status_description: HttpStatus::Ok.description().to_string(),
            headers: HttpHeaders::new(),
            body: Bytes::new(),
            body_is_text: false,
            body_is_image: false,
        }
    }
}

impl StumpResponse {
    pub fn new(status_code: u16, status_description: impl Into<String>) -> Self {
        Self {
            status_code,
            status_description: status_description.into(),
            ..Self::default()
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

    /// Replace `response` with this template.
    pub fn apply_to(&self, response: &mut StumpsHttpResponse) {
        response.clear();
        self.headers.copy_to(&mut response.headers);
        response.body = self.body.clone();
        response.status_code = self.status_code;
        response.status_description = self.status_description.clone();
    }
}

/// A named rule set and the response returned when all rules match.
#[derive(Debug, Clone, PartialEq)]
pub struct Stump {
    pub stump_id: String,
    pub stump_name: String,
    pub rules: Vec<Rule>,
    pub response: StumpResponse,
    /// Exchange the stump was created from, if any.
    pub original_request: Option<RecordedRequest>,
    pub original_response: Option<RecordedResponse>,
}

impl Stump {
    pub fn new(stump_id: impl Into<String>) -> Self {
        Self {
            stump_id: stump_id.into(),
            stump_name: String::new(),
            rules: Vec::new(),
            response: StumpResponse::default(),
            original_request: None,
            original_response: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.stump_name = name.into();
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_response(mut self, response: StumpResponse) -> Self {
        self.response = response;
        self
    }

    /// True when every rule matches. A stump without rules matches everything.
    pub fn is_match(&self, request: &StumpsHttpRequest) -> bool {
        self.rules.iter().all(|rule| rule.is_match(request))
    }
}
