//! Rule variants evaluated against incoming requests.
//!
//! Every rule converts to and from an ordered list of [`RuleSetting`]s so it
//! can be persisted without a rule-specific schema. Missing settings fall back
//! to the rule's default.

use super::settings::{RuleSetting, RuleSettingsHelper};
use super::text_match::TextMatch;
use super::RuleError;
use crate::http::StumpsHttpRequest;
use crate::recording::md5_hex;
use once_cell::sync::OnceCell;
use std::fmt;
use std::str::FromStr;

const HTTP_METHOD_VALUE: &str = "httpmethod.value";
const URL_VALUE: &str = "url.value";
const HEADER_NAME: &str = "header.name";
const HEADER_VALUE: &str = "header.value";
const TEXT_EVALUATION_COUNT: &str = "text.evaluation.count";
const TEXT_EVALUATION_PREFIX: &str = "text.evaluation.";
const BODY_MINIMUM: &str = "body.minimum";
const BODY_MAXIMUM: &str = "body.maximum";
const BODY_LENGTH: &str = "body.length";
const BODY_MD5: &str = "body.md5";
const BODY_BASE64: &str = "body.base64";

/// Persisted rule names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    HttpMethod,
    Url,
    Header,
    BodyContent,
    BodyLength,
    BodyMatch,
}

impl RuleKind {
    pub fn name(self) -> &'static str {
        match self {
            RuleKind::HttpMethod => "HttpMethodRule",
            RuleKind::Url => "UrlRule",
            RuleKind::Header => "HeaderRule",
            RuleKind::BodyContent => "BodyContentRule",
            RuleKind::BodyLength => "BodyLengthRule",
            RuleKind::BodyMatch => "BodyMatchRule",
        }
    }

    const ALL: [RuleKind; 6] = [
        RuleKind::HttpMethod,
        RuleKind::Url,
        RuleKind::Header,
        RuleKind::BodyContent,
        RuleKind::BodyLength,
        RuleKind::BodyMatch,
    ];
}

impl FromStr for RuleKind {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RuleKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RuleError::UnknownRule(s.to_string()))
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Matches the request method.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpMethodRule {
    method: TextMatch,
}

impl HttpMethodRule {
    pub fn new(method: &str) -> Result<Self, RuleError> {
        Ok(Self {
            method: TextMatch::ignore_case(method)?,
        })
    }

    fn from_helper(helper: &RuleSettingsHelper) -> Result<Self, RuleError> {
        Self::new(&helper.find_str(HTTP_METHOD_VALUE, ""))
    }

    fn settings(&self) -> Vec<RuleSetting> {
        vec![RuleSetting::new(HTTP_METHOD_VALUE, self.method.pattern())]
    }

    /// An empty method matches every request.
    pub fn is_match(&self, request: &StumpsHttpRequest) -> bool {
        self.method.pattern().is_empty() || self.method.is_match(Some(&request.method))
    }
}

/// Matches the raw URL (path and query).
#[derive(Debug, Clone, PartialEq)]
pub struct UrlRule {
    url: TextMatch,
}

impl UrlRule {
    pub fn new(url: &str) -> Result<Self, RuleError> {
        Ok(Self {
            url: TextMatch::ignore_case(url)?,
        })
    }

    fn from_helper(helper: &RuleSettingsHelper) -> Result<Self, RuleError> {
        Self::new(&helper.find_str(URL_VALUE, ""))
    }

    fn settings(&self) -> Vec<RuleSetting> {
        vec![RuleSetting::new(URL_VALUE, self.url.pattern())]
    }

    pub fn is_match(&self, request: &StumpsHttpRequest) -> bool {
        self.url.is_match(Some(&request.raw_url))
    }
}

/// Matches a header: some header whose name matches `name` must carry a
/// value matching `value`. With no such header the value pattern sees an
/// absent candidate, so `not:` patterns match a missing header.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderRule {
    name: TextMatch,
    value: TextMatch,
}

impl HeaderRule {
    pub fn new(name: &str, value: &str) -> Result<Self, RuleError> {
        Ok(Self {
            name: TextMatch::ignore_case(name)?,
            value: TextMatch::ignore_case(value)?,
        })
    }

    fn from_helper(helper: &RuleSettingsHelper) -> Result<Self, RuleError> {
        Self::new(
            &helper.find_str(HEADER_NAME, ""),
            &helper.find_str(HEADER_VALUE, ""),
        )
    }

    fn settings(&self) -> Vec<RuleSetting> {
        vec![
            RuleSetting::new(HEADER_NAME, self.name.pattern()),
            RuleSetting::new(HEADER_VALUE, self.value.pattern()),
        ]
    }

    pub fn is_match(&self, request: &StumpsHttpRequest) -> bool {
        let mut candidates = request
            .headers
            .iter()
            .filter(|(name, _)| self.name.matches(name))
            .peekable();

        if candidates.peek().is_none() {
            return self.value.is_match(None);
        }
        candidates.any(|(_, value)| self.value.matches(value))
    }
}

/// Every text evaluation must match the body read as UTF-8.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyContentRule {
    evaluations: Vec<TextMatch>,
}

impl BodyContentRule {
    pub fn new<S: AsRef<str>>(evaluations: &[S]) -> Result<Self, RuleError> {
        let evaluations = evaluations
            .iter()
            .map(|e| TextMatch::ignore_case(e.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { evaluations })
    }

    fn from_helper(helper: &RuleSettingsHelper) -> Result<Self, RuleError> {
        let count = helper.find_int(TEXT_EVALUATION_COUNT, 0).max(0);
        let evaluations: Vec<String> = (0..count)
            .map(|i| helper.find_str(&format!("{TEXT_EVALUATION_PREFIX}{i}"), ""))
            .collect();
        Self::new(&evaluations)
    }

    fn settings(&self) -> Vec<RuleSetting> {
        let mut settings = vec![RuleSetting::new(
            TEXT_EVALUATION_COUNT,
            self.evaluations.len().to_string(),
        )];
        settings.extend(self.evaluations.iter().enumerate().map(|(i, e)| {
            RuleSetting::new(format!("{TEXT_EVALUATION_PREFIX}{i}"), e.pattern())
        }));
        settings
    }

    pub fn is_match(&self, request: &StumpsHttpRequest) -> bool {
        if self.evaluations.is_empty() {
            return true;
        }
        let text = String::from_utf8_lossy(&request.body);
        self.evaluations.iter().all(|e| e.matches(&text))
    }
}

/// Body length within an inclusive range.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyLengthRule {
    minimum: i64,
    maximum: i64,
}

impl BodyLengthRule {
    pub fn new(minimum: i64, maximum: i64) -> Self {
        Self { minimum, maximum }
    }

    fn from_helper(helper: &RuleSettingsHelper) -> Self {
        Self::new(
            helper.find_int(BODY_MINIMUM, 0),
            helper.find_int(BODY_MAXIMUM, i64::from(i32::MAX)),
        )
    }

    fn settings(&self) -> Vec<RuleSetting> {
        let mut helper = RuleSettingsHelper::new();
        helper.add_int(BODY_MINIMUM, self.minimum);
        helper.add_int(BODY_MAXIMUM, self.maximum);
        helper.to_settings()
    }

    pub fn is_match(&self, request: &StumpsHttpRequest) -> bool {
        let length = request.body.len() as i64;
        length >= self.minimum && length <= self.maximum
    }
}

/// Byte-identical body.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyMatchRule {
    body: Vec<u8>,
    md5: String,
}

impl BodyMatchRule {
    pub fn new(body: &[u8]) -> Self {
        Self {
            body: body.to_vec(),
            md5: md5_hex(body),
        }
    }

    fn from_helper(helper: &RuleSettingsHelper) -> Self {
        Self::new(&helper.find_bytes(BODY_BASE64, &[]))
    }

    fn settings(&self) -> Vec<RuleSetting> {
        let mut helper = RuleSettingsHelper::new();
        helper.add_int(BODY_LENGTH, self.body.len() as i64);
        helper.add_str(BODY_MD5, &self.md5);
        helper.add_bytes(BODY_BASE64, &self.body);
        helper.to_settings()
    }

    pub fn is_match(&self, request: &StumpsHttpRequest) -> bool {
        request.body.len() == self.body.len() && request.body[..] == self.body[..]
    }
}

/// A predicate over an incoming request.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    HttpMethod(HttpMethodRule),
    Url(UrlRule),
    Header(HeaderRule),
    BodyContent(BodyContentRule),
    BodyLength(BodyLengthRule),
    BodyMatch(BodyMatchRule),
}

impl Rule {
    /// Build a rule from persisted settings.
    pub fn from_settings(kind: RuleKind, settings: &[RuleSetting]) -> Result<Self, RuleError> {
        let helper = RuleSettingsHelper::from_settings(settings);
        Ok(match kind {
            RuleKind::HttpMethod => Rule::HttpMethod(HttpMethodRule::from_helper(&helper)?),
            RuleKind::Url => Rule::Url(UrlRule::from_helper(&helper)?),
            RuleKind::Header => Rule::Header(HeaderRule::from_helper(&helper)?),
            RuleKind::BodyContent => Rule::BodyContent(BodyContentRule::from_helper(&helper)?),
            RuleKind::BodyLength => Rule::BodyLength(BodyLengthRule::from_helper(&helper)),
            RuleKind::BodyMatch => Rule::BodyMatch(BodyMatchRule::from_helper(&helper)),
        })
    }

    /// Build a rule from its persisted name and settings.
    pub fn from_entity(rule_name: &str, settings: &[RuleSetting]) -> Result<Self, RuleError> {
        Self::from_settings(rule_name.parse()?, settings)
    }

    pub fn kind(&self) -> RuleKind {
        match self {
            Rule::HttpMethod(_) => RuleKind::HttpMethod,
            Rule::Url(_) => RuleKind::Url,
            Rule::Header(_) => RuleKind::Header,
            Rule::BodyContent(_) => RuleKind::BodyContent,
            Rule::BodyLength(_) => RuleKind::BodyLength,
            Rule::BodyMatch(_) => RuleKind::BodyMatch,
        }
    }

    pub fn settings(&self) -> Vec<RuleSetting> {
        match self {
            Rule::HttpMethod(r) => r.settings(),
            Rule::Url(r) => r.settings(),
            Rule::Header(r) => r.settings(),
            Rule::BodyContent(r) => r.settings(),
            Rule::BodyLength(r) => r.settings(),
            Rule::BodyMatch(r) => r.settings(),
        }
    }

    pub fn is_match(&self, request: &StumpsHttpRequest) -> bool {
        match self {
            Rule::HttpMethod(r) => r.is_match(request),
            Rule::Url(r) => r.is_match(request),
            Rule::Header(r) => r.is_match(request),
            Rule::BodyContent(r) => r.is_match(request),
            Rule::BodyLength(r) => r.is_match(request),
            Rule::BodyMatch(r) => r.is_match(request),
        }
    }
}

/// Holder for a rule that is initialized at most once.
#[derive(Debug, Default)]
pub struct RuleCell {
    rule: OnceCell<Rule>,
}

impl RuleCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn initialize(&self, rule: Rule) -> Result<&Rule, RuleError> {
        self.rule
            .set(rule)
            .map_err(|_| RuleError::AlreadyInitialized)?;
        self.rule.get().ok_or(RuleError::AlreadyInitialized)
    }

    pub fn initialize_from_settings(
        &self,
        kind: RuleKind,
        settings: &[RuleSetting],
    ) -> Result<&Rule, RuleError> {
        if self.rule.get().is_some() {
            return Err(RuleError::AlreadyInitialized);
        }
        self.initialize(Rule::from_settings(kind, settings)?)
    }

    pub fn get(&self) -> Option<&Rule> {
        self.rule.get()
    }

    pub fn into_inner(self) -> Option<Rule> {
        self.rule.into_inner()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(method: &str, url: &str) -> StumpsHttpRequest {
        StumpsHttpRequest::new(method, url)
    }

    #[test]
    fn test_http_method_rule() {
        let rule = HttpMethodRule::new("post").unwrap();
        assert!(rule.is_match(&request("POST", "/")));
        assert!(!rule.is_match(&request("GET", "/")));
    }

    #[test]
    fn test_http_method_rule_defaults_to_empty_pattern() {
        let rule = Rule::from_settings(RuleKind::HttpMethod, &[]).unwrap();
        assert_eq!(rule.settings(), vec![RuleSetting::new("httpmethod.value", "")]);
        assert!(rule.is_match(&request("GET", "/")));
        assert!(rule.is_match(&request("DELETE", "/x")));
    }

    #[test]
    fn test_url_rule_wildcard() {
        let rule = UrlRule::new("/api/*").unwrap();
        assert!(rule.is_match(&request("GET", "/api/items?id=1")));
        assert!(!rule.is_match(&request("GET", "/other")));
    }

    #[test]
    fn test_header_rule() {
        let rule = HeaderRule::new("x-tenant", "acme").unwrap();
        let req = request("GET", "/").with_header("X-Tenant", "ACME");
        assert!(rule.is_match(&req));
        assert!(!rule.is_match(&request("GET", "/").with_header("X-Tenant", "other")));
        assert!(!rule.is_match(&request("GET", "/")));
    }

    #[test]
    fn test_header_rule_negated_value_matches_missing_header() {
        let rule = HeaderRule::new("authorization", "not:*").unwrap();
        assert!(rule.is_match(&request("GET", "/")));
        assert!(!rule.is_match(&request("GET", "/").with_header("Authorization", "x")));
    }

    #[test]
    fn test_body_content_rule() {
        let rule = BodyContentRule::new(&["*order*", "not:*cancel*"]).unwrap();
        assert!(rule.is_match(&request("POST", "/").with_body("new ORDER placed")));
        assert!(!rule.is_match(&request("POST", "/").with_body("cancel order")));
        assert!(BodyContentRule::new::<&str>(&[])
            .unwrap()
            .is_match(&request("GET", "/")));
    }

    #[test]
    fn test_body_length_rule() {
        let rule = BodyLengthRule::new(2, 4);
        assert!(!rule.is_match(&request("POST", "/").with_body("a")));
        assert!(rule.is_match(&request("POST", "/").with_body("ab")));
        assert!(rule.is_match(&request("POST", "/").with_body("abcd")));
        assert!(!rule.is_match(&request("POST", "/").with_body("abcde")));
    }

    #[test]
    fn test_body_match_rule() {
        let rule = BodyMatchRule::new(b"\x01\x02\x03");
        assert!(rule.is_match(&request("POST", "/").with_body(&b"\x01\x02\x03"[..])));
        assert!(!rule.is_match(&request("POST", "/").with_body(&b"\x01\x02"[..])));
        assert!(!rule.is_match(&request("POST", "/").with_body(&b"\x01\x02\x04"[..])));
    }

    #[test]
    fn test_settings_restore_equivalent_rules() {
        let rules = vec![
            Rule::HttpMethod(HttpMethodRule::new("GET").unwrap()),
            Rule::Url(UrlRule::new("regex:^/v[0-9]+/").unwrap()),
            Rule::Header(HeaderRule::new("accept", "*json*").unwrap()),
            Rule::BodyContent(BodyContentRule::new(&["a*", "*b"]).unwrap()),
            Rule::BodyLength(BodyLengthRule::new(1, 10)),
            Rule::BodyMatch(BodyMatchRule::new(b"payload")),
        ];
        for rule in rules {
            let restored = Rule::from_entity(rule.kind().name(), &rule.settings()).unwrap();
            assert_eq!(restored, rule);
        }
    }

    #[test]
    fn test_unknown_rule_name() {
        let err = Rule::from_entity("MagicRule", &[]).unwrap_err();
        assert!(matches!(err, RuleError::UnknownRule(name) if name == "MagicRule"));
        assert_eq!("urlrule".parse::<RuleKind>().unwrap(), RuleKind::Url);
    }

    #[test]
    fn test_invalid_regex_in_settings_is_rejected() {
        let settings = vec![RuleSetting::new("url.value", "regex:([")];
        assert!(matches!(
            Rule::from_settings(RuleKind::Url, &settings),
            Err(RuleError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_rule_cell_initializes_once() {
        let cell = RuleCell::new();
        let settings = vec![RuleSetting::new("httpmethod.value", "GET")];
        cell.initialize_from_settings(RuleKind::HttpMethod, &settings)
            .unwrap();
        assert!(matches!(
            cell.initialize_from_settings(RuleKind::HttpMethod, &settings),
            Err(RuleError::AlreadyInitialized)
        ));
        assert!(matches!(
            cell.initialize(Rule::BodyLength(BodyLengthRule::new(0, 1))),
            Err(RuleError::AlreadyInitialized)
        ));
        assert_eq!(cell.get().map(Rule::kind), Some(RuleKind::HttpMethod));
    }
}
