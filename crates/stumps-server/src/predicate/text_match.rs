//! Pattern matching primitive used by every rule.
//!
//! Pattern syntax, checked in order:
//! - `not:<pattern>` - negation of `<pattern>`
//! - `regex:<expr>` - regular expression search anywhere in the candidate
//! - anything else - full-string match where `*` and `?` are glob wildcards

use super::RuleError;
use regex::{Regex, RegexBuilder};

const NOT_PREFIX: &str = "not:";
const REGEX_PREFIX: &str = "regex:";

/// A string value with pre-computed lowercase for case-insensitive comparisons.
#[derive(Debug, Clone, PartialEq)]
struct CachedValue {
    value: String,
    lower: String,
}

impl CachedValue {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
            lower: value.to_lowercase(),
        }
    }

    fn equals(&self, candidate: &str, ignore_case: bool) -> bool {
        if ignore_case {
            candidate.to_lowercase() == self.lower
        } else {
            candidate == self.value
        }
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact(CachedValue),
    Pattern(Regex),
    Not(Box<TextMatch>),
}

/// Compiled text pattern. Construction validates the pattern once.
#[derive(Debug, Clone)]
pub struct TextMatch {
    pattern: String,
    ignore_case: bool,
    matcher: Matcher,
}

impl TextMatch {
    /// Compile `pattern`. A malformed `regex:` expression is rejected here.
    pub fn new(pattern: impl Into<String>, ignore_case: bool) -> Result<Self, RuleError> {
        let pattern = pattern.into();
        let matcher = if let Some(rest) = pattern.strip_prefix(NOT_PREFIX) {
            Matcher::Not(Box::new(TextMatch::new(rest, ignore_case)?))
        } else if let Some(rest) = pattern.strip_prefix(REGEX_PREFIX) {
            Matcher::Pattern(compile(&pattern, rest, ignore_case, false)?)
        } else if pattern.contains(['*', '?']) {
            Matcher::Pattern(compile(&pattern, &glob_to_regex(&pattern), ignore_case, true)?)
        } else {
            Matcher::Exact(CachedValue::new(&pattern))
        };

        Ok(Self {
            pattern,
            ignore_case,
            matcher,
        })
    }

    /// Case-insensitive pattern.
    pub fn ignore_case(pattern: impl Into<String>) -> Result<Self, RuleError> {
        Self::new(pattern, true)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_ignore_case(&self) -> bool {
        self.ignore_case
    }

    /// Match a possibly absent candidate. An absent candidate only matches
    /// the empty pattern (or the negation of a non-empty one).
    pub fn is_match(&self, candidate: Option<&str>) -> bool {
        match &self.matcher {
            Matcher::Not(inner) => !inner.is_match(candidate),
            _ => match candidate {
                Some(candidate) => self.matches(candidate),
                None => self.pattern.is_empty(),
            },
        }
    }

    /// Match a present candidate.
    pub fn matches(&self, candidate: &str) -> bool {
        match &self.matcher {
            Matcher::Exact(value) => value.equals(candidate, self.ignore_case),
            Matcher::Pattern(regex) => regex.is_match(candidate),
            Matcher::Not(inner) => !inner.matches(candidate),
        }
    }
}

impl PartialEq for TextMatch {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern && self.ignore_case == other.ignore_case
    }
}

/// Wildcards span line breaks; `regex:` patterns keep standard `.` semantics.
fn compile(
    pattern: &str,
    expr: &str,
    ignore_case: bool,
    wildcard: bool,
) -> Result<Regex, RuleError> {
    RegexBuilder::new(expr)
        .case_insensitive(ignore_case)
        .dot_matches_new_line(wildcard)
        .build()
        .map_err(|source| RuleError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// Translate a glob into an anchored regular expression.
fn glob_to_regex(glob: &str) -> String {
    let mut expr = String::with_capacity(glob.len() + 8);
    expr.push_str("^(?:");
    let mut literal = String::new();
    for c in glob.chars() {
        match c {
            '*' | '?' => {
                expr.push_str(&regex::escape(&literal));
                literal.clear();
                expr.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    expr.push_str(&regex::escape(&literal));
    expr.push_str(")$");
    expr
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tm(pattern: &str) -> TextMatch {
        TextMatch::ignore_case(pattern).unwrap()
    }

    #[test]
    fn test_exact_match_is_case_insensitive_by_default() {
        assert!(tm("GET").matches("get"));
        assert!(tm("GET").matches("GET"));
        assert!(!tm("GET").matches("GETX"));
        assert!(!tm("GET").matches("XGET"));
    }

    #[test]
    fn test_case_sensitive_exact_match() {
        let matcher = TextMatch::new("GET", false).unwrap();
        assert!(matcher.matches("GET"));
        assert!(!matcher.matches("get"));
    }

    #[test]
    fn test_wildcards_anchor_both_ends() {
        let matcher = tm("/api/*/items");
        assert!(matcher.matches("/api/v1/items"));
        assert!(matcher.matches("/API/v2/ITEMS"));
        assert!(!matcher.matches("/api/v1/items/3"));
        assert!(!matcher.matches("x/api/v1/items"));

        let matcher = tm("a?c");
        assert!(matcher.matches("abc"));
        assert!(!matcher.matches("ac"));
        assert!(!matcher.matches("abbc"));
    }

    #[test]
    fn test_wildcard_escapes_regex_metacharacters() {
        let matcher = tm("/search?q=(x)*");
        assert!(matcher.matches("/search?q=(x)&page=2"));
        assert!(matcher.matches("/search!q=(x)"));
        assert!(!matcher.matches("/search?q=x"));
    }

    #[test]
    fn test_regex_searches_anywhere() {
        let matcher = tm("regex:b+c");
        assert!(matcher.matches("abbbcd"));
        assert!(!matcher.matches("acd"));

        let anchored = tm("regex:^a.*z$");
        for candidate in ["az", "abcz", "zaz", "a", "AZ", "a\nz"] {
            let expected = RegexBuilder::new("^a.*z$")
                .case_insensitive(true)
                .build()
                .unwrap()
                .is_match(candidate);
            assert_eq!(anchored.matches(candidate), expected, "{candidate}");
        }
    }

    #[test]
    fn test_regex_dot_stops_at_line_break() {
        let matcher = tm("regex:^a.b$");
        assert!(matcher.matches("axb"));
        assert!(!matcher.matches("a\nb"));

        let wildcard = tm("a*b");
        assert!(wildcard.matches("a\nb"));
    }

    #[test]
    fn test_not_negates() {
        for pattern in ["GET", "regex:^p", "a*", "", "*"] {
            let plain = tm(pattern);
            let negated = tm(&format!("not:{pattern}"));
            for candidate in ["GET", "post", "abc", "", "put"] {
                assert_eq!(
                    negated.is_match(Some(candidate)),
                    !plain.is_match(Some(candidate)),
                    "pattern={pattern} candidate={candidate}"
                );
            }
            assert_eq!(negated.is_match(None), !plain.is_match(None));
        }
    }

    #[test]
    fn test_empty_pattern() {
        let empty = tm("");
        assert!(empty.matches(""));
        assert!(!empty.matches("x"));
        assert!(empty.is_match(None));
        assert!(!tm("x").is_match(None));
        assert!(!tm("*").is_match(None));
    }

    #[test]
    fn test_malformed_regex_fails_at_construction() {
        let err = TextMatch::ignore_case("regex:(unclosed").unwrap_err();
        assert!(matches!(err, RuleError::InvalidPattern { .. }));
        assert!(err.to_string().contains("(unclosed"));
        assert!(TextMatch::ignore_case("not:regex:[").is_err());
    }
}
