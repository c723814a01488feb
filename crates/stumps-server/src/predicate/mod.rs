//! Request predicates: the pattern primitive and the rules built on it.
//!
//! Module structure:
//! - `text_match` - `not:`/`regex:`/glob pattern matching
//! - `settings` - Named string settings used to persist rules
//! - `rule` - Rule variants evaluated against incoming requests

mod rule;
mod settings;
mod text_match;

pub use rule::{
    BodyContentRule, BodyLengthRule, BodyMatchRule, HeaderRule, HttpMethodRule, Rule, RuleCell,
    RuleKind, UrlRule,
};
pub use settings::{RuleSetting, RuleSettingsHelper};
pub use text_match::TextMatch;

/// Errors raised while building rules.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("Rule is already initialized")]
    AlreadyInitialized,
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Unknown rule: {0}")]
    UnknownRule(String),
}
